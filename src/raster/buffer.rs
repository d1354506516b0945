use bytemuck::Zeroable;

use crate::errors::{GdalError, Result};
use crate::raster::GdalType;

#[cfg(feature = "ndarray")]
use ndarray::Array2;

/// Pixels of a raster window: `size` is `(cols, rows)` and `data` holds the
/// rows top to bottom.
#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq)]
pub struct Buffer<T> {
    pub size: (usize, usize),
    pub data: Vec<T>,
}

impl<T: GdalType> Buffer<T> {
    /// # Panics
    /// If `data` does not hold `size.0 * size.1` values.
    pub fn new(size: (usize, usize), data: Vec<T>) -> Self {
        assert_eq!(
            size.0 * size.1,
            data.len(),
            "size {:?} does not match length {}",
            size,
            data.len()
        );
        Buffer { size, data }
    }

    /// Like [`Buffer::new`], but reports a size mismatch as an error.
    pub fn try_new(size: (usize, usize), data: Vec<T>) -> Result<Self> {
        if size.0.checked_mul(size.1) != Some(data.len()) {
            return Err(GdalError::BadArgument(format!(
                "size {size:?} does not match length {}",
                data.len()
            )));
        }
        Ok(Buffer { size, data })
    }

    /// A zero-filled buffer of `size` (`(cols, rows)`).
    pub fn zeroed(size: (usize, usize)) -> Result<Self> {
        let len = size
            .0
            .checked_mul(size.1)
            .ok_or_else(|| GdalError::OutOfMemory(format!("buffer of {size:?} overflows")))?;
        Ok(Buffer {
            size,
            data: zeroed_vec(len)?,
        })
    }

    /// Number of cells, `cols * rows`.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The cells as raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    #[cfg(feature = "ndarray")]
    /// Convert `self` into an [`ndarray::Array2`].
    pub fn to_array(self) -> crate::errors::Result<Array2<T>> {
        Ok(Array2::from_shape_vec(
            (self.size.1, self.size.0),
            self.data,
        )?)
    }
}

pub type ByteBuffer = Buffer<u8>;

/// Allocate `len` zeroed values, reporting allocation failure as an error.
pub(crate) fn zeroed_vec<T: Zeroable + Clone>(len: usize) -> Result<Vec<T>> {
    let mut data = Vec::new();
    data.try_reserve_exact(len).map_err(|e| {
        GdalError::OutOfMemory(format!("cannot allocate {len} values: {e}"))
    })?;
    data.resize(len, T::zeroed());
    Ok(data)
}

#[cfg(feature = "ndarray")]
impl<T: GdalType> TryFrom<Buffer<T>> for Array2<T> {
    type Error = crate::errors::GdalError;

    fn try_from(value: Buffer<T>) -> std::result::Result<Self, Self::Error> {
        value.to_array()
    }
}

#[cfg(feature = "ndarray")]
impl<T: GdalType + Copy> From<Array2<T>> for Buffer<T> {
    fn from(value: Array2<T>) -> Self {
        // (rows, cols)
        let shape = value.shape();
        let (rows, cols) = (shape[0], shape[1]);
        let data = value
            .as_standard_layout()
            .iter()
            .copied()
            .collect::<Vec<T>>();
        Buffer::new((cols, rows), data)
    }
}
