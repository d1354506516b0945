//! Pixel buffers backing raster bands.
//!
//! A [`PixelStorage`] is one allocation, either owned by the crate or
//! provided by the caller. Bands look at it through a [`PixelView`]: an
//! origin and two byte strides. Several views may share a storage (pixel
//! interleaved bands, read-only clones).

use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::errors::{GdalError, Result};
use crate::raster::GdalDataType;

pub(crate) struct PixelStorage {
    data: NonNull<u8>,
    /// Length of the owned allocation, `None` for caller memory.
    owned_len: Option<usize>,
    /// Number of live read-only views.
    readers: AtomicUsize,
}

// SAFETY: the storage is plain bytes. Writers go through `PixelView`, which
// refuses to write while read-only views exist.
unsafe impl Send for PixelStorage {}
unsafe impl Sync for PixelStorage {}

impl PixelStorage {
    /// Allocate `len` zeroed bytes.
    pub(crate) fn allocate(len: usize) -> Result<Arc<PixelStorage>> {
        if len > isize::MAX as usize {
            return Err(GdalError::OutOfMemory(format!(
                "cannot allocate {len} bytes"
            )));
        }
        let mut bytes: Vec<u8> = Vec::new();
        bytes
            .try_reserve_exact(len)
            .map_err(|e| GdalError::OutOfMemory(format!("cannot allocate {len} bytes: {e}")))?;
        bytes.resize(len, 0);
        let boxed = bytes.into_boxed_slice();
        let data = NonNull::new(Box::into_raw(boxed) as *mut u8).unwrap_or(NonNull::dangling());
        Ok(Arc::new(PixelStorage {
            data,
            owned_len: Some(len),
            readers: AtomicUsize::new(0),
        }))
    }

    /// Wrap caller memory.
    ///
    /// # Safety
    /// The memory must outlive every view built on the storage.
    pub(crate) unsafe fn external(data: NonNull<u8>) -> Arc<PixelStorage> {
        Arc::new(PixelStorage {
            data,
            owned_len: None,
            readers: AtomicUsize::new(0),
        })
    }

    pub(crate) fn as_ptr(&self) -> *mut u8 {
        self.data.as_ptr()
    }

    pub(crate) fn readers(&self) -> usize {
        self.readers.load(Ordering::Acquire)
    }
}

impl Drop for PixelStorage {
    fn drop(&mut self) {
        if let Some(len) = self.owned_len {
            // SAFETY: built from a boxed slice of exactly `len` bytes in `allocate`.
            unsafe {
                drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                    self.data.as_ptr(),
                    len,
                )));
            }
        }
    }
}

/// Registers a read-only view on a storage for as long as it lives.
pub(crate) struct ReaderGuard {
    storage: Arc<PixelStorage>,
}

impl ReaderGuard {
    fn new(storage: &Arc<PixelStorage>) -> Self {
        storage.readers.fetch_add(1, Ordering::AcqRel);
        ReaderGuard {
            storage: storage.clone(),
        }
    }
}

impl Drop for ReaderGuard {
    fn drop(&mut self) {
        self.storage.readers.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A 2-D strided window over a [`PixelStorage`].
///
/// For every pixel `(x, y)` inside `size`, `origin + y * line_stride +
/// x * pixel_stride` addresses one word of `data_type` in the storage.
pub(crate) struct PixelView {
    storage: Arc<PixelStorage>,
    /// Byte offset of pixel (0, 0) from the storage base.
    offset: isize,
    pub(crate) data_type: GdalDataType,
    pub(crate) size: (usize, usize),
    pub(crate) pixel_stride: isize,
    pub(crate) line_stride: isize,
    owns_buffer: bool,
    reader: Option<ReaderGuard>,
}

impl PixelView {
    /// A packed view owning a fresh zeroed allocation.
    pub(crate) fn allocate(data_type: GdalDataType, size: (usize, usize)) -> Result<PixelView> {
        let elem_size = data_type.checked_size()?;
        let len = size
            .0
            .checked_mul(size.1)
            .and_then(|n| n.checked_mul(elem_size))
            .ok_or_else(|| {
                GdalError::OutOfMemory(format!(
                    "{}x{} band of {data_type} overflows",
                    size.0, size.1
                ))
            })?;
        let storage = PixelStorage::allocate(len)?;
        Ok(PixelView {
            storage,
            offset: 0,
            data_type,
            size,
            pixel_stride: elem_size as isize,
            line_stride: (elem_size * size.0) as isize,
            owns_buffer: true,
            reader: None,
        })
    }

    /// A view over a storage that already exists. `offset` is the byte
    /// offset of pixel (0, 0).
    ///
    /// For owned storages every addressed pixel must fall inside the
    /// allocation; caller memory cannot be checked.
    pub(crate) fn over(
        storage: Arc<PixelStorage>,
        offset: isize,
        data_type: GdalDataType,
        size: (usize, usize),
        pixel_stride: isize,
        line_stride: isize,
        owns_buffer: bool,
    ) -> Result<PixelView> {
        let elem_size = data_type.checked_size()?;
        if let Some(len) = storage.owned_len {
            let (lo, hi) = view_extent(offset, size, pixel_stride, line_stride, elem_size)
                .ok_or_else(|| GdalError::BadArgument("band extent overflows".to_string()))?;
            if size.0 > 0 && size.1 > 0 && (lo < 0 || hi > len as isize) {
                return Err(GdalError::BadArgument(format!(
                    "band addresses bytes [{lo}, {hi}) outside a buffer of {len} bytes"
                )));
            }
        }
        Ok(PixelView {
            storage,
            offset,
            data_type,
            size,
            pixel_stride,
            line_stride,
            owns_buffer,
            reader: None,
        })
    }

    /// A non-owning view over the same pixels that refuses writes, and blocks
    /// writes through every other view for as long as it lives.
    pub(crate) fn read_only_clone(&self) -> PixelView {
        PixelView {
            storage: self.storage.clone(),
            offset: self.offset,
            data_type: self.data_type,
            size: self.size,
            pixel_stride: self.pixel_stride,
            line_stride: self.line_stride,
            owns_buffer: false,
            reader: Some(ReaderGuard::new(&self.storage)),
        }
    }

    pub(crate) fn storage(&self) -> &Arc<PixelStorage> {
        &self.storage
    }

    pub(crate) fn owns_buffer(&self) -> bool {
        self.owns_buffer
    }

    pub(crate) fn is_read_only(&self) -> bool {
        self.reader.is_some()
    }

    pub(crate) fn shares_storage(&self, other: &PixelView) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    pub(crate) fn elem_size(&self) -> usize {
        self.data_type.size()
    }

    pub(crate) fn check_writable(&self) -> Result<()> {
        if self.reader.is_some() {
            return Err(GdalError::ReadOnly(
                "band of a read-only clone".to_string(),
            ));
        }
        match self.storage.readers() {
            0 => Ok(()),
            n => Err(GdalError::ReadOnly(format!(
                "pixel buffer is shared with {n} read-only clone(s)"
            ))),
        }
    }

    /// Address of pixel (0, 0).
    pub(crate) fn origin(&self) -> *mut u8 {
        self.storage.as_ptr().wrapping_offset(self.offset)
    }

    /// Address of pixel `(x, y)`.
    pub(crate) fn pixel_ptr(&self, x: usize, y: usize) -> *mut u8 {
        self.origin()
            .wrapping_offset(y as isize * self.line_stride + x as isize * self.pixel_stride)
    }

    /// Whether lines are runs of packed words.
    pub(crate) fn is_packed_line(&self) -> bool {
        self.pixel_stride == self.elem_size() as isize
    }
}

/// Lowest and one-past-highest byte touched by a view, relative to the
/// storage base.
fn view_extent(
    offset: isize,
    size: (usize, usize),
    pixel_stride: isize,
    line_stride: isize,
    elem_size: usize,
) -> Option<(isize, isize)> {
    let mut lo = offset;
    let mut hi = offset;
    for (n, stride) in [(size.0, pixel_stride), (size.1, line_stride)] {
        if n == 0 {
            continue;
        }
        let span = isize::try_from(n - 1).ok()?.checked_mul(stride)?;
        if span < 0 {
            lo = lo.checked_add(span)?;
        } else {
            hi = hi.checked_add(span)?;
        }
    }
    Some((lo, hi.checked_add(elem_size as isize)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_allocation() {
        let view = PixelView::allocate(GdalDataType::UInt16, (3, 2)).unwrap();
        assert_eq!(view.pixel_stride, 2);
        assert_eq!(view.line_stride, 6);
        assert!(view.owns_buffer());
        assert_eq!(view.pixel_ptr(1, 1) as usize - view.origin() as usize, 8);
    }

    #[test]
    fn interleaved_views_share_storage() {
        let base = PixelView::allocate(GdalDataType::UInt8, (2 * 3, 1)).unwrap();
        let second = PixelView::over(
            base.storage().clone(),
            1,
            GdalDataType::UInt8,
            (2, 1),
            3,
            6,
            false,
        )
        .unwrap();
        assert!(second.shares_storage(&base));
        assert!(!second.owns_buffer());
        assert_eq!(second.origin() as usize, base.origin() as usize + 1);
    }

    #[test]
    fn view_outside_allocation() {
        let base = PixelView::allocate(GdalDataType::UInt8, (4, 1)).unwrap();
        let res = PixelView::over(
            base.storage().clone(),
            2,
            GdalDataType::UInt8,
            (4, 1),
            1,
            4,
            false,
        );
        assert!(matches!(res, Err(GdalError::BadArgument(_))));
    }

    #[test]
    fn readers_block_writes() {
        let view = PixelView::allocate(GdalDataType::UInt8, (2, 2)).unwrap();
        assert!(view.check_writable().is_ok());
        {
            let clone = view.read_only_clone();
            assert!(clone.is_read_only());
            assert!(matches!(clone.check_writable(), Err(GdalError::ReadOnly(_))));
            assert!(matches!(view.check_writable(), Err(GdalError::ReadOnly(_))));
        }
        assert!(view.check_writable().is_ok());
    }
}
