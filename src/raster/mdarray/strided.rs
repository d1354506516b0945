//! N-dimensional strided buffers and the hyperslab copy engine.

use std::ptr::NonNull;

use crate::errors::{GdalError, Result};
use crate::raster::convert;
use crate::raster::mdarray::datatype::{self, ExtendedDataType, ExtendedDataTypeClass};

enum Storage {
    Owned(Vec<u8>),
    External { ptr: NonNull<u8>, len: usize },
}

/// An N-dimensional array of elements addressed through per-dimension byte
/// strides.
///
/// Every addressable element lies inside the storage, which is at most
/// `isize::MAX` bytes long. Owned storage is packed with the last dimension
/// varying fastest.
pub(crate) struct StridedBuffer {
    storage: Storage,
    data_type: ExtendedDataType,
    dims: Vec<usize>,
    strides: Vec<isize>,
}

// SAFETY: owned storage is a plain `Vec`. External storage is only accepted
// through `from_external`, whose contract makes the caller guarantee the memory
// stays valid and is not accessed concurrently through another path.
unsafe impl Send for StridedBuffer {}

fn checked_total(dims: &[usize], elem_size: usize) -> Result<usize> {
    let mut total = elem_size;
    for (i, &d) in dims.iter().enumerate() {
        if d == 0 {
            return Err(GdalError::BadArgument(format!(
                "dimension {i} has a size of 0"
            )));
        }
        total = total
            .checked_mul(d)
            .ok_or_else(|| GdalError::OutOfMemory("array size overflows".to_string()))?;
    }
    if total > isize::MAX as usize {
        return Err(GdalError::OutOfMemory(format!(
            "array of {total} bytes is too large"
        )));
    }
    Ok(total)
}

pub(crate) fn packed_strides(dims: &[usize], elem_size: usize) -> Vec<isize> {
    let mut strides = vec![0isize; dims.len()];
    let mut acc = elem_size as isize;
    for i in (0..dims.len()).rev() {
        strides[i] = acc;
        acc = acc.wrapping_mul(dims[i] as isize);
    }
    strides
}

/// Byte span `[lo, hi)` covered by a strided region, relative to its first
/// element.
fn extent(count: &[usize], strides: &[isize], elem_size: usize) -> Option<(isize, isize)> {
    let mut lo = 0isize;
    let mut hi = 0isize;
    for (&c, &s) in count.iter().zip(strides) {
        let reach = (c.checked_sub(1)? as isize).checked_mul(s)?;
        if reach < 0 {
            lo = lo.checked_add(reach)?;
        } else {
            hi = hi.checked_add(reach)?;
        }
    }
    Some((lo, hi.checked_add(elem_size as isize)?))
}

/// Layout of a caller buffer holding a hyperslab.
pub(crate) struct BufferLayout {
    /// Byte offset of the first element from the start of the buffer.
    pub first: usize,
    /// Bytes needed.
    pub len: usize,
    /// Byte strides.
    pub strides: Vec<isize>,
}

/// Validate a caller buffer layout, with strides counted in elements.
pub(crate) fn buffer_layout(
    count: &[usize],
    buffer_stride: Option<&[isize]>,
    elem_size: usize,
) -> Result<BufferLayout> {
    let strides: Vec<isize> = match buffer_stride {
        Some(s) => {
            if s.len() != count.len() {
                return Err(GdalError::BadArgument(format!(
                    "expected {} buffer strides, got {}",
                    count.len(),
                    s.len()
                )));
            }
            s.iter()
                .map(|&v| v.checked_mul(elem_size as isize))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| GdalError::BadArgument("buffer stride overflows".to_string()))?
        }
        None => {
            checked_total(count, elem_size)?;
            packed_strides(count, elem_size)
        }
    };
    let (lo, hi) = extent(count, &strides, elem_size)
        .ok_or_else(|| GdalError::BadArgument("buffer extent overflows".to_string()))?;
    Ok(BufferLayout {
        first: (-lo) as usize,
        len: (hi - lo) as usize,
        strides,
    })
}

#[derive(Copy, Clone)]
enum Run {
    Same { elem_size: usize },
    Words(crate::raster::GdalDataType, crate::raster::GdalDataType),
    Generic,
}

/// One side of a hyperslab copy.
struct Side<'a> {
    base: *mut u8,
    strides: &'a [isize],
    data_type: &'a ExtendedDataType,
}

struct Copier<'a> {
    run: Run,
    src_type: &'a ExtendedDataType,
    dst_type: &'a ExtendedDataType,
    free_dst: bool,
}

impl Copier<'_> {
    #[inline]
    unsafe fn run(&self, src: *const u8, ss: isize, dst: *mut u8, ds: isize, n: usize) {
        match self.run {
            Run::Same { elem_size } => convert::copy_same_type(src, ss, dst, ds, elem_size, n),
            Run::Words(st, dt) => convert::copy_words_raw(src, st, ss, dst, dt, ds, n),
            Run::Generic => {
                let mut s = src;
                let mut d = dst;
                for _ in 0..n {
                    if self.free_dst {
                        datatype::free_value(d, self.dst_type);
                    }
                    datatype::copy_value(s, self.src_type, d, self.dst_type);
                    s = s.wrapping_offset(ss);
                    d = d.wrapping_offset(ds);
                }
            }
        }
    }
}

/// Copy a `count` shaped region from `src` to `dst`.
///
/// Ranks 1 to 3 use dedicated loops; deeper shapes walk an explicit odometer
/// so the call stack does not grow with the rank.
unsafe fn copy_region(src: &Side, dst: &Side, count: &[usize], free_dst: bool) {
    let run = if src.data_type == dst.data_type && !src.data_type.needs_free_dynamic_memory() {
        Run::Same {
            elem_size: src.data_type.size(),
        }
    } else if src.data_type.class() == ExtendedDataTypeClass::Numeric
        && dst.data_type.class() == ExtendedDataTypeClass::Numeric
    {
        Run::Words(
            src.data_type.numeric_datatype(),
            dst.data_type.numeric_datatype(),
        )
    } else {
        Run::Generic
    };
    let copier = Copier {
        run,
        src_type: src.data_type,
        dst_type: dst.data_type,
        free_dst,
    };
    let (ss, ds) = (src.strides, dst.strides);
    let (s0, d0) = (src.base as *const u8, dst.base);

    match count.len() {
        0 => copier.run(s0, 0, d0, 0, 1),
        1 => copier.run(s0, ss[0], d0, ds[0], count[0]),
        2 => {
            let (mut s, mut d) = (s0, d0);
            for _ in 0..count[0] {
                copier.run(s, ss[1], d, ds[1], count[1]);
                s = s.wrapping_offset(ss[0]);
                d = d.wrapping_offset(ds[0]);
            }
        }
        3 => {
            let (mut s, mut d) = (s0, d0);
            for _ in 0..count[0] {
                let (mut s1, mut d1) = (s, d);
                for _ in 0..count[1] {
                    copier.run(s1, ss[2], d1, ds[2], count[2]);
                    s1 = s1.wrapping_offset(ss[1]);
                    d1 = d1.wrapping_offset(ds[1]);
                }
                s = s.wrapping_offset(ss[0]);
                d = d.wrapping_offset(ds[0]);
            }
        }
        rank => {
            let last = rank - 1;
            let mut index = vec![0usize; last];
            let (mut s, mut d) = (s0, d0);
            loop {
                copier.run(s, ss[last], d, ds[last], count[last]);
                let mut dim = last;
                loop {
                    if dim == 0 {
                        return;
                    }
                    dim -= 1;
                    index[dim] += 1;
                    s = s.wrapping_offset(ss[dim]);
                    d = d.wrapping_offset(ds[dim]);
                    if index[dim] < count[dim] {
                        break;
                    }
                    let back = count[dim] as isize;
                    s = s.wrapping_offset(-back * ss[dim]);
                    d = d.wrapping_offset(-back * ds[dim]);
                    index[dim] = 0;
                }
            }
        }
    }
}

impl StridedBuffer {
    /// Allocate a zero-filled packed buffer.
    pub(crate) fn new(dims: &[usize], data_type: ExtendedDataType) -> Result<Self> {
        let elem_size = data_type.size();
        if elem_size == 0 {
            return Err(GdalError::BadArgument(format!(
                "data type {data_type} has no size"
            )));
        }
        let total = checked_total(dims, elem_size)?;
        let mut data = Vec::new();
        data.try_reserve_exact(total)
            .map_err(|e| GdalError::OutOfMemory(format!("cannot allocate {total} bytes: {e}")))?;
        data.resize(total, 0);
        Ok(Self {
            strides: packed_strides(dims, elem_size),
            storage: Storage::Owned(data),
            data_type,
            dims: dims.to_vec(),
        })
    }

    /// Wrap caller memory without taking ownership.
    ///
    /// # Safety
    /// `ptr` must be valid for reads and writes of `len` bytes for as long as
    /// the buffer lives, and must not be accessed through other paths
    /// concurrently. String elements, if any, must be empty or valid slots.
    pub(crate) unsafe fn from_external(
        ptr: NonNull<u8>,
        len: usize,
        dims: &[usize],
        data_type: ExtendedDataType,
        strides: Option<&[isize]>,
    ) -> Result<Self> {
        let elem_size = data_type.size();
        let packed = checked_total(dims, elem_size)?;
        if len > isize::MAX as usize {
            return Err(GdalError::BadArgument(format!(
                "external buffer of {len} bytes is too large"
            )));
        }
        let strides = match strides {
            Some(s) if s.len() == dims.len() => s.to_vec(),
            Some(s) => {
                return Err(GdalError::BadArgument(format!(
                    "expected {} strides, got {}",
                    dims.len(),
                    s.len()
                )))
            }
            None => packed_strides(dims, elem_size),
        };
        let (lo, hi) = extent(dims, &strides, elem_size)
            .ok_or_else(|| GdalError::BadArgument("stride extent overflows".to_string()))?;
        if lo < 0 || hi as usize > len || (strides.is_empty() && packed > len) {
            return Err(GdalError::BadArgument(format!(
                "strides address bytes [{lo}, {hi}) outside of a {len} byte buffer"
            )));
        }
        Ok(Self {
            storage: Storage::External { ptr, len },
            data_type,
            dims: dims.to_vec(),
            strides,
        })
    }

    pub(crate) fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub(crate) fn strides(&self) -> &[isize] {
        &self.strides
    }

    pub(crate) fn data_type(&self) -> &ExtendedDataType {
        &self.data_type
    }

    pub(crate) fn owns_buffer(&self) -> bool {
        matches!(self.storage, Storage::Owned(_))
    }

    pub(crate) fn total_bytes(&self) -> usize {
        match &self.storage {
            Storage::Owned(v) => v.len(),
            Storage::External { len, .. } => *len,
        }
    }

    pub(crate) fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }

    fn base(&self) -> *mut u8 {
        match &self.storage {
            Storage::Owned(v) => v.as_ptr() as *mut u8,
            Storage::External { ptr, .. } => ptr.as_ptr(),
        }
    }

    /// Raw pointer to the first element.
    pub(crate) fn as_ptr(&self) -> *const u8 {
        self.base()
    }

    /// Check a hyperslab against the array shape.
    pub(crate) fn check_hyperslab(
        &self,
        start: &[u64],
        count: &[usize],
        step: &[i64],
    ) -> Result<()> {
        let rank = self.dims.len();
        if start.len() != rank || count.len() != rank || step.len() != rank {
            return Err(GdalError::BadArgument(format!(
                "hyperslab must have {rank} values per parameter"
            )));
        }
        for i in 0..rank {
            let dim = self.dims[i] as i128;
            if count[i] == 0 {
                return Err(GdalError::BadArgument(format!("count[{i}] is 0")));
            }
            let first = start[i] as i128;
            let last = first + (count[i] as i128 - 1) * step[i] as i128;
            if first >= dim || last < 0 || last >= dim {
                return Err(GdalError::BadArgument(format!(
                    "hyperslab is out of bounds along dimension {i} of size {dim}"
                )));
            }
        }
        Ok(())
    }

    fn slab_origin(&self, start: &[u64], step: &[i64]) -> (*mut u8, Vec<isize>) {
        let mut offset = 0isize;
        let mut strides = Vec::with_capacity(self.dims.len());
        for i in 0..self.dims.len() {
            offset += start[i] as isize * self.strides[i];
            strides.push(step[i] as isize * self.strides[i]);
        }
        (self.base().wrapping_offset(offset), strides)
    }

    /// Copy a hyperslab out of the array.
    ///
    /// # Safety
    /// The hyperslab must have passed [`check_hyperslab`](Self::check_hyperslab)
    /// and `buf` must address the first element of a region laid out with
    /// `buf_strides` (bytes) that is valid for writes. Destination string slots
    /// are overwritten without being released.
    pub(crate) unsafe fn read(
        &self,
        start: &[u64],
        count: &[usize],
        step: &[i64],
        buf_strides: &[isize],
        buf_type: &ExtendedDataType,
        buf: *mut u8,
    ) {
        let (origin, strides) = self.slab_origin(start, step);
        copy_region(
            &Side {
                base: origin,
                strides: &strides,
                data_type: &self.data_type,
            },
            &Side {
                base: buf,
                strides: buf_strides,
                data_type: buf_type,
            },
            count,
            false,
        );
    }

    /// Copy a hyperslab into the array.
    ///
    /// # Safety
    /// Same as [`read`](Self::read), with `buf` valid for reads.
    pub(crate) unsafe fn write(
        &mut self,
        start: &[u64],
        count: &[usize],
        step: &[i64],
        buf_strides: &[isize],
        buf_type: &ExtendedDataType,
        buf: *const u8,
    ) {
        let (origin, strides) = self.slab_origin(start, step);
        copy_region(
            &Side {
                base: buf as *mut u8,
                strides: buf_strides,
                data_type: buf_type,
            },
            &Side {
                base: origin,
                strides: &strides,
                data_type: &self.data_type,
            },
            count,
            true,
        );
    }

    /// Read a hyperslab into `out`, validating the request first.
    ///
    /// `buffer_stride` is counted in elements of `buf_type`. When `buf_type`
    /// is a string type, `out` receives owned string slots that the caller
    /// must release.
    pub(crate) fn read_checked(
        &self,
        start: &[u64],
        count: &[usize],
        step: Option<&[i64]>,
        buffer_stride: Option<&[isize]>,
        buf_type: &ExtendedDataType,
        out: &mut [u8],
    ) -> Result<()> {
        if !self.data_type.can_convert_to(buf_type) {
            return Err(GdalError::TypeMismatch {
                from: self.data_type.to_string(),
                to: buf_type.to_string(),
            });
        }
        let step = step.map_or_else(|| vec![1; count.len()], <[i64]>::to_vec);
        self.check_hyperslab(start, count, &step)?;
        let layout = buffer_layout(count, buffer_stride, buf_type.size())?;
        if out.len() < layout.len {
            return Err(GdalError::BadArgument(format!(
                "buffer of {} bytes is too small, {} bytes needed",
                out.len(),
                layout.len
            )));
        }
        // SAFETY: the hyperslab is in range and the buffer extent was checked.
        unsafe {
            self.read(
                start,
                count,
                &step,
                &layout.strides,
                buf_type,
                out.as_mut_ptr().add(layout.first),
            );
        }
        Ok(())
    }

    /// Write a hyperslab from `data`, validating the request first.
    pub(crate) fn write_checked(
        &mut self,
        start: &[u64],
        count: &[usize],
        step: Option<&[i64]>,
        buffer_stride: Option<&[isize]>,
        buf_type: &ExtendedDataType,
        data: &[u8],
    ) -> Result<()> {
        if !buf_type.can_convert_to(&self.data_type) {
            return Err(GdalError::TypeMismatch {
                from: buf_type.to_string(),
                to: self.data_type.to_string(),
            });
        }
        let step = step.map_or_else(|| vec![1; count.len()], <[i64]>::to_vec);
        self.check_hyperslab(start, count, &step)?;
        let layout = buffer_layout(count, buffer_stride, buf_type.size())?;
        if data.len() < layout.len {
            return Err(GdalError::BadArgument(format!(
                "buffer of {} bytes is too small, {} bytes needed",
                data.len(),
                layout.len
            )));
        }
        // SAFETY: as in `read_checked`.
        unsafe {
            self.write(
                start,
                count,
                &step,
                &layout.strides,
                buf_type,
                data.as_ptr().add(layout.first),
            );
        }
        Ok(())
    }

    /// Release the dynamic memory of every element whose index along the
    /// first dimension is at least `from`.
    fn free_elements_from(&mut self, from: usize) {
        if !self.data_type.needs_free_dynamic_memory() || self.dims.is_empty() {
            return;
        }
        let base = self.base();
        let mut count = self.dims.clone();
        if from >= count[0] {
            return;
        }
        count[0] -= from;
        let inner: usize = count[1..].iter().product();
        let elem_size = self.data_type.size();
        // SAFETY: owned storage is packed, so the tail is contiguous.
        unsafe {
            let mut p = base.add(from * self.strides[0] as usize);
            for _ in 0..count[0] * inner {
                datatype::free_value(p, &self.data_type);
                p = p.add(elem_size);
            }
        }
    }

    /// Change the shape, keeping the values in the overlapping region and
    /// zero-filling new elements. Only owned buffers can be resized.
    pub(crate) fn resize(&mut self, new_dims: &[usize]) -> Result<()> {
        if !self.owns_buffer() {
            return Err(GdalError::ReadOnly(
                "cannot resize an array that does not own its memory".to_string(),
            ));
        }
        if new_dims.len() != self.dims.len() {
            return Err(GdalError::BadArgument(format!(
                "expected {} dimension sizes, got {}",
                self.dims.len(),
                new_dims.len()
            )));
        }
        let elem_size = self.data_type.size();
        let new_total = checked_total(new_dims, elem_size)?;
        if new_dims == self.dims.as_slice() {
            return Ok(());
        }
        let same_inner = new_dims[1..] == self.dims[1..];

        if same_inner && new_dims[0] <= self.dims[0] {
            self.free_elements_from(new_dims[0]);
            if let Storage::Owned(v) = &mut self.storage {
                v.truncate(new_total);
                v.shrink_to_fit();
            }
            self.dims[0] = new_dims[0];
            return Ok(());
        }
        if same_inner {
            if let Storage::Owned(v) = &mut self.storage {
                v.try_reserve_exact(new_total - v.len()).map_err(|e| {
                    GdalError::OutOfMemory(format!("cannot allocate {new_total} bytes: {e}"))
                })?;
                v.resize(new_total, 0);
            }
            self.dims[0] = new_dims[0];
            return Ok(());
        }

        let mut resized = StridedBuffer::new(new_dims, self.data_type.clone())?;
        let overlap: Vec<usize> = self
            .dims
            .iter()
            .zip(new_dims)
            .map(|(&a, &b)| a.min(b))
            .collect();
        let start = vec![0u64; overlap.len()];
        let step = vec![1i64; overlap.len()];
        // SAFETY: the overlap fits both shapes, and the fresh buffer holds only
        // empty string slots.
        unsafe {
            resized.write(
                &start,
                &overlap,
                &step,
                &self.strides,
                &self.data_type,
                self.base(),
            );
        }
        *self = resized;
        Ok(())
    }
}

impl Drop for StridedBuffer {
    fn drop(&mut self) {
        if self.owns_buffer() {
            self.free_elements_from(0);
        }
    }
}
