//! Word copies with data type conversion.
//!
//! Every conversion between two [`GdalDataType`]s is a monomorphised
//! [`CopyFn`] looked up in a table indexed by `(source, destination)`, so the
//! raster I/O engine and the hyperslab engine share one conversion matrix.
//!
//! Conversion rules:
//! * narrowing integer conversions clamp to the destination range,
//! * floating point to integer rounds half to even, then clamps (NaN gives 0),
//! * finite `Float64` values outside the `Float32` range clamp to `±f32::MAX`,
//! * complex to real drops the imaginary part, real to complex zeroes it.

use std::ptr;

use crate::errors::{GdalError, Result};
use crate::raster::types::{Complex, GdalDataType};

#[derive(Copy, Clone, Debug, PartialEq)]
pub(crate) enum Real {
    Int(i64),
    UInt(u64),
    Float(f64),
}

impl Real {
    pub(crate) fn as_f64(self) -> f64 {
        match self {
            Real::Int(v) => v as f64,
            Real::UInt(v) => v as f64,
            Real::Float(v) => v,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub(crate) struct Scalar {
    pub re: Real,
    pub im: f64,
}

impl Scalar {
    pub(crate) fn real(re: Real) -> Self {
        Scalar { re, im: 0.0 }
    }
}

/// A value that can be loaded from and stored to raw pixel memory.
pub(crate) trait Element: Copy + 'static {
    fn to_scalar(self) -> Scalar;
    fn from_scalar(s: Scalar) -> Self;
}

macro_rules! int_element {
    ($($t:ty => $variant:ident as $wide:ty),* $(,)?) => {
        $(
            impl Element for $t {
                #[inline]
                fn to_scalar(self) -> Scalar {
                    Scalar::real(Real::$variant(self as $wide))
                }

                #[inline]
                fn from_scalar(s: Scalar) -> Self {
                    match s.re {
                        Real::Int(v) => (v as i128).clamp(<$t>::MIN as i128, <$t>::MAX as i128) as $t,
                        Real::UInt(v) => (v as i128).clamp(<$t>::MIN as i128, <$t>::MAX as i128) as $t,
                        // `as` saturates and maps NaN to 0
                        Real::Float(v) => v.round_ties_even() as $t,
                    }
                }
            }
        )*
    };
}

int_element!(
    u8 => UInt as u64,
    u16 => UInt as u64,
    u32 => UInt as u64,
    u64 => UInt as u64,
    i8 => Int as i64,
    i16 => Int as i64,
    i32 => Int as i64,
    i64 => Int as i64,
);

impl Element for f32 {
    #[inline]
    fn to_scalar(self) -> Scalar {
        Scalar::real(Real::Float(self as f64))
    }

    #[inline]
    fn from_scalar(s: Scalar) -> Self {
        match s.re {
            Real::Int(v) => v as f32,
            Real::UInt(v) => v as f32,
            Real::Float(v) if v.is_finite() => v.clamp(-(f32::MAX as f64), f32::MAX as f64) as f32,
            Real::Float(v) => v as f32,
        }
    }
}

impl Element for f64 {
    #[inline]
    fn to_scalar(self) -> Scalar {
        Scalar::real(Real::Float(self))
    }

    #[inline]
    fn from_scalar(s: Scalar) -> Self {
        s.re.as_f64()
    }
}

macro_rules! complex_element {
    ($($t:ty),*) => {
        $(
            impl Element for Complex<$t> {
                #[inline]
                fn to_scalar(self) -> Scalar {
                    Scalar {
                        re: self.re.to_scalar().re,
                        im: self.im.to_scalar().re.as_f64(),
                    }
                }

                #[inline]
                fn from_scalar(s: Scalar) -> Self {
                    Complex {
                        re: <$t>::from_scalar(Scalar::real(s.re)),
                        im: <$t>::from_scalar(Scalar::real(Real::Float(s.im))),
                    }
                }
            }
        )*
    };
}

complex_element!(i16, i32, f32, f64);

/// Copy `count` words from `src` to `dst`, converting on the way.
///
/// Strides are in bytes and may be negative.
pub(crate) type CopyFn =
    unsafe fn(src: *const u8, src_stride: isize, dst: *mut u8, dst_stride: isize, count: usize);

unsafe fn copy_run<S: Element, D: Element>(
    src: *const u8,
    src_stride: isize,
    dst: *mut u8,
    dst_stride: isize,
    count: usize,
) {
    let mut s = src;
    let mut d = dst;
    for _ in 0..count {
        let value = ptr::read_unaligned(s as *const S);
        ptr::write_unaligned(d as *mut D, D::from_scalar(value.to_scalar()));
        s = s.wrapping_offset(src_stride);
        d = d.wrapping_offset(dst_stride);
    }
}

macro_rules! copy_table {
    (@rows [$($s:ty),*] $dsts:tt) => {
        [$(copy_table!(@row $s $dsts)),*]
    };
    (@row $s:ty [$($d:ty),*]) => {
        [$(copy_run::<$s, $d> as CopyFn),*]
    };
    ($($t:ty),* $(,)?) => {
        copy_table!(@rows [$($t),*] [$($t),*])
    };
}

// Rows and columns follow `GdalDataType::ALL`.
static COPY_TABLE: [[CopyFn; 14]; 14] = copy_table!(
    u8,
    u16,
    i16,
    u32,
    i32,
    f32,
    f64,
    Complex<i16>,
    Complex<i32>,
    Complex<f32>,
    Complex<f64>,
    u64,
    i64,
    i8,
);

pub(crate) fn copy_fn(src_type: GdalDataType, dst_type: GdalDataType) -> Option<CopyFn> {
    Some(COPY_TABLE[src_type.ordinal()?][dst_type.ordinal()?])
}

#[inline]
unsafe fn copy_strided<T: Copy>(
    src: *const u8,
    src_stride: isize,
    dst: *mut u8,
    dst_stride: isize,
    count: usize,
) {
    let mut s = src;
    let mut d = dst;
    for _ in 0..count {
        ptr::write_unaligned(d as *mut T, ptr::read_unaligned(s as *const T));
        s = s.wrapping_offset(src_stride);
        d = d.wrapping_offset(dst_stride);
    }
}

/// Copy `count` elements of `elem_size` bytes without conversion.
///
/// # Safety
/// Every addressed element must lie in valid memory, and the source and
/// destination runs may only overlap when both are contiguous.
pub(crate) unsafe fn copy_same_type(
    src: *const u8,
    src_stride: isize,
    dst: *mut u8,
    dst_stride: isize,
    elem_size: usize,
    count: usize,
) {
    if count == 0 {
        return;
    }
    let size = elem_size as isize;
    if src_stride == size && dst_stride == size {
        ptr::copy(src, dst, elem_size * count);
        return;
    }
    match elem_size {
        1 => copy_strided::<u8>(src, src_stride, dst, dst_stride, count),
        2 => copy_strided::<[u8; 2]>(src, src_stride, dst, dst_stride, count),
        4 => copy_strided::<[u8; 4]>(src, src_stride, dst, dst_stride, count),
        8 => copy_strided::<[u8; 8]>(src, src_stride, dst, dst_stride, count),
        16 => copy_strided::<[u8; 16]>(src, src_stride, dst, dst_stride, count),
        _ => {
            let mut s = src;
            let mut d = dst;
            for _ in 0..count {
                ptr::copy(s, d, elem_size);
                s = s.wrapping_offset(src_stride);
                d = d.wrapping_offset(dst_stride);
            }
        }
    }
}

/// Strided word copy with conversion over raw memory.
///
/// # Safety
/// Every addressed element must lie in valid memory. Both types must be known.
pub(crate) unsafe fn copy_words_raw(
    src: *const u8,
    src_type: GdalDataType,
    src_stride: isize,
    dst: *mut u8,
    dst_type: GdalDataType,
    dst_stride: isize,
    count: usize,
) {
    if src_type == dst_type {
        copy_same_type(src, src_stride, dst, dst_stride, src_type.size(), count);
    } else if let Some(f) = copy_fn(src_type, dst_type) {
        f(src, src_stride, dst, dst_stride, count);
    }
}

/// Split `count` pixel-interleaved pixels of `dsts.len()` bands into one
/// buffer per band, each packed with `dst_type` words.
///
/// # Safety
/// `src` must hold `count * dsts.len()` words of `src_type`, every destination
/// `count` words of `dst_type`.
pub(crate) unsafe fn deinterleave(
    src: *const u8,
    src_type: GdalDataType,
    dsts: &[*mut u8],
    dst_type: GdalDataType,
    count: usize,
) {
    let nbands = dsts.len();
    if src_type == dst_type {
        match (src_type.size(), nbands) {
            (1, 3) => return deinterleave_3::<u8>(src, dsts, count),
            (1, 4) => return deinterleave_4::<u8>(src, dsts, count),
            (2, 3) => return deinterleave_3::<[u8; 2]>(src, dsts, count),
            (2, 4) => return deinterleave_4::<[u8; 2]>(src, dsts, count),
            _ => {}
        }
    }
    let src_size = src_type.size() as isize;
    let dst_size = dst_type.size() as isize;
    for (b, dst) in dsts.iter().enumerate() {
        copy_words_raw(
            src.wrapping_offset(b as isize * src_size),
            src_type,
            src_size * nbands as isize,
            *dst,
            dst_type,
            dst_size,
            count,
        );
    }
}

unsafe fn deinterleave_3<T: Copy>(src: *const u8, dsts: &[*mut u8], count: usize) {
    let s = src as *const T;
    let (d0, d1, d2) = (dsts[0] as *mut T, dsts[1] as *mut T, dsts[2] as *mut T);
    for i in 0..count {
        ptr::write_unaligned(d0.add(i), ptr::read_unaligned(s.add(3 * i)));
        ptr::write_unaligned(d1.add(i), ptr::read_unaligned(s.add(3 * i + 1)));
        ptr::write_unaligned(d2.add(i), ptr::read_unaligned(s.add(3 * i + 2)));
    }
}

unsafe fn deinterleave_4<T: Copy>(src: *const u8, dsts: &[*mut u8], count: usize) {
    let s = src as *const T;
    for i in 0..count {
        for (b, dst) in dsts.iter().enumerate() {
            ptr::write_unaligned(
                (*dst as *mut T).add(i),
                ptr::read_unaligned(s.add(4 * i + b)),
            );
        }
    }
}

/// Load one word of `dtype` at `ptr` as a scalar.
///
/// # Safety
/// `ptr` must address `dtype.size()` readable bytes.
pub(crate) unsafe fn load_scalar(ptr: *const u8, dtype: GdalDataType) -> Scalar {
    let mut out = [0u8; 16];
    copy_words_raw(ptr, dtype, 0, out.as_mut_ptr(), GdalDataType::CFloat64, 0, 1);
    let c: Complex<f64> = ptr::read_unaligned(out.as_ptr() as *const Complex<f64>);
    match dtype {
        GdalDataType::UInt64 => Scalar::real(Real::UInt(ptr::read_unaligned(ptr as *const u64))),
        GdalDataType::Int64 => Scalar::real(Real::Int(ptr::read_unaligned(ptr as *const i64))),
        _ => Scalar {
            re: Real::Float(c.re),
            im: c.im,
        },
    }
}

/// Store a scalar as one word of `dtype` at `ptr`.
///
/// # Safety
/// `ptr` must address `dtype.size()` writable bytes.
pub(crate) unsafe fn store_scalar(ptr: *mut u8, dtype: GdalDataType, value: Scalar) {
    macro_rules! store {
        ($t:ty) => {
            ptr::write_unaligned(ptr as *mut $t, <$t>::from_scalar(value))
        };
    }
    match dtype {
        GdalDataType::Unknown => {}
        GdalDataType::UInt8 => store!(u8),
        GdalDataType::Int8 => store!(i8),
        GdalDataType::UInt16 => store!(u16),
        GdalDataType::Int16 => store!(i16),
        GdalDataType::UInt32 => store!(u32),
        GdalDataType::Int32 => store!(i32),
        GdalDataType::UInt64 => store!(u64),
        GdalDataType::Int64 => store!(i64),
        GdalDataType::Float32 => store!(f32),
        GdalDataType::Float64 => store!(f64),
        GdalDataType::CInt16 => store!(Complex<i16>),
        GdalDataType::CInt32 => store!(Complex<i32>),
        GdalDataType::CFloat32 => store!(Complex<f32>),
        GdalDataType::CFloat64 => store!(Complex<f64>),
    }
}

/// Read one word as `f64` (real part for complex types).
///
/// # Safety
/// See [`load_scalar`].
pub(crate) unsafe fn load_f64(ptr: *const u8, dtype: GdalDataType) -> f64 {
    load_scalar(ptr, dtype).re.as_f64()
}

/// Write `value` as one word of `dtype`.
///
/// # Safety
/// See [`store_scalar`].
pub(crate) unsafe fn store_f64(ptr: *mut u8, dtype: GdalDataType, value: f64) {
    store_scalar(ptr, dtype, Scalar::real(Real::Float(value)))
}

fn required_len(count: usize, stride: usize, elem_size: usize) -> Option<usize> {
    match count {
        0 => Some(0),
        n => (n - 1).checked_mul(stride)?.checked_add(elem_size),
    }
}

/// Copy `count` words between byte buffers, converting from `src_type` to
/// `dst_type`.
///
/// Strides are in bytes. Fails when either type is unknown or when a buffer is
/// too short for the requested words.
///
/// # Example
///
/// ```
/// use gdal_mem::raster::{copy_words, GdalDataType};
///
/// let src: Vec<u8> = [100u16, 1000, 70000u32 as u16]
///     .iter()
///     .flat_map(|v| v.to_ne_bytes())
///     .collect();
/// let mut dst = [0u8; 3];
/// copy_words(&src, GdalDataType::UInt16, 2, &mut dst, GdalDataType::UInt8, 1, 3).unwrap();
/// assert_eq!(dst, [100, 255, 255]);
/// ```
pub fn copy_words(
    src: &[u8],
    src_type: GdalDataType,
    src_stride: usize,
    dst: &mut [u8],
    dst_type: GdalDataType,
    dst_stride: usize,
    count: usize,
) -> Result<()> {
    let src_size = src_type.checked_size()?;
    let dst_size = dst_type.checked_size()?;
    let src_len = required_len(count, src_stride, src_size)
        .ok_or_else(|| GdalError::OutOfMemory("source extent overflows".to_string()))?;
    let dst_len = required_len(count, dst_stride, dst_size)
        .ok_or_else(|| GdalError::OutOfMemory("destination extent overflows".to_string()))?;
    if src.len() < src_len || dst.len() < dst_len {
        return Err(GdalError::BadArgument(format!(
            "buffers too small for {count} words: need {src_len}/{dst_len} bytes, got {}/{}",
            src.len(),
            dst.len()
        )));
    }
    // SAFETY: both extents were checked above and the slices cannot overlap.
    unsafe {
        copy_words_raw(
            src.as_ptr(),
            src_type,
            src_stride as isize,
            dst.as_mut_ptr(),
            dst_type,
            dst_stride as isize,
            count,
        );
    }
    Ok(())
}
