use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::errors::{GdalError, Result};
use crate::raster::convert::{self, Real, Scalar};
use crate::raster::GdalDataType;

/// Resampling algorithms for overviews and for raster I/O where the buffer
/// size differs from the window size.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum ResampleAlg {
    /// Nearest neighbour
    #[default]
    NearestNeighbour,
    /// Bilinear (2x2 kernel)
    Bilinear,
    /// Cubic Convolution Approximation (4x4 kernel)
    Cubic,
    /// Cubic B-Spline Approximation (4x4 kernel)
    CubicSpline,
    /// Lanczos windowed sinc interpolation (6x6 kernel)
    Lanczos,
    /// Average of all valid contributing pixels
    Average,
    /// Selects the value which appears most often of all the sampled points
    Mode,
    /// Gauss blurring
    Gauss,
}

impl ResampleAlg {
    /// The name used in overview building, such as `NEAREST`.
    pub fn to_gdal_str(&self) -> &'static str {
        match self {
            ResampleAlg::NearestNeighbour => "NEAREST",
            ResampleAlg::Bilinear => "BILINEAR",
            ResampleAlg::Cubic => "CUBIC",
            ResampleAlg::CubicSpline => "CUBICSPLINE",
            ResampleAlg::Lanczos => "LANCZOS",
            ResampleAlg::Average => "AVERAGE",
            ResampleAlg::Mode => "MODE",
            ResampleAlg::Gauss => "GAUSS",
        }
    }

    /// Get an iterator over all the valid enum values.
    pub fn iter() -> impl Iterator<Item = ResampleAlg> {
        use ResampleAlg::*;
        [
            NearestNeighbour,
            Bilinear,
            Cubic,
            CubicSpline,
            Lanczos,
            Average,
            Mode,
            Gauss,
        ]
        .into_iter()
    }

    /// Whether multiple overview levels are better computed each from the
    /// previous one than all from the full resolution band.
    pub fn benefits_from_cascading(&self) -> bool {
        matches!(
            self,
            ResampleAlg::Average
                | ResampleAlg::Gauss
                | ResampleAlg::Cubic
                | ResampleAlg::CubicSpline
                | ResampleAlg::Lanczos
                | ResampleAlg::Bilinear
        )
    }
}

impl Display for ResampleAlg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_gdal_str())
    }
}

impl FromStr for ResampleAlg {
    type Err = GdalError;

    fn from_str(s: &str) -> Result<Self> {
        ResampleAlg::iter()
            .find(|alg| alg.to_gdal_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| GdalError::BadArgument(format!("{s} is not a valid resample algorithm")))
    }
}

/// A packed, row-major grid of pixels handed to a [`Resampler`].
#[derive(Debug, Clone, Copy)]
pub struct ResampleSource<'a> {
    pub data: &'a [u8],
    pub data_type: GdalDataType,
    /// (cols, rows)
    pub size: (usize, usize),
    /// Validity of each source pixel, 0 meaning invalid.
    pub mask: Option<&'a [u8]>,
    pub no_data: Option<f64>,
}

/// Computes a grid of a different size from a source grid.
///
/// Overview building and raster I/O with a buffer size different from the
/// window size both go through this trait. [`BuiltinResampler`] covers
/// nearest neighbour and averaging; callers wanting other kernels provide
/// their own implementation.
pub trait Resampler {
    /// Fill `dst`, a packed grid of `dst_size` words of `src.data_type`.
    fn resample(
        &self,
        alg: ResampleAlg,
        src: &ResampleSource<'_>,
        dst: &mut [u8],
        dst_size: (usize, usize),
    ) -> Result<()>;
}

/// Nearest neighbour and mask aware averaging.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinResampler;

fn nearest_index(dst: usize, ratio: f64, len: usize) -> usize {
    (((dst as f64 + 0.5) * ratio) as usize).min(len - 1)
}

/// Source pixel range covered by destination pixel `dst`.
fn source_span(dst: usize, ratio: f64, len: usize) -> (usize, usize) {
    let start = ((0.5 + dst as f64 * ratio) as usize).min(len - 1);
    let end = ((0.5 + (dst + 1) as f64 * ratio) as usize).clamp(start + 1, len);
    (start, end)
}

fn check_grid(what: &str, len: usize, size: (usize, usize), elem_size: usize) -> Result<()> {
    let needed = size
        .0
        .checked_mul(size.1)
        .and_then(|n| n.checked_mul(elem_size))
        .ok_or_else(|| GdalError::BadArgument(format!("{what} grid size overflows")))?;
    if len < needed {
        return Err(GdalError::BadArgument(format!(
            "{what} grid holds {len} bytes, {needed} needed"
        )));
    }
    Ok(())
}

impl BuiltinResampler {
    fn nearest(&self, src: &ResampleSource<'_>, dst: &mut [u8], dst_size: (usize, usize)) {
        let elem_size = src.data_type.size();
        let rx = src.size.0 as f64 / dst_size.0 as f64;
        let ry = src.size.1 as f64 / dst_size.1 as f64;
        let columns: Vec<usize> = (0..dst_size.0)
            .map(|dx| nearest_index(dx, rx, src.size.0))
            .collect();
        for dy in 0..dst_size.1 {
            let sy = nearest_index(dy, ry, src.size.1);
            let src_line = &src.data[sy * src.size.0 * elem_size..];
            let dst_line = &mut dst[dy * dst_size.0 * elem_size..];
            for (dx, &sx) in columns.iter().enumerate() {
                dst_line[dx * elem_size..(dx + 1) * elem_size]
                    .copy_from_slice(&src_line[sx * elem_size..(sx + 1) * elem_size]);
            }
        }
    }

    fn average(&self, src: &ResampleSource<'_>, dst: &mut [u8], dst_size: (usize, usize)) {
        let data_type = src.data_type;
        let elem_size = data_type.size();
        let rx = src.size.0 as f64 / dst_size.0 as f64;
        let ry = src.size.1 as f64 / dst_size.1 as f64;
        let is_valid = |index: usize, value: f64| {
            src.mask.map_or(true, |m| m[index] != 0)
                && match src.no_data {
                    Some(nd) if nd.is_nan() => !value.is_nan(),
                    Some(nd) => value != nd,
                    None => true,
                }
        };
        for dy in 0..dst_size.1 {
            let (y0, y1) = source_span(dy, ry, src.size.1);
            for dx in 0..dst_size.0 {
                let (x0, x1) = source_span(dx, rx, src.size.0);
                let mut sum_re = 0.0;
                let mut sum_im = 0.0;
                let mut count = 0usize;
                for sy in y0..y1 {
                    for sx in x0..x1 {
                        let index = sy * src.size.0 + sx;
                        // SAFETY: the grid length was checked against its size.
                        let value =
                            unsafe { convert::load_scalar(src.data[index * elem_size..].as_ptr(), data_type) };
                        let re = value.re.as_f64();
                        if is_valid(index, re) {
                            sum_re += re;
                            sum_im += value.im;
                            count += 1;
                        }
                    }
                }
                let out = if count == 0 {
                    Scalar::real(Real::Float(src.no_data.unwrap_or(0.0)))
                } else {
                    Scalar {
                        re: Real::Float(sum_re / count as f64),
                        im: sum_im / count as f64,
                    }
                };
                let offset = (dy * dst_size.0 + dx) * elem_size;
                // SAFETY: the destination length was checked against `dst_size`.
                unsafe { convert::store_scalar(dst[offset..].as_mut_ptr(), data_type, out) };
            }
        }
    }
}

impl Resampler for BuiltinResampler {
    fn resample(
        &self,
        alg: ResampleAlg,
        src: &ResampleSource<'_>,
        dst: &mut [u8],
        dst_size: (usize, usize),
    ) -> Result<()> {
        let elem_size = src.data_type.checked_size()?;
        check_grid("source", src.data.len(), src.size, elem_size)?;
        check_grid("destination", dst.len(), dst_size, elem_size)?;
        if let Some(mask) = src.mask {
            check_grid("mask", mask.len(), src.size, 1)?;
        }
        if src.size.0 == 0 || src.size.1 == 0 || dst_size.0 == 0 || dst_size.1 == 0 {
            return Ok(());
        }
        match alg {
            ResampleAlg::NearestNeighbour => self.nearest(src, dst, dst_size),
            ResampleAlg::Average => self.average(src, dst, dst_size),
            other => {
                return Err(GdalError::Unsupported {
                    method_name: "BuiltinResampler::resample",
                    msg: format!("resampling algorithm {other} is not built in"),
                })
            }
        }
        Ok(())
    }
}
