use crate::errors;
use crate::errors::GdalError;

/// Affine mapping from raster space to georeferenced space.
///
/// For a pixel column `P` and line `L`, the georeferenced position is
///
/// ```text
/// Xgeo = gt[0] + P * gt[1] + L * gt[2]
/// Ygeo = gt[3] + P * gt[4] + L * gt[5]
/// ```
///
/// `gt[0]`/`gt[3]` locate the top-left corner of the top-left pixel,
/// `gt[1]`/`gt[5]` are the pixel width and height (the height is negative
/// for north-up rasters) and `gt[2]`/`gt[4]` are rotation terms, zero for
/// axis-aligned rasters. Datasets created without one report
/// [`GdalError::NotFound`] from [`Dataset::geo_transform`](crate::Dataset::geo_transform).
///
/// ```rust
/// # fn main() -> gdal_mem::errors::Result<()> {
/// use gdal_mem::{Driver, GeoTransformEx};
/// let mut ds = Driver::mem().create("", 100, 100, 1)?;
/// ds.set_geo_transform(&[768269.0, 1.0, 0.0, 4057292.0, 0.0, -1.0])?;
/// let gt = ds.geo_transform()?;
/// let (x, y) = gt.apply(10.0, 20.0);
/// assert_eq!((x, y), (768279.0, 4057272.0));
/// assert_eq!(gt.invert()?.apply(x, y), (10.0, 20.0));
/// # Ok(())
/// # }
/// ```
pub type GeoTransform = [f64; 6];

pub trait GeoTransformEx {
    /// Map a pixel/line position to georeferenced coordinates.
    fn apply(&self, pixel: f64, line: f64) -> (f64, f64);

    /// The transform mapping georeferenced coordinates back to pixel/line.
    /// Fails on a singular transform.
    fn invert(&self) -> errors::Result<GeoTransform>;
}

impl GeoTransformEx for GeoTransform {
    fn apply(&self, pixel: f64, line: f64) -> (f64, f64) {
        let geo_x = self[0] + pixel * self[1] + line * self[2];
        let geo_y = self[3] + pixel * self[4] + line * self[5];
        (geo_x, geo_y)
    }

    fn invert(&self) -> errors::Result<GeoTransform> {
        // axis-aligned: exact reciprocals
        if self[2] == 0.0 && self[4] == 0.0 && self[1] != 0.0 && self[5] != 0.0 {
            return Ok([
                -self[0] / self[1],
                1.0 / self[1],
                0.0,
                -self[3] / self[5],
                0.0,
                1.0 / self[5],
            ]);
        }

        let det = self[1] * self[5] - self[2] * self[4];
        let magnitude = self[1]
            .abs()
            .max(self[2].abs())
            .max(self[4].abs().max(self[5].abs()));
        if det.abs() <= 1e-10 * magnitude * magnitude {
            return Err(GdalError::BadArgument(
                "Geo transform is uninvertible".to_string(),
            ));
        }
        let inv_det = 1.0 / det;
        Ok([
            (self[2] * self[3] - self[0] * self[5]) * inv_det,
            self[5] * inv_det,
            -self[2] * inv_det,
            (-self[1] * self[3] + self[0] * self[4]) * inv_det,
            -self[4] * inv_det,
            self[1] * inv_det,
        ])
    }
}
