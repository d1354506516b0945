//! Raster ground control point support

use crate::cpl::raise;
use crate::errors::*;
use crate::spatial_ref::SpatialRef;
use crate::Dataset;

/// A ground control point, tying a pixel/line position to a georeferenced
/// location.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Gcp {
    /// Unique identifier, often numeric.
    pub id: String,
    /// Informational message or empty.
    pub info: String,
    /// Pixel (x) location of the point in the raster.
    pub pixel: f64,
    /// Line (y) location of the point in the raster.
    pub line: f64,
    pub x: f64,
    pub y: f64,
    /// Elevation, or zero.
    pub z: f64,
}

impl Dataset {
    /// The ground control points of this dataset, empty when none were set.
    pub fn gcps(&self) -> &[Gcp] {
        &self.gcps
    }

    /// Replace the ground control points of this dataset and the spatial
    /// reference they are expressed in.
    pub fn set_gcps(&mut self, gcps: Vec<Gcp>, spatial_ref: Option<&SpatialRef>) -> Result<()> {
        self.check_not_clone("Dataset::set_gcps")?;
        if let Some(gcp) = gcps.iter().find(|g| !(g.pixel.is_finite() && g.line.is_finite())) {
            return raise(GdalError::BadArgument(format!(
                "GCP '{}' has a non-finite pixel/line position",
                gcp.id
            )));
        }
        self.gcps = gcps;
        self.gcp_spatial_ref = spatial_ref.cloned();
        Ok(())
    }

    /// Get output spatial reference system for GCPs.
    ///
    /// # Notes
    /// * This is separate and distinct from [`Dataset::spatial_ref`], and only applies to
    ///   the representation of ground control points.
    pub fn gcp_spatial_ref(&self) -> Option<SpatialRef> {
        self.gcp_spatial_ref.clone()
    }

    /// Get the projection definition string for the GCPs in this dataset.
    pub fn gcp_projection(&self) -> Option<String> {
        self.gcp_spatial_ref
            .as_ref()
            .map(|srs| srs.definition().to_string())
    }
}
