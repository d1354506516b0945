//! GDAL Raster Data
//!
//! Bands of a MEM [`Dataset`](crate::Dataset) are views into in-memory pixel
//! buffers. This module holds the band API, pixel type support, resampling
//! and overviews, and the multidimensional model under [`mdarray`].

pub(crate) mod buffer;
pub(crate) mod convert;
mod create_options;
mod mask;
pub mod mdarray;
pub(crate) mod overview;
pub(crate) mod pixels;
pub(crate) mod rasterband;
pub(crate) mod rasterio;
mod resample;
mod types;

pub use buffer::{Buffer, ByteBuffer};
pub use convert::copy_words;
pub use create_options::RasterCreationOptions;
pub use mask::GdalMaskFlags;
pub use mdarray::{
    Attribute, Dimension, EdtComponent, ExtendedDataType, ExtendedDataTypeClass, Group, MDArray,
};
pub use overview::{compute_ov_factor, ov_level_adjust, ProgressFn};
pub use rasterband::RasterBand;
pub use resample::{BuiltinResampler, ResampleAlg, ResampleSource, Resampler};
pub use types::{Complex, GdalDataType, GdalType};

#[cfg(test)]
mod tests;
