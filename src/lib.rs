#![crate_name = "gdal_mem"]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # In-memory GDAL-style datasets
//!
//! This crate provides the MEM driver of the GDAL data model in pure Rust:
//! raster datasets whose bands live in memory, and multidimensional datasets
//! made of groups, dimensions, arrays and attributes.
//!
//! ## Raster data
//!
//! A raster dataset has a size in pixels and any number of bands, each of a
//! single [`GdalDataType`]. Bands either own a zero-initialized buffer or view
//! memory supplied by the caller.
//!
//! ```
//! use gdal_mem::{Driver, Metadata};
//! use gdal_mem::raster::GdalDataType;
//!
//! let mut ds = Driver::mem().create("scratch", 4, 2, 1)?;
//! let mut band = ds.rasterband(1)?;
//! band.fill(42.0)?;
//! let buf = band.read_as::<u16>((0, 0), (4, 2), (2, 1), None)?;
//! assert_eq!(buf.data, vec![42, 42]);
//!
//! ds.add_band(GdalDataType::Float32)?;
//! assert_eq!(ds.raster_count(), 2);
//! assert_eq!(
//!     ds.metadata_item("INTERLEAVE", "IMAGE_STRUCTURE").as_deref(),
//!     Some("BAND")
//! );
//! # Ok::<(), gdal_mem::errors::GdalError>(())
//! ```
//!
//! Overviews are built with [`Dataset::build_overviews`], masks with
//! [`raster::RasterBand::create_mask_band`]. Read-only clones sharing the
//! pixels of a dataset are made with [`Dataset::clone_dataset`] and can be
//! wrapped in a [`ThreadSafeDataset`] to read from several threads.
//!
//! ## Multidimensional data
//!
//! ```
//! use gdal_mem::{Driver, GdalDataType};
//! use gdal_mem::raster::ExtendedDataType;
//!
//! let ds = Driver::mem().create_multidimensional("cube", None)?;
//! let root = ds.root_group()?;
//! let time = root.create_dimension("time", "TEMPORAL", "", 3)?;
//! let array = root.create_md_array(
//!     "temperature",
//!     &[time],
//!     ExtendedDataType::new_numeric(GdalDataType::Float32)?,
//! )?;
//! array.write(vec![0], vec![3], &[12.5f32, 13.0, 11.5])?;
//! assert_eq!(array.read_as::<f32>(vec![2], vec![1])?, vec![11.5]);
//! assert_eq!(root.md_array_names()?, vec!["temperature".to_string()]);
//! # Ok::<(), gdal_mem::errors::GdalError>(())
//! ```
//!
//! ## Errors
//!
//! Fallible operations return [`errors::Result`]. Failures are also reported
//! on the error channel, see [`cpl`] and [`config::set_error_handler`], and
//! mirrored to [`tracing`](https://docs.rs/tracing).

pub mod config;
pub mod cpl;
mod dataset;
mod driver;
pub mod errors;
mod gcp;
mod gdal_major_object;
mod geo_transform;
mod metadata;
mod options;
pub mod raster;
pub mod spatial_ref;
mod thread_safe;
#[cfg(test)]
mod test_utils;
mod utils;

pub use dataset::{BufferSpacing, Dataset};
pub use driver::{Driver, DriverManager, ENABLE_OPEN_OPTION};
pub use gcp::Gcp;
pub use gdal_major_object::MajorObject;
pub use geo_transform::{GeoTransform, GeoTransformEx};
pub use metadata::{Metadata, MetadataEntry, MetadataIter, MetadataStore};
pub use options::{DatasetOptions, GdalOpenFlags};
pub use raster::GdalDataType;
pub use spatial_ref::SpatialRef;
pub use thread_safe::ThreadSafeDataset;
