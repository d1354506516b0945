use parking_lot::RwLock;

use crate::metadata::MetadataStore;

/// Objects carrying a description and a metadata store: datasets, raster
/// bands and the driver.
pub trait MajorObject {
    fn metadata_store(&self) -> &RwLock<MetadataStore>;
}
