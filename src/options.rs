use bitflags::bitflags;

use crate::cpl::CslStringList;

/// Open options for [`crate::Driver::open_ex`]
#[derive(Debug, Default)]
pub struct DatasetOptions<'a> {
    pub open_flags: GdalOpenFlags,
    pub open_options: Option<&'a CslStringList>,
}

bitflags! {
    /// Open flags, also used as the scope of
    /// [`Dataset::is_thread_safe`](crate::Dataset::is_thread_safe) and
    /// [`Dataset::clone_dataset`](crate::Dataset::clone_dataset).
    ///
    /// The values are the `GDAL_OF_*` constants.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[allow(clippy::assign_op_pattern)]
    pub struct GdalOpenFlags: u32 {
        /// Open in read-only mode (default).
        const GDAL_OF_READONLY = 0x00;
        /// Open in update mode.
        const GDAL_OF_UPDATE = 0x01;
        /// Allow raster drivers to be used.
        const GDAL_OF_RASTER = 0x02;
        /// Allow vector drivers to be used.
        const GDAL_OF_VECTOR = 0x04;
        /// Allow multidimensional raster drivers to be used.
        const GDAL_OF_MULTIDIM_RASTER = 0x10;
        /// Emit error message in case of failed open.
        const GDAL_OF_VERBOSE_ERROR = 0x40;
        /// Ask for a dataset that can be read from several threads.
        const GDAL_OF_THREAD_SAFE = 0x800;
    }
}

impl Default for GdalOpenFlags {
    fn default() -> GdalOpenFlags {
        GdalOpenFlags::GDAL_OF_READONLY
    }
}

impl GdalOpenFlags {
    pub fn is_update(&self) -> bool {
        self.contains(GdalOpenFlags::GDAL_OF_UPDATE)
    }
}
