use bitflags::bitflags;

bitflags! {
    /// Describes how the mask of a band is obtained.
    ///
    /// An explicit per-band mask has no flag set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct GdalMaskFlags: u32 {
        /// Every pixel is valid; the mask reads as 255 everywhere.
        const GMF_ALL_VALID = 0x01;
        /// One mask band is shared by all bands of the dataset.
        const GMF_PER_DATASET = 0x02;
        /// The mask is an alpha band.
        const GMF_ALPHA = 0x04;
        /// The mask is derived from the band's no-data value.
        const GMF_NODATA = 0x08;
    }
}

impl GdalMaskFlags {
    pub fn is_all_valid(&self) -> bool {
        self.contains(GdalMaskFlags::GMF_ALL_VALID)
    }

    pub fn is_per_dataset(&self) -> bool {
        self.contains(GdalMaskFlags::GMF_PER_DATASET)
    }

    pub fn is_alpha(&self) -> bool {
        self.contains(GdalMaskFlags::GMF_ALPHA)
    }

    pub fn is_nodata(&self) -> bool {
        self.contains(GdalMaskFlags::GMF_NODATA)
    }

    /// Whether the mask is stored in its own band rather than derived.
    pub(crate) fn is_explicit(&self) -> bool {
        !self.intersects(GdalMaskFlags::GMF_ALL_VALID | GdalMaskFlags::GMF_NODATA)
    }
}
