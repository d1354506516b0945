use std::cell::Cell;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::cpl::{raise, CslStringList};
use crate::errors::*;
use crate::gcp::Gcp;
use crate::gdal_major_object::MajorObject;
use crate::geo_transform::GeoTransform;
use crate::metadata::{Metadata, MetadataStore};
use crate::options::GdalOpenFlags;
use crate::raster::buffer::zeroed_vec;
use crate::raster::mdarray::Group;
use crate::raster::pixels::{PixelStorage, PixelView};
use crate::raster::rasterband::{create_mask, BandData, MaskState};
use crate::raster::rasterio::{self, BufferLayout, RwFlag, Window};
use crate::raster::{GdalDataType, GdalType, RasterBand, ResampleAlg};
use crate::spatial_ref::SpatialRef;
use crate::utils::{_parse_isize, _parse_pointer};
use crate::Driver;

/// Byte spacing of a multi-band caller buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BufferSpacing {
    /// Bytes from one pixel to the next within a line.
    pub pixel: usize,
    /// Bytes from one line to the next.
    pub line: usize,
    /// Bytes from one band to the next.
    pub band: usize,
}

impl BufferSpacing {
    /// Band sequential layout: each band a packed grid, one after the other.
    pub fn band_sequential(size: (usize, usize), data_type: GdalDataType) -> Self {
        let pixel = data_type.size();
        BufferSpacing {
            pixel,
            line: pixel.saturating_mul(size.0),
            band: pixel.saturating_mul(size.0).saturating_mul(size.1),
        }
    }

    /// Pixel interleaved layout: the bands of a pixel next to each other.
    pub fn pixel_interleaved(size: (usize, usize), data_type: GdalDataType, bands: usize) -> Self {
        let band = data_type.size();
        BufferSpacing {
            pixel: band.saturating_mul(bands),
            line: band.saturating_mul(bands).saturating_mul(size.0),
            band,
        }
    }
}

/// Wrapper around an in-memory raster or multidimensional dataset.
///
/// Bands either own a zero-initialized pixel buffer or view memory supplied
/// by the caller. A dataset can move to another thread but cannot be shared
/// between threads; see [`Dataset::clone_dataset`] and
/// [`Dataset::try_into_thread_safe`] for concurrent reads.
pub struct Dataset {
    pub(crate) size: (usize, usize),
    pub(crate) bands: Vec<BandData>,
    geo_transform: Option<GeoTransform>,
    spatial_ref: Option<SpatialRef>,
    pub(crate) gcps: Vec<Gcp>,
    pub(crate) gcp_spatial_ref: Option<SpatialRef>,
    pub(crate) overviews: Vec<Dataset>,
    root_group: Option<Group>,
    metadata: RwLock<MetadataStore>,
    /// Set on read-only clones.
    is_clone: bool,
    _not_sync: PhantomData<Cell<()>>,
}

impl Dataset {
    /// An empty dataset of `size` with no bands.
    pub(crate) fn with_size(size: (usize, usize), description: &str) -> Dataset {
        Dataset {
            size,
            bands: Vec::new(),
            geo_transform: None,
            spatial_ref: None,
            gcps: Vec::new(),
            gcp_spatial_ref: None,
            overviews: Vec::new(),
            root_group: None,
            metadata: RwLock::new(MetadataStore::new(description)),
            is_clone: false,
            _not_sync: PhantomData,
        }
    }

    /// An empty multidimensional dataset with a fresh root group.
    pub(crate) fn multidimensional(description: &str) -> Dataset {
        let mut ds = Dataset::with_size((0, 0), description);
        ds.root_group = Some(Group::new_root());
        ds
    }

    pub(crate) fn description_for_errors(&self) -> String {
        match self.metadata.read().description() {
            "" => "dataset".to_string(),
            d => format!("dataset '{d}'"),
        }
    }

    pub(crate) fn check_not_clone(&self, method_name: &'static str) -> Result<()> {
        if self.is_clone {
            return raise(GdalError::ReadOnly(format!(
                "{method_name} on a read-only clone"
            )));
        }
        Ok(())
    }

    pub(crate) fn push_band(&mut self, pixels: PixelView) {
        self.bands.push(BandData::new(pixels));
    }

    /// The driver of this dataset, always the MEM driver.
    pub fn driver(&self) -> Driver {
        Driver::mem()
    }

    /// Fetch a band object for a dataset.
    ///
    /// Applies to raster datasets, and fetches the
    /// rasterband at the given _1-based_ index.
    pub fn rasterband(&self, band_index: usize) -> Result<RasterBand<'_>> {
        match band_index
            .checked_sub(1)
            .and_then(|i| self.bands.get(i))
        {
            Some(data) => Ok(RasterBand::new(self, band_index, data)),
            None => raise(GdalError::BadArgument(format!(
                "band index {band_index} out of range 1..={}",
                self.bands.len()
            ))),
        }
    }

    /// Iterate over all bands, in order.
    pub fn rasterbands(&self) -> impl Iterator<Item = RasterBand<'_>> {
        self.bands
            .iter()
            .enumerate()
            .map(move |(i, data)| RasterBand::new(self, i + 1, data))
    }

    /// Fetch the number of raster bands on this dataset.
    pub fn raster_count(&self) -> usize {
        self.bands.len()
    }

    /// Returns the raster dimensions: (width, height).
    pub fn raster_size(&self) -> (usize, usize) {
        self.size
    }

    /// Whether this dataset is a read-only clone.
    pub fn is_read_only(&self) -> bool {
        self.is_clone
    }

    /// Append a band owning a zeroed buffer.
    pub fn add_band(&mut self, data_type: GdalDataType) -> Result<()> {
        self.check_not_clone("Dataset::add_band")?;
        let pixels = PixelView::allocate(data_type, self.size).or_else(raise)?;
        self.push_band(pixels);
        debug!(band = self.bands.len(), %data_type, "added band");
        Ok(())
    }

    /// Append a band with creation options.
    ///
    /// Without `DATAPOINTER` this is [`Dataset::add_band`]. With it, the band
    /// views the memory at that address, as decimal or `0x` hex, using
    /// `PIXELOFFSET` and `LINEOFFSET` byte strides (packed by default).
    ///
    /// # Safety
    /// As for [`Dataset::add_band_from_raw`].
    pub unsafe fn add_band_with_options(
        &mut self,
        data_type: GdalDataType,
        options: &CslStringList,
    ) -> Result<()> {
        let Some(pointer) = options.fetch_name_value("DATAPOINTER") else {
            return self.add_band(data_type);
        };
        let address = _parse_pointer(&pointer).or_else(raise)?;
        let Some(data) = NonNull::new(address as *mut u8) else {
            return raise(GdalError::BadArgument("DATAPOINTER is null".to_string()));
        };
        let pixel_offset = options
            .fetch_name_value("PIXELOFFSET")
            .map(|v| _parse_isize(&v, "PIXELOFFSET"))
            .transpose()
            .or_else(raise)?;
        let line_offset = options
            .fetch_name_value("LINEOFFSET")
            .map(|v| _parse_isize(&v, "LINEOFFSET"))
            .transpose()
            .or_else(raise)?;
        self.add_band_from_raw(data_type, data, pixel_offset, line_offset)
    }

    /// Append a band viewing caller memory.
    ///
    /// `pixel_offset` defaults to the size of `data_type` and `line_offset`
    /// to `pixel_offset * x_size`. Negative strides are allowed.
    ///
    /// # Safety
    /// Every pixel addressed by the strides must be valid for reads and
    /// writes for as long as the dataset, its clones and its overviews live.
    pub unsafe fn add_band_from_raw(
        &mut self,
        data_type: GdalDataType,
        data: NonNull<u8>,
        pixel_offset: Option<isize>,
        line_offset: Option<isize>,
    ) -> Result<()> {
        self.check_not_clone("Dataset::add_band_from_raw")?;
        let elem_size = data_type.checked_size().or_else(raise)? as isize;
        let pixel_offset = pixel_offset.unwrap_or(elem_size);
        let line_offset = line_offset.unwrap_or(pixel_offset * self.size.0 as isize);
        let storage = PixelStorage::external(data);
        let pixels = PixelView::over(
            storage,
            0,
            data_type,
            self.size,
            pixel_offset,
            line_offset,
            false,
        )
        .or_else(raise)?;
        self.push_band(pixels);
        debug!(band = self.bands.len(), %data_type, pixel_offset, line_offset, "added band over caller memory");
        Ok(())
    }

    /// Get the spatial reference system for this dataset.
    pub fn spatial_ref(&self) -> Result<SpatialRef> {
        match &self.spatial_ref {
            Some(srs) => Ok(srs.clone()),
            None => raise(GdalError::NotFound {
                name: "spatial reference".to_string(),
                scope: self.description_for_errors(),
            }),
        }
    }

    /// Set the spatial reference system for this dataset.
    pub fn set_spatial_ref(&mut self, spatial_ref: &SpatialRef) -> Result<()> {
        self.check_not_clone("Dataset::set_spatial_ref")?;
        self.spatial_ref = Some(spatial_ref.clone());
        Ok(())
    }

    /// The definition of the spatial reference system, or an empty string.
    pub fn projection(&self) -> String {
        self.spatial_ref
            .as_ref()
            .map(|srs| srs.definition().to_string())
            .unwrap_or_default()
    }

    /// Set the spatial reference system from user input; an empty string
    /// clears it.
    pub fn set_projection(&mut self, projection: &str) -> Result<()> {
        self.check_not_clone("Dataset::set_projection")?;
        self.spatial_ref = match projection.trim() {
            "" => None,
            p => Some(SpatialRef::from_definition(p).or_else(raise)?),
        };
        Ok(())
    }

    /// Set the [`GeoTransform`] of this dataset.
    pub fn set_geo_transform(&mut self, transformation: &GeoTransform) -> Result<()> {
        self.check_not_clone("Dataset::set_geo_transform")?;
        self.geo_transform = Some(*transformation);
        Ok(())
    }

    /// Get the [`GeoTransform`] of this dataset.
    ///
    /// Fails when none was set.
    pub fn geo_transform(&self) -> Result<GeoTransform> {
        match self.geo_transform {
            Some(gt) => Ok(gt),
            None => raise(GdalError::NotFound {
                name: "geo transform".to_string(),
                scope: self.description_for_errors(),
            }),
        }
    }

    /// The root group of a multidimensional dataset.
    pub fn root_group(&self) -> Result<Group> {
        match &self.root_group {
            Some(group) => Ok(group.clone()),
            None => raise(GdalError::Unsupported {
                method_name: "Dataset::root_group",
                msg: "not a multidimensional dataset".to_string(),
            }),
        }
    }

    /// Create a zeroed mask shared by all bands.
    pub fn create_mask_band(&mut self) -> Result<()> {
        self.check_not_clone("Dataset::create_mask_band")?;
        create_mask(self, 1, true).or_else(raise)
    }

    /// The address of the pixels of band `n` for a `MEMORY<n>` token.
    ///
    /// Writing through the pointer bypasses every check this crate makes.
    pub fn internal_handle(&self, token: &str) -> Option<*mut u8> {
        let index: usize = token.strip_prefix("MEMORY")?.parse().ok()?;
        let band = self.bands.get(index.checked_sub(1)?)?;
        Some(band.pixels.origin())
    }

    fn band_views(&self, band_list: &[usize]) -> Result<Vec<&BandData>> {
        if band_list.is_empty() {
            return Ok(self.bands.iter().collect());
        }
        band_list
            .iter()
            .map(|&b| {
                b.checked_sub(1)
                    .and_then(|i| self.bands.get(i))
                    .ok_or_else(|| {
                        GdalError::BadArgument(format!(
                            "band {b} out of range 1..={}",
                            self.bands.len()
                        ))
                    })
            })
            .collect()
    }

    fn is_full_band_list(&self, band_list: &[usize]) -> bool {
        band_list.is_empty() || band_list.iter().copied().eq(1..=self.bands.len())
    }

    #[allow(clippy::too_many_arguments)]
    fn raster_io(
        &self,
        rw: RwFlag,
        window: (isize, isize),
        window_size: (usize, usize),
        buf_size: (usize, usize),
        buf_type: GdalDataType,
        band_list: &[usize],
        spacing: Option<BufferSpacing>,
        buffer: *mut u8,
        buffer_len: usize,
        alg: ResampleAlg,
    ) -> Result<()> {
        let window = Window::new(window, window_size, self.size)?;
        let bands = self.band_views(band_list)?;
        let spacing = spacing.unwrap_or_else(|| BufferSpacing::band_sequential(buf_size, buf_type));
        let layout = BufferLayout::spaced(buf_size, buf_type, spacing.pixel, spacing.line)?;
        layout.check_len(buffer_len, bands.len(), spacing.band)?;
        if rw == RwFlag::Write {
            for band in &bands {
                band.pixels.check_writable()?;
            }
        }
        if self.is_full_band_list(band_list) {
            let views: Vec<&PixelView> = bands.iter().map(|b| &b.pixels).collect();
            // SAFETY: window, buffer extent and band list were validated.
            let done = unsafe {
                rasterio::try_interleaved_fast_path(&views, rw, &window, buffer, &layout, spacing.band)
            };
            if done {
                return Ok(());
            }
        }
        for (i, data) in bands.iter().enumerate() {
            let band_index = band_list.get(i).copied().unwrap_or(i + 1);
            let offset = i * spacing.band;
            let len = buffer_len - offset;
            let mut band = RasterBand::new(self, band_index, data);
            // SAFETY: `check_len` covered every band's extent.
            match rw {
                RwFlag::Read => {
                    let buf = unsafe { std::slice::from_raw_parts_mut(buffer.add(offset), len) };
                    band.read_window(&window, buf, &layout, alg)?;
                }
                RwFlag::Write => {
                    let buf = unsafe { std::slice::from_raw_parts(buffer.add(offset), len) };
                    band.write_window(&window, buf, &layout)?;
                }
            }
        }
        Ok(())
    }

    /// Read raw bytes of several bands at once.
    ///
    /// # Arguments
    /// * window - the window position from top left
    /// * window_size - the window size
    /// * buf_size - the buffer grid size; pixels are resampled with
    ///   `e_resample_alg` when it differs from `window_size`
    /// * buf_type - the type of the words in `buffer`
    /// * band_list - 1-based band indices in buffer order, empty for all
    /// * spacing - byte spacing of the buffer, band sequential when `None`
    #[allow(clippy::too_many_arguments)]
    pub fn read_raw(
        &self,
        window: (isize, isize),
        window_size: (usize, usize),
        buf_size: (usize, usize),
        buf_type: GdalDataType,
        band_list: &[usize],
        spacing: Option<BufferSpacing>,
        buffer: &mut [u8],
        e_resample_alg: Option<ResampleAlg>,
    ) -> Result<()> {
        self.raster_io(
            RwFlag::Read,
            window,
            window_size,
            buf_size,
            buf_type,
            band_list,
            spacing,
            buffer.as_mut_ptr(),
            buffer.len(),
            e_resample_alg.unwrap_or_default(),
        )
        .or_else(raise)
    }

    /// Write raw bytes to several bands at once. Arguments are as for
    /// [`Dataset::read_raw`].
    #[allow(clippy::too_many_arguments)]
    pub fn write_raw(
        &mut self,
        window: (isize, isize),
        window_size: (usize, usize),
        buf_size: (usize, usize),
        buf_type: GdalDataType,
        band_list: &[usize],
        spacing: Option<BufferSpacing>,
        buffer: &[u8],
    ) -> Result<()> {
        self.raster_io(
            RwFlag::Write,
            window,
            window_size,
            buf_size,
            buf_type,
            band_list,
            spacing,
            // only read from on writes
            buffer.as_ptr() as *mut u8,
            buffer.len(),
            ResampleAlg::NearestNeighbour,
        )
        .or_else(raise)
    }

    /// Read the bands of `band_list` (all when empty) as one pixel
    /// interleaved vector of `size.0 * size.1 * bands` values.
    pub fn read_pixel_interleaved<T: Copy + GdalType>(
        &self,
        window: (isize, isize),
        window_size: (usize, usize),
        size: (usize, usize),
        band_list: &[usize],
    ) -> Result<Vec<T>> {
        let nbands = if band_list.is_empty() {
            self.bands.len()
        } else {
            band_list.len()
        };
        let mut data = zeroed_vec::<T>(interleaved_count(size, nbands).or_else(raise)?)
            .or_else(raise)?;
        self.read_raw(
            window,
            window_size,
            size,
            T::datatype(),
            band_list,
            Some(BufferSpacing::pixel_interleaved(size, T::datatype(), nbands)),
            bytemuck::cast_slice_mut(&mut data),
            None,
        )?;
        Ok(data)
    }

    /// Write a pixel interleaved vector of `size.0 * size.1 * bands` values
    /// to the bands of `band_list` (all when empty).
    pub fn write_pixel_interleaved<T: Copy + GdalType>(
        &mut self,
        window: (isize, isize),
        window_size: (usize, usize),
        size: (usize, usize),
        band_list: &[usize],
        data: &[T],
    ) -> Result<()> {
        let nbands = if band_list.is_empty() {
            self.bands.len()
        } else {
            band_list.len()
        };
        let expected = interleaved_count(size, nbands).or_else(raise)?;
        if data.len() != expected {
            return raise(GdalError::BadArgument(format!(
                "{} values given, {expected} expected",
                data.len(),
            )));
        }
        self.write_raw(
            window,
            window_size,
            size,
            T::datatype(),
            band_list,
            Some(BufferSpacing::pixel_interleaved(size, T::datatype(), nbands)),
            bytemuck::cast_slice(data),
        )
    }

    /// Whether [`Dataset::clone_dataset`] supports `scope`: raster access
    /// only, read-only.
    pub(crate) fn can_be_cloned(&self, scope: GdalOpenFlags) -> bool {
        scope.contains(GdalOpenFlags::GDAL_OF_RASTER)
            && !scope.intersects(
                GdalOpenFlags::GDAL_OF_UPDATE
                    | GdalOpenFlags::GDAL_OF_VECTOR
                    | GdalOpenFlags::GDAL_OF_MULTIDIM_RASTER,
            )
    }

    /// A read-only dataset sharing the pixels of this one.
    ///
    /// Metadata, geotransform, spatial references, GCPs and overviews are
    /// copied; the multidimensional root group is not. Only the raster scope
    /// (`GDAL_OF_RASTER`) is supported.
    ///
    /// While a clone is alive, writes to the shared pixels through this
    /// dataset fail with [`GdalError::ReadOnly`].
    pub fn clone_dataset(&self, scope: GdalOpenFlags) -> Result<Dataset> {
        if !self.can_be_cloned(scope) {
            return raise(GdalError::Unsupported {
                method_name: "Dataset::clone_dataset",
                msg: format!("only read-only raster clones are supported, got {scope:?}"),
            });
        }
        let mut clone = Dataset::with_size(self.size, "");
        *clone.metadata.write() = self.metadata.read().clone();
        clone.geo_transform = self.geo_transform;
        clone.spatial_ref = self.spatial_ref.clone();
        clone.gcps = self.gcps.clone();
        clone.gcp_spatial_ref = self.gcp_spatial_ref.clone();
        clone.is_clone = true;

        let mut shared_mask = None;
        for band in &self.bands {
            let copy = band.read_only_clone();
            if let (Some(mask), flags) = (band.mask_band(), band.mask_flags()) {
                let mask = if flags.is_per_dataset() {
                    shared_mask
                        .get_or_insert_with(|| Arc::new(mask.read_only_clone()))
                        .clone()
                } else {
                    Arc::new(mask.read_only_clone())
                };
                copy.state.write().mask = MaskState::Band { mask, flags };
            }
            clone.bands.push(copy);
        }
        for ov in &self.overviews {
            clone.overviews.push(ov.clone_dataset(scope)?);
        }
        debug!(bands = clone.bands.len(), overviews = clone.overviews.len(), "cloned dataset");
        Ok(clone)
    }
}

impl MajorObject for Dataset {
    fn metadata_store(&self) -> &RwLock<MetadataStore> {
        &self.metadata
    }
}

impl Metadata for Dataset {}

impl std::fmt::Debug for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dataset")
            .field("description", &self.metadata.read().description())
            .field("size", &self.size)
            .field("bands", &self.bands.len())
            .field("overviews", &self.overviews.len())
            .field("read_only", &self.is_clone)
            .finish()
    }
}

/// Values in a pixel interleaved grid of `size` with `bands` bands.
fn interleaved_count(size: (usize, usize), bands: usize) -> Result<usize> {
    size.0
        .checked_mul(size.1)
        .and_then(|n| n.checked_mul(bands))
        .ok_or_else(|| {
            GdalError::BadArgument(format!(
                "{}x{} grid of {bands} bands overflows",
                size.0, size.1
            ))
        })
}
