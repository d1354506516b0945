use std::sync::Arc;

use parking_lot::RwLock;

use crate::cpl::raise;
use crate::dataset::Dataset;
use crate::errors::*;
use crate::gdal_major_object::MajorObject;
use crate::metadata::{Metadata, MetadataStore};
use crate::raster::buffer::zeroed_vec;
use crate::raster::pixels::PixelView;
use crate::raster::rasterio::{self, BufferLayout, RwFlag, Window};
use crate::raster::resample::{BuiltinResampler, ResampleAlg, ResampleSource, Resampler};
use crate::raster::{convert, Buffer, GdalDataType, GdalMaskFlags, GdalType};

#[cfg(feature = "ndarray")]
use ndarray::Array2;

/// No-data value of a band, kept in the width it was set with.
#[derive(Copy, Clone, Debug, PartialEq)]
pub(crate) enum NoData {
    Float(f64),
    Int(i64),
    UInt(u64),
}

impl NoData {
    pub(crate) fn as_f64(self) -> f64 {
        match self {
            NoData::Float(v) => v,
            NoData::Int(v) => v as f64,
            NoData::UInt(v) => v as f64,
        }
    }
}

#[derive(Clone, Default)]
pub(crate) enum MaskState {
    /// All valid, or derived from the no-data value when one is set.
    #[default]
    Default,
    /// A byte band of its own; shared by every band when `flags` is
    /// `GMF_PER_DATASET`.
    Band {
        mask: Arc<BandData>,
        flags: GdalMaskFlags,
    },
}

#[derive(Clone, Default)]
pub(crate) struct BandState {
    pub(crate) no_data: Option<NoData>,
    pub(crate) scale: Option<f64>,
    pub(crate) offset: Option<f64>,
    pub(crate) unit: String,
    pub(crate) mask: MaskState,
}

/// Pixels and properties of one band of a dataset.
pub(crate) struct BandData {
    pub(crate) pixels: PixelView,
    pub(crate) state: RwLock<BandState>,
    pub(crate) metadata: RwLock<MetadataStore>,
}

impl BandData {
    pub(crate) fn new(pixels: PixelView) -> BandData {
        BandData {
            pixels,
            state: RwLock::new(BandState::default()),
            metadata: RwLock::new(MetadataStore::default()),
        }
    }

    /// Pixels read-only, properties copied. The mask is left for the caller
    /// to attach since per-dataset masks must stay shared.
    pub(crate) fn read_only_clone(&self) -> BandData {
        let mut state = self.state.read().clone();
        state.mask = MaskState::Default;
        BandData {
            pixels: self.pixels.read_only_clone(),
            state: RwLock::new(state),
            metadata: RwLock::new(self.metadata.read().clone()),
        }
    }

    pub(crate) fn mask_flags(&self) -> GdalMaskFlags {
        let state = self.state.read();
        match &state.mask {
            MaskState::Band { flags, .. } => *flags,
            MaskState::Default if state.no_data.is_some() => GdalMaskFlags::GMF_NODATA,
            MaskState::Default => GdalMaskFlags::GMF_ALL_VALID,
        }
    }

    pub(crate) fn mask_band(&self) -> Option<Arc<BandData>> {
        match &self.state.read().mask {
            MaskState::Band { mask, .. } => Some(mask.clone()),
            MaskState::Default => None,
        }
    }

    /// Read a window as a packed grid of the band's own type.
    pub(crate) fn read_packed(&self, window: &Window) -> Result<Vec<u8>> {
        let data_type = self.pixels.data_type;
        let mut out = zeroed_vec(window.pixel_count() * data_type.size())?;
        let layout = BufferLayout::packed(window.size, data_type);
        // SAFETY: `window` was validated against the band size and `out`
        // holds a packed grid of the window.
        unsafe { rasterio::copy_window(&self.pixels, RwFlag::Read, window, out.as_mut_ptr(), &layout) };
        Ok(out)
    }

    /// Write a packed grid of the band's own type into `window`.
    pub(crate) fn write_packed(&self, window: &Window, data: &[u8]) -> Result<()> {
        self.pixels.check_writable()?;
        let layout = BufferLayout::packed(window.size, self.pixels.data_type);
        layout.check_len(data.len(), 1, 0)?;
        // SAFETY: as for `read_packed`; the buffer is only read from.
        unsafe {
            rasterio::copy_window(
                &self.pixels,
                RwFlag::Write,
                window,
                data.as_ptr() as *mut u8,
                &layout,
            )
        };
        Ok(())
    }

    /// Validity of each pixel of `window`, as 0 or 255, when the band has an
    /// explicit mask.
    pub(crate) fn explicit_mask_window(&self, window: &Window) -> Result<Option<Vec<u8>>> {
        match self.mask_band() {
            Some(mask) => Ok(Some(mask.read_packed(window)?)),
            None => Ok(None),
        }
    }
}

/// What a [`RasterBand`] reads from.
enum BandSource<'a> {
    Band(&'a BandData),
    /// A mask stored in its own byte band.
    Mask(Arc<BandData>),
    /// 255 where the parent differs from its no-data value, 0 elsewhere.
    NoDataMask {
        parent: &'a BandData,
        no_data: NoData,
        metadata: RwLock<MetadataStore>,
    },
    /// 255 everywhere.
    AllValidMask {
        metadata: RwLock<MetadataStore>,
    },
}

/// Represents a single band of a dataset.
///
/// This object carries the lifetime of the dataset that
/// contains it. This is necessary to prevent the dataset
/// from being dropped before the band.
///
/// Mask bands obtained through [`RasterBand::open_mask_band`] are
/// `RasterBand`s as well; masks derived from a no-data value or reporting
/// all pixels valid can be read but not written.
pub struct RasterBand<'a> {
    dataset: &'a Dataset,
    /// 1-based index of the band, or of the band owning the mask.
    band_index: usize,
    source: BandSource<'a>,
}

impl<'a> RasterBand<'a> {
    pub(crate) fn new(dataset: &'a Dataset, band_index: usize, data: &'a BandData) -> Self {
        RasterBand {
            dataset,
            band_index,
            source: BandSource::Band(data),
        }
    }

    fn data(&self) -> Option<&BandData> {
        match &self.source {
            BandSource::Band(data) => Some(*data),
            BandSource::Mask(mask) => Some(mask.as_ref()),
            _ => None,
        }
    }

    /// The band this one is the mask of, if it is a mask.
    fn parent(&self) -> Option<&'a BandData> {
        match self.source {
            BandSource::Band(_) => None,
            _ => self.dataset.bands.get(self.band_index - 1),
        }
    }

    fn data_mut(&self, method_name: &'static str) -> Result<&BandData> {
        match self.data() {
            Some(data) if data.pixels.is_read_only() => raise(GdalError::ReadOnly(format!(
                "{method_name} on a band of a read-only clone"
            ))),
            Some(data) => Ok(data),
            None => raise(GdalError::Unsupported {
                method_name,
                msg: "derived mask bands are read-only".to_string(),
            }),
        }
    }

    /// Whether this band is a mask of another band.
    pub fn is_mask(&self) -> bool {
        !matches!(self.source, BandSource::Band(_))
    }

    /// Get block size from a 'Dataset'.
    ///
    /// Blocks of an in-memory band are single lines.
    pub fn block_size(&self) -> (usize, usize) {
        (self.x_size(), 1)
    }

    /// Get x-size of the band
    pub fn x_size(&self) -> usize {
        self.dataset.raster_size().0
    }

    /// Get y-size of the band
    pub fn y_size(&self) -> usize {
        self.dataset.raster_size().1
    }

    /// Get dimensions of the band.
    /// Note that this may not be the same as `size` on the
    /// `owning_dataset` due to scale.
    pub fn size(&self) -> (usize, usize) {
        (self.x_size(), self.y_size())
    }

    /// Get actual block size (at the edges) when block size
    /// does not divide band size.
    pub fn actual_block_size(&self, x: usize, y: usize) -> Result<(usize, usize)> {
        if x != 0 || y >= self.y_size() {
            return raise(GdalError::BadArgument(format!(
                "block ({x}, {y}) is outside of a band with {} line blocks",
                self.y_size()
            )));
        }
        Ok(self.block_size())
    }

    pub fn band_type(&self) -> GdalDataType {
        match &self.source {
            BandSource::Band(data) => data.pixels.data_type,
            BandSource::Mask(mask) => mask.pixels.data_type,
            _ => GdalDataType::UInt8,
        }
    }

    /// Read `window` into the caller layout, resampling with `alg` when the
    /// layout size differs from the window size.
    pub(crate) fn read_window(
        &self,
        window: &Window,
        buf: &mut [u8],
        layout: &BufferLayout,
        alg: ResampleAlg,
    ) -> Result<()> {
        layout.check_len(buf.len(), 1, 0)?;
        if layout.size == window.size {
            if let Some(data) = self.data() {
                // SAFETY: window and buffer extents were checked.
                unsafe {
                    rasterio::copy_window(&data.pixels, RwFlag::Read, window, buf.as_mut_ptr(), layout)
                };
                return Ok(());
            }
        }
        let native_type = self.band_type();
        let native = self.read_native(window)?;
        if layout.size == window.size {
            let native_layout = BufferLayout::packed(window.size, native_type);
            // SAFETY: both grids were sized for their layouts.
            unsafe { rasterio::copy_layout(native.as_ptr(), &native_layout, buf.as_mut_ptr(), layout) };
            return Ok(());
        }
        let (mask, no_data) = match (&self.source, alg) {
            (BandSource::Band(data), ResampleAlg::Average) => (
                data.explicit_mask_window(window)?,
                data.state.read().no_data.map(NoData::as_f64),
            ),
            _ => (None, None),
        };
        let src = ResampleSource {
            data: &native,
            data_type: native_type,
            size: window.size,
            mask: mask.as_deref(),
            no_data,
        };
        let mut resampled = zeroed_vec(rasterio::grid_len(layout.size, native_type)?)?;
        BuiltinResampler.resample(alg, &src, &mut resampled, layout.size)?;
        let resampled_layout = BufferLayout::packed(layout.size, native_type);
        // SAFETY: both grids were sized for their layouts.
        unsafe {
            rasterio::copy_layout(resampled.as_ptr(), &resampled_layout, buf.as_mut_ptr(), layout)
        };
        Ok(())
    }

    /// The window as a packed grid of [`RasterBand::band_type`] words.
    fn read_native(&self, window: &Window) -> Result<Vec<u8>> {
        match &self.source {
            BandSource::Band(data) => data.read_packed(window),
            BandSource::Mask(mask) => mask.read_packed(window),
            BandSource::AllValidMask { .. } => {
                let mut out = zeroed_vec(window.pixel_count())?;
                out.fill(255);
                Ok(out)
            }
            BandSource::NoDataMask {
                parent, no_data, ..
            } => nodata_mask_window(parent, *no_data, window),
        }
    }

    pub(crate) fn write_window(&mut self, window: &Window, buf: &[u8], layout: &BufferLayout) -> Result<()> {
        let data = self.data_mut("RasterBand::write")?;
        data.pixels.check_writable()?;
        layout.check_len(buf.len(), 1, 0)?;
        if layout.size == window.size {
            // SAFETY: window and buffer extents were checked; the buffer is
            // only read from.
            unsafe {
                rasterio::copy_window(
                    &data.pixels,
                    RwFlag::Write,
                    window,
                    buf.as_ptr() as *mut u8,
                    layout,
                )
            };
            return Ok(());
        }
        // Writes with a different buffer size replicate the nearest pixel.
        let native_type = data.pixels.data_type;
        let mut gathered = zeroed_vec(rasterio::grid_len(layout.size, native_type)?)?;
        let gathered_layout = BufferLayout::packed(layout.size, native_type);
        // SAFETY: both grids were sized for their layouts.
        unsafe { rasterio::copy_layout(buf.as_ptr(), layout, gathered.as_mut_ptr(), &gathered_layout) };
        let src = ResampleSource {
            data: &gathered,
            data_type: native_type,
            size: layout.size,
            mask: None,
            no_data: None,
        };
        let mut resampled = zeroed_vec(rasterio::grid_len(window.size, native_type)?)?;
        BuiltinResampler.resample(ResampleAlg::NearestNeighbour, &src, &mut resampled, window.size)?;
        let window_layout = BufferLayout::packed(window.size, native_type);
        // SAFETY: as above.
        unsafe {
            rasterio::copy_window(
                &data.pixels,
                RwFlag::Write,
                window,
                resampled.as_mut_ptr(),
                &window_layout,
            )
        };
        Ok(())
    }

    /// Read raw bytes of `buf_type` words from this band.
    ///
    /// # Arguments
    /// * window - the window position from top left
    /// * window_size - the window size
    /// * buf_size - the size of the buffer grid; pixels are resampled with
    ///   `e_resample_alg` when it differs from `window_size`
    /// * spacing - byte offsets between pixels and between lines, packed
    ///   when `None`
    #[allow(clippy::too_many_arguments)]
    pub fn read_raw(
        &self,
        window: (isize, isize),
        window_size: (usize, usize),
        buf_size: (usize, usize),
        buf_type: GdalDataType,
        spacing: Option<(usize, usize)>,
        buffer: &mut [u8],
        e_resample_alg: Option<ResampleAlg>,
    ) -> Result<()> {
        let window = Window::new(window, window_size, self.size()).or_else(raise)?;
        let layout = caller_layout(buf_size, buf_type, spacing).or_else(raise)?;
        self.read_window(&window, buffer, &layout, e_resample_alg.unwrap_or_default())
            .or_else(raise)
    }

    /// Write raw bytes of `buf_type` words to this band. Arguments are as
    /// for [`RasterBand::read_raw`]; a buffer of a different size than the
    /// window is spread with nearest neighbour.
    #[allow(clippy::too_many_arguments)]
    pub fn write_raw(
        &mut self,
        window: (isize, isize),
        window_size: (usize, usize),
        buf_size: (usize, usize),
        buf_type: GdalDataType,
        spacing: Option<(usize, usize)>,
        buffer: &[u8],
    ) -> Result<()> {
        let window = Window::new(window, window_size, self.size()).or_else(raise)?;
        let layout = caller_layout(buf_size, buf_type, spacing).or_else(raise)?;
        self.write_window(&window, buffer, &layout).or_else(raise)
    }

    /// Read data from this band into a slice, where `T` implements [`GdalType`]
    ///
    /// # Arguments
    /// * window - the window position from top left
    /// * window_size - the window size (pixels are resampled if window_size != size)
    /// * size - the desired size to read
    /// * buffer - a slice to hold the data (length must equal product of size parameter)
    /// * e_resample_alg - the resample algorithm used for the interpolation, nearest
    ///   neighbour when `None`
    pub fn read_into_slice<T: Copy + GdalType>(
        &self,
        window: (isize, isize),
        window_size: (usize, usize),
        size: (usize, usize),
        buffer: &mut [T],
        e_resample_alg: Option<ResampleAlg>,
    ) -> Result<()> {
        if size.0.checked_mul(size.1) != Some(buffer.len()) {
            return raise(GdalError::BadArgument(format!(
                "buffer of {} values does not match size {size:?}",
                buffer.len()
            )));
        }
        self.read_raw(
            window,
            window_size,
            size,
            T::datatype(),
            None,
            bytemuck::cast_slice_mut(buffer),
            e_resample_alg,
        )
    }

    /// Read a [`Buffer<T>`] from this band, where `T` implements [`GdalType`].
    ///
    /// # Arguments
    /// * window - the window position from top left
    /// * window_size - the window size (pixels are resampled if window_size != size)
    /// * size - the desired size of the 'Buffer'
    /// * e_resample_alg - the resample algorithm used for the interpolation
    ///
    /// # Example
    ///
    /// ```rust
    /// # fn main() -> gdal_mem::errors::Result<()> {
    /// use gdal_mem::{Driver, GdalDataType};
    /// let dataset = Driver::mem().create_with_band_type::<u16, _>("", 4, 2, 1)?;
    /// let mut band = dataset.rasterband(1)?;
    /// assert_eq!(band.band_type(), GdalDataType::UInt16);
    /// band.write((0, 0), (4, 2), &gdal_mem::raster::Buffer::new((4, 2), (0u16..8).collect()))?;
    /// let buf = band.read_as::<u8>((1, 0), (2, 2), (2, 2), None)?;
    /// assert_eq!(buf.data, [1, 2, 5, 6]);
    /// # Ok(())
    /// # }
    /// ```
    pub fn read_as<T: Copy + GdalType>(
        &self,
        window: (isize, isize),
        window_size: (usize, usize),
        size: (usize, usize),
        e_resample_alg: Option<ResampleAlg>,
    ) -> Result<Buffer<T>> {
        let mut buffer = Buffer::zeroed(size).or_else(raise)?;
        self.read_into_slice(window, window_size, size, &mut buffer.data, e_resample_alg)?;
        Ok(buffer)
    }

    #[cfg(feature = "ndarray")]
    /// Read a [`Array2<T>`] from this band, where `T` implements [`GdalType`].
    ///
    /// # Arguments
    /// * window - the window position from top left
    /// * window_size - the window size (pixels are resampled if window_size != array_size)
    /// * array_size - the desired size of the 'Array'
    /// * e_resample_alg - the resample algorithm used for the interpolation
    ///
    /// # Docs
    /// The Matrix shape is (rows, cols) and raster shape is (cols in x-axis, rows in y-axis).
    pub fn read_as_array<T: Copy + GdalType>(
        &self,
        window: (isize, isize),
        window_size: (usize, usize),
        array_size: (usize, usize),
        e_resample_alg: Option<ResampleAlg>,
    ) -> Result<Array2<T>> {
        self.read_as::<T>(window, window_size, array_size, e_resample_alg)?
            .to_array()
    }

    /// Read the full band as a [`Buffer<T>`], where `T` implements [`GdalType`].
    pub fn read_band_as<T: Copy + GdalType>(&self) -> Result<Buffer<T>> {
        let size = self.size();
        self.read_as::<T>((0, 0), size, size, None)
    }

    fn check_block_type<T: GdalType>(&self) -> Result<()> {
        if T::datatype() != self.band_type() {
            return raise(GdalError::TypeMismatch {
                from: self.band_type().to_string(),
                to: T::datatype().to_string(),
            });
        }
        Ok(())
    }

    /// Read a block of this band, where `T` must match [`RasterBand::band_type`].
    ///
    /// # Arguments
    /// * block_index - the block index; blocks are single lines, so this is
    ///   `(0, line)`
    pub fn read_block<T: Copy + GdalType>(&self, block_index: (usize, usize)) -> Result<Buffer<T>> {
        self.check_block_type::<T>()?;
        let size = self.actual_block_size(block_index.0, block_index.1)?;
        self.read_as::<T>((0, block_index.1 as isize), size, size, None)
    }

    /// Write a block of this band, where `T` must match [`RasterBand::band_type`].
    ///
    /// # Arguments
    /// * block_index - the block index, `(0, line)`
    /// * block - the data of a whole block
    pub fn write_block<T: Copy + GdalType>(
        &mut self,
        block_index: (usize, usize),
        block: &Buffer<T>,
    ) -> Result<()> {
        self.check_block_type::<T>()?;
        let size = self.actual_block_size(block_index.0, block_index.1)?;
        if block.size != size {
            return raise(GdalError::BadArgument(format!(
                "block of size {:?} given, {size:?} expected",
                block.size
            )));
        }
        self.write((0, block_index.1 as isize), size, block)
    }

    /// Write a [`Buffer<T>`] into this band.
    ///
    /// # Arguments
    /// * window - the window position from top left
    /// * window_size - the window size (pixels are replicated if window_size != buffer.size)
    /// * buffer - the data to write into the window
    pub fn write<T: GdalType + Copy>(
        &mut self,
        window: (isize, isize),
        window_size: (usize, usize),
        buffer: &Buffer<T>,
    ) -> Result<()> {
        if buffer.size.0.checked_mul(buffer.size.1) != Some(buffer.data.len()) {
            return raise(GdalError::BadArgument(format!(
                "buffer of {} values does not match size {:?}",
                buffer.data.len(),
                buffer.size
            )));
        }
        self.write_raw(
            window,
            window_size,
            buffer.size,
            T::datatype(),
            None,
            bytemuck::cast_slice(&buffer.data),
        )
    }

    /// Fill the whole band with `value`.
    pub fn fill(&mut self, value: f64) -> Result<()> {
        let data = self.data_mut("RasterBand::fill")?;
        data.pixels.check_writable().or_else(raise)?;
        let band_type = data.pixels.data_type;
        let mut word = [0u8; 16];
        // SAFETY: 16 bytes hold a word of any type.
        unsafe { convert::store_f64(word.as_mut_ptr(), band_type, value) };
        let size = self.size();
        let layout = BufferLayout {
            size,
            data_type: band_type,
            pixel_space: 0,
            line_space: 0,
        };
        // SAFETY: the full window fits the band; a zero-stride buffer reads
        // the same word for every pixel.
        unsafe {
            rasterio::copy_window(
                &data.pixels,
                RwFlag::Write,
                &Window::full(size),
                word.as_mut_ptr(),
                &layout,
            )
        };
        Ok(())
    }

    fn state(&self) -> Option<&RwLock<BandState>> {
        self.data().map(|d| &d.state)
    }

    fn no_data(&self) -> Option<NoData> {
        self.state()?.read().no_data
    }

    fn set_no_data(&mut self, no_data: Option<NoData>) -> Result<()> {
        let data = self.data_mut("RasterBand::set_no_data_value")?;
        data.state.write().no_data = no_data;
        Ok(())
    }

    /// Fetch the no-data value for this band.
    pub fn no_data_value(&self) -> Option<f64> {
        self.no_data().map(NoData::as_f64)
    }

    /// Set the no-data value of this band.
    ///
    /// If `no_data` is `None`, any existing no-data value is deleted.
    pub fn set_no_data_value(&mut self, no_data: Option<f64>) -> Result<()> {
        self.set_no_data(no_data.map(NoData::Float))
    }

    /// Fetch the no-data value of an `Int64` band.
    pub fn no_data_value_i64(&self) -> Option<i64> {
        match self.no_data()? {
            NoData::Int(v) => Some(v),
            NoData::UInt(v) => i64::try_from(v).ok(),
            NoData::Float(v) if v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 => {
                Some(v as i64)
            }
            NoData::Float(_) => None,
        }
    }

    /// Set the no-data value of an `Int64` band without going through `f64`.
    pub fn set_no_data_value_i64(&mut self, no_data: Option<i64>) -> Result<()> {
        self.set_no_data(no_data.map(NoData::Int))
    }

    /// Fetch the no-data value of a `UInt64` band.
    pub fn no_data_value_u64(&self) -> Option<u64> {
        match self.no_data()? {
            NoData::UInt(v) => Some(v),
            NoData::Int(v) => u64::try_from(v).ok(),
            NoData::Float(v) if v.fract() == 0.0 && v >= 0.0 && v < u64::MAX as f64 => Some(v as u64),
            NoData::Float(_) => None,
        }
    }

    /// Set the no-data value of a `UInt64` band without going through `f64`.
    pub fn set_no_data_value_u64(&mut self, no_data: Option<u64>) -> Result<()> {
        self.set_no_data(no_data.map(NoData::UInt))
    }

    pub fn scale(&self) -> Option<f64> {
        self.state()?.read().scale
    }

    pub fn set_scale(&mut self, scale: f64) -> Result<()> {
        self.data_mut("RasterBand::set_scale")?.state.write().scale = Some(scale);
        Ok(())
    }

    pub fn offset(&self) -> Option<f64> {
        self.state()?.read().offset
    }

    pub fn set_offset(&mut self, offset: f64) -> Result<()> {
        self.data_mut("RasterBand::set_offset")?.state.write().offset = Some(offset);
        Ok(())
    }

    /// Unit of the pixel values, empty when unknown.
    pub fn unit(&self) -> String {
        self.state()
            .map(|s| s.read().unit.clone())
            .unwrap_or_default()
    }

    pub fn set_unit(&mut self, unit: &str) -> Result<()> {
        self.data_mut("RasterBand::set_unit")?.state.write().unit = unit.to_string();
        Ok(())
    }

    /// Number of overviews of this band.
    pub fn overview_count(&self) -> Result<i32> {
        Ok(self.dataset.overviews.len() as i32)
    }

    /// The overview at `overview_index`, coarser as the index grows.
    pub fn overview(&self, overview_index: usize) -> Result<RasterBand<'a>> {
        let dataset: &'a Dataset = self.dataset;
        let Some(ov) = dataset.overviews.get(overview_index) else {
            return raise(GdalError::NotFound {
                name: format!("overview {overview_index}"),
                scope: format!("band {}", self.band_index),
            });
        };
        let band = ov.rasterband(self.band_index)?;
        match self.source {
            BandSource::Band(_) => Ok(band),
            _ => band.open_mask_band(),
        }
    }

    /// How the mask of this band is obtained.
    pub fn mask_flags(&self) -> Result<GdalMaskFlags> {
        match &self.source {
            BandSource::Band(data) => Ok(data.mask_flags()),
            _ => Ok(GdalMaskFlags::GMF_ALL_VALID),
        }
    }

    /// Open the mask band of this band. Bands without an explicit mask get a
    /// mask derived from their no-data value, or one reporting every pixel
    /// valid.
    pub fn open_mask_band(&self) -> Result<RasterBand<'a>> {
        let source = match self.source {
            BandSource::Band(data) => match (data.mask_band(), data.state.read().no_data) {
                (Some(mask), _) => BandSource::Mask(mask),
                (None, Some(no_data)) => BandSource::NoDataMask {
                    parent: data,
                    no_data,
                    metadata: RwLock::default(),
                },
                (None, None) => BandSource::AllValidMask {
                    metadata: RwLock::default(),
                },
            },
            _ => BandSource::AllValidMask {
                metadata: RwLock::default(),
            },
        };
        Ok(RasterBand {
            dataset: self.dataset,
            band_index: self.band_index,
            source,
        })
    }

    /// Create a zero-filled mask band for this band.
    ///
    /// With `shared_between_all_bands` the mask is created on band 1 and
    /// becomes the mask of every band of the dataset.
    pub fn create_mask_band(&mut self, shared_between_all_bands: bool) -> Result<()> {
        if self.parent().is_some() {
            return raise(GdalError::Unsupported {
                method_name: "RasterBand::create_mask_band",
                msg: "mask bands cannot have masks".to_string(),
            });
        }
        create_mask(self.dataset, self.band_index, shared_between_all_bands).or_else(raise)
    }
}

/// Install a new zeroed mask on band `band_index`, or on every band of the
/// dataset through band 1 when `per_dataset`.
pub(crate) fn create_mask(dataset: &Dataset, band_index: usize, per_dataset: bool) -> Result<()> {
    let index = if per_dataset { 1 } else { band_index };
    let band = dataset
        .bands
        .get(index - 1)
        .ok_or_else(|| GdalError::NotFound {
            name: format!("band {index}"),
            scope: "dataset".to_string(),
        })?;
    if band.pixels.is_read_only() {
        return Err(GdalError::ReadOnly(
            "cannot create a mask on a read-only clone".to_string(),
        ));
    }
    let mask = Arc::new(BandData::new(PixelView::allocate(
        GdalDataType::UInt8,
        dataset.raster_size(),
    )?));
    if per_dataset {
        for other in &dataset.bands {
            other.state.write().mask = MaskState::Band {
                mask: mask.clone(),
                flags: GdalMaskFlags::GMF_PER_DATASET,
            };
        }
    } else {
        band.state.write().mask = MaskState::Band {
            mask,
            flags: GdalMaskFlags::empty(),
        };
    }
    tracing::debug!(band_index = index, per_dataset, "created mask band");
    Ok(())
}

fn caller_layout(
    size: (usize, usize),
    data_type: GdalDataType,
    spacing: Option<(usize, usize)>,
) -> Result<BufferLayout> {
    match spacing {
        None => {
            data_type.checked_size()?;
            rasterio::grid_len(size, data_type)?;
            Ok(BufferLayout::packed(size, data_type))
        }
        Some((pixel_space, line_space)) => {
            BufferLayout::spaced(size, data_type, pixel_space, line_space)
        }
    }
}

fn nodata_mask_window(parent: &BandData, no_data: NoData, window: &Window) -> Result<Vec<u8>> {
    let mut out = zeroed_vec(window.pixel_count())?;
    let band_type = parent.pixels.data_type;
    match no_data {
        NoData::Int(nd) => {
            let values = read_window_as::<i64>(parent, window)?;
            for (m, v) in out.iter_mut().zip(values) {
                *m = if v == nd { 0 } else { 255 };
            }
        }
        NoData::UInt(nd) => {
            let values = read_window_as::<u64>(parent, window)?;
            for (m, v) in out.iter_mut().zip(values) {
                *m = if v == nd { 0 } else { 255 };
            }
        }
        NoData::Float(nd) => {
            // compare at the precision of the band
            let mut word = [0u8; 16];
            // SAFETY: 16 bytes hold a word of any type.
            let nd = unsafe {
                convert::store_f64(word.as_mut_ptr(), band_type, nd);
                convert::load_f64(word.as_ptr(), band_type)
            };
            let values = read_window_as::<f64>(parent, window)?;
            for (m, v) in out.iter_mut().zip(values) {
                let invalid = if nd.is_nan() { v.is_nan() } else { v == nd };
                *m = if invalid { 0 } else { 255 };
            }
        }
    }
    Ok(out)
}

fn read_window_as<T: GdalType>(data: &BandData, window: &Window) -> Result<Vec<T>> {
    let mut values = zeroed_vec::<T>(window.pixel_count())?;
    let layout = BufferLayout::packed(window.size, T::datatype());
    // SAFETY: the window was validated and `values` holds a packed grid.
    unsafe {
        rasterio::copy_window(
            &data.pixels,
            RwFlag::Read,
            window,
            values.as_mut_ptr() as *mut u8,
            &layout,
        )
    };
    Ok(values)
}

impl<'a> MajorObject for RasterBand<'a> {
    fn metadata_store(&self) -> &RwLock<MetadataStore> {
        match &self.source {
            BandSource::Band(data) => &data.metadata,
            BandSource::Mask(mask) => &mask.metadata,
            BandSource::NoDataMask { metadata, .. } | BandSource::AllValidMask { metadata } => {
                metadata
            }
        }
    }
}

impl<'a> Metadata for RasterBand<'a> {}

impl<'a> std::fmt::Debug for RasterBand<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterBand")
            .field("band_index", &self.band_index)
            .field("band_type", &self.band_type())
            .field("size", &self.size())
            .field("is_mask", &self.is_mask())
            .finish()
    }
}
