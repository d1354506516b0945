use std::path::Path;
use std::ptr::NonNull;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::debug;

use crate::config;
use crate::cpl::{is_true, raise, CslStringList};
use crate::dataset::Dataset;
use crate::errors::*;
use crate::gdal_major_object::MajorObject;
use crate::metadata::{Metadata, MetadataStore};
use crate::options::{DatasetOptions, GdalOpenFlags};
use crate::raster::pixels::{PixelStorage, PixelView};
use crate::raster::{GdalDataType, GdalType, RasterCreationOptions};
use crate::spatial_ref::SpatialRef;
use crate::utils::{_parse_f64, _parse_isize, _parse_pointer, _parse_usize};

const SHORT_NAME: &str = "MEM";
const LONG_NAME: &str = "In Memory raster, vector and multidimensional raster";
const URI_PREFIX: &str = "MEM:::";

/// Configuration option that enables [`Driver::open`].
pub const ENABLE_OPEN_OPTION: &str = "GDAL_MEM_ENABLE_OPEN";

static DRIVER_METADATA: Lazy<RwLock<MetadataStore>> = Lazy::new(|| {
    let mut store = MetadataStore::new(SHORT_NAME);
    let items = [
        ("DCAP_RASTER", "YES"),
        ("DCAP_MULTIDIM_RASTER", "YES"),
        ("DCAP_CREATE", "YES"),
        ("DCAP_CREATE_MULTIDIMENSIONAL", "YES"),
        (
            "DMD_CREATIONDATATYPES",
            "Byte Int8 Int16 UInt16 Int32 UInt32 Int64 UInt64 Float32 Float64 \
             CInt16 CInt32 CFloat32 CFloat64",
        ),
        (
            "DMD_CREATIONOPTIONLIST",
            "<CreationOptionList>\
             <Option name='INTERLEAVE' type='string-select' default='BAND'>\
             <Value>BAND</Value><Value>PIXEL</Value></Option>\
             <Option name='PIXELTYPE' type='string'/>\
             </CreationOptionList>",
        ),
        ("DMD_LONGNAME", LONG_NAME),
    ];
    for (key, value) in items {
        store
            .set_item(key, value, "")
            .expect("static driver metadata is valid");
    }
    RwLock::new(store)
});

/// The in-memory driver.
///
/// ```
/// use gdal_mem::{Driver, DriverManager};
///
/// let driver = DriverManager::get_driver_by_name("MEM")?;
/// assert_eq!(driver.short_name(), "MEM");
/// let dataset = driver.create("scratch", 64, 32, 3)?;
/// assert_eq!(dataset.raster_count(), 3);
/// # Ok::<(), gdal_mem::errors::GdalError>(())
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Driver {
    _private: (),
}

impl Driver {
    /// The MEM driver.
    pub fn mem() -> Driver {
        Driver { _private: () }
    }

    pub fn short_name(&self) -> String {
        SHORT_NAME.to_string()
    }

    pub fn long_name(&self) -> String {
        LONG_NAME.to_string()
    }

    /// Create a new dataset of size (`size_x`, `size_y`) and `bands` band count,
    /// and [`u8`] as the cell data type.
    ///
    /// To specify an alternative data type (e.g. [`f32`]), use [`Driver::create_with_band_type`].
    ///
    /// See also: [`create_with_band_type_with_options`](Driver::create_with_band_type_with_options).
    ///
    /// # Example
    ///
    /// ```rust, no_run
    /// # fn main() -> gdal_mem::errors::Result<()> {
    /// use gdal_mem::Driver;
    /// use gdal_mem::raster::GdalDataType;
    /// let d = Driver::mem();
    /// let ds = d.create("in-memory", 64, 64, 3)?;
    /// assert_eq!(ds.raster_count(), 3);
    /// assert_eq!(ds.raster_size(), (64, 64));
    /// assert_eq!(ds.rasterband(1)?.band_type(), GdalDataType::UInt8);
    /// # Ok(())
    /// # }
    /// ```
    pub fn create<P: AsRef<Path>>(
        &self,
        filename: P,
        size_x: usize,
        size_y: usize,
        bands: usize,
    ) -> Result<Dataset> {
        self.create_with_band_type::<u8, _>(filename, size_x, size_y, bands)
    }

    /// Create a new dataset of size (`size_x`, `size_y`) and `bands` band count,
    /// with cell data type specified by `T`.
    ///
    /// See also: [`create`](Driver::create), [`create_with_band_type_with_options`](Driver::create_with_band_type_with_options).
    ///
    /// # Example
    ///
    /// ```rust, no_run
    /// # fn main() -> gdal_mem::errors::Result<()> {
    /// use gdal_mem::Driver;
    /// use gdal_mem::raster::GdalDataType;
    /// let d = Driver::mem();
    /// let ds = d.create_with_band_type::<f64, _>("in-memory", 64, 64, 3)?;
    /// assert_eq!(ds.raster_count(), 3);
    /// assert_eq!(ds.raster_size(), (64, 64));
    /// assert_eq!(ds.rasterband(1)?.band_type(), GdalDataType::Float64);
    /// # Ok(())
    /// # }
    /// ```
    pub fn create_with_band_type<T: GdalType, P: AsRef<Path>>(
        &self,
        filename: P,
        size_x: usize,
        size_y: usize,
        bands: usize,
    ) -> Result<Dataset> {
        let options = Default::default();
        self.create_with_band_type_with_options::<T, P>(filename, size_x, size_y, bands, &options)
    }

    /// Create dataset with creation options.
    ///
    /// Recognised options are `INTERLEAVE=BAND|PIXEL` (`PIXEL` allocates one
    /// buffer holding the bands of each pixel next to each other) and
    /// `PIXELTYPE=SIGNEDBYTE`, which is recorded in the `IMAGE_STRUCTURE`
    /// metadata of byte bands.
    ///
    /// # Example
    ///
    /// ```rust, no_run
    /// # fn main() -> gdal_mem::errors::Result<()> {
    /// use gdal_mem::{Driver, Metadata};
    /// use gdal_mem::raster::RasterCreationOptions;
    ///
    /// let options = RasterCreationOptions::from(&[("INTERLEAVE", "PIXEL")]);
    /// let ds = Driver::mem().create_with_band_type_with_options::<u8, _>(
    ///     "interleaved", 2048, 2048, 3, &options)?;
    /// assert_eq!(ds.metadata_item("INTERLEAVE", "IMAGE_STRUCTURE"), Some("PIXEL".to_string()));
    /// # Ok(())
    /// # }
    /// ```
    pub fn create_with_band_type_with_options<T: GdalType, P: AsRef<Path>>(
        &self,
        filename: P,
        size_x: usize,
        size_y: usize,
        bands: usize,
        options: &RasterCreationOptions,
    ) -> Result<Dataset> {
        self._create(
            filename.as_ref(),
            (size_x, size_y),
            bands,
            T::datatype(),
            options,
        )
    }

    /// Create a dataset of `bands` bands of `data_type`, chosen at runtime.
    pub fn create_with_data_type<P: AsRef<Path>>(
        &self,
        filename: P,
        size: (usize, usize),
        bands: usize,
        data_type: GdalDataType,
        options: &RasterCreationOptions,
    ) -> Result<Dataset> {
        self._create(filename.as_ref(), size, bands, data_type, options)
    }

    fn _create(
        &self,
        filename: &Path,
        size: (usize, usize),
        bands: usize,
        data_type: GdalDataType,
        options: &RasterCreationOptions,
    ) -> Result<Dataset> {
        let elem_size = data_type.checked_size().or_else(raise)?;
        let interleave = options.fetch_name_value_or("INTERLEAVE", "BAND").to_ascii_uppercase();
        let pixel_interleaved = match interleave.as_str() {
            "PIXEL" => true,
            "BAND" => false,
            other => {
                return raise(GdalError::BadArgument(format!(
                    "INTERLEAVE={other} is not one of BAND or PIXEL"
                )))
            }
        };
        let signed_byte = data_type == GdalDataType::UInt8
            && options
                .fetch_name_value("PIXELTYPE")
                .is_some_and(|v| v.eq_ignore_ascii_case("SIGNEDBYTE"));

        let mut ds = Dataset::with_size(size, &filename.to_string_lossy());
        if pixel_interleaved && bands > 1 {
            let band_stride = elem_size
                .checked_mul(bands)
                .and_then(|n| n.checked_mul(size.0))
                .and_then(|line| line.checked_mul(size.1).map(|len| (line, len)))
                .filter(|(_, len)| *len <= isize::MAX as usize);
            let Some((line_stride, len)) = band_stride else {
                return raise(GdalError::OutOfMemory(format!(
                    "{}x{}x{bands} raster of {data_type} overflows",
                    size.0, size.1
                )));
            };
            let storage = PixelStorage::allocate(len).or_else(raise)?;
            for band in 0..bands {
                let pixels = PixelView::over(
                    storage.clone(),
                    (band * elem_size) as isize,
                    data_type,
                    size,
                    (elem_size * bands) as isize,
                    line_stride as isize,
                    band == 0,
                )
                .or_else(raise)?;
                ds.push_band(pixels);
            }
        } else {
            for _ in 0..bands {
                ds.add_band(data_type)?;
            }
        }
        ds.set_metadata_item(
            "INTERLEAVE",
            if pixel_interleaved { "PIXEL" } else { "BAND" },
            "IMAGE_STRUCTURE",
        )?;
        if signed_byte {
            for mut band in ds.rasterbands() {
                band.set_metadata_item("PIXELTYPE", "SIGNEDBYTE", "IMAGE_STRUCTURE")?;
            }
        }
        debug!(
            filename = %filename.display(),
            ?size,
            bands,
            %data_type,
            pixel_interleaved,
            "created dataset"
        );
        Ok(ds)
    }

    /// Create an empty multidimensional dataset; populate it through
    /// [`Dataset::root_group`].
    pub fn create_multidimensional(
        &self,
        filename: &str,
        _options: Option<&CslStringList>,
    ) -> Result<Dataset> {
        debug!(filename, "created multidimensional dataset");
        Ok(Dataset::multidimensional(filename))
    }

    /// Whether `uri` is handled by [`Driver::open`].
    pub fn identify(&self, uri: &str) -> bool {
        uri.get(..URI_PREFIX.len())
            .is_some_and(|p| p.eq_ignore_ascii_case(URI_PREFIX))
    }

    /// Delete a dataset. In-memory datasets have nothing to remove, so this
    /// always succeeds.
    pub fn delete(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    /// Open a dataset over caller memory, read-only.
    ///
    /// See [`Driver::open_ex`].
    ///
    /// # Safety
    /// As for [`Driver::open_ex`].
    pub unsafe fn open(&self, uri: &str) -> Result<Dataset> {
        self.open_ex(uri, DatasetOptions::default())
    }

    /// Open a dataset over caller memory described by a URI of the form
    /// `MEM:::key=value,key=value,...`.
    ///
    /// Keys are `PIXELS`, `LINES` and `DATAPOINTER` (required), `BANDS`
    /// (default 1), `DATATYPE` as a name or `GDT_*` code (default `Byte`),
    /// `PIXELOFFSET`, `LINEOFFSET` and `BANDOFFSET` in bytes (packed band
    /// sequential by default), `GEOTRANSFORM=a/b/c/d/e/f` and
    /// `SPATIALREFERENCE`. Values holding commas go between double quotes.
    ///
    /// Opening is refused unless the [`ENABLE_OPEN_OPTION`] configuration
    /// option is `YES`. Without `GDAL_OF_UPDATE` in `options.open_flags` the
    /// dataset is a read-only clone.
    ///
    /// # Safety
    /// `DATAPOINTER` is a raw address. Every pixel the offsets address must be
    /// valid for reads (and writes when opened for update) for as long as the
    /// dataset and its clones live.
    pub unsafe fn open_ex(&self, uri: &str, options: DatasetOptions) -> Result<Dataset> {
        if !self.identify(uri) {
            return raise(GdalError::BadArgument(format!(
                "'{uri}' is not a {URI_PREFIX} dataset"
            )));
        }
        let enabled = config::get_config_option(ENABLE_OPEN_OPTION, "NO")?;
        if !is_true(&enabled) {
            return raise(GdalError::Unsupported {
                method_name: "Driver::open",
                msg: format!(
                    "opening a MEM dataset with the {URI_PREFIX}DATAPOINTER= syntax is \
                     disabled by default; set the {ENABLE_OPEN_OPTION} configuration \
                     option to YES to allow it"
                ),
            });
        }
        let mut fields = CslStringList::new();
        for token in tokenize(&uri[URI_PREFIX.len()..]) {
            fields.add_string(&token).or_else(raise)?;
        }
        if let Some(open_options) = options.open_options {
            for (key, value) in open_options.iter() {
                fields.set_name_value(&key, &value).or_else(raise)?;
            }
        }
        let (Some(pixels), Some(lines), Some(pointer)) = (
            fields.fetch_name_value("PIXELS"),
            fields.fetch_name_value("LINES"),
            fields.fetch_name_value("DATAPOINTER"),
        ) else {
            return raise(GdalError::BadArgument(
                "missing required field (one of PIXELS, LINES or DATAPOINTER)".to_string(),
            ));
        };
        let size = (
            _parse_usize(&pixels, "PIXELS").or_else(raise)?,
            _parse_usize(&lines, "LINES").or_else(raise)?,
        );
        let bands = match fields.fetch_name_value("BANDS") {
            Some(v) => _parse_usize(&v, "BANDS").or_else(raise)?,
            None => 1,
        };
        let data_type = match fields.fetch_name_value("DATATYPE") {
            Some(v) => parse_data_type(&v).or_else(raise)?,
            None => GdalDataType::UInt8,
        };
        let elem_size = data_type.checked_size().or_else(raise)? as isize;
        let offset = |key: &'static str, default: isize| -> Result<isize> {
            match fields.fetch_name_value(key) {
                Some(v) => _parse_isize(&v, key).or_else(raise),
                None => Ok(default),
            }
        };
        let pixel_offset = offset("PIXELOFFSET", elem_size)?;
        let line_offset = offset("LINEOFFSET", pixel_offset.saturating_mul(size.0 as isize))?;
        let band_offset = offset("BANDOFFSET", line_offset.saturating_mul(size.1 as isize))?;
        let address = _parse_pointer(&pointer).or_else(raise)?;
        if address == 0 {
            return raise(GdalError::BadArgument("DATAPOINTER is null".to_string()));
        }

        let mut ds = Dataset::with_size(size, uri);
        for band in 0..bands {
            let data = (address as *mut u8).wrapping_offset(band_offset.wrapping_mul(band as isize));
            let Some(data) = NonNull::new(data) else {
                return raise(GdalError::BadArgument(format!(
                    "band {} starts at a null address",
                    band + 1
                )));
            };
            ds.add_band_from_raw(data_type, data, Some(pixel_offset), Some(line_offset))?;
        }
        if let Some(text) = fields.fetch_name_value("GEOTRANSFORM") {
            let values = text
                .split('/')
                .map(|v| _parse_f64(v, "GEOTRANSFORM"))
                .collect::<Result<Vec<f64>>>()
                .or_else(raise)?;
            let Ok(gt) = <[f64; 6]>::try_from(values.as_slice()) else {
                return raise(GdalError::ParseError {
                    value: text,
                    what: "GEOTRANSFORM of six values",
                });
            };
            ds.set_geo_transform(&gt)?;
        }
        if let Some(srs) = fields.fetch_name_value("SPATIALREFERENCE") {
            ds.set_spatial_ref(&SpatialRef::from_definition(&srs).or_else(raise)?)?;
        }
        ds.set_metadata_item("INTERLEAVE", "BAND", "IMAGE_STRUCTURE")?;
        debug!(?size, bands, %data_type, pixel_offset, line_offset, band_offset, "opened dataset over caller memory");

        if options.open_flags.is_update() {
            Ok(ds)
        } else {
            ds.clone_dataset(GdalOpenFlags::GDAL_OF_RASTER)
        }
    }
}

fn parse_data_type(value: &str) -> Result<GdalDataType> {
    match value.trim().parse::<u32>() {
        Ok(code) => GdalDataType::try_from(code),
        Err(_) => value.parse(),
    }
}

/// Split on commas outside double quotes, dropping the quotes.
fn tokenize(s: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in s.chars() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

impl MajorObject for Driver {
    fn metadata_store(&self) -> &RwLock<MetadataStore> {
        &DRIVER_METADATA
    }
}

impl Metadata for Driver {}

/// A registry of the drivers this crate provides: only MEM.
pub struct DriverManager;

impl DriverManager {
    /// Returns the number of registered drivers.
    pub fn count() -> usize {
        1
    }

    /// Returns the driver with the given index, which must be less than the value returned by
    /// `DriverManager::count()`.
    pub fn get_driver(index: usize) -> Result<Driver> {
        if index != 0 {
            return raise(GdalError::NotFound {
                name: format!("driver {index}"),
                scope: "driver manager".to_string(),
            });
        }
        Ok(Driver::mem())
    }

    /// Get one [`Driver`] by its short name, case-insensitively.
    pub fn get_driver_by_name(name: &str) -> Result<Driver> {
        if !name.eq_ignore_ascii_case(SHORT_NAME) {
            return raise(GdalError::NotFound {
                name: name.to_string(),
                scope: "driver manager".to_string(),
            });
        }
        Ok(Driver::mem())
    }

    /// The driver able to open `uri`, if any.
    pub fn get_driver_for_uri(uri: &str) -> Option<Driver> {
        let driver = Driver::mem();
        driver.identify(uri).then_some(driver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_access() {
        let driver = DriverManager::get_driver_by_name("mem").unwrap();
        assert_eq!(driver.short_name(), "MEM");
        assert_eq!(DriverManager::get_driver(0).unwrap(), driver);
        assert!(DriverManager::get_driver(1).is_err());
        assert!(DriverManager::get_driver_by_name("GTiff").is_err());
        assert_eq!(DriverManager::count(), 1);
    }

    #[test]
    fn test_driver_metadata() {
        let driver = Driver::mem();
        assert_eq!(
            driver.metadata_item("DCAP_MULTIDIM_RASTER", ""),
            Some("YES".to_string())
        );
        assert!(driver
            .metadata_item("DMD_CREATIONDATATYPES", "")
            .unwrap()
            .contains("CFloat64"));
        for key in [
            "DCAP_RASTER",
            "DCAP_CREATE",
            "DCAP_CREATE_MULTIDIMENSIONAL",
            "DMD_CREATIONOPTIONLIST",
        ] {
            assert!(driver.metadata_item(key, "").is_some(), "{key}");
        }
        assert_eq!(driver.metadata_item("DMD_LONGNAME", ""), Some(LONG_NAME.to_string()));
    }

    #[test]
    fn test_identify() {
        let driver = Driver::mem();
        assert!(driver.identify("MEM:::PIXELS=1"));
        assert!(driver.identify("mem:::"));
        assert!(!driver.identify("MEM::"));
        assert!(DriverManager::get_driver_for_uri("/tmp/x.tif").is_none());
        assert!(driver.delete("anything").is_ok());
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("PIXELS=2,,LINES=1"),
            vec!["PIXELS=2", "LINES=1"]
        );
        assert_eq!(
            tokenize(r#"SPATIALREFERENCE="EPSG:4326,extra",BANDS=2"#),
            vec!["SPATIALREFERENCE=EPSG:4326,extra", "BANDS=2"]
        );
    }

    #[test]
    fn test_parse_data_type() {
        assert_eq!(parse_data_type("Float32").unwrap(), GdalDataType::Float32);
        assert_eq!(parse_data_type("6").unwrap(), GdalDataType::Float32);
        assert_eq!(parse_data_type("byte").unwrap(), GdalDataType::UInt8);
        assert!(parse_data_type("99").is_err());
        assert!(parse_data_type("Float16").is_err());
    }

    #[test]
    fn test_create_bad_interleave() {
        let options = RasterCreationOptions::from(&[("INTERLEAVE", "LINE")]);
        let res = Driver::mem().create_with_band_type_with_options::<u8, _>("", 2, 2, 2, &options);
        assert!(matches!(res, Err(GdalError::BadArgument(_))));
    }
}
