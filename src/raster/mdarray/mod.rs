//! Multidimensional arrays: groups, dimensions, arrays and attributes held
//! in memory.
//!
//! ```
//! use gdal_mem::{Driver, GdalDataType};
//!
//! let dataset = Driver::mem().create_multidimensional("", None)?;
//! let root = dataset.root_group()?;
//! let x = root.create_dimension("x", "HORIZONTAL_X", "EAST", 3)?;
//! let array = root.create_md_array("values", &[x], GdalDataType::Int32.into())?;
//! array.write(vec![0], vec![3], &[1i32, 2, 3])?;
//! assert_eq!(array.read_as::<i32>(vec![1], vec![2])?, vec![2, 3]);
//! # Ok::<(), gdal_mem::errors::GdalError>(())
//! ```

mod attribute;
mod datatype;
mod dimension;
mod group;
mod strided;

use std::collections::{BTreeMap, HashMap};
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Weak};

use bytemuck::Zeroable;
use parking_lot::{Mutex, MutexGuard};

#[cfg(feature = "ndarray")]
use ndarray::{ArrayD, IxDyn};

pub use attribute::Attribute;
pub use datatype::{EdtComponent, ExtendedDataType, ExtendedDataTypeClass};
pub use dimension::Dimension;
pub use group::Group;

use attribute::{AttributeMap, AttributeOwner};
use datatype::StringSlots;
use dimension::DimensionInner;
use group::GroupInner;
use strided::StridedBuffer;

use crate::cpl::{self, raise};
use crate::errors::{GdalError, Result};
use crate::raster::{convert, GdalDataType, GdalType};
use crate::spatial_ref::SpatialRef;

pub(crate) fn check_name(name: &str, what: &str) -> Result<()> {
    if name.is_empty() {
        return Err(GdalError::BadArgument(format!(
            "empty {what} name not supported"
        )));
    }
    Ok(())
}

pub(crate) fn child_full_name(parent_full_name: &str, name: &str) -> String {
    if parent_full_name == "/" {
        format!("/{name}")
    } else {
        format!("{parent_full_name}/{name}")
    }
}

pub(crate) struct ArrayInner {
    pub(crate) name: String,
    pub(crate) full_name: String,
    parent: Weak<Mutex<GroupInner>>,
    dims: Vec<Arc<Mutex<DimensionInner>>>,
    buffer: StridedBuffer,
    no_data: Option<Vec<u8>>,
    pub(crate) attributes: AttributeMap,
    unit: String,
    offset: Option<f64>,
    scale: Option<f64>,
    spatial_ref: Option<SpatialRef>,
    writable: bool,
    modified: bool,
    valid: bool,
}

impl ArrayInner {
    pub(crate) fn new(
        parent: &Arc<Mutex<GroupInner>>,
        parent_full_name: &str,
        name: &str,
        dims: Vec<Arc<Mutex<DimensionInner>>>,
        buffer: StridedBuffer,
    ) -> Self {
        Self {
            name: name.to_string(),
            full_name: child_full_name(parent_full_name, name),
            parent: Arc::downgrade(parent),
            dims,
            buffer,
            no_data: None,
            attributes: AttributeMap::default(),
            unit: String::new(),
            offset: None,
            scale: None,
            spatial_ref: None,
            writable: true,
            modified: false,
            valid: true,
        }
    }

    fn deleted(&self) -> GdalError {
        GdalError::Deleted {
            object: format!("Array {}", self.full_name),
        }
    }

    fn numeric_type(&self, method_name: &'static str) -> Result<GdalDataType> {
        let data_type = self.buffer.data_type();
        match data_type.class() {
            ExtendedDataTypeClass::Numeric => Ok(data_type.numeric_datatype()),
            _ => Err(GdalError::Unsupported {
                method_name,
                msg: format!("array {} has data type {data_type}", self.full_name),
            }),
        }
    }

    /// Resize the buffer alone, leaving dimensions untouched.
    fn resize_buffer(&mut self, new_sizes: &[usize]) -> Result<()> {
        if !self.valid {
            return Err(self.deleted());
        }
        if !self.writable {
            return Err(GdalError::ReadOnly(format!(
                "array {} is not writable",
                self.full_name
            )));
        }
        self.buffer.resize(new_sizes)?;
        self.modified = true;
        Ok(())
    }
}

/// Mark an array and its attributes as deleted.
pub(crate) fn invalidate_array(array: &Arc<Mutex<ArrayInner>>) {
    let attributes = {
        let mut a = array.lock();
        a.valid = false;
        a.attributes.handles()
    };
    attribute::invalidate_all(&attributes);
}

/// An N-dimensional typed array living in a [`Group`].
///
/// Handles are cheap to clone and share the same array. After the array is
/// deleted, or invalidated by a failed resize, every operation fails with
/// [`GdalError::Deleted`].
#[derive(Clone)]
pub struct MDArray {
    pub(crate) inner: Arc<Mutex<ArrayInner>>,
}

impl Debug for MDArray {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let a = self.inner.lock();
        f.debug_struct("MDArray")
            .field("full_name", &a.full_name)
            .field("dims", &a.buffer.dims())
            .field("data_type", a.buffer.data_type())
            .finish()
    }
}

impl MDArray {
    fn lock_valid(&self) -> Result<MutexGuard<'_, ArrayInner>> {
        let a = self.inner.lock();
        if !a.valid {
            return raise(a.deleted());
        }
        Ok(a)
    }

    fn lock_writable(&self) -> Result<MutexGuard<'_, ArrayInner>> {
        let a = self.lock_valid()?;
        if !a.writable {
            return raise(GdalError::ReadOnly(format!(
                "array {} is not writable",
                a.full_name
            )));
        }
        Ok(a)
    }

    pub fn name(&self) -> String {
        self.inner.lock().name.clone()
    }

    pub fn full_name(&self) -> String {
        self.inner.lock().full_name.clone()
    }

    pub fn is_valid(&self) -> bool {
        self.inner.lock().valid
    }

    pub fn is_writable(&self) -> bool {
        self.inner.lock().writable
    }

    /// Allow or forbid writes, resizes and renames.
    pub fn set_writable(&self, writable: bool) {
        self.inner.lock().writable = writable;
    }

    /// Whether the array was written since its creation.
    pub fn is_modified(&self) -> bool {
        self.inner.lock().modified
    }

    pub fn num_dimensions(&self) -> usize {
        self.inner.lock().dims.len()
    }

    pub fn num_elements(&self) -> u64 {
        self.inner.lock().buffer.num_elements() as u64
    }

    pub fn dimensions(&self) -> Result<Vec<Dimension>> {
        Ok(self
            .lock_valid()?
            .dims
            .iter()
            .map(|inner| Dimension {
                inner: inner.clone(),
            })
            .collect())
    }

    pub fn datatype(&self) -> ExtendedDataType {
        self.inner.lock().buffer.data_type().clone()
    }

    /// Whether the array owns its memory, as opposed to wrapping caller memory.
    pub fn owns_buffer(&self) -> bool {
        self.inner.lock().buffer.owns_buffer()
    }

    /// Read a hyperslab into a byte buffer of `buffer_type` elements.
    ///
    /// # Params
    /// * array_start_index - first index along each dimension
    /// * count - number of values along each dimension, at least 1
    /// * array_step - step along each dimension, may be negative, defaults to 1
    /// * buffer_stride - distance in elements between consecutive values of
    ///   `buffer` along each dimension, may be negative; defaults to a packed
    ///   layout with the last dimension varying fastest
    ///
    /// `buffer_type` must not hold dynamic memory: use
    /// [`read_as_string_array`](Self::read_as_string_array) for strings.
    pub fn read_raw(
        &self,
        array_start_index: &[u64],
        count: &[usize],
        array_step: Option<&[i64]>,
        buffer_stride: Option<&[isize]>,
        buffer_type: &ExtendedDataType,
        buffer: &mut [u8],
    ) -> Result<()> {
        check_plain(buffer_type, "MDArray::read_raw")?;
        let a = self.lock_valid()?;
        a.buffer
            .read_checked(
                array_start_index,
                count,
                array_step,
                buffer_stride,
                buffer_type,
                buffer,
            )
            .or_else(raise)
    }

    /// Write a hyperslab from a byte buffer of `buffer_type` elements.
    ///
    /// The parameters are those of [`read_raw`](Self::read_raw).
    pub fn write_raw(
        &self,
        array_start_index: &[u64],
        count: &[usize],
        array_step: Option<&[i64]>,
        buffer_stride: Option<&[isize]>,
        buffer_type: &ExtendedDataType,
        buffer: &[u8],
    ) -> Result<()> {
        check_plain(buffer_type, "MDArray::write_raw")?;
        let mut a = self.lock_writable()?;
        a.buffer
            .write_checked(
                array_start_index,
                count,
                array_step,
                buffer_stride,
                buffer_type,
                buffer,
            )
            .or_else(raise)?;
        a.modified = true;
        Ok(())
    }

    /// Read a packed hyperslab into `buffer`, converting values to `T`.
    ///
    /// # Params
    /// * buffer - Mutable buffer to read into
    /// * array_start_index - Values representing the starting index to read in each dimension (in [0, aoDims[i].GetSize()-1] range).
    ///   Array of GetDimensionCount() values. Must not be empty, unless for a zero-dimensional array.
    /// * count - Values representing the number of values to extract in each dimension. Array of GetDimensionCount() values.
    ///   Must not be empty, unless for a zero-dimensional array.
    ///
    pub fn read_into_slice<T: Copy + GdalType>(
        &self,
        buffer: &mut [T],
        array_start_index: Vec<u64>,
        count: Vec<usize>,
    ) -> Result<()> {
        self.read_raw(
            &array_start_index,
            &count,
            None,
            None,
            &T::datatype().into(),
            bytemuck::cast_slice_mut(buffer),
        )
    }

    /// Read a packed hyperslab as a `Vec<T>`.
    ///
    /// # Arguments
    /// * array_start_index - Values representing the starting index to read in each dimension (in [0, aoDims[i].GetSize()-1] range).
    ///   Array of GetDimensionCount() values. Must not be empty, unless for a zero-dimensional array.
    /// * count - Values representing the number of values to extract in each dimension. Array of GetDimensionCount() values.
    ///   Must not be empty, unless for a zero-dimensional array.
    ///
    pub fn read_as<T: Copy + GdalType>(
        &self,
        array_start_index: Vec<u64>,
        count: Vec<usize>,
    ) -> Result<Vec<T>> {
        let values: usize = count.iter().product();
        let mut data = vec![T::zeroed(); values];
        self.read_into_slice(&mut data, array_start_index, count)?;
        Ok(data)
    }

    #[cfg(feature = "ndarray")]
    /// Read a 'ArrayD<T>' from this array. T implements 'GdalType'.
    ///
    /// # Arguments
    /// * array_start_index - the first index along each dimension
    /// * count - the number of values along each dimension
    /// * array_size - the desired shape of the 'Array', holding as many values as `count`
    pub fn read_as_array<T: Copy + GdalType>(
        &self,
        array_start_index: Vec<u64>,
        count: Vec<usize>,
        array_size: Vec<usize>,
    ) -> Result<ArrayD<T>> {
        let data = self.read_as::<T>(array_start_index, count)?;
        let dim: IxDyn = IxDyn(&array_size);
        Ok(ArrayD::from_shape_vec(dim, data)?)
    }

    /// Write a packed hyperslab of `T` values, converting them to the array
    /// data type.
    pub fn write<T: Copy + GdalType>(
        &self,
        array_start_index: Vec<u64>,
        count: Vec<usize>,
        data: &[T],
    ) -> Result<()> {
        self.write_raw(
            &array_start_index,
            &count,
            None,
            None,
            &T::datatype().into(),
            bytemuck::cast_slice(data),
        )
    }

    /// Read the whole array as strings, in row-major order.
    ///
    /// Only arrays of [`ExtendedDataTypeClass::String`] are supported.
    pub fn read_as_string_array(&self) -> Result<Vec<String>> {
        let a = self.lock_valid()?;
        let data_type = a.buffer.data_type();
        if data_type.class() != ExtendedDataTypeClass::String {
            return raise(GdalError::Unsupported {
                method_name: "MDArray::read_as_string_array",
                msg: format!("array {} has data type {data_type}", a.full_name),
            });
        }
        let count = a.buffer.dims().to_vec();
        let mut slots = StringSlots::empty(a.buffer.num_elements());
        a.buffer
            .read_checked(
                &vec![0; count.len()],
                &count,
                None,
                None,
                &ExtendedDataType::new_string(0),
                slots.as_bytes_mut(),
            )
            .or_else(raise)?;
        Ok(slots.to_strings())
    }

    /// Write a packed hyperslab from strings, converting them to the array
    /// data type.
    pub fn write_string_array<S: AsRef<str>>(
        &self,
        array_start_index: Vec<u64>,
        count: Vec<usize>,
        values: &[S],
    ) -> Result<()> {
        let expected: usize = count.iter().product();
        if values.len() != expected {
            return raise(GdalError::BadArgument(format!(
                "expected {expected} strings, got {}",
                values.len()
            )));
        }
        let slots = StringSlots::from_strs(values);
        let mut a = self.lock_writable()?;
        a.buffer
            .write_checked(
                &array_start_index,
                &count,
                None,
                None,
                &ExtendedDataType::new_string(0),
                slots.as_bytes(),
            )
            .or_else(raise)?;
        a.modified = true;
        Ok(())
    }

    /// The no-data value in the array data type, as raw bytes.
    pub fn raw_no_data_value(&self) -> Option<Vec<u8>> {
        self.inner.lock().no_data.clone()
    }

    /// Set the no-data value from raw bytes in the array data type.
    pub fn set_raw_no_data_value(&self, value: Option<&[u8]>) -> Result<()> {
        let mut a = self.lock_valid()?;
        let data_type = a.buffer.data_type();
        if let Some(value) = value {
            check_plain(data_type, "MDArray::set_raw_no_data_value")?;
            if value.len() != data_type.size() {
                return raise(GdalError::BadArgument(format!(
                    "no-data value must be {} bytes, got {}",
                    data_type.size(),
                    value.len()
                )));
            }
        }
        a.no_data = value.map(<[u8]>::to_vec);
        Ok(())
    }

    fn set_no_data_with(
        &self,
        method_name: &'static str,
        store: impl FnOnce(&mut [u8], GdalDataType),
    ) -> Result<()> {
        let mut a = self.lock_valid()?;
        let data_type = a.numeric_type(method_name).or_else(raise)?;
        let mut raw = vec![0u8; data_type.size()];
        store(&mut raw, data_type);
        a.no_data = Some(raw);
        Ok(())
    }

    fn no_data_with<T>(&self, load: impl FnOnce(&[u8], GdalDataType) -> T) -> Option<T> {
        let a = self.inner.lock();
        let data_type = a.numeric_type("MDArray::no_data_value").ok()?;
        a.no_data.as_deref().map(|raw| load(raw, data_type))
    }

    pub fn no_data_value_as_double(&self) -> Option<f64> {
        // SAFETY: the raw value holds one element of the array type.
        self.no_data_with(|raw, dt| unsafe { convert::load_f64(raw.as_ptr(), dt) })
    }

    pub fn no_data_value_as_i64(&self) -> Option<i64> {
        self.no_data_with(|raw, dt| {
            let mut v = 0i64;
            // SAFETY: one element is converted into one `i64`.
            unsafe {
                convert::copy_words_raw(
                    raw.as_ptr(),
                    dt,
                    0,
                    bytemuck::bytes_of_mut(&mut v).as_mut_ptr(),
                    GdalDataType::Int64,
                    0,
                    1,
                )
            };
            v
        })
    }

    pub fn no_data_value_as_u64(&self) -> Option<u64> {
        self.no_data_with(|raw, dt| {
            let mut v = 0u64;
            // SAFETY: one element is converted into one `u64`.
            unsafe {
                convert::copy_words_raw(
                    raw.as_ptr(),
                    dt,
                    0,
                    bytemuck::bytes_of_mut(&mut v).as_mut_ptr(),
                    GdalDataType::UInt64,
                    0,
                    1,
                )
            };
            v
        })
    }

    /// Set or clear the no-data value. The value is converted to the array
    /// data type, which must be numeric.
    pub fn set_no_data_value(&self, no_data: Option<f64>) -> Result<()> {
        match no_data {
            // SAFETY: `raw` holds exactly one element of `dt`.
            Some(v) => self.set_no_data_with("MDArray::set_no_data_value", |raw, dt| unsafe {
                convert::store_f64(raw.as_mut_ptr(), dt, v)
            }),
            None => self.set_raw_no_data_value(None),
        }
    }

    pub fn set_no_data_value_i64(&self, no_data: Option<i64>) -> Result<()> {
        match no_data {
            Some(v) => self.set_no_data_with("MDArray::set_no_data_value_i64", |raw, dt| {
                // SAFETY: `raw` holds exactly one element of `dt`.
                unsafe {
                    convert::copy_words_raw(
                        bytemuck::bytes_of(&v).as_ptr(),
                        GdalDataType::Int64,
                        0,
                        raw.as_mut_ptr(),
                        dt,
                        0,
                        1,
                    )
                }
            }),
            None => self.set_raw_no_data_value(None),
        }
    }

    pub fn set_no_data_value_u64(&self, no_data: Option<u64>) -> Result<()> {
        match no_data {
            Some(v) => self.set_no_data_with("MDArray::set_no_data_value_u64", |raw, dt| {
                // SAFETY: `raw` holds exactly one element of `dt`.
                unsafe {
                    convert::copy_words_raw(
                        bytemuck::bytes_of(&v).as_ptr(),
                        GdalDataType::UInt64,
                        0,
                        raw.as_mut_ptr(),
                        dt,
                        0,
                        1,
                    )
                }
            }),
            None => self.set_raw_no_data_value(None),
        }
    }

    pub fn unit(&self) -> String {
        self.inner.lock().unit.clone()
    }

    pub fn set_unit(&self, unit: &str) -> Result<()> {
        self.lock_valid()?.unit = unit.to_string();
        Ok(())
    }

    pub fn spatial_reference(&self) -> Result<SpatialRef> {
        let a = self.lock_valid()?;
        match &a.spatial_ref {
            Some(srs) => Ok(srs.clone()),
            None => raise(GdalError::NotFound {
                name: "spatial reference".to_string(),
                scope: a.full_name.clone(),
            }),
        }
    }

    pub fn set_spatial_ref(&self, spatial_ref: Option<&SpatialRef>) -> Result<()> {
        self.lock_valid()?.spatial_ref = spatial_ref.cloned();
        Ok(())
    }

    pub fn offset(&self) -> Option<f64> {
        self.inner.lock().offset
    }

    pub fn set_offset(&self, offset: Option<f64>) -> Result<()> {
        self.lock_valid()?.offset = offset;
        Ok(())
    }

    pub fn scale(&self) -> Option<f64> {
        self.inner.lock().scale
    }

    pub fn set_scale(&self, scale: Option<f64>) -> Result<()> {
        self.lock_valid()?.scale = scale;
        Ok(())
    }

    pub fn create_attribute(
        &self,
        name: &str,
        dimension_sizes: &[u64],
        data_type: ExtendedDataType,
    ) -> Result<Attribute> {
        let mut a = self.lock_valid()?;
        let full_name = a.full_name.clone();
        a.attributes
            .create(
                AttributeOwner::Array(Arc::downgrade(&self.inner)),
                &full_name,
                name,
                dimension_sizes,
                data_type,
            )
            .or_else(raise)
    }

    pub fn attribute(&self, name: &str) -> Result<Attribute> {
        let a = self.lock_valid()?;
        match a.attributes.get(name) {
            Some(attribute) => Ok(attribute),
            None => raise(GdalError::NotFound {
                name: name.to_string(),
                scope: a.full_name.clone(),
            }),
        }
    }

    pub fn attributes(&self) -> Result<Vec<Attribute>> {
        Ok(self.lock_valid()?.attributes.all())
    }

    pub fn attribute_names(&self) -> Result<Vec<String>> {
        Ok(self.lock_valid()?.attributes.names())
    }

    pub fn delete_attribute(&self, name: &str) -> Result<()> {
        let mut a = self.lock_valid()?;
        let full_name = a.full_name.clone();
        a.attributes.delete(name, &full_name).or_else(raise)
    }

    /// Rename the array within its group.
    pub fn rename(&self, new_name: &str) -> Result<()> {
        check_name(new_name, "array").or_else(raise)?;
        let (parent, old_name) = {
            let a = self.lock_writable()?;
            (a.parent.upgrade(), a.name.clone())
        };
        if old_name == new_name {
            return Ok(());
        }
        let Some(parent) = parent else {
            return raise(GdalError::Deleted {
                object: format!("parent group of array {old_name}"),
            });
        };
        let parent_full_name = {
            let mut g = parent.lock();
            if g.arrays.contains_key(new_name) {
                return raise(GdalError::NameExists {
                    name: new_name.to_string(),
                    scope: g.full_name.clone(),
                });
            }
            if let Some(entry) = g.arrays.remove(&old_name) {
                g.arrays.insert(new_name.to_string(), entry);
            }
            g.full_name.clone()
        };
        let (full_name, attributes) = {
            let mut a = self.inner.lock();
            a.name = new_name.to_string();
            a.full_name = child_full_name(&parent_full_name, new_name);
            (a.full_name.clone(), a.attributes.handles())
        };
        attribute::refresh_full_names(&attributes, &full_name);
        Ok(())
    }

    /// Change the size of the array dimensions.
    ///
    /// Values in the region common to the old and new shapes are kept and new
    /// values are zero. When `propagate` is set, every other array using a
    /// resized dimension is resized along with it; if one of them fails, this
    /// array and all those arrays are invalidated. Without `propagate`, a
    /// dimension shared with another array cannot change size.
    pub fn resize(&self, new_sizes: &[usize], propagate: bool) -> Result<()> {
        self.resize_impl(new_sizes, propagate).or_else(raise)
    }

    fn resize_impl(&self, new_sizes: &[usize], propagate: bool) -> Result<()> {
        let (full_name, dims, old_sizes) = {
            let a = self.inner.lock();
            if !a.valid {
                return Err(a.deleted());
            }
            if !a.writable {
                return Err(GdalError::ReadOnly(format!(
                    "array {} is not writable",
                    a.full_name
                )));
            }
            if !a.buffer.owns_buffer() {
                return Err(GdalError::ReadOnly(format!(
                    "array {} does not own its memory",
                    a.full_name
                )));
            }
            (a.full_name.clone(), a.dims.clone(), a.buffer.dims().to_vec())
        };
        if new_sizes.len() != dims.len() {
            return Err(GdalError::BadArgument(format!(
                "expected {} dimension sizes, got {}",
                dims.len(),
                new_sizes.len()
            )));
        }

        let mut changed: HashMap<*const Mutex<DimensionInner>, usize> = HashMap::new();
        let mut seen: HashMap<*const Mutex<DimensionInner>, usize> = HashMap::new();
        let mut changed_dims = Vec::new();
        for (i, dim) in dims.iter().enumerate() {
            let key = Arc::as_ptr(dim);
            if seen.insert(key, new_sizes[i]).is_some_and(|s| s != new_sizes[i]) {
                return Err(GdalError::BadArgument(
                    "cannot resize a dimension referenced several times to different sizes"
                        .to_string(),
                ));
            }
            if new_sizes[i] != old_sizes[i] {
                if new_sizes[i] == 0 {
                    return Err(GdalError::BadArgument(
                        "illegal dimension size 0".to_string(),
                    ));
                }
                if changed.insert(key, new_sizes[i]).is_none() {
                    changed_dims.push(dim.clone());
                }
            }
        }
        if changed.is_empty() {
            return Ok(());
        }

        let mut peers: BTreeMap<String, Arc<Mutex<ArrayInner>>> = BTreeMap::new();
        for dim in &changed_dims {
            let users = dim.lock().users();
            for user in users {
                if Arc::ptr_eq(&user, &self.inner) {
                    continue;
                }
                let (valid, name) = {
                    let u = user.lock();
                    (u.valid, u.full_name.clone())
                };
                if valid {
                    peers.insert(name, user);
                }
            }
        }
        if !propagate && !peers.is_empty() {
            return Err(GdalError::BadArgument(format!(
                "a resized dimension of {full_name} is also used by {}",
                peers.keys().cloned().collect::<Vec<_>>().join(", ")
            )));
        }

        self.inner.lock().resize_buffer(new_sizes)?;

        for (peer_name, peer) in &peers {
            let peer_sizes: Vec<usize> = {
                let p = peer.lock();
                p.dims
                    .iter()
                    .zip(p.buffer.dims())
                    .map(|(d, &size)| *changed.get(&Arc::as_ptr(d)).unwrap_or(&size))
                    .collect()
            };
            let resized = peer.lock().resize_buffer(&peer_sizes);
            if let Err(e) = resized {
                cpl::warning(&format!("Resizing of array {peer_name} failed"));
                invalidate_array(&self.inner);
                for other in peers.values() {
                    invalidate_array(other);
                }
                return Err(e);
            }
            tracing::debug!(array = %full_name, peer = %peer_name, "propagated resize");
        }

        for dim in &changed_dims {
            let mut d = dim.lock();
            if let Some(&size) = changed.get(&Arc::as_ptr(dim)) {
                d.size = size;
            }
        }
        Ok(())
    }

    /// Arrays named by the `coordinates` attribute, looked up in the parent
    /// group. Names that cannot be found are reported as warnings and skipped.
    pub fn coordinate_variables(&self) -> Result<Vec<MDArray>> {
        let (coordinates, parent) = {
            let a = self.lock_valid()?;
            (a.attributes.get("coordinates"), a.parent.upgrade())
        };
        let Some(coordinates) = coordinates else {
            return Ok(Vec::new());
        };
        if coordinates.datatype().class() != ExtendedDataTypeClass::String {
            return Ok(Vec::new());
        }
        let Some(parent) = parent else {
            return Ok(Vec::new());
        };
        let mut variables = Vec::new();
        for name in coordinates.read_as_string()?.split_whitespace() {
            let found = parent.lock().arrays.get(name).cloned();
            match found {
                Some(inner) => variables.push(MDArray { inner }),
                None => cpl::warning(&format!("Cannot find variable {name}")),
            }
        }
        Ok(variables)
    }
}

/// Reject buffer types whose elements own heap memory.
fn check_plain(data_type: &ExtendedDataType, method_name: &'static str) -> Result<()> {
    if data_type.needs_free_dynamic_memory() {
        return raise(GdalError::Unsupported {
            method_name,
            msg: format!("data type {data_type} holds dynamic memory"),
        });
    }
    Ok(())
}
