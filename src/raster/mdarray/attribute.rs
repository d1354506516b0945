use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard};

use super::datatype::StringSlots;
use super::group::GroupInner;
use super::strided::StridedBuffer;
use super::{check_name, ArrayInner, ExtendedDataType};
use crate::cpl::raise;
use crate::errors::{GdalError, Result};
use crate::raster::GdalDataType;

#[derive(Clone)]
pub(crate) enum AttributeOwner {
    Group(Weak<Mutex<GroupInner>>),
    Array(Weak<Mutex<ArrayInner>>),
}

pub(crate) struct AttributeInner {
    name: String,
    full_name: String,
    owner: AttributeOwner,
    buffer: StridedBuffer,
    valid: bool,
    modified: bool,
}

/// Full name of an attribute whose owner is called `owner_full_name`.
pub(crate) fn attribute_full_name(owner_full_name: &str, name: &str) -> String {
    if owner_full_name == "/" {
        format!("/_GLOBAL_/{name}")
    } else {
        format!("{owner_full_name}/{name}")
    }
}

/// Attributes attached to a group or an array, sorted by name.
#[derive(Default)]
pub(crate) struct AttributeMap {
    entries: BTreeMap<String, Arc<Mutex<AttributeInner>>>,
}

impl AttributeMap {
    pub(crate) fn create(
        &mut self,
        owner: AttributeOwner,
        owner_full_name: &str,
        name: &str,
        dimension_sizes: &[u64],
        data_type: ExtendedDataType,
    ) -> Result<Attribute> {
        check_name(name, "attribute")?;
        if self.entries.contains_key(name) {
            return Err(GdalError::NameExists {
                name: name.to_string(),
                scope: owner_full_name.to_string(),
            });
        }
        let sizes = dimension_sizes
            .iter()
            .map(|&s| usize::try_from(s))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| GdalError::OutOfMemory("attribute dimension is too large".to_string()))?;
        let buffer = StridedBuffer::new(&sizes, data_type)?;
        let inner = Arc::new(Mutex::new(AttributeInner {
            name: name.to_string(),
            full_name: attribute_full_name(owner_full_name, name),
            owner,
            buffer,
            valid: true,
            modified: true,
        }));
        self.entries.insert(name.to_string(), inner.clone());
        Ok(Attribute { inner })
    }

    pub(crate) fn get(&self, name: &str) -> Option<Attribute> {
        self.entries.get(name).map(|inner| Attribute {
            inner: inner.clone(),
        })
    }

    pub(crate) fn delete(&mut self, name: &str, owner_full_name: &str) -> Result<()> {
        match self.entries.remove(name) {
            Some(inner) => {
                inner.lock().valid = false;
                Ok(())
            }
            None => Err(GdalError::NotFound {
                name: name.to_string(),
                scope: owner_full_name.to_string(),
            }),
        }
    }

    fn rename(&mut self, old_name: &str, new_name: &str, owner_full_name: &str) -> Result<()> {
        if self.entries.contains_key(new_name) {
            return Err(GdalError::NameExists {
                name: new_name.to_string(),
                scope: owner_full_name.to_string(),
            });
        }
        if let Some(inner) = self.entries.remove(old_name) {
            self.entries.insert(new_name.to_string(), inner);
        }
        Ok(())
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub(crate) fn all(&self) -> Vec<Attribute> {
        self.entries
            .values()
            .map(|inner| Attribute {
                inner: inner.clone(),
            })
            .collect()
    }

    /// Handles to every attribute, for propagation after the lock is released.
    pub(crate) fn handles(&self) -> Vec<Arc<Mutex<AttributeInner>>> {
        self.entries.values().cloned().collect()
    }
}

/// Recompute attribute full names after their owner was renamed.
pub(crate) fn refresh_full_names(attributes: &[Arc<Mutex<AttributeInner>>], owner_full_name: &str) {
    for attribute in attributes {
        let mut a = attribute.lock();
        a.full_name = attribute_full_name(owner_full_name, &a.name);
    }
}

pub(crate) fn invalidate_all(attributes: &[Arc<Mutex<AttributeInner>>]) {
    for attribute in attributes {
        attribute.lock().valid = false;
    }
}

/// A small array of metadata attached to a [`Group`](super::Group) or an
/// [`MDArray`](super::MDArray).
#[derive(Clone)]
pub struct Attribute {
    pub(crate) inner: Arc<Mutex<AttributeInner>>,
}

impl Debug for Attribute {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attribute")
            .field("full_name", &self.full_name())
            .finish()
    }
}

impl Attribute {
    fn lock_valid(&self) -> Result<MutexGuard<'_, AttributeInner>> {
        let a = self.inner.lock();
        if !a.valid {
            return raise(GdalError::Deleted {
                object: format!("Attribute {}", a.full_name),
            });
        }
        Ok(a)
    }

    pub fn name(&self) -> String {
        self.inner.lock().name.clone()
    }

    pub fn full_name(&self) -> String {
        self.inner.lock().full_name.clone()
    }

    /// Whether the attribute, and its owner, still exist.
    pub fn is_valid(&self) -> bool {
        self.inner.lock().valid
    }

    pub fn is_modified(&self) -> bool {
        self.inner.lock().modified
    }

    pub fn dimension_sizes(&self) -> Vec<usize> {
        self.inner.lock().buffer.dims().to_vec()
    }

    pub fn datatype(&self) -> ExtendedDataType {
        self.inner.lock().buffer.data_type().clone()
    }

    pub fn num_elements(&self) -> u64 {
        self.inner.lock().buffer.num_elements() as u64
    }

    fn read_all(&self, count_first_only: bool, buf_type: &ExtendedDataType, out: &mut [u8]) -> Result<()> {
        let a = self.lock_valid()?;
        let rank = a.buffer.dims().len();
        let count = if count_first_only {
            vec![1; rank]
        } else {
            a.buffer.dims().to_vec()
        };
        a.buffer
            .read_checked(&vec![0; rank], &count, None, None, buf_type, out)
            .or_else(raise)
    }

    fn write_all(&self, count_first_only: bool, buf_type: &ExtendedDataType, data: &[u8]) -> Result<()> {
        let mut a = self.lock_valid()?;
        let rank = a.buffer.dims().len();
        let count = if count_first_only {
            vec![1; rank]
        } else {
            a.buffer.dims().to_vec()
        };
        a.buffer
            .write_checked(&vec![0; rank], &count, None, None, buf_type, data)
            .or_else(raise)?;
        a.modified = true;
        Ok(())
    }

    fn check_len(&self, len: usize) -> Result<()> {
        let expected = self.inner.lock().buffer.num_elements();
        if len != expected {
            return raise(GdalError::BadArgument(format!(
                "attribute has {expected} values, got {len}"
            )));
        }
        Ok(())
    }

    /// Read a hyperslab of the attribute into a byte buffer of `buffer_type`
    /// elements.
    pub fn read_raw(
        &self,
        array_start_index: &[u64],
        count: &[usize],
        buffer_type: GdalDataType,
        buffer: &mut [u8],
    ) -> Result<()> {
        let buffer_type = ExtendedDataType::new_numeric(buffer_type)?;
        let a = self.lock_valid()?;
        a.buffer
            .read_checked(array_start_index, count, None, None, &buffer_type, buffer)
            .or_else(raise)
    }

    /// Write a hyperslab of the attribute from a byte buffer of `buffer_type`
    /// elements.
    pub fn write_raw(
        &self,
        array_start_index: &[u64],
        count: &[usize],
        buffer_type: GdalDataType,
        buffer: &[u8],
    ) -> Result<()> {
        let buffer_type = ExtendedDataType::new_numeric(buffer_type)?;
        let mut a = self.lock_valid()?;
        a.buffer
            .write_checked(array_start_index, count, None, None, &buffer_type, buffer)
            .or_else(raise)?;
        a.modified = true;
        Ok(())
    }

    /// Read the first value, converted to a string.
    pub fn read_as_string(&self) -> Result<String> {
        let mut slots = StringSlots::empty(1);
        self.read_all(true, &ExtendedDataType::new_string(0), slots.as_bytes_mut())?;
        Ok(slots.to_strings().remove(0))
    }

    pub fn read_as_string_array(&self) -> Result<Vec<String>> {
        let mut slots = StringSlots::empty(self.num_elements() as usize);
        self.read_all(false, &ExtendedDataType::new_string(0), slots.as_bytes_mut())?;
        Ok(slots.to_strings())
    }

    pub fn read_as_i64(&self) -> Result<i64> {
        let mut value = [0i64];
        self.read_all(true, &GdalDataType::Int64.into(), bytemuck::cast_slice_mut(&mut value))?;
        Ok(value[0])
    }

    pub fn read_as_i64_array(&self) -> Result<Vec<i64>> {
        let mut values = vec![0i64; self.num_elements() as usize];
        self.read_all(false, &GdalDataType::Int64.into(), bytemuck::cast_slice_mut(&mut values))?;
        Ok(values)
    }

    pub fn read_as_f64(&self) -> Result<f64> {
        let mut value = [0f64];
        self.read_all(true, &GdalDataType::Float64.into(), bytemuck::cast_slice_mut(&mut value))?;
        Ok(value[0])
    }

    pub fn read_as_f64_array(&self) -> Result<Vec<f64>> {
        let mut values = vec![0f64; self.num_elements() as usize];
        self.read_all(false, &GdalDataType::Float64.into(), bytemuck::cast_slice_mut(&mut values))?;
        Ok(values)
    }

    /// Write the first value from a string, converting it if needed.
    pub fn write_string(&self, value: &str) -> Result<()> {
        let slots = StringSlots::from_strs(&[value]);
        self.write_all(true, &ExtendedDataType::new_string(0), slots.as_bytes())
    }

    /// Write every value. `values` must hold exactly one value per element.
    pub fn write_string_array<S: AsRef<str>>(&self, values: &[S]) -> Result<()> {
        self.check_len(values.len())?;
        let slots = StringSlots::from_strs(values);
        self.write_all(false, &ExtendedDataType::new_string(0), slots.as_bytes())
    }

    pub fn write_i64(&self, value: i64) -> Result<()> {
        self.write_all(true, &GdalDataType::Int64.into(), bytemuck::bytes_of(&value))
    }

    pub fn write_i64_array(&self, values: &[i64]) -> Result<()> {
        self.check_len(values.len())?;
        self.write_all(false, &GdalDataType::Int64.into(), bytemuck::cast_slice(values))
    }

    pub fn write_f64(&self, value: f64) -> Result<()> {
        self.write_all(true, &GdalDataType::Float64.into(), bytemuck::bytes_of(&value))
    }

    pub fn write_f64_array(&self, values: &[f64]) -> Result<()> {
        self.check_len(values.len())?;
        self.write_all(false, &GdalDataType::Float64.into(), bytemuck::cast_slice(values))
    }

    /// Rename the attribute within its owner.
    pub fn rename(&self, new_name: &str) -> Result<()> {
        check_name(new_name, "attribute").or_else(raise)?;
        let (owner, old_name) = {
            let a = self.lock_valid()?;
            (a.owner.clone(), a.name.clone())
        };
        if old_name == new_name {
            return Ok(());
        }
        let owner_full_name = match &owner {
            AttributeOwner::Group(group) => {
                let Some(group) = group.upgrade() else {
                    return raise(GdalError::Deleted {
                        object: format!("owner of attribute {old_name}"),
                    });
                };
                let mut g = group.lock();
                let full_name = g.full_name.clone();
                g.attributes
                    .rename(&old_name, new_name, &full_name)
                    .or_else(raise)?;
                full_name
            }
            AttributeOwner::Array(array) => {
                let Some(array) = array.upgrade() else {
                    return raise(GdalError::Deleted {
                        object: format!("owner of attribute {old_name}"),
                    });
                };
                let mut a = array.lock();
                let full_name = a.full_name.clone();
                a.attributes
                    .rename(&old_name, new_name, &full_name)
                    .or_else(raise)?;
                full_name
            }
        };
        let mut a = self.inner.lock();
        a.name = new_name.to_string();
        a.full_name = attribute_full_name(&owner_full_name, new_name);
        a.modified = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::mdarray::ExtendedDataTypeClass;

    fn detached(name: &str, sizes: &[u64], dt: ExtendedDataType) -> Attribute {
        let mut map = AttributeMap::default();
        map.create(AttributeOwner::Group(Weak::new()), "/g", name, sizes, dt)
            .unwrap()
    }

    #[test]
    fn test_scalar_conversions() {
        let attr = detached("answer", &[], GdalDataType::Int16.into());
        assert_eq!(attr.full_name(), "/g/answer");
        assert!(attr.dimension_sizes().is_empty());
        attr.write_f64(41.6).unwrap();
        assert_eq!(attr.read_as_i64().unwrap(), 42);
        assert_eq!(attr.read_as_string().unwrap(), "42");
        attr.write_string("-7").unwrap();
        assert_eq!(attr.read_as_f64().unwrap(), -7.0);
    }

    #[test]
    fn test_string_array() {
        let attr = detached("names", &[3], ExtendedDataType::new_string(0));
        assert_eq!(attr.datatype().class(), ExtendedDataTypeClass::String);
        assert_eq!(attr.read_as_string_array().unwrap(), vec!["", "", ""]);
        attr.write_string_array(&["lat", "lon", "12.5"]).unwrap();
        assert_eq!(attr.read_as_string().unwrap(), "lat");
        assert_eq!(
            attr.read_as_string_array().unwrap(),
            vec!["lat".to_string(), "lon".to_string(), "12.5".to_string()]
        );
        assert_eq!(attr.read_as_f64_array().unwrap(), vec![0.0, 0.0, 12.5]);
        assert!(attr.write_string_array(&["too", "short"]).is_err());
    }

    #[test]
    fn test_numeric_array() {
        let attr = detached("valid_range", &[2], GdalDataType::Float32.into());
        attr.write_f64_array(&[-1.5, 1.5]).unwrap();
        assert_eq!(attr.read_as_f64_array().unwrap(), vec![-1.5, 1.5]);
        assert_eq!(attr.read_as_i64_array().unwrap(), vec![-2, 2]);
        assert_eq!(attr.read_as_string_array().unwrap(), vec!["-1.5", "1.5"]);

        let mut raw = [0u8; 4];
        attr.read_raw(&[1], &[1], GdalDataType::Int32, &mut raw).unwrap();
        assert_eq!(i32::from_ne_bytes(raw), 2);
    }

    #[test]
    fn test_full_names() {
        assert_eq!(attribute_full_name("/", "title"), "/_GLOBAL_/title");
        assert_eq!(attribute_full_name("/g/temp", "units"), "/g/temp/units");
    }

    #[test]
    fn test_map_delete() {
        let mut map = AttributeMap::default();
        let attr = map
            .create(
                AttributeOwner::Group(Weak::new()),
                "/",
                "a",
                &[1],
                GdalDataType::UInt8.into(),
            )
            .unwrap();
        assert!(matches!(
            map.create(
                AttributeOwner::Group(Weak::new()),
                "/",
                "a",
                &[1],
                GdalDataType::UInt8.into()
            ),
            Err(GdalError::NameExists { .. })
        ));
        assert_eq!(map.names(), vec!["a"]);
        map.delete("a", "/").unwrap();
        assert!(!attr.is_valid());
        assert!(matches!(attr.read_as_i64(), Err(GdalError::Deleted { .. })));
        assert!(map.delete("a", "/").is_err());
    }
}
