use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::ptr::NonNull;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard};

use super::attribute::{self, AttributeMap, AttributeOwner};
use super::dimension::DimensionInner;
use super::strided::StridedBuffer;
use super::{check_name, child_full_name, invalidate_array, ArrayInner};
use super::{Attribute, Dimension, ExtendedDataType, MDArray};
use crate::cpl::raise;
use crate::errors::{GdalError, Result};

pub(crate) struct GroupInner {
    pub(crate) name: String,
    pub(crate) full_name: String,
    pub(crate) parent: Weak<Mutex<GroupInner>>,
    pub(crate) root: Weak<Mutex<GroupInner>>,
    pub(crate) groups: BTreeMap<String, Arc<Mutex<GroupInner>>>,
    pub(crate) arrays: BTreeMap<String, Arc<Mutex<ArrayInner>>>,
    pub(crate) dimensions: BTreeMap<String, Arc<Mutex<DimensionInner>>>,
    pub(crate) attributes: AttributeMap,
    pub(crate) valid: bool,
}

impl GroupInner {
    fn new(
        name: &str,
        full_name: String,
        parent: Weak<Mutex<GroupInner>>,
        root: Weak<Mutex<GroupInner>>,
    ) -> Self {
        Self {
            name: name.to_string(),
            full_name,
            parent,
            root,
            groups: BTreeMap::new(),
            arrays: BTreeMap::new(),
            dimensions: BTreeMap::new(),
            attributes: AttributeMap::default(),
            valid: true,
        }
    }
}

/// Mark a group and everything below it as deleted.
fn invalidate_group(group: &Arc<Mutex<GroupInner>>) {
    let (groups, arrays, dimensions, attributes) = {
        let mut g = group.lock();
        g.valid = false;
        (
            g.groups.values().cloned().collect::<Vec<_>>(),
            g.arrays.values().cloned().collect::<Vec<_>>(),
            g.dimensions.values().cloned().collect::<Vec<_>>(),
            g.attributes.handles(),
        )
    };
    for child in &groups {
        invalidate_group(child);
    }
    for array in &arrays {
        invalidate_array(array);
    }
    for dimension in &dimensions {
        dimension.lock().valid = false;
    }
    attribute::invalidate_all(&attributes);
}

/// Recompute the full names below `group`, whose own full name is current.
fn refresh_full_names(group: &Arc<Mutex<GroupInner>>) {
    let (full_name, groups, arrays, dimensions, attributes) = {
        let g = group.lock();
        (
            g.full_name.clone(),
            g.groups.values().cloned().collect::<Vec<_>>(),
            g.arrays.values().cloned().collect::<Vec<_>>(),
            g.dimensions.values().cloned().collect::<Vec<_>>(),
            g.attributes.handles(),
        )
    };
    for child in &groups {
        {
            let mut c = child.lock();
            c.full_name = child_full_name(&full_name, &c.name);
        }
        refresh_full_names(child);
    }
    for array in &arrays {
        let array_attributes = {
            let mut a = array.lock();
            a.full_name = child_full_name(&full_name, &a.name);
            a.attributes.handles()
        };
        let array_full_name = array.lock().full_name.clone();
        attribute::refresh_full_names(&array_attributes, &array_full_name);
    }
    for dimension in &dimensions {
        let mut d = dimension.lock();
        d.full_name = child_full_name(&full_name, &d.name);
    }
    attribute::refresh_full_names(&attributes, &full_name);
}

/// A named container of groups, arrays, dimensions and attributes.
///
/// The root group of a multidimensional [`Dataset`](crate::Dataset) is named
/// `/`. Handles stay usable after the group is deleted, but every operation
/// then fails with [`GdalError::Deleted`].
#[derive(Clone)]
pub struct Group {
    pub(crate) inner: Arc<Mutex<GroupInner>>,
}

impl Debug for Group {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("full_name", &self.full_name())
            .finish()
    }
}

impl Group {
    /// Create a new, empty root group.
    pub(crate) fn new_root() -> Self {
        let inner = Arc::new_cyclic(|root| {
            Mutex::new(GroupInner::new("/", "/".to_string(), Weak::new(), root.clone()))
        });
        Group { inner }
    }

    fn lock_valid(&self) -> Result<MutexGuard<'_, GroupInner>> {
        let g = self.inner.lock();
        if !g.valid {
            return raise(GdalError::Deleted {
                object: format!("Group {}", g.full_name),
            });
        }
        Ok(g)
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

    pub fn group_names(&self) -> Result<Vec<String>> {
        Ok(self.lock_valid()?.groups.keys().cloned().collect())
    }

    pub fn md_array_names(&self) -> Result<Vec<String>> {
        Ok(self.lock_valid()?.arrays.keys().cloned().collect())
    }

    pub fn dimension_names(&self) -> Result<Vec<String>> {
        Ok(self.lock_valid()?.dimensions.keys().cloned().collect())
    }

    pub fn attribute_names(&self) -> Result<Vec<String>> {
        Ok(self.lock_valid()?.attributes.names())
    }

    pub fn create_group(&self, name: &str) -> Result<Group> {
        check_name(name, "group").or_else(raise)?;
        let mut g = self.lock_valid()?;
        if g.groups.contains_key(name) {
            return raise(GdalError::NameExists {
                name: name.to_string(),
                scope: g.full_name.clone(),
            });
        }
        let child = Arc::new(Mutex::new(GroupInner::new(
            name,
            child_full_name(&g.full_name, name),
            Arc::downgrade(&self.inner),
            g.root.clone(),
        )));
        g.groups.insert(name.to_string(), child.clone());
        tracing::debug!(parent = %g.full_name, name, "created group");
        Ok(Group { inner: child })
    }

    pub fn open_group(&self, name: &str) -> Result<Group> {
        let g = self.lock_valid()?;
        match g.groups.get(name) {
            Some(inner) => Ok(Group {
                inner: inner.clone(),
            }),
            None => raise(GdalError::NotFound {
                name: name.to_string(),
                scope: g.full_name.clone(),
            }),
        }
    }

    /// Remove a sub-group. Outstanding handles to it, and to everything it
    /// contains, become invalid.
    pub fn delete_group(&self, name: &str) -> Result<()> {
        let removed = {
            let mut g = self.lock_valid()?;
            match g.groups.remove(name) {
                Some(inner) => inner,
                None => {
                    return raise(GdalError::NotFound {
                        name: name.to_string(),
                        scope: g.full_name.clone(),
                    })
                }
            }
        };
        invalidate_group(&removed);
        Ok(())
    }

    /// Rename this group within its parent. The root group cannot be renamed.
    pub fn rename(&self, new_name: &str) -> Result<()> {
        check_name(new_name, "group").or_else(raise)?;
        let (parent, old_name) = {
            let g = self.lock_valid()?;
            (g.parent.upgrade(), g.name.clone())
        };
        let Some(parent) = parent else {
            return raise(GdalError::Unsupported {
                method_name: "Group::rename",
                msg: "cannot rename the root group".to_string(),
            });
        };
        if old_name == new_name {
            return Ok(());
        }
        let parent_full_name = {
            let mut p = parent.lock();
            if p.groups.contains_key(new_name) {
                return raise(GdalError::NameExists {
                    name: new_name.to_string(),
                    scope: p.full_name.clone(),
                });
            }
            if let Some(entry) = p.groups.remove(&old_name) {
                p.groups.insert(new_name.to_string(), entry);
            }
            p.full_name.clone()
        };
        {
            let mut g = self.inner.lock();
            g.name = new_name.to_string();
            g.full_name = child_full_name(&parent_full_name, new_name);
        }
        refresh_full_names(&self.inner);
        Ok(())
    }

    /// Create a dimension of `size` values.
    ///
    /// `kind` and `direction` are free-form tags, such as `HORIZONTAL_Y` and
    /// `NORTH`, and may be empty.
    pub fn create_dimension(
        &self,
        name: &str,
        kind: &str,
        direction: &str,
        size: usize,
    ) -> Result<Dimension> {
        check_name(name, "dimension").or_else(raise)?;
        let mut g = self.lock_valid()?;
        if g.dimensions.contains_key(name) {
            return raise(GdalError::NameExists {
                name: name.to_string(),
                scope: g.full_name.clone(),
            });
        }
        let inner = Arc::new(Mutex::new(DimensionInner::new(
            &self.inner,
            &g.full_name,
            name,
            kind,
            direction,
            size,
        )));
        g.dimensions.insert(name.to_string(), inner.clone());
        Ok(Dimension { inner })
    }

    pub fn open_dimension(&self, name: &str) -> Result<Dimension> {
        let g = self.lock_valid()?;
        match g.dimensions.get(name) {
            Some(inner) => Ok(Dimension {
                inner: inner.clone(),
            }),
            None => raise(GdalError::NotFound {
                name: name.to_string(),
                scope: g.full_name.clone(),
            }),
        }
    }

    pub fn dimensions(&self) -> Result<Vec<Dimension>> {
        Ok(self
            .lock_valid()?
            .dimensions
            .values()
            .map(|inner| Dimension {
                inner: inner.clone(),
            })
            .collect())
    }

    fn dimension_handles(dimensions: &[Dimension]) -> Result<Vec<(Arc<Mutex<DimensionInner>>, usize)>> {
        dimensions
            .iter()
            .map(|dim| {
                let d = dim.inner.lock();
                if !d.valid {
                    return raise(GdalError::Deleted {
                        object: format!("Dimension {}", d.full_name),
                    });
                }
                Ok((dim.inner.clone(), d.size))
            })
            .collect()
    }

    fn insert_md_array(
        &self,
        name: &str,
        dimensions: Vec<Arc<Mutex<DimensionInner>>>,
        buffer: StridedBuffer,
    ) -> Result<MDArray> {
        let inner = {
            let mut g = self.lock_valid()?;
            if g.arrays.contains_key(name) {
                return raise(GdalError::NameExists {
                    name: name.to_string(),
                    scope: g.full_name.clone(),
                });
            }
            let inner = Arc::new(Mutex::new(ArrayInner::new(
                &self.inner,
                &g.full_name,
                name,
                dimensions.clone(),
                buffer,
            )));
            g.arrays.insert(name.to_string(), inner.clone());
            tracing::debug!(parent = %g.full_name, name, "created array");
            inner
        };
        for dimension in &dimensions {
            dimension.lock().register_using_array(&inner);
        }
        Ok(MDArray { inner })
    }

    /// Create a zero-filled array over `dimensions`.
    pub fn create_md_array(
        &self,
        name: &str,
        dimensions: &[Dimension],
        data_type: ExtendedDataType,
    ) -> Result<MDArray> {
        check_name(name, "array").or_else(raise)?;
        drop(self.lock_valid()?);
        let handles = Self::dimension_handles(dimensions)?;
        let sizes: Vec<usize> = handles.iter().map(|(_, size)| *size).collect();
        let buffer = StridedBuffer::new(&sizes, data_type).or_else(raise)?;
        self.insert_md_array(name, handles.into_iter().map(|(d, _)| d).collect(), buffer)
    }

    /// Create an array over caller-owned memory.
    ///
    /// `strides` are in bytes and default to a packed layout with the last
    /// dimension varying fastest. Every element they address must lie within
    /// the `len` bytes at `data`. The array cannot be resized.
    ///
    /// # Safety
    /// `data` must stay valid for reads and writes of `len` bytes for as long
    /// as any handle to the array exists, and must not be accessed through
    /// other paths while the array is used. For string data types each
    /// element must be zeroed.
    pub unsafe fn create_md_array_from_raw(
        &self,
        name: &str,
        dimensions: &[Dimension],
        data_type: ExtendedDataType,
        data: NonNull<u8>,
        len: usize,
        strides: Option<&[isize]>,
    ) -> Result<MDArray> {
        check_name(name, "array").or_else(raise)?;
        drop(self.lock_valid()?);
        let handles = Self::dimension_handles(dimensions)?;
        let sizes: Vec<usize> = handles.iter().map(|(_, size)| *size).collect();
        let buffer =
            StridedBuffer::from_external(data, len, &sizes, data_type, strides).or_else(raise)?;
        self.insert_md_array(name, handles.into_iter().map(|(d, _)| d).collect(), buffer)
    }

    pub fn open_md_array(&self, name: &str) -> Result<MDArray> {
        let g = self.lock_valid()?;
        match g.arrays.get(name) {
            Some(inner) => Ok(MDArray {
                inner: inner.clone(),
            }),
            None => raise(GdalError::NotFound {
                name: name.to_string(),
                scope: g.full_name.clone(),
            }),
        }
    }

    /// Remove an array. Outstanding handles to it become invalid.
    pub fn delete_md_array(&self, name: &str) -> Result<()> {
        let removed = {
            let mut g = self.lock_valid()?;
            match g.arrays.remove(name) {
                Some(inner) => inner,
                None => {
                    return raise(GdalError::NotFound {
                        name: name.to_string(),
                        scope: g.full_name.clone(),
                    })
                }
            }
        };
        invalidate_array(&removed);
        Ok(())
    }

    /// Open an array from its full name, such as `/group/array`, starting at
    /// the root group.
    pub fn open_md_array_from_fullname(&self, full_name: &str) -> Result<MDArray> {
        let root = self.lock_valid()?.root.upgrade();
        let Some(root) = root else {
            return raise(GdalError::Deleted {
                object: "root group".to_string(),
            });
        };
        let Some(path) = full_name.strip_prefix('/') else {
            return raise(GdalError::BadArgument(format!(
                "'{full_name}' is not a full name"
            )));
        };
        let mut parts: Vec<&str> = path.split('/').collect();
        let array_name = parts.pop().unwrap_or_default();
        let mut group = Group { inner: root };
        for part in parts {
            group = group.open_group(part)?;
        }
        group.open_md_array(array_name)
    }

    pub fn create_attribute(
        &self,
        name: &str,
        dimension_sizes: &[u64],
        data_type: ExtendedDataType,
    ) -> Result<Attribute> {
        let mut g = self.lock_valid()?;
        let full_name = g.full_name.clone();
        g.attributes
            .create(
                AttributeOwner::Group(Arc::downgrade(&self.inner)),
                &full_name,
                name,
                dimension_sizes,
                data_type,
            )
            .or_else(raise)
    }

    pub fn attribute(&self, name: &str) -> Result<Attribute> {
        let g = self.lock_valid()?;
        match g.attributes.get(name) {
            Some(attribute) => Ok(attribute),
            None => raise(GdalError::NotFound {
                name: name.to_string(),
                scope: g.full_name.clone(),
            }),
        }
    }

    pub fn attributes(&self) -> Result<Vec<Attribute>> {
        Ok(self.lock_valid()?.attributes.all())
    }

    pub fn delete_attribute(&self, name: &str) -> Result<()> {
        let mut g = self.lock_valid()?;
        let full_name = g.full_name.clone();
        g.attributes.delete(name, &full_name).or_else(raise)
    }
}
