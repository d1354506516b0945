use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::group::GroupInner;
use super::{check_name, child_full_name, ArrayInner, MDArray};
use crate::cpl::raise;
use crate::errors::{GdalError, Result};

pub(crate) struct DimensionInner {
    pub(crate) name: String,
    pub(crate) full_name: String,
    pub(crate) parent: Weak<Mutex<GroupInner>>,
    pub(crate) kind: String,
    pub(crate) direction: String,
    pub(crate) size: usize,
    pub(crate) indexing_variable: Option<Weak<Mutex<ArrayInner>>>,
    /// Arrays built on this dimension. Entries of dropped arrays are pruned
    /// lazily.
    pub(crate) using_arrays: Vec<Weak<Mutex<ArrayInner>>>,
    pub(crate) valid: bool,
}

impl DimensionInner {
    pub(crate) fn new(
        parent: &Arc<Mutex<GroupInner>>,
        parent_full_name: &str,
        name: &str,
        kind: &str,
        direction: &str,
        size: usize,
    ) -> Self {
        Self {
            name: name.to_string(),
            full_name: child_full_name(parent_full_name, name),
            parent: Arc::downgrade(parent),
            kind: kind.to_string(),
            direction: direction.to_string(),
            size,
            indexing_variable: None,
            using_arrays: Vec::new(),
            valid: true,
        }
    }

    pub(crate) fn register_using_array(&mut self, array: &Arc<Mutex<ArrayInner>>) {
        self.using_arrays.retain(|w| w.strong_count() > 0);
        if !self
            .using_arrays
            .iter()
            .any(|w| std::ptr::eq(w.as_ptr(), Arc::as_ptr(array)))
        {
            self.using_arrays.push(Arc::downgrade(array));
        }
    }

    /// Live arrays using this dimension.
    pub(crate) fn users(&self) -> Vec<Arc<Mutex<ArrayInner>>> {
        self.using_arrays.iter().filter_map(Weak::upgrade).collect()
    }
}

/// A named axis of one or several [`MDArray`]s.
///
/// Dimensions are created through [`Group::create_dimension`](super::Group::create_dimension)
/// and their size only changes through [`MDArray::resize`].
#[derive(Clone)]
pub struct Dimension {
    pub(crate) inner: Arc<Mutex<DimensionInner>>,
}

impl Debug for Dimension {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let d = self.inner.lock();
        f.debug_struct("Dimension")
            .field("full_name", &d.full_name)
            .field("size", &d.size)
            .finish()
    }
}

impl Dimension {
    pub fn size(&self) -> usize {
        self.inner.lock().size
    }

    pub fn name(&self) -> String {
        self.inner.lock().name.clone()
    }

    pub fn full_name(&self) -> String {
        self.inner.lock().full_name.clone()
    }

    /// Free-form type, such as `HORIZONTAL_X` or `TEMPORAL`.
    pub fn kind(&self) -> String {
        self.inner.lock().kind.clone()
    }

    /// Free-form direction, such as `EAST` or `FUTURE`.
    pub fn direction(&self) -> String {
        self.inner.lock().direction.clone()
    }

    pub fn is_valid(&self) -> bool {
        self.inner.lock().valid
    }

    /// The array holding the coordinate values of this dimension, if one was
    /// set and still exists.
    pub fn indexing_variable(&self) -> Option<MDArray> {
        let inner = self.inner.lock().indexing_variable.as_ref()?.upgrade()?;
        let array = MDArray { inner };
        array.is_valid().then_some(array)
    }

    pub fn set_indexing_variable(&self, array: Option<&MDArray>) -> Result<()> {
        let mut d = self.inner.lock();
        if !d.valid {
            return raise(GdalError::Deleted {
                object: format!("Dimension {}", d.full_name),
            });
        }
        d.indexing_variable = array.map(|a| Arc::downgrade(&a.inner));
        Ok(())
    }

    /// Rename the dimension within its group.
    pub fn rename(&self, new_name: &str) -> Result<()> {
        check_name(new_name, "dimension").or_else(raise)?;
        let (parent, old_name) = {
            let d = self.inner.lock();
            if !d.valid {
                return raise(GdalError::Deleted {
                    object: format!("Dimension {}", d.full_name),
                });
            }
            (d.parent.upgrade(), d.name.clone())
        };
        if old_name == new_name {
            return Ok(());
        }
        let Some(parent) = parent else {
            return raise(GdalError::Deleted {
                object: format!("parent group of dimension {old_name}"),
            });
        };
        let parent_full_name = {
            let mut g = parent.lock();
            if g.dimensions.contains_key(new_name) {
                return raise(GdalError::NameExists {
                    name: new_name.to_string(),
                    scope: g.full_name.clone(),
                });
            }
            if let Some(entry) = g.dimensions.remove(&old_name) {
                g.dimensions.insert(new_name.to_string(), entry);
            }
            g.full_name.clone()
        };
        let mut d = self.inner.lock();
        d.name = new_name.to_string();
        d.full_name = child_full_name(&parent_full_name, new_name);
        Ok(())
    }
}
