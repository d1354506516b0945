use std::collections::BTreeMap;

use crate::cpl::raise;
use crate::errors::{GdalError, Result};
use crate::gdal_major_object::MajorObject;

/// Description and `KEY=VALUE` metadata items of an object, grouped by
/// domain. The default domain is the empty string.
///
/// Keys compare case-insensitively within a domain and keep insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetadataStore {
    description: String,
    domains: BTreeMap<String, Vec<(String, String)>>,
}

impl MetadataStore {
    pub fn new(description: &str) -> Self {
        Self {
            description: description.to_string(),
            domains: BTreeMap::new(),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: &str) {
        self.description = description.to_string();
    }

    pub fn item(&self, key: &str, domain: &str) -> Option<&str> {
        self.domains
            .get(domain)?
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn set_item(&mut self, key: &str, value: &str, domain: &str) -> Result<()> {
        if key.is_empty() || key.contains(['=', '\0']) {
            return Err(GdalError::BadArgument(format!(
                "Invalid metadata key: '{}'",
                key.escape_debug()
            )));
        }
        let items = self.domains.entry(domain.to_string()).or_default();
        match items.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(key)) {
            Some(entry) => entry.1 = value.to_string(),
            None => items.push((key.to_string(), value.to_string())),
        }
        Ok(())
    }

    pub fn remove_item(&mut self, key: &str, domain: &str) -> bool {
        let Some(items) = self.domains.get_mut(domain) else {
            return false;
        };
        let before = items.len();
        items.retain(|(k, _)| !k.eq_ignore_ascii_case(key));
        let removed = items.len() != before;
        if items.is_empty() {
            self.domains.remove(domain);
        }
        removed
    }

    pub fn domains(&self) -> Vec<String> {
        self.domains.keys().cloned().collect()
    }

    pub fn domain(&self, domain: &str) -> Option<Vec<String>> {
        self.domains
            .get(domain)
            .map(|items| items.iter().map(|(k, v)| format!("{k}={v}")).collect())
    }

    pub fn entries(&self) -> Vec<MetadataEntry> {
        self.domains
            .iter()
            .flat_map(|(domain, items)| {
                items.iter().map(|(key, value)| MetadataEntry {
                    domain: domain.clone(),
                    key: key.clone(),
                    value: value.clone(),
                })
            })
            .collect()
    }
}

/// General-Purpose Metadata API
///
/// Metadata is a set of `KEY=VALUE` items organized in domains. The
/// `IMAGE_STRUCTURE` domain of an in-memory dataset reports its interleaving
/// (`INTERLEAVE=PIXEL|BAND`) and signed byte bands carry
/// `PIXELTYPE=SIGNEDBYTE` there.
///
/// # Example
///
/// ```rust
/// use gdal_mem::{Driver, Metadata};
///
/// let mut dataset = Driver::mem().create("", 2, 2, 1)?;
/// dataset.set_metadata_item("AUTHOR", "me", "")?;
/// assert_eq!(dataset.metadata_item("AUTHOR", ""), Some("me".to_string()));
/// # Ok::<(), gdal_mem::errors::GdalError>(())
/// ```
pub trait Metadata: MajorObject {
    /// For most objects the description is the name the object was
    /// created with; for a band it is empty unless set.
    fn description(&self) -> Result<String> {
        Ok(self.metadata_store().read().description().to_string())
    }

    fn set_description(&mut self, description: &str) -> Result<()> {
        self.metadata_store().write().set_description(description);
        Ok(())
    }

    /// Domains holding at least one item.
    fn metadata_domains(&self) -> Vec<String> {
        self.metadata_store().read().domains()
    }

    /// All items of `domain` as `KEY=VALUE` strings.
    fn metadata_domain(&self, domain: &str) -> Option<Vec<String>> {
        self.metadata_store().read().domain(domain)
    }

    fn metadata_item(&self, key: &str, domain: &str) -> Option<String> {
        self.metadata_store()
            .read()
            .item(key, domain)
            .map(str::to_string)
    }

    fn set_metadata_item(&mut self, key: &str, value: &str, domain: &str) -> Result<()> {
        self.metadata_store()
            .write()
            .set_item(key, value, domain)
            .or_else(raise)
    }

    /// Iterate over all items of all domains.
    fn metadata(&self) -> MetadataIter {
        MetadataIter {
            entries: self.metadata_store().read().entries().into_iter(),
        }
    }
}

/// A single metadata item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataEntry {
    pub domain: String,
    pub key: String,
    pub value: String,
}

impl MetadataEntry {
    pub fn new<D, K, V>(domain: D, key: K, value: V) -> Self
    where
        D: Into<String>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            domain: domain.into(),
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Iterator over the items of an object, domain by domain.
pub struct MetadataIter {
    entries: std::vec::IntoIter<MetadataEntry>,
}

impl Iterator for MetadataIter {
    type Item = MetadataEntry;

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next()
    }
}
