//! Common Portability Library equivalents
//!
//! This module provides the `KEY=VALUE` string list used to pass options
//! throughout the crate, and the thread-local error channel every failure and
//! warning is reported to.
//!

use std::cell::{Cell, RefCell};
use std::fmt::{Debug, Formatter};

use crate::config;
use crate::errors::{GdalError, Result};
use crate::utils::_string_tuple;

/// Severity of a record placed on the error channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CplErrType {
    None,
    Debug,
    Warning,
    Failure,
    Fatal,
}

/// Error number of a record placed on the error channel.
///
/// The discriminants follow the `CPLE_*` numbering.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum CplErrorNum {
    None = 0,
    AppDefined = 1,
    OutOfMemory = 2,
    FileIO = 3,
    OpenFailed = 4,
    IllegalArg = 5,
    NotSupported = 6,
    AssertionFailed = 7,
    NoWriteAccess = 8,
    UserInterrupt = 9,
    ObjectNull = 10,
}

/// Last record placed on the error channel of the current thread.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CplErrorRecord {
    pub class: CplErrType,
    pub number: CplErrorNum,
    pub msg: String,
}

thread_local! {
    static LAST_ERROR: RefCell<Option<CplErrorRecord>> = const { RefCell::new(None) };
    static QUIET_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Stop forwarding records of this thread to the error handler and to
/// `tracing` until the matching [`pop_quiet_handler`]. The last error is
/// still recorded.
pub fn push_quiet_handler() {
    QUIET_DEPTH.with(|d| d.set(d.get() + 1));
}

pub fn pop_quiet_handler() {
    QUIET_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
}

/// Place a record on the error channel.
///
/// The record becomes the thread's last error, is forwarded to the installed
/// error handler and is mirrored to `tracing`.
pub fn error(class: CplErrType, number: CplErrorNum, msg: &str) {
    LAST_ERROR.with(|last| {
        *last.borrow_mut() = Some(CplErrorRecord {
            class,
            number,
            msg: msg.to_string(),
        })
    });
    if QUIET_DEPTH.with(Cell::get) > 0 {
        return;
    }
    match class {
        CplErrType::Warning => tracing::warn!(number = number as i32, "{msg}"),
        CplErrType::Failure | CplErrType::Fatal => {
            tracing::debug!(number = number as i32, "{msg}")
        }
        _ => tracing::trace!(number = number as i32, "{msg}"),
    }
    config::dispatch_error(class, number as i32, msg);
}

/// Emit a non-fatal warning.
pub fn warning(msg: &str) {
    error(CplErrType::Warning, CplErrorNum::AppDefined, msg);
}

/// The last record emitted on this thread, if any.
pub fn last_error() -> Option<CplErrorRecord> {
    LAST_ERROR.with(|last| last.borrow().clone())
}

/// Message of the last record emitted on this thread, or an empty string.
pub fn last_error_msg() -> String {
    last_error().map(|e| e.msg).unwrap_or_default()
}

/// Clear the error channel of this thread.
pub fn error_reset() {
    LAST_ERROR.with(|last| *last.borrow_mut() = None);
}

/// Report `err` on the error channel and return it.
pub(crate) fn raise<T>(err: GdalError) -> Result<T> {
    error(err.class(), err.error_num(), &err.to_string());
    Err(err)
}

/// A list of `KEY=VALUE` strings, used throughout the crate to pass creation
/// and open options.
///
/// Keys are matched case-insensitively and setting an existing key replaces its
/// value.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CslStringList {
    entries: Vec<String>,
}

impl CslStringList {
    /// Creates an empty string list.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Assigns `value` to `name`.
    ///
    /// Overwrites duplicate `name`s.
    ///
    /// Returns `Ok<()>` on success, `Err<GdalError>` if `name` has non alphanumeric
    /// characters, or `value` has newline characters.
    pub fn set_name_value(&mut self, name: &str, value: &str) -> Result<()> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(GdalError::BadArgument(format!(
                "Invalid characters in name: '{name}'"
            )));
        }
        if value.contains(['\n', '\r']) {
            return Err(GdalError::BadArgument(format!(
                "Invalid characters in value: '{value}'"
            )));
        }
        let entry = format!("{name}={value}");
        match self.position(name) {
            Some(idx) => self.entries[idx] = entry,
            None => self.entries.push(entry),
        }
        Ok(())
    }

    /// Parses a `KEY=VALUE` string and adds it to the list.
    pub fn add_string(&mut self, entry: &str) -> Result<()> {
        match _string_tuple(entry, '=') {
            Some((name, value)) => self.set_name_value(name.trim(), &value),
            None => Err(GdalError::BadArgument(format!(
                "'{entry}' is not a KEY=VALUE pair"
            ))),
        }
    }

    /// Looks up the value corresponding to `key`.
    pub fn fetch_name_value(&self, key: &str) -> Option<String> {
        self.position(key)
            .and_then(|idx| _string_tuple(&self.entries[idx], '='))
            .map(|(_, v)| v)
    }

    /// Looks up the value corresponding to `key`, or `default` when absent.
    pub fn fetch_name_value_or(&self, key: &str, default: &str) -> String {
        self.fetch_name_value(key)
            .unwrap_or_else(|| default.to_string())
    }

    /// Interprets the value of `key` as a boolean (`YES`, `TRUE`, `ON`, `1`).
    pub fn fetch_bool(&self, key: &str, default: bool) -> bool {
        match self.fetch_name_value(key) {
            Some(v) => is_true(&v),
            None => default,
        }
    }

    /// Removes `key` from the list. Returns whether it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        match self.position(key) {
            Some(idx) => {
                self.entries.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Determine the number of entries in the list.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Determine if the list has any values
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get an iterator over the name/value elements of the list.
    pub fn iter(&self) -> CslStringListIterator {
        CslStringListIterator::new(self)
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|e| {
            _string_tuple(e, '=').is_some_and(|(k, _)| k.eq_ignore_ascii_case(key))
        })
    }
}

pub(crate) fn is_true(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_uppercase().as_str(),
        "YES" | "TRUE" | "ON" | "1"
    )
}

/// State for iterator over [`CslStringList`] entries.
pub struct CslStringListIterator<'a> {
    list: &'a CslStringList,
    idx: usize,
}

impl<'a> CslStringListIterator<'a> {
    fn new(list: &'a CslStringList) -> Self {
        Self { list, idx: 0 }
    }
}

impl Iterator for CslStringListIterator<'_> {
    type Item = (String, String);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let field = self.list.entries.get(self.idx)?;
            self.idx += 1;
            if let Some(pair) = _string_tuple(field, '=') {
                return Some(pair);
            }
        }
    }
}

impl Debug for CslStringList {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (k, v) in self.iter() {
            f.write_fmt(format_args!("{k}={v}\n"))?;
        }
        Ok(())
    }
}

/// Convenience shorthand for specifying an empty `CslStringList` to functions accepting
/// `Into<CslStringList>`.
impl From<()> for CslStringList {
    fn from(_: ()) -> Self {
        CslStringList::default()
    }
}

/// Creates a [`CslStringList`] from a slice of _key_/_value_ tuples.
impl<const N: usize> From<&[(&str, &str); N]> for CslStringList {
    fn from(pairs: &[(&str, &str); N]) -> Self {
        let mut result = Self::default();
        for (k, v) in pairs {
            result.set_name_value(k, v).expect("valid key/value pair");
        }
        result
    }
}
