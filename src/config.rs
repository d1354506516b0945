//! Runtime configuration
//!
//! Options are `KEY=VALUE` strings with case-insensitive keys. A lookup
//! checks the options of the current thread, then the process-wide options
//! set through this module, then the environment.
//!
//! ```
//! use gdal_mem::config::*;
//!
//! set_config_option("GDAL_MEM_ENABLE_OPEN", "YES").unwrap();
//! assert_eq!(get_config_option("GDAL_MEM_ENABLE_OPEN", "NO").unwrap(), "YES");
//!
//! clear_config_option("GDAL_MEM_ENABLE_OPEN").unwrap();
//! assert_eq!(get_config_option("GDAL_MEM_ENABLE_OPEN", "NO").unwrap(), "NO");
//! ```
//!
//! Recognized options:
//!
//! * `GDAL_MEM_ENABLE_OPEN`: allow [`Driver::open`](crate::Driver::open) to
//!   build datasets from `MEM:::` strings (default `NO`).
//!
//! The error handler installed with [`set_error_handler`] also lives here.

use std::cell::RefCell;
use std::collections::HashMap;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::cpl::CplErrType;
use crate::errors::{GdalError, Result};

static GLOBAL_OPTIONS: Lazy<Mutex<HashMap<String, String>>> = Lazy::new(Default::default);

thread_local! {
    static THREAD_LOCAL_OPTIONS: RefCell<HashMap<String, String>> = RefCell::new(HashMap::new());
}

/// Validate `key` (and `value` when given) and return the normalized key.
fn option_key(key: &str, value: Option<&str>) -> Result<String> {
    if key.is_empty() || key.contains(['\0', '=']) {
        return Err(GdalError::BadArgument(format!(
            "Invalid configuration key: '{}'",
            key.escape_debug()
        )));
    }
    if value.is_some_and(|v| v.contains('\0')) {
        return Err(GdalError::BadArgument(format!(
            "Invalid configuration value for '{key}'"
        )));
    }
    Ok(key.to_ascii_uppercase())
}

/// Set a process-wide option.
pub fn set_config_option(key: &str, value: &str) -> Result<()> {
    let key = option_key(key, Some(value))?;
    GLOBAL_OPTIONS.lock().insert(key, value.to_string());
    Ok(())
}

/// Value of `key`, looked up in the options of the current thread, then the
/// process-wide options, then the environment. Returns `default` when the
/// option is set nowhere.
pub fn get_config_option(key: &str, default: &str) -> Result<String> {
    let upper = option_key(key, None)?;
    let local = THREAD_LOCAL_OPTIONS.with(|o| o.borrow().get(&upper).cloned());
    if let Some(v) = local.or_else(|| GLOBAL_OPTIONS.lock().get(&upper).cloned()) {
        return Ok(v);
    }
    Ok(std::env::var(key)
        .or_else(|_| std::env::var(&upper))
        .unwrap_or_else(|_| default.to_string()))
}

/// Remove a process-wide option. Thread-local values and the environment are
/// left alone.
pub fn clear_config_option(key: &str) -> Result<()> {
    let key = option_key(key, None)?;
    GLOBAL_OPTIONS.lock().remove(&key);
    Ok(())
}

/// Set an option for the current thread only. It shadows the process-wide
/// value of the same key.
pub fn set_thread_local_config_option(key: &str, value: &str) -> Result<()> {
    let key = option_key(key, Some(value))?;
    THREAD_LOCAL_OPTIONS.with(|o| o.borrow_mut().insert(key, value.to_string()));
    Ok(())
}

/// Value of `key` among the options of the current thread, or `default`.
pub fn get_thread_local_config_option(key: &str, default: &str) -> Result<String> {
    let key = option_key(key, None)?;
    Ok(THREAD_LOCAL_OPTIONS
        .with(|o| o.borrow().get(&key).cloned())
        .unwrap_or_else(|| default.to_string()))
}

pub fn clear_thread_local_config_option(key: &str) -> Result<()> {
    let key = option_key(key, None)?;
    THREAD_LOCAL_OPTIONS.with(|o| o.borrow_mut().remove(&key));
    Ok(())
}

type ErrorCallbackType = dyn FnMut(CplErrType, i32, &str) + 'static + Send;

static ERROR_CALLBACK: Lazy<Mutex<Option<Box<ErrorCallbackType>>>> = Lazy::new(Default::default);

/// Install `callback` as the error handler, replacing any previous one.
///
/// The handler receives the class, number and message of every failure and
/// warning reported on the error channel, from any thread. It must not
/// itself call into this crate.
pub fn set_error_handler<F>(callback: F)
where
    F: FnMut(CplErrType, i32, &str) + 'static + Send + Sync,
{
    ERROR_CALLBACK.lock().replace(Box::new(callback));
}

/// Remove the error handler installed by [`set_error_handler`].
pub fn remove_error_handler() {
    ERROR_CALLBACK.lock().take();
}

pub(crate) fn dispatch_error(class: CplErrType, number: i32, msg: &str) {
    if let Some(callback) = ERROR_CALLBACK.lock().as_mut() {
        callback(class, number, msg);
    }
}
