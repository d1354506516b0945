use std::marker::PhantomData;

use crate::cpl;
use crate::errors::Result;
use crate::{Dataset, Driver, GdalDataType};

/// A `x_size` by `y_size` byte dataset where band `b` holds
/// `(x + y * x_size + b) % 256` at `(x, y)`.
pub fn gradient_dataset(x_size: usize, y_size: usize, bands: usize) -> Result<Dataset> {
    let ds = Driver::mem().create("gradient", x_size, y_size, bands)?;
    for (b, mut band) in ds.rasterbands().enumerate() {
        let data = (0..x_size * y_size)
            .map(|i| ((i + b) % 256) as u8)
            .collect::<Vec<_>>();
        band.write_raw((0, 0), (x_size, y_size), (x_size, y_size), GdalDataType::UInt8, None, &data)?;
    }
    Ok(ds)
}

/// Keeps expected failures of the current thread out of the log and the error
/// handler until dropped. [`cpl::last_error`] is still updated.
pub(crate) struct SuppressErrorLog {
    // the quiet depth is per thread
    _private: PhantomData<*mut ()>,
}

impl SuppressErrorLog {
    pub(crate) fn new() -> Self {
        cpl::push_quiet_handler();
        SuppressErrorLog {
            _private: PhantomData,
        }
    }
}

impl Drop for SuppressErrorLog {
    fn drop(&mut self) {
        cpl::pop_quiet_handler();
    }
}
