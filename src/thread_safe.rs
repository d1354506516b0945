use std::{ops::Deref, sync::Arc};

use crate::errors::DatasetNotThreadSafeError;
use crate::{Dataset, GdalOpenFlags};

impl Dataset {
    /// Return whether this dataset, and its raster bands, can be used from
    /// several threads at once for the intended scope.
    ///
    /// Only read-only clones, as returned by [`Dataset::clone_dataset`] or by
    /// opening a `MEM:::` dataset without `GDAL_OF_UPDATE`, are thread-safe,
    /// and only for `GDAL_OF_RASTER`.
    pub fn is_thread_safe(&self, scope_flags: GdalOpenFlags) -> bool {
        self.is_read_only() && self.can_be_cloned(scope_flags)
    }

    /// Wrap a read-only clone so it can be shared between threads.
    ///
    /// Any other dataset is handed back inside the error.
    ///
    /// # Example
    /// ```
    /// # use gdal_mem::{Driver, GdalOpenFlags};
    /// let ds = Driver::mem().create("", 8, 8, 1)?;
    /// let ds = match ds.try_into_thread_safe(GdalOpenFlags::GDAL_OF_RASTER) {
    ///     Ok(_) => unreachable!("writable datasets are not thread-safe"),
    ///     Err(e) => e.into_inner(),
    /// };
    /// let clone = ds.clone_dataset(GdalOpenFlags::GDAL_OF_RASTER)?;
    /// assert!(clone.try_into_thread_safe(GdalOpenFlags::GDAL_OF_RASTER).is_ok());
    /// # Ok::<_, gdal_mem::errors::GdalError>(())
    /// ```
    pub fn try_into_thread_safe(
        self,
        scope_flags: GdalOpenFlags,
    ) -> std::result::Result<ThreadSafeDataset, DatasetNotThreadSafeError> {
        if self.is_thread_safe(scope_flags) {
            // SAFETY: a read-only clone never mutates the pixels it shares.
            Ok(unsafe { ThreadSafeDataset::new(self) })
        } else {
            Err(DatasetNotThreadSafeError(self))
        }
    }
}

/// A read-only raster clone that is `Send + Sync`, made by
/// [`Dataset::try_into_thread_safe`].
///
/// The pixels are shared with the source dataset, which refuses writes while
/// the clone is alive, so concurrent reads never race with a writer.
///
/// # Example
/// ```
/// use gdal_mem::{Driver, GdalOpenFlags};
/// use std::thread;
///
/// let ds = Driver::mem().create("", 16, 16, 1)?;
/// ds.rasterband(1)?.fill(7.0)?;
/// let clone = ds.clone_dataset(GdalOpenFlags::GDAL_OF_RASTER)?;
/// let Ok(thread_safe_ds) = clone.try_into_thread_safe(GdalOpenFlags::GDAL_OF_RASTER) else {
///     panic!("clones are thread-safe");
/// };
///
/// thread::scope(|s| {
///     for _ in 0..4 {
///         let ds = thread_safe_ds.clone();
///         s.spawn(move || {
///             let band = ds.rasterband(1)?;
///             let buf = band.read_band_as::<u8>()?;
///             assert!(buf.data.iter().all(|&v| v == 7));
///             Ok::<_, gdal_mem::errors::GdalError>(())
///         });
///     }
/// });
/// # Ok::<_, gdal_mem::errors::GdalError>(())
/// ```
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct ThreadSafeDataset {
    inner: Arc<Dataset>,
}

unsafe impl Sync for ThreadSafeDataset {}
unsafe impl Send for ThreadSafeDataset {}

impl ThreadSafeDataset {
    /// # Safety
    /// `dataset` must pass [`Dataset::is_thread_safe`] for the raster scope.
    unsafe fn new(dataset: Dataset) -> Self {
        Self {
            #[allow(clippy::arc_with_non_send_sync)]
            inner: Arc::new(dataset),
        }
    }
}

impl AsRef<Dataset> for ThreadSafeDataset {
    fn as_ref(&self) -> &Dataset {
        &self.inner
    }
}

impl Deref for ThreadSafeDataset {
    type Target = Dataset;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use crate::errors::{GdalError, Result};
    use crate::test_utils::gradient_dataset;
    use crate::GdalOpenFlags;

    #[test]
    fn test_thread_safe_dataset() -> Result<()> {
        let ds = gradient_dataset(64, 32, 3)?;
        assert!(!ds.is_thread_safe(GdalOpenFlags::empty()));
        assert!(!ds.is_thread_safe(GdalOpenFlags::GDAL_OF_RASTER));
        let ds = ds
            .try_into_thread_safe(GdalOpenFlags::GDAL_OF_RASTER)
            .unwrap_err()
            .into_inner();

        let expected = (1..=3)
            .map(|b| ds.rasterband(b).and_then(|band| band.read_band_as::<u8>()))
            .collect::<Result<Vec<_>>>()?;

        let clone = ds.clone_dataset(GdalOpenFlags::GDAL_OF_RASTER)?;
        assert!(!clone.is_thread_safe(GdalOpenFlags::empty()));
        assert!(!clone.is_thread_safe(GdalOpenFlags::GDAL_OF_RASTER | GdalOpenFlags::GDAL_OF_UPDATE));
        assert!(clone.is_thread_safe(GdalOpenFlags::GDAL_OF_RASTER));

        let clone = clone
            .try_into_thread_safe(GdalOpenFlags::GDAL_OF_RASTER)
            .map_err(|e| GdalError::BadArgument(e.to_string()))?;
        thread::scope(|s| {
            let threads = (0..10)
                .map(|_| {
                    let ds = clone.clone();
                    let expected = &expected;
                    s.spawn(move || {
                        for (b, want) in (1..=3).zip(expected) {
                            let band = ds.rasterband(b)?;
                            let got = band.read_band_as::<u8>()?;
                            assert_eq!(got.data, want.data);
                        }
                        Ok::<_, GdalError>(())
                    })
                })
                .collect::<Vec<_>>();
            for thread in threads {
                thread.join().unwrap()?;
            }
            Ok(())
        })
    }
}
