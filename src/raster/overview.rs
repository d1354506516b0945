//! Overview building for in-memory datasets.
//!
//! Each overview level is itself a [`Dataset`] with bands of the same types,
//! owned by the full resolution dataset. Pixels are computed by a
//! [`Resampler`], from the full resolution bands or, for algorithms that
//! benefit from it, from the previous finer level.

use std::str::FromStr;

use tracing::debug;

use crate::cpl::raise;
use crate::dataset::Dataset;
use crate::errors::*;
use crate::raster::buffer::zeroed_vec;
use crate::raster::rasterband::{create_mask, BandData};
use crate::raster::rasterio::Window;
use crate::raster::resample::{BuiltinResampler, ResampleAlg, ResampleSource, Resampler};

/// Progress callback of long operations. It receives the completed fraction
/// and a message, and returns `false` to cancel.
pub type ProgressFn<'a> = dyn FnMut(f64, &str) -> bool + 'a;

/// Factor of an overview of `ov_size` over a raster of `raster_size`,
/// measured along the larger axis with a preference to x.
pub fn compute_ov_factor(ov_size: (usize, usize), raster_size: (usize, usize)) -> usize {
    let (ov_x, ov_y) = (ov_size.0.max(1), ov_size.1.max(1));
    if raster_size.0 != 1 && raster_size.0 >= raster_size.1 / 2 {
        (0.5 + raster_size.0 as f64 / ov_x as f64) as usize
    } else {
        (0.5 + raster_size.1 as f64 / ov_y as f64) as usize
    }
}

/// The factor [`compute_ov_factor`] reports for an overview built with
/// `level` over a raster of `raster_size`. It differs from `level` when the
/// rounded-up overview size does not divide evenly.
pub fn ov_level_adjust(level: usize, raster_size: (usize, usize)) -> usize {
    let (x, y) = raster_size;
    if x >= y / 2 && !(x < y && x < level) {
        let ov_x = x.div_ceil(level).max(1);
        (0.5 + x as f64 / ov_x as f64) as usize
    } else {
        let ov_y = y.div_ceil(level).max(1);
        (0.5 + y as f64 / ov_y as f64) as usize
    }
}

fn matches_level(ov: &Dataset, level: usize, raster_size: (usize, usize)) -> bool {
    let factor = compute_ov_factor(ov.raster_size(), raster_size);
    factor == level || factor == ov_level_adjust(level, raster_size)
}

/// Resample `src` into `dst`, both bands of the same type.
fn regenerate(
    src: &BandData,
    dst: &BandData,
    alg: ResampleAlg,
    resampler: &dyn Resampler,
    with_validity: bool,
) -> Result<()> {
    let src_window = Window::full(src.pixels.size);
    let dst_window = Window::full(dst.pixels.size);
    let data = src.read_packed(&src_window)?;
    let mask = if with_validity {
        src.explicit_mask_window(&src_window)?
    } else {
        None
    };
    let no_data = if with_validity {
        src.state.read().no_data.map(|nd| nd.as_f64())
    } else {
        None
    };
    let source = ResampleSource {
        data: &data,
        data_type: src.pixels.data_type,
        size: src.pixels.size,
        mask: mask.as_deref(),
        no_data,
    };
    let mut out = zeroed_vec(dst_window.pixel_count() * dst.pixels.elem_size())?;
    resampler.resample(alg, &source, &mut out, dst_window.size)?;
    dst.write_packed(&dst_window, &out)
}

fn check_progress(
    progress: &mut Option<&mut ProgressFn<'_>>,
    fraction: f64,
    msg: &str,
) -> Result<()> {
    if let Some(callback) = progress.as_mut() {
        if !callback(fraction, msg) {
            return Err(GdalError::UserInterrupt {
                method_name: "Dataset::build_overviews",
            });
        }
    }
    Ok(())
}

impl Dataset {
    /// Number of overview levels.
    pub fn overview_count(&self) -> usize {
        self.overviews.len()
    }

    /// The overview level at `index`, coarser as the index grows.
    pub fn overview(&self, index: usize) -> Result<&Dataset> {
        match self.overviews.get(index) {
            Some(ov) => Ok(ov),
            None => raise(GdalError::NotFound {
                name: format!("overview {index}"),
                scope: self.description_for_errors(),
            }),
        }
    }

    /// Drop every overview level.
    pub fn clear_overviews(&mut self) -> Result<()> {
        self.check_not_clone("Dataset::clear_overviews")?;
        self.overviews.clear();
        Ok(())
    }

    /// Builds overviews for the current dataset.
    ///
    /// # Arguments
    /// * `resampling` - resampling method, as accepted by [`ResampleAlg`]'s
    ///   `FromStr`, or `NONE` to create levels without computing them
    /// * `overviews` - list of overview decimation factors, e.g. `&[2, 4, 8, 16, 32]`;
    ///   an empty list removes every level
    /// * `bands` - list of bands to build the overviews for, or empty for all
    ///   bands; only the full band set is supported
    ///
    /// `NEAREST` and `AVERAGE` are computed with [`BuiltinResampler`]; use
    /// [`Dataset::build_overviews_with`] for other algorithms.
    pub fn build_overviews(
        &mut self,
        resampling: &str,
        overviews: &[i32],
        bands: &[i32],
    ) -> Result<()> {
        self.build_overviews_with(resampling, overviews, bands, &BuiltinResampler, None)
    }

    /// Like [`Dataset::build_overviews`], with a caller provided resampler and
    /// an optional progress callback consulted between levels and bands.
    pub fn build_overviews_with(
        &mut self,
        resampling: &str,
        overviews: &[i32],
        bands: &[i32],
        resampler: &dyn Resampler,
        mut progress: Option<&mut ProgressFn<'_>>,
    ) -> Result<()> {
        self.check_not_clone("Dataset::build_overviews")?;
        self.check_full_band_list(bands)?;
        if overviews.is_empty() {
            debug!("clearing overviews");
            self.overviews.clear();
            return Ok(());
        }
        let alg = if resampling.eq_ignore_ascii_case("NONE") {
            None
        } else {
            Some(ResampleAlg::from_str(resampling).or_else(raise)?)
        };
        let mut levels = Vec::with_capacity(overviews.len());
        for &level in overviews {
            match usize::try_from(level) {
                Ok(level) if level > 0 => levels.push(level),
                _ => {
                    return raise(GdalError::BadArgument(format!(
                        "invalid overview factor {level}"
                    )))
                }
            }
        }
        levels.sort_unstable();
        levels.dedup();

        let size = self.raster_size();
        let mut targets = Vec::with_capacity(levels.len());
        for &level in &levels {
            let index = match self
                .overviews
                .iter()
                .position(|ov| matches_level(ov, level, size))
            {
                Some(index) => index,
                None => {
                    let ov_size = (size.0.div_ceil(level), size.1.div_ceil(level));
                    debug!(level, ?ov_size, "creating overview level");
                    let ov = self.overview_level(ov_size).or_else(raise)?;
                    self.overviews.push(ov);
                    self.overviews.len() - 1
                }
            };
            targets.push(self.overviews[index].raster_size());
        }
        self.overviews
            .sort_by(|a, b| b.raster_size().0.cmp(&a.raster_size().0));

        let Some(alg) = alg else {
            return Ok(());
        };
        let cascade = levels.len() > 1 && alg.benefits_from_cascading();
        debug!(%alg, cascade, levels = ?levels, "regenerating overviews");

        let nbands = self.bands.len();
        let total = (targets.len() * nbands.max(1)) as f64;
        let mut done = 0.0;
        let mut previous: Option<usize> = None;
        for target in targets {
            let Some(ov_index) = self.overviews.iter().position(|ov| ov.raster_size() == target)
            else {
                continue;
            };
            let ov = &self.overviews[ov_index];
            let src_ds: &Dataset = match previous {
                Some(p) if cascade => &self.overviews[p],
                _ => self,
            };
            // masks first, cascaded levels read them as source validity
            let mut shared_mask_done = false;
            for (src, dst) in src_ds.bands.iter().zip(&ov.bands) {
                let (Some(src_mask), Some(dst_mask)) = (src.mask_band(), dst.mask_band()) else {
                    continue;
                };
                if src.mask_flags().is_per_dataset() {
                    if shared_mask_done {
                        continue;
                    }
                    shared_mask_done = true;
                }
                regenerate(&src_mask, &dst_mask, alg, resampler, false).or_else(raise)?;
            }
            for (band, (src, dst)) in src_ds.bands.iter().zip(&ov.bands).enumerate() {
                check_progress(
                    &mut progress,
                    done / total,
                    &format!("overview {}x{} band {}", target.0, target.1, band + 1),
                )
                .or_else(raise)?;
                regenerate(src, dst, alg, resampler, true).or_else(raise)?;
                done += 1.0;
            }
            previous = Some(ov_index);
        }
        check_progress(&mut progress, 1.0, "done").or_else(raise)?;
        Ok(())
    }

    fn check_full_band_list(&self, bands: &[i32]) -> Result<()> {
        if bands.is_empty() {
            return Ok(());
        }
        let count = self.bands.len();
        let mut seen = vec![false; count];
        for &band in bands {
            match usize::try_from(band).ok().filter(|b| (1..=count).contains(b)) {
                Some(b) => seen[b - 1] = true,
                None => {
                    return raise(GdalError::BadArgument(format!(
                        "band {band} out of range 1..={count}"
                    )))
                }
            }
        }
        if bands.len() != count || seen.iter().any(|s| !s) {
            return raise(GdalError::Unsupported {
                method_name: "Dataset::build_overviews",
                msg: "overviews can only be built for all bands at once".to_string(),
            });
        }
        Ok(())
    }

    /// An empty overview level of `size` matching the bands of this dataset,
    /// with masks laid out like the full resolution masks.
    fn overview_level(&self, size: (usize, usize)) -> Result<Dataset> {
        let mut ov = Dataset::with_size(size, "");
        for band in &self.bands {
            ov.add_band(band.pixels.data_type)?;
        }
        for (index, (band, ov_band)) in self.bands.iter().zip(&ov.bands).enumerate() {
            ov_band.state.write().no_data = band.state.read().no_data;
            let flags = band.mask_flags();
            if !flags.is_explicit() {
                continue;
            }
            if flags.is_per_dataset() {
                if index == 0 {
                    create_mask(&ov, 1, true)?;
                }
            } else {
                create_mask(&ov, index + 1, false)?;
            }
        }
        Ok(ov)
    }
}
