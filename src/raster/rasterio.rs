//! Rectangle copies between band buffers and caller buffers.
//!
//! Band level I/O is a line by line strided word copy. Dataset level I/O
//! first looks for two layouts it can move in fewer, longer runs: bands
//! interleaved by pixel in one allocation, and (for writes) bands stored
//! separately with packed lines. Anything else falls back to band by band
//! copies.

use tracing::debug;

use crate::errors::{GdalError, Result};
use crate::raster::convert;
use crate::raster::pixels::PixelView;
use crate::raster::GdalDataType;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum RwFlag {
    Read,
    Write,
}

/// A validated rectangle of a band.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Window {
    pub(crate) offset: (usize, usize),
    pub(crate) size: (usize, usize),
}

impl Window {
    pub(crate) fn new(
        offset: (isize, isize),
        size: (usize, usize),
        raster_size: (usize, usize),
    ) -> Result<Window> {
        let fits = |off: isize, len: usize, max: usize| {
            usize::try_from(off)
                .ok()
                .and_then(|o| o.checked_add(len).filter(|end| *end <= max).map(|_| o))
        };
        match (
            fits(offset.0, size.0, raster_size.0),
            fits(offset.1, size.1, raster_size.1),
        ) {
            (Some(x), Some(y)) => Ok(Window {
                offset: (x, y),
                size,
            }),
            _ => Err(GdalError::BadArgument(format!(
                "access window {size:?} at {offset:?} is outside of a {}x{} raster",
                raster_size.0, raster_size.1
            ))),
        }
    }

    pub(crate) fn full(raster_size: (usize, usize)) -> Window {
        Window {
            offset: (0, 0),
            size: raster_size,
        }
    }

    pub(crate) fn pixel_count(&self) -> usize {
        self.size.0 * self.size.1
    }
}

/// Bytes of a packed grid of `size` words of `data_type`, failing when the
/// grid cannot be addressed.
pub(crate) fn grid_len(size: (usize, usize), data_type: GdalDataType) -> Result<usize> {
    size.0
        .checked_mul(size.1)
        .and_then(|n| n.checked_mul(data_type.size()))
        .filter(|len| *len <= isize::MAX as usize)
        .ok_or_else(|| {
            GdalError::BadArgument(format!(
                "{}x{} buffer of {data_type} overflows",
                size.0, size.1
            ))
        })
}

/// Shape and byte strides of a caller buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct BufferLayout {
    pub(crate) size: (usize, usize),
    pub(crate) data_type: GdalDataType,
    pub(crate) pixel_space: usize,
    pub(crate) line_space: usize,
}

impl BufferLayout {
    pub(crate) fn packed(size: (usize, usize), data_type: GdalDataType) -> BufferLayout {
        let elem_size = data_type.size();
        BufferLayout {
            size,
            data_type,
            pixel_space: elem_size,
            line_space: elem_size * size.0,
        }
    }

    /// A layout with explicit spacing, for a grid that can be addressed.
    pub(crate) fn spaced(
        size: (usize, usize),
        data_type: GdalDataType,
        pixel_space: usize,
        line_space: usize,
    ) -> Result<BufferLayout> {
        data_type.checked_size()?;
        grid_len(size, data_type)?;
        Ok(BufferLayout {
            size,
            data_type,
            pixel_space,
            line_space,
        })
    }

    /// Bytes spanned by one band of this layout.
    pub(crate) fn extent(&self) -> Option<usize> {
        if self.size.0 == 0 || self.size.1 == 0 {
            return Some(0);
        }
        (self.size.1 - 1)
            .checked_mul(self.line_space)?
            .checked_add((self.size.0 - 1).checked_mul(self.pixel_space)?)?
            .checked_add(self.data_type.size())
    }

    /// Check that `len` bytes hold `bands` bands spaced `band_space` apart.
    pub(crate) fn check_len(&self, len: usize, bands: usize, band_space: usize) -> Result<()> {
        let needed = match bands {
            0 => Some(0),
            n => self
                .extent()
                .and_then(|e| (n - 1).checked_mul(band_space)?.checked_add(e)),
        }
        .ok_or_else(|| GdalError::BadArgument("buffer extent overflows".to_string()))?;
        if len < needed {
            return Err(GdalError::BadArgument(format!(
                "buffer of {len} bytes is too small, {needed} bytes needed"
            )));
        }
        Ok(())
    }
}

/// Copy a window of `view` from or to `buf`, which has the window's size.
///
/// # Safety
/// `buf` must address a buffer matching `layout`, and `window` must lie
/// inside the view.
pub(crate) unsafe fn copy_window(
    view: &PixelView,
    rw: RwFlag,
    window: &Window,
    buf: *mut u8,
    layout: &BufferLayout,
) {
    let (x0, y0) = window.offset;
    for line in 0..window.size.1 {
        let band_line = view.pixel_ptr(x0, y0 + line);
        let buf_line = buf.wrapping_add(line * layout.line_space);
        match rw {
            RwFlag::Read => convert::copy_words_raw(
                band_line,
                view.data_type,
                view.pixel_stride,
                buf_line,
                layout.data_type,
                layout.pixel_space as isize,
                window.size.0,
            ),
            RwFlag::Write => convert::copy_words_raw(
                buf_line,
                layout.data_type,
                layout.pixel_space as isize,
                band_line,
                view.data_type,
                view.pixel_stride,
                window.size.0,
            ),
        }
    }
}

/// Copy a grid between two caller-side layouts of the same size,
/// converting words.
///
/// # Safety
/// Both pointers must address buffers matching their layouts.
pub(crate) unsafe fn copy_layout(
    src: *const u8,
    src_layout: &BufferLayout,
    dst: *mut u8,
    dst_layout: &BufferLayout,
) {
    for line in 0..src_layout.size.1 {
        convert::copy_words_raw(
            src.wrapping_add(line * src_layout.line_space),
            src_layout.data_type,
            src_layout.pixel_space as isize,
            dst.wrapping_add(line * dst_layout.line_space),
            dst_layout.data_type,
            dst_layout.pixel_space as isize,
            src_layout.size.0,
        );
    }
}

/// Whether `views` are the bands of one pixel interleaved allocation, in
/// order.
pub(crate) fn is_pixel_interleaved(views: &[&PixelView]) -> bool {
    let Some(first) = views.first() else {
        return false;
    };
    let elem_size = first.elem_size() as isize;
    let nbands = views.len() as isize;
    first.pixel_stride == elem_size * nbands
        && views.iter().enumerate().all(|(i, v)| {
            v.shares_storage(first)
                && v.data_type == first.data_type
                && v.pixel_stride == first.pixel_stride
                && v.line_stride == first.line_stride
                && v.origin() == first.origin().wrapping_offset(i as isize * elem_size)
        })
}

fn is_band_separated(views: &[&PixelView]) -> bool {
    let Some(first) = views.first() else {
        return false;
    };
    views
        .iter()
        .all(|v| v.data_type == first.data_type && v.is_packed_line())
}

/// Try to move a full band set through one of the multi-band fast paths.
///
/// Returns `false` when no fast path applies and the caller has to copy
/// band by band.
///
/// # Safety
/// As for [`copy_window`], with `buf` holding `views.len()` bands
/// `band_space` bytes apart.
pub(crate) unsafe fn try_interleaved_fast_path(
    views: &[&PixelView],
    rw: RwFlag,
    window: &Window,
    buf: *mut u8,
    layout: &BufferLayout,
    band_space: usize,
) -> bool {
    let nbands = views.len();
    let buf_elem_size = layout.data_type.size();
    if nbands < 2
        || layout.size != window.size
        || band_space != buf_elem_size
        || layout.pixel_space != band_space * nbands
    {
        return false;
    }
    let (x0, y0) = window.offset;
    let (width, height) = window.size;
    if is_pixel_interleaved(views) {
        debug!(nbands, ?rw, "pixel interleaved raster I/O");
        let band_type = views[0].data_type;
        let elem_size = views[0].elem_size() as isize;
        for line in 0..height {
            let band_line = views[0].pixel_ptr(x0, y0 + line);
            let buf_line = buf.wrapping_add(line * layout.line_space);
            match rw {
                RwFlag::Read => convert::copy_words_raw(
                    band_line,
                    band_type,
                    elem_size,
                    buf_line,
                    layout.data_type,
                    buf_elem_size as isize,
                    width * nbands,
                ),
                RwFlag::Write => convert::copy_words_raw(
                    buf_line,
                    layout.data_type,
                    buf_elem_size as isize,
                    band_line,
                    band_type,
                    elem_size,
                    width * nbands,
                ),
            }
        }
        return true;
    }
    if rw == RwFlag::Write && is_band_separated(views) {
        debug!(nbands, "band separated deinterleaving write");
        let band_type = views[0].data_type;
        let mut dsts = vec![std::ptr::null_mut(); nbands];
        for line in 0..height {
            for (dst, view) in dsts.iter_mut().zip(views) {
                *dst = view.pixel_ptr(x0, y0 + line);
            }
            convert::deinterleave(
                buf.wrapping_add(line * layout.line_space),
                layout.data_type,
                &dsts,
                band_type,
                width,
            );
        }
        return true;
    }
    false
}
