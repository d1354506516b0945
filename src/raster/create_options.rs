use crate::cpl::CslStringList;

/// Key/value pairs of options for passing creation flags to
/// [`Driver::create_with_band_type_with_options`](crate::Driver::create_with_band_type_with_options).
///
/// The MEM driver understands `INTERLEAVE=BAND` (the default) and
/// `INTERLEAVE=PIXEL`, which stores all bands in one allocation.
pub type RasterCreationOptions = CslStringList;
