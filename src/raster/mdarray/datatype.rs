use std::fmt::{Display, Formatter};
use std::mem::size_of;
use std::ptr;

use crate::errors::{GdalError, Result};
use crate::raster::convert::{self, Real, Scalar};
use crate::raster::GdalDataType;

/// Class of an [`ExtendedDataType`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ExtendedDataTypeClass {
    Numeric,
    String,
    Compound,
}

/// A named member of a compound [`ExtendedDataType`].
#[derive(Clone, Debug, PartialEq)]
pub struct EdtComponent {
    name: String,
    offset: usize,
    data_type: ExtendedDataType,
}

impl EdtComponent {
    pub fn new(name: &str, offset: usize, data_type: ExtendedDataType) -> Self {
        Self {
            name: name.to_string(),
            offset,
            data_type,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Byte offset of the member inside the compound element.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn data_type(&self) -> &ExtendedDataType {
        &self.data_type
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Kind {
    Numeric(GdalDataType),
    String {
        max_length: usize,
    },
    Compound {
        name: String,
        size: usize,
        components: Vec<EdtComponent>,
    },
}

/// Element type of an [`MDArray`](super::MDArray) or [`Attribute`](super::Attribute).
///
/// String elements are stored as one pointer-sized slot per element, owned by
/// the array holding them.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtendedDataType {
    kind: Kind,
}

impl ExtendedDataType {
    pub fn new_numeric(data_type: GdalDataType) -> Result<Self> {
        data_type.checked_size()?;
        Ok(Self {
            kind: Kind::Numeric(data_type),
        })
    }

    /// A variable length string type. `max_length == 0` means unbounded.
    pub fn new_string(max_length: usize) -> Self {
        Self {
            kind: Kind::String { max_length },
        }
    }

    /// A compound type made of named members laid out in `size` bytes.
    pub fn new_compound(name: &str, size: usize, components: Vec<EdtComponent>) -> Result<Self> {
        if components.is_empty() {
            return Err(GdalError::BadArgument(
                "compound type needs at least one component".to_string(),
            ));
        }
        for (i, c) in components.iter().enumerate() {
            if components[..i].iter().any(|o| o.name == c.name) {
                return Err(GdalError::BadArgument(format!(
                    "duplicated component name '{}'",
                    c.name
                )));
            }
            if c.offset + c.data_type.size() > size {
                return Err(GdalError::BadArgument(format!(
                    "component '{}' does not fit in {size} bytes",
                    c.name
                )));
            }
        }
        Ok(Self {
            kind: Kind::Compound {
                name: name.to_string(),
                size,
                components,
            },
        })
    }

    pub fn class(&self) -> ExtendedDataTypeClass {
        match self.kind {
            Kind::Numeric(_) => ExtendedDataTypeClass::Numeric,
            Kind::String { .. } => ExtendedDataTypeClass::String,
            Kind::Compound { .. } => ExtendedDataTypeClass::Compound,
        }
    }

    /// The result is only valid if the data type is numeric
    pub fn numeric_datatype(&self) -> GdalDataType {
        match self.kind {
            Kind::Numeric(t) => t,
            _ => GdalDataType::Unknown,
        }
    }

    /// Name of a compound type, empty otherwise.
    pub fn name(&self) -> &str {
        match &self.kind {
            Kind::Compound { name, .. } => name,
            _ => "",
        }
    }

    pub fn max_string_length(&self) -> usize {
        match self.kind {
            Kind::String { max_length } => max_length,
            _ => 0,
        }
    }

    pub fn components(&self) -> &[EdtComponent] {
        match &self.kind {
            Kind::Compound { components, .. } => components,
            _ => &[],
        }
    }

    /// Size in bytes of one element.
    pub fn size(&self) -> usize {
        match &self.kind {
            Kind::Numeric(t) => t.size(),
            Kind::String { .. } => size_of::<*mut String>(),
            Kind::Compound { size, .. } => *size,
        }
    }

    /// Whether elements own heap memory that must be released with
    /// [`free_value`].
    pub fn needs_free_dynamic_memory(&self) -> bool {
        match &self.kind {
            Kind::Numeric(_) => false,
            Kind::String { .. } => true,
            Kind::Compound { components, .. } => components
                .iter()
                .any(|c| c.data_type.needs_free_dynamic_memory()),
        }
    }

    /// Whether values of this type can be copied into `other`.
    pub fn can_convert_to(&self, other: &ExtendedDataType) -> bool {
        match (&self.kind, &other.kind) {
            (Kind::Numeric(_), Kind::Numeric(_)) => true,
            (Kind::Numeric(t), Kind::String { .. }) => !t.is_complex(),
            (Kind::String { .. }, Kind::Numeric(_) | Kind::String { .. }) => true,
            (
                Kind::Compound {
                    components: src, ..
                },
                Kind::Compound {
                    components: dst, ..
                },
            ) => dst.iter().all(|d| {
                src.iter()
                    .find(|s| s.name == d.name)
                    .is_some_and(|s| s.data_type.can_convert_to(&d.data_type))
            }),
            _ => false,
        }
    }
}

impl From<GdalDataType> for ExtendedDataType {
    fn from(data_type: GdalDataType) -> Self {
        Self {
            kind: Kind::Numeric(data_type),
        }
    }
}

impl Display for ExtendedDataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            Kind::Numeric(t) => write!(f, "{t}"),
            Kind::String { .. } => f.write_str("String"),
            Kind::Compound { name, .. } => write!(f, "Compound({name})"),
        }
    }
}

#[inline]
unsafe fn read_string_slot(p: *const u8) -> *mut String {
    ptr::read_unaligned(p as *const *mut String)
}

#[inline]
unsafe fn write_string_slot(p: *mut u8, value: Option<String>) {
    let raw = match value {
        Some(s) => Box::into_raw(Box::new(s)),
        None => ptr::null_mut(),
    };
    ptr::write_unaligned(p as *mut *mut String, raw);
}

/// Borrow the string stored in a string slot.
///
/// # Safety
/// `p` must address a string slot that outlives `'a` and is not freed meanwhile.
pub(crate) unsafe fn string_at<'a>(p: *const u8) -> Option<&'a str> {
    let raw = read_string_slot(p);
    if raw.is_null() {
        None
    } else {
        Some((*raw).as_str())
    }
}

/// Store a new string into a string slot, without releasing the previous one.
///
/// # Safety
/// `p` must address a writable string slot whose previous value was freed.
pub(crate) unsafe fn store_string(p: *mut u8, value: Option<&str>) {
    write_string_slot(p, value.map(str::to_string));
}

fn numeric_to_string(p: *const u8, t: GdalDataType) -> String {
    // SAFETY: callers pass a pointer to one readable word of `t`.
    unsafe {
        match t {
            GdalDataType::Float32 => ptr::read_unaligned(p as *const f32).to_string(),
            _ => match convert::load_scalar(p, t).re {
                Real::Int(v) => v.to_string(),
                Real::UInt(v) => v.to_string(),
                Real::Float(v) => v.to_string(),
            },
        }
    }
}

fn parse_numeric(s: &str) -> Scalar {
    let s = s.trim();
    let re = if let Ok(v) = s.parse::<i64>() {
        Real::Int(v)
    } else if let Ok(v) = s.parse::<u64>() {
        Real::UInt(v)
    } else {
        Real::Float(s.parse::<f64>().unwrap_or(0.0))
    };
    Scalar::real(re)
}

/// Copy one element from `src` to `dst`, converting between the two types.
///
/// Returns `false` when no conversion exists. A destination that holds dynamic
/// memory must have been released with [`free_value`] first.
///
/// # Safety
/// `src` must address one readable element of `src_type` and `dst` one
/// writable element of `dst_type`.
pub(crate) unsafe fn copy_value(
    src: *const u8,
    src_type: &ExtendedDataType,
    dst: *mut u8,
    dst_type: &ExtendedDataType,
) -> bool {
    match (&src_type.kind, &dst_type.kind) {
        (Kind::Numeric(s), Kind::Numeric(d)) => {
            convert::copy_words_raw(src, *s, 0, dst, *d, 0, 1);
            true
        }
        (Kind::String { .. }, Kind::String { .. }) => {
            store_string(dst, string_at(src));
            true
        }
        (Kind::Numeric(s), Kind::String { .. }) if !s.is_complex() => {
            write_string_slot(dst, Some(numeric_to_string(src, *s)));
            true
        }
        (Kind::String { .. }, Kind::Numeric(d)) => {
            let value = string_at(src).map(parse_numeric).unwrap_or(Scalar::real(Real::Int(0)));
            convert::store_scalar(dst, *d, value);
            true
        }
        (Kind::Compound { .. }, Kind::Compound { components, .. }) => {
            for d in components {
                let Some(s) = src_type.components().iter().find(|s| s.name == d.name) else {
                    return false;
                };
                if !copy_value(
                    src.add(s.offset),
                    &s.data_type,
                    dst.add(d.offset),
                    &d.data_type,
                ) {
                    return false;
                }
            }
            true
        }
        _ => false,
    }
}

/// Release the dynamic memory held by one element and reset it to empty.
///
/// # Safety
/// `p` must address one writable element of `data_type`, initialised either
/// with zero bytes or by [`copy_value`].
pub(crate) unsafe fn free_value(p: *mut u8, data_type: &ExtendedDataType) {
    match &data_type.kind {
        Kind::Numeric(_) => {}
        Kind::String { .. } => {
            let raw = read_string_slot(p);
            if !raw.is_null() {
                drop(Box::from_raw(raw));
                write_string_slot(p, None);
            }
        }
        Kind::Compound { components, .. } => {
            for c in components {
                free_value(p.add(c.offset), &c.data_type);
            }
        }
    }
}

/// A run of owned string slots, used to move strings through the hyperslab
/// engine.
pub(crate) struct StringSlots {
    slots: Vec<usize>,
}

impl StringSlots {
    pub(crate) fn empty(len: usize) -> Self {
        Self {
            slots: vec![0; len],
        }
    }

    pub(crate) fn from_strs<S: AsRef<str>>(values: &[S]) -> Self {
        let mut slots = Self::empty(values.len());
        for (i, v) in values.iter().enumerate() {
            // SAFETY: slot `i` exists and is empty.
            unsafe { store_string(slots.slot_ptr(i), Some(v.as_ref())) };
        }
        slots
    }

    fn slot_ptr(&mut self, i: usize) -> *mut u8 {
        self.slots[i..].as_mut_ptr() as *mut u8
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.slots)
    }

    pub(crate) fn as_bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(&mut self.slots)
    }

    /// The stored strings, with empty slots read as `""`.
    pub(crate) fn to_strings(&self) -> Vec<String> {
        self.slots
            .iter()
            .map(|slot| {
                // SAFETY: every slot is empty or was filled by `store_string`
                // or `copy_value`.
                unsafe { string_at(slot as *const usize as *const u8) }
                    .unwrap_or_default()
                    .to_string()
            })
            .collect()
    }
}

impl Drop for StringSlots {
    fn drop(&mut self) {
        let string_type = ExtendedDataType::new_string(0);
        for i in 0..self.slots.len() {
            let p = self.slot_ptr(i);
            // SAFETY: see `to_strings`.
            unsafe { free_value(p, &string_type) };
        }
    }
}
