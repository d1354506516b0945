use std::fmt::{Display, Formatter};
use std::str::FromStr;

use bytemuck::{Pod, Zeroable};

use crate::errors::{GdalError, Result};

/// Pixel data types.
///
/// The discriminants are the `GDT_*` codes, which the `DATATYPE` option of
/// the `MEM:::` opener also accepts.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(u32)]
pub enum GdalDataType {
    #[default]
    Unknown = 0,
    /// Eight bit unsigned integer (`Byte`)
    UInt8 = 1,
    UInt16 = 2,
    Int16 = 3,
    UInt32 = 4,
    Int32 = 5,
    Float32 = 6,
    Float64 = 7,
    /// Complex pair of Int16
    CInt16 = 8,
    CInt32 = 9,
    CFloat32 = 10,
    CFloat64 = 11,
    UInt64 = 12,
    Int64 = 13,
    Int8 = 14,
}

impl GdalDataType {
    /// All known types, in `GDT_*` order.
    pub const ALL: [GdalDataType; 14] = [
        GdalDataType::UInt8,
        GdalDataType::UInt16,
        GdalDataType::Int16,
        GdalDataType::UInt32,
        GdalDataType::Int32,
        GdalDataType::Float32,
        GdalDataType::Float64,
        GdalDataType::CInt16,
        GdalDataType::CInt32,
        GdalDataType::CFloat32,
        GdalDataType::CFloat64,
        GdalDataType::UInt64,
        GdalDataType::Int64,
        GdalDataType::Int8,
    ];

    /// Get the name of the type.
    pub fn name(&self) -> &'static str {
        match self {
            GdalDataType::Unknown => "Unknown",
            GdalDataType::UInt8 => "Byte",
            GdalDataType::Int8 => "Int8",
            GdalDataType::UInt16 => "UInt16",
            GdalDataType::Int16 => "Int16",
            GdalDataType::UInt32 => "UInt32",
            GdalDataType::Int32 => "Int32",
            GdalDataType::UInt64 => "UInt64",
            GdalDataType::Int64 => "Int64",
            GdalDataType::Float32 => "Float32",
            GdalDataType::Float64 => "Float64",
            GdalDataType::CInt16 => "CInt16",
            GdalDataType::CInt32 => "CInt32",
            GdalDataType::CFloat32 => "CFloat32",
            GdalDataType::CFloat64 => "CFloat64",
        }
    }

    /// Get the type size in **bytes**, or `0` for [`GdalDataType::Unknown`].
    pub fn size(&self) -> usize {
        match self {
            GdalDataType::Unknown => 0,
            GdalDataType::UInt8 | GdalDataType::Int8 => 1,
            GdalDataType::UInt16 | GdalDataType::Int16 => 2,
            GdalDataType::UInt32 | GdalDataType::Int32 | GdalDataType::Float32 => 4,
            GdalDataType::CInt16 => 4,
            GdalDataType::UInt64 | GdalDataType::Int64 | GdalDataType::Float64 => 8,
            GdalDataType::CInt32 | GdalDataType::CFloat32 => 8,
            GdalDataType::CFloat64 => 16,
        }
    }

    /// Get the type size in bytes, failing for [`GdalDataType::Unknown`].
    pub fn checked_size(&self) -> Result<usize> {
        match self.size() {
            0 => Err(GdalError::BadArgument(format!(
                "data type {self} has no size"
            ))),
            n => Ok(n),
        }
    }

    /// Get the type size in **bits**.
    pub fn bits(&self) -> usize {
        self.size() * 8
    }

    /// Returns `true` if data type is integral (non-floating point)
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            GdalDataType::UInt8
                | GdalDataType::Int8
                | GdalDataType::UInt16
                | GdalDataType::Int16
                | GdalDataType::UInt32
                | GdalDataType::Int32
                | GdalDataType::UInt64
                | GdalDataType::Int64
                | GdalDataType::CInt16
                | GdalDataType::CInt32
        )
    }

    /// Returns `true` if data type is floating point (non-integral)
    pub fn is_floating(&self) -> bool {
        matches!(
            self,
            GdalDataType::Float32
                | GdalDataType::Float64
                | GdalDataType::CFloat32
                | GdalDataType::CFloat64
        )
    }

    /// Returns `true` if data type supports negative values.
    pub fn is_signed(&self) -> bool {
        !matches!(
            self,
            GdalDataType::Unknown
                | GdalDataType::UInt8
                | GdalDataType::UInt16
                | GdalDataType::UInt32
                | GdalDataType::UInt64
        )
    }

    /// Returns `true` for the complex pair types.
    pub fn is_complex(&self) -> bool {
        matches!(
            self,
            GdalDataType::CInt16
                | GdalDataType::CInt32
                | GdalDataType::CFloat32
                | GdalDataType::CFloat64
        )
    }

    /// Position of the type in [`GdalDataType::ALL`].
    pub(crate) fn ordinal(&self) -> Option<usize> {
        match self {
            GdalDataType::Unknown => None,
            t => Some(*t as usize - 1),
        }
    }
}

impl Display for GdalDataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GdalDataType {
    type Err = GdalError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let name = s.trim();
        GdalDataType::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(name))
            .or_else(|| name.eq_ignore_ascii_case("UInt8").then_some(GdalDataType::UInt8))
            .ok_or_else(|| GdalError::ParseError {
                value: s.to_string(),
                what: "data type",
            })
    }
}

impl TryFrom<u32> for GdalDataType {
    type Error = GdalError;

    fn try_from(value: u32) -> std::result::Result<Self, Self::Error> {
        GdalDataType::ALL
            .into_iter()
            .find(|t| *t as u32 == value)
            .ok_or_else(|| GdalError::BadArgument(format!("unknown GDALDataType {value}")))
    }
}

/// A complex pair, laid out as `{ re, im }`.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[repr(C)]
pub struct Complex<T> {
    pub re: T,
    pub im: T,
}

impl<T> Complex<T> {
    pub fn new(re: T, im: T) -> Self {
        Complex { re, im }
    }
}

// SAFETY: two fields of the same `Pod` type under `repr(C)` leave no padding.
unsafe impl<T: Pod> Zeroable for Complex<T> {}
unsafe impl<T: Pod> Pod for Complex<T> {}

/// Type-level constraint for limiting which primitive numeric values can be passed
/// to functions needing target data type.
pub trait GdalType: Pod {
    fn datatype() -> GdalDataType;
}

macro_rules! impl_gdal_type {
    ($($t:ty => $dt:ident),* $(,)?) => {
        $(
            impl GdalType for $t {
                fn datatype() -> GdalDataType {
                    GdalDataType::$dt
                }
            }
        )*
    };
}

impl_gdal_type!(
    u8 => UInt8,
    i8 => Int8,
    u16 => UInt16,
    i16 => Int16,
    u32 => UInt32,
    i32 => Int32,
    u64 => UInt64,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
    Complex<i16> => CInt16,
    Complex<i32> => CInt32,
    Complex<f32> => CFloat32,
    Complex<f64> => CFloat64,
);
