use crate::errors::{GdalError, Result};

/// Split `s` at the first `delim`, returning `None` when there is no delimiter.
pub fn _string_tuple(s: &str, delim: char) -> Option<(String, String)> {
    s.split_once(delim)
        .map(|(k, v)| (k.to_string(), v.to_string()))
}

/// Parse an integer that may be written in decimal or as `0x`-prefixed hex.
pub fn _parse_pointer(value: &str) -> Result<usize> {
    let v = value.trim();
    let parsed = match v.strip_prefix("0x").or_else(|| v.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => v.parse::<usize>(),
    };
    parsed.map_err(|_| GdalError::ParseError {
        value: value.to_string(),
        what: "pointer",
    })
}

pub fn _parse_usize(value: &str, what: &'static str) -> Result<usize> {
    value.trim().parse().map_err(|_| GdalError::ParseError {
        value: value.to_string(),
        what,
    })
}

pub fn _parse_isize(value: &str, what: &'static str) -> Result<isize> {
    value.trim().parse().map_err(|_| GdalError::ParseError {
        value: value.to_string(),
        what,
    })
}

pub fn _parse_f64(value: &str, what: &'static str) -> Result<f64> {
    value.trim().parse().map_err(|_| GdalError::ParseError {
        value: value.to_string(),
        what,
    })
}
