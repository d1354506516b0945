//! Opaque coordinate reference system handle.
//!
//! The engine never does CRS math; it only stores what the user gave it and
//! hands it back. A few accessors peek into WKT and `AUTH:CODE` strings so
//! callers can identify the system.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::errors::{GdalError, Result};

/// A coordinate reference system as provided by the user.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SpatialRef {
    definition: String,
}

const WKT_ROOTS: [&str; 12] = [
    "GEOGCS", "PROJCS", "GEOCCS", "COMPD_CS", "VERT_CS", "LOCAL_CS", "GEOGCRS", "PROJCRS",
    "GEODCRS", "COMPOUNDCRS", "VERTCRS", "ENGCRS",
];

impl SpatialRef {
    /// Build a handle from any user input: WKT, `AUTH:CODE`, or a
    /// PROJ string.
    pub fn from_definition(definition: &str) -> Result<SpatialRef> {
        let definition = definition.trim();
        if definition.is_empty() {
            return Err(GdalError::BadArgument(
                "empty spatial reference definition".to_string(),
            ));
        }
        Ok(SpatialRef {
            definition: definition.to_string(),
        })
    }

    pub fn from_wkt(wkt: &str) -> Result<SpatialRef> {
        let srs = Self::from_definition(wkt)?;
        if !srs.is_wkt() {
            return Err(GdalError::ParseError {
                value: wkt.to_string(),
                what: "WKT",
            });
        }
        Ok(srs)
    }

    pub fn from_epsg(epsg_code: u32) -> Result<SpatialRef> {
        Self::from_definition(&format!("EPSG:{epsg_code}"))
    }

    /// The definition exactly as stored.
    pub fn definition(&self) -> &str {
        &self.definition
    }

    pub fn is_wkt(&self) -> bool {
        let upper = self.definition.to_ascii_uppercase();
        WKT_ROOTS.iter().any(|root| {
            upper
                .strip_prefix(root)
                .is_some_and(|rest| rest.trim_start().starts_with('['))
        })
    }

    pub fn to_wkt(&self) -> Result<String> {
        if self.is_wkt() {
            Ok(self.definition.clone())
        } else {
            Err(GdalError::Unsupported {
                method_name: "SpatialRef::to_wkt",
                msg: format!("'{}' is not a WKT definition", self.definition),
            })
        }
    }

    pub fn auth_name(&self) -> Result<String> {
        Ok(self.authority_parts()?.0)
    }

    pub fn auth_code(&self) -> Result<i32> {
        let (_, code) = self.authority_parts()?;
        code.parse::<i32>().map_err(|_| GdalError::ParseError {
            value: code,
            what: "authority code",
        })
    }

    /// `AUTH:CODE` of the root node, such as `EPSG:4326`.
    pub fn authority(&self) -> Result<String> {
        let (name, code) = self.authority_parts()?;
        Ok(format!("{name}:{code}"))
    }

    fn authority_parts(&self) -> Result<(String, String)> {
        let found = if self.is_wkt() {
            root_authority(&self.definition)
        } else {
            self.definition
                .split_once(':')
                .filter(|(name, code)| {
                    !name.is_empty()
                        && name.chars().all(|c| c.is_ascii_alphanumeric())
                        && !code.is_empty()
                        && code.chars().all(|c| c.is_ascii_alphanumeric())
                })
                .map(|(name, code)| (name.to_ascii_uppercase(), code.to_string()))
        };
        found.ok_or_else(|| GdalError::NotFound {
            name: "authority".to_string(),
            scope: self.definition.clone(),
        })
    }
}

/// Find the `AUTHORITY[...]` (WKT1) or `ID[...]` (WKT2) node that is a
/// direct child of the root node.
fn root_authority(wkt: &str) -> Option<(String, String)> {
    let bytes = wkt.as_bytes();
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut found = None;
    let mut token_start = 0usize;
    for (i, &c) in bytes.iter().enumerate() {
        match c {
            b'"' => in_quotes = !in_quotes,
            _ if in_quotes => {}
            b'[' | b'(' => {
                if depth == 1 {
                    let keyword = wkt[token_start..i].trim().to_ascii_uppercase();
                    if keyword == "AUTHORITY" || keyword == "ID" {
                        found = authority_args(&wkt[i + 1..]);
                    }
                }
                depth += 1;
            }
            b']' | b')' => depth = depth.saturating_sub(1),
            b',' => token_start = i + 1,
            _ => {}
        }
        if matches!(c, b'[' | b'(' | b']' | b')') && !in_quotes {
            token_start = i + 1;
        }
    }
    found
}

fn authority_args(rest: &str) -> Option<(String, String)> {
    let end = rest.find([']', ')'])?;
    let mut parts = rest[..end].split(',').map(|p| p.trim().trim_matches('"'));
    let name = parts.next().filter(|s| !s.is_empty())?;
    let code = parts.next().filter(|s| !s.is_empty())?;
    Some((name.to_string(), code.to_string()))
}

impl FromStr for SpatialRef {
    type Err = GdalError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_definition(s)
    }
}

impl Display for SpatialRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.definition)
    }
}
