use std::fmt::{self, Debug, Display, Formatter};

use thiserror::Error;

use crate::cpl::{CplErrType, CplErrorNum};
use crate::Dataset;

pub type Result<T> = std::result::Result<T, GdalError>;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum GdalError {
    #[error("Bad argument: {0}")]
    BadArgument(String),
    #[error("Out of memory: {0}")]
    OutOfMemory(String),
    #[error("Object is read-only: {0}")]
    ReadOnly(String),
    #[error("'{name}' already exists in {scope}")]
    NameExists { name: String, scope: String },
    #[error("'{name}' not found in {scope}")]
    NotFound { name: String, scope: String },
    #[error("{object} has been deleted")]
    Deleted { object: String },
    #[error("Cannot convert from {from} to {to}")]
    TypeMismatch { from: String, to: String },
    #[error("Unsupported operation '{method_name}': {msg}")]
    Unsupported {
        method_name: &'static str,
        msg: String,
    },
    #[error("Interrupted by user in '{method_name}'")]
    UserInterrupt { method_name: &'static str },
    #[error("Can't parse '{value}' as {what}")]
    ParseError { value: String, what: &'static str },
    #[cfg(feature = "ndarray")]
    #[error(transparent)]
    NdarrayShapeError(#[from] ndarray::ShapeError),
}

impl GdalError {
    /// Error number reported on the error channel for this error.
    pub fn error_num(&self) -> CplErrorNum {
        match self {
            GdalError::BadArgument(_) | GdalError::ParseError { .. } => CplErrorNum::IllegalArg,
            GdalError::OutOfMemory(_) => CplErrorNum::OutOfMemory,
            GdalError::ReadOnly(_) => CplErrorNum::NoWriteAccess,
            GdalError::NameExists { .. } | GdalError::TypeMismatch { .. } => {
                CplErrorNum::AppDefined
            }
            GdalError::NotFound { .. } | GdalError::Deleted { .. } => CplErrorNum::ObjectNull,
            GdalError::Unsupported { .. } => CplErrorNum::NotSupported,
            GdalError::UserInterrupt { .. } => CplErrorNum::UserInterrupt,
            #[cfg(feature = "ndarray")]
            GdalError::NdarrayShapeError(_) => CplErrorNum::IllegalArg,
        }
    }

    /// Severity reported on the error channel for this error.
    pub fn class(&self) -> CplErrType {
        CplErrType::Failure
    }
}

/// Returned by [`Dataset::try_into_thread_safe`] when the dataset cannot be
/// shared between threads. The dataset is handed back by
/// [`DatasetNotThreadSafeError::into_inner`].
pub struct DatasetNotThreadSafeError(pub(crate) Dataset);

impl DatasetNotThreadSafeError {
    pub fn into_inner(self) -> Dataset {
        self.0
    }
}

impl Debug for DatasetNotThreadSafeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DatasetNotThreadSafeError")
            .field(&self.0)
            .finish()
    }
}

impl Display for DatasetNotThreadSafeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("dataset is not thread-safe for the requested scope")
    }
}

impl std::error::Error for DatasetNotThreadSafeError {}
