use std::time::Duration;
use thiserror::Error;

use crate::advertisement::{AdId, ZoneId};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid coordinates: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinates { latitude: f64, longitude: f64 },

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unsupported selection method: {0}")]
    UnsupportedMethod(i64),

    #[error("Advertisement not found: {0}")]
    AdvertisementNotFound(AdId),

    #[error("Geo zone not found: {0}")]
    ZoneNotFound(ZoneId),

    #[error("Preference embedding not found for user: {0}")]
    PreferenceNotFound(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Resource pool exhausted after waiting {waited:?}")]
    PoolExhausted { waited: Duration },

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Invariant violation: {0}")]
    Invariant(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Coarse classification used by callers to decide how to report or retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Transient,
    Deadline,
    Invariant,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidCoordinates { .. }
            | Error::InvalidDimension { .. }
            | Error::InvalidInput(_)
            | Error::UnsupportedMethod(_) => ErrorKind::InvalidInput,
            Error::AdvertisementNotFound(_)
            | Error::ZoneNotFound(_)
            | Error::PreferenceNotFound(_) => ErrorKind::NotFound,
            Error::Unavailable(_) | Error::PoolExhausted { .. } => ErrorKind::Transient,
            Error::DeadlineExceeded => ErrorKind::Deadline,
            Error::Invariant(_) => ErrorKind::Invariant,
            Error::InvalidConfig(_)
            | Error::Persistence(_)
            | Error::Io(_)
            | Error::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// Whether retrying the same call later may succeed.
    #[inline]
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}
