//! Error types for registration and dissection.
//!
//! - [`BoundsError`] - a read or slice fell outside a [`ByteView`](crate::ByteView)
//! - [`DissectError`] - what a Handler may fail with while dissecting
//! - [`RegistrationError`] - configuration defects detected during the init phase
//! - [`enum@Error`] - wraps all of the above

use thiserror::Error;

use super::catalog::ProtocolId;
use super::registry::Key;

/// A read or slice that does not fit inside a view.
///
/// `Truncated` means the bytes exist on the wire but were not captured;
/// the other variants mean the packet itself is malformed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundsError {
    #[error("offset {offset} is past the {captured} captured bytes")]
    OffsetOutOfRange { offset: usize, captured: usize },

    #[error("packet size limited during capture: need {needed} bytes at offset {offset}, {captured} captured")]
    Truncated {
        offset: usize,
        needed: usize,
        captured: usize,
    },

    #[error("{needed} bytes at offset {offset} exceed the reported length {reported}")]
    PastReported {
        offset: usize,
        needed: usize,
        reported: usize,
    },
}

/// Failure returned by a Handler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DissectError {
    #[error(transparent)]
    Bounds(#[from] BoundsError),

    #[error("{reason}")]
    Malformed { reason: String },

    #[error("dissection exceeded the maximum depth of {limit}")]
    RecursionLimitExceeded { limit: u32 },
}

impl DissectError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        DissectError::Malformed {
            reason: reason.into(),
        }
    }
}

/// Configuration errors. These are fatal at startup and never occur once
/// the registry is frozen.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("dissector table {name:?} is already registered")]
    DuplicateTable { name: String },

    #[error("key {key} is already registered in dissector table {table:?}")]
    DuplicateKey { table: String, key: Key },

    #[error("protocol {name:?} is already registered")]
    DuplicateProtocol { name: String },

    #[error("protocol {protocol} already has a heuristic on {anchor:?}")]
    DuplicateHeuristic { anchor: String, protocol: ProtocolId },

    #[error("a handler named {name:?} is already registered")]
    DuplicateNamedHandler { name: String },

    #[error("unknown dissector table {name:?}")]
    UnknownTable { name: String },

    #[error("unknown protocol {0}")]
    UnknownProtocol(ProtocolId),

    #[error("unknown protocol name {0:?}")]
    UnknownProtocolName(String),

    #[error("no heuristic for protocol {protocol} on {anchor:?}")]
    UnknownHeuristic { anchor: String, protocol: ProtocolId },

    #[error("invalid key range {lo}..={hi}")]
    InvalidRange { lo: u32, hi: u32 },
}

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    #[error("registration error: {0}")]
    Registration(#[from] RegistrationError),

    #[error("dissection error: {0}")]
    Dissect(#[from] DissectError),
}

pub type Result<T> = std::result::Result<T, Error>;
