// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::fmt;

/// The minimal status-code set used across the writer/query boundary.
///
/// Every fallible operation in this crate reports one of these, never a
/// bespoke kind invented at the call site.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Status {
    /// Operation completed normally.
    Ok,
    /// A query or range scan produced nothing.
    NoData,
    /// A requested series id is not present in the registry.
    NotFound,
    /// Malformed argument, e.g. re-creating an existing series.
    BadArg,
    /// A sample's series id was not a key of the query's group-by mapping.
    BadData,
    /// Payload type is not `Float`, or the float is not finite.
    BadValue,
    /// The requested behavior (order-by-time) is not implemented.
    NotImplemented,
    /// The block store reported an I/O error.
    Io,
    /// The block store is unavailable (non-I/O transient failure).
    Unavailable,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// An error carrying a [`Status`] and, where known, its root cause.
#[derive(Debug)]
pub struct StoreError {
    /// The status code reported to the writer or query consumer.
    pub status: Status,
    source: Option<std::io::Error>,
}

impl StoreError {
    /// Builds an error with no further detail than the status code.
    #[must_use]
    pub fn new(status: Status) -> Self {
        Self {
            status,
            source: None,
        }
    }

    /// Builds an I/O-flavored error, preserving the underlying cause.
    #[must_use]
    pub fn io(err: std::io::Error) -> Self {
        Self {
            status: Status::Io,
            source: Some(err),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}: {source}", self.status),
            None => write!(f, "{}", self.status),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as _)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::io(value)
    }
}

impl From<Status> for StoreError {
    fn from(status: Status) -> Self {
        Self::new(status)
    }
}

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, StoreError>;
