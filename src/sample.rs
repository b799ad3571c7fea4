// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::error::{Status, StoreError};

/// Opaque per-series identifier, assigned by the external name registry.
///
/// Densely packed but not necessarily contiguous; immutable for the life
/// of the database.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ParamId(pub u64);

impl From<u64> for ParamId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// A logical address of a block in the block store.
///
/// Persistent across process restarts.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct LogicalAddr(pub u64);

/// The payload type tag of a [`Sample`].
///
/// `Float` is the only variant this core actually stores; the enum exists
/// so a non-float write has something concrete to be rejected as.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PayloadType {
    /// An IEEE-754 double.
    Float,
}

/// The quadruple `(series_id, timestamp, payload_type, value)`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Sample {
    /// Series this sample belongs to.
    pub id: ParamId,
    /// Monotonically-nondecreasing-per-series-but-not-enforced timestamp.
    pub ts: u64,
    /// Payload type tag.
    pub payload: PayloadType,
    /// The stored value, meaningful only when `payload == Float`.
    pub value: f64,
}

impl Sample {
    /// Builds a float sample.
    #[must_use]
    pub fn float(id: ParamId, ts: u64, value: f64) -> Self {
        Self {
            id,
            ts,
            payload: PayloadType::Float,
            value,
        }
    }

    /// Validates that this sample is storable by this core: a finite
    /// `Float` payload.
    ///
    /// # Errors
    ///
    /// Returns [`Status::BadValue`] for any other payload type or a
    /// non-finite float (`NaN`/`inf`), per the "only finite IEEE-754
    /// double values are stored" rule.
    pub fn validate(&self) -> Result<(), StoreError> {
        match self.payload {
            PayloadType::Float if self.value.is_finite() => Ok(()),
            PayloadType::Float => Err(StoreError::new(Status::BadValue)),
        }
    }
}
