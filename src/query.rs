// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The query request/consumer vocabulary.
//!
//! Consumed from, and produced to, external collaborators: the query
//! parser builds a [`ReshapeRequest`], the registry drives it, and
//! results are delivered to a [`QueryConsumer`].

use crate::error::Status;
use crate::sample::ParamId;
use rustc_hash::FxHashMap;

/// How the row stream should be ordered.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OrderBy {
    /// Emit all samples of each requested series, in request order
    /// (supported).
    Series,
    /// Cross-series chronological merge (not implemented in this core;
    /// out of scope here).
    Time,
}

/// Group-by projection parameters.
///
/// This core validates group-by membership but does not perform the
/// projection itself: matching samples are
/// dropped after validation, on the understanding that emission is a
/// consumer-side concern.
#[derive(Clone, Debug, Default)]
pub struct GroupBy {
    /// Whether group-by validation is active for this query.
    pub enabled: bool,
    /// Mapping consulted only for membership validation.
    pub transient_map: FxHashMap<ParamId, u64>,
}

/// The series selection: which ids, over what half-open time range.
#[derive(Clone, Debug)]
pub struct Select {
    /// Ordered sequence of series ids.
    pub ids: Vec<ParamId>,
    /// Inclusive range start.
    pub begin: u64,
    /// Exclusive range end.
    pub end: u64,
}

/// A query descriptor, built by the (out-of-scope) query parser.
#[derive(Clone, Debug)]
pub struct ReshapeRequest {
    /// Series selection.
    pub select: Select,
    /// Requested row ordering.
    pub order_by: OrderBy,
    /// Group-by validation parameters.
    pub group_by: GroupBy,
}

impl std::fmt::Display for ReshapeRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ReshapeRequest {{ ids: {:?}, range: [{}, {}), order_by: {:?}, group_by: {} }}",
            self.select.ids, self.select.begin, self.select.end, self.order_by, self.group_by.enabled,
        )
    }
}

/// The sink a query streams results into.
pub trait QueryConsumer {
    /// Delivers one sample. Returning `false` is back-pressure: "stop, I
    /// will not take more."
    fn put(&mut self, id: ParamId, ts: u64, value: f64) -> bool;

    /// Reports a failure encountered while driving the query. May be
    /// called more than once — e.g. once per missing id while looking up
    /// the select list, since a `NotFound` id does not abort the rest of
    /// the query. `Status::Ok` is never reported (absence of a call
    /// means success). Implementations that only care about the first
    /// failure should keep just that; [`VecConsumer`] keeps the most
    /// recent call.
    fn set_error(&mut self, status: Status);
}

/// A [`QueryConsumer`] that collects everything into memory; used by
/// tests and as a reference implementation.
#[derive(Default)]
pub struct VecConsumer {
    /// Delivered samples, in delivery order.
    pub rows: Vec<(ParamId, u64, f64)>,
    /// The status reported via `set_error`, if any.
    pub error: Option<Status>,
    /// If set, `put` returns `false` once `rows.len()` reaches this.
    pub stop_after: Option<usize>,
}

impl QueryConsumer for VecConsumer {
    fn put(&mut self, id: ParamId, ts: u64, value: f64) -> bool {
        self.rows.push((id, ts, value));
        match self.stop_after {
            Some(limit) => self.rows.len() < limit,
            None => true,
        }
    }

    fn set_error(&mut self, status: Status) {
        self.error = Some(status);
    }
}
