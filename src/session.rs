// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The writer session: a thread-local cache of `series id ->
//! append tree` handles, letting a hot writer bypass the registry's
//! table lock once it has touched a series once.
//!
//! Grounded on the handle-caching idiom in
//! `src/descriptor_table/mod.rs` in the teacher crate (a private cache
//! of shared handles that avoids a contended lookup structure on the hot
//! path) — generalized from file descriptors to append-tree handles.

use crate::append_tree::{AppendResult, AppendTree};
use crate::query::{QueryConsumer, ReshapeRequest};
use crate::registry::ColumnStore;
use crate::sample::{LogicalAddr, ParamId, Sample};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// A thread-local caching writer handle onto a [`ColumnStore`].
///
/// Not `Sync`: a session is meant for one logical writer (one
/// connection, one thread) and does not outlive, or keep alive, the
/// registry it was built from.
pub struct WriterSession<'a> {
    registry: &'a ColumnStore,
    cache: FxHashMap<ParamId, Arc<AppendTree>>,
}

impl<'a> WriterSession<'a> {
    /// Opens a session against `registry`.
    #[must_use]
    pub fn new(registry: &'a ColumnStore) -> Self {
        Self {
            registry,
            cache: FxHashMap::default(),
        }
    }

    /// Appends `sample`, using the session's cache to skip the registry's
    /// table lock when possible.
    ///
    /// The cache is never invalidated here: trees are never removed from
    /// the registry for the database's lifetime, so once cached, a
    /// handle stays valid for the session's whole life.
    pub fn write(&mut self, sample: Sample, rescue_out: &mut Vec<LogicalAddr>) -> AppendResult {
        if sample.validate().is_err() {
            return AppendResult::FailBadValue;
        }

        if let Some(tree) = self.cache.get(&sample.id) {
            let result = tree.append(sample.ts, sample.value);
            if result == AppendResult::OkFlushNeeded {
                rescue_out.extend(tree.get_roots());
            }
            return result;
        }

        self.registry
            .write(sample, rescue_out, Some(&mut self.cache))
    }

    /// Forwards a query to the registry; sessions do not parallelize
    /// queries.
    pub fn query(&self, request: &ReshapeRequest, consumer: &mut dyn QueryConsumer) {
        self.registry.query(request, consumer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_store::InMemoryBlockStore;
    use crate::query::{GroupBy, OrderBy, Select, VecConsumer};
    use test_log::test;

    #[allow(clippy::unwrap_used)]
    #[test]
    fn cache_hit_bypasses_registry_lock_but_same_data_visible() {
        let registry = ColumnStore::new(Arc::new(InMemoryBlockStore::new()));
        registry.create_new_column(ParamId(1)).unwrap();

        let mut session = WriterSession::new(&registry);
        let mut rescue = Vec::new();
        session.write(Sample::float(ParamId(1), 1, 1.0), &mut rescue);
        // second write for the same id should now hit the session cache
        session.write(Sample::float(ParamId(1), 2, 2.0), &mut rescue);

        let mut consumer = VecConsumer::default();
        registry.query(
            &ReshapeRequest {
                select: Select {
                    ids: vec![ParamId(1)],
                    begin: 0,
                    end: 1000,
                },
                order_by: OrderBy::Series,
                group_by: GroupBy::default(),
            },
            &mut consumer,
        );

        assert_eq!(
            consumer.rows,
            vec![(ParamId(1), 1, 1.0), (ParamId(1), 2, 2.0)]
        );
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn non_float_payload_rejected_before_touching_registry() {
        let registry = ColumnStore::new(Arc::new(InMemoryBlockStore::new()));
        registry.create_new_column(ParamId(1)).unwrap();

        let mut session = WriterSession::new(&registry);
        let mut rescue = Vec::new();
        let result = session.write(Sample::float(ParamId(1), 1, f64::NAN), &mut rescue);
        assert_eq!(result, AppendResult::FailBadValue);
    }

    #[test]
    fn unknown_id_reports_bad_id() {
        let registry = ColumnStore::new(Arc::new(InMemoryBlockStore::new()));
        let mut session = WriterSession::new(&registry);
        let mut rescue = Vec::new();
        let result = session.write(Sample::float(ParamId(42), 1, 1.0), &mut rescue);
        assert_eq!(result, AppendResult::FailBadId);
    }
}
