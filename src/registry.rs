// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The column store registry: owns one append tree per
//! series behind a single table lock, routes writes into them, and
//! composes per-series range iterators into a row stream for queries.
//!
//! Grounded on the shared-ownership-behind-a-lock shape of `TreeInner`
//! (`src/tree/inner.rs` in the teacher crate): the tree handle itself is
//! `Arc`-shared and stable once inserted, so holding the table lock only
//! for the lookup-and-append is correct and cheap.

use crate::append_tree::{AppendResult, AppendTree, AppendTreeConfig};
use crate::block_store::BlockStore;
use crate::config::StoreConfig;
use crate::error::Status;
use crate::query::{OrderBy, QueryConsumer, ReshapeRequest};
use crate::row_iter::{ReadStatus, RowIterator};
use crate::sample::{LogicalAddr, ParamId, Sample};
use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex};

/// Default batch size the query driver reads at a time (this value
/// 4096 as its suggested, tunable default).
pub const DEFAULT_QUERY_BATCH_SIZE: usize = 4096;

/// Owns the set of append trees keyed by series id.
pub struct ColumnStore {
    store: Arc<dyn BlockStore>,
    tree_config: AppendTreeConfig,
    query_batch_size: usize,
    table: Mutex<FxHashMap<ParamId, Arc<AppendTree>>>,
}

impl ColumnStore {
    /// Opens an empty registry backed by `store`.
    #[must_use]
    pub fn new(store: Arc<dyn BlockStore>) -> Self {
        Self::with_config(store, StoreConfig::default())
    }

    /// Opens a registry with non-default tree/query tuning.
    #[must_use]
    pub fn with_config(store: Arc<dyn BlockStore>, config: StoreConfig) -> Self {
        Self {
            store,
            tree_config: config.tree,
            query_batch_size: config.query_batch_size,
            table: Mutex::new(FxHashMap::default()),
        }
    }

    /// Creates a new append tree for `id`.
    ///
    /// # Errors
    ///
    /// [`Status::BadArg`] if `id` already exists. The check-then-insert
    /// is atomic under the table lock.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned by a prior panic.
    pub fn create_new_column(&self, id: ParamId) -> Result<(), Status> {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let mut table = self.table.lock().expect("lock poisoned");
        if table.contains_key(&id) {
            return Err(Status::BadArg);
        }
        let tree = Arc::new(AppendTree::new(self.store.clone(), self.tree_config));
        tree.force_init();
        table.insert(id, tree);
        drop(table);
        Ok(())
    }

    /// Reconstructs a column from a previously-closed tree's root set
    /// (the recovery contract).
    ///
    /// # Errors
    ///
    /// [`Status::BadArg`] if `id` already exists.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned by a prior panic.
    pub fn restore_column(&self, id: ParamId, roots: Vec<LogicalAddr>) -> Result<(), Status> {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let mut table = self.table.lock().expect("lock poisoned");
        if table.contains_key(&id) {
            return Err(Status::BadArg);
        }
        let tree = Arc::new(AppendTree::from_roots(
            self.store.clone(),
            self.tree_config,
            roots,
        ));
        table.insert(id, tree);
        drop(table);
        Ok(())
    }

    /// Routes `sample` to its tree, under the table lock.
    ///
    /// On [`AppendResult::OkFlushNeeded`], pushes the tree's current
    /// roots onto `rescue_out` for the caller to persist durably. On
    /// success, if `session_cache` is supplied, populates it with a
    /// shared handle to the tree so future writes for the same id can
    /// bypass the table lock entirely.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned by a prior panic.
    #[expect(
        clippy::significant_drop_tightening,
        reason = "the append must happen while `table` is held, else the mapping \
                  could be rehashed out from under `tree` mid-append"
    )]
    pub fn write(
        &self,
        sample: Sample,
        rescue_out: &mut Vec<LogicalAddr>,
        session_cache: Option<&mut FxHashMap<ParamId, Arc<AppendTree>>>,
    ) -> AppendResult {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let table = self.table.lock().expect("lock poisoned");
        let Some(tree) = table.get(&sample.id) else {
            return AppendResult::FailBadId;
        };

        // The append itself happens while still holding the table lock:
        // the sample's destination tree is reached via the mapping that
        // must not be rehashed underneath us.
        let result = tree.append(sample.ts, sample.value);

        if result == AppendResult::OkFlushNeeded {
            rescue_out.extend(tree.get_roots());
        }

        if matches!(result, AppendResult::Ok | AppendResult::OkFlushNeeded) {
            if let Some(cache) = session_cache {
                cache.insert(sample.id, tree.clone());
            }
        }

        result
    }

    /// Sum of every tree's `uncommitted_size()`, read under the lock.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned by a prior panic.
    #[must_use]
    pub fn uncommitted_memory(&self) -> u64 {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let table = self.table.lock().expect("lock poisoned");
        table.values().map(|t| t.uncommitted_size()).sum()
    }

    /// Drains every tree, returning `series_id -> ordered root
    /// addresses`. The caller persists this externally.
    ///
    /// A missing id in the returned map indicates that tree's close
    /// failed; the failure is logged, the tree is left open (a later
    /// `close()` call can retry it), and the remaining trees are still
    /// closed.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned by a prior panic.
    #[must_use]
    pub fn close(&self) -> FxHashMap<ParamId, Vec<LogicalAddr>> {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let table = self.table.lock().expect("lock poisoned");
        table
            .iter()
            .filter_map(|(id, tree)| match tree.close() {
                Ok(roots) => Some((*id, roots)),
                Err(err) => {
                    log::error!("close: series {id:?} failed to close: {err}");
                    None
                }
            })
            .collect()
    }

    /// Drives `request` against the registry, delivering rows to
    /// `consumer`.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned by a prior panic.
    pub fn query(&self, request: &ReshapeRequest, consumer: &mut dyn QueryConsumer) {
        log::trace!("query: {request}");

        let mut sources = Vec::with_capacity(request.select.ids.len());
        {
            #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
            let table = self.table.lock().expect("lock poisoned");
            for &id in &request.select.ids {
                match table.get(&id) {
                    Some(tree) => match tree.search(request.select.begin, request.select.end) {
                        Ok(iter) => sources.push((
                            id,
                            Box::new(iter) as Box<dyn Iterator<Item = (u64, f64)> + '_>,
                        )),
                        Err(err) => {
                            log::error!("query: series {id:?} range scan failed: {err}");
                            consumer.set_error(err.status);
                            return;
                        }
                    },
                    None => consumer.set_error(Status::NotFound),
                }
            }
        }
        // Table lock released here; iterators hold no lock on the tree.

        if request.order_by == OrderBy::Time {
            consumer.set_error(Status::NotImplemented);
            return;
        }

        let mut row_iter = RowIterator::chain(sources);
        let mut batch = Vec::with_capacity(self.query_batch_size);

        loop {
            batch.clear();
            let (status, _n) = match row_iter.read(&mut batch, self.query_batch_size) {
                Ok(result) => result,
                Err(err) => {
                    consumer.set_error(err.status);
                    return;
                }
            };

            #[expect(
                clippy::iter_with_drain,
                reason = "batch's allocation is reused across loop iterations"
            )]
            for (id, ts, value) in batch.drain(..) {
                if request.group_by.enabled {
                    if !request.group_by.transient_map.contains_key(&id) {
                        log::error!("query: series {id:?} missing from group_by mapping");
                        consumer.set_error(Status::BadData);
                        return;
                    }
                    // Validated only; projection is a consumer concern
                    // (validate, then drop, rather than emit).
                    continue;
                }

                if !consumer.put(id, ts, value) {
                    return;
                }
            }

            if status == ReadStatus::NoData {
                return;
            }
        }
    }
}
