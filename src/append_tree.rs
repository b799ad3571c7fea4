// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The per-series append tree.
//!
//! An in-memory write buffer seals into block-sized leaves, which are in
//! turn aggregated by fixed fan-out into inner blocks, forming a
//! multi-level tree whose topmost addresses ("roots") are a complete
//! recovery set once persisted elsewhere.
//!
//! Node lifecycle, see [`NodeState`], is one-way: `Empty -> Filling ->
//! Sealed(addr) -> Linked(parent_addr)`.

use crate::block_store::BlockStore;
use crate::error::{Status, StoreError};
use crate::sample::LogicalAddr;
use std::sync::{Arc, Mutex};

/// Lifecycle of a block, one-way: `Empty -> Filling -> Sealed(addr) ->
/// Linked(parent_addr)`.
///
/// A block becomes `Sealed` the instant it is appended to the block
/// store (immutable and shareable from then on); it becomes `Linked`
/// only once its address is folded into a parent seal, at which point
/// it stops being a root.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NodeState {
    /// No samples accumulated yet.
    Empty,
    /// Accumulating in memory, below the seal threshold.
    Filling,
    /// Written to the block store; a root until linked.
    Sealed(LogicalAddr),
    /// Folded into a parent block's seal; no longer a root.
    Linked(LogicalAddr),
}

/// Outcome of a single [`AppendTree::append`] call.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AppendResult {
    /// Appended; no level sealed.
    Ok,
    /// Appended, and at least one level sealed as a result. The caller
    /// must read [`AppendTree::get_roots`] and persist it durably.
    OkFlushNeeded,
    /// Payload type was not `Float`, or the float was not finite.
    FailBadValue,
    /// The tree has been closed and no longer accepts writes.
    FailBadId,
    /// The block store failed while sealing a level.
    FailIo,
}

/// Tunable knobs for the flush/fan-out policy.
#[derive(Copy, Clone, Debug)]
pub struct AppendTreeConfig {
    /// Number of samples buffered in memory before a leaf is sealed.
    pub leaf_capacity: usize,
    /// Number of child addresses aggregated into one inner block.
    pub fan_out: usize,
}

impl Default for AppendTreeConfig {
    fn default() -> Self {
        Self {
            leaf_capacity: 4096,
            fan_out: 4,
        }
    }
}

const LEAF_TAG: u8 = 0;
const INNER_TAG: u8 = 1;

fn encode_leaf(samples: &[(u64, f64)]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + samples.len() * 16);
    buf.push(LEAF_TAG);
    for (ts, value) in samples {
        buf.extend_from_slice(&ts.to_le_bytes());
        buf.extend_from_slice(&value.to_bits().to_le_bytes());
    }
    buf
}

fn encode_inner(children: &[LogicalAddr]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + children.len() * 8);
    buf.push(INNER_TAG);
    for addr in children {
        buf.extend_from_slice(&addr.0.to_le_bytes());
    }
    buf
}

enum DecodedBlock {
    Leaf(Vec<(u64, f64)>),
    Inner(Vec<LogicalAddr>),
}

fn decode_block(bytes: &[u8]) -> Result<DecodedBlock, StoreError> {
    let (tag, rest) = bytes
        .split_first()
        .ok_or_else(|| StoreError::new(Status::Io))?;
    match *tag {
        LEAF_TAG => {
            let mut samples = Vec::with_capacity(rest.len() / 16);
            for chunk in rest.chunks_exact(16) {
                #[expect(
                    clippy::unwrap_used,
                    clippy::indexing_slicing,
                    reason = "chunks_exact(16) guarantees the slice"
                )]
                let ts = u64::from_le_bytes(chunk[0..8].try_into().unwrap());
                #[expect(
                    clippy::unwrap_used,
                    clippy::indexing_slicing,
                    reason = "chunks_exact(16) guarantees the slice"
                )]
                let bits = u64::from_le_bytes(chunk[8..16].try_into().unwrap());
                samples.push((ts, f64::from_bits(bits)));
            }
            Ok(DecodedBlock::Leaf(samples))
        }
        INNER_TAG => {
            let mut children = Vec::with_capacity(rest.len() / 8);
            for chunk in rest.chunks_exact(8) {
                #[expect(clippy::unwrap_used, reason = "chunks_exact(8) guarantees the slice")]
                let addr = u64::from_le_bytes(chunk.try_into().unwrap());
                children.push(LogicalAddr(addr));
            }
            Ok(DecodedBlock::Inner(children))
        }
        _ => Err(StoreError::new(Status::Io)),
    }
}

struct Inner {
    initialized: bool,
    closed: bool,
    /// Level 0: the in-memory write buffer, never persisted directly.
    buffer: Vec<(u64, f64)>,
    /// Levels 1..N: addresses sealed at that level but not yet folded
    /// into a parent seal. These are exactly the tree's current roots.
    levels: Vec<Vec<LogicalAddr>>,
}

/// A multi-level, copy-on-write-ish structure buffering one series'
/// samples and flushing them into a block store.
pub struct AppendTree {
    config: AppendTreeConfig,
    store: Arc<dyn BlockStore>,
    inner: Mutex<Inner>,
}

impl AppendTree {
    /// Creates a new, empty-and-uninitialized tree over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn BlockStore>, config: AppendTreeConfig) -> Self {
        Self {
            config,
            store,
            inner: Mutex::new(Inner {
                initialized: false,
                closed: false,
                buffer: Vec::new(),
                levels: Vec::new(),
            }),
        }
    }

    /// Reconstructs a tree from a previously-persisted root set, making
    /// next-boot reconstruction of the full history possible.
    ///
    /// The given roots are treated as already-sealed, unlinked blocks;
    /// `search` and `get_roots` work identically to a tree that reached
    /// the same state by appending and flushing directly.
    #[must_use]
    pub fn from_roots(
        store: Arc<dyn BlockStore>,
        config: AppendTreeConfig,
        roots: Vec<LogicalAddr>,
    ) -> Self {
        Self {
            config,
            store,
            inner: Mutex::new(Inner {
                initialized: true,
                closed: false,
                buffer: Vec::new(),
                levels: vec![roots],
            }),
        }
    }

    /// Ensures the in-memory level exists.
    ///
    /// Newly created trees start empty-and-uninitialized to allow
    /// bulk-load optimizations; this is idempotent.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned by a prior panic.
    pub fn force_init(&self) {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let mut inner = self.inner.lock().expect("lock poisoned");
        inner.initialized = true;
    }

    /// Appends one sample.
    ///
    /// Returns [`AppendResult::OkFlushNeeded`] if this append sealed at
    /// least one level; the caller must then persist
    /// [`AppendTree::get_roots`] to keep the recovery guarantee.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned by a prior panic.
    pub fn append(&self, ts: u64, value: f64) -> AppendResult {
        if !value.is_finite() {
            return AppendResult::FailBadValue;
        }

        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let mut inner = self.inner.lock().expect("lock poisoned");
        if inner.closed {
            return AppendResult::FailBadId;
        }

        inner.buffer.push((ts, value));

        if inner.buffer.len() < self.config.leaf_capacity {
            return AppendResult::Ok;
        }

        let sealed = std::mem::take(&mut inner.buffer);
        match self.store.append(encode_leaf(&sealed)) {
            Ok(addr) => {
                log::trace!("append_tree: buffer sealed -> {:?}", NodeState::Sealed(addr));
                let _ = self.cascade(&mut inner, addr, 0);
                AppendResult::OkFlushNeeded
            }
            Err(err) => {
                // Seal failed: the sample that triggered it is not
                // committed, but the buffer must not be corrupted.
                log::error!("append_tree: failed to seal leaf block: {err}");
                inner.buffer = sealed;
                inner.buffer.pop();
                AppendResult::FailIo
            }
        }
    }

    /// Folds `addr` into level `level`'s pending-children list, sealing
    /// and cascading upward for as long as fan-out is reached. Returns
    /// `false` if a seal failed partway up the chain; the unsealed
    /// addresses remain valid, unlinked roots, and nothing is lost.
    fn cascade(&self, inner: &mut Inner, addr: LogicalAddr, level: usize) -> bool {
        if inner.levels.len() <= level {
            inner.levels.resize_with(level + 1, Vec::new);
        }

        #[expect(clippy::indexing_slicing, reason = "resized above to cover `level`")]
        inner.levels[level].push(addr);

        #[expect(clippy::indexing_slicing, reason = "resized above to cover `level`")]
        if inner.levels[level].len() >= self.config.fan_out {
            #[expect(clippy::indexing_slicing, reason = "resized above to cover `level`")]
            let children = std::mem::take(&mut inner.levels[level]);
            match self.store.append(encode_inner(&children)) {
                Ok(parent_addr) => {
                    log::trace!(
                        "append_tree: {} child block(s) linked -> {:?}",
                        children.len(),
                        NodeState::Linked(parent_addr)
                    );
                    self.cascade(inner, parent_addr, level + 1)
                }
                Err(err) => {
                    log::error!(
                        "append_tree: failed to seal inner block at level {level}: {err}"
                    );
                    #[expect(clippy::indexing_slicing, reason = "resized above to cover `level`")]
                    {
                        inner.levels[level] = children;
                    }
                    false
                }
            }
        } else {
            true
        }
    }

    /// Current topmost addresses. Cheap; a pure read.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned by a prior panic.
    #[must_use]
    pub fn get_roots(&self) -> Vec<LogicalAddr> {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let inner = self.inner.lock().expect("lock poisoned");
        inner.levels.iter().flatten().copied().collect()
    }

    /// Current lifecycle state of the in-memory write buffer: `Empty` if
    /// nothing has been appended since the last seal, `Filling`
    /// otherwise. Never reports `Sealed`/`Linked`, since the buffer
    /// itself is replaced the instant it seals.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned by a prior panic.
    #[must_use]
    pub fn buffer_state(&self) -> NodeState {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let inner = self.inner.lock().expect("lock poisoned");
        if inner.buffer.is_empty() {
            NodeState::Empty
        } else {
            NodeState::Filling
        }
    }

    /// Byte count of not-yet-flushed buffered samples.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned by a prior panic.
    #[must_use]
    pub fn uncommitted_size(&self) -> u64 {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let inner = self.inner.lock().expect("lock poisoned");
        (inner.buffer.len() * std::mem::size_of::<(u64, f64)>()) as u64
    }

    /// Seals all partial levels, flushing them, and returns the final
    /// root set. Idempotent on success: a second call returns the same
    /// list without re-sealing anything.
    ///
    /// # Errors
    ///
    /// [`Status::Io`] if a seal fails partway through. In-memory state is
    /// left exactly as it was (nothing is corrupted or lost), and the
    /// tree is left open so a later `close()` can retry.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned by a prior panic.
    pub fn close(&self) -> Result<Vec<LogicalAddr>, StoreError> {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let mut inner = self.inner.lock().expect("lock poisoned");

        if inner.closed {
            return Ok(inner.levels.iter().flatten().copied().collect());
        }

        if !inner.buffer.is_empty() {
            let sealed = std::mem::take(&mut inner.buffer);
            match self.store.append(encode_leaf(&sealed)) {
                Ok(addr) => {
                    if !self.cascade(&mut inner, addr, 0) {
                        return Err(StoreError::new(Status::Io));
                    }
                }
                Err(err) => {
                    log::error!("append_tree: close failed to seal buffer: {err}");
                    inner.buffer = sealed;
                    return Err(err);
                }
            }
        }

        // Force-seal every partial level so `close` always yields roots
        // that are eligible to collapse further up the chain.
        let mut level = 0;
        while level < inner.levels.len() {
            #[expect(clippy::indexing_slicing, reason = "loop bound is inner.levels.len()")]
            let pending = std::mem::take(&mut inner.levels[level]);
            match pending.len() {
                0 => {}
                1 => {
                    #[expect(clippy::indexing_slicing, reason = "loop bound is inner.levels.len()")]
                    {
                        inner.levels[level] = pending;
                    }
                }
                _ => match self.store.append(encode_inner(&pending)) {
                    Ok(addr) => {
                        if !self.cascade(&mut inner, addr, level + 1) {
                            return Err(StoreError::new(Status::Io));
                        }
                    }
                    Err(err) => {
                        log::error!("append_tree: close failed to seal level {level}: {err}");
                        #[expect(clippy::indexing_slicing, reason = "loop bound is inner.levels.len()")]
                        {
                            inner.levels[level] = pending;
                        }
                        return Err(err);
                    }
                },
            }
            level += 1;
        }

        inner.closed = true;
        Ok(inner.levels.iter().flatten().copied().collect())
    }

    /// Recursively reads every sample reachable from `addr`.
    fn read_subtree(&self, addr: LogicalAddr, out: &mut Vec<(u64, f64)>) -> Result<(), StoreError> {
        let bytes = self.store.read(addr)?;
        match decode_block(&bytes)? {
            DecodedBlock::Leaf(samples) => out.extend(samples),
            DecodedBlock::Inner(children) => {
                for child in children {
                    self.read_subtree(child, out)?;
                }
            }
        }
        Ok(())
    }

    /// Returns samples with timestamps in `[begin, end)`, ascending if
    /// `begin <= end`, descending (reverse scan) if `begin > end`.
    ///
    /// The returned iterator is a snapshot taken at call time: later
    /// appends may or may not become visible to it, but can never
    /// corrupt it, because it owns a fully-materialized copy.
    ///
    /// # Errors
    ///
    /// Propagates [`Status::Io`] / [`Status::NotFound`] from the block
    /// store if a persisted block cannot be read back.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned by a prior panic.
    pub fn search(
        &self,
        begin: u64,
        end: u64,
    ) -> Result<std::vec::IntoIter<(u64, f64)>, StoreError> {
        let (buffer_snapshot, roots) = {
            #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
            let inner = self.inner.lock().expect("lock poisoned");
            (
                inner.buffer.clone(),
                inner.levels.iter().flatten().copied().collect::<Vec<_>>(),
            )
        };

        let mut all = buffer_snapshot;
        for root in roots {
            self.read_subtree(root, &mut all)?;
        }

        let ascending = begin <= end;
        let (lo, hi) = if ascending { (begin, end) } else { (end, begin) };
        all.retain(|(ts, _)| *ts >= lo && *ts < hi);

        if ascending {
            all.sort_by_key(|(ts, _)| *ts);
        } else {
            all.sort_by_key(|(ts, _)| std::cmp::Reverse(*ts));
        }

        Ok(all.into_iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_store::InMemoryBlockStore;
    use test_log::test;

    fn small_tree() -> AppendTree {
        AppendTree::new(
            Arc::new(InMemoryBlockStore::new()),
            AppendTreeConfig {
                leaf_capacity: 4,
                fan_out: 2,
            },
        )
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn round_trip_single_sample() {
        let tree = small_tree();
        tree.force_init();
        tree.append(100, 1.5);

        let got: Vec<_> = tree.search(100, 101).unwrap().collect();
        assert_eq!(got, vec![(100, 1.5)]);
    }

    #[test]
    fn flush_needed_signals_on_leaf_boundary() {
        let tree = small_tree();
        tree.force_init();
        assert_eq!(tree.append(1, 1.0), AppendResult::Ok);
        assert_eq!(tree.append(2, 1.0), AppendResult::Ok);
        assert_eq!(tree.append(3, 1.0), AppendResult::Ok);
        assert_eq!(tree.append(4, 1.0), AppendResult::OkFlushNeeded);
        assert!(tree.get_roots().len() == 1);
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn reverse_scan_orders_descending() {
        let tree = small_tree();
        tree.force_init();
        #[allow(clippy::cast_precision_loss)]
        for ts in 0..10 {
            tree.append(ts, ts as f64);
        }
        let got: Vec<_> = tree.search(9, 0).unwrap().map(|(ts, _)| ts).collect();
        assert_eq!(got, vec![8, 7, 6, 5, 4, 3, 2, 1, 0]);
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn close_is_idempotent_and_recoverable() {
        let store = Arc::new(InMemoryBlockStore::new());
        let tree = AppendTree::new(
            store.clone(),
            AppendTreeConfig {
                leaf_capacity: 4,
                fan_out: 2,
            },
        );
        tree.force_init();
        #[allow(clippy::cast_precision_loss)]
        for ts in 0..10 {
            tree.append(ts, ts as f64 * 2.0);
        }

        let roots1 = tree.close().unwrap();
        let roots2 = tree.close().unwrap();
        assert_eq!(roots1, roots2);

        // Reopen a fresh tree against the same store + roots and confirm
        // the full history is recoverable.
        let reopened = AppendTree::new(store, AppendTreeConfig::default());
        reopened.force_init();
        let mut all = Vec::new();
        for root in roots1 {
            reopened.read_subtree(root, &mut all).unwrap();
        }
        all.sort_by_key(|(ts, _)| *ts);
        #[allow(clippy::cast_precision_loss)]
        let expected: Vec<_> = (0..10).map(|ts| (ts, ts as f64 * 2.0)).collect();
        assert_eq!(all, expected);
    }

    #[test]
    fn non_finite_value_is_rejected() {
        let tree = small_tree();
        tree.force_init();
        assert_eq!(tree.append(1, f64::NAN), AppendResult::FailBadValue);
        assert_eq!(tree.get_roots().len(), 0);
    }

    #[test]
    fn buffer_state_tracks_empty_and_filling() {
        let tree = small_tree();
        tree.force_init();
        assert_eq!(tree.buffer_state(), NodeState::Empty);
        tree.append(1, 1.0);
        assert_eq!(tree.buffer_state(), NodeState::Filling);
    }

    /// A store whose `append` fails once its call count reaches a fixed
    /// threshold; everything before that succeeds via a real
    /// `InMemoryBlockStore`.
    struct FailingAfter {
        inner: InMemoryBlockStore,
        calls: std::sync::atomic::AtomicUsize,
        fail_at: usize,
    }

    impl crate::block_store::BlockStore for FailingAfter {
        fn read(&self, addr: LogicalAddr) -> Result<Vec<u8>, StoreError> {
            self.inner.read(addr)
        }

        fn append(&self, block: Vec<u8>) -> Result<LogicalAddr, StoreError> {
            let call = self
                .calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if call >= self.fail_at {
                return Err(StoreError::new(Status::Io));
            }
            self.inner.append(block)
        }

        fn sync(&self) -> Result<(), StoreError> {
            self.inner.sync()
        }
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn close_reports_failure_and_stays_open_for_retry() {
        let store = Arc::new(FailingAfter {
            inner: InMemoryBlockStore::new(),
            calls: std::sync::atomic::AtomicUsize::new(0),
            fail_at: 0,
        });
        let tree = AppendTree::new(
            store,
            AppendTreeConfig {
                leaf_capacity: 4,
                fan_out: 2,
            },
        );
        tree.force_init();
        tree.append(1, 1.0);

        let err = tree.close().unwrap_err();
        assert_eq!(err.status, Status::Io);
        // Nothing was lost: the buffered sample is still there to retry.
        assert_eq!(tree.uncommitted_size(), std::mem::size_of::<(u64, f64)>() as u64);
    }
}
