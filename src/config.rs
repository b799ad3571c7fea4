// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Ambient configuration knobs, required to make the append tree's
//! flush policy and the query driver's batch size concrete.
//!
//! Grounded on the small-policy-struct-with-`Default` shape of
//! `src/config/mod.rs` in the teacher crate, scaled down to the handful
//! of knobs this core actually needs.

pub use crate::append_tree::AppendTreeConfig;
use crate::registry::DEFAULT_QUERY_BATCH_SIZE;

/// Top-level tuning for a [`crate::registry::ColumnStore`].
#[derive(Copy, Clone, Debug)]
pub struct StoreConfig {
    /// Per-series append tree flush/fan-out policy.
    pub tree: AppendTreeConfig,
    /// Samples read per batch by the query driver.
    pub query_batch_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            tree: AppendTreeConfig::default(),
            query_batch_size: DEFAULT_QUERY_BATCH_SIZE,
        }
    }
}
