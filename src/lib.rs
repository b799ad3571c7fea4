// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The column-store facade of a time-series database: a concurrency-safe
//! registry that maps per-series identifiers to persistent append-only
//! tree structures, routes writes into them, and composes point
//! iterators into row-oriented query streams.
//!
//! ##### NOTE
//!
//! > This crate is the registry/iterator facade, not a full storage
//! > engine. The physical block/page store, the query parser, and the
//! > series-name-to-id metadata registry are external collaborators
//! > whose contracts are defined but not implemented here.
//!
//! ##### About
//!
//! Three pieces do the real work:
//!
//! - [`append_tree`]: one multi-level, copy-on-write-ish tree per series,
//!   buffering samples in memory and flushing them into block-sized
//!   leaves whose topmost addresses ("roots") are a crash-recovery set.
//! - [`registry`]: owns every series' tree behind a single table lock,
//!   routes writes, and drives queries.
//! - [`row_iter`] + [`query`]: compose per-series range iterators into a
//!   single ordered row stream, back-pressured against a consumer.
//!
//! # Example usage
//!
//! ```
//! use param_column_store::{
//!     block_store::InMemoryBlockStore,
//!     query::{GroupBy, OrderBy, ReshapeRequest, Select, VecConsumer},
//!     registry::ColumnStore,
//!     sample::{ParamId, Sample},
//! };
//! use std::sync::Arc;
//!
//! let registry = ColumnStore::new(Arc::new(InMemoryBlockStore::new()));
//! registry.create_new_column(ParamId(10)).unwrap();
//!
//! let mut rescue_points = Vec::new();
//! registry.write(Sample::float(ParamId(10), 100, 1.5), &mut rescue_points, None);
//!
//! let mut consumer = VecConsumer::default();
//! registry.query(
//!     &ReshapeRequest {
//!         select: Select { ids: vec![ParamId(10)], begin: 0, end: 1000 },
//!         order_by: OrderBy::Series,
//!         group_by: GroupBy::default(),
//!     },
//!     &mut consumer,
//! );
//! assert_eq!(consumer.rows, vec![(ParamId(10), 100, 1.5)]);
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::indexing_slicing)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]

pub mod append_tree;
pub mod block_store;
pub mod config;
pub mod error;
pub mod query;
pub mod registry;
pub mod row_iter;
pub mod sample;
pub mod session;

pub use config::StoreConfig;
pub use error::{Result, Status, StoreError};
pub use registry::ColumnStore;
pub use sample::{LogicalAddr, ParamId, PayloadType, Sample};
pub use session::WriterSession;
