// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Row iterator composition: chains several per-series sample
//! iterators into one `(id, ts, value)` stream.
//!
//! Grounded on the teacher's [`MultiReader`]-style chaining
//! (`src/multi_reader.rs`): drain the front reader until it has nothing
//! left, then move on to the next one. The only generalization needed
//! here is tagging every emitted item with which series it came from.

use crate::error::{Status, StoreError};
use crate::sample::ParamId;
use std::collections::VecDeque;

/// Status returned by [`RowIterator::read`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReadStatus {
    /// Filled to capacity, or made a partial read the caller should
    /// continue.
    Ok,
    /// All inner iterators are drained.
    NoData,
}

type SeriesIter<'a> = Box<dyn Iterator<Item = (u64, f64)> + 'a>;

/// One inner iterator paired with the series id it belongs to.
struct Source<'a> {
    id: ParamId,
    iter: SeriesIter<'a>,
}

/// Tagged variant over the row iterator's supported compositions,
/// rather than open polymorphism over a trait object.
pub enum RowIterator<'a> {
    /// Order-by-series: emits all samples of source 0, then source 1,
    /// etc., in the order the sources were supplied.
    Chain(Chain<'a>),
    /// Order-by-time is not implemented in this core; this
    /// variant carries no state and `read` always fails with
    /// `NotImplemented`.
    TimeMerge,
}

impl<'a> RowIterator<'a> {
    /// Builds the order-by-series composition.
    #[must_use]
    pub fn chain(sources: Vec<(ParamId, SeriesIter<'a>)>) -> Self {
        Self::Chain(Chain {
            sources: sources
                .into_iter()
                .map(|(id, iter)| Source { id, iter })
                .collect(),
        })
    }

    /// Writes up to `dest.capacity()` `(id, ts, value)` triples into
    /// `dest`, returning how the read ended and how many were written.
    ///
    /// Never buffers beyond `dest`'s capacity.
    ///
    /// # Errors
    ///
    /// Returns [`Status::NotImplemented`] immediately for the
    /// [`RowIterator::TimeMerge`] variant.
    pub fn read(
        &mut self,
        dest: &mut Vec<(ParamId, u64, f64)>,
        capacity: usize,
    ) -> Result<(ReadStatus, usize), StoreError> {
        match self {
            Self::Chain(chain) => Ok(chain.read(dest, capacity)),
            Self::TimeMerge => Err(StoreError::new(Status::NotImplemented)),
        }
    }
}

/// Order-by-series composition: consumes inner iterators front-to-back,
/// advancing past an exhausted one (grounded on
/// `src/multi_reader.rs`'s `MultiReader`).
pub struct Chain<'a> {
    sources: VecDeque<Source<'a>>,
}

impl Chain<'_> {
    fn read(&mut self, dest: &mut Vec<(ParamId, u64, f64)>, capacity: usize) -> (ReadStatus, usize) {
        let mut written = 0;

        while written < capacity {
            let Some(front) = self.sources.front_mut() else {
                return (ReadStatus::NoData, written);
            };

            match front.iter.next() {
                Some((ts, value)) => {
                    dest.push((front.id, ts, value));
                    written += 1;
                }
                None => {
                    self.sources.pop_front();
                }
            }
        }

        (ReadStatus::Ok, written)
    }
}
