//! # Engine - external sorting stream
//!
//! [`SortingStream`] ties the [`spill`] and [`merge`] crates together into a
//! sort of an unbounded stream under a fixed memory budget.
//!
//! ## Architecture
//!
//! ```text
//! input ReadStream
//!   |
//!   v
//! ┌─────────────────────────────────────────────────┐
//! │                 SORTING STREAM                  │
//! │                                                 │
//! │ collect.rs → pull batch → RunBuilder::offer     │
//! │              |                                  │
//! │              |  (estimated size >= threshold?)  │
//! │              |            yes                   │
//! │              v                                  │
//! │           spill → sorted run file               │
//! │                                                 │
//! │ input ends → RunBuilder::finish → runs          │
//! │                                                 │
//! │ output.rs → MergeEngine over runs → consumer    │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module        | Purpose                                                  |
//! |---------------|----------------------------------------------------------|
//! | `lib.rs`      | `SortingStream` struct, constructors, accessors, `Debug` |
//! | [`codec`]     | serializer / deserializer / size estimate bundle         |
//! | [`collect`]   | input phase: batching, run building, hand-off to merge   |
//! | [`output`]    | `ReadStream` implementation over both phases             |
//!
//! ## Phases
//!
//! ```text
//! Collecting ──(input end)──► Merging ──► Ended
//!      │                         │
//!      └──────(any error)────────┴──────► Failed
//! ```
//!
//! Nothing is read from the input until the consumer asks for output. Spill
//! files are deleted when the merge ends or fails, and when a `SortingStream`
//! is dropped or closed before that.
//!
//! ## Example
//!
//! ```rust
//! use std::rc::Rc;
//! use config::SortConfig;
//! use engine::{Codec, SortingStream};
//! use ordering::Natural;
//! use stream::{BoxError, VecReadStream};
//!
//! let codec = Codec::new(
//!     |v: &u64, out: &mut Vec<u8>| -> Result<(), BoxError> {
//!         out.extend_from_slice(&v.to_be_bytes());
//!         Ok(())
//!     },
//!     |b: &[u8]| -> Result<u64, BoxError> { Ok(u64::from_be_bytes(b.try_into()?)) },
//!     |_: &u64| 8,
//! );
//! let dir = std::env::temp_dir().join("engine-doc-example");
//! let config = SortConfig::new(&dir, "doc").with_spill_threshold(16);
//!
//! let input = VecReadStream::new(vec![5u64, 3, 8, 1]);
//! let mut sort = SortingStream::new(input, Rc::new(Natural), codec, config).unwrap();
//! assert_eq!(sort.drain().unwrap(), vec![1, 3, 5, 8]);
//! ```

mod codec;
mod collect;
mod output;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use config::{ConfigError, SortConfig};
use merge::MergeEngine;
use ordering::{Compare, FieldOrdering, FieldSource, FieldSpec};
use spill::{LocalFs, RunBuilder, SpillFs};
use stream::{DemandHandle, Handlers, Outlet, ReadStream};

pub use codec::Codec;

use collect::{Collector, InputInbox};

/// Number of input items requested at a time while collecting.
pub const INPUT_BATCH: u64 = 256;

/// Coarse lifecycle of a sort, for callers and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortPhase {
    /// Reading input and building runs.
    Collecting,
    /// Merging runs into the output.
    Merging,
    /// The end event has been delivered.
    Ended,
    /// The error event has been delivered.
    Failed,
    /// Torn down by [`SortingStream::close`] without a terminal event.
    Closed,
}

/// Counters describing a sort so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SortStats {
    /// Items taken from the input.
    pub items_in: u64,
    /// Run files written.
    pub spills: u64,
    /// Runs handed to the merge.
    pub runs: usize,
}

pub(crate) enum Phase<T> {
    Collecting(Box<Collector<T>>),
    Merging(MergeEngine<T>),
    Failed,
    Closed,
}

/// A [`ReadStream`] producing the items of an input stream in sorted order.
pub struct SortingStream<T> {
    pub(crate) phase: Phase<T>,
    /// Output outlet while collecting. Handed to the merge engine on
    /// transition.
    pub(crate) outlet: Option<Outlet<T>>,
    /// Output demand, shared by the outlet wherever it lives.
    pub(crate) demand: DemandHandle,
    pub(crate) ordering: Rc<dyn Compare<T>>,
    pub(crate) codec: Codec<T>,
    pub(crate) fs: Rc<dyn SpillFs>,
    pub(crate) config: SortConfig,
    pub(crate) stats: SortStats,
}

impl<T: 'static> SortingStream<T> {
    /// Creates a sort of `input` spilling to the local filesystem.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid or its temp dir cannot be
    /// created.
    pub fn new<S>(
        input: S,
        ordering: Rc<dyn Compare<T>>,
        codec: Codec<T>,
        config: SortConfig,
    ) -> Result<Self, ConfigError>
    where
        S: ReadStream<T> + 'static,
    {
        Self::with_fs(input, ordering, codec, config, Rc::new(LocalFs))
    }

    /// Same as [`new`](Self::new) with an injected filesystem.
    pub fn with_fs<S>(
        input: S,
        ordering: Rc<dyn Compare<T>>,
        codec: Codec<T>,
        config: SortConfig,
        fs: Rc<dyn SpillFs>,
    ) -> Result<Self, ConfigError>
    where
        S: ReadStream<T> + 'static,
    {
        config.validate()?;
        fs.ensure_dir(&config.temp_dir)
            .map_err(|source| ConfigError::Io {
                path: config.temp_dir.clone(),
                source,
            })?;

        let mut input: Box<dyn ReadStream<T>> = Box::new(input);
        let inbox = Rc::new(RefCell::new(InputInbox::default()));
        let on_data = Rc::clone(&inbox);
        let on_end = Rc::clone(&inbox);
        let on_error = Rc::clone(&inbox);
        input.set_handlers(
            Handlers::new(move |item| on_data.borrow_mut().items.push_back(item))
                .on_end(move || on_end.borrow_mut().ended = true)
                .on_error(move |e| on_error.borrow_mut().error = Some(e)),
        );

        let builder = RunBuilder::new(
            config.clone(),
            Rc::clone(&fs),
            Rc::clone(&ordering),
            Rc::clone(&codec.serializer),
            Rc::clone(&codec.size_of),
        );

        let demand = DemandHandle::new();
        Ok(Self {
            phase: Phase::Collecting(Box::new(Collector {
                input,
                inbox,
                builder,
            })),
            outlet: Some(Outlet::with_demand(demand.clone())),
            demand,
            ordering,
            codec,
            fs,
            config,
            stats: SortStats::default(),
        })
    }

    /// Creates a sort ordered by a list of field specs.
    pub fn by_fields<S>(
        input: S,
        specs: Vec<FieldSpec>,
        codec: Codec<T>,
        config: SortConfig,
    ) -> Result<Self, ConfigError>
    where
        S: ReadStream<T> + 'static,
        T: FieldSource,
    {
        Self::new(input, Rc::new(FieldOrdering::new(specs)), codec, config)
    }
}

impl<T> SortingStream<T> {
    #[must_use]
    pub fn phase(&self) -> SortPhase {
        match &self.phase {
            Phase::Collecting(_) => SortPhase::Collecting,
            Phase::Merging(m) => match m.state() {
                merge::MergeState::Ended => SortPhase::Ended,
                merge::MergeState::Errored => SortPhase::Failed,
                _ => SortPhase::Merging,
            },
            Phase::Failed => SortPhase::Failed,
            Phase::Closed => SortPhase::Closed,
        }
    }

    #[must_use]
    pub fn stats(&self) -> SortStats {
        self.stats
    }

    /// Items taken from the input so far.
    #[must_use]
    pub fn items_in(&self) -> u64 {
        self.stats.items_in
    }

    /// Run files written so far.
    #[must_use]
    pub fn spill_count(&self) -> u64 {
        match &self.phase {
            Phase::Collecting(c) => c.builder.spill_count(),
            _ => self.stats.spills,
        }
    }

    /// Items emitted to the consumer so far.
    #[must_use]
    pub fn emitted(&self) -> u64 {
        match (&self.phase, &self.outlet) {
            (Phase::Merging(m), _) => m.emitted(),
            (_, Some(o)) => o.emitted(),
            _ => 0,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SortConfig {
        &self.config
    }

    /// Tears the sort down without delivering any further event. Every spill
    /// file is deleted. Use this to abandon a sort that will not be driven
    /// to its end.
    pub fn close(&mut self) {
        self.phase = Phase::Closed;
        self.outlet = None;
    }
}

impl<T> fmt::Debug for SortingStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortingStream")
            .field("phase", &self.phase())
            .field("items_in", &self.stats.items_in)
            .field("spills", &self.spill_count())
            .field("runs", &self.stats.runs)
            .field("spill_threshold", &self.config.spill_threshold)
            .field("temp_dir", &self.config.temp_dir)
            .field("operation_id", &self.config.operation_id)
            .finish()
    }
}

#[cfg(test)]
mod tests;
