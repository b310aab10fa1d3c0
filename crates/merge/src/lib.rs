//! # Merge - k-way merge of sorted runs
//!
//! [`MergeEngine`] turns the runs produced by the run builder (an in-memory
//! run and/or spill files) into one ordered [`ReadStream`].
//!
//! ```text
//!   Run 0 (memory) ──► MergeSource 0 [read-ahead] ──┐
//!   Run 1 (file)   ──► MergeSource 1 [read-ahead] ──┼──► select min ──► outlet
//!   Run 2 (file)   ──► MergeSource 2 [read-ahead] ──┘
//! ```
//!
//! Each step makes sure every live source has a head item buffered, picks
//! the smallest head (ties go to the lower source index), and emits it. The
//! engine only reads ahead `read_ahead` items per source, and only while
//! downstream demand is outstanding.
//!
//! ## States
//!
//! ```text
//! Idle ─► Filling ─► Selecting ─► Emitting ─► Filling | Draining ─► Ended
//!              └──────────── any error ───────────────────────────► Errored
//! ```
//!
//! `Ended` and `Errored` are terminal. On entry to either, every source is
//! closed and every spill file the engine owns is deleted (best-effort)
//! before the terminal event is delivered.

mod source;

use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;

use config::{SortConfig, DEFAULT_READ_AHEAD, DEFAULT_READ_CHUNK};
use frame::{Deserializer, FrameReader};
use ordering::{Compare, CompareError};
use spill::{remove_quietly, Run, SpillFs};
use stream::{DemandHandle, Handlers, Outlet, ReadStream, StreamError, VecReadStream};
use tracing::debug;

use source::{FillStatus, MergeSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeState {
    /// Constructed; no run opened yet.
    Idle,
    /// Topping up empty sources.
    Filling,
    /// Comparing head items.
    Selecting,
    /// Handing the winner downstream.
    Emitting,
    /// Every run has been read to its end; only buffered items remain.
    Draining,
    Ended,
    Errored,
}

impl MergeState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, MergeState::Ended | MergeState::Errored)
    }
}

pub struct MergeEngine<T> {
    state: MergeState,
    /// Runs not opened yet. They are opened on the first drive.
    runs: Vec<Run<T>>,
    sources: Vec<MergeSource<T>>,
    ordering: Rc<dyn Compare<T>>,
    deserializer: Rc<dyn Deserializer<T>>,
    fs: Rc<dyn SpillFs>,
    read_ahead: usize,
    read_chunk: usize,
    /// Spill files this engine deletes on completion, failure or drop.
    owned: Vec<PathBuf>,
    outlet: Outlet<T>,
}

impl<T: 'static> MergeEngine<T> {
    /// Takes ownership of `runs`, including their files.
    pub fn new(
        runs: Vec<Run<T>>,
        ordering: Rc<dyn Compare<T>>,
        deserializer: Rc<dyn Deserializer<T>>,
        fs: Rc<dyn SpillFs>,
    ) -> Self {
        let owned = runs
            .iter()
            .filter_map(|r| r.path().map(|p| p.to_path_buf()))
            .collect();
        Self {
            state: MergeState::Idle,
            runs,
            sources: Vec::new(),
            ordering,
            deserializer,
            fs,
            read_ahead: DEFAULT_READ_AHEAD,
            read_chunk: DEFAULT_READ_CHUNK,
            owned,
            outlet: Outlet::new(),
        }
    }

    /// Items each source buffers ahead (at least 1).
    pub fn with_read_ahead(mut self, items: usize) -> Self {
        self.read_ahead = items.max(1);
        self
    }

    /// Bytes requested per spill-file read (at least 1).
    pub fn with_read_chunk(mut self, bytes: usize) -> Self {
        self.read_chunk = bytes.max(1);
        self
    }

    /// Applies the read-ahead and read-chunk settings of `config`.
    pub fn with_config(self, config: &SortConfig) -> Self {
        self.with_read_ahead(config.read_ahead)
            .with_read_chunk(config.read_chunk_bytes)
    }

    /// Emits through an existing outlet, keeping its handlers and demand.
    pub fn with_outlet(mut self, outlet: Outlet<T>) -> Self {
        self.outlet = outlet;
        self
    }

    fn open_sources(&mut self) -> Result<(), StreamError> {
        let runs = std::mem::take(&mut self.runs);
        let mut files = 0;
        for (index, run) in runs.into_iter().enumerate() {
            let stream: Box<dyn ReadStream<T>> = match run {
                Run::Memory(items) => Box::new(VecReadStream::new(items)),
                Run::File(f) => {
                    files += 1;
                    let src = self.fs.open(&f.path)?;
                    Box::new(
                        FrameReader::new(src, Rc::clone(&self.deserializer))
                            .with_chunk_size(self.read_chunk),
                    )
                }
            };
            self.sources.push(MergeSource::new(index, stream));
        }
        debug!(
            sources = self.sources.len(),
            files,
            read_ahead = self.read_ahead,
            "merge started"
        );
        Ok(())
    }

    /// Fills every empty live source. Returns `Ok(false)` while any of them
    /// is still waiting on its stream.
    fn fill_sources(&mut self) -> Result<bool, StreamError> {
        let mut ready = true;
        for source in &mut self.sources {
            if source.buffered() == 0
                && !source.is_done()
                && source.fill(self.read_ahead) == FillStatus::Pending
            {
                ready = false;
            }
            if let Some(err) = source.take_error() {
                return Err(err);
            }
        }
        Ok(ready)
    }

    /// Drops sources that are done. Returns `true` (after ending the
    /// merge) once none are left.
    fn retire_finished(&mut self) -> bool {
        self.sources.retain(|s| !s.is_done());
        if self.sources.is_empty() {
            self.finish();
            return true;
        }
        false
    }

    /// Index into `sources` of the smallest head item. Ties keep the
    /// earlier source.
    fn select(&self) -> Result<Option<usize>, CompareError> {
        let inboxes: Vec<_> = self.sources.iter().map(|s| s.inbox.borrow()).collect();
        let mut best: Option<usize> = None;
        for (i, inbox) in inboxes.iter().enumerate() {
            let Some(head) = inbox.items.front() else {
                continue;
            };
            match best.and_then(|b| inboxes[b].items.front()) {
                None => best = Some(i),
                Some(current) => {
                    if self.ordering.compare(head, current)? == std::cmp::Ordering::Less {
                        best = Some(i);
                    }
                }
            }
        }
        Ok(best)
    }

    /// One merge step. Returns `Ok(false)` when the engine has to wait for
    /// demand or I/O, or has reached a terminal state.
    fn step(&mut self) -> Result<bool, StreamError> {
        if self.retire_finished() || !self.outlet.ready() {
            return Ok(false);
        }

        self.state = MergeState::Filling;
        if !self.fill_sources()? {
            return Ok(false);
        }
        if self.retire_finished() {
            return Ok(false);
        }
        if self.sources.iter().all(MergeSource::is_exhausted) {
            self.state = MergeState::Draining;
        }
        if !self.outlet.ready() {
            return Ok(false);
        }

        self.state = MergeState::Selecting;
        let winner = self
            .select()
            .map_err(|e| StreamError::Comparison(Box::new(e)))?;
        let Some(winner) = winner else {
            return Ok(true);
        };

        self.state = MergeState::Emitting;
        if let Some(item) = self.sources[winner].pop() {
            self.outlet.emit(item);
        }
        Ok(true)
    }
}

impl<T> MergeEngine<T> {
    #[must_use]
    pub fn state(&self) -> MergeState {
        self.state
    }

    /// Number of items emitted so far.
    #[must_use]
    pub fn emitted(&self) -> u64 {
        self.outlet.emitted()
    }

    /// Sources still taking part in the merge.
    #[must_use]
    pub fn live_sources(&self) -> usize {
        self.sources.len()
    }

    /// Items currently held in read-ahead buffers, across all sources.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.sources.iter().map(MergeSource::buffered).sum()
    }

    /// Fills issued so far, across all sources.
    #[must_use]
    pub fn fills_started(&self) -> u64 {
        self.sources.iter().map(MergeSource::fills_started).sum()
    }

    /// `true` while at least one source is waiting on its stream.
    #[must_use]
    pub fn fill_in_flight(&self) -> bool {
        self.sources.iter().any(MergeSource::fill_in_flight)
    }

    fn release(&mut self) {
        self.sources.clear();
        self.runs.clear();
        for path in self.owned.drain(..) {
            remove_quietly(&*self.fs, &path);
        }
    }

    fn finish(&mut self) {
        self.state = MergeState::Ended;
        self.release();
        debug!(emitted = self.outlet.emitted(), "merge finished");
        self.outlet.end();
    }

    fn abort(&mut self, err: StreamError) {
        self.state = MergeState::Errored;
        self.release();
        debug!(error = &err as &dyn std::error::Error, "merge aborted");
        self.outlet.fail(err);
    }
}

impl<T: 'static> ReadStream<T> for MergeEngine<T> {
    fn set_handlers(&mut self, handlers: Handlers<T>) {
        self.outlet.set_handlers(handlers);
    }

    fn demand(&self) -> DemandHandle {
        self.outlet.demand()
    }

    fn drive(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        if self.state == MergeState::Idle {
            if let Err(e) = self.open_sources() {
                self.abort(e);
                return;
            }
        }
        loop {
            match self.step() {
                Ok(true) => {}
                Ok(false) => return,
                Err(e) => {
                    self.abort(e);
                    return;
                }
            }
        }
    }

    fn is_terminated(&self) -> bool {
        self.state.is_terminal()
    }
}

impl<T> Drop for MergeEngine<T> {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            self.release();
        }
    }
}

impl<T> fmt::Debug for MergeEngine<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeEngine")
            .field("state", &self.state)
            .field("live_sources", &self.sources.len())
            .field("read_ahead", &self.read_ahead)
            .field("owned_files", &self.owned.len())
            .field("emitted", &self.outlet.emitted())
            .finish()
    }
}
