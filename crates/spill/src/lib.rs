//! # Spill - run building
//!
//! Accumulates incoming items in memory and, whenever their estimated size
//! reaches the configured threshold, sorts them and writes them out as a new
//! immutable run file through the frame writer.
//!
//! ```text
//! offer(item) ──► buffer += item, bytes += size_of(item)
//!                    │
//!                    └─ bytes >= threshold ──► sort ─► {dir}/{id}-{tag}-{seq:06}.sort
//!                                                       (new file-backed Run)
//! finish() ──► no spill so far:  [Memory(sorted buffer)]
//!              otherwise:        spill remainder, [File, File, ...]
//! ```
//!
//! Every builder draws a random `tag` for its file names, so concurrent sorts
//! sharing an id and a directory do not collide. A name that is taken anyway
//! (a leftover from a crashed process) is skipped for the next sequence
//! number; existing files are never overwritten.
//!
//! Run files belong to the builder until [`RunBuilder::finish`] hands them
//! over. A builder dropped before that deletes every file it wrote.

mod fs;

use std::fmt;
use std::io::{self, Write};
use std::mem;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use config::SortConfig;
use frame::{FrameWriter, Serializer};
use ordering::{sort_by, Compare};
use stream::StreamError;
use tracing::debug;

pub use fs::{remove_quietly, LocalFs, SpillFs};

/// Taken file names skipped before a spill gives up.
const CREATE_ATTEMPTS: u32 = 64;

/// Caller-supplied size estimate of one item, in bytes.
pub type SizeOf<T> = Rc<dyn Fn(&T) -> usize>;

/// A spilled run on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRun {
    pub path: PathBuf,
    /// Sequence number the file name was derived from.
    pub seq: u64,
    pub items: u64,
    /// File size, frame headers included.
    pub bytes: u64,
}

/// A sorted sequence of items ready to be merged.
#[derive(Debug)]
pub enum Run<T> {
    Memory(Vec<T>),
    File(FileRun),
}

impl<T> Run<T> {
    #[must_use]
    pub fn len(&self) -> u64 {
        match self {
            Run::Memory(items) => items.len() as u64,
            Run::File(f) => f.items,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Run::Memory(_) => None,
            Run::File(f) => Some(&f.path),
        }
    }
}

pub struct RunBuilder<T> {
    config: SortConfig,
    fs: Rc<dyn SpillFs>,
    ordering: Rc<dyn Compare<T>>,
    serializer: Rc<dyn Serializer<T>>,
    size_of: SizeOf<T>,
    buffer: Vec<T>,
    buffered_bytes: usize,
    /// Runs written so far and still owned by this builder.
    spilled: Vec<FileRun>,
    tag: u32,
    next_seq: u64,
    offered: u64,
}

impl<T> RunBuilder<T> {
    pub fn new(
        config: SortConfig,
        fs: Rc<dyn SpillFs>,
        ordering: Rc<dyn Compare<T>>,
        serializer: Rc<dyn Serializer<T>>,
        size_of: SizeOf<T>,
    ) -> Self {
        Self {
            config,
            fs,
            ordering,
            serializer,
            size_of,
            buffer: Vec::new(),
            buffered_bytes: 0,
            spilled: Vec::new(),
            tag: rand::random(),
            next_seq: 1,
            offered: 0,
        }
    }

    /// Adds `item` to the open run, spilling it if the size estimate reaches
    /// the threshold.
    ///
    /// # Errors
    ///
    /// - [`StreamError::Comparison`] if the ordering rejects the item.
    /// - [`StreamError::Io`] / [`StreamError::Serialization`] from a spill.
    pub fn offer(&mut self, item: T) -> Result<(), StreamError> {
        self.ordering
            .admit(&item)
            .map_err(|e| StreamError::Comparison(Box::new(e)))?;

        self.buffered_bytes = self.buffered_bytes.saturating_add((self.size_of)(&item));
        self.buffer.push(item);
        self.offered += 1;

        if self.buffered_bytes >= self.config.spill_threshold {
            self.spill()?;
        }
        Ok(())
    }

    /// Closes the builder and returns the runs to merge.
    ///
    /// With no spill so far this is the fast path: the buffer is sorted in
    /// place and returned as a single in-memory run, without file I/O.
    /// Otherwise the remaining items are spilled as a final run and every
    /// file run is returned, in creation order.
    pub fn finish(mut self) -> Result<Vec<Run<T>>, StreamError> {
        if self.spilled.is_empty() {
            let mut items = mem::take(&mut self.buffer);
            sort_by(&mut items, &*self.ordering)
                .map_err(|e| StreamError::Comparison(Box::new(e)))?;
            debug!(items = items.len(), "sort fits in memory, no spill");
            return Ok(vec![Run::Memory(items)]);
        }

        if !self.buffer.is_empty() {
            self.spill()?;
        }
        let runs = mem::take(&mut self.spilled);
        debug!(runs = runs.len(), items = self.offered, "runs handed to merge");
        Ok(runs.into_iter().map(Run::File).collect())
    }

    /// Number of run files written so far.
    #[must_use]
    pub fn spill_count(&self) -> u64 {
        self.spilled.len() as u64
    }

    /// Number of items offered so far.
    #[must_use]
    pub fn offered(&self) -> u64 {
        self.offered
    }

    /// Size estimate of the open run.
    #[must_use]
    pub fn buffered_bytes(&self) -> usize {
        self.buffered_bytes
    }

    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Random tag in this builder's file names.
    #[must_use]
    pub fn tag(&self) -> u32 {
        self.tag
    }

    /// Sorts the buffer and writes it to a new run file.
    ///
    /// On failure the partially written file is removed and the buffer is
    /// kept as it was.
    fn spill(&mut self) -> Result<(), StreamError> {
        sort_by(&mut self.buffer, &*self.ordering)
            .map_err(|e| StreamError::Comparison(Box::new(e)))?;

        let (seq, path, sink) = self.create_run_file()?;
        let (items, bytes) = match write_run(sink, &self.serializer, &self.buffer) {
            Ok(counts) => counts,
            Err(e) => {
                remove_quietly(&*self.fs, &path);
                return Err(e);
            }
        };

        debug!(
            path = %path.display(),
            items,
            bytes,
            estimated = self.buffered_bytes,
            "spilled run"
        );
        self.spilled.push(FileRun {
            path,
            seq,
            items,
            bytes,
        });
        self.buffer.clear();
        self.buffered_bytes = 0;
        Ok(())
    }

    /// Creates the next free run file, skipping names that already exist.
    fn create_run_file(&mut self) -> Result<(u64, PathBuf, Box<dyn Write>), StreamError> {
        for _ in 0..CREATE_ATTEMPTS {
            let seq = self.next_seq;
            self.next_seq += 1;
            let path = self.config.run_path(self.tag, seq);
            match self.fs.create(&path) {
                Ok(sink) => return Ok((seq, path, sink)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(path = %path.display(), "spill file name taken, skipping");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(StreamError::Io(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!(
                "no free spill file name in {} after {CREATE_ATTEMPTS} attempts",
                self.config.temp_dir.display()
            ),
        )))
    }

    fn cleanup(&mut self) {
        for run in self.spilled.drain(..) {
            remove_quietly(&*self.fs, &run.path);
        }
    }
}

fn write_run<T>(
    sink: Box<dyn Write>,
    serializer: &Rc<dyn Serializer<T>>,
    items: &[T],
) -> Result<(u64, u64), StreamError> {
    let mut writer = FrameWriter::new(sink, Rc::clone(serializer));
    for item in items {
        writer.write(item)?;
    }
    let counts = (writer.frames(), writer.bytes());
    writer.end()?;
    Ok(counts)
}

impl<T> Drop for RunBuilder<T> {
    fn drop(&mut self) {
        self.cleanup();
    }
}

impl<T> fmt::Debug for RunBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunBuilder")
            .field("temp_dir", &self.config.temp_dir)
            .field("spill_threshold", &self.config.spill_threshold)
            .field("buffered_len", &self.buffer.len())
            .field("buffered_bytes", &self.buffered_bytes)
            .field("tag", &format_args!("{:08x}", self.tag))
            .field("spilled", &self.spilled.len())
            .field("offered", &self.offered)
            .finish()
    }
}

#[cfg(test)]
mod tests;
