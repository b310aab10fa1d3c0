//! # Config - sort configuration
//!
//! Everything a sort needs to know about its environment: how much memory
//! it may buffer before spilling, where spill files go, how they are named
//! and how far each merge source reads ahead.
//!
//! ## Environment variables
//!
//! ```text
//! SORT_SPILL_KB       Spill threshold in KiB          (default: 4096 = 4 MiB)
//! SORT_TEMP_DIR       Directory for spill files       (default: system temp dir)
//! SORT_ID             Operation id, file-name prefix  (default: "sort")
//! SORT_READ_AHEAD     Items buffered per merge source (default: 10)
//! SORT_READ_CHUNK_KB  Bytes per spill-file read, KiB  (default: 8)
//! ```
//!
//! Missing variables fall back to the defaults; unparsable ones do too,
//! with a warning.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

/// Default spill threshold: 4 MiB of estimated item size.
pub const DEFAULT_SPILL_THRESHOLD: usize = 1 << 22;

/// Default number of items each merge source buffers ahead.
pub const DEFAULT_READ_AHEAD: usize = 10;

/// Default number of bytes requested per spill-file read.
pub const DEFAULT_READ_CHUNK: usize = 8 * 1024;

/// Default operation id.
pub const DEFAULT_OPERATION_ID: &str = "sort";

/// Extension of spill files.
pub const SPILL_EXTENSION: &str = "sort";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("spill threshold must be greater than zero")]
    ZeroThreshold,

    #[error("read-ahead must be at least one item")]
    ZeroReadAhead,

    #[error("read chunk size must be greater than zero")]
    ZeroChunk,

    #[error("operation id must not be empty")]
    EmptyId,

    #[error("cannot prepare temp dir {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortConfig {
    /// Estimated bytes buffered before the current run is spilled.
    pub spill_threshold: usize,
    /// Directory spill files are created in.
    pub temp_dir: PathBuf,
    /// Caller-supplied id; its sanitized form prefixes every spill file.
    pub operation_id: String,
    /// Items each merge source keeps buffered.
    pub read_ahead: usize,
    /// Bytes asked of a spill file per read.
    pub read_chunk_bytes: usize,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            spill_threshold: DEFAULT_SPILL_THRESHOLD,
            temp_dir: std::env::temp_dir(),
            operation_id: DEFAULT_OPERATION_ID.to_string(),
            read_ahead: DEFAULT_READ_AHEAD,
            read_chunk_bytes: DEFAULT_READ_CHUNK,
        }
    }
}

impl SortConfig {
    pub fn new(temp_dir: impl Into<PathBuf>, operation_id: impl Into<String>) -> Self {
        Self {
            temp_dir: temp_dir.into(),
            operation_id: operation_id.into(),
            ..Self::default()
        }
    }

    pub fn with_spill_threshold(mut self, bytes: usize) -> Self {
        self.spill_threshold = bytes;
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    pub fn with_operation_id(mut self, id: impl Into<String>) -> Self {
        self.operation_id = id.into();
        self
    }

    pub fn with_read_ahead(mut self, items: usize) -> Self {
        self.read_ahead = items;
        self
    }

    pub fn with_read_chunk_bytes(mut self, bytes: usize) -> Self {
        self.read_chunk_bytes = bytes;
        self
    }

    /// Reads the `SORT_*` environment variables over the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable
    /// source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(kb) = parse_var::<usize, _>(&lookup, "SORT_SPILL_KB") {
            cfg.spill_threshold = kb.saturating_mul(1024);
        }
        if let Some(dir) = lookup("SORT_TEMP_DIR").filter(|d| !d.is_empty()) {
            cfg.temp_dir = PathBuf::from(dir);
        }
        if let Some(id) = lookup("SORT_ID").filter(|id| !id.is_empty()) {
            cfg.operation_id = id;
        }
        if let Some(n) = parse_var::<usize, _>(&lookup, "SORT_READ_AHEAD") {
            cfg.read_ahead = n;
        }
        if let Some(kb) = parse_var::<usize, _>(&lookup, "SORT_READ_CHUNK_KB") {
            cfg.read_chunk_bytes = kb.saturating_mul(1024);
        }
        cfg
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.spill_threshold == 0 {
            return Err(ConfigError::ZeroThreshold);
        }
        if self.read_ahead == 0 {
            return Err(ConfigError::ZeroReadAhead);
        }
        if self.read_chunk_bytes == 0 {
            return Err(ConfigError::ZeroChunk);
        }
        if self.operation_id.trim().is_empty() {
            return Err(ConfigError::EmptyId);
        }
        Ok(())
    }

    /// The operation id with every run of control, punctuation or
    /// whitespace characters replaced by a single `_`.
    pub fn sanitized_id(&self) -> String {
        let mut out = String::with_capacity(self.operation_id.len());
        let mut in_run = false;
        for c in self.operation_id.chars() {
            if c.is_control() || c.is_ascii_punctuation() || c.is_whitespace() {
                if !in_run {
                    out.push('_');
                }
                in_run = true;
            } else {
                out.push(c);
                in_run = false;
            }
        }
        out
    }

    /// Path of spill file `seq` of the run builder tagged `tag`:
    /// `{temp_dir}/{sanitized_id}-{tag:08x}-{seq:06}.sort`.
    ///
    /// The tag keeps sorts that share an id and a directory apart.
    pub fn run_path(&self, tag: u32, seq: u64) -> PathBuf {
        self.temp_dir.join(format!(
            "{}-{:08x}-{:06}.{}",
            self.sanitized_id(),
            tag,
            seq,
            SPILL_EXTENSION
        ))
    }

    /// Creates the temp directory (and parents) if it is missing.
    pub fn create_temp_dir(&self) -> Result<&Path, ConfigError> {
        fs::create_dir_all(&self.temp_dir).map_err(|source| ConfigError::Io {
            path: self.temp_dir.clone(),
            source,
        })?;
        Ok(&self.temp_dir)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable setting, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests;
