use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;

use tracing::{trace, warn};

/// Filesystem primitives used for spill files.
///
/// The sorter never touches the filesystem directly, so tests can inject
/// failures and embedders can redirect spill storage.
pub trait SpillFs {
    /// Creates a new file for writing. Fails if the path already exists.
    fn create(&self, path: &Path) -> io::Result<Box<dyn Write>>;

    /// Opens an existing file for reading.
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read>>;

    fn remove(&self, path: &Path) -> io::Result<()>;

    /// Creates `dir` and its parents if missing.
    fn ensure_dir(&self, dir: &Path) -> io::Result<()>;
}

/// The local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl SpillFs for LocalFs {
    fn create(&self, path: &Path) -> io::Result<Box<dyn Write>> {
        let file = OpenOptions::new().write(true).create_new(true).open(path)?;
        Ok(Box::new(file))
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn Read>> {
        Ok(Box::new(File::open(path)?))
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn ensure_dir(&self, dir: &Path) -> io::Result<()> {
        fs::create_dir_all(dir)
    }
}

/// Best-effort delete. A missing file counts as deleted; any other failure
/// is logged and swallowed.
pub fn remove_quietly(fs: &dyn SpillFs, path: &Path) -> bool {
    match fs.remove(path) {
        Ok(()) => {
            trace!(path = %path.display(), "spill file removed");
            true
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to remove spill file");
            false
        }
    }
}
