use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use std::rc::Rc;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use config::SortConfig;
use spill::{LocalFs, SpillFs};
use stream::{BoxError, DemandHandle, Handlers, Outlet, ReadStream, StreamError};

use crate::Codec;

pub fn u64_codec() -> Codec<u64> {
    Codec::new(
        |v: &u64, out: &mut Vec<u8>| -> Result<(), BoxError> {
            out.write_u64::<BigEndian>(*v)?;
            Ok(())
        },
        |mut b: &[u8]| -> Result<u64, BoxError> { Ok(b.read_u64::<BigEndian>()?) },
        |_: &u64| 8,
    )
}

/// Same encoding, but reading a run back always fails.
pub fn undecodable_codec() -> Codec<u64> {
    Codec::new(
        |v: &u64, out: &mut Vec<u8>| -> Result<(), BoxError> {
            out.write_u64::<BigEndian>(*v)?;
            Ok(())
        },
        |_: &[u8]| -> Result<u64, BoxError> { Err("corrupt record".into()) },
        |_: &u64| 8,
    )
}

/// Every `u64` weighs 8 bytes, so a threshold of `8 * n` spills every `n`
/// items.
pub fn config(dir: &Path, items_per_run: usize) -> SortConfig {
    SortConfig::new(dir, "test").with_spill_threshold(8 * items_per_run)
}

pub fn count_sort_files(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|s| s.to_str())
                .map(|ext| ext == "sort")
                .unwrap_or(false)
        })
        .count()
}

/// What a consumer has seen so far.
#[derive(Debug)]
pub struct Seen<T> {
    pub items: Vec<T>,
    pub ends: u32,
    pub errors: Vec<StreamError>,
}

/// Registers recording handlers on `stream`.
pub fn watch<T: 'static, S: ReadStream<T> + ?Sized>(stream: &mut S) -> Rc<RefCell<Seen<T>>> {
    let seen = Rc::new(RefCell::new(Seen {
        items: Vec::new(),
        ends: 0,
        errors: Vec::new(),
    }));
    let on_data = Rc::clone(&seen);
    let on_end = Rc::clone(&seen);
    let on_error = Rc::clone(&seen);
    stream.set_handlers(
        Handlers::new(move |item| on_data.borrow_mut().items.push(item))
            .on_end(move || on_end.borrow_mut().ends += 1)
            .on_error(move |e| on_error.borrow_mut().errors.push(e)),
    );
    seen
}

/// Input that emits at most one item per drive and has nothing to give on
/// every other drive, like a source that keeps reporting `WouldBlock`.
pub struct Stutter<T> {
    items: VecDeque<T>,
    outlet: Outlet<T>,
    blocked: bool,
    fail_at_end: bool,
    drives: Rc<Cell<u64>>,
}

impl<T> Stutter<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items: items.into(),
            outlet: Outlet::new(),
            blocked: false,
            fail_at_end: false,
            drives: Rc::new(Cell::new(0)),
        }
    }

    /// Raises an error event instead of ending once `items` are used up.
    pub fn failing(items: Vec<T>) -> Self {
        Self {
            fail_at_end: true,
            ..Self::new(items)
        }
    }

    /// Counter of `drive` calls that reach this stream.
    pub fn drives(&self) -> Rc<Cell<u64>> {
        Rc::clone(&self.drives)
    }
}

impl<T> ReadStream<T> for Stutter<T> {
    fn set_handlers(&mut self, handlers: Handlers<T>) {
        self.outlet.set_handlers(handlers);
    }

    fn demand(&self) -> DemandHandle {
        self.outlet.demand()
    }

    fn drive(&mut self) {
        self.drives.set(self.drives.get() + 1);
        self.blocked = !self.blocked;
        if self.blocked || self.outlet.is_terminated() {
            return;
        }
        if self.items.is_empty() {
            if self.fail_at_end {
                self.outlet.fail(StreamError::Io(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection reset",
                )));
            } else {
                self.outlet.end();
            }
            return;
        }
        if self.outlet.ready() {
            if let Some(item) = self.items.pop_front() {
                self.outlet.emit(item);
            }
        }
    }

    fn is_terminated(&self) -> bool {
        self.outlet.is_terminated()
    }
}

/// Local filesystem that can be told to fail creates or writes.
#[derive(Default)]
pub struct FaultyFs {
    pub fail_create: Cell<bool>,
    pub fail_write: Cell<bool>,
}

struct FailingWriter;

impl Write for FailingWriter {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::Other, "disk full"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SpillFs for FaultyFs {
    fn create(&self, path: &Path) -> io::Result<Box<dyn Write>> {
        if self.fail_create.get() {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
        }
        let file = LocalFs.create(path)?;
        if self.fail_write.get() {
            drop(file);
            return Ok(Box::new(FailingWriter));
        }
        Ok(file)
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn Read>> {
        LocalFs.open(path)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        LocalFs.remove(path)
    }

    fn ensure_dir(&self, dir: &Path) -> io::Result<()> {
        LocalFs.ensure_dir(dir)
    }
}
