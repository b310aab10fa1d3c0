use std::io::{self, Read};
use std::rc::Rc;

use byteorder::{BigEndian, ByteOrder};
use stream::{DemandHandle, Handlers, Outlet, ReadStream, StreamError};
use tracing::trace;

use crate::{Deserializer, DEFAULT_READ_CHUNK, HEADER_BYTES, MAX_FRAME_SIZE};

/// What the pending bytes hold right now.
enum Pending {
    /// A whole frame whose payload is `pending[start..end]`.
    Frame { start: usize, end: usize },
    /// Not enough bytes yet; `expected` is the size of the frame being built.
    Partial { expected: usize },
    /// The length header exceeds the safety cap.
    Oversized(u64),
}

/// Demand-driven frame decoder over any byte source.
///
/// Raw bytes are read in chunks into an accumulation buffer. Whole frames are
/// deserialized and emitted one per unit of demand. A source returning
/// [`io::ErrorKind::WouldBlock`] suspends the reader until the next
/// [`drive`](ReadStream::drive); no state is lost.
pub struct FrameReader<T, R: Read> {
    src: R,
    deserializer: Rc<dyn Deserializer<T>>,
    pending: Vec<u8>,
    /// Offset of the first unconsumed byte in `pending`.
    pos: usize,
    chunk: usize,
    eof: bool,
    outlet: Outlet<T>,
}

impl<T, R: Read> FrameReader<T, R> {
    pub fn new(src: R, deserializer: Rc<dyn Deserializer<T>>) -> Self {
        Self {
            src,
            deserializer,
            pending: Vec::with_capacity(DEFAULT_READ_CHUNK),
            pos: 0,
            chunk: DEFAULT_READ_CHUNK,
            eof: false,
            outlet: Outlet::new(),
        }
    }

    /// Sets the number of bytes asked of the source per read (at least 1).
    pub fn with_chunk_size(mut self, chunk: usize) -> Self {
        self.chunk = chunk.max(1);
        self
    }

    /// Number of frames emitted so far.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.outlet.emitted()
    }

    fn inspect(&self) -> Pending {
        let avail = &self.pending[self.pos..];
        if avail.len() < HEADER_BYTES {
            return Pending::Partial {
                expected: HEADER_BYTES,
            };
        }
        let len = u64::from(BigEndian::read_u32(&avail[..HEADER_BYTES]));
        if len > MAX_FRAME_SIZE {
            return Pending::Oversized(len);
        }
        let total = HEADER_BYTES + len as usize;
        if avail.len() < total {
            return Pending::Partial { expected: total };
        }
        Pending::Frame {
            start: self.pos + HEADER_BYTES,
            end: self.pos + total,
        }
    }

    /// Pulls one chunk from the source. Returns `false` when the source is
    /// not ready and the reader has to suspend.
    fn fill(&mut self) -> Result<bool, io::Error> {
        if self.pos > 0 {
            self.pending.drain(..self.pos);
            self.pos = 0;
        }
        let start = self.pending.len();
        self.pending.resize(start + self.chunk, 0);
        loop {
            match self.src.read(&mut self.pending[start..]) {
                Ok(n) => {
                    self.pending.truncate(start + n);
                    if n == 0 {
                        self.eof = true;
                    }
                    trace!(bytes = n, "frame reader filled");
                    return Ok(true);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.pending.truncate(start);
                    return Ok(false);
                }
                Err(e) => {
                    self.pending.truncate(start);
                    return Err(e);
                }
            }
        }
    }
}

impl<T, R: Read> ReadStream<T> for FrameReader<T, R> {
    fn set_handlers(&mut self, handlers: Handlers<T>) {
        self.outlet.set_handlers(handlers);
    }

    fn demand(&self) -> DemandHandle {
        self.outlet.demand()
    }

    fn drive(&mut self) {
        while self.outlet.ready() {
            match self.inspect() {
                Pending::Frame { start, end } => {
                    let decoded = self.deserializer.deserialize(&self.pending[start..end]);
                    self.pos = end;
                    match decoded {
                        Ok(item) => self.outlet.emit(item),
                        Err(e) => {
                            self.outlet.fail(StreamError::Deserialization(e));
                            return;
                        }
                    }
                }
                Pending::Oversized(len) => {
                    self.outlet.fail(StreamError::FrameTooLarge(len));
                    return;
                }
                Pending::Partial { expected } => {
                    let actual = self.pending.len() - self.pos;
                    if self.eof {
                        if actual == 0 {
                            self.outlet.end();
                        } else {
                            self.outlet
                                .fail(StreamError::TruncatedFrame { expected, actual });
                        }
                        return;
                    }
                    match self.fill() {
                        Ok(true) => {}
                        Ok(false) => return,
                        Err(e) => {
                            self.outlet.fail(StreamError::Io(e));
                            return;
                        }
                    }
                }
            }
        }
    }

    fn is_terminated(&self) -> bool {
        self.outlet.is_terminated()
    }
}
