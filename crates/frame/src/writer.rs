use std::io::{self, BufWriter, Write};
use std::rc::Rc;

use byteorder::{BigEndian, WriteBytesExt};
use stream::StreamError;

use crate::{Serializer, HEADER_BYTES, MAX_FRAME_SIZE};

/// Synchronous frame writer over any byte sink.
///
/// Each item is serialized into a reusable scratch buffer first, so a
/// serializer failure never leaves a partial frame in the sink.
pub struct FrameWriter<T, W: Write> {
    out: BufWriter<W>,
    serializer: Rc<dyn Serializer<T>>,
    /// Reusable scratch buffer to avoid allocation on every write.
    payload: Vec<u8>,
    frames: u64,
    bytes: u64,
}

impl<T, W: Write> FrameWriter<T, W> {
    pub fn new(out: W, serializer: Rc<dyn Serializer<T>>) -> Self {
        Self {
            out: BufWriter::new(out),
            serializer,
            payload: Vec::with_capacity(256),
            frames: 0,
            bytes: 0,
        }
    }

    /// Serializes `item` and forwards `[len][payload]` to the sink.
    ///
    /// # Errors
    ///
    /// - [`StreamError::Serialization`] if the serializer fails.
    /// - [`StreamError::FrameTooLarge`] if the payload exceeds the cap.
    /// - [`StreamError::Io`] if the sink rejects the bytes.
    pub fn write(&mut self, item: &T) -> Result<(), StreamError> {
        self.payload.clear();
        self.serializer
            .serialize(item, &mut self.payload)
            .map_err(StreamError::Serialization)?;

        let len = self.payload.len() as u64;
        if len > MAX_FRAME_SIZE {
            return Err(StreamError::FrameTooLarge(len));
        }

        self.out.write_u32::<BigEndian>(len as u32)?;
        self.out.write_all(&self.payload)?;

        self.frames += 1;
        self.bytes += HEADER_BYTES as u64 + len;
        Ok(())
    }

    /// Flushes everything and hands the sink back.
    pub fn end(self) -> Result<W, StreamError> {
        let mut inner = self.out.into_inner().map_err(io::IntoInnerError::into_error)?;
        inner.flush()?;
        Ok(inner)
    }

    /// Number of frames written so far.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Number of bytes written so far, headers included.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}
