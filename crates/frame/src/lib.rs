//! # Frame - length-prefixed record framing
//!
//! Spilled runs are stored as a plain sequence of frames. Each frame carries
//! one item encoded by the caller's serializer:
//!
//! ```text
//! [payload_len: u32 BE][payload ...][payload_len: u32 BE][payload ...] ...
//! ```
//!
//! There is no file header, trailer or sentinel frame: the end of the byte
//! source is the end of the run. A byte source that stops in the middle of a
//! frame is reported as [`StreamError::TruncatedFrame`]; spill files are never
//! legitimately cut short.
//!
//! [`FrameWriter`] is a plain synchronous writer. [`FrameReader`] exposes the
//! decoded items as a [`ReadStream`] and only touches its byte source when
//! there is outstanding demand.
//!
//! ## Example
//!
//! ```rust
//! use std::io::Cursor;
//! use std::rc::Rc;
//! use frame::{Deserializer, FrameReader, FrameWriter, Serializer};
//! use stream::{drain, BoxError};
//!
//! let ser: Rc<dyn Serializer<String>> =
//!     Rc::new(|s: &String, out: &mut Vec<u8>| -> Result<(), BoxError> {
//!         out.extend_from_slice(s.as_bytes());
//!         Ok(())
//!     });
//! let de: Rc<dyn Deserializer<String>> =
//!     Rc::new(|b: &[u8]| -> Result<String, BoxError> { Ok(String::from_utf8(b.to_vec())?) });
//!
//! let mut w = FrameWriter::new(Vec::new(), ser);
//! w.write(&"hello".to_string()).unwrap();
//! let bytes = w.end().unwrap();
//!
//! let mut r = FrameReader::new(Cursor::new(bytes), de);
//! assert_eq!(drain(&mut r).unwrap(), vec!["hello".to_string()]);
//! ```

mod reader;
mod writer;

use stream::BoxError;

pub use reader::FrameReader;
pub use writer::FrameWriter;

/// Size of the length header in front of every frame.
pub const HEADER_BYTES: usize = 4;

/// Largest payload accepted on write or on read (64 MiB safety cap).
pub const MAX_FRAME_SIZE: u64 = 64 * 1024 * 1024;

/// Default number of bytes requested from the byte source per read.
pub const DEFAULT_READ_CHUNK: usize = 8 * 1024;

/// Turns one item into payload bytes.
///
/// Implementations append to `out`; they must not inspect or clear what is
/// already there.
pub trait Serializer<T> {
    fn serialize(&self, item: &T, out: &mut Vec<u8>) -> Result<(), BoxError>;
}

impl<T, F> Serializer<T> for F
where
    F: Fn(&T, &mut Vec<u8>) -> Result<(), BoxError>,
{
    fn serialize(&self, item: &T, out: &mut Vec<u8>) -> Result<(), BoxError> {
        self(item, out)
    }
}

/// Rebuilds one item from exactly the payload bytes of a frame.
pub trait Deserializer<T> {
    fn deserialize(&self, payload: &[u8]) -> Result<T, BoxError>;
}

impl<T, F> Deserializer<T> for F
where
    F: Fn(&[u8]) -> Result<T, BoxError>,
{
    fn deserialize(&self, payload: &[u8]) -> Result<T, BoxError> {
        self(payload)
    }
}
