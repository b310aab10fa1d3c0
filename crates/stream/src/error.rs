use std::io;

use thiserror::Error;

/// Boxed error returned by caller-supplied serializers, deserializers and
/// comparators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The terminal error event of a stream.
///
/// The first error raised anywhere in a sort aborts it and is delivered once
/// through the consumer's error handler.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Temp-file open, read, write or delete failed.
    #[error("io error")]
    Io(#[from] io::Error),

    /// The caller's serializer failed while spilling a run.
    #[error("serialization failed")]
    Serialization(#[source] BoxError),

    /// The caller's deserializer failed while reading a run back.
    #[error("deserialization failed")]
    Deserialization(#[source] BoxError),

    /// The ordering function failed or met mutually incomparable values.
    #[error("comparison failed")]
    Comparison(#[source] BoxError),

    /// The byte source ended in the middle of a frame.
    #[error("truncated frame: expected {expected} bytes, found {actual}")]
    TruncatedFrame { expected: usize, actual: usize },

    /// A frame length exceeded the framing safety cap.
    #[error("frame too large: {0} bytes")]
    FrameTooLarge(u64),

    /// The input stream raised an error event.
    #[error("input stream failed")]
    Upstream(#[source] BoxError),
}

/// Precondition violation on `fetch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DemandError {
    #[error("demand must not be negative (got {0})")]
    Negative(i64),
}
