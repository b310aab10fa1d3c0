//! # Stream - the demand protocol
//!
//! Every stream-like component of the sorter (the input it consumes, the
//! spill-file reader, the merged output) speaks the same small push/pull
//! contract:
//!
//! ```text
//! consumer                          producer
//!    |  set_handlers(data, end, error)  |
//!    | -------------------------------> |
//!    |  fetch(n) / resume()             |
//!    | -------------------------------> |   demand += n
//!    |            data(item) x <= n     |
//!    | <------------------------------- |   demand -= 1 per item
//!    |            end() | error(e)      |
//!    | <------------------------------- |   exactly once, then silence
//! ```
//!
//! A producer never emits more items than the outstanding demand. Demand is
//! held in a shared [`DemandHandle`] so a data handler can `pause()` or ask
//! for more while it is being called, without needing a reference to the
//! stream itself.
//!
//! Producers run in a single cooperative context. [`ReadStream::drive`] makes
//! as much progress as demand and I/O readiness allow and returns; a producer
//! whose byte source reports `WouldBlock` simply stops and continues on the
//! next `drive`/`fetch`/`resume`.
//!
//! ## Example
//!
//! ```rust
//! use stream::{drain, VecReadStream};
//!
//! let mut s = VecReadStream::new(vec![1, 2, 3]);
//! assert_eq!(drain(&mut s).unwrap(), vec![1, 2, 3]);
//! ```

mod demand;
mod error;
mod outlet;
mod vec_stream;

use std::cell::RefCell;
use std::rc::Rc;

pub use demand::{Demand, DemandHandle};
pub use error::{BoxError, DemandError, StreamError};
pub use outlet::{Outlet, OutletState};
pub use vec_stream::VecReadStream;

type DataFn<T> = Box<dyn FnMut(T)>;
type EndFn = Box<dyn FnOnce()>;
type ErrorFn = Box<dyn FnOnce(StreamError)>;

/// The three callbacks a consumer registers on a producer.
///
/// The end and error handlers are `FnOnce`: the protocol guarantees at most
/// one terminal event.
pub struct Handlers<T> {
    pub(crate) data: DataFn<T>,
    pub(crate) end: Option<EndFn>,
    pub(crate) error: Option<ErrorFn>,
}

impl<T> Handlers<T> {
    /// Creates handlers with the given data callback and no-op terminal
    /// callbacks.
    pub fn new<F>(on_data: F) -> Self
    where
        F: FnMut(T) + 'static,
    {
        Self {
            data: Box::new(on_data),
            end: None,
            error: None,
        }
    }

    /// Sets the callback run when the stream ends normally.
    pub fn on_end<F>(mut self, on_end: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        self.end = Some(Box::new(on_end));
        self
    }

    /// Sets the callback run when the stream fails.
    pub fn on_error<F>(mut self, on_error: F) -> Self
    where
        F: FnOnce(StreamError) + 'static,
    {
        self.error = Some(Box::new(on_error));
        self
    }
}

/// A demand-driven producer of `T`.
///
/// Implementors provide handler registration, access to the shared demand
/// counter, and [`drive`](ReadStream::drive). `fetch`, `pause` and `resume`
/// are expressed in terms of those.
pub trait ReadStream<T> {
    /// Registers the consumer's callbacks, replacing any previous ones.
    fn set_handlers(&mut self, handlers: Handlers<T>);

    /// Returns the shared demand counter of this stream.
    fn demand(&self) -> DemandHandle;

    /// Makes as much progress as the outstanding demand and the readiness of
    /// the underlying source allow, then returns.
    fn drive(&mut self);

    /// Returns `true` once the end or error event has been raised.
    fn is_terminated(&self) -> bool;

    /// Requests `n` more items.
    ///
    /// # Errors
    ///
    /// Returns [`DemandError::Negative`] for `n < 0`. `fetch(0)` is a no-op.
    fn fetch(&mut self, n: i64) -> Result<(), DemandError> {
        let n = u64::try_from(n).map_err(|_| DemandError::Negative(n))?;
        if n == 0 {
            return Ok(());
        }
        self.demand().request(n);
        self.drive();
        Ok(())
    }

    /// Drops all outstanding demand. Nothing is emitted until the next
    /// `fetch` or `resume`.
    fn pause(&mut self) {
        self.demand().pause();
    }

    /// Switches to unbounded demand and starts emitting.
    fn resume(&mut self) {
        self.demand().set_unbounded();
        self.drive();
    }
}

impl<T, S> ReadStream<T> for Box<S>
where
    S: ReadStream<T> + ?Sized,
{
    fn set_handlers(&mut self, handlers: Handlers<T>) {
        (**self).set_handlers(handlers)
    }

    fn demand(&self) -> DemandHandle {
        (**self).demand()
    }

    fn drive(&mut self) {
        (**self).drive()
    }

    fn is_terminated(&self) -> bool {
        (**self).is_terminated()
    }
}

/// Drives `stream` to its terminal event, collecting every item.
///
/// Spins on [`ReadStream::drive`] while the source is not ready, so it must
/// only be used with sources that eventually make progress.
///
/// # Errors
///
/// Returns the stream's error event, if it raised one.
pub fn drain<T, S>(stream: &mut S) -> Result<Vec<T>, StreamError>
where
    T: 'static,
    S: ReadStream<T> + ?Sized,
{
    let items = Rc::new(RefCell::new(Vec::new()));
    let outcome: Rc<RefCell<Option<Result<(), StreamError>>>> = Rc::new(RefCell::new(None));

    let sink = Rc::clone(&items);
    let on_end = Rc::clone(&outcome);
    let on_error = Rc::clone(&outcome);
    stream.set_handlers(
        Handlers::new(move |item| sink.borrow_mut().push(item))
            .on_end(move || *on_end.borrow_mut() = Some(Ok(())))
            .on_error(move |e| *on_error.borrow_mut() = Some(Err(e))),
    );
    stream.resume();

    loop {
        let done = outcome.borrow_mut().take();
        match done {
            Some(result) => {
                result?;
                break;
            }
            None => {
                std::thread::yield_now();
                stream.drive();
            }
        }
    }

    let collected = std::mem::take(&mut *items.borrow_mut());
    Ok(collected)
}
