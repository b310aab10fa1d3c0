//! Producer-side bookkeeping shared by every [`ReadStream`](crate::ReadStream)
//! implementation: the registered handlers, the demand counter and the
//! exactly-once terminal guarantee.

use tracing::warn;

use crate::{DemandHandle, Handlers, StreamError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutletState {
    Open,
    Ended,
    Failed,
}

enum Terminal {
    End,
    Error(StreamError),
}

/// The emitting end of a stream.
///
/// A terminal event raised before any handlers are registered is parked and
/// delivered as soon as [`set_handlers`](Outlet::set_handlers) is called.
pub struct Outlet<T> {
    handlers: Option<Handlers<T>>,
    demand: DemandHandle,
    state: OutletState,
    parked: Option<Terminal>,
    emitted: u64,
}

impl<T> Outlet<T> {
    pub fn new() -> Self {
        Self::with_demand(DemandHandle::new())
    }

    /// Creates an outlet sharing an existing demand counter.
    pub fn with_demand(demand: DemandHandle) -> Self {
        Self {
            handlers: None,
            demand,
            state: OutletState::Open,
            parked: None,
            emitted: 0,
        }
    }

    pub fn set_handlers(&mut self, handlers: Handlers<T>) {
        self.handlers = Some(handlers);
        if let Some(terminal) = self.parked.take() {
            self.deliver(terminal);
        }
    }

    pub fn demand(&self) -> DemandHandle {
        self.demand.clone()
    }

    #[must_use]
    pub fn state(&self) -> OutletState {
        self.state
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == OutletState::Open
    }

    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.state != OutletState::Open
    }

    /// Number of items emitted so far.
    #[must_use]
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// `true` when an item may be emitted right now: the outlet is open, a
    /// consumer is registered and there is outstanding demand.
    #[must_use]
    pub fn ready(&self) -> bool {
        self.is_open() && self.handlers.is_some() && self.demand.has_demand()
    }

    /// Delivers `item` to the data handler and consumes one unit of demand.
    ///
    /// Callers check [`ready`](Self::ready) first.
    pub fn emit(&mut self, item: T) {
        debug_assert!(self.ready(), "emit without demand");
        if let Some(handlers) = self.handlers.as_mut() {
            self.demand.consume_one();
            self.emitted += 1;
            (handlers.data)(item);
        }
    }

    /// Raises the end event. Returns `false` if a terminal event was
    /// already raised.
    pub fn end(&mut self) -> bool {
        if self.is_terminated() {
            return false;
        }
        self.state = OutletState::Ended;
        self.raise(Terminal::End);
        true
    }

    /// Raises the error event. Returns `false` (and drops `err`) if a
    /// terminal event was already raised.
    pub fn fail(&mut self, err: StreamError) -> bool {
        if self.is_terminated() {
            return false;
        }
        self.state = OutletState::Failed;
        self.raise(Terminal::Error(err));
        true
    }

    fn raise(&mut self, terminal: Terminal) {
        if self.handlers.is_some() {
            self.deliver(terminal);
        } else {
            self.parked = Some(terminal);
        }
    }

    fn deliver(&mut self, terminal: Terminal) {
        let Some(handlers) = self.handlers.as_mut() else {
            self.parked = Some(terminal);
            return;
        };
        match terminal {
            Terminal::End => {
                if let Some(on_end) = handlers.end.take() {
                    on_end();
                }
            }
            Terminal::Error(err) => match handlers.error.take() {
                Some(on_error) => on_error(err),
                None => warn!(
                    error = &err as &dyn std::error::Error,
                    "stream failed with no error handler"
                ),
            },
        }
        handlers.end = None;
        handlers.error = None;
    }
}

impl<T> Default for Outlet<T> {
    fn default() -> Self {
        Self::new()
    }
}
