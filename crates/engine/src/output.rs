//! Output side: the `ReadStream` a consumer sees, forwarding to whichever
//! phase the sort is in.
use stream::{DemandHandle, Handlers, ReadStream, StreamError};

use crate::{Phase, SortingStream};

impl<T: 'static> SortingStream<T> {
    /// Drives the sort to its end with unbounded demand and returns every
    /// item in order.
    ///
    /// # Errors
    ///
    /// Returns the error event of the sort, if it raised one.
    pub fn drain(&mut self) -> Result<Vec<T>, StreamError> {
        stream::drain(self)
    }
}

impl<T: 'static> ReadStream<T> for SortingStream<T> {
    fn set_handlers(&mut self, handlers: Handlers<T>) {
        if let Phase::Merging(engine) = &mut self.phase {
            engine.set_handlers(handlers);
        } else if let Some(outlet) = self.outlet.as_mut() {
            outlet.set_handlers(handlers);
        }
    }

    fn demand(&self) -> DemandHandle {
        self.demand.clone()
    }

    fn drive(&mut self) {
        if let Phase::Merging(engine) = &mut self.phase {
            engine.drive();
            return;
        }
        if matches!(self.phase, Phase::Collecting(_)) {
            self.collect();
        }
    }

    fn is_terminated(&self) -> bool {
        match &self.phase {
            Phase::Collecting(_) => false,
            Phase::Merging(engine) => engine.is_terminated(),
            Phase::Failed | Phase::Closed => true,
        }
    }
}
