use crate::{DemandHandle, Handlers, Outlet, ReadStream};

/// A stream over an in-memory list.
///
/// Emits immediately on demand and ends as soon as the list is exhausted,
/// whether or not more demand is outstanding.
pub struct VecReadStream<T> {
    items: std::vec::IntoIter<T>,
    outlet: Outlet<T>,
}

impl<T> VecReadStream<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items: items.into_iter(),
            outlet: Outlet::new(),
        }
    }

    /// Number of items not yet emitted.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.items.len()
    }
}

impl<T> ReadStream<T> for VecReadStream<T> {
    fn set_handlers(&mut self, handlers: Handlers<T>) {
        self.outlet.set_handlers(handlers);
    }

    fn demand(&self) -> DemandHandle {
        self.outlet.demand()
    }

    fn drive(&mut self) {
        while self.outlet.is_open() {
            if self.items.len() == 0 {
                self.outlet.end();
                return;
            }
            if !self.outlet.ready() {
                return;
            }
            if let Some(item) = self.items.next() {
                self.outlet.emit(item);
            }
        }
    }

    fn is_terminated(&self) -> bool {
        self.outlet.is_terminated()
    }
}
