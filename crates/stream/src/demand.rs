use std::cell::Cell;
use std::rc::Rc;

use crate::DemandError;

/// Outstanding demand of one stream. `u64::MAX` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Demand(u64);

impl Demand {
    /// No outstanding demand.
    pub const NONE: Demand = Demand(0);

    /// Unbounded demand (`resume()`).
    pub const UNBOUNDED: Demand = Demand(u64::MAX);

    /// Returns the number of items that may still be emitted.
    #[must_use]
    pub fn remaining(self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn is_unbounded(self) -> bool {
        self.0 == u64::MAX
    }

    #[must_use]
    pub fn has_demand(self) -> bool {
        self.0 > 0
    }

    /// Adds `n` items of credit. Overflow saturates to unbounded.
    #[must_use]
    pub fn add(self, n: u64) -> Demand {
        Demand(self.0.saturating_add(n))
    }

    /// Consumes one item of credit. Unbounded demand stays unbounded.
    #[must_use]
    pub fn consume_one(self) -> Demand {
        if self.is_unbounded() {
            self
        } else {
            Demand(self.0.saturating_sub(1))
        }
    }
}

/// Shared, cloneable view of a stream's demand counter.
///
/// The producer and any number of consumers' handlers hold clones; all of
/// them see the same counter.
#[derive(Debug, Clone, Default)]
pub struct DemandHandle {
    cell: Rc<Cell<Demand>>,
}

impl DemandHandle {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self) -> Demand {
        self.cell.get()
    }

    #[must_use]
    pub fn has_demand(&self) -> bool {
        self.cell.get().has_demand()
    }

    /// Adds `n` items of credit without driving the stream.
    pub fn request(&self, n: u64) {
        self.cell.set(self.cell.get().add(n));
    }

    /// Same as [`request`](Self::request) but with the signed argument of
    /// the demand protocol.
    ///
    /// # Errors
    ///
    /// Returns [`DemandError::Negative`] for `n < 0`.
    pub fn fetch(&self, n: i64) -> Result<(), DemandError> {
        let n = u64::try_from(n).map_err(|_| DemandError::Negative(n))?;
        self.request(n);
        Ok(())
    }

    pub fn pause(&self) {
        self.cell.set(Demand::NONE);
    }

    pub fn set_unbounded(&self) {
        self.cell.set(Demand::UNBOUNDED);
    }

    pub(crate) fn consume_one(&self) {
        self.cell.set(self.cell.get().consume_one());
    }
}
