//! # Ordering - comparison functions for the sorter
//!
//! The sorter is generic over a [`Compare`] implementation. This crate
//! provides the general-purpose ones ([`Natural`], [`CompareFn`],
//! [`Reverse`]) and the multi-field [`FieldOrdering`] used to sort rows of
//! typed [`Value`]s by a list of [`FieldSpec`]s such as `-age, name`.
//!
//! ## Null placement
//!
//! ```text
//! ascending:   1  2  3  null
//! descending:  null  3  2  1
//! ```
//!
//! Descending is a full reversal of ascending, null placement included.

mod compare;
mod field;
mod row;
mod value;

pub use compare::{sort_by, Compare, CompareError, CompareFn, FieldOrdering, Natural, Reverse};
pub use field::{Direction, FieldSpec, SpecError};
pub use row::{FieldSource, Row};
pub use value::{Value, ValueKind};
