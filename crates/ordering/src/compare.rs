use std::cell::RefCell;
use std::cmp::Ordering;
use std::marker::PhantomData;

use thiserror::Error;
use tracing::trace;

use crate::{Direction, FieldSource, FieldSpec, SpecError, ValueKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompareError {
    #[error("field {field:?} holds incomparable values: {left} vs {right}")]
    Incomparable {
        field: String,
        left: ValueKind,
        right: ValueKind,
    },

    #[error("unknown sort field {0:?}")]
    UnknownField(String),

    #[error("{0}")]
    Custom(String),
}

/// A total order over `T` that may fail.
///
/// `admit` is called once per item as it enters a sort, before any
/// comparison involving it, so orderings with preconditions can reject bad
/// items early. The default accepts everything.
pub trait Compare<T: ?Sized> {
    fn compare(&self, a: &T, b: &T) -> Result<Ordering, CompareError>;

    fn admit(&self, _item: &T) -> Result<(), CompareError> {
        Ok(())
    }
}

/// The `Ord` order of `T`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Natural;

impl<T: Ord + ?Sized> Compare<T> for Natural {
    fn compare(&self, a: &T, b: &T) -> Result<Ordering, CompareError> {
        Ok(a.cmp(b))
    }
}

/// An infallible comparison closure.
pub struct CompareFn<T: ?Sized, F> {
    f: F,
    _item: PhantomData<fn(&T)>,
}

impl<T: ?Sized, F> CompareFn<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _item: PhantomData,
        }
    }
}

impl<T: ?Sized, F> Compare<T> for CompareFn<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    fn compare(&self, a: &T, b: &T) -> Result<Ordering, CompareError> {
        Ok((self.f)(a, b))
    }
}

/// Full reversal of another ordering.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reverse<C>(pub C);

impl<T: ?Sized, C: Compare<T>> Compare<T> for Reverse<C> {
    fn compare(&self, a: &T, b: &T) -> Result<Ordering, CompareError> {
        self.0.compare(b, a)
    }

    fn admit(&self, item: &T) -> Result<(), CompareError> {
        self.0.admit(item)
    }
}

/// Multi-field ordering built from a list of [`FieldSpec`]s.
///
/// Fields are compared in list order; the first non-equal field decides. The
/// ascending base order puts nulls last. A descending field reverses that
/// whole base order, so its nulls come first.
///
/// Each field is locked to the kind of the first non-null value admitted for
/// it. A later item carrying a kind that does not compare with the locked
/// one is rejected with [`CompareError::Incomparable`]; `Int` and `Float`
/// share a lock. A rejected item locks nothing.
#[derive(Debug, Default)]
pub struct FieldOrdering {
    specs: Vec<FieldSpec>,
    kinds: RefCell<Vec<Option<ValueKind>>>,
}

impl FieldOrdering {
    pub fn new(specs: Vec<FieldSpec>) -> Self {
        let kinds = RefCell::new(vec![None; specs.len()]);
        Self { specs, kinds }
    }

    /// Builds an ordering from a list such as `"-age, name"`.
    pub fn parse(list: &str) -> Result<Self, SpecError> {
        Ok(Self::new(FieldSpec::parse_list(list)?))
    }

    pub fn specs(&self) -> &[FieldSpec] {
        &self.specs
    }

    /// Kind locked for each field so far (`None` until a non-null value is
    /// admitted).
    pub fn locked_kinds(&self) -> Vec<Option<ValueKind>> {
        self.kinds.borrow().clone()
    }
}

impl<T: FieldSource + ?Sized> Compare<T> for FieldOrdering {
    fn compare(&self, a: &T, b: &T) -> Result<Ordering, CompareError> {
        for spec in &self.specs {
            let left = a
                .field(&spec.key)
                .ok_or_else(|| CompareError::UnknownField(spec.key.clone()))?;
            let right = b
                .field(&spec.key)
                .ok_or_else(|| CompareError::UnknownField(spec.key.clone()))?;

            let ord = left
                .natural_cmp(right)
                .ok_or_else(|| CompareError::Incomparable {
                    field: spec.key.clone(),
                    left: left.kind(),
                    right: right.kind(),
                })?;
            let ord = match spec.direction {
                Direction::Ascending => ord,
                Direction::Descending => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return Ok(ord);
            }
        }
        Ok(Ordering::Equal)
    }

    fn admit(&self, item: &T) -> Result<(), CompareError> {
        let mut kinds = self.kinds.borrow_mut();
        // Locks taken by this item; committed only once every field passes.
        let mut fresh: Vec<(usize, ValueKind)> = Vec::new();
        for (i, spec) in self.specs.iter().enumerate() {
            let value = item
                .field(&spec.key)
                .ok_or_else(|| CompareError::UnknownField(spec.key.clone()))?;
            if value.is_null() {
                continue;
            }
            let kind = value.kind();
            match kinds[i] {
                None => fresh.push((i, kind)),
                Some(expected) if !expected.comparable_with(kind) => {
                    return Err(CompareError::Incomparable {
                        field: spec.key.clone(),
                        left: expected,
                        right: kind,
                    });
                }
                Some(_) => {}
            }
        }
        for (i, kind) in fresh {
            trace!(field = %self.specs[i].key, %kind, "sort field kind locked");
            kinds[i] = Some(kind);
        }
        Ok(())
    }
}

/// Sorts `items` in place with a fallible ordering.
///
/// The sort is not stable. If any comparison fails the first error is
/// returned and the slice is left in an unspecified order.
pub fn sort_by<T, C>(items: &mut [T], cmp: &C) -> Result<(), CompareError>
where
    C: Compare<T> + ?Sized,
{
    let mut first_err: Option<CompareError> = None;
    items.sort_unstable_by(|a, b| match cmp.compare(a, b) {
        Ok(ord) => ord,
        Err(e) => {
            if first_err.is_none() {
                first_err = Some(e);
            }
            Ordering::Equal
        }
    });
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
