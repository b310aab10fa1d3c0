use std::fmt;
use std::rc::Rc;

use frame::{Deserializer, Serializer};
use spill::SizeOf;
use stream::BoxError;

/// The item policy a sort is built with: how to write an item to a spill
/// file, how to read it back, and how much memory it is estimated to take.
pub struct Codec<T> {
    pub(crate) serializer: Rc<dyn Serializer<T>>,
    pub(crate) deserializer: Rc<dyn Deserializer<T>>,
    pub(crate) size_of: SizeOf<T>,
}

impl<T: 'static> Codec<T> {
    pub fn new<S, D, Z>(serialize: S, deserialize: D, size_of: Z) -> Self
    where
        S: Fn(&T, &mut Vec<u8>) -> Result<(), BoxError> + 'static,
        D: Fn(&[u8]) -> Result<T, BoxError> + 'static,
        Z: Fn(&T) -> usize + 'static,
    {
        Self {
            serializer: Rc::new(serialize),
            deserializer: Rc::new(deserialize),
            size_of: Rc::new(size_of),
        }
    }
}

impl<T> Codec<T> {
    pub fn from_parts(
        serializer: Rc<dyn Serializer<T>>,
        deserializer: Rc<dyn Deserializer<T>>,
        size_of: SizeOf<T>,
    ) -> Self {
        Self {
            serializer,
            deserializer,
            size_of,
        }
    }

    /// Estimated size of `item`.
    pub fn size_of(&self, item: &T) -> usize {
        (self.size_of)(item)
    }
}

impl<T> Clone for Codec<T> {
    fn clone(&self) -> Self {
        Self {
            serializer: Rc::clone(&self.serializer),
            deserializer: Rc::clone(&self.deserializer),
            size_of: Rc::clone(&self.size_of),
        }
    }
}

impl<T> fmt::Debug for Codec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec").finish_non_exhaustive()
    }
}
