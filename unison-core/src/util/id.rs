use std::fmt::{Debug, Display};
use std::marker::PhantomData;

use crossbeam::atomic::AtomicCell;

static NEXT_ID: AtomicCell<u64> = AtomicCell::new(1);

/// Tells runtime objects of one kind apart, such as subscriptions or scheduled
/// executions. These are never persisted, so one counter for the whole process
/// is enough.
pub struct Id<T> {
    value: u64,
    kind: PhantomData<fn() -> T>,
}

impl<T> Id<T> {
    pub fn new() -> Self {
        Self {
            value: NEXT_ID.fetch_add(1),
            kind: PhantomData,
        }
    }
}

impl<T> Debug for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.value)
    }
}

impl<T> Display for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.value, f)
    }
}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Eq for Id<T> {}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    struct Marker;

    #[test]
    fn ids_are_unique_and_copyable() {
        let first = Id::<Marker>::new();
        let second = Id::<Marker>::new();
        let copied = first;

        assert_ne!(first, second);
        assert_eq!(first, copied);
        assert_eq!(format!("{:?}", first), format!("#{}", first));
    }
}
