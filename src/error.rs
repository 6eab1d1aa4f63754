//! Error types for the `flat-hash-map` crate.

/// Errors returned by the fallible operations of [`FlatHashMap`] and
/// [`HashTable`].
///
/// [`FlatHashMap`]: crate::FlatHashMap
/// [`HashTable`]: crate::HashTable
#[derive(Clone, Copy, Debug, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The key passed to a "must exist" accessor such as
    /// [`FlatHashMap::at`](crate::FlatHashMap::at) is not in the map.
    #[error("key not found")]
    KeyNotFound,

    /// A maximum load factor outside of `(0.0, 1.0]` was passed to a strict
    /// setter.
    ///
    /// The lenient setters clamp the value instead of returning this error.
    #[error("invalid maximum load factor {0}, expected a value in (0.0, 1.0]")]
    InvalidLoadFactor(f32),

    /// A [`Position`](crate::Position) was used after the table was mutated
    /// by an erase, a clear or a rehash, or it does not point at an occupied
    /// slot.
    #[error("stale position, the table was mutated after it was obtained")]
    StalePosition,

    /// The requested capacity does not fit in `usize` or exceeds the
    /// maximum allocation size.
    #[error("capacity overflow")]
    CapacityOverflow,
}
