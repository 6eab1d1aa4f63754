#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod control;
mod macros;
mod storage;

pub mod error;

/// A keyed hash map built on the raw [`HashTable`].
///
/// This module provides [`FlatHashMap`], which hashes keys with a
/// configurable `BuildHasher` and exposes a standard key-value interface plus
/// position-based cursors.
pub mod hash_map;

pub mod hash_table;

pub use error::Error;
pub use hash_map::DefaultHashBuilder;
pub use hash_map::Entry;
pub use hash_map::FlatHashMap;
pub use hash_table::HashTable;
pub use hash_table::Position;
