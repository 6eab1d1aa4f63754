//! A raw open-addressing hash table probed with SIMD control byte scans.
//!
//! [`HashTable<V>`] stores values of type `V` and leaves hashing and key
//! comparison to the caller: every operation takes a precomputed 64-bit hash
//! and an equality predicate, and operations that may grow the table also take
//! a `hasher` closure used to recompute the hash of each stored value during a
//! rehash. [`FlatHashMap`](crate::FlatHashMap) builds a keyed map on top of it.
//!
//! ## Layout
//!
//! The table is a power-of-two array of slots with one control byte per slot.
//! A key's probe sequence starts at its home index `hash & (capacity - 1)` and
//! visits 16-byte windows of control bytes, wrapping to index 0 at the end of
//! the array. An empty byte in a window ends the search, and an insertion
//! reuses the first tombstone it passed before settling for an empty slot.
//!
//! ## Thread safety
//!
//! The table is not internally synchronized. It is `Send`/`Sync` under the
//! same conditions as `Vec<V>`, so sharing it for mutation across threads
//! requires an external lock held by the caller.

use alloc::format;
use alloc::string::ToString;
use alloc::vec::Vec;
use core::fmt::Debug;
use core::iter::FusedIterator;

use crate::control;
use crate::control::DELETED;
use crate::control::EMPTY;
use crate::control::GROUP_WIDTH;
use crate::control::hashtag;
use crate::error::Error;
use crate::macros::debug;
use crate::macros::trace;
use crate::storage::SlotsMut;
use crate::storage::Storage;

/// Smallest capacity a table is allocated with.
pub const MIN_CAPACITY: usize = 16;

/// Maximum load factor of newly created tables.
pub const DEFAULT_MAX_LOAD_FACTOR: f32 = 0.75;

/// Used in place of a non-positive maximum load factor.
const FALLBACK_MAX_LOAD_FACTOR: f32 = 0.25;

/// Smallest positive maximum load factor accepted. Smaller values are raised
/// to it.
pub const MIN_MAX_LOAD_FACTOR: f32 = 0.0625;

const _: () = assert!(MIN_CAPACITY >= GROUP_WIDTH && MIN_CAPACITY.is_power_of_two());

#[inline(always)]
fn growth_limit(capacity: usize, max_load_factor: f32) -> usize {
    ((capacity as f64 * max_load_factor as f64) as usize).min(capacity)
}

#[inline]
fn normalize_capacity(requested: usize) -> Result<usize, Error> {
    requested
        .max(MIN_CAPACITY)
        .checked_next_power_of_two()
        .ok_or(Error::CapacityOverflow)
}

/// Smallest valid capacity that holds `items` values without exceeding
/// `max_load_factor`.
fn capacity_for(items: usize, max_load_factor: f32) -> Result<usize, Error> {
    let mut capacity = normalize_capacity(items)?;
    while growth_limit(capacity, max_load_factor) < items {
        capacity = capacity.checked_mul(2).ok_or(Error::CapacityOverflow)?;
    }
    Ok(capacity)
}

fn clamp_max_load_factor(max_load_factor: f32) -> f32 {
    if max_load_factor.is_nan() || max_load_factor <= 0.0 {
        FALLBACK_MAX_LOAD_FACTOR
    } else {
        max_load_factor.clamp(MIN_MAX_LOAD_FACTOR, 1.0)
    }
}

#[inline(never)]
#[cold]
fn capacity_overflow(err: Error) -> ! {
    panic!("{err}")
}

/// A handle to an occupied slot of a table.
///
/// Positions are plain values that do not borrow the table. Each one records
/// the table's generation when it was created; erasing, clearing or rehashing
/// starts a new generation, after which the position is rejected with
/// [`Error::StalePosition`] instead of reading a slot that may now hold
/// something else. Positions obtained from one table must not be used with
/// another.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Position {
    index: usize,
    generation: u64,
}

impl Position {
    /// Returns the slot index this position points at.
    pub fn index(self) -> usize {
        self.index
    }
}

/// Start indices of the windows visited for a hash, covering every slot once.
struct ProbeSeq {
    pos: usize,
    remaining: usize,
    capacity: usize,
}

impl ProbeSeq {
    #[inline(always)]
    fn new(hash: u64, capacity: usize) -> Self {
        ProbeSeq {
            pos: hash as usize & (capacity - 1),
            remaining: capacity,
            capacity,
        }
    }
}

impl Iterator for ProbeSeq {
    type Item = usize;

    #[inline(always)]
    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }

        let start = self.pos;
        let width = GROUP_WIDTH.min(self.capacity - start);
        self.remaining = self.remaining.saturating_sub(width);
        self.pos = if start + width == self.capacity {
            0
        } else {
            start + width
        };
        Some(start)
    }
}

enum Probe {
    Found(usize),
    Vacant(usize),
}

/// Debug statistics for hash table analysis.
#[cfg(feature = "stats")]
#[derive(Debug, Clone)]
pub struct DebugStats {
    /// Number of values currently in the table
    pub populated: usize,
    /// Number of tombstones left behind by erased values
    pub tombstones: usize,
    /// Number of slots that were never used since the last rehash or clear
    pub empty: usize,
    /// Total number of slots allocated
    pub capacity: usize,
    /// Number of values the table holds before it grows
    pub growth_limit: usize,
    /// Load factor (populated / capacity)
    pub load_factor: f64,
    /// Configured maximum load factor
    pub max_load_factor: f32,
    /// Total memory in bytes used by the table
    pub total_bytes: usize,
    /// Bytes of slot storage not holding a value
    pub wasted_bytes: usize,
}

#[cfg(feature = "stats")]
impl DebugStats {
    /// Pretty-print the debug statistics.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("=== Hash Table Debug Statistics ===");
        println!(
            "Population: {}/{} ({:.2}% load factor, max {:.2}%)",
            self.populated,
            self.capacity,
            self.load_factor * 100.0,
            self.max_load_factor * 100.0
        );
        println!(
            "Slots: {} tombstones, {} empty, grows past {}",
            self.tombstones, self.empty, self.growth_limit
        );
        println!("Total Allocated: {} bytes", self.total_bytes);
        println!(
            "Memory: {} bytes wasted ({:.02}%)",
            self.wasted_bytes,
            if self.total_bytes == 0 {
                0.0
            } else {
                (self.wasted_bytes as f64 / self.total_bytes as f64) * 100.0
            }
        );
    }
}

/// Distribution of probe lengths over the values in a table.
///
/// `bins[n]` counts the values found `n` windows past their home window.
#[cfg(feature = "stats")]
#[derive(Debug, Clone)]
pub struct ProbeHistogram {
    /// Per-distance value counts.
    pub bins: Vec<usize>,
}

#[cfg(feature = "stats")]
impl ProbeHistogram {
    /// Pretty-prints the histogram horizontally using stdout.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        let max = *self.bins.iter().max().unwrap_or(&0);
        if max == 0 {
            println!("probe histogram: empty");
            return;
        }

        let max_bar = 60usize;
        let total_units = max_bar * 8;
        println!(
            "probe histogram ({} entries):",
            self.bins.iter().sum::<usize>()
        );

        let make_bar = |count: usize| -> alloc::string::String {
            if count == 0 {
                return alloc::string::String::new();
            }
            let units = ((count as u128 * total_units as u128).div_ceil(max as u128)) as usize;
            let mut bar = "█".repeat(units / 8);
            let partial = ['▏', '▎', '▍', '▌', '▋', '▊', '▉'];
            if units % 8 > 0 {
                bar.push(partial[units % 8 - 1]);
            }
            bar
        };

        for (distance, &count) in self.bins.iter().enumerate() {
            println!("{:>3} | {} ({})", distance, make_bar(count), count);
        }
    }
}

/// A flat hash table using 16-wide control byte groups.
///
/// `HashTable<V>` stores values of type `V` in place, without any per-value
/// allocation. The caller provides the hash value and an equality predicate
/// for each operation.
///
/// ## Performance Characteristics
///
/// - **Memory**: 1 control byte per slot, plus the size of `V`.
/// - **Growth**: capacity doubles when an insertion would push the load
///   factor past [`max_load_factor`](Self::max_load_factor); amortized O(1)
///   insertion.
///
/// ## Example
///
/// ```rust
/// # use core::hash::Hash;
/// # use core::hash::Hasher;
/// #
/// # use flat_hash_map::hash_table::Entry;
/// # use flat_hash_map::hash_table::HashTable;
/// # use siphasher::sip::SipHasher;
/// #
/// # #[derive(Debug, PartialEq)]
/// # struct Person {
/// #     id: u64,
/// #     name: String,
/// # }
/// #
/// # fn hash_id(id: u64) -> u64 {
/// #     let mut hasher = SipHasher::new();
/// #     id.hash(&mut hasher);
/// #     hasher.finish()
/// # }
///
/// let mut table = HashTable::new();
///
/// match table.entry(hash_id(123), |p: &Person| p.id == 123, |p| hash_id(p.id)) {
///     Entry::Vacant(entry) => {
///         entry.insert(Person {
///             id: 123,
///             name: "Alice".to_string(),
///         });
///     }
///     Entry::Occupied(_) => unreachable!("the table is empty"),
/// }
///
/// assert_eq!(table.len(), 1);
/// assert!(table.find(hash_id(123), |p| p.id == 123).is_some());
/// ```
pub struct HashTable<V> {
    storage: Storage<V>,
    populated: usize,
    tombstones: usize,
    growth_limit: usize,
    max_load_factor: f32,
    generation: u64,
}

impl<V> Debug for HashTable<V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HashTable")
            .field(
                "ctrl",
                &self
                    .storage
                    .ctrl()
                    .chunks(GROUP_WIDTH)
                    .map(|group| {
                        group
                            .iter()
                            .map(|&byte| match byte {
                                EMPTY => "..".to_string(),
                                DELETED => "xx".to_string(),
                                tag => format!("{tag:02x}"),
                            })
                            .collect::<Vec<_>>()
                            .join(" ")
                    })
                    .collect::<Vec<_>>(),
            )
            .field("populated", &self.populated)
            .field("tombstones", &self.tombstones)
            .field("capacity", &self.capacity())
            .field("max_load_factor", &self.max_load_factor)
            .finish()
    }
}

impl<V> Clone for HashTable<V>
where
    V: Clone,
{
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone_slots(),
            populated: self.populated,
            tombstones: self.tombstones,
            growth_limit: self.growth_limit,
            max_load_factor: self.max_load_factor,
            generation: self.generation,
        }
    }
}

impl<V> Default for HashTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> HashTable<V> {
    /// Creates an empty table with [`MIN_CAPACITY`] slots.
    pub fn new() -> Self {
        Self::with_capacity(MIN_CAPACITY)
    }

    /// Creates an empty table with at least `capacity` slots.
    ///
    /// The slot count is rounded up to a power of two no smaller than
    /// [`MIN_CAPACITY`]. At the default maximum load factor the table holds
    /// three quarters of its slots before it grows.
    ///
    /// # Panics
    ///
    /// Panics if the capacity overflows.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use flat_hash_map::hash_table::HashTable;
    /// #
    /// let table: HashTable<String> = HashTable::with_capacity(100);
    /// assert_eq!(table.capacity(), 128);
    ///
    /// let small: HashTable<String> = HashTable::with_capacity(0);
    /// assert_eq!(small.capacity(), 16);
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        Self::try_with_capacity(capacity).unwrap_or_else(|err| capacity_overflow(err))
    }

    /// Fallible version of [`with_capacity`](Self::with_capacity).
    pub fn try_with_capacity(capacity: usize) -> Result<Self, Error> {
        let capacity = normalize_capacity(capacity)?;
        Ok(Self::from_storage(
            Storage::try_new(capacity)?,
            DEFAULT_MAX_LOAD_FACTOR,
            0,
        ))
    }

    fn from_storage(storage: Storage<V>, max_load_factor: f32, generation: u64) -> Self {
        Self {
            growth_limit: growth_limit(storage.capacity(), max_load_factor),
            storage,
            populated: 0,
            tombstones: 0,
            max_load_factor,
            generation,
        }
    }

    /// Returns the number of values in the table.
    pub fn len(&self) -> usize {
        self.populated
    }

    /// Returns `true` if the table contains no values.
    pub fn is_empty(&self) -> bool {
        self.populated == 0
    }

    /// Returns the number of slots in the table.
    ///
    /// This is always a power of two. The table grows before
    /// `len() / capacity()` exceeds the maximum load factor.
    pub fn capacity(&self) -> usize {
        self.storage.capacity()
    }

    /// Returns `len() / capacity()`.
    pub fn load_factor(&self) -> f32 {
        self.populated as f32 / self.capacity() as f32
    }

    /// Returns the maximum load factor.
    pub fn max_load_factor(&self) -> f32 {
        self.max_load_factor
    }

    /// Sets the maximum load factor, rehashing into a larger table if the
    /// current load already exceeds it.
    ///
    /// A non-positive or NaN value is replaced with `0.25`. Positive values
    /// are clamped to `[MIN_MAX_LOAD_FACTOR, 1.0]`. Use
    /// [`try_set_max_load_factor`](Self::try_set_max_load_factor) to reject
    /// them instead.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use flat_hash_map::hash_table::HashTable;
    /// #
    /// let mut table: HashTable<u64> = HashTable::new();
    /// table.set_max_load_factor(-1.0, |&v| v);
    /// assert_eq!(table.max_load_factor(), 0.25);
    /// ```
    pub fn set_max_load_factor(&mut self, max_load_factor: f32, hasher: impl Fn(&V) -> u64) {
        let clamped = clamp_max_load_factor(max_load_factor);
        if clamped != max_load_factor {
            debug!(
                requested = max_load_factor,
                clamped, "clamping maximum load factor"
            );
        }
        self.apply_max_load_factor(clamped, hasher)
            .unwrap_or_else(|err| capacity_overflow(err));
    }

    /// Sets the maximum load factor, rejecting values outside of
    /// `[MIN_MAX_LOAD_FACTOR, 1.0]` with [`Error::InvalidLoadFactor`].
    pub fn try_set_max_load_factor(
        &mut self,
        max_load_factor: f32,
        hasher: impl Fn(&V) -> u64,
    ) -> Result<(), Error> {
        if clamp_max_load_factor(max_load_factor) != max_load_factor {
            return Err(Error::InvalidLoadFactor(max_load_factor));
        }
        self.apply_max_load_factor(max_load_factor, hasher)
    }

    fn apply_max_load_factor(
        &mut self,
        max_load_factor: f32,
        hasher: impl Fn(&V) -> u64,
    ) -> Result<(), Error> {
        self.max_load_factor = max_load_factor;
        self.growth_limit = growth_limit(self.capacity(), max_load_factor);
        if self.populated > self.growth_limit {
            self.grow(self.populated, hasher)?;
        }
        Ok(())
    }

    /// Finds a value by hash and equality predicate.
    ///
    /// This never allocates or mutates the table, and is safe to call on an
    /// empty table.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::Hash;
    /// # use core::hash::Hasher;
    /// #
    /// # use flat_hash_map::hash_table::HashTable;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # fn hash_u64(n: u64) -> u64 {
    /// #     let mut hasher = SipHasher::new();
    /// #     n.hash(&mut hasher);
    /// #     hasher.finish()
    /// # }
    /// #
    /// let mut table = HashTable::new();
    /// table
    ///     .entry(hash_u64(42), |&n: &u64| n == 42, |&n| hash_u64(n))
    ///     .or_insert(42);
    ///
    /// assert_eq!(table.find(hash_u64(42), |&n| n == 42), Some(&42));
    /// assert_eq!(table.find(hash_u64(99), |&n| n == 99), None);
    /// ```
    #[inline]
    pub fn find(&self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<&V> {
        let index = self.find_index(hash, eq)?;
        self.storage.get(index)
    }

    /// Finds a value by hash and equality predicate, returning a mutable
    /// reference.
    #[inline]
    pub fn find_mut(&mut self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<&mut V> {
        let index = self.find_index(hash, eq)?;
        self.storage.get_mut(index)
    }

    /// Finds a value by hash and equality predicate, returning its position.
    #[inline]
    pub fn find_position(&self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<Position> {
        let index = self.find_index(hash, eq)?;
        Some(self.position(index))
    }

    #[inline]
    fn find_index(&self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<usize> {
        if self.populated == 0 {
            return None;
        }

        let tag = hashtag(hash);
        let ctrl = self.storage.ctrl();
        for start in ProbeSeq::new(hash, self.capacity()) {
            let group = control::scan(ctrl, start, tag);
            for offset in group.matches {
                let index = start + offset;
                if self.storage.get(index).is_some_and(&eq) {
                    return Some(index);
                }
            }

            // Insertion never passes an empty slot, so the value cannot be
            // further along.
            if group.empty.any() {
                return None;
            }
        }

        None
    }

    /// Locates either the value matching `eq` or the slot a new value with
    /// this hash should be written to.
    ///
    /// The first tombstone on the probe sequence wins over any empty slot
    /// further along.
    fn probe_insert(&self, hash: u64, eq: impl Fn(&V) -> bool) -> Probe {
        let tag = hashtag(hash);
        let ctrl = self.storage.ctrl();
        let mut tombstone = None;

        for start in ProbeSeq::new(hash, self.capacity()) {
            let group = control::scan(ctrl, start, tag);
            for offset in group.matches {
                let index = start + offset;
                if self.storage.get(index).is_some_and(&eq) {
                    return Probe::Found(index);
                }
            }

            if tombstone.is_none() {
                tombstone = group.deleted.lowest().map(|offset| start + offset);
            }

            if let Some(offset) = group.empty.lowest() {
                return Probe::Vacant(tombstone.unwrap_or(start + offset));
            }
        }

        // No empty slot anywhere. The growth limit keeps `populated` below the
        // capacity, so a full pass has seen at least one tombstone.
        Probe::Vacant(tombstone.expect("a table below its growth limit has a free slot"))
    }

    #[inline]
    fn position(&self, index: usize) -> Position {
        Position {
            index,
            generation: self.generation,
        }
    }

    /// Checks that `position` belongs to the current generation and points at
    /// an occupied slot.
    fn resolve(&self, position: Position) -> Result<usize, Error> {
        if position.generation != self.generation || self.storage.get(position.index).is_none() {
            return Err(Error::StalePosition);
        }
        Ok(position.index)
    }

    /// Returns the position of the first occupied slot, or `None` if the
    /// table is empty.
    pub fn first(&self) -> Option<Position> {
        self.storage
            .next_full(0)
            .map(|index| self.position(index))
    }

    /// Returns the position of the next occupied slot after `position`, or
    /// `Ok(None)` once the end of the table is reached.
    pub fn next_position(&self, position: Position) -> Result<Option<Position>, Error> {
        let index = self.resolve(position)?;
        Ok(self
            .storage
            .next_full(index + 1)
            .map(|index| self.position(index)))
    }

    /// Returns the value at `position`.
    pub fn get_at(&self, position: Position) -> Result<&V, Error> {
        let index = self.resolve(position)?;
        self.storage.get(index).ok_or(Error::StalePosition)
    }

    /// Returns the value at `position` mutably.
    pub fn get_at_mut(&mut self, position: Position) -> Result<&mut V, Error> {
        let index = self.resolve(position)?;
        self.storage.get_mut(index).ok_or(Error::StalePosition)
    }

    /// Removes and returns the value at `position`.
    pub fn remove_at(&mut self, position: Position) -> Result<V, Error> {
        let index = self.resolve(position)?;
        self.take(index).ok_or(Error::StalePosition)
    }

    /// Drops the value at `position` in place and returns the position of the
    /// next occupied slot, or `Ok(None)` if it was the last one.
    ///
    /// The returned position belongs to the new generation, so it can be fed
    /// straight back into `erase_at` to erase while walking the table.
    pub fn erase_at(&mut self, position: Position) -> Result<Option<Position>, Error> {
        let index = self.resolve(position)?;
        self.destroy(index);
        Ok(self
            .storage
            .next_full(index + 1)
            .map(|index| self.position(index)))
    }

    /// Gets an entry for the given hash and equality predicate.
    ///
    /// An occupied entry never changes the table. For a vacant entry, if one
    /// more value would push the load factor past the maximum, the table grows
    /// first, rehashing every value with `hasher`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::Hash;
    /// # use core::hash::Hasher;
    /// #
    /// # use flat_hash_map::hash_table::Entry;
    /// # use flat_hash_map::hash_table::HashTable;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # fn hash_str(s: &str) -> u64 {
    /// #     let mut hasher = SipHasher::new();
    /// #     s.hash(&mut hasher);
    /// #     hasher.finish()
    /// # }
    /// #
    /// let mut table = HashTable::new();
    /// let hash = hash_str("hello");
    ///
    /// match table.entry(hash, |s: &String| s == "hello", |s| hash_str(s)) {
    ///     Entry::Vacant(entry) => {
    ///         entry.insert("hello".to_string());
    ///     }
    ///     Entry::Occupied(_) => unreachable!(),
    /// }
    ///
    /// let existing = table
    ///     .entry(hash, |s: &String| s == "hello", |s| hash_str(s))
    ///     .or_insert("other".to_string());
    /// assert_eq!(existing, "hello");
    /// ```
    #[inline]
    pub fn entry(
        &mut self,
        hash: u64,
        eq: impl Fn(&V) -> bool,
        hasher: impl Fn(&V) -> u64,
    ) -> Entry<'_, V> {
        if let Some(index) = self.find_index(hash, eq) {
            return Entry::Occupied(OccupiedEntry { table: self, index });
        }

        self.reserve_one(hasher);
        match self.probe_insert(hash, |_| false) {
            Probe::Vacant(index) => Entry::Vacant(VacantEntry {
                table: self,
                index,
                hash,
            }),
            Probe::Found(_) => unreachable!("a predicate that never matches found a value"),
        }
    }

    /// Removes and returns the value matching `eq`.
    pub fn remove(&mut self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<V> {
        let index = self.find_index(hash, eq)?;
        self.take(index)
    }

    /// Drops the value matching `eq` in place, leaving a tombstone.
    ///
    /// Returns the number of values erased, `0` or `1`.
    pub fn erase(&mut self, hash: u64, eq: impl Fn(&V) -> bool) -> usize {
        match self.find_index(hash, eq) {
            Some(index) => usize::from(self.destroy(index)),
            None => 0,
        }
    }

    fn occupy(&mut self, index: usize, hash: u64, value: V) -> &mut V {
        if self.storage.ctrl()[index] == DELETED {
            self.tombstones -= 1;
        }
        self.populated += 1;
        self.storage.construct_at(index, hashtag(hash), value)
    }

    fn take(&mut self, index: usize) -> Option<V> {
        let value = self.storage.take_at(index)?;
        self.populated -= 1;
        self.tombstones += 1;
        self.generation = self.generation.wrapping_add(1);
        Some(value)
    }

    fn destroy(&mut self, index: usize) -> bool {
        if !self.storage.destroy_at(index) {
            return false;
        }
        self.populated -= 1;
        self.tombstones += 1;
        self.generation = self.generation.wrapping_add(1);
        true
    }

    fn occupied(&self, index: usize) -> &V {
        self.storage
            .get(index)
            .expect("entry points at an occupied slot")
    }

    fn occupied_mut(&mut self, index: usize) -> &mut V {
        self.storage
            .get_mut(index)
            .expect("entry points at an occupied slot")
    }

    /// Reserves room for at least `additional` more values without growing.
    ///
    /// When growth is needed the new capacity is at least double the current
    /// one.
    ///
    /// # Panics
    ///
    /// Panics if the new capacity overflows.
    pub fn reserve(&mut self, additional: usize, hasher: impl Fn(&V) -> u64) {
        self.try_reserve(additional, hasher)
            .unwrap_or_else(|err| capacity_overflow(err));
    }

    /// Fallible version of [`reserve`](Self::reserve).
    pub fn try_reserve(
        &mut self,
        additional: usize,
        hasher: impl Fn(&V) -> u64,
    ) -> Result<(), Error> {
        let required = self
            .populated
            .checked_add(additional)
            .ok_or(Error::CapacityOverflow)?;
        if required > self.growth_limit {
            self.grow(required, hasher)?;
        }
        Ok(())
    }

    #[inline]
    fn reserve_one(&mut self, hasher: impl Fn(&V) -> u64) {
        if self.populated >= self.growth_limit {
            self.grow(self.populated + 1, hasher)
                .unwrap_or_else(|err| capacity_overflow(err));
        }
    }

    /// Rehashes into the smallest power of two that is at least double the
    /// current capacity and holds `items` values.
    #[cold]
    #[inline(never)]
    fn grow(&mut self, items: usize, hasher: impl Fn(&V) -> u64) -> Result<(), Error> {
        let doubled = self
            .capacity()
            .checked_mul(2)
            .ok_or(Error::CapacityOverflow)?;
        let capacity = capacity_for(items, self.max_load_factor)?.max(doubled);
        self.rehash(capacity, hasher)
    }

    /// Moves every value into a fresh, tombstone-free table of `capacity`
    /// slots.
    fn rehash(&mut self, capacity: usize, hasher: impl Fn(&V) -> u64) -> Result<(), Error> {
        debug_assert!(capacity.is_power_of_two());
        debug_assert!(growth_limit(capacity, self.max_load_factor) >= self.populated);

        let storage = Storage::try_new(capacity)?;
        trace!(
            old_capacity = self.capacity(),
            new_capacity = capacity,
            len = self.populated,
            tombstones = self.tombstones,
            "rehashing table"
        );

        let mut fresh = Self::from_storage(
            storage,
            self.max_load_factor,
            self.generation.wrapping_add(1),
        );

        // A panicking `hasher` drops the values already moved along with
        // `fresh`. The rest stay in `self`.
        for index in 0..self.capacity() {
            let Some(value) = self.storage.get(index) else {
                continue;
            };
            let hash = hasher(value);
            if let Some(value) = self.storage.take_at(index) {
                self.populated -= 1;
                self.tombstones += 1;
                fresh.insert_fresh(hash, value);
            }
        }

        *self = fresh;
        Ok(())
    }

    /// Inserts a value known to be absent through the ordinary placement path,
    /// without checking the growth limit.
    fn insert_fresh(&mut self, hash: u64, value: V) {
        debug_assert!(self.populated < self.growth_limit.max(1));
        match self.probe_insert(hash, |_| false) {
            Probe::Vacant(index) => {
                self.occupy(index, hash, value);
            }
            Probe::Found(_) => unreachable!("a predicate that never matches found a value"),
        }
    }

    /// Removes every value, keeping the allocated capacity.
    ///
    /// Tombstones are cleared as well.
    pub fn clear(&mut self) {
        self.storage.reset();
        self.populated = 0;
        self.tombstones = 0;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Keeps only the values for which `f` returns `true`, visiting them in
    /// ascending slot order.
    pub fn retain(&mut self, mut f: impl FnMut(&mut V) -> bool) {
        for index in 0..self.capacity() {
            let keep = match self.storage.get_mut(index) {
                Some(value) => f(value),
                None => continue,
            };
            if !keep {
                self.destroy(index);
            }
        }
    }

    /// Returns an iterator over all values in ascending slot order.
    ///
    /// The order depends on the hashes and the capacity, not on insertion
    /// order.
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            storage: &self.storage,
            index: 0,
            remaining: self.populated,
        }
    }

    /// Returns an iterator over mutable references to all values in ascending
    /// slot order.
    pub fn iter_mut(&mut self) -> IterMut<'_, V> {
        IterMut {
            remaining: self.populated,
            inner: self.storage.slots_mut(),
        }
    }

    /// Returns an iterator that removes and yields all values.
    ///
    /// The table is empty once the iterator is dropped, even if it was not
    /// exhausted.
    pub fn drain(&mut self) -> Drain<'_, V> {
        Drain {
            table: self,
            index: 0,
        }
    }

    /// Computes how many windows past its home window each value sits.
    #[cfg(feature = "stats")]
    pub fn probe_histogram(&self, hasher: impl Fn(&V) -> u64) -> ProbeHistogram {
        let capacity = self.capacity();
        let mut bins = Vec::new();

        let mut next = self.storage.next_full(0);
        while let Some(index) = next {
            next = self.storage.next_full(index + 1);
            let Some(value) = self.storage.get(index) else {
                continue;
            };

            let distance = ProbeSeq::new(hasher(value), capacity)
                .position(|start| (start..(start + GROUP_WIDTH).min(capacity)).contains(&index));
            if let Some(distance) = distance {
                if bins.len() <= distance {
                    bins.resize(distance + 1, 0);
                }
                bins[distance] += 1;
            }
        }

        ProbeHistogram { bins }
    }

    /// Returns occupancy and memory statistics.
    #[cfg(feature = "stats")]
    pub fn debug_stats(&self) -> DebugStats {
        let capacity = self.capacity();
        let empty = self
            .storage
            .ctrl()
            .iter()
            .filter(|&&byte| byte == EMPTY)
            .count();

        DebugStats {
            populated: self.populated,
            tombstones: self.tombstones,
            empty,
            capacity,
            growth_limit: self.growth_limit,
            load_factor: self.populated as f64 / capacity as f64,
            max_load_factor: self.max_load_factor,
            total_bytes: self.storage.allocated_bytes(),
            wasted_bytes: (capacity - self.populated) * core::mem::size_of::<V>(),
        }
    }
}

/// A view into a single entry in the table, which may be vacant or
/// occupied.
///
/// This enum is constructed from the [`entry`] method on [`HashTable`].
///
/// [`entry`]: HashTable::entry
pub enum Entry<'a, V> {
    /// A vacant entry - no value matched the predicate
    Vacant(VacantEntry<'a, V>),
    /// An occupied entry - a value matched the predicate
    Occupied(OccupiedEntry<'a, V>),
}

impl<'a, V> Entry<'a, V> {
    /// Inserts `default` if the entry is vacant and returns a mutable reference
    /// to the value in the entry.
    pub fn or_insert(self, default: V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default),
        }
    }

    /// Inserts the value returned by `default` if the entry is vacant and
    /// returns a mutable reference to the value in the entry.
    ///
    /// The closure is not called for an occupied entry.
    pub fn or_insert_with(self, default: impl FnOnce() -> V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default()),
        }
    }

    /// Applies `f` to an occupied entry and returns a reference to its value.
    /// Returns `None` for a vacant entry without inserting anything.
    pub fn and_modify(self, f: impl FnOnce(&mut V)) -> Option<&'a mut V> {
        match self {
            Entry::Occupied(entry) => {
                let value = entry.into_mut();
                f(value);
                Some(value)
            }
            Entry::Vacant(_) => None,
        }
    }

    /// Inserts `V::default()` if the entry is vacant and returns a mutable
    /// reference to the value in the entry.
    pub fn or_default(self) -> &'a mut V
    where
        V: Default,
    {
        self.or_insert_with(Default::default)
    }

    /// Returns the position of the entry's slot.
    ///
    /// For a vacant entry this is where the value will be written.
    pub fn position(&self) -> Position {
        match self {
            Entry::Occupied(entry) => entry.position(),
            Entry::Vacant(entry) => entry.position(),
        }
    }
}

/// A view into a vacant entry in the table.
///
/// The slot is already chosen: the first tombstone on the probe sequence, or
/// else the first empty slot.
pub struct VacantEntry<'a, V> {
    table: &'a mut HashTable<V>,
    index: usize,
    hash: u64,
}

impl<'a, V> VacantEntry<'a, V> {
    /// Writes `value` into the slot and returns a mutable reference to it.
    pub fn insert(self, value: V) -> &'a mut V {
        self.table.occupy(self.index, self.hash, value)
    }

    /// Returns the position the value will occupy once inserted.
    ///
    /// The position is valid after [`insert`](Self::insert).
    pub fn position(&self) -> Position {
        self.table.position(self.index)
    }
}

/// A view into an occupied entry in the table.
pub struct OccupiedEntry<'a, V> {
    table: &'a mut HashTable<V>,
    index: usize,
}

impl<'a, V> OccupiedEntry<'a, V> {
    /// Gets a reference to the value in the entry.
    pub fn get(&self) -> &V {
        self.table.occupied(self.index)
    }

    /// Gets a mutable reference to the value in the entry.
    pub fn get_mut(&mut self) -> &mut V {
        self.table.occupied_mut(self.index)
    }

    /// Converts the entry into a mutable reference to the value with the
    /// lifetime of the table borrow.
    pub fn into_mut(self) -> &'a mut V {
        self.table.occupied_mut(self.index)
    }

    /// Returns the position of the value.
    pub fn position(&self) -> Position {
        self.table.position(self.index)
    }

    /// Removes the value from the table, leaving a tombstone.
    pub fn remove(self) -> V {
        self.table
            .take(self.index)
            .expect("entry points at an occupied slot")
    }
}

/// An iterator over the values of a [`HashTable`] in ascending slot order.
///
/// This struct is created by the [`iter`] method on [`HashTable`].
///
/// [`iter`]: HashTable::iter
pub struct Iter<'a, V> {
    storage: &'a Storage<V>,
    index: usize,
    remaining: usize,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        let storage = self.storage;
        let index = storage.next_full(self.index)?;
        self.index = index + 1;
        self.remaining = self.remaining.saturating_sub(1);
        storage.get(index)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V> ExactSizeIterator for Iter<'_, V> {}

impl<V> FusedIterator for Iter<'_, V> {}

impl<V> Clone for Iter<'_, V> {
    fn clone(&self) -> Self {
        Iter {
            storage: self.storage,
            index: self.index,
            remaining: self.remaining,
        }
    }
}

/// A mutable iterator over the values of a [`HashTable`].
///
/// This struct is created by the [`iter_mut`] method on [`HashTable`].
///
/// [`iter_mut`]: HashTable::iter_mut
pub struct IterMut<'a, V> {
    inner: SlotsMut<'a, V>,
    remaining: usize,
}

impl<'a, V> Iterator for IterMut<'a, V> {
    type Item = &'a mut V;

    fn next(&mut self) -> Option<Self::Item> {
        let (_, value) = self.inner.next()?;
        self.remaining = self.remaining.saturating_sub(1);
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V> ExactSizeIterator for IterMut<'_, V> {}

impl<V> FusedIterator for IterMut<'_, V> {}

/// A draining iterator over the values of a [`HashTable`].
///
/// This struct is created by the [`drain`] method on [`HashTable`].
///
/// [`drain`]: HashTable::drain
pub struct Drain<'a, V> {
    table: &'a mut HashTable<V>,
    index: usize,
}

impl<V> Iterator for Drain<'_, V> {
    type Item = V;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.table.storage.next_full(self.index)?;
        self.index = index + 1;
        self.table.take(index)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.table.len(), Some(self.table.len()))
    }
}

impl<V> ExactSizeIterator for Drain<'_, V> {}

impl<V> Drop for Drain<'_, V> {
    fn drop(&mut self) {
        for _ in &mut *self {}
        self.table.clear();
    }
}

/// An owning iterator over the values of a [`HashTable`].
pub struct IntoIter<V> {
    table: HashTable<V>,
    index: usize,
}

impl<V> Iterator for IntoIter<V> {
    type Item = V;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.table.storage.next_full(self.index)?;
        self.index = index + 1;
        self.table.take(index)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.table.len(), Some(self.table.len()))
    }
}

impl<V> ExactSizeIterator for IntoIter<V> {}

impl<V> FusedIterator for IntoIter<V> {}

impl<V> IntoIterator for HashTable<V> {
    type Item = V;
    type IntoIter = IntoIter<V>;

    fn into_iter(self) -> IntoIter<V> {
        IntoIter {
            table: self,
            index: 0,
        }
    }
}

impl<'a, V> IntoIterator for &'a HashTable<V> {
    type Item = &'a V;
    type IntoIter = Iter<'a, V>;

    fn into_iter(self) -> Iter<'a, V> {
        self.iter()
    }
}

impl<'a, V> IntoIterator for &'a mut HashTable<V> {
    type Item = &'a mut V;
    type IntoIter = IterMut<'a, V>;

    fn into_iter(self) -> IterMut<'a, V> {
        self.iter_mut()
    }
}
