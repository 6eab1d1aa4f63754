use core::borrow::Borrow;
use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;
use core::iter::FusedIterator;
use core::ops::Index;

use crate::error::Error;
use crate::hash_table;
use crate::hash_table::Entry as TableEntry;
use crate::hash_table::HashTable;
use crate::hash_table::Position;

cfg_if::cfg_if! {
    if #[cfg(feature = "foldhash")] {
        /// The hasher builder used by [`FlatHashMap`] unless another one is
        /// supplied.
        pub type DefaultHashBuilder = foldhash::fast::RandomState;
    } else if #[cfg(feature = "std")] {
        /// The hasher builder used by [`FlatHashMap`] unless another one is
        /// supplied.
        pub type DefaultHashBuilder = std::hash::RandomState;
    } else {
        /// Placeholder for the default hasher builder when neither `foldhash`
        /// nor `std` is enabled. It cannot be constructed, so a hasher builder
        /// has to be passed to [`FlatHashMap::with_hasher`].
        #[derive(Clone, Copy, Debug)]
        pub enum DefaultHashBuilder {}
    }
}

#[inline]
fn make_hasher<K, V, S>(hash_builder: &S) -> impl Fn(&(K, V)) -> u64 + '_
where
    K: Hash,
    S: BuildHasher,
{
    move |(k, _)| hash_builder.hash_one(k)
}

#[inline]
fn equivalent_key<Q, K, V>(key: &Q) -> impl Fn(&(K, V)) -> bool + '_
where
    K: Borrow<Q>,
    Q: ?Sized + Eq,
{
    move |(k, _)| Q::eq(key, k.borrow())
}

/// A hash map backed by a flat, open-addressing [`HashTable`].
///
/// `FlatHashMap<K, V, S>` stores `(K, V)` pairs inline in one allocation
/// alongside a control byte per slot, and hashes keys with the hasher builder
/// `S`. Lookups compare 16 control bytes at a time against the low 7 bits of
/// the key's hash, so most probes touch a single cache line of metadata.
///
/// Unlike `std::collections::HashMap`, [`insert`](Self::insert) never
/// overwrites: the first value stored for a key wins. Use
/// [`entry`](Self::entry) to update in place.
///
/// # Performance Characteristics
///
/// - **Memory**: 1 control byte per slot, plus the size of `(K, V)`.
/// - **Load**: the table doubles before `len() / capacity()` would exceed the
///   maximum load factor (0.75 by default). Erased slots become tombstones
///   that are reused by later insertions and dropped on the next rehash.
///
/// # Examples
///
/// ```rust
/// use flat_hash_map::FlatHashMap;
///
/// let mut map = FlatHashMap::new();
/// map.insert("apple", 3);
/// map.insert("pear", 5);
///
/// assert_eq!(map.get("apple"), Some(&3));
/// assert_eq!(map.erase("pear"), 1);
/// assert_eq!(map.len(), 1);
/// ```
pub struct FlatHashMap<K, V, S = DefaultHashBuilder> {
    table: HashTable<(K, V)>,
    hash_builder: S,
}

impl<K, V, S> Clone for FlatHashMap<K, V, S>
where
    K: Clone,
    V: Clone,
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone(),
            hash_builder: self.hash_builder.clone(),
        }
    }
}

impl<K, V, S> Debug for FlatHashMap<K, V, S>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

#[cfg(any(feature = "foldhash", feature = "std"))]
impl<K, V> FlatHashMap<K, V, DefaultHashBuilder> {
    /// Creates an empty map using the default hasher builder.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use flat_hash_map::FlatHashMap;
    /// #
    /// let map: FlatHashMap<i32, String> = FlatHashMap::new();
    /// assert!(map.is_empty());
    /// assert_eq!(map.capacity(), 16);
    /// ```
    pub fn new() -> Self {
        Self::with_hasher(DefaultHashBuilder::default())
    }

    /// Creates an empty map with at least `capacity` slots using the default
    /// hasher builder.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use flat_hash_map::FlatHashMap;
    /// #
    /// let map: FlatHashMap<i32, String> = FlatHashMap::with_capacity(100);
    /// assert_eq!(map.capacity(), 128);
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, DefaultHashBuilder::default())
    }
}

impl<K, V, S> FlatHashMap<K, V, S> {
    /// Creates an empty map with the given hasher builder.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::BuildHasher;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # use flat_hash_map::FlatHashMap;
    /// #
    /// # struct SimpleHasher;
    /// # impl BuildHasher for SimpleHasher {
    /// #     type Hasher = SipHasher;
    /// #
    /// #     fn build_hasher(&self) -> Self::Hasher {
    /// #         SipHasher::new()
    /// #     }
    /// # }
    /// #
    /// let mut map = FlatHashMap::with_hasher(SimpleHasher);
    /// map.insert(1, "a");
    /// assert_eq!(map.get(&1), Some(&"a"));
    /// ```
    pub fn with_hasher(hash_builder: S) -> Self {
        Self::with_capacity_and_hasher(0, hash_builder)
    }

    /// Creates an empty map with at least `capacity` slots and the given
    /// hasher builder.
    ///
    /// The slot count is rounded up to a power of two no smaller than 16.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        Self {
            table: HashTable::with_capacity(capacity),
            hash_builder,
        }
    }

    /// Returns a reference to the map's hasher builder.
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    /// Returns the number of elements in the map.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the map contains no elements.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the number of slots in the map.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use flat_hash_map::FlatHashMap;
    /// #
    /// let mut map = FlatHashMap::new();
    /// for i in 0..12 {
    ///     map.insert(i, i);
    /// }
    /// assert_eq!(map.capacity(), 16);
    ///
    /// map.insert(12, 12);
    /// assert_eq!(map.capacity(), 32);
    /// ```
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Returns `len() / capacity()`.
    pub fn load_factor(&self) -> f32 {
        self.table.load_factor()
    }

    /// Returns the maximum load factor.
    pub fn max_load_factor(&self) -> f32 {
        self.table.max_load_factor()
    }

    /// Removes all elements from the map, keeping its capacity.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Returns an iterator over the key-value pairs of the map.
    ///
    /// Pairs are yielded in slot order, which depends on the hashes and the
    /// capacity rather than on insertion order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: self.table.iter(),
        }
    }

    /// Returns an iterator over the key-value pairs of the map, with mutable
    /// references to the values.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            inner: self.table.iter_mut(),
        }
    }

    /// Returns an iterator over the keys of the map.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    /// Returns an iterator over the values of the map.
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    /// Returns an iterator over mutable references to the values of the map.
    pub fn values_mut(&mut self) -> ValuesMut<'_, K, V> {
        ValuesMut {
            inner: self.iter_mut(),
        }
    }

    /// Removes all pairs from the map, returning them as an iterator.
    ///
    /// The map is empty once the iterator is dropped.
    pub fn drain(&mut self) -> Drain<'_, K, V> {
        Drain {
            inner: self.table.drain(),
        }
    }

    /// Keeps only the pairs for which `f` returns `true`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use flat_hash_map::FlatHashMap;
    /// #
    /// let mut map: FlatHashMap<i32, i32> = (0..8).map(|i| (i, i * 10)).collect();
    /// map.retain(|&k, _| k % 2 == 0);
    /// assert_eq!(map.len(), 4);
    /// ```
    pub fn retain<F>(&mut self, mut f: F)
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        self.table.retain(|(k, v)| f(&*k, v));
    }

    /// Returns the position of the first pair in slot order, or `None` if the
    /// map is empty.
    pub fn first(&self) -> Option<Position> {
        self.table.first()
    }

    /// Returns the position after `position` in slot order, or `Ok(None)` at
    /// the end of the map.
    pub fn next_position(&self, position: Position) -> Result<Option<Position>, Error> {
        self.table.next_position(position)
    }

    /// Returns the pair at `position`.
    pub fn get_at(&self, position: Position) -> Result<(&K, &V), Error> {
        self.table.get_at(position).map(|(k, v)| (k, v))
    }

    /// Returns the pair at `position` with a mutable reference to the value.
    pub fn get_at_mut(&mut self, position: Position) -> Result<(&K, &mut V), Error> {
        self.table
            .get_at_mut(position)
            .map(|(k, v)| (&*k, v))
    }

    /// Erases the pair at `position` and returns the position of the next
    /// pair, or `Ok(None)` if it was the last one.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use flat_hash_map::FlatHashMap;
    /// #
    /// let mut map: FlatHashMap<u32, u32> = (0..10).map(|i| (i, i)).collect();
    ///
    /// let mut position = map.first();
    /// while let Some(current) = position {
    ///     let (&k, _) = map.get_at(current).unwrap();
    ///     position = if k % 2 == 0 {
    ///         map.erase_at(current).unwrap()
    ///     } else {
    ///         map.next_position(current).unwrap()
    ///     };
    /// }
    ///
    /// assert_eq!(map.len(), 5);
    /// ```
    pub fn erase_at(&mut self, position: Position) -> Result<Option<Position>, Error> {
        self.table.erase_at(position)
    }
}

impl<K, V, S> FlatHashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Inserts a key-value pair if the key is not already present.
    ///
    /// Returns the position of the pair stored under `key` and whether the
    /// new pair was inserted. An existing value is left untouched and the
    /// rejected `key` and `value` are dropped.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use flat_hash_map::FlatHashMap;
    /// #
    /// let mut map = FlatHashMap::new();
    /// let (_, inserted) = map.insert(37, "a");
    /// assert!(inserted);
    ///
    /// let (position, inserted) = map.insert(37, "b");
    /// assert!(!inserted);
    /// assert_eq!(map.get_at(position), Ok((&37, &"a")));
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> (Position, bool) {
        let hash = self.hash_builder.hash_one(&key);
        match self.table.entry(
            hash,
            equivalent_key(&key),
            make_hasher(&self.hash_builder),
        ) {
            TableEntry::Occupied(entry) => (entry.position(), false),
            TableEntry::Vacant(entry) => {
                let position = entry.position();
                entry.insert((key, value));
                (position, true)
            }
        }
    }

    /// Returns the position of the pair stored under `key`.
    pub fn find<Q>(&self, key: &Q) -> Option<Position>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let hash = self.hash_builder.hash_one(key);
        self.table.find_position(hash, equivalent_key(key))
    }

    /// Returns a reference to the value stored under `key`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use flat_hash_map::FlatHashMap;
    /// #
    /// let mut map = FlatHashMap::new();
    /// map.insert("key".to_string(), 1);
    /// assert_eq!(map.get("key"), Some(&1));
    /// assert_eq!(map.get("missing"), None);
    /// ```
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let hash = self.hash_builder.hash_one(key);
        self.table
            .find(hash, equivalent_key(key))
            .map(|(_, v)| v)
    }

    /// Returns a mutable reference to the value stored under `key`.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let hash = self.hash_builder.hash_one(key);
        self.table
            .find_mut(hash, equivalent_key(key))
            .map(|(_, v)| v)
    }

    /// Returns the stored key and value for `key`.
    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let hash = self.hash_builder.hash_one(key);
        self.table
            .find(hash, equivalent_key(key))
            .map(|(k, v)| (k, v))
    }

    /// Returns the value stored under `key`, or [`Error::KeyNotFound`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use flat_hash_map::Error;
    /// # use flat_hash_map::FlatHashMap;
    /// #
    /// let mut map = FlatHashMap::new();
    /// map.insert(1, "one");
    /// assert_eq!(map.at(&1), Ok(&"one"));
    /// assert_eq!(map.at(&2), Err(Error::KeyNotFound));
    /// ```
    pub fn at<Q>(&self, key: &Q) -> Result<&V, Error>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.get(key).ok_or(Error::KeyNotFound)
    }

    /// Returns the value stored under `key` mutably, or
    /// [`Error::KeyNotFound`].
    pub fn at_mut<Q>(&mut self, key: &Q) -> Result<&mut V, Error>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.get_mut(key).ok_or(Error::KeyNotFound)
    }

    /// Returns `true` if the map contains `key`.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.find(key).is_some()
    }

    /// Returns the number of pairs stored under `key`, `0` or `1`.
    pub fn count<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        usize::from(self.contains_key(key))
    }

    /// Removes the pair stored under `key` and returns its value.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.remove_entry(key).map(|(_, v)| v)
    }

    /// Removes the pair stored under `key` and returns it.
    pub fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let hash = self.hash_builder.hash_one(key);
        self.table.remove(hash, equivalent_key(key))
    }

    /// Drops the pair stored under `key` in place and returns the number of
    /// pairs erased, `0` or `1`.
    pub fn erase<Q>(&mut self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let hash = self.hash_builder.hash_one(key);
        self.table.erase(hash, equivalent_key(key))
    }

    /// Gets the entry for `key` for in-place manipulation.
    ///
    /// The map only grows when `key` is absent.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use flat_hash_map::FlatHashMap;
    /// #
    /// let mut counts = FlatHashMap::new();
    /// for word in ["a", "b", "a"] {
    ///     *counts.entry(word).or_insert(0) += 1;
    /// }
    /// assert_eq!(counts.get("a"), Some(&2));
    /// assert_eq!(counts.get("b"), Some(&1));
    /// ```
    pub fn entry(&mut self, key: K) -> Entry<'_, K, V> {
        let hash = self.hash_builder.hash_one(&key);
        match self.table.entry(
            hash,
            equivalent_key(&key),
            make_hasher(&self.hash_builder),
        ) {
            TableEntry::Occupied(entry) => Entry::Occupied(OccupiedEntry { entry }),
            TableEntry::Vacant(entry) => Entry::Vacant(VacantEntry { entry, key }),
        }
    }

    /// Returns the value stored under `key`, inserting `V::default()` first
    /// if the key is absent.
    pub fn get_or_default(&mut self, key: K) -> &mut V
    where
        V: Default,
    {
        self.entry(key).or_default()
    }

    /// Reserves room for at least `additional` more pairs without growing.
    ///
    /// # Panics
    ///
    /// Panics if the new capacity overflows.
    pub fn reserve(&mut self, additional: usize) {
        self.table
            .reserve(additional, make_hasher(&self.hash_builder));
    }

    /// Fallible version of [`reserve`](Self::reserve).
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), Error> {
        self.table
            .try_reserve(additional, make_hasher(&self.hash_builder))
    }

    /// Sets the maximum load factor, growing the map if the current load
    /// exceeds it.
    ///
    /// Non-positive or NaN values are replaced with `0.25`. Positive values
    /// are clamped to `[MIN_MAX_LOAD_FACTOR, 1.0]`, see
    /// [`hash_table::MIN_MAX_LOAD_FACTOR`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use flat_hash_map::FlatHashMap;
    /// #
    /// let mut map: FlatHashMap<u32, u32> = (0..12).map(|i| (i, i)).collect();
    /// assert_eq!(map.capacity(), 16);
    ///
    /// map.set_max_load_factor(0.5);
    /// assert_eq!(map.capacity(), 32);
    ///
    /// map.set_max_load_factor(0.0);
    /// assert_eq!(map.max_load_factor(), 0.25);
    /// ```
    pub fn set_max_load_factor(&mut self, max_load_factor: f32) {
        self.table
            .set_max_load_factor(max_load_factor, make_hasher(&self.hash_builder));
    }

    /// Sets the maximum load factor, rejecting values outside of
    /// `[MIN_MAX_LOAD_FACTOR, 1.0]` with [`Error::InvalidLoadFactor`].
    pub fn try_set_max_load_factor(&mut self, max_load_factor: f32) -> Result<(), Error> {
        self.table
            .try_set_max_load_factor(max_load_factor, make_hasher(&self.hash_builder))
    }

    /// Returns occupancy and memory statistics of the underlying table.
    #[cfg(feature = "stats")]
    pub fn debug_stats(&self) -> hash_table::DebugStats {
        self.table.debug_stats()
    }

    /// Returns the probe length distribution of the stored keys.
    #[cfg(feature = "stats")]
    pub fn probe_histogram(&self) -> hash_table::ProbeHistogram {
        self.table
            .probe_histogram(make_hasher(&self.hash_builder))
    }
}

impl<K, V, S> Default for FlatHashMap<K, V, S>
where
    S: Default,
{
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<K, V, S> PartialEq for FlatHashMap<K, V, S>
where
    K: Hash + Eq,
    V: PartialEq,
    S: BuildHasher,
{
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(k, v)| other.get(k).is_some_and(|ov| v == ov))
    }
}

impl<K, V, S> Eq for FlatHashMap<K, V, S>
where
    K: Hash + Eq,
    V: Eq,
    S: BuildHasher,
{
}

impl<K, Q, V, S> Index<&Q> for FlatHashMap<K, V, S>
where
    K: Hash + Eq + Borrow<Q>,
    Q: ?Sized + Hash + Eq,
    S: BuildHasher,
{
    type Output = V;

    /// Returns the value stored under `key`.
    ///
    /// # Panics
    ///
    /// Panics if the key is not present in the map.
    fn index(&self, key: &Q) -> &V {
        match self.get(key) {
            Some(value) => value,
            None => panic!("{}", Error::KeyNotFound),
        }
    }
}

impl<K, V, S> Extend<(K, V)> for FlatHashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        let iter = iter.into_iter();
        // Duplicates in the input would over-reserve an empty map, so only a
        // part of the hint is trusted once it already holds pairs.
        let reserve = if self.is_empty() {
            iter.size_hint().0
        } else {
            iter.size_hint().0.div_ceil(2)
        };
        self.reserve(reserve);
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<'a, K, V, S> Extend<(&'a K, &'a V)> for FlatHashMap<K, V, S>
where
    K: Hash + Eq + Copy,
    V: Copy,
    S: BuildHasher,
{
    fn extend<T: IntoIterator<Item = (&'a K, &'a V)>>(&mut self, iter: T) {
        self.extend(iter.into_iter().map(|(&k, &v)| (k, v)));
    }
}

impl<K, V, S> FromIterator<(K, V)> for FlatHashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = Self::with_hasher(S::default());
        map.extend(iter);
        map
    }
}

impl<K, V, S, const N: usize> From<[(K, V); N]> for FlatHashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    /// Builds a map from an array of pairs. The first pair for a key wins.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use flat_hash_map::FlatHashMap;
    /// #
    /// let map: FlatHashMap<_, _> = FlatHashMap::from([(1, "a"), (2, "b"), (1, "c")]);
    /// assert_eq!(map.len(), 2);
    /// assert_eq!(map[&1], "a");
    /// ```
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

/// A view into a single entry in the map, which may either be vacant or
/// occupied.
///
/// This enum is constructed from the [`entry`] method on [`FlatHashMap`].
///
/// [`entry`]: FlatHashMap::entry
pub enum Entry<'a, K, V> {
    /// A vacant entry.
    Vacant(VacantEntry<'a, K, V>),
    /// An occupied entry.
    Occupied(OccupiedEntry<'a, K, V>),
}

impl<'a, K, V> Entry<'a, K, V> {
    /// Inserts a default value if the entry is vacant and returns a mutable
    /// reference.
    pub fn or_insert(self, default: V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default),
        }
    }

    /// Inserts a value computed from a closure if the entry is vacant and
    /// returns a mutable reference.
    pub fn or_insert_with<F>(self, default: F) -> &'a mut V
    where
        F: FnOnce() -> V,
    {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default()),
        }
    }

    /// Provides in-place mutable access to an occupied entry before any
    /// potential inserts.
    pub fn and_modify<F>(self, f: F) -> Self
    where
        F: FnOnce(&mut V),
    {
        match self {
            Entry::Occupied(mut entry) => {
                f(entry.get_mut());
                Entry::Occupied(entry)
            }
            Entry::Vacant(entry) => Entry::Vacant(entry),
        }
    }

    /// Returns a reference to this entry's key.
    pub fn key(&self) -> &K {
        match self {
            Entry::Occupied(entry) => entry.key(),
            Entry::Vacant(entry) => entry.key(),
        }
    }

    /// Returns the position of the entry's slot.
    pub fn position(&self) -> Position {
        match self {
            Entry::Occupied(entry) => entry.position(),
            Entry::Vacant(entry) => entry.position(),
        }
    }
}

impl<'a, K, V> Entry<'a, K, V>
where
    V: Default,
{
    /// Inserts the default value if the entry is vacant and returns a mutable
    /// reference.
    pub fn or_default(self) -> &'a mut V {
        self.or_insert_with(Default::default)
    }
}

/// A view into a vacant entry in the map.
pub struct VacantEntry<'a, K, V> {
    entry: hash_table::VacantEntry<'a, (K, V)>,
    key: K,
}

impl<'a, K, V> VacantEntry<'a, K, V> {
    /// Gets a reference to the key that would be used when inserting a value.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Take ownership of the key.
    pub fn into_key(self) -> K {
        self.key
    }

    /// Returns the position the pair will occupy once inserted.
    pub fn position(&self) -> Position {
        self.entry.position()
    }

    /// Inserts the value into the map and returns a mutable reference to it.
    pub fn insert(self, value: V) -> &'a mut V {
        &mut self.entry.insert((self.key, value)).1
    }
}

/// A view into an occupied entry in the map.
pub struct OccupiedEntry<'a, K, V> {
    entry: hash_table::OccupiedEntry<'a, (K, V)>,
}

impl<'a, K, V> OccupiedEntry<'a, K, V> {
    /// Gets a reference to the key in the entry.
    pub fn key(&self) -> &K {
        &self.entry.get().0
    }

    /// Gets a reference to the value in the entry.
    pub fn get(&self) -> &V {
        &self.entry.get().1
    }

    /// Gets a mutable reference to the value in the entry.
    pub fn get_mut(&mut self) -> &mut V {
        &mut self.entry.get_mut().1
    }

    /// Converts the entry into a mutable reference to the value.
    pub fn into_mut(self) -> &'a mut V {
        &mut self.entry.into_mut().1
    }

    /// Returns the position of the pair.
    pub fn position(&self) -> Position {
        self.entry.position()
    }

    /// Replaces the value in the entry and returns the old value.
    pub fn insert(&mut self, value: V) -> V {
        core::mem::replace(&mut self.entry.get_mut().1, value)
    }

    /// Removes the entry from the map and returns the value.
    pub fn remove(self) -> V {
        self.entry.remove().1
    }

    /// Removes the entry from the map and returns the key and value.
    pub fn remove_entry(self) -> (K, V) {
        self.entry.remove()
    }
}

/// An iterator over the key-value pairs of a `FlatHashMap`.
pub struct Iter<'a, K, V> {
    inner: hash_table::Iter<'a, (K, V)>,
}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Iter {
            inner: self.inner.clone(),
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, v)| (k, v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<K, V> FusedIterator for Iter<'_, K, V> {}

/// A mutable iterator over the key-value pairs of a `FlatHashMap`.
pub struct IterMut<'a, K, V> {
    inner: hash_table::IterMut<'a, (K, V)>,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, v)| (&*k, v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for IterMut<'_, K, V> {}

impl<K, V> FusedIterator for IterMut<'_, K, V> {}

/// An iterator over the keys of a `FlatHashMap`.
pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Keys<'_, K, V> {}

/// An iterator over the values of a `FlatHashMap`.
pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Values<'_, K, V> {}

/// A mutable iterator over the values of a `FlatHashMap`.
pub struct ValuesMut<'a, K, V> {
    inner: IterMut<'a, K, V>,
}

impl<'a, K, V> Iterator for ValuesMut<'a, K, V> {
    type Item = &'a mut V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for ValuesMut<'_, K, V> {}

/// A draining iterator over the key-value pairs of a `FlatHashMap`.
pub struct Drain<'a, K, V> {
    inner: hash_table::Drain<'a, (K, V)>,
}

impl<K, V> Iterator for Drain<'_, K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Drain<'_, K, V> {}

/// An owning iterator over the key-value pairs of a `FlatHashMap`.
pub struct IntoIter<K, V> {
    inner: hash_table::IntoIter<(K, V)>,
}

impl<K, V> Iterator for IntoIter<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for IntoIter<K, V> {}

impl<K, V> FusedIterator for IntoIter<K, V> {}

impl<K, V, S> IntoIterator for FlatHashMap<K, V, S> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(self) -> IntoIter<K, V> {
        IntoIter {
            inner: self.table.into_iter(),
        }
    }
}

impl<'a, K, V, S> IntoIterator for &'a FlatHashMap<K, V, S> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}

impl<'a, K, V, S> IntoIterator for &'a mut FlatHashMap<K, V, S> {
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V>;

    fn into_iter(self) -> IterMut<'a, K, V> {
        self.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use alloc::format;
    use alloc::string::String;
    use alloc::string::ToString;
    use alloc::vec::Vec;
    use core::hash::BuildHasher;

    use rand::TryRngCore;
    use rand::rngs::OsRng;
    use siphasher::sip::SipHasher;

    use super::*;

    #[derive(Clone)]
    struct SipHashBuilder {
        k1: u64,
        k2: u64,
    }

    impl BuildHasher for SipHashBuilder {
        type Hasher = SipHasher;

        fn build_hasher(&self) -> Self::Hasher {
            SipHasher::new_with_keys(self.k1, self.k2)
        }
    }

    impl Default for SipHashBuilder {
        fn default() -> Self {
            let mut rng = OsRng;
            Self {
                k1: rng.try_next_u64().unwrap_or(0),
                k2: rng.try_next_u64().unwrap_or(0),
            }
        }
    }

    type SipMap<K, V> = FlatHashMap<K, V, SipHashBuilder>;

    #[test]
    fn new_and_with_hasher() {
        let map: SipMap<i32, String> = FlatHashMap::default();
        assert!(map.is_empty());
        assert_eq!(map.len(), 0);
        assert_eq!(map.capacity(), 16);
        assert_eq!(map.max_load_factor(), 0.75);

        let map2 = FlatHashMap::<i32, String, _>::with_hasher(SipHashBuilder::default());
        assert!(map2.is_empty());
    }

    #[test]
    fn with_capacity_and_hasher() {
        let map = SipMap::<i32, String>::with_capacity_and_hasher(200, SipHashBuilder::default());
        assert_eq!(map.capacity(), 256);
        assert!(map.is_empty());
    }

    #[test]
    fn insert_and_get() {
        let mut map = SipMap::default();
        for i in 0..100 {
            let (_, inserted) = map.insert(i, i * 2);
            assert!(inserted);
        }
        assert_eq!(map.len(), 100);
        for i in 0..100 {
            assert_eq!(map.get(&i), Some(&(i * 2)));
        }
        assert_eq!(map.get(&100), None);
    }

    #[test]
    fn insert_keeps_first_value() {
        let mut map = SipMap::default();
        let (first, inserted) = map.insert("k", 1);
        assert!(inserted);

        let (second, inserted) = map.insert("k", 2);
        assert!(!inserted);
        assert_eq!(first, second);
        assert_eq!(map.get("k"), Some(&1));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn grows_through_twenty_keys() {
        let mut map = SipMap::default();
        assert_eq!(map.capacity(), 16);
        for k in 1..=20 {
            map.insert(k, k * 100);
            assert!(map.load_factor() <= map.max_load_factor());
        }

        assert!(map.capacity() > 16);
        assert_eq!(map.len(), 20);
        assert_eq!(map.get(&7), Some(&700));
        assert_eq!(map.get(&20), Some(&2000));
    }

    #[test]
    fn erase_then_insert_other_key() {
        let mut map = SipMap::with_capacity_and_hasher(16, SipHashBuilder::default());
        map.insert("a".to_string(), 1);
        assert_eq!(map.erase("a"), 1);
        map.insert("b".to_string(), 2);

        assert_eq!(map.len(), 1);
        assert!(!map.contains_key("a"));
        assert_eq!(map.get("b"), Some(&2));
        assert_eq!(map.iter().count(), 1);
    }

    #[test]
    fn erase_absent_key() {
        let mut map: SipMap<u32, u32> = SipMap::default();
        assert_eq!(map.erase(&1), 0);
        map.insert(1, 1);
        assert_eq!(map.erase(&2), 0);
        assert_eq!(map.erase(&1), 1);
        assert_eq!(map.erase(&1), 0);
        assert!(map.is_empty());
    }

    #[test]
    fn erase_then_reinsert_same_key() {
        let mut map = SipMap::default();
        for i in 0..50 {
            map.insert(i, i);
        }
        for i in 0..50 {
            assert_eq!(map.erase(&i), 1);
            map.insert(i, i + 1000);
        }

        assert_eq!(map.len(), 50);
        assert_eq!(map.iter().filter(|&(&k, _)| k == 10).count(), 1);
        assert_eq!(map.get(&10), Some(&1010));
    }

    #[test]
    fn at_reports_missing_keys() {
        let mut map = SipMap::default();
        map.insert(1, "one");

        assert_eq!(map.at(&1), Ok(&"one"));
        assert_eq!(map.at(&2), Err(Error::KeyNotFound));

        *map.at_mut(&1).unwrap() = "uno";
        assert_eq!(map[&1], "uno");
        assert_eq!(map.at_mut(&3), Err(Error::KeyNotFound));
    }

    #[test]
    #[should_panic(expected = "key not found")]
    fn index_panics_on_missing_key() {
        let map: SipMap<u32, u32> = SipMap::default();
        let _value = map[&5];
    }

    #[test]
    fn borrowed_lookups() {
        let mut map = SipMap::default();
        map.insert("hello".to_string(), 1);

        assert!(map.contains_key("hello"));
        assert_eq!(map.count("hello"), 1);
        assert_eq!(map.count("world"), 0);
        assert_eq!(
            map.get_key_value("hello"),
            Some((&"hello".to_string(), &1))
        );
        assert_eq!(map.remove_entry("hello"), Some(("hello".to_string(), 1)));
        assert_eq!(map.remove("hello"), None);
    }

    #[test]
    fn get_or_default_counts() {
        let mut map: SipMap<&str, usize> = SipMap::default();
        for word in "the cat and the hat and the bat".split(' ') {
            *map.get_or_default(word) += 1;
        }
        assert_eq!(map["the"], 3);
        assert_eq!(map["and"], 2);
        assert_eq!(map["cat"], 1);
    }

    #[test]
    fn entry_api() {
        let mut map = SipMap::default();

        match map.entry(1) {
            Entry::Vacant(entry) => {
                assert_eq!(entry.key(), &1);
                entry.insert("a");
            }
            Entry::Occupied(_) => panic!("expected vacant"),
        }

        map.entry(1).and_modify(|v| *v = "b").or_insert("c");
        assert_eq!(map.get(&1), Some(&"b"));

        map.entry(2).and_modify(|v| *v = "x").or_insert("c");
        assert_eq!(map.get(&2), Some(&"c"));

        if let Entry::Occupied(mut entry) = map.entry(2) {
            assert_eq!(entry.insert("d"), "c");
            assert_eq!(entry.key(), &2);
            assert_eq!(entry.remove_entry(), (2, "d"));
        }
        assert!(!map.contains_key(&2));

        let called = core::cell::Cell::new(false);
        map.entry(1).or_insert_with(|| {
            called.set(true);
            "z"
        });
        assert!(!called.get());
    }

    #[test]
    fn entry_position_matches_find() {
        let mut map = SipMap::default();
        let position = map.entry(42).position();
        map.entry(42).or_insert(1);
        assert_eq!(map.find(&42).map(Position::index), Some(position.index()));
    }

    #[test]
    fn get_or_default_on_present_key_keeps_capacity() {
        let mut map = SipMap::default();
        for i in 0..12u32 {
            map.insert(i, 0u32);
        }
        assert_eq!(map.capacity(), 16);
        let position = map.find(&0).unwrap();

        *map.get_or_default(5) += 1;
        map.insert(7, 9);

        assert_eq!(map.capacity(), 16);
        assert_eq!(map.get(&5), Some(&1));
        assert_eq!(map.get(&7), Some(&0));
        assert_eq!(map.get_at(position), Ok((&0, &0)));

        *map.get_or_default(12) += 1;
        assert_eq!(map.capacity(), 32);
        assert_eq!(map.get_at(position), Err(Error::StalePosition));
    }

    #[test]
    fn iterators() {
        let mut map = SipMap::default();
        for i in 0..20 {
            map.insert(i, i * 10);
        }

        assert_eq!(map.iter().len(), 20);
        let mut keys: Vec<_> = map.keys().copied().collect();
        keys.sort_unstable();
        assert_eq!(keys, (0..20).collect::<Vec<_>>());

        for value in map.values_mut() {
            *value += 1;
        }
        for (k, v) in &mut map {
            *v += k;
        }
        let sum: i32 = map.values().sum();
        assert_eq!(sum, (0..20).map(|i| i * 11 + 1).sum());

        let mut pairs: Vec<_> = map.into_iter().collect();
        pairs.sort_unstable();
        assert_eq!(pairs[3], (3, 34));
    }

    #[test]
    fn position_walk_matches_iter() {
        let mut map = SipMap::default();
        for i in 0..40 {
            map.insert(i, i);
        }

        let from_iter: Vec<_> = map.iter().map(|(&k, _)| k).collect();
        let mut from_positions = Vec::new();
        let mut position = map.first();
        while let Some(current) = position {
            from_positions.push(*map.get_at(current).unwrap().0);
            position = map.next_position(current).unwrap();
        }
        assert_eq!(from_iter, from_positions);
    }

    #[test]
    fn stale_positions_are_rejected() {
        let mut map = SipMap::default();
        map.insert(1, 1);
        map.insert(2, 2);
        let position = map.find(&1).unwrap();

        map.erase(&2);
        assert_eq!(map.get_at(position), Err(Error::StalePosition));

        let position = map.find(&1).unwrap();
        *map.get_at_mut(position).unwrap().1 = 10;
        map.clear();
        assert_eq!(map.erase_at(position), Err(Error::StalePosition));
        assert_eq!(map.first(), None);
    }

    #[test]
    fn erase_at_removes_while_walking() {
        let mut map: SipMap<u32, u32> = (0..30).map(|i| (i, i)).collect();
        let mut position = map.first();
        while let Some(current) = position {
            let (&k, _) = map.get_at(current).unwrap();
            position = if k % 3 == 0 {
                map.erase_at(current).unwrap()
            } else {
                map.next_position(current).unwrap()
            };
        }

        assert_eq!(map.len(), 20);
        assert!(map.keys().all(|k| k % 3 != 0));
    }

    #[test]
    fn retain_and_drain() {
        let mut map: SipMap<u32, u32> = (0..100).map(|i| (i, i)).collect();
        map.retain(|&k, v| {
            *v += 1;
            k < 10
        });
        assert_eq!(map.len(), 10);
        assert_eq!(map.get(&5), Some(&6));

        let mut drained: Vec<_> = map.drain().collect();
        drained.sort_unstable();
        assert_eq!(drained.len(), 10);
        assert_eq!(drained[0], (0, 1));
        assert!(map.is_empty());
    }

    #[test]
    fn clone_is_deep() {
        let mut map = SipMap::default();
        map.insert(1, "one".to_string());

        let mut cloned = map.clone();
        cloned.get_mut(&1).unwrap().push('!');
        cloned.insert(2, "two".to_string());

        assert_eq!(map.get(&1).map(String::as_str), Some("one"));
        assert_eq!(cloned.get(&1).map(String::as_str), Some("one!"));
        assert_eq!(map.len(), 1);
        assert_ne!(map, cloned);
    }

    #[test]
    fn equality_ignores_layout() {
        let a: SipMap<u32, u32> = (0..50).map(|i| (i, i)).collect();
        let mut b = SipMap::with_capacity_and_hasher(1024, SipHashBuilder::default());
        for i in (0..50).rev() {
            b.insert(i, i);
        }
        assert_eq!(a, b);

        b.insert(50, 50);
        assert_ne!(a, b);
    }

    #[test]
    fn from_array_and_collect_keep_first() {
        let map: SipMap<_, _> = FlatHashMap::from([(1, "a"), (2, "b"), (1, "c")]);
        assert_eq!(map.len(), 2);
        assert_eq!(map[&1], "a");

        let collected: SipMap<_, _> = [(3, 1), (3, 2)].into_iter().collect();
        assert_eq!(collected[&3], 1);

        let mut extended = collected.clone();
        extended.extend([(&4, &4), (&3, &9)]);
        assert_eq!(extended[&3], 1);
        assert_eq!(extended[&4], 4);
    }

    #[test]
    fn take_leaves_usable_map() {
        let mut map: SipMap<u32, u32> = (0..10).map(|i| (i, i)).collect();
        let taken = core::mem::take(&mut map);

        assert_eq!(taken.len(), 10);
        assert!(map.is_empty());
        map.insert(1, 1);
        assert_eq!(map.get(&1), Some(&1));
    }

    #[test]
    fn swap_exchanges_contents() {
        let mut a: SipMap<u32, u32> = (0..3).map(|i| (i, i)).collect();
        let mut b: SipMap<u32, u32> = SipMap::default();
        core::mem::swap(&mut a, &mut b);
        assert!(a.is_empty());
        assert_eq!(b.len(), 3);
    }

    #[test]
    fn load_factor_controls() {
        let mut map: SipMap<u32, u32> = (0..12).map(|i| (i, i)).collect();
        assert_eq!(map.capacity(), 16);

        map.set_max_load_factor(0.5);
        assert_eq!(map.capacity(), 32);
        assert!(map.load_factor() <= 0.5);

        assert_eq!(
            map.try_set_max_load_factor(-1.0),
            Err(Error::InvalidLoadFactor(-1.0))
        );
        assert_eq!(map.max_load_factor(), 0.5);

        map.reserve(100);
        let capacity = map.capacity();
        for i in 12..112 {
            map.insert(i, i);
        }
        assert_eq!(map.capacity(), capacity);
        assert_eq!(map.try_reserve(usize::MAX), Err(Error::CapacityOverflow));
    }

    #[test]
    fn debug_format() {
        let mut map = SipMap::default();
        map.insert(1, "a");
        assert_eq!(format!("{map:?}"), r#"{1: "a"}"#);
    }

    #[cfg(any(feature = "foldhash", feature = "std"))]
    #[test]
    fn default_hasher_round_trip() {
        let mut map: FlatHashMap<String, usize> = FlatHashMap::new();
        for (i, word) in ["x", "y", "z"].iter().enumerate() {
            map.insert(word.to_string(), i);
        }
        assert_eq!(map["y"], 1);
    }
}
