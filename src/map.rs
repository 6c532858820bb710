//! A concurrent hash map with bucket-level locking.
//!
//! The map owns a power-of-two sized array of buckets. A key's bucket is
//! selected by the low bits of its final hash (see [`hash`][hash-mod]). Every
//! bucket is guarded by its own reader-writer lock; a put holds the write lock
//! of a single bucket and nothing else, so puts to different buckets proceed in
//! parallel.
//!
//! When the number of entries would exceed `capacity * load_factor`, the
//! bucket array is doubled. At most one thread resizes at a time. It allocates
//! the new array, links it from the old one, and moves the buckets one by one,
//! leaving each old bucket *forwarded*. Other threads keep working while this
//! happens: a put to a bucket that has not been moved yet goes to the old
//! array, a put to a forwarded bucket follows the link, and a put to the bucket
//! being moved waits for that bucket only. Once every bucket is moved, the new
//! array is published and the old one is reclaimed through `crossbeam-epoch`
//! when no thread can still be reading it.
//!
//! [hash-mod]: ../hash/index.html

pub(crate) mod bin;
pub(crate) mod table;

use self::{
    bin::{Bin, RelocatedError},
    table::Table,
};
use crate::{
    builder::{ConcurrentMapBuilder, MapConfig},
    common::constants::MAXIMUM_CAPACITY,
    error::MapError,
    hash::{self, DefaultKeyHasher, KeyHasher},
    views::{fmt_entry, fmt_joined, EntrySet, Iter, KeySet, Values},
};

use std::{
    borrow::Borrow,
    fmt,
    iter::FromIterator,
    mem,
    sync::atomic::{self, AtomicUsize, Ordering},
};

use crossbeam_epoch::{Atomic, Guard, Owned};
use crossbeam_utils::CachePadded;
use parking_lot::{Mutex, RwLockWriteGuard};

/// A concurrent map from keys to values.
///
/// All operations take `&self`; share the map between threads with an
/// [`Arc`][arc]. There is no lock over the whole map: puts lock a single
/// bucket, lookups read-lock a single bucket.
///
/// Keys are `Option<K>`. `None` is the *absent key*: it is a regular key that
/// can hold a value, it always has the final hash 0 and lives in bucket 0, and
/// the hasher is never asked to hash it. Anything that converts into
/// `Option<K>`, including a plain `K`, can be passed to [`put`](#method.put).
///
/// Keys must be `Ord` as well as hashable by the map's [`KeyHasher`]. The
/// ordering is used inside buckets that have been converted into trees, which
/// bounds lookups to `O(log n)` even when many keys share the same hash.
///
/// The views returned by [`values`](#method.values),
/// [`key_set`](#method.key_set) and [`entry_set`](#method.entry_set) are live
/// and weakly consistent: they read the map as it is when they are iterated,
/// they never yield a torn entry, and puts running concurrently with an
/// iteration may or may not be observed.
///
/// # Examples
///
/// ```rust
/// use salient::ConcurrentMap;
///
/// let map = ConcurrentMap::new();
///
/// assert_eq!(map.put("TAB1".to_string(), "A".to_string()), None);
/// assert_eq!(map.put("TAB2".to_string(), "A".to_string()), None);
/// assert_eq!(map.size(), 2);
///
/// // Putting an existing key replaces and returns its value.
/// assert_eq!(map.put("TAB1".to_string(), "B".to_string()), Some("A".to_string()));
/// assert_eq!(map.get("TAB1"), Some("B".to_string()));
///
/// // The absent key is a key like any other.
/// assert_eq!(map.put(None, "nothing".to_string()), None);
/// assert_eq!(map.get_null_key(), Some("nothing".to_string()));
/// assert_eq!(map.size(), 3);
/// ```
///
/// [arc]: https://doc.rust-lang.org/std/sync/struct.Arc.html
pub struct ConcurrentMap<K, V, S = DefaultKeyHasher> {
    table: Atomic<Table<K, V>>,
    len: CachePadded<AtomicUsize>,
    resize_lock: Mutex<()>,
    hasher: S,
    config: MapConfig,
}

impl<K, V> ConcurrentMap<K, V, DefaultKeyHasher>
where
    K: Ord,
    DefaultKeyHasher: KeyHasher<K>,
{
    /// Creates an empty map with 16 buckets and a load factor of 0.75.
    pub fn new() -> Self {
        ConcurrentMapBuilder::new().build()
    }

    /// Creates an empty map with at least `capacity` buckets.
    pub fn with_capacity(capacity: usize) -> Self {
        ConcurrentMapBuilder::new()
            .initial_capacity(capacity)
            .build()
    }

    /// Like [`with_capacity`](#method.with_capacity), but returns an error if
    /// the bucket array cannot be allocated.
    pub fn try_with_capacity(capacity: usize) -> Result<Self, MapError> {
        ConcurrentMapBuilder::new()
            .initial_capacity(capacity)
            .try_build()
    }

    /// Returns a [`ConcurrentMapBuilder`][builder-struct] to configure a map.
    ///
    /// [builder-struct]: ./struct.ConcurrentMapBuilder.html
    pub fn builder() -> ConcurrentMapBuilder<K, V> {
        ConcurrentMapBuilder::new()
    }
}

impl<K, V> Default for ConcurrentMap<K, V, DefaultKeyHasher>
where
    K: Ord,
    DefaultKeyHasher: KeyHasher<K>,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> ConcurrentMap<K, V, S> {
    pub(crate) fn with_everything(config: MapConfig, hasher: S) -> Result<Self, MapError> {
        let table = Table::try_with_capacity(config.table_capacity())?;

        Ok(Self {
            table: Atomic::new(table),
            len: CachePadded::new(AtomicUsize::new(0)),
            resize_lock: Mutex::new(()),
            hasher,
            config,
        })
    }

    /// Creates an empty map with the default configuration, using `hasher` to
    /// hash the keys.
    pub fn with_hasher(hasher: S) -> Self {
        match Self::with_everything(MapConfig::default(), hasher) {
            Ok(map) => map,
            Err(e) => panic!("{e}"),
        }
    }

    /// Returns the number of entries in the map.
    ///
    /// Under concurrent puts, the count includes every put that completed
    /// before this call and may include puts still in flight.
    pub fn size(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Alias of [`size`](#method.size).
    pub fn len(&self) -> usize {
        self.size()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Returns the current number of buckets. Always a power of two.
    pub fn capacity(&self) -> usize {
        let guard = &crossbeam_epoch::pin();
        self.current(guard).capacity()
    }

    /// Returns a reference to the map's key hasher.
    pub fn hasher(&self) -> &S {
        &self.hasher
    }

    #[cfg(test)]
    pub(crate) fn config(&self) -> &MapConfig {
        &self.config
    }

    /// Returns a live view of the values of the map.
    pub fn values(&self) -> Values<'_, K, V, S> {
        Values::new(self)
    }

    /// Returns a live view of the keys of the map.
    pub fn key_set(&self) -> KeySet<'_, K, V, S> {
        KeySet::new(self)
    }

    /// Returns a live view of the key-value pairs of the map.
    pub fn entry_set(&self) -> EntrySet<'_, K, V, S> {
        EntrySet::new(self)
    }

    /// Returns a weakly consistent iterator over clones of the key-value pairs
    /// of the map, in no particular order.
    pub fn iter(&self) -> Iter<'_, K, V, S> {
        Iter::new(self)
    }

    /// Appends clones of the entries of every bucket whose index is congruent
    /// to `residue` modulo `stride`. `stride` must be a capacity this map has
    /// had; capacities only grow, so every later table is a multiple of it.
    pub(crate) fn collect_residue(
        &self,
        residue: usize,
        stride: usize,
        out: &mut Vec<(Option<K>, V)>,
    ) where
        K: Clone,
        V: Clone,
    {
        let guard = &crossbeam_epoch::pin();
        let table = self.current(guard);
        debug_assert_eq!(table.capacity() % stride, 0);

        for index in (residue..table.capacity()).step_by(stride) {
            table.visit_bin(index, guard, &mut |k: Option<&K>, v: &V| {
                out.push((k.cloned(), v.clone()))
            });
        }
    }

    fn current<'g>(&self, guard: &'g Guard) -> &'g Table<K, V> {
        let table_ptr = self.table.load(Ordering::Acquire, guard);
        match unsafe { table_ptr.as_ref() } {
            Some(table_ref) => table_ref,
            None => unreachable!("the bucket array is allocated at construction"),
        }
    }

    /// Write-locks the live bucket for `hash`, following forwarded buckets to
    /// the newest table.
    fn lock_bin<'g>(
        &self,
        hash: u32,
        guard: &'g Guard,
    ) -> (&'g Table<K, V>, RwLockWriteGuard<'g, Bin<K, V>>) {
        let mut table = self.current(guard);

        loop {
            let bin = table.bin(hash).write();
            if !bin.is_forwarded() {
                return (table, bin);
            }
            mem::drop(bin);
            table = table.successor(guard);
        }
    }
}

impl<K: Ord, V, S> ConcurrentMap<K, V, S> {
    /// Associates `value` with `key`, returning the value the key held before,
    /// or `None` if the key was not present.
    ///
    /// `key` may be a `K` or an `Option<K>`; `None` is the absent key.
    ///
    /// If the new entry would take the map over its load factor, the bucket
    /// array is doubled before the entry is inserted.
    ///
    /// # Panics
    ///
    /// Panics if a larger bucket array is needed and cannot be allocated. Use
    /// [`try_put`](#method.try_put) to handle that case.
    pub fn put(&self, key: impl Into<Option<K>>, value: V) -> Option<V>
    where
        S: KeyHasher<K>,
    {
        match self.try_put(key, value) {
            Ok(previous) => previous,
            Err(e) => panic!("{e}"),
        }
    }

    /// Like [`put`](#method.put), but returns an error instead of panicking
    /// when a larger bucket array cannot be allocated. In that case the map is
    /// left unchanged.
    pub fn try_put(&self, key: impl Into<Option<K>>, value: V) -> Result<Option<V>, MapError>
    where
        S: KeyHasher<K>,
    {
        self.put_with(key.into(), value, |current, value| mem::replace(current, value))
    }

    /// Associates `value` with `key` only if the key is not present. Returns a
    /// clone of the value already associated with the key otherwise.
    ///
    /// # Panics
    ///
    /// Panics if a larger bucket array is needed and cannot be allocated.
    pub fn put_if_absent(&self, key: impl Into<Option<K>>, value: V) -> Option<V>
    where
        S: KeyHasher<K>,
        V: Clone,
    {
        match self.try_put_if_absent(key, value) {
            Ok(present) => present,
            Err(e) => panic!("{e}"),
        }
    }

    /// Like [`put_if_absent`](#method.put_if_absent), but returns an error
    /// instead of panicking when a larger bucket array cannot be allocated.
    pub fn try_put_if_absent(
        &self,
        key: impl Into<Option<K>>,
        value: V,
    ) -> Result<Option<V>, MapError>
    where
        S: KeyHasher<K>,
        V: Clone,
    {
        self.put_with(key.into(), value, |current, _| current.clone())
    }

    /// Returns a clone of the value corresponding to the key.
    ///
    /// The key may be any borrowed form of the map's key type, but the
    /// hasher and `Ord` on the borrowed form *must* match those for the key
    /// type.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
        S: KeyHasher<Q>,
        V: Clone,
    {
        self.get_and(Some(key), V::clone)
    }

    /// Returns a clone of the value corresponding to the absent key.
    pub fn get_null_key(&self) -> Option<V>
    where
        S: KeyHasher<K>,
        V: Clone,
    {
        self.get_and::<K, _>(None, V::clone)
    }

    /// Returns the result of invoking a function with a reference to the value
    /// corresponding to the key. The bucket is read-locked while `with_value`
    /// runs.
    pub fn get_and<Q, T>(&self, key: Option<&Q>, with_value: impl FnOnce(&V) -> T) -> Option<T>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
        S: KeyHasher<Q>,
    {
        let hash = hash::final_hash(&self.hasher, key);
        let guard = &crossbeam_epoch::pin();
        let mut table = self.current(guard);

        loop {
            let bin = table.bin(hash).read();
            match bin.get(hash, key) {
                Ok(maybe_value) => return maybe_value.map(with_value),
                Err(RelocatedError) => {
                    mem::drop(bin);
                    table = table.successor(guard);
                }
            }
        }
    }

    /// Returns `true` if the map holds a value for the key.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
        S: KeyHasher<Q>,
    {
        self.get_and(Some(key), |_| ()).is_some()
    }

    /// Returns `true` if the map holds a value for the absent key.
    pub fn contains_null_key(&self) -> bool
    where
        S: KeyHasher<K>,
    {
        self.get_and::<K, _>(None, |_| ()).is_some()
    }

    fn put_with<F>(&self, key: Option<K>, value: V, on_present: F) -> Result<Option<V>, MapError>
    where
        S: KeyHasher<K>,
        F: FnOnce(&mut V, V) -> V,
    {
        let hash = hash::final_hash(&self.hasher, key.as_ref());
        let guard = &crossbeam_epoch::pin();
        let mut reserved = false;

        loop {
            let (table, mut bin) = self.lock_bin(hash, guard);

            if let Some(current) = bin.get_mut(hash, key.as_ref()) {
                return Ok(Some(on_present(current, value)));
            }

            // A new key. Make room before inserting it, so that a failed
            // allocation leaves the map as it was.
            let capacity = table.capacity();
            if !reserved && self.size() >= self.config.resize_threshold(capacity) {
                mem::drop(bin);
                self.grow(guard, 0, 1)?;
                reserved = true;
                continue;
            }

            let replaced = bin.insert(hash, key, value);
            debug_assert!(replaced.is_none());
            let bin_overfull = self.treeify_if_needed(capacity, &mut bin);
            mem::drop(bin);

            let len = self.len.fetch_add(1, Ordering::AcqRel) + 1;
            if bin_overfull || len > self.config.resize_threshold(capacity) {
                let min_capacity = if bin_overfull { capacity * 2 } else { 0 };
                if let Err(e) = self.grow(guard, min_capacity, 0) {
                    log_growth_failure(&e);
                }
            }

            return Ok(None);
        }
    }

    /// Converts an overfull chain into a tree. Returns `true` when the chain is
    /// overfull but the table is too small to tree-ify, in which case the table
    /// should grow instead.
    fn treeify_if_needed(&self, capacity: usize, bin: &mut Bin<K, V>) -> bool {
        if bin.is_tree() || bin.len() <= self.config.treeify_threshold {
            return false;
        }

        if capacity < self.config.min_treeify_capacity {
            return true;
        }

        #[cfg(feature = "logging")]
        log::trace!("treeifying a bucket of {} entries", bin.len());

        bin.treeify();
        false
    }

    /// Doubles the bucket array until it has at least `min_capacity` buckets
    /// and `size() + extra` entries fit under the load factor.
    ///
    /// If another thread is already resizing, returns immediately. Every
    /// resizer re-checks the load after releasing the resize lock, so an
    /// entry counted by a put that found the lock taken is never left over
    /// the threshold.
    fn grow(&self, guard: &Guard, min_capacity: usize, extra: usize) -> Result<(), MapError> {
        let (mut min_capacity, mut extra) = (min_capacity, extra);

        loop {
            // Orders the caller's count increment before the lock attempt.
            // Pairs with the fence after the lock is released below.
            atomic::fence(Ordering::SeqCst);
            let Some(lock) = self.resize_lock.try_lock() else {
                return Ok(());
            };

            self.grow_locked(guard, min_capacity, extra)?;
            mem::drop(lock);

            atomic::fence(Ordering::SeqCst);
            if !self.is_overloaded(guard) {
                return Ok(());
            }
            min_capacity = 0;
            extra = 0;
        }
    }

    fn is_overloaded(&self, guard: &Guard) -> bool {
        let capacity = self.current(guard).capacity();
        self.size() > self.config.resize_threshold(capacity)
    }

    fn grow_locked(
        &self,
        guard: &Guard,
        min_capacity: usize,
        extra: usize,
    ) -> Result<(), MapError> {
        loop {
            let table = self.current(guard);
            let capacity = table.capacity();
            let len = self.size() + extra;

            if capacity >= min_capacity && len <= self.config.resize_threshold(capacity) {
                return Ok(());
            }

            if capacity >= MAXIMUM_CAPACITY {
                #[cfg(feature = "logging")]
                log::debug!("not resizing: the table already has {capacity} buckets");

                return Ok(());
            }

            let linked = table.next.load(Ordering::Acquire, guard);
            let next_ptr = if linked.is_null() {
                #[cfg(feature = "logging")]
                log::debug!(
                    "resizing from {capacity} to {} buckets ({len} entries)",
                    capacity * 2
                );

                let next = Table::try_with_capacity(capacity * 2)?;
                let next_ptr = Owned::new(next).into_shared(guard);
                table.next.store(next_ptr, Ordering::Release);
                next_ptr
            } else {
                // An earlier resize of this table stopped partway. Finish it.
                #[cfg(feature = "logging")]
                log::debug!("resuming an interrupted resize of {capacity} buckets");

                linked
            };

            table.transfer(
                unsafe { next_ptr.deref() },
                self.config.untreeify_threshold,
            );

            let old_ptr = self.table.swap(next_ptr, Ordering::AcqRel, guard);
            debug_assert!(std::ptr::eq(old_ptr.as_raw(), table));

            // Threads pinned before the swap may still be reading the old
            // table. Every bucket in it is forwarded, so dropping it drops no
            // entry.
            unsafe { guard.defer_destroy(old_ptr) };
        }
    }
}

#[cfg(feature = "logging")]
fn log_growth_failure(e: &MapError) {
    log::warn!("the map could not grow after an insert: {e}");
}

#[cfg(not(feature = "logging"))]
fn log_growth_failure(_e: &MapError) {}

impl<K, V, S> Drop for ConcurrentMap<K, V, S> {
    fn drop(&mut self) {
        let guard = unsafe { crossbeam_epoch::unprotected() };
        atomic::fence(Ordering::Acquire);

        let mut current_ptr = self.table.load(Ordering::Relaxed, guard);

        // `next` is only set on the current table if a resize was interrupted
        // by a panic. Both tables then hold live entries.
        while let Some(current_ref) = unsafe { current_ptr.as_ref() } {
            let next_ptr = current_ref.next.load(Ordering::Relaxed, guard);
            mem::drop(unsafe { current_ptr.into_owned() });
            current_ptr = next_ptr;
        }
    }
}

impl<K, V, S> fmt::Display for ConcurrentMap<K, V, S>
where
    K: fmt::Display + Clone,
    V: fmt::Display + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_joined(f, "{", "}", self.iter(), fmt_entry)
    }
}

impl<K, V, S> fmt::Debug for ConcurrentMap<K, V, S>
where
    K: fmt::Debug + Clone,
    V: fmt::Debug + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, S> FromIterator<(K, V)> for ConcurrentMap<K, V, S>
where
    K: Ord,
    S: KeyHasher<K> + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::with_hasher(S::default());
        map.extend(iter);
        map
    }
}

impl<K, V, S> Extend<(K, V)> for ConcurrentMap<K, V, S>
where
    K: Ord,
    S: KeyHasher<K>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.put(key, value);
        }
    }
}

#[cfg(test)]
impl<K: Ord, V, S: KeyHasher<K>> ConcurrentMap<K, V, S> {
    fn bucket_index(&self, key: Option<&K>) -> usize {
        let hash = hash::final_hash(&self.hasher, key);
        let guard = &crossbeam_epoch::pin();
        self.current(guard).index(hash)
    }

    fn is_tree_bucket(&self, key: &K) -> bool {
        let hash = hash::final_hash(&self.hasher, Some(key));
        let guard = &crossbeam_epoch::pin();
        let bin = self.current(guard).bin(hash).read();
        bin.is_tree()
    }
}
