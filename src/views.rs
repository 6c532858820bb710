//! Live views over a [`ConcurrentMap`][map] and their iterators.
//!
//! A view borrows the map and reads it only when it is asked to. Iterators
//! walk the bucket array in batches: the buckets are split into residue
//! classes modulo the bucket count seen when the iterator was created, and
//! each batch clones the entries of one class while read-locking one bucket at
//! a time. Because every later table is a multiple of that count, and a
//! resize only moves an entry between buckets of the same class, each entry
//! present for the whole iteration is yielded exactly once, even across
//! resizes.
//!
//! [map]: ../struct.ConcurrentMap.html

use crate::{hash::KeyHasher, ConcurrentMap};

use std::{borrow::Borrow, fmt, iter::FusedIterator, vec};

/// An iterator over clones of the entries of a map, as `(key, value)` pairs.
/// The absent key is yielded as `None`.
pub struct Iter<'a, K, V, S> {
    entries: vec::IntoIter<(Option<K>, V)>,
    map: &'a ConcurrentMap<K, V, S>,
    stride: usize,
    residue: usize,
    is_done: bool,
}

impl<'a, K, V, S> Iter<'a, K, V, S> {
    pub(crate) fn new(map: &'a ConcurrentMap<K, V, S>) -> Self {
        Self {
            entries: Vec::new().into_iter(),
            map,
            stride: map.capacity(),
            residue: 0,
            is_done: false,
        }
    }
}

impl<'a, K, V, S> Iterator for Iter<'a, K, V, S>
where
    K: Clone,
    V: Clone,
{
    type Item = (Option<K>, V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_done {
            return None;
        }

        loop {
            if let entry @ Some(_) = self.entries.next() {
                return entry;
            }

            if self.residue >= self.stride {
                self.is_done = true;
                return None;
            }

            let mut batch = Vec::new();
            self.map
                .collect_residue(self.residue, self.stride, &mut batch);
            self.residue += 1;
            self.entries = batch.into_iter();
        }
    }
}

impl<'a, K: Clone, V: Clone, S> FusedIterator for Iter<'a, K, V, S> {}

/// An iterator over clones of the keys of a map.
pub struct KeyIter<'a, K, V, S> {
    inner: Iter<'a, K, V, S>,
}

impl<'a, K: Clone, V: Clone, S> Iterator for KeyIter<'a, K, V, S> {
    type Item = Option<K>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }
}

impl<'a, K: Clone, V: Clone, S> FusedIterator for KeyIter<'a, K, V, S> {}

/// An iterator over clones of the values of a map.
pub struct ValueIter<'a, K, V, S> {
    inner: Iter<'a, K, V, S>,
}

impl<'a, K: Clone, V: Clone, S> Iterator for ValueIter<'a, K, V, S> {
    type Item = V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }
}

impl<'a, K: Clone, V: Clone, S> FusedIterator for ValueIter<'a, K, V, S> {}

macro_rules! view {
    ($(#[$attr:meta])* $name:ident, $iter:ident, $item:ty, $wrap:expr) => {
        $(#[$attr])*
        pub struct $name<'a, K, V, S> {
            map: &'a ConcurrentMap<K, V, S>,
        }

        impl<'a, K, V, S> $name<'a, K, V, S> {
            pub(crate) fn new(map: &'a ConcurrentMap<K, V, S>) -> Self {
                Self { map }
            }

            /// Returns the number of entries of the underlying map.
            pub fn len(&self) -> usize {
                self.map.size()
            }

            pub fn is_empty(&self) -> bool {
                self.map.is_empty()
            }

            /// Returns a weakly consistent iterator over the view.
            pub fn iter(&self) -> $iter<'a, K, V, S> {
                $wrap(Iter::new(self.map))
            }
        }

        impl<'a, K, V, S> Clone for $name<'a, K, V, S> {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<'a, K, V, S> Copy for $name<'a, K, V, S> {}

        impl<'a, K: Clone, V: Clone, S> IntoIterator for $name<'a, K, V, S> {
            type Item = $item;
            type IntoIter = $iter<'a, K, V, S>;

            fn into_iter(self) -> Self::IntoIter {
                self.iter()
            }
        }

        impl<'a, 'v, K: Clone, V: Clone, S> IntoIterator for &'v $name<'a, K, V, S> {
            type Item = $item;
            type IntoIter = $iter<'a, K, V, S>;

            fn into_iter(self) -> Self::IntoIter {
                self.iter()
            }
        }
    };
}

view!(
    /// A live view of the keys of a map. Returned by
    /// [`ConcurrentMap::key_set`](../struct.ConcurrentMap.html#method.key_set).
    KeySet,
    KeyIter,
    Option<K>,
    |inner| KeyIter { inner }
);

view!(
    /// A live view of the values of a map. Returned by
    /// [`ConcurrentMap::values`](../struct.ConcurrentMap.html#method.values).
    ///
    /// A value associated with several keys is yielded once per key.
    Values,
    ValueIter,
    V,
    |inner| ValueIter { inner }
);

view!(
    /// A live view of the key-value pairs of a map. Returned by
    /// [`ConcurrentMap::entry_set`](../struct.ConcurrentMap.html#method.entry_set).
    EntrySet,
    Iter,
    (Option<K>, V),
    |inner| inner
);

impl<'a, K: Ord, V, S> KeySet<'a, K, V, S> {
    /// Returns `true` if the map holds a value for the key.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
        S: KeyHasher<Q>,
    {
        self.map.contains_key(key)
    }

    /// Returns `true` if the map holds a value for the absent key.
    pub fn contains_null(&self) -> bool
    where
        S: KeyHasher<K>,
    {
        self.map.contains_null_key()
    }
}

impl<'a, K: Ord, V: PartialEq, S> EntrySet<'a, K, V, S> {
    /// Returns `true` if the map associates `key` with a value equal to
    /// `value`. Pass `None` as the key to look up the absent key.
    pub fn contains<Q>(&self, key: Option<&Q>, value: &V) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
        S: KeyHasher<Q>,
    {
        self.map.get_and(key, |v| v == value).unwrap_or(false)
    }
}

impl<'a, K: fmt::Display + Clone, V: Clone, S> fmt::Display for KeySet<'a, K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_joined(f, "[", "]", self.iter(), |f, k| fmt_key(f, &k))
    }
}

impl<'a, K: Clone, V: fmt::Display + Clone, S> fmt::Display for Values<'a, K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_joined(f, "[", "]", self.iter(), |f, v| write!(f, "{v}"))
    }
}

impl<'a, K, V, S> fmt::Display for EntrySet<'a, K, V, S>
where
    K: fmt::Display + Clone,
    V: fmt::Display + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_joined(f, "[", "]", self.iter(), fmt_entry)
    }
}

impl<'a, K: fmt::Debug + Clone, V: Clone, S> fmt::Debug for KeySet<'a, K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<'a, K: Clone, V: fmt::Debug + Clone, S> fmt::Debug for Values<'a, K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<'a, K, V, S> fmt::Debug for EntrySet<'a, K, V, S>
where
    K: fmt::Debug + Clone,
    V: fmt::Debug + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

pub(crate) fn fmt_joined<T>(
    f: &mut fmt::Formatter<'_>,
    open: &str,
    close: &str,
    items: impl Iterator<Item = T>,
    mut fmt_item: impl FnMut(&mut fmt::Formatter<'_>, T) -> fmt::Result,
) -> fmt::Result {
    f.write_str(open)?;
    for (i, item) in items.enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        fmt_item(f, item)?;
    }
    f.write_str(close)
}

pub(crate) fn fmt_entry<K: fmt::Display, V: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    (key, value): (Option<K>, V),
) -> fmt::Result {
    fmt_key(f, &key)?;
    write!(f, "={value}")
}

fn fmt_key<K: fmt::Display>(f: &mut fmt::Formatter<'_>, key: &Option<K>) -> fmt::Result {
    match key {
        Some(key) => write!(f, "{key}"),
        None => f.write_str("null"),
    }
}
