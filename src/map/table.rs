use super::bin::Bin;
use crate::error::MapError;

use crossbeam_epoch::{Atomic, Guard};
use parking_lot::RwLock;
use std::sync::atomic::Ordering;

/// A bucket array.
///
/// The array never changes its length. When it becomes too small, a table
/// twice as long is allocated and linked from `next`, every bucket is moved
/// over and left forwarded, and then the map's table pointer is swung to the
/// new table. A thread still holding this table follows `next` whenever it
/// reads a forwarded bucket.
pub(crate) struct Table<K, V> {
    pub(crate) bins: Box<[RwLock<Bin<K, V>>]>,
    pub(crate) next: Atomic<Table<K, V>>,
}

#[cfg(test)]
thread_local! {
    static FAIL_NEXT_ALLOCATION: std::cell::Cell<bool> = std::cell::Cell::new(false);
}

/// Makes the next table allocation on the calling thread fail.
#[cfg(test)]
pub(crate) fn fail_next_allocation() {
    FAIL_NEXT_ALLOCATION.with(|fail| fail.set(true));
}

#[cfg(test)]
fn injected_failure(capacity: usize) -> Result<(), MapError> {
    if FAIL_NEXT_ALLOCATION.with(|fail| fail.replace(false)) {
        return Err(MapError::AllocationFailed { capacity });
    }
    Ok(())
}

#[cfg(not(test))]
#[inline]
fn injected_failure(_capacity: usize) -> Result<(), MapError> {
    Ok(())
}

impl<K, V> Table<K, V> {
    pub(crate) fn try_with_capacity(capacity: usize) -> Result<Self, MapError> {
        assert!(capacity.is_power_of_two());
        injected_failure(capacity)?;

        let mut bins = Vec::new();
        bins.try_reserve_exact(capacity)
            .map_err(|_| MapError::AllocationFailed { capacity })?;
        bins.extend((0..capacity).map(|_| RwLock::new(Bin::default())));

        Ok(Self {
            bins: bins.into_boxed_slice(),
            next: Atomic::null(),
        })
    }

    pub(crate) fn capacity(&self) -> usize {
        self.bins.len()
    }

    #[inline]
    pub(crate) fn index(&self, hash: u32) -> usize {
        hash as usize & (self.bins.len() - 1)
    }

    #[inline]
    pub(crate) fn bin(&self, hash: u32) -> &RwLock<Bin<K, V>> {
        &self.bins[self.index(hash)]
    }

    /// Returns the table this one is being (or has been) resized into.
    ///
    /// # Panics
    ///
    /// Panics if there is no such table. Only call this after reading a
    /// forwarded bucket.
    pub(crate) fn successor<'g>(&self, guard: &'g Guard) -> &'g Table<K, V> {
        let next_ptr = self.next.load(Ordering::Acquire, guard);
        match unsafe { next_ptr.as_ref() } {
            Some(next_ref) => next_ref,
            None => unreachable!("found a forwarded bucket but no next table"),
        }
    }

    /// Visits every entry of the bucket at `index`, following forwarded buckets
    /// into the successor tables.
    pub(crate) fn visit_bin(
        &self,
        index: usize,
        guard: &Guard,
        f: &mut impl FnMut(Option<&K>, &V),
    ) {
        let bin = self.bins[index].read();
        if bin.for_each(&mut *f).is_ok() {
            return;
        }
        std::mem::drop(bin);

        // The bucket moved to `index` and `index + capacity` of the next table.
        let next = self.successor(guard);
        next.visit_bin(index, guard, f);
        next.visit_bin(index + self.capacity(), guard, f);
    }

    /// Moves every bucket of this table into `next`, which must be twice as
    /// long and already linked from `self.next`.
    ///
    /// Each bucket is moved while holding its write lock, so a put either
    /// lands in the bucket before it is moved, or finds it forwarded and
    /// retries on `next`. Nothing else writes to the two target buckets of
    /// `next` before their source bucket is forwarded. Buckets that are
    /// already forwarded were moved by an earlier, interrupted transfer and
    /// are skipped.
    pub(crate) fn transfer(&self, next: &Table<K, V>, untreeify_threshold: usize) {
        let capacity = self.capacity();
        assert_eq!(next.capacity(), capacity * 2);

        for (i, this_bin) in self.bins.iter().enumerate() {
            let mut this_bin = this_bin.write();
            if this_bin.is_forwarded() {
                continue;
            }
            let (lo, hi) = std::mem::replace(&mut *this_bin, Bin::Forwarded)
                .split(capacity, untreeify_threshold);

            *next.bins[i].write() = lo;
            *next.bins[i + capacity].write() = hi;
        }
    }
}
