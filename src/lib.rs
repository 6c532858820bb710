#![warn(clippy::all)]
#![warn(rust_2018_idioms)]

//! Salient is a concurrent hash map for Rust.
//!
//! [`ConcurrentMap`] maps keys to values and can be shared between threads
//! behind an `Arc`. Every operation takes `&self`. There is no lock over the
//! whole map: each bucket has its own reader-writer lock, so puts to different
//! buckets never wait for each other. When the map fills past its load factor,
//! one thread doubles the bucket array while the others keep reading and
//! writing.
//!
//! # Features
//!
//! - Per-bucket locking. A put write-locks one bucket, a lookup read-locks one
//!   bucket.
//! - Incremental resizing. Buckets are moved one at a time and threads that
//!   find a moved bucket follow it to the new array.
//! - Bounded collisions. A bucket that collects more than 8 entries is turned
//!   into an ordered tree once the map has at least 64 buckets.
//! - An *absent key*. `None` is a valid key that always hashes to 0.
//! - Live, weakly consistent views of the keys, the values and the entries.
//! - Deterministic hashing by default (see [`hash`]), or any
//!   `std::hash::BuildHasher` through [`hash::BuildHasherAdapter`].
//!
//! # Example
//!
//! ```rust
//! use salient::ConcurrentMap;
//!
//! use std::{sync::Arc, thread};
//!
//! let map = Arc::new(ConcurrentMap::new());
//!
//! let handles: Vec<_> = (0..4u32)
//!     .map(|t| {
//!         let map = Arc::clone(&map);
//!         thread::spawn(move || {
//!             for i in 0..100u32 {
//!                 map.put(t * 100 + i, format!("value-{t}-{i}"));
//!             }
//!         })
//!     })
//!     .collect();
//!
//! handles.into_iter().for_each(|h| h.join().unwrap());
//!
//! assert_eq!(map.size(), 400);
//! assert_eq!(map.get(&42u32), Some("value-0-42".to_string()));
//! ```
//!
//! # Logging
//!
//! With the `logging` feature enabled, resizes are reported through the `log`
//! crate at the `debug` level and bucket conversions at the `trace` level.
//!
//! # Minimum Supported Rust Versions
//!
//! This crate's minimum supported Rust versions (MSRV) are 1.65.

pub(crate) mod builder;
pub(crate) mod common;
pub(crate) mod error;
pub mod hash;
pub(crate) mod map;
pub(crate) mod views;

pub use builder::ConcurrentMapBuilder;
pub use error::MapError;
pub use map::ConcurrentMap;
pub use views::{EntrySet, Iter, KeyIter, KeySet, ValueIter, Values};

/// A map from strings to strings.
pub type StringMap = ConcurrentMap<String, String>;

#[cfg(test)]
mod tests {
    #[test]
    fn map_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}

        assert_send_sync::<crate::StringMap>();
        assert_send_sync::<crate::ConcurrentMap<u64, Vec<u8>, crate::hash::HashCodeHasher>>();
    }
}
