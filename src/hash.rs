//! Hashing capability used by [`ConcurrentMap`][map].
//!
//! A map never hashes a key by itself. It asks a [`KeyHasher`] for the key's
//! 32-bit *intrinsic* hash code and then spreads the high bits of that code
//! into the low bits with [`spread`]. Only the low bits select a bucket (the
//! bucket count is always a power of two), so without spreading, keys whose
//! hash codes differ only in the upper half would all pile up in the same
//! bucket.
//!
//! The default hasher, [`HashCodeHasher`], uses the [`HashCode`] trait. Its
//! string implementation is the classic polynomial hash (`31 * h + c` over
//! UTF-16 code units), so hash codes are stable across runs and processes. Any
//! `std::hash::BuildHasher` can be used instead through
//! [`BuildHasherAdapter`].
//!
//! [map]: ./struct.ConcurrentMap.html

use std::{
    hash::{BuildHasher, Hash, Hasher},
    rc::Rc,
    sync::Arc,
};

/// The hasher used by maps created without an explicit hasher.
pub type DefaultKeyHasher = HashCodeHasher;

/// Mixes the upper 16 bits of an intrinsic hash code into the lower 16 bits.
///
/// ```rust
/// use salient::hash::spread;
///
/// assert_eq!(spread(0x0001_0000), 0x0001_0001);
/// assert_eq!(spread(7), 7);
/// ```
#[inline]
pub fn spread(h: u32) -> u32 {
    h ^ (h >> 16)
}

/// A type with a deterministic 32-bit hash code.
///
/// Equal values must return equal hash codes, and a value must return the same
/// code every time it is asked while it is stored in a map.
pub trait HashCode {
    fn hash_code(&self) -> u32;
}

impl HashCode for str {
    fn hash_code(&self) -> u32 {
        self.encode_utf16()
            .fold(0u32, |h, unit| h.wrapping_mul(31).wrapping_add(u32::from(unit)))
    }
}

impl HashCode for String {
    #[inline]
    fn hash_code(&self) -> u32 {
        self.as_str().hash_code()
    }
}

impl<T: HashCode + ?Sized> HashCode for &T {
    #[inline]
    fn hash_code(&self) -> u32 {
        (**self).hash_code()
    }
}

impl<T: HashCode + ?Sized> HashCode for Box<T> {
    #[inline]
    fn hash_code(&self) -> u32 {
        (**self).hash_code()
    }
}

impl<T: HashCode + ?Sized> HashCode for Arc<T> {
    #[inline]
    fn hash_code(&self) -> u32 {
        (**self).hash_code()
    }
}

impl<T: HashCode + ?Sized> HashCode for Rc<T> {
    #[inline]
    fn hash_code(&self) -> u32 {
        (**self).hash_code()
    }
}

impl HashCode for bool {
    fn hash_code(&self) -> u32 {
        if *self {
            1231
        } else {
            1237
        }
    }
}

impl HashCode for char {
    fn hash_code(&self) -> u32 {
        *self as u32
    }
}

macro_rules! narrow_hash_code {
    ($($t:ty),*) => {
        $(
            impl HashCode for $t {
                #[inline]
                fn hash_code(&self) -> u32 {
                    *self as u32
                }
            }
        )*
    };
}

macro_rules! wide_hash_code {
    ($($t:ty),*) => {
        $(
            impl HashCode for $t {
                #[inline]
                fn hash_code(&self) -> u32 {
                    let v = *self as u64;
                    (v ^ (v >> 32)) as u32
                }
            }
        )*
    };
}

narrow_hash_code!(u8, u16, u32, i8, i16, i32);
wide_hash_code!(u64, i64, usize, isize);

/// Supplies the intrinsic hash code of keys of type `K`.
///
/// `K` may be a borrowed form of a map's key type (`str` for `String` keys).
/// In that case the hasher must return the same code for the owned and the
/// borrowed form of a key.
pub trait KeyHasher<K: ?Sized> {
    fn intrinsic_hash(&self, key: &K) -> u32;
}

/// A [`KeyHasher`] that asks the key itself through [`HashCode`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HashCodeHasher;

impl<K: HashCode + ?Sized> KeyHasher<K> for HashCodeHasher {
    #[inline]
    fn intrinsic_hash(&self, key: &K) -> u32 {
        key.hash_code()
    }
}

/// A [`KeyHasher`] backed by any `std::hash::BuildHasher`, such as
/// `std::collections::hash_map::RandomState` or `ahash::RandomState`.
///
/// The 64-bit output of the hasher is folded into 32 bits.
#[derive(Clone, Debug, Default)]
pub struct BuildHasherAdapter<S> {
    build_hasher: S,
}

impl<S> BuildHasherAdapter<S> {
    pub fn new(build_hasher: S) -> Self {
        Self { build_hasher }
    }

    pub fn build_hasher(&self) -> &S {
        &self.build_hasher
    }
}

impl<K, S> KeyHasher<K> for BuildHasherAdapter<S>
where
    K: Hash + ?Sized,
    S: BuildHasher,
{
    fn intrinsic_hash(&self, key: &K) -> u32 {
        let mut hasher = self.build_hasher.build_hasher();
        key.hash(&mut hasher);
        let h = hasher.finish();

        (h ^ (h >> 32)) as u32
    }
}

/// Computes the final hash of a possibly absent key. The absent key always
/// hashes to 0 and never reaches the hasher.
#[inline]
pub(crate) fn final_hash<Q, S>(hasher: &S, key: Option<&Q>) -> u32
where
    Q: ?Sized,
    S: KeyHasher<Q>,
{
    match key {
        None => 0,
        Some(key) => spread(hasher.intrinsic_hash(key)),
    }
}

#[cfg(test)]
mod tests {
    use super::{final_hash, spread, BuildHasherAdapter, HashCode, HashCodeHasher, KeyHasher};

    use std::{
        collections::hash_map::RandomState,
        sync::atomic::{AtomicUsize, Ordering},
    };

    #[test]
    fn string_hash_codes_are_polynomial() {
        assert_eq!("".hash_code(), 0);
        assert_eq!("hello".hash_code(), 99_162_322);
        assert_eq!("TAB1".hash_code(), 2_567_004);
        assert_eq!("TAB2".hash_code(), 2_567_005);
        assert_eq!(String::from("TAB1").hash_code(), "TAB1".hash_code());

        // Characters outside the BMP hash as their surrogate pair.
        assert_eq!("\u{1F600}".hash_code(), 1_772_899);

        // A well known collision.
        assert_eq!("Aa".hash_code(), "BB".hash_code());
    }

    #[test]
    fn scalar_hash_codes() {
        assert_eq!(42i32.hash_code(), 42);
        assert_eq!((-1i32).hash_code(), u32::MAX);
        assert_eq!(0x1_0000_0001u64.hash_code(), 0);
        assert_eq!(true.hash_code(), 1231);
        assert_eq!(false.hash_code(), 1237);
        assert_eq!('a'.hash_code(), 97);
    }

    #[test]
    fn spread_mixes_high_bits_into_low_bits() {
        for h in [0u32, 1, 0xFFFF, 0x1_0000, 0xDEAD_BEEF, u32::MAX] {
            assert_eq!(spread(h), h ^ (h >> 16));
        }

        // Two codes that only differ in the upper half end up in different
        // buckets of a 16 bucket table once spread.
        let (a, b) = (0x0001_0000u32, 0x0002_0000u32);
        assert_eq!(a & 15, b & 15);
        assert_ne!(spread(a) & 15, spread(b) & 15);
    }

    #[test]
    fn final_hash_is_deterministic() {
        let hasher = HashCodeHasher;
        for key in ["TAB1", "TAB2", "", "a much longer key than the others"] {
            let expected = key.hash_code() ^ (key.hash_code() >> 16);
            assert_eq!(final_hash(&hasher, Some(key)), expected);
            assert_eq!(final_hash(&hasher, Some(key)), expected);
        }
    }

    #[test]
    fn absent_key_never_reaches_the_hasher() {
        struct Counting(AtomicUsize);

        impl KeyHasher<str> for Counting {
            fn intrinsic_hash(&self, key: &str) -> u32 {
                self.0.fetch_add(1, Ordering::Relaxed);
                key.hash_code()
            }
        }

        let hasher = Counting(AtomicUsize::default());
        assert_eq!(final_hash::<str, _>(&hasher, None), 0);
        assert_eq!(hasher.0.load(Ordering::Relaxed), 0);

        final_hash(&hasher, Some("TAB1"));
        assert_eq!(hasher.0.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn build_hasher_adapter_agrees_on_borrowed_forms() {
        let hasher = BuildHasherAdapter::new(RandomState::new());
        let owned = String::from("TAB1");

        assert_eq!(
            KeyHasher::<String>::intrinsic_hash(&hasher, &owned),
            KeyHasher::<str>::intrinsic_hash(&hasher, "TAB1")
        );
    }
}
