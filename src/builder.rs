use crate::{
    common::constants::{
        DEFAULT_CAPACITY, DEFAULT_LOAD_FACTOR, MAXIMUM_CAPACITY, MIN_CAPACITY,
        MIN_TREEIFY_CAPACITY, TREEIFY_THRESHOLD, UNTREEIFY_THRESHOLD,
    },
    error::MapError,
    hash::{DefaultKeyHasher, KeyHasher},
    ConcurrentMap,
};

use std::marker::PhantomData;

/// Builds a [`ConcurrentMap`][map-struct] with various configuration knobs.
///
/// [map-struct]: ./struct.ConcurrentMap.html
///
/// # Examples
///
/// ```rust
/// use salient::ConcurrentMapBuilder;
///
/// let map = ConcurrentMapBuilder::new()
///     // Start with 1,024 buckets.
///     .initial_capacity(1024)
///     // Resize once the map is half full.
///     .load_factor(0.5)
///     .build();
///
/// map.put("TAB1".to_string(), "A".to_string());
/// assert_eq!(map.capacity(), 1024);
/// ```
///
pub struct ConcurrentMapBuilder<K, V> {
    config: MapConfig,
    map_type: PhantomData<fn() -> (K, V)>,
}

impl<K, V> Default for ConcurrentMapBuilder<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> ConcurrentMapBuilder<K, V> {
    /// Construct a new `ConcurrentMapBuilder` with the default configuration:
    /// 16 buckets, a load factor of 0.75, chains tree-ified past 8 entries in
    /// tables of at least 64 buckets.
    pub fn new() -> Self {
        Self {
            config: MapConfig::default(),
            map_type: PhantomData,
        }
    }

    /// Sets the number of buckets the map starts with. The value is rounded up
    /// to a power of two and clamped to the supported range.
    pub fn initial_capacity(self, capacity: usize) -> Self {
        Self {
            config: MapConfig {
                initial_capacity: capacity,
                ..self.config
            },
            ..self
        }
    }

    /// Sets the ratio of entries to buckets above which the map doubles its
    /// bucket array.
    ///
    /// # Panics
    ///
    /// Panics if `load_factor` is not a finite number in `(0.0, 1.0]`.
    pub fn load_factor(self, load_factor: f32) -> Self {
        assert!(
            load_factor.is_finite() && load_factor > 0.0 && load_factor <= 1.0,
            "load factor must be in (0.0, 1.0], got {load_factor}"
        );

        Self {
            config: MapConfig {
                load_factor,
                ..self.config
            },
            ..self
        }
    }

    /// Sets the number of entries a chain bucket may hold before it is
    /// converted into a tree.
    ///
    /// The treeify threshold must end up greater than the untreeify
    /// threshold. That is checked when the map is built, so the two can be set
    /// in either order.
    ///
    /// # Panics
    ///
    /// Panics if `threshold` is less than 2.
    pub fn treeify_threshold(self, threshold: usize) -> Self {
        assert!(threshold >= 2, "treeify threshold must be at least 2");

        Self {
            config: MapConfig {
                treeify_threshold: threshold,
                ..self.config
            },
            ..self
        }
    }

    /// Sets the size at or below which a tree bucket split by a resize goes
    /// back to being a chain. It must be less than the treeify threshold by
    /// the time the map is built.
    pub fn untreeify_threshold(self, threshold: usize) -> Self {
        Self {
            config: MapConfig {
                untreeify_threshold: threshold,
                ..self.config
            },
            ..self
        }
    }

    /// Sets the smallest bucket count at which overfull chains are tree-ified.
    /// Smaller tables are resized instead.
    pub fn min_treeify_capacity(self, capacity: usize) -> Self {
        Self {
            config: MapConfig {
                min_treeify_capacity: capacity,
                ..self.config
            },
            ..self
        }
    }

    /// Builds a `ConcurrentMap<K, V>` hashing its keys with the default
    /// [`HashCodeHasher`][hash-code-hasher].
    ///
    /// # Panics
    ///
    /// Panics if the untreeify threshold is not less than the treeify
    /// threshold, or if the initial bucket array cannot be allocated. Use
    /// [`try_build`](#method.try_build) to handle that case.
    ///
    /// [hash-code-hasher]: ./hash/struct.HashCodeHasher.html
    pub fn build(self) -> ConcurrentMap<K, V, DefaultKeyHasher>
    where
        K: Ord,
        DefaultKeyHasher: KeyHasher<K>,
    {
        self.build_with_hasher(DefaultKeyHasher::default())
    }

    /// Builds a `ConcurrentMap<K, V, S>`, with the given `hasher`.
    ///
    /// # Panics
    ///
    /// Panics if the untreeify threshold is not less than the treeify
    /// threshold, or if the initial bucket array cannot be allocated.
    pub fn build_with_hasher<S>(self, hasher: S) -> ConcurrentMap<K, V, S>
    where
        K: Ord,
        S: KeyHasher<K>,
    {
        match self.try_build_with_hasher(hasher) {
            Ok(map) => map,
            Err(e) => panic!("{e}"),
        }
    }

    /// Builds a `ConcurrentMap<K, V>`, returning an error if the initial bucket
    /// array cannot be allocated.
    pub fn try_build(self) -> Result<ConcurrentMap<K, V, DefaultKeyHasher>, MapError>
    where
        K: Ord,
        DefaultKeyHasher: KeyHasher<K>,
    {
        self.try_build_with_hasher(DefaultKeyHasher::default())
    }

    /// Builds a `ConcurrentMap<K, V, S>` with the given `hasher`, returning an
    /// error if the initial bucket array cannot be allocated.
    ///
    /// # Panics
    ///
    /// Panics if the untreeify threshold is not less than the treeify
    /// threshold.
    pub fn try_build_with_hasher<S>(self, hasher: S) -> Result<ConcurrentMap<K, V, S>, MapError>
    where
        K: Ord,
        S: KeyHasher<K>,
    {
        self.config.validate();
        ConcurrentMap::with_everything(self.config, hasher)
    }
}

/// Tuning of a map, fixed at construction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct MapConfig {
    pub(crate) initial_capacity: usize,
    pub(crate) load_factor: f32,
    pub(crate) treeify_threshold: usize,
    pub(crate) untreeify_threshold: usize,
    pub(crate) min_treeify_capacity: usize,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_CAPACITY,
            load_factor: DEFAULT_LOAD_FACTOR,
            treeify_threshold: TREEIFY_THRESHOLD,
            untreeify_threshold: UNTREEIFY_THRESHOLD,
            min_treeify_capacity: MIN_TREEIFY_CAPACITY,
        }
    }
}

impl MapConfig {
    fn validate(&self) {
        assert!(
            self.untreeify_threshold < self.treeify_threshold,
            "untreeify threshold must be less than the treeify threshold"
        );
    }

    /// The number of buckets of the first table.
    pub(crate) fn table_capacity(&self) -> usize {
        self.initial_capacity
            .clamp(MIN_CAPACITY, MAXIMUM_CAPACITY)
            .next_power_of_two()
    }

    /// The largest entry count a table of `capacity` buckets may hold.
    pub(crate) fn resize_threshold(&self, capacity: usize) -> usize {
        if capacity >= MAXIMUM_CAPACITY {
            return usize::MAX;
        }
        ((capacity as f64 * f64::from(self.load_factor)) as usize).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::{ConcurrentMapBuilder, MapConfig};
    use crate::{
        common::constants::MAXIMUM_CAPACITY,
        hash::{BuildHasherAdapter, KeyHasher},
    };

    use std::collections::hash_map::RandomState;

    #[test]
    fn build_map() {
        // ConcurrentMap<String, String>
        let map = ConcurrentMapBuilder::new().build();
        assert_eq!(map.capacity(), 16);
        assert_eq!(map.config(), &MapConfig::default());

        map.put("a".to_string(), "Alice".to_string());
        assert_eq!(map.get("a"), Some("Alice".to_string()));

        let map = ConcurrentMapBuilder::new()
            .initial_capacity(100)
            .load_factor(0.5)
            .treeify_threshold(12)
            .untreeify_threshold(4)
            .min_treeify_capacity(256)
            .build();

        assert_eq!(map.capacity(), 128);
        assert_eq!(map.config().load_factor, 0.5);
        assert_eq!(map.config().treeify_threshold, 12);
        assert_eq!(map.config().untreeify_threshold, 4);
        assert_eq!(map.config().min_treeify_capacity, 256);

        map.put('b', "Bob");
        assert_eq!(map.get(&'b'), Some("Bob"));
    }

    #[test]
    fn build_map_with_hasher() {
        let hasher = BuildHasherAdapter::new(RandomState::new());
        let map = ConcurrentMapBuilder::new().build_with_hasher(hasher.clone());

        map.put("key".to_string(), 1);
        assert_eq!(map.get("key"), Some(1));
        assert_eq!(
            KeyHasher::<str>::intrinsic_hash(map.hasher(), "key"),
            KeyHasher::<str>::intrinsic_hash(&hasher, "key")
        );
    }

    #[test]
    fn capacity_is_rounded_and_clamped() {
        let config = |initial_capacity| MapConfig {
            initial_capacity,
            ..MapConfig::default()
        };

        assert_eq!(config(0).table_capacity(), 2);
        assert_eq!(config(1).table_capacity(), 2);
        assert_eq!(config(17).table_capacity(), 32);
        assert_eq!(config(64).table_capacity(), 64);
        assert_eq!(config(usize::MAX).table_capacity(), MAXIMUM_CAPACITY);
    }

    #[test]
    fn resize_threshold_follows_load_factor() {
        let config = MapConfig::default();
        assert_eq!(config.resize_threshold(2), 1);
        assert_eq!(config.resize_threshold(16), 12);
        assert_eq!(config.resize_threshold(64), 48);
        assert_eq!(config.resize_threshold(MAXIMUM_CAPACITY), usize::MAX);

        let full = MapConfig {
            load_factor: 1.0,
            ..config
        };
        assert_eq!(full.resize_threshold(16), 16);
    }

    #[test]
    #[should_panic(expected = "load factor must be in (0.0, 1.0]")]
    fn zero_load_factor_is_rejected() {
        let _ = ConcurrentMapBuilder::<String, String>::new().load_factor(0.0);
    }

    #[test]
    #[should_panic(expected = "untreeify threshold must be less than the treeify threshold")]
    fn untreeify_threshold_must_stay_below_treeify_threshold() {
        let _ = ConcurrentMapBuilder::<String, String>::new()
            .untreeify_threshold(8)
            .build();
    }

    #[test]
    fn tree_thresholds_can_be_set_in_any_order() {
        let lowered = ConcurrentMapBuilder::<String, String>::new()
            .treeify_threshold(4)
            .untreeify_threshold(2)
            .build();
        assert_eq!(lowered.config().treeify_threshold, 4);
        assert_eq!(lowered.config().untreeify_threshold, 2);

        let raised = ConcurrentMapBuilder::<String, String>::new()
            .untreeify_threshold(10)
            .treeify_threshold(12)
            .build();
        assert_eq!(raised.config().treeify_threshold, 12);
        assert_eq!(raised.config().untreeify_threshold, 10);
    }

    #[test]
    #[should_panic(expected = "untreeify threshold must be less than the treeify threshold")]
    fn try_build_checks_the_tree_thresholds() {
        let _ = ConcurrentMapBuilder::<String, String>::new()
            .treeify_threshold(4)
            .try_build();
    }
}
