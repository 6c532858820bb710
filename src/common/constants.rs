/// The default number of buckets of a new map. Must be a power of two.
pub(crate) const DEFAULT_CAPACITY: usize = 16;

/// The smallest bucket array a map will ever allocate.
pub(crate) const MIN_CAPACITY: usize = 2;

/// The largest bucket array a map will ever allocate. Once a table reaches
/// this size it is no longer resized, regardless of the load factor.
pub(crate) const MAXIMUM_CAPACITY: usize = 1 << 30;

pub(crate) const DEFAULT_LOAD_FACTOR: f32 = 0.75;

/// A chain holding more entries than this is converted into a tree.
pub(crate) const TREEIFY_THRESHOLD: usize = 8;

/// A tree split by a resize is converted back into a chain when one of its
/// halves holds this many entries or fewer.
pub(crate) const UNTREEIFY_THRESHOLD: usize = 6;

/// Below this table capacity an overfull chain triggers a resize instead of
/// being converted into a tree.
pub(crate) const MIN_TREEIFY_CAPACITY: usize = 64;

// Inline capacity of a chain bucket before it spills to the heap.
pub(crate) const INLINE_CHAIN_LEN: usize = 2;
