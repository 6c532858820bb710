use crate::common::constants::INLINE_CHAIN_LEN;

use std::{borrow::Borrow, collections::BTreeMap, mem};

use smallvec::SmallVec;

pub(crate) type Chain<K, V> = SmallVec<[Node<K, V>; INLINE_CHAIN_LEN]>;

/// The contents of a single bucket.
///
/// A bucket starts out as a chain kept in insertion order. A chain that grows
/// past the treeify threshold is converted into a tree ordered by final hash,
/// then by key. Once a resize has copied a bucket into the next table, the
/// bucket is left `Forwarded`; operations that find it must retry on the next
/// table.
pub(crate) enum Bin<K, V> {
    Chain(Chain<K, V>),
    Tree(Tree<K, V>),
    Forwarded,
}

#[derive(Debug)]
pub(crate) struct Node<K, V> {
    pub(crate) hash: u32,
    pub(crate) key: Option<K>,
    pub(crate) value: V,
}

/// The entries of a tree bucket, grouped by final hash. Inside a group the
/// keys are ordered by `Ord`, so a lookup is two logarithmic searches even
/// when every key of the bucket has the same hash.
pub(crate) struct Tree<K, V> {
    groups: BTreeMap<u32, HashGroup<K, V>>,
    len: usize,
}

struct HashGroup<K, V> {
    // Only the group of hash 0 ever holds the absent key.
    absent: Option<V>,
    keyed: BTreeMap<K, V>,
}

#[derive(Debug, Eq, PartialEq)]
pub(crate) struct RelocatedError;

impl<K, V> Default for Bin<K, V> {
    fn default() -> Self {
        Bin::Chain(SmallVec::new())
    }
}

impl<K, V> HashGroup<K, V> {
    fn new() -> Self {
        Self {
            absent: None,
            keyed: BTreeMap::new(),
        }
    }

    fn len(&self) -> usize {
        self.keyed.len() + usize::from(self.absent.is_some())
    }
}

impl<K, V> Tree<K, V> {
    fn from_groups(groups: BTreeMap<u32, HashGroup<K, V>>) -> Self {
        let len = groups.values().map(HashGroup::len).sum();
        Self { groups, len }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Calls `f` with every entry, in hash order. The absent key comes first
    /// in its group.
    fn for_each(&self, f: &mut impl FnMut(Option<&K>, &V)) {
        for group in self.groups.values() {
            if let Some(value) = &group.absent {
                f(None, value);
            }
            for (key, value) in &group.keyed {
                f(Some(key), value);
            }
        }
    }

    fn into_nodes(self) -> impl Iterator<Item = Node<K, V>> {
        self.groups.into_iter().flat_map(|(hash, group)| {
            let absent = group.absent.map(|value| Node {
                hash,
                key: None,
                value,
            });
            let keyed = group.keyed.into_iter().map(move |(key, value)| Node {
                hash,
                key: Some(key),
                value,
            });
            absent.into_iter().chain(keyed)
        })
    }

    /// Splits the groups by `bit` of their hash. Keys are never compared.
    fn split(self, bit: usize) -> (Self, Self) {
        let (lo, hi): (BTreeMap<_, _>, BTreeMap<_, _>) = self
            .groups
            .into_iter()
            .partition(|(hash, _)| *hash as usize & bit == 0);
        (Self::from_groups(lo), Self::from_groups(hi))
    }
}

impl<K: Ord, V> Tree<K, V> {
    fn get<Q>(&self, hash: u32, key: Option<&Q>) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let group = self.groups.get(&hash)?;
        match key {
            None => group.absent.as_ref(),
            Some(key) => group.keyed.get(key),
        }
    }

    fn get_mut<Q>(&mut self, hash: u32, key: Option<&Q>) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let group = self.groups.get_mut(&hash)?;
        match key {
            None => group.absent.as_mut(),
            Some(key) => group.keyed.get_mut(key),
        }
    }

    fn insert(&mut self, hash: u32, key: Option<K>, value: V) -> Option<V> {
        let group = self.groups.entry(hash).or_insert_with(HashGroup::new);
        let previous = match key {
            None => group.absent.replace(value),
            Some(key) => group.keyed.insert(key, value),
        };
        if previous.is_none() {
            self.len += 1;
        }
        previous
    }
}

impl<K: Ord, V> FromIterator<Node<K, V>> for Tree<K, V> {
    fn from_iter<I: IntoIterator<Item = Node<K, V>>>(nodes: I) -> Self {
        let mut tree = Self::from_groups(BTreeMap::new());
        for Node { hash, key, value } in nodes {
            tree.insert(hash, key, value);
        }
        tree
    }
}

impl<K, V> Bin<K, V> {
    pub(crate) fn len(&self) -> usize {
        match self {
            Bin::Chain(chain) => chain.len(),
            Bin::Tree(tree) => tree.len(),
            Bin::Forwarded => 0,
        }
    }

    pub(crate) fn is_forwarded(&self) -> bool {
        matches!(self, Bin::Forwarded)
    }

    pub(crate) fn is_tree(&self) -> bool {
        matches!(self, Bin::Tree(_))
    }

    /// Calls `f` with every entry of this bucket.
    pub(crate) fn for_each(
        &self,
        mut f: impl FnMut(Option<&K>, &V),
    ) -> Result<(), RelocatedError> {
        match self {
            Bin::Chain(chain) => chain.iter().for_each(|n| f(n.key.as_ref(), &n.value)),
            Bin::Tree(tree) => tree.for_each(&mut f),
            Bin::Forwarded => return Err(RelocatedError),
        }
        Ok(())
    }

    /// Moves every entry of this bucket into two new buckets: entries whose
    /// hash has `bit` clear go to the first, the others to the second. Chains
    /// keep their relative order. A tree half holding `untreeify_threshold`
    /// entries or fewer becomes a chain.
    pub(crate) fn split(self, bit: usize, untreeify_threshold: usize) -> (Self, Self) {
        match self {
            Bin::Chain(chain) => {
                let (lo, hi): (Chain<K, V>, Chain<K, V>) = chain
                    .into_iter()
                    .partition(|node| node.hash as usize & bit == 0);
                (Bin::Chain(lo), Bin::Chain(hi))
            }
            Bin::Tree(tree) => {
                let (lo, hi) = tree.split(bit);
                (
                    Self::from_tree(lo, untreeify_threshold),
                    Self::from_tree(hi, untreeify_threshold),
                )
            }
            Bin::Forwarded => unreachable!("a bucket is never forwarded twice"),
        }
    }

    fn from_tree(tree: Tree<K, V>, untreeify_threshold: usize) -> Self {
        if tree.len() > untreeify_threshold {
            return Bin::Tree(tree);
        }

        #[cfg(feature = "logging")]
        log::trace!("untreeifying a bucket of {} entries", tree.len());

        Bin::Chain(tree.into_nodes().collect())
    }
}

impl<K: Ord, V> Bin<K, V> {
    /// Looks up the value of a key. The bucket must have been selected with
    /// `hash`.
    pub(crate) fn get<Q>(
        &self,
        hash: u32,
        key: Option<&Q>,
    ) -> Result<Option<&V>, RelocatedError>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let found = match self {
            Bin::Chain(chain) => chain
                .iter()
                .find(|node| node.hash == hash && key_matches(&node.key, key))
                .map(|node| &node.value),
            Bin::Tree(tree) => tree.get(hash, key),
            Bin::Forwarded => return Err(RelocatedError),
        };

        Ok(found)
    }

    /// Inserts or replaces the value of a key, returning the replaced value.
    ///
    /// # Panics
    ///
    /// Panics if the bucket is forwarded. Callers must check under the same
    /// lock.
    pub(crate) fn insert(&mut self, hash: u32, key: Option<K>, value: V) -> Option<V> {
        match self {
            Bin::Chain(chain) => {
                if let Some(node) = chain
                    .iter_mut()
                    .find(|node| node.hash == hash && node.key == key)
                {
                    Some(mem::replace(&mut node.value, value))
                } else {
                    chain.push(Node { hash, key, value });
                    None
                }
            }
            Bin::Tree(tree) => tree.insert(hash, key, value),
            Bin::Forwarded => unreachable!("insert into a forwarded bucket"),
        }
    }

    /// Looks up a mutable reference to the value of a key.
    ///
    /// # Panics
    ///
    /// Panics if the bucket is forwarded.
    pub(crate) fn get_mut<Q>(&mut self, hash: u32, key: Option<&Q>) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        match self {
            Bin::Chain(chain) => chain
                .iter_mut()
                .find(|node| node.hash == hash && key_matches(&node.key, key))
                .map(|node| &mut node.value),
            Bin::Tree(tree) => tree.get_mut(hash, key),
            Bin::Forwarded => unreachable!("write to a forwarded bucket"),
        }
    }

    /// Converts a chain into a tree. Does nothing to a tree.
    pub(crate) fn treeify(&mut self) {
        if let Bin::Chain(chain) = self {
            let tree = mem::take(chain).into_iter().collect();
            *self = Bin::Tree(tree);
        }
    }
}

fn key_matches<K, Q>(stored: &Option<K>, key: Option<&Q>) -> bool
where
    K: Borrow<Q>,
    Q: Eq + ?Sized,
{
    match (stored, key) {
        (None, None) => true,
        (Some(stored), Some(key)) => Borrow::<Q>::borrow(stored) == key,
        _ => false,
    }
}
