//! The B+Tree map and its insertion protocol.

use std::fmt;

use log::{debug, warn};

use strata_common::{AccessCounter, Result, StrataError};

use super::arena::{InternalNode, LeafNode, Node, NodeArena, NodeId};

/// Maximum fanout of a B+Tree node. A node holds up to `ORDER - 1` keys
/// and up to `ORDER` children (or `ORDER - 1` values plus the sibling
/// link for leaves).
pub const ORDER: usize = 5;

/// Maximum number of keys per node.
const MAX_KEYS: usize = ORDER - 1;

/// Number of keys the left node keeps when splitting.
const SPLIT_KEEP: usize = ORDER / 2;

/// Expected maximum tree height, used to presize the ancestor stack.
const MAX_HEIGHT: usize = 16;

/// Ordered map over a B+Tree.
///
/// Supports point lookups, duplicate-rejecting insertion, and range
/// queries over the leaf chain. `size` is the live key count. Not
/// thread-safe; concurrent mutation is undefined.
pub struct BPlusTreeMap<K, V> {
    arena: NodeArena<K, V>,
    root: NodeId,
    access: AccessCounter,
}

impl<K, V> BPlusTreeMap<K, V>
where
    K: Ord + Clone + fmt::Debug,
{
    /// Creates an empty map: a single empty leaf as root.
    pub fn new() -> Self {
        let mut arena = NodeArena::new();
        let root = arena.allocate(Node::Leaf(LeafNode::new(MAX_KEYS)));
        Self {
            arena,
            root,
            access: AccessCounter::new(),
        }
    }

    /// Looks up the value for `key`, bumping the access counter once per
    /// node visited.
    pub fn get(&self, key: &K) -> Option<&V> {
        let mut id = self.root;
        loop {
            self.access.record();
            match self.arena.node(id) {
                Node::Internal(node) => id = node.child_for(key),
                Node::Leaf(leaf) => {
                    return leaf
                        .keys
                        .iter()
                        .position(|k| k == key)
                        .map(|idx| &leaf.values[idx]);
                }
            }
        }
    }

    /// Inserts a key-value pair. A duplicate key is rejected with a
    /// logged diagnostic and leaves the map unchanged.
    pub fn put(&mut self, key: K, value: V) {
        if let Err(err) = self.try_put(key, value) {
            warn!("insert rejected: {err}");
        }
    }

    /// Inserts a key-value pair, returning `Err(DuplicateKey)` when the
    /// key is already present. The map is not modified on rejection.
    pub fn try_put(&mut self, key: K, value: V) -> Result<()> {
        // descend to the target leaf, remembering the ancestor stack
        let mut path: Vec<NodeId> = Vec::with_capacity(MAX_HEIGHT);
        let mut id = self.root;
        loop {
            match self.arena.node(id) {
                Node::Internal(node) => {
                    // a separator equals the smallest key of its right
                    // subtree, so matching one on the way down means the
                    // key already exists
                    if node.keys.iter().any(|sep| *sep == key) {
                        return Err(StrataError::duplicate_key(&key));
                    }
                    path.push(id);
                    id = node.child_for(&key);
                }
                Node::Leaf(leaf) => {
                    if leaf.keys.iter().any(|k| *k == key) {
                        return Err(StrataError::duplicate_key(&key));
                    }
                    break;
                }
            }
        }

        // room in the leaf: wedge at the sorted position
        if self.arena.leaf(id).keys.len() < MAX_KEYS {
            let leaf = self.arena.leaf_mut(id);
            let pos = leaf
                .keys
                .iter()
                .position(|k| key < *k)
                .unwrap_or(leaf.keys.len());
            leaf.keys.insert(pos, key);
            leaf.values.insert(pos, value);
            return Ok(());
        }

        // split the leaf, then propagate promoted keys up the ancestors
        let (mut promoted, mut new_child) = self.split_leaf(id, key, value);
        let mut left = id;
        while let Some(parent) = path.pop() {
            if self.arena.internal(parent).keys.len() < MAX_KEYS {
                let node = self.arena.internal_mut(parent);
                let pos = node
                    .keys
                    .iter()
                    .position(|k| promoted < *k)
                    .unwrap_or(node.keys.len());
                node.keys.insert(pos, promoted);
                node.children.insert(pos + 1, new_child);
                return Ok(());
            }
            let (key_up, sibling) = self.split_internal(parent, promoted, new_child);
            promoted = key_up;
            new_child = sibling;
            left = parent;
        }

        // the split reached the top: raise a new root
        self.root = self.arena.allocate(Node::Internal(InternalNode {
            keys: vec![promoted],
            children: vec![left, new_child],
        }));
        debug!("root split, tree height increased");
        Ok(())
    }

    /// Splits a full leaf while inserting `key`/`value`, returning the
    /// promoted key and the new sibling.
    ///
    /// The leaf keeps its first `SPLIT_KEEP` keys; the sibling takes the
    /// rest. The pending entry lands on whichever side its sorted position
    /// (over the pre-split keys) falls. The promoted key is the sibling's
    /// smallest and stays in the sibling.
    fn split_leaf(&mut self, id: NodeId, key: K, value: V) -> (K, NodeId) {
        let (mut right_keys, mut right_values, old_next, pos) = {
            let leaf = self.arena.leaf_mut(id);
            let pos = leaf
                .keys
                .iter()
                .position(|k| key < *k)
                .unwrap_or(leaf.keys.len());
            let right_keys = leaf.keys.split_off(SPLIT_KEEP);
            let right_values = leaf.values.split_off(SPLIT_KEEP);
            (right_keys, right_values, leaf.next.take(), pos)
        };

        if pos < SPLIT_KEEP {
            let leaf = self.arena.leaf_mut(id);
            leaf.keys.insert(pos, key);
            leaf.values.insert(pos, value);
        } else {
            right_keys.insert(pos - SPLIT_KEEP, key);
            right_values.insert(pos - SPLIT_KEEP, value);
        }

        let promoted = right_keys[0].clone();
        let sibling = self.arena.allocate(Node::Leaf(LeafNode {
            keys: right_keys,
            values: right_values,
            next: old_next,
        }));
        self.arena.leaf_mut(id).next = Some(sibling);
        debug!("leaf split, promoted key {promoted:?}");
        (promoted, sibling)
    }

    /// Splits a full internal node while wedging `key`/`child`, returning
    /// the promoted key and the new sibling.
    ///
    /// Same mid rule as leaves, except the promoted key moves up instead
    /// of being duplicated into the right node.
    fn split_internal(&mut self, id: NodeId, key: K, child: NodeId) -> (K, NodeId) {
        let (mut right_keys, mut right_children, pos) = {
            let node = self.arena.internal_mut(id);
            let pos = node
                .keys
                .iter()
                .position(|k| key < *k)
                .unwrap_or(node.keys.len());
            let right_keys = node.keys.split_off(SPLIT_KEEP);
            let right_children = node.children.split_off(SPLIT_KEEP + 1);
            (right_keys, right_children, pos)
        };

        if pos < SPLIT_KEEP {
            let node = self.arena.internal_mut(id);
            node.keys.insert(pos, key);
            node.children.insert(pos + 1, child);
        } else {
            let rpos = pos - SPLIT_KEEP;
            right_keys.insert(rpos, key);
            right_children.insert(rpos, child);
        }

        let promoted = right_keys.remove(0);
        let sibling = self.arena.allocate(Node::Internal(InternalNode {
            keys: right_keys,
            children: right_children,
        }));
        (promoted, sibling)
    }

    /// Returns the smallest key, or `None` on an empty map.
    pub fn first_key(&self) -> Option<&K> {
        self.arena.leaf(self.first_leaf()).keys.first()
    }

    /// Returns the largest key, or `None` on an empty map.
    pub fn last_key(&self) -> Option<&K> {
        let mut id = self.root;
        loop {
            match self.arena.node(id) {
                Node::Internal(node) => id = node.children[node.children.len() - 1],
                Node::Leaf(leaf) => return leaf.keys.last(),
            }
        }
    }

    /// Iterates all entries in ascending key order by walking the leaf
    /// chain from the leftmost leaf.
    pub fn iter(&self) -> EntryIter<'_, K, V> {
        EntryIter {
            arena: &self.arena,
            leaf: Some(self.first_leaf()),
            slot: 0,
        }
    }

    /// Returns the number of keys in the map, summed over the leaf chain.
    pub fn size(&self) -> usize {
        let mut total = 0;
        let mut id = Some(self.first_leaf());
        while let Some(leaf_id) = id {
            let leaf = self.arena.leaf(leaf_id);
            total += leaf.keys.len();
            id = leaf.next;
        }
        total
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Number of nodes inspected by lookups since the last reset.
    pub fn access_count(&self) -> u64 {
        self.access.get()
    }

    pub fn reset_access_count(&self) {
        self.access.reset()
    }

    /// The leftmost leaf, i.e. the head of the leaf chain.
    fn first_leaf(&self) -> NodeId {
        let mut id = self.root;
        loop {
            match self.arena.node(id) {
                Node::Internal(node) => id = node.children[0],
                Node::Leaf(_) => return id,
            }
        }
    }
}

impl<K, V> BPlusTreeMap<K, V>
where
    K: Ord + Clone + fmt::Debug,
    V: Clone,
{
    /// Returns the entries with `lo <= key < hi` in ascending order.
    pub fn sub_map(&self, lo: &K, hi: &K) -> Vec<(K, V)> {
        self.iter()
            .filter(|&(k, _)| k >= lo && k < hi)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Returns the entries with `key < hi`, i.e. `sub_map` from the first
    /// key. Empty on an empty map.
    pub fn head_map(&self, hi: &K) -> Vec<(K, V)> {
        match self.first_key() {
            Some(first) => self.sub_map(first, hi),
            None => Vec::new(),
        }
    }

    /// Returns the entries with `lo <= key`, including the last key (the
    /// right endpoint is closed, unlike `sub_map`). Empty on an empty map.
    pub fn tail_map(&self, lo: &K) -> Vec<(K, V)> {
        let last = match self.last_key() {
            Some(last) => last,
            None => return Vec::new(),
        };
        let mut entries = self.sub_map(lo, last);
        if lo <= last {
            if let Some(value) = self.get(last) {
                entries.push((last.clone(), value.clone()));
            }
        }
        entries
    }
}

impl<K, V> Default for BPlusTreeMap<K, V>
where
    K: Ord + Clone + fmt::Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over the leaf chain, yielding entries in ascending key order.
pub struct EntryIter<'a, K, V> {
    arena: &'a NodeArena<K, V>,
    leaf: Option<NodeId>,
    slot: usize,
}

impl<'a, K, V> Iterator for EntryIter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let id = self.leaf?;
            let leaf = self.arena.leaf(id);
            if self.slot < leaf.keys.len() {
                let item = (&leaf.keys[self.slot], &leaf.values[self.slot]);
                self.slot += 1;
                return Some(item);
            }
            self.leaf = leaf.next;
            self.slot = 0;
        }
    }
}

impl<K, V> fmt::Display for BPlusTreeMap<K, V>
where
    K: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "BPlusTreeMap")?;
        writeln!(f, "-------------------------------------------")?;
        self.fmt_node(f, self.root, 0)?;
        write!(f, "-------------------------------------------")
    }
}

impl<K, V> BPlusTreeMap<K, V>
where
    K: fmt::Debug,
{
    /// Pre-order rendering, indenting one tab per level.
    fn fmt_node(&self, f: &mut fmt::Formatter<'_>, id: NodeId, level: usize) -> fmt::Result {
        for _ in 0..level {
            write!(f, "\t")?;
        }
        write!(f, "[ . ")?;
        match self.arena.node(id) {
            Node::Leaf(leaf) => {
                for key in &leaf.keys {
                    write!(f, "{key:?} . ")?;
                }
                writeln!(f, "]")
            }
            Node::Internal(node) => {
                for key in &node.keys {
                    write!(f, "{key:?} . ")?;
                }
                writeln!(f, "]")?;
                for &child in &node.children {
                    self.fmt_node(f, child, level + 1)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Walks the whole tree checking the structural invariants: uniform
    /// leaf depth, per-node occupancy, strictly ascending keys, routing
    /// bounds, and separator = smallest key of its right subtree.
    fn check_invariants(map: &BPlusTreeMap<i32, i32>) {
        let mut leaf_depths = Vec::new();
        check_node(map, map.root, 0, None, None, &mut leaf_depths, true);
        assert!(
            leaf_depths.windows(2).all(|w| w[0] == w[1]),
            "leaves at differing depths: {leaf_depths:?}"
        );

        // the leaf chain must yield the keys in strictly ascending order
        let keys: Vec<i32> = map.iter().map(|(k, _)| *k).collect();
        assert!(
            keys.windows(2).all(|w| w[0] < w[1]),
            "leaf chain out of order: {keys:?}"
        );
        assert_eq!(keys.len(), map.size());
    }

    fn check_node(
        map: &BPlusTreeMap<i32, i32>,
        id: NodeId,
        depth: usize,
        lo: Option<i32>,
        hi: Option<i32>,
        leaf_depths: &mut Vec<usize>,
        is_root: bool,
    ) {
        let (keys, is_leaf) = match map.arena.node(id) {
            Node::Leaf(leaf) => (&leaf.keys, true),
            Node::Internal(node) => (&node.keys, false),
        };

        assert!(keys.len() <= MAX_KEYS, "node {id} over capacity");
        if !is_root {
            assert!(!keys.is_empty(), "non-root node {id} is empty");
        }
        assert!(
            keys.windows(2).all(|w| w[0] < w[1]),
            "node {id} keys not strictly ascending"
        );
        for &k in keys {
            if let Some(lo) = lo {
                assert!(k >= lo, "key {k} below subtree bound {lo}");
            }
            if let Some(hi) = hi {
                assert!(k < hi, "key {k} at or above subtree bound {hi}");
            }
        }

        if is_leaf {
            leaf_depths.push(depth);
            return;
        }

        let node = map.arena.internal(id);
        assert_eq!(node.children.len(), node.keys.len() + 1);
        for (idx, &child) in node.children.iter().enumerate() {
            let child_lo = if idx == 0 { lo } else { Some(node.keys[idx - 1]) };
            let child_hi = if idx == node.keys.len() {
                hi
            } else {
                Some(node.keys[idx])
            };
            check_node(map, child, depth + 1, child_lo, child_hi, leaf_depths, false);
        }
        for (idx, &sep) in node.keys.iter().enumerate() {
            assert_eq!(
                sep,
                min_key(map, node.children[idx + 1]),
                "separator {sep} is not the smallest key of its right subtree"
            );
        }
    }

    fn min_key(map: &BPlusTreeMap<i32, i32>, id: NodeId) -> i32 {
        match map.arena.node(id) {
            Node::Leaf(leaf) => leaf.keys[0],
            Node::Internal(node) => min_key(map, node.children[0]),
        }
    }

    #[test]
    fn test_empty_map() {
        let map: BPlusTreeMap<i32, i32> = BPlusTreeMap::new();
        assert_eq!(map.get(&42), None);
        assert_eq!(map.iter().count(), 0);
        assert_eq!(map.size(), 0);
        assert!(map.is_empty());
        assert_eq!(map.first_key(), None);
        assert_eq!(map.last_key(), None);
    }

    #[test]
    fn test_single_insert() {
        let mut map = BPlusTreeMap::new();
        map.put(7, 49);
        assert_eq!(map.get(&7), Some(&49));
        assert_eq!(map.size(), 1);
        assert_eq!(map.first_key(), Some(&7));
        assert_eq!(map.last_key(), Some(&7));
    }

    #[test]
    fn test_sequential_inserts_stay_valid() {
        let mut map = BPlusTreeMap::new();
        for i in 1..=9 {
            map.put(i, i * i);
            check_invariants(&map);
        }
        assert_eq!(map.get(&5), Some(&25));
        assert_eq!(map.first_key(), Some(&1));
        assert_eq!(map.last_key(), Some(&9));
        assert_eq!(map.size(), 9);
        assert_eq!(
            map.sub_map(&3, &7),
            vec![(3, 9), (4, 16), (5, 25), (6, 36)]
        );
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut map = BPlusTreeMap::new();
        for i in 1..=9 {
            map.put(i, i * i);
        }
        assert!(matches!(
            map.try_put(4, 999),
            Err(StrataError::DuplicateKey { .. })
        ));
        // put recovers locally: no panic, no change
        map.put(4, 999);
        assert_eq!(map.size(), 9);
        assert_eq!(map.get(&4), Some(&16));
        check_invariants(&map);
    }

    #[test]
    fn test_duplicate_separator_rejected() {
        let mut map = BPlusTreeMap::new();
        for i in 1..=9 {
            map.put(i, i * i);
        }
        // 1..=9 with ORDER 5 yields a root separator equal to 3; the
        // descent must catch it before reaching the leaf
        assert!(map.try_put(3, 0).is_err());
        assert_eq!(map.get(&3), Some(&9));
    }

    #[test]
    fn test_descending_inserts_stay_valid() {
        let mut map = BPlusTreeMap::new();
        for i in (1..=40).rev() {
            map.put(i, i * 10);
            check_invariants(&map);
        }
        assert_eq!(map.size(), 40);
        assert_eq!(map.first_key(), Some(&1));
        assert_eq!(map.last_key(), Some(&40));
    }

    #[test]
    fn test_shuffled_inserts_leaf_chain_ascending() {
        use rand::seq::SliceRandom;

        let mut keys: Vec<i32> = (1..=20).collect();
        keys.shuffle(&mut rand::thread_rng());

        let mut map = BPlusTreeMap::new();
        for &k in &keys {
            map.put(k, k * k);
            check_invariants(&map);
        }
        let walked: Vec<i32> = map.iter().map(|(k, _)| *k).collect();
        assert_eq!(walked, (1..=20).collect::<Vec<_>>());
    }

    #[test]
    fn test_large_shuffled_inserts() {
        use rand::seq::SliceRandom;

        let mut keys: Vec<i32> = (1..=500).collect();
        keys.shuffle(&mut rand::thread_rng());

        let mut map = BPlusTreeMap::new();
        for &k in &keys {
            map.put(k, k * 2);
        }
        check_invariants(&map);
        assert_eq!(map.size(), 500);
        for k in 1..=500 {
            assert_eq!(map.get(&k), Some(&(k * 2)));
        }
    }

    #[test]
    fn test_head_map() {
        let mut map = BPlusTreeMap::new();
        for i in 1..=9 {
            map.put(i, i * i);
        }
        assert_eq!(map.head_map(&4), vec![(1, 1), (2, 4), (3, 9)]);
        assert_eq!(map.head_map(&1), vec![]);

        let empty: BPlusTreeMap<i32, i32> = BPlusTreeMap::new();
        assert_eq!(empty.head_map(&5), vec![]);
    }

    #[test]
    fn test_tail_map_includes_last_key() {
        let mut map = BPlusTreeMap::new();
        for i in 1..=9 {
            map.put(i, i * i);
        }
        // closed right endpoint, unlike sub_map
        assert_eq!(map.tail_map(&7), vec![(7, 49), (8, 64), (9, 81)]);
        assert_eq!(map.tail_map(&9), vec![(9, 81)]);
        assert_eq!(map.tail_map(&10), vec![]);

        let empty: BPlusTreeMap<i32, i32> = BPlusTreeMap::new();
        assert_eq!(empty.tail_map(&0), vec![]);
    }

    #[test]
    fn test_sub_map_is_half_open() {
        let mut map = BPlusTreeMap::new();
        for i in 1..=9 {
            map.put(i, i * i);
        }
        assert_eq!(map.sub_map(&1, &1), vec![]);
        assert_eq!(map.sub_map(&8, &10), vec![(8, 64), (9, 81)]);
    }

    #[test]
    fn test_access_counter() {
        let mut map = BPlusTreeMap::new();
        for i in 1..=9 {
            map.put(i, i * i);
        }
        map.reset_access_count();
        map.get(&5);
        // tree of height 2: root plus one leaf
        assert_eq!(map.access_count(), 2);
        map.reset_access_count();
        assert_eq!(map.access_count(), 0);
    }

    #[test]
    fn test_display_renders_keys() {
        let mut map = BPlusTreeMap::new();
        for i in 1..=9 {
            map.put(i, i * i);
        }
        let rendered = format!("{map}");
        assert!(rendered.starts_with("BPlusTreeMap"));
        assert!(rendered.contains("5"));
    }
}
