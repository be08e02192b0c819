//! Linear hashing map.
//!
//! A directory-free hash table of home-bucket chains. Two moduli are
//! live at once: `mod1` addresses the current round, `mod2 = 2 * mod1`
//! addresses buckets that have already split this round. A split pointer
//! walks the home buckets; each chain overflow splits the pointed-at
//! bucket, growing the table one bucket at a time. When the pointer
//! reaches `mod1` the round completes and the moduli rotate.

use std::collections::hash_map::RandomState;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::mem;

use log::debug;

use strata_common::{AccessCounter, IndexConfig, Result, StrataError};

use crate::SLOTS;

/// Reinserts during a split run back through the insert path and may
/// split again; past this depth the overflow append still happens but no
/// further split is attempted.
const MAX_SPLIT_RECURSION: usize = 64;

struct Bucket<K, V> {
    entries: Vec<(K, V)>,
    next: Option<Box<Bucket<K, V>>>,
}

impl<K, V> Bucket<K, V> {
    fn new() -> Self {
        Self {
            entries: Vec::with_capacity(SLOTS),
            next: None,
        }
    }
}

/// Unordered map over a linear hash table.
///
/// Point lookups walk one bucket chain. Inserts append to the chain and
/// amortize growth by splitting one home bucket per overflow. Duplicate
/// keys are not detected; lookup is first match in chain order. `size` is
/// the nominal capacity `SLOTS * (mod1 + split)`, not the population. Not
/// thread-safe.
pub struct LinHashMap<K, V, S = RandomState> {
    /// Home buckets; overflow buckets chain off them.
    table: Vec<Bucket<K, V>>,
    /// Low-resolution modulus for the current round.
    mod1: usize,
    /// High-resolution modulus, always `2 * mod1`.
    mod2: usize,
    /// Index of the next home bucket due to split.
    split: usize,
    access: AccessCounter,
    hash_builder: S,
}

impl<K, V> LinHashMap<K, V, RandomState>
where
    K: Hash + Eq,
{
    /// Creates a map with `init_size` home buckets; `init_size` is used
    /// directly as the first-round modulus.
    pub fn new(init_size: usize) -> Result<Self> {
        Self::with_hasher(init_size, RandomState::new())
    }

    pub fn from_config(config: &IndexConfig) -> Result<Self> {
        Self::new(config.lin_init_buckets)
    }
}

impl<K, V, S> LinHashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Creates a map that hashes with the given builder. The builder must
    /// produce stable hashes for the lifetime of the map.
    pub fn with_hasher(init_size: usize, hash_builder: S) -> Result<Self> {
        if init_size == 0 {
            return Err(StrataError::invalid_parameter("init_size", init_size));
        }
        Ok(Self {
            table: (0..init_size).map(|_| Bucket::new()).collect(),
            mod1: init_size,
            mod2: 2 * init_size,
            split: 0,
            access: AccessCounter::new(),
            hash_builder,
        })
    }

    /// Looks up the value for `key`, bumping the access counter once per
    /// bucket visited along the chain. The first match wins.
    pub fn get(&self, key: &K) -> Option<&V> {
        let mut bucket = &self.table[self.chain_index(key)];
        loop {
            self.access.record();
            if let Some((_, v)) = bucket.entries.iter().find(|(k, _)| k == key) {
                return Some(v);
            }
            match bucket.next.as_deref() {
                Some(next) => bucket = next,
                None => return None,
            }
        }
    }

    /// Inserts a key-value pair. The home bucket absorbs it when it has
    /// room; otherwise the chain tail takes it (linking a fresh overflow
    /// bucket if needed) and the bucket at the split pointer is split.
    pub fn put(&mut self, key: K, value: V) {
        self.put_at_depth(key, value, 0);
    }

    /// Nominal capacity: `SLOTS` times the number of home buckets.
    pub fn size(&self) -> usize {
        SLOTS * (self.mod1 + self.split)
    }

    /// Iterates every home bucket and its overflow chain. Order is
    /// arbitrary.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.table.iter().flat_map(|home| {
            ChainIter { bucket: Some(home) }
                .flat_map(|bucket| bucket.entries.iter().map(|(k, v)| (k, v)))
        })
    }

    /// Number of buckets inspected by lookups since the last reset.
    pub fn access_count(&self) -> u64 {
        self.access.get()
    }

    pub fn reset_access_count(&self) {
        self.access.reset()
    }

    /// The chain holding `key`: `hash mod mod1`, re-resolved through
    /// `mod2` for buckets the split pointer has already passed.
    fn chain_index(&self, key: &K) -> usize {
        let hash = self.hash_builder.hash_one(key);
        let low = (hash % self.mod1 as u64) as usize;
        if low < self.split {
            (hash % self.mod2 as u64) as usize
        } else {
            low
        }
    }

    fn put_at_depth(&mut self, key: K, value: V, depth: usize) {
        let index = self.chain_index(&key);
        let home = &mut self.table[index];
        if home.entries.len() < SLOTS {
            home.entries.push((key, value));
            return;
        }
        Self::append_to_tail(home, key, value);

        // the chain overflowed: split the bucket at the split pointer
        if depth >= MAX_SPLIT_RECURSION {
            return;
        }
        self.split_next(depth);
    }

    /// Appends at the chain tail, linking a new overflow bucket when the
    /// tail is full.
    fn append_to_tail(bucket: &mut Bucket<K, V>, key: K, value: V) {
        match bucket.next {
            Some(ref mut next) => Self::append_to_tail(next, key, value),
            None => {
                if bucket.entries.len() < SLOTS {
                    bucket.entries.push((key, value));
                } else {
                    let mut overflow = Bucket::new();
                    overflow.entries.push((key, value));
                    bucket.next = Some(Box::new(overflow));
                }
            }
        }
    }

    /// Splits the chain at the split pointer: its entries are collected,
    /// the chain is replaced by a fresh bucket, a new home bucket joins
    /// the table, the pointer advances (rotating the moduli at the end of
    /// a round), and the collected entries rehash through the insert path
    /// under the updated state.
    fn split_next(&mut self, depth: usize) {
        let chain = mem::replace(&mut self.table[self.split], Bucket::new());
        self.table.push(Bucket::new());
        self.split += 1;
        if self.split == self.mod1 {
            self.split = 0;
            self.mod1 = self.mod2;
            self.mod2 = 2 * self.mod1;
            debug!("round complete, mod1 = {}", self.mod1);
        }

        let mut moved: Vec<(K, V)> = Vec::new();
        let mut bucket = chain;
        loop {
            moved.extend(bucket.entries);
            match bucket.next {
                Some(next) => bucket = *next,
                None => break,
            }
        }
        for (k, v) in moved {
            self.put_at_depth(k, v, depth + 1);
        }
    }
}

struct ChainIter<'a, K, V> {
    bucket: Option<&'a Bucket<K, V>>,
}

impl<'a, K, V> Iterator for ChainIter<'a, K, V> {
    type Item = &'a Bucket<K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        let bucket = self.bucket?;
        self.bucket = bucket.next.as_deref();
        Some(bucket)
    }
}

impl<K, V, S> fmt::Display for LinHashMap<K, V, S>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Hash Table (Linear Hashing)")?;
        writeln!(f, "-------------------------------------------")?;
        for (index, home) in self.table.iter().enumerate() {
            write!(f, "{index}:\t")?;
            let mut bucket = Some(home);
            let mut first = true;
            while let Some(b) = bucket {
                if !first {
                    write!(f, "-->")?;
                }
                write!(f, "[")?;
                for (k, v) in &b.entries {
                    write!(f, " ({k:?},{v:?}) ")?;
                }
                write!(f, "]")?;
                first = false;
                bucket = b.next.as_deref();
            }
            writeln!(f)?;
        }
        write!(f, "-------------------------------------------")
    }
}
