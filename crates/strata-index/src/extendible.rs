//! Extendible hashing map.
//!
//! Buckets live in a flat physical store and are reached through a
//! directory of `2^D` slots, where `D` is the global depth. Several slots
//! may alias one bucket while its local depth lags the global depth; a
//! split allocates two successor buckets, doubles the directory when the
//! depths have caught up, and rewrites exactly the slots that aliased the
//! parent.

use std::collections::hash_map::RandomState;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::mem;

use log::debug;

use strata_common::{AccessCounter, IndexConfig, Result, StrataError};

use crate::SLOTS;

/// Hard ceiling on a bucket's local depth. Needing to split past it means
/// more than `SLOTS` keys share an improbably long hash prefix; the insert
/// surfaces `CapacityOverflow` instead of doubling the directory further.
const MAX_LOCAL_DEPTH: u32 = 32;

struct Bucket<K, V> {
    entries: Vec<(K, V)>,
    /// How many times this bucket's lineage has split.
    n_split: u32,
}

impl<K, V> Bucket<K, V> {
    fn new(n_split: u32) -> Self {
        Self {
            entries: Vec::with_capacity(SLOTS),
            n_split,
        }
    }
}

/// Unordered map over an extendible hash table.
///
/// Point lookups resolve through `dir[hash(k) mod 2^D]`. Inserts are
/// unconditional (duplicate keys are not detected); a full bucket splits,
/// growing the directory as needed. `size` is the nominal capacity
/// `SLOTS * live buckets`, not the population. Not thread-safe.
pub struct ExtHashMap<K, V, S = RandomState> {
    /// Physical bucket store. Retired parents are drained and left in
    /// place; the directory only ever references live buckets.
    store: Vec<Bucket<K, V>>,
    /// Logical access layer: directory of store indices, length `2^D`.
    dir: Vec<usize>,
    /// Global depth `D`.
    global_depth: u32,
    /// Depth the initial buckets started at, `log2(initial modulus)`.
    init_depth: u32,
    /// Live bucket count.
    n_buckets: usize,
    access: AccessCounter,
    hash_builder: S,
}

impl<K, V> ExtHashMap<K, V, RandomState>
where
    K: Hash + Eq,
{
    /// Creates a map whose directory starts at `init_size` slots, rounded
    /// up to the next power of two. Every initial slot owns its own
    /// bucket.
    pub fn new(init_size: usize) -> Result<Self> {
        Self::with_hasher(init_size, RandomState::new())
    }

    pub fn from_config(config: &IndexConfig) -> Result<Self> {
        Self::new(config.ext_init_buckets)
    }
}

impl<K, V, S> ExtHashMap<K, V, S>
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
        let modulus = init_size.next_power_of_two();
        let init_depth = modulus.trailing_zeros();
        Ok(Self {
            store: (0..modulus).map(|_| Bucket::new(0)).collect(),
            dir: (0..modulus).collect(),
            global_depth: init_depth,
            init_depth,
            n_buckets: modulus,
            access: AccessCounter::new(),
            hash_builder,
        })
    }

    /// Current directory length (`2^D`).
    pub fn modulus(&self) -> usize {
        self.dir.len()
    }

    /// Looks up the value for `key`, bumping the access counter once. The
    /// first matching slot in the bucket wins.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.access.record();
        let bucket = &self.store[self.dir[self.slot_of(key)]];
        bucket.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Inserts a key-value pair unconditionally. Splits the target bucket
    /// (deepening recursively through retries) until a free slot exists;
    /// fails with `CapacityOverflow` only when the colliding keys cannot
    /// be separated.
    pub fn put(&mut self, key: K, value: V) -> Result<()> {
        loop {
            let bucket_idx = self.dir[self.slot_of(&key)];
            if self.store[bucket_idx].entries.len() < SLOTS {
                self.store[bucket_idx].entries.push((key, value));
                return Ok(());
            }
            self.split_bucket(bucket_idx)?;
        }
    }

    /// Nominal capacity: `SLOTS` times the number of live buckets.
    pub fn size(&self) -> usize {
        SLOTS * self.n_buckets
    }

    /// Iterates every entry by scanning the physical store (retired
    /// buckets are empty). Order is arbitrary.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.store
            .iter()
            .flat_map(|bucket| bucket.entries.iter().map(|(k, v)| (k, v)))
    }

    /// Number of buckets inspected by lookups since the last reset.
    pub fn access_count(&self) -> u64 {
        self.access.get()
    }

    pub fn reset_access_count(&self) {
        self.access.reset()
    }

    fn hash_of(&self, key: &K) -> u64 {
        self.hash_builder.hash_one(key)
    }

    fn slot_of(&self, key: &K) -> usize {
        (self.hash_of(key) % self.dir.len() as u64) as usize
    }

    fn local_depth(&self, bucket_idx: usize) -> u32 {
        self.init_depth + self.store[bucket_idx].n_split
    }

    /// Splits a full bucket into two successors one level deeper,
    /// doubling the directory first when the bucket's local depth has
    /// caught up with the global depth.
    fn split_bucket(&mut self, bucket_idx: usize) -> Result<()> {
        let depth = self.local_depth(bucket_idx);

        // a bucketful of identical hashes can never be separated
        let entries = &self.store[bucket_idx].entries;
        let first_hash = self.hash_of(&entries[0].0);
        if depth >= MAX_LOCAL_DEPTH
            || entries.iter().all(|(k, _)| self.hash_of(k) == first_hash)
        {
            return Err(StrataError::CapacityOverflow {
                keys: entries.len(),
                depth,
            });
        }

        if depth == self.global_depth {
            // the upper half of the doubled directory aliases the lower
            let len = self.dir.len();
            self.dir.extend_from_within(0..len);
            self.global_depth += 1;
            debug!("directory doubled to {} slots", self.dir.len());
        }

        let n_split = self.store[bucket_idx].n_split + 1;
        let moved = mem::take(&mut self.store[bucket_idx].entries);
        let low = self.store.len();
        self.store.push(Bucket::new(n_split));
        let high = self.store.len();
        self.store.push(Bucket::new(n_split));
        self.n_buckets += 1;

        // rewrite every slot that aliased the parent, directed by the hash
        // bit the two successors disagree on
        for (slot, target) in self.dir.iter_mut().enumerate() {
            if *target == bucket_idx {
                *target = if (slot >> depth) & 1 == 1 { high } else { low };
            }
        }
        for (k, v) in moved {
            let target = if (self.hash_of(&k) >> depth) & 1 == 1 {
                high
            } else {
                low
            };
            self.store[target].entries.push((k, v));
        }
        Ok(())
    }
}

impl<K, V, S> fmt::Display for ExtHashMap<K, V, S>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Hash Table (Extendible Hashing)")?;
        writeln!(f, "-------------------------------------------")?;
        for (slot, &bucket_idx) in self.dir.iter().enumerate() {
            write!(f, "{slot}:\t[")?;
            for (idx, (k, v)) in self.store[bucket_idx].entries.iter().enumerate() {
                if idx > 0 {
                    write!(f, "-->")?;
                }
                write!(f, " ({k:?},{v:?}) ")?;
            }
            writeln!(f, "]")?;
        }
        write!(f, "-------------------------------------------")
    }
}
