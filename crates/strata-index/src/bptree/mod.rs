//! B+Tree ordered map.
//!
//! Multi-level index structure providing efficient access for both point
//! queries and range queries. Nodes live in an arena and reference each
//! other by index; leaves are chained in ascending key order for
//! sequential scans:
//!
//! ```text
//!             [ 3 | 5 | 7 ]
//!            /    |    |    \
//!       [1 2]->[3 4]->[5 6]->[7 8 9]
//! ```
//!
//! Separator keys route lookups: keys in `subtree[i]` are strictly less
//! than `key[i]`, and every separator equals the smallest key of its right
//! subtree. Inserts may split nodes and raise a new root; nodes are never
//! merged (there is no delete) and never freed until the map is dropped.

mod arena;
mod map;

pub use map::{BPlusTreeMap, EntryIter, ORDER};
