//! Linear hashing exerciser: inserts N odd keys and reports the
//! per-chain layout.

use strata_common::IndexConfig;
use strata_index::LinHashMap;

fn main() -> strata_common::Result<()> {
    let n_keys: i64 = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(30);

    let config = IndexConfig {
        lin_init_buckets: 11,
        ..IndexConfig::default()
    };
    let mut map = LinHashMap::from_config(&config)?;
    for i in (1..n_keys).step_by(2) {
        map.put(i, i * i);
    }
    println!("{map}");

    for i in 0..n_keys {
        match map.get(&i) {
            Some(value) => println!("key = {i} value = {value}"),
            None => println!("key = {i} value = none"),
        }
    }
    println!("-------------------------------------------");
    println!("Size = {}", map.size());
    println!(
        "Average number of buckets accessed = {}",
        map.access_count() as f64 / n_keys as f64
    );
    Ok(())
}
