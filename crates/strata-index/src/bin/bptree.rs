//! B+Tree exerciser: inserts N keys and reports the tree state.

use strata_index::BPlusTreeMap;

fn main() {
    let total_keys: i64 = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(10);

    let mut map = BPlusTreeMap::new();
    for i in 1..total_keys {
        map.put(i, i * i);
    }
    println!("{map}");

    for i in 1..total_keys {
        match map.get(&i) {
            Some(value) => println!("key = {i} value = {value}"),
            None => println!("key = {i} value = none"),
        }
    }
    println!("-------------------------------------------");
    println!("Size = {}", map.size());
    println!(
        "Average number of nodes accessed = {}",
        map.access_count() as f64 / total_keys as f64
    );
}
