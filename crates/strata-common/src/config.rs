//! Configuration structures for Strata index components.

use serde::{Deserialize, Serialize};

/// Configuration for constructing hash index instances.
///
/// The B+Tree takes no runtime parameters (its fanout is a compile-time
/// constant); the two hash maps are sized by their initial bucket counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Initial directory size for extendible hashing. Rounded up to the
    /// next power of two by the map.
    pub ext_init_buckets: usize,
    /// Initial number of home buckets for linear hashing. Used directly as
    /// the first-round modulus.
    pub lin_init_buckets: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            ext_init_buckets: 4,
            lin_init_buckets: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = IndexConfig::default();
        assert_eq!(config.ext_init_buckets, 4);
        assert_eq!(config.lin_init_buckets, 4);
    }

    #[test]
    fn test_config_custom() {
        let config = IndexConfig {
            ext_init_buckets: 16,
            lin_init_buckets: 11,
        };
        assert_eq!(config.ext_init_buckets, 16);
        assert_eq!(config.lin_init_buckets, 11);
    }

    #[test]
    fn test_config_clone() {
        let config1 = IndexConfig::default();
        let config2 = config1.clone();
        assert_eq!(config1.ext_init_buckets, config2.ext_init_buckets);
        assert_eq!(config1.lin_init_buckets, config2.lin_init_buckets);
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let original = IndexConfig {
            ext_init_buckets: 8,
            lin_init_buckets: 5,
        };
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: IndexConfig = serde_json::from_str(&serialized).unwrap();

        assert_eq!(original.ext_init_buckets, deserialized.ext_init_buckets);
        assert_eq!(original.lin_init_buckets, deserialized.lin_init_buckets);
    }
}
