//! Error types for Strata.

use thiserror::Error;

/// Result type alias using StrataError.
pub type Result<T> = std::result::Result<T, StrataError>;

/// Errors that can occur in Strata index operations.
#[derive(Debug, Error)]
pub enum StrataError {
    /// An insertion attempted to reuse a key already present in an index
    /// that rejects duplicates. The index is left unchanged.
    #[error("duplicate key {key}")]
    DuplicateKey { key: String },

    /// Repeated bucket splits could not separate a group of colliding keys
    /// within the depth limit. The insert is abandoned; the map stays
    /// consistent.
    #[error("cannot separate {keys} colliding keys at split depth {depth}")]
    CapacityOverflow { keys: usize, depth: u32 },

    #[error("invalid parameter: {name} = {value}")]
    InvalidParameter { name: String, value: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl StrataError {
    /// Builds a `DuplicateKey` error from any debuggable key.
    pub fn duplicate_key(key: &dyn std::fmt::Debug) -> Self {
        StrataError::DuplicateKey {
            key: format!("{key:?}"),
        }
    }

    /// Builds an `InvalidParameter` error from a name and value.
    pub fn invalid_parameter(name: &str, value: impl ToString) -> Self {
        StrataError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_key_display() {
        let err = StrataError::duplicate_key(&42);
        assert_eq!(err.to_string(), "duplicate key 42");

        let err = StrataError::duplicate_key(&"alpha");
        assert_eq!(err.to_string(), "duplicate key \"alpha\"");
    }

    #[test]
    fn test_capacity_overflow_display() {
        let err = StrataError::CapacityOverflow { keys: 5, depth: 28 };
        assert_eq!(
            err.to_string(),
            "cannot separate 5 colliding keys at split depth 28"
        );
    }

    #[test]
    fn test_invalid_parameter_display() {
        let err = StrataError::invalid_parameter("init_size", 0);
        assert_eq!(err.to_string(), "invalid parameter: init_size = 0");
    }

    #[test]
    fn test_internal_display() {
        let err = StrataError::Internal("assertion failed".to_string());
        assert_eq!(err.to_string(), "internal error: assertion failed");
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(StrataError::Internal("test".to_string()))
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<StrataError>();
    }
}
