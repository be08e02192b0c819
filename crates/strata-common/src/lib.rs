//! Strata common types, errors, and utilities.
//!
//! This crate provides shared definitions used across all Strata index
//! components.

pub mod config;
pub mod counter;
pub mod error;

pub use config::IndexConfig;
pub use counter::AccessCounter;
pub use error::{Result, StrataError};
