//! # taskmill-base
//!
//! Core types and utilities shared across the taskmill crates.
//!
//! - **Error Types**: unified error handling for pool operations
//! - **Utilities**: small deterministic helpers used by tests and benches

pub mod error;
pub mod utils;

pub use error::{Error, Result};
