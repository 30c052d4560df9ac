//! Shared utilities.

/// Error types for the protocol engine
pub mod error;
