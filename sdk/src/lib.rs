//! Parley SDK
//!
//! Shared error types used by the engine library and the `parley` binary.

/// Error types and handling
pub mod errors;

// Re-export commonly used types
pub use errors::{EngineError, ErrorExt};
