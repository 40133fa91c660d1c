/// Small shared value types.
pub mod core;
/// Crate error type.
pub mod error;
