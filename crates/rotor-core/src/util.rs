//! Common utility functions.

pub mod data;

// Re-export commonly used items
pub use data::deep_merge;
