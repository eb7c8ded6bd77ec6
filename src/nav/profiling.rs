//! Performance profiling utilities
//!
//! The `profile` attribute only emits timing code when the `perf_stats` feature is enabled.
//! Zero overhead when disabled.

// Re-export the profile macro
pub use kestrel_macros::profile;
