//! # Credscope
//!
//! Per-job, path-scoped version-control credentials for build automation.
//!
//! This crate re-exports [`credscope_core`]; see it for the store, resolver,
//! persistence and handoff APIs. The end-to-end scenarios exercising them
//! together live in this crate's `tests/` directory.

pub use credscope_core::*;
