//! Test utilities shared across the credscope workspace
//!
//! This crate provides common testing infrastructure including:
//! - Isolated credential storage roots ([`StoreRootGuard`])
//! - A simulated repository server that issues authentication challenges
//!   ([`FakeRepositoryServer`]) and a client that keeps its own credential
//!   cache ([`CachingClient`])
//!
//! The clippy dead_code lint is disabled for this crate because test utilities
//! may not be used by all tests, and the compiler cannot detect usage across
//! crate boundaries in development dependencies.

#![allow(dead_code)]

pub mod fixtures;
pub mod server;
pub mod store;

// Re-export commonly used items
pub use fixtures::{job, url};
pub use server::{CachingClient, FakeRepositoryServer};
pub use store::StoreRootGuard;
