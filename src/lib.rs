//! radiofeed library
//!
//! Exposes the cache, fetch and HTTP modules so the binary and the
//! integration tests share one implementation.

pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod dedup;
pub mod server;
pub mod text;
