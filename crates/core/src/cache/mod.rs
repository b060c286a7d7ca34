//! SQLite-backed cache storage.
//!
//! Provides the named caches the offline layer serves from, plus the content
//! mirror:
//!
//! - Named caches keyed by (method, URL) via SHA-256
//! - All-or-nothing bulk puts for install seeding
//! - Automatic schema migrations
//! - WAL mode for concurrent access

pub mod connection;
pub mod entries;
pub mod hash;
pub mod migrations;
pub mod mirror;

pub use crate::Error;

pub use connection::CacheStore;
pub use entries::CachedResponse;
pub use mirror::MirroredDocument;
