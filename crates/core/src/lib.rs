//! Core types and shared functionality for midrash-web's offline layer.
//!
//! This crate provides:
//! - Cache storage with SQLite backend
//! - Cache generations, route table and cacheability policy
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod generation;
pub mod policy;
pub mod routes;

pub use cache::{CacheStore, CachedResponse, MirroredDocument};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use generation::{CacheGeneration, CacheKind};
pub use policy::CacheabilityPolicy;
pub use routes::{Classification, Route, RouteTable, Strategy};
