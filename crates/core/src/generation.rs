//! Cache generations and the named caches derived from them.
//!
//! Every deploy carries one generation tag. Each tag owns exactly three
//! caches (`static-<v>`, `dynamic-<v>`, `images-<v>`); any other name with
//! one of those prefixes belongs to an older deploy.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The three kinds of named cache a generation owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    /// Install-time seed of the offline shell.
    Static,
    /// Everything fetched at runtime that is not an image.
    Dynamic,
    /// Runtime images.
    Images,
}

impl CacheKind {
    pub const ALL: [CacheKind; 3] = [CacheKind::Static, CacheKind::Dynamic, CacheKind::Images];

    pub fn prefix(self) -> &'static str {
        match self {
            CacheKind::Static => "static-",
            CacheKind::Dynamic => "dynamic-",
            CacheKind::Images => "images-",
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix().trim_end_matches('-'))
    }
}

/// Opaque version tag for one deploy's set of caches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheGeneration(String);

impl CacheGeneration {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn tag(&self) -> &str {
        &self.0
    }

    /// Name of this generation's cache of the given kind.
    pub fn name(&self, kind: CacheKind) -> String {
        format!("{}{}", kind.prefix(), self.0)
    }

    /// All three names, in lookup order (static, dynamic, images).
    pub fn names(&self) -> [String; 3] {
        CacheKind::ALL.map(|kind| self.name(kind))
    }

    /// Whether `name` belongs to this layer but not to this generation.
    ///
    /// Names without one of the three prefixes are foreign and never stale.
    pub fn is_stale(&self, name: &str) -> bool {
        let ours = CacheKind::ALL.iter().any(|kind| name.starts_with(kind.prefix()));
        ours && !self.names().iter().any(|current| current == name)
    }
}

impl fmt::Display for CacheGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        let generation = CacheGeneration::new("v1");
        assert_eq!(generation.name(CacheKind::Static), "static-v1");
        assert_eq!(generation.name(CacheKind::Dynamic), "dynamic-v1");
        assert_eq!(generation.name(CacheKind::Images), "images-v1");
        assert_eq!(generation.names(), ["static-v1", "dynamic-v1", "images-v1"]);
    }

    #[test]
    fn test_is_stale() {
        let generation = CacheGeneration::new("v1");
        assert!(generation.is_stale("static-v0"));
        assert!(generation.is_stale("images-2024-01-01"));
        assert!(!generation.is_stale("dynamic-v1"));
        assert!(!generation.is_stale("workbox-precache"));
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(CacheKind::Images.to_string(), "images");
    }
}
