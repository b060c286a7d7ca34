//! Cache entry key generation.

use sha2::{Digest, Sha256};

/// Compute the storage key of a cached entry from its request method and URL.
///
/// The method is upper-cased so `get` and `GET` share one entry.
pub fn compute_entry_key(method: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}
