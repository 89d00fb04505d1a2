// Content-derived identifiers using BLAKE3

use std::path::Path;

use crate::constants::CONTENT_ID_BYTES;
use crate::model::normalize_path_str;

/// Derive a stable record id from a file's path and size.
///
/// The same file observed twice (explicit import, folder scan, watch event)
/// maps to the same id, which is what makes folder reconciliation and
/// backend migration idempotent.
pub fn content_id(path: &Path, size: u64) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(normalize_path_str(path).as_bytes());
    hasher.update(&size.to_le_bytes());
    let hash = hasher.finalize();
    hash.to_hex()[..CONTENT_ID_BYTES * 2].to_string()
}
