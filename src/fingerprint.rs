// ─────────────────────────────────────────────────────────────────────────────
//  autogen-init :: fingerprint
//
//  SHA-256 fingerprints embedded in the settings artifacts.
//
//  The execution stage recomputes the input fingerprint from the same raw
//  description; a mismatch means the initializer must run again before any
//  generator is invoked.
// ─────────────────────────────────────────────────────────────────────────────

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::config::{QtVersion, TargetDescription};
use crate::error::{AutogenError, Result};
use crate::info::InfoReader;

/// Hex characters kept from a path checksum.
const PATH_CHECKSUM_LEN: usize = 10;

/// Key under which every artifact stores the input fingerprint.
pub const FINGERPRINT_KEY: &str = "AG_FINGERPRINT";

/// SHA-256 of a string slice, hex-encoded.
pub fn hash_str(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}

/// Fingerprint of the raw inputs that fed settings generation.
///
/// The description is serialized to JSON (every map in it is ordered), so
/// equal inputs always hash equally.
pub fn input_fingerprint(desc: &TargetDescription, qt: QtVersion) -> Result<String> {
    let json = serde_json::to_string(desc)
        .map_err(|e| AutogenError::config(format!("cannot serialize target description: {e}")))?;
    Ok(hash_str(&format!(
        "autogen-init {}\0qt {}\0{}",
        env!("CARGO_PKG_VERSION"), qt, json
    )))
}

/// Short checksum of the directory holding `file`, used to tell apart
/// same-named files living in different directories.
///
/// The directory is taken relative to `source_dir` (or `binary_dir`) when it
/// lies inside, so the checksum survives moving the whole tree.
pub fn path_checksum(file: &Path, source_dir: &Path, binary_dir: &Path) -> String {
    let parent = file.parent().unwrap_or(file);
    let key = if let Ok(rel) = parent.strip_prefix(source_dir) {
        format!("src:{}", rel.to_string_lossy())
    } else if let Ok(rel) = parent.strip_prefix(binary_dir) {
        format!("bin:{}", rel.to_string_lossy())
    } else {
        format!("abs:{}", parent.to_string_lossy())
    };
    let mut full = hex::encode(Sha256::digest(key.as_bytes()));
    full.truncate(PATH_CHECKSUM_LEN);
    full
}

/// True if the artifact at `info_file` is missing, unreadable, or carries a
/// different fingerprint.
pub fn is_stale(info_file: &Path, expected: &str) -> bool {
    match InfoReader::load(info_file) {
        Ok(info) => info.get(FINGERPRINT_KEY) != Some(expected),
        Err(_) => true,
    }
}
