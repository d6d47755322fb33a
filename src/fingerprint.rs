//! Duplicate-detection fingerprints.
//!
//! The fingerprint is a SHA-256 hash over the report's message and call
//! site, truncated to a short hex string. Equal `(message, file, line)`
//! triples always hash to the same value; interpolated values inside the
//! message necessarily alias, which is accepted for duplicate suppression.

use sha2::{Digest, Sha256};

/// Bytes of digest kept; 8 bytes is ample for an in-process dedup key.
const FINGERPRINT_BYTES: usize = 8;

/// Compute the duplicate-suppression key for a report.
pub fn compute(message: &str, file: &str, line: u32) -> String {
    const DELIMITER: &[u8] = b"\x00";

    let mut hasher = Sha256::new();
    hasher.update(message.as_bytes());
    hasher.update(DELIMITER);
    hasher.update(file.as_bytes());
    hasher.update(DELIMITER);
    hasher.update(line.to_be_bytes());

    let digest = hasher.finalize();
    hex::encode(&digest[..FINGERPRINT_BYTES])
}
