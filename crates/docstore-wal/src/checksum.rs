//! Per-entry integrity digests.
//!
//! The digest is a hex-encoded SHA-256 over the JSON serialization of the
//! entry with the `checksum` field set to the empty string. Signing is pure:
//! two entries with identical fields produce identical digests.

use sha2::{Digest, Sha256};

use docstore_core::CoreResult;

use crate::entry::WalEntry;

/// Computes the digest of an entry, treating its checksum field as empty.
///
/// # Errors
///
/// Returns a serialization error if the entry cannot be rendered as JSON.
pub fn sign(entry: &WalEntry) -> CoreResult<String> {
    let mut unsigned = entry.clone();
    unsigned.checksum = String::new();
    let bytes = serde_json::to_vec(&unsigned)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Recomputes the digest and compares it against the stored checksum.
///
/// # Errors
///
/// Returns a serialization error if the entry cannot be rendered as JSON.
pub fn verify(entry: &WalEntry) -> CoreResult<bool> {
    Ok(sign(entry)? == entry.checksum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{EntryPayload, Operation, WalEntry};
    use serde_json::json;

    fn sample_entry() -> WalEntry {
        WalEntry::data(
            "tx-1",
            "users",
            Operation::Insert,
            EntryPayload::insert("u1", json!({"name": "ada", "age": 36})),
        )
    }

    #[test]
    fn signing_is_deterministic() {
        let entry = sample_entry();
        assert_eq!(sign(&entry).unwrap(), sign(&entry).unwrap());
    }

    #[test]
    fn sign_then_verify() {
        let mut entry = sample_entry();
        entry.checksum = sign(&entry).unwrap();
        assert!(verify(&entry).unwrap());
    }

    #[test]
    fn signing_ignores_existing_checksum() {
        let mut entry = sample_entry();
        let before = sign(&entry).unwrap();
        entry.checksum = before.clone();
        // Re-signing a signed entry blanks the field first.
        assert_eq!(sign(&entry).unwrap(), before);
    }

    #[test]
    fn tampering_fails_verification() {
        let mut entry = sample_entry();
        entry.checksum = sign(&entry).unwrap();

        entry.collection = "orders".to_string();
        assert!(!verify(&entry).unwrap());
    }

    #[test]
    fn unsigned_entry_does_not_verify() {
        let entry = sample_entry();
        assert!(!verify(&entry).unwrap());
    }

    #[test]
    fn digest_is_hex_sha256() {
        let mut entry = sample_entry();
        entry.checksum = sign(&entry).unwrap();
        assert_eq!(entry.checksum.len(), 64);
        assert!(entry.checksum.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
