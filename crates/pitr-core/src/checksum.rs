//! Checksums over snapshot payloads.
//!
//! A payload is `table → rows`, with tables kept in name order by the
//! `BTreeMap` and rows kept in record-id order by whoever builds the payload
//! (the store reads them ordered, replay produces them ordered). Each row's
//! columns are sorted as well, so `serde_json` output is canonical and the
//! same logical state always hashes to the same digest.

use crate::errors::Result;
use crate::model::TypedRow;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Hex-encoded SHA256 over the canonical JSON form of a payload.
///
/// # Errors
///
/// Returns `PitrError::Serialization` if a row cannot be encoded.
pub fn compute_payload_checksum(payload: &BTreeMap<String, Vec<TypedRow>>) -> Result<String> {
    let canonical = serde_json::to_string(payload)?;
    Ok(hash_string(&canonical))
}

/// Checksum of a single table's rows, used for per-table integrity issues.
///
/// # Errors
///
/// Returns `PitrError::Serialization` if a row cannot be encoded.
pub fn compute_table_checksum(rows: &[TypedRow]) -> Result<String> {
    let canonical = serde_json::to_string(rows)?;
    Ok(hash_string(&canonical))
}

fn hash_string(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(val: i64) -> BTreeMap<String, Vec<TypedRow>> {
        let mut data = BTreeMap::new();
        data.insert(
            "a".to_string(),
            vec![TypedRow::new().with("id", "id1").with("val", val)],
        );
        data.insert("b".to_string(), Vec::new());
        data
    }

    #[test]
    fn test_checksum_is_hex_sha256() {
        let sum = compute_payload_checksum(&payload(1)).unwrap();
        assert_eq!(sum.len(), 64);
        assert!(sum.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_value_change_changes_checksum() {
        assert_ne!(
            compute_payload_checksum(&payload(1)).unwrap(),
            compute_payload_checksum(&payload(2)).unwrap()
        );
    }

    #[test]
    fn test_column_insertion_order_irrelevant() {
        let r1 = TypedRow::new().with("id", "x").with("val", 3);
        let r2 = TypedRow::new().with("val", 3).with("id", "x");
        assert_eq!(
            compute_table_checksum(&[r1]).unwrap(),
            compute_table_checksum(&[r2]).unwrap()
        );
    }

    #[test]
    fn test_empty_table_is_part_of_payload() {
        let with_b = payload(1);
        let mut without_b = payload(1);
        without_b.remove("b");
        assert_ne!(
            compute_payload_checksum(&with_b).unwrap(),
            compute_payload_checksum(&without_b).unwrap()
        );
    }
}
