//! Comparison of a restored payload against the expected payload.

use crate::checksum::{compute_payload_checksum, compute_table_checksum};
use crate::errors::Result;
use crate::model::TypedRow;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub valid: bool,
    pub checksum_match: bool,
    pub row_count_match: bool,
    pub expected_checksum: String,
    pub actual_checksum: String,
    pub expected_rows: u64,
    pub actual_rows: u64,
    pub issues: Vec<String>,
}

impl IntegrityReport {
    /// Record an additional problem and mark the report invalid.
    pub fn with_issue(mut self, issue: impl Into<String>) -> Self {
        self.issues.push(issue.into());
        self.valid = false;
        self
    }
}

/// Compare two payloads table by table.
///
/// Both payloads must hold rows in record-id order. Issues name each table
/// whose row count or content differs.
pub fn compare_payloads(
    expected: &BTreeMap<String, Vec<TypedRow>>,
    actual: &BTreeMap<String, Vec<TypedRow>>,
) -> Result<IntegrityReport> {
    let expected_checksum = compute_payload_checksum(expected)?;
    let actual_checksum = compute_payload_checksum(actual)?;
    let expected_rows = row_total(expected);
    let actual_rows = row_total(actual);

    let mut issues = Vec::new();
    let tables: BTreeSet<&String> = expected.keys().chain(actual.keys()).collect();
    for table in tables {
        let want = expected.get(table).map(Vec::as_slice).unwrap_or(&[]);
        let have = actual.get(table).map(Vec::as_slice).unwrap_or(&[]);
        if want.len() != have.len() {
            issues.push(format!(
                "table {}: expected {} rows, found {}",
                table,
                want.len(),
                have.len()
            ));
        } else if compute_table_checksum(want)? != compute_table_checksum(have)? {
            issues.push(format!("table {}: row content differs", table));
        }
    }

    let checksum_match = expected_checksum == actual_checksum;
    let row_count_match = expected_rows == actual_rows;
    Ok(IntegrityReport {
        valid: checksum_match && row_count_match && issues.is_empty(),
        checksum_match,
        row_count_match,
        expected_checksum,
        actual_checksum,
        expected_rows,
        actual_rows,
        issues,
    })
}

fn row_total(payload: &BTreeMap<String, Vec<TypedRow>>) -> u64 {
    payload.values().map(|rows| rows.len() as u64).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(rows: &[(&str, i64)]) -> BTreeMap<String, Vec<TypedRow>> {
        let mut data = BTreeMap::new();
        data.insert(
            "a".to_string(),
            rows.iter()
                .map(|(id, val)| TypedRow::new().with("id", *id).with("val", *val))
                .collect(),
        );
        data
    }

    #[test]
    fn test_identical_payloads_valid() {
        let p = payload(&[("id1", 1)]);
        let report = compare_payloads(&p, &p.clone()).unwrap();
        assert!(report.valid);
        assert!(report.checksum_match);
        assert!(report.row_count_match);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn test_content_difference_reported() {
        let report =
            compare_payloads(&payload(&[("id1", 1)]), &payload(&[("id1", 2)])).unwrap();
        assert!(!report.valid);
        assert!(!report.checksum_match);
        assert!(report.row_count_match);
        assert_eq!(report.issues, vec!["table a: row content differs"]);
    }

    #[test]
    fn test_row_count_difference_reported() {
        let report =
            compare_payloads(&payload(&[("id1", 1)]), &payload(&[("id1", 1), ("id2", 2)]))
                .unwrap();
        assert!(!report.row_count_match);
        assert_eq!(report.actual_rows, 2);
        assert!(report.issues[0].contains("expected 1 rows, found 2"));
    }

    #[test]
    fn test_with_issue_invalidates() {
        let p = payload(&[]);
        let report = compare_payloads(&p, &p)
            .unwrap()
            .with_issue("snapshot checksum mismatch");
        assert!(!report.valid);
        assert!(report.checksum_match);
    }
}
