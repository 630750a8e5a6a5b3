use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::unknown_tag;
use super::value::TypedRow;
use crate::errors::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotStatus {
    Active,
    RolledBack,
}

impl SnapshotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotStatus::Active => "active",
            SnapshotStatus::RolledBack => "rolled_back",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(SnapshotStatus::Active),
            "rolled_back" => Ok(SnapshotStatus::RolledBack),
            other => Err(unknown_tag("snapshot status", other)),
        }
    }
}

/// A captured, self-consistent copy of a tenant's rows for a set of tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitrSnapshot {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub created_by: String,
    /// Sorted, de-duplicated
    pub affected_tables: Vec<String>,
    /// Rows per table, ordered by primary key
    pub snapshot_data: BTreeMap<String, Vec<TypedRow>>,
    pub checksum: String,
    pub total_rows_count: u64,
    pub status: SnapshotStatus,
    pub is_rolled_back: bool,
    pub rolled_back_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Highest change-log sequence visible when the rows were read.
    /// Replay starts strictly after it.
    pub log_sequence: i64,
}

impl PitrSnapshot {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    pub fn can_rollback(&self, now: DateTime<Utc>) -> bool {
        !self.is_rolled_back && !self.is_expired(now)
    }

    /// Row count recomputed from the payload
    pub fn payload_rows(&self) -> u64 {
        self.snapshot_data.values().map(|rows| rows.len() as u64).sum()
    }

    pub fn rows_for(&self, table: &str) -> &[TypedRow] {
        self.snapshot_data
            .get(table)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn summary(&self, now: DateTime<Utc>) -> SnapshotSummary {
        SnapshotSummary {
            snapshot_id: self.id.clone(),
            name: self.name.clone(),
            affected_tables: self.affected_tables.clone(),
            can_rollback: self.can_rollback(now),
            total_rows: self.total_rows_count,
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }
}

/// Listing entry for active snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub snapshot_id: String,
    pub name: String,
    pub affected_tables: Vec<String>,
    pub can_rollback: bool,
    pub total_rows: u64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
