use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ownership record for one foreign-key constraint.
///
/// Constraints are schema-global: the same row guards every tenant's rows in
/// the physical table, so at most one rollback may hold it disabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FkConstraintLease {
    pub constraint_name: String,
    pub table_name: String,
    pub schema_name: String,
    pub definition: String,
    pub is_disabled: bool,
    pub owner_rollback_id: Option<String>,
    pub disabled_at: Option<DateTime<Utc>>,
    pub re_enabled_at: Option<DateTime<Utc>>,
}

impl FkConstraintLease {
    /// Whether the lease is currently held by `rollback_id`.
    pub fn is_owned_by(&self, rollback_id: &str) -> bool {
        self.is_disabled && self.owner_rollback_id.as_deref() == Some(rollback_id)
    }
}
