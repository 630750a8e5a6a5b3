use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::lease::FkConstraintLease;
use super::unknown_tag;
use crate::errors::{ExError, PitrError, Result};

/// Rollback state machine.
///
/// ```text
/// requested → validating → constraints_disabled → restoring → reenabling
///           → validating_integrity → completed
/// ```
///
/// `failed` is reachable from every non-terminal state. Once constraints
/// have been touched the failure path still passes through `reenabling`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackStatus {
    Requested,
    Validating,
    ConstraintsDisabled,
    Restoring,
    Reenabling,
    ValidatingIntegrity,
    Completed,
    Failed,
}

impl RollbackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RollbackStatus::Requested => "requested",
            RollbackStatus::Validating => "validating",
            RollbackStatus::ConstraintsDisabled => "constraints_disabled",
            RollbackStatus::Restoring => "restoring",
            RollbackStatus::Reenabling => "reenabling",
            RollbackStatus::ValidatingIntegrity => "validating_integrity",
            RollbackStatus::Completed => "completed",
            RollbackStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "requested" => Ok(RollbackStatus::Requested),
            "validating" => Ok(RollbackStatus::Validating),
            "constraints_disabled" => Ok(RollbackStatus::ConstraintsDisabled),
            "restoring" => Ok(RollbackStatus::Restoring),
            "reenabling" => Ok(RollbackStatus::Reenabling),
            "validating_integrity" => Ok(RollbackStatus::ValidatingIntegrity),
            "completed" => Ok(RollbackStatus::Completed),
            "failed" => Ok(RollbackStatus::Failed),
            other => Err(unknown_tag("rollback status", other)),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RollbackStatus::Completed | RollbackStatus::Failed)
    }

    pub fn can_transition_to(&self, next: RollbackStatus) -> bool {
        use RollbackStatus::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (_, Failed)
                | (Requested, Validating)
                | (Validating, ConstraintsDisabled)
                | (ConstraintsDisabled, Restoring)
                | (ConstraintsDisabled, Reenabling)
                | (Restoring, Reenabling)
                | (Reenabling, ValidatingIntegrity)
                | (ValidatingIntegrity, Completed)
        )
    }
}

impl std::fmt::Display for RollbackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Ok,
    Failed,
    Skipped,
}

/// One entry in the ordered restoration log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestorationStep {
    pub phase: RollbackStatus,
    pub table_name: Option<String>,
    pub outcome: StepOutcome,
    pub rows: u64,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// An error captured on the record with its stable code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackError {
    pub code: String,
    /// Phase the rollback was in when the error was captured
    pub step: RollbackStatus,
    pub table_name: Option<String>,
    pub message: String,
}

impl RollbackError {
    pub fn from_ex(step: RollbackStatus, err: &ExError) -> Self {
        Self {
            code: err.code().to_string(),
            step,
            table_name: err.table().map(str::to_string),
            message: err.to_string(),
        }
    }
}

/// Audit record of one rollback operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackRecord {
    pub id: String,
    pub tenant_id: String,
    pub snapshot_id: String,
    pub initiated_by: String,
    pub reason: String,
    pub target_timestamp: Option<DateTime<Utc>>,
    pub status: RollbackStatus,
    pub tables_affected: Vec<String>,
    pub tables_restored: Vec<String>,
    pub rows_restored: u64,
    pub errors_encountered: Vec<RollbackError>,
    pub fk_constraints_handled: Vec<FkConstraintLease>,
    pub restoration_steps: Vec<RestorationStep>,
    pub current_step: Option<String>,
    pub integrity_valid: Option<bool>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RollbackRecord {
    pub fn new(
        id: impl Into<String>,
        tenant_id: impl Into<String>,
        snapshot_id: impl Into<String>,
        initiated_by: impl Into<String>,
        reason: impl Into<String>,
        target_timestamp: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            snapshot_id: snapshot_id.into(),
            initiated_by: initiated_by.into(),
            reason: reason.into(),
            target_timestamp,
            status: RollbackStatus::Requested,
            tables_affected: Vec::new(),
            tables_restored: Vec::new(),
            rows_restored: 0,
            errors_encountered: Vec::new(),
            fk_constraints_handled: Vec::new(),
            restoration_steps: Vec::new(),
            current_step: None,
            integrity_valid: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Move to `next`, rejecting transitions the state machine forbids.
    pub fn transition(&mut self, next: RollbackStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(PitrError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        } else {
            self.current_step = Some(next.to_string());
        }
        Ok(())
    }

    pub fn push_step(
        &mut self,
        table_name: Option<&str>,
        outcome: StepOutcome,
        rows: u64,
        message: impl Into<String>,
    ) {
        self.restoration_steps.push(RestorationStep {
            phase: self.status,
            table_name: table_name.map(str::to_string),
            outcome,
            rows,
            message: message.into(),
            at: Utc::now(),
        });
    }

    pub fn push_error(&mut self, err: &ExError) {
        self.errors_encountered
            .push(RollbackError::from_ex(self.status, err));
    }

    pub fn has_errors(&self) -> bool {
        !self.errors_encountered.is_empty()
    }

    /// Every acquired lease has been re-enabled.
    pub fn leases_released(&self) -> bool {
        self.fk_constraints_handled
            .iter()
            .all(|lease| lease.re_enabled_at.is_some())
    }

    pub fn summary(&self) -> RollbackSummary {
        RollbackSummary {
            rollback_id: self.id.clone(),
            snapshot_id: self.snapshot_id.clone(),
            status: self.status,
            initiated_by: self.initiated_by.clone(),
            reason: self.reason.clone(),
            tables_restored: self.tables_restored.len(),
            rows_restored: self.rows_restored,
            error_count: self.errors_encountered.len(),
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }
}

/// History listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackSummary {
    pub rollback_id: String,
    pub snapshot_id: String,
    pub status: RollbackStatus,
    pub initiated_by: String,
    pub reason: String,
    pub tables_restored: usize,
    pub rows_restored: u64,
    pub error_count: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ExErrorKind;

    fn record() -> RollbackRecord {
        RollbackRecord::new("rb-1", "t1", "snap-1", "ops", "bad deploy", None)
    }

    #[test]
    fn test_success_path_transitions() {
        let mut rec = record();
        for next in [
            RollbackStatus::Validating,
            RollbackStatus::ConstraintsDisabled,
            RollbackStatus::Restoring,
            RollbackStatus::Reenabling,
            RollbackStatus::ValidatingIntegrity,
            RollbackStatus::Completed,
        ] {
            rec.transition(next).unwrap();
        }
        assert!(rec.completed_at.is_some());
        assert_eq!(rec.current_step.as_deref(), Some("validating_integrity"));
    }

    #[test]
    fn test_cannot_skip_reenabling() {
        let mut rec = record();
        rec.transition(RollbackStatus::Validating).unwrap();
        rec.transition(RollbackStatus::ConstraintsDisabled).unwrap();
        rec.transition(RollbackStatus::Restoring).unwrap();
        assert!(rec.transition(RollbackStatus::Completed).is_err());
        assert!(rec
            .transition(RollbackStatus::ValidatingIntegrity)
            .is_err());
    }

    #[test]
    fn test_terminal_is_final() {
        let mut rec = record();
        rec.transition(RollbackStatus::Failed).unwrap();
        assert!(rec.transition(RollbackStatus::Validating).is_err());
        assert!(rec.transition(RollbackStatus::Failed).is_err());
    }

    #[test]
    fn test_error_keeps_phase_and_code() {
        let mut rec = record();
        rec.transition(RollbackStatus::Validating).unwrap();
        rec.push_error(
            &ExError::new(ExErrorKind::Restore)
                .with_table("b")
                .with_message("bad row"),
        );
        let err = &rec.errors_encountered[0];
        assert_eq!(err.code, "ERR_RESTORE");
        assert_eq!(err.step, RollbackStatus::Validating);
        assert_eq!(err.table_name.as_deref(), Some("b"));
    }

    #[test]
    fn test_status_tags() {
        for status in [
            RollbackStatus::Requested,
            RollbackStatus::ConstraintsDisabled,
            RollbackStatus::ValidatingIntegrity,
            RollbackStatus::Failed,
        ] {
            assert_eq!(RollbackStatus::parse(status.as_str()).unwrap(), status);
        }
    }
}
