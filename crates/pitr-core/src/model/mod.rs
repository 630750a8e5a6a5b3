//! Domain model for snapshots, change logs, rollbacks, leases and backups

pub mod backup;
pub mod changelog;
pub mod lease;
pub mod rollback;
pub mod schema;
pub mod snapshot;
pub mod value;

pub use backup::{BackupJob, BackupKind, BackupStatus};
pub use changelog::{ChangeLogEntry, ChangeOperation, NewChangeLogEntry};
pub use lease::FkConstraintLease;
pub use rollback::{
    RestorationStep, RollbackError, RollbackRecord, RollbackStatus, RollbackSummary, StepOutcome,
};
pub use schema::{ColumnDef, ColumnType, ForeignKeyDef, SchemaRegistry, TableSchema};
pub use snapshot::{PitrSnapshot, SnapshotStatus, SnapshotSummary};
pub use value::{TypedRow, Value};

/// Parse a lowercase enum tag, shared by the `parse` helpers of model enums.
pub(crate) fn unknown_tag(kind: &str, value: &str) -> crate::errors::PitrError {
    crate::errors::PitrError::Serialization {
        message: format!("unknown {} '{}'", kind, value),
    }
}
