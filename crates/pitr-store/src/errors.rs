//! Store-side constructors for `ExError`.
//!
//! Repositories never return `rusqlite` or `serde_json` errors directly;
//! these helpers fold them into the shared facility with an `op` attached.

use pitr_core::errors::{ExError, ExErrorKind};

pub type Result<T> = std::result::Result<T, ExError>;

pub fn migration_error(migration_id: &str, reason: &str) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("migration")
        .with_message(format!("Migration {} failed: {}", migration_id, reason))
}

/// An applied migration whose SQL changed since
pub fn checksum_mismatch(migration_id: &str, expected: &str, actual: &str) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("migration_checksum")
        .with_message(format!(
            "Checksum mismatch for migration {}: expected {}, got {}",
            migration_id, expected, actual
        ))
}

pub fn from_rusqlite(err: rusqlite::Error) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("sqlite")
        .with_message(err.to_string())
}

/// JSON column that failed to encode or decode
pub fn serialization_error(op: &str, err: serde_json::Error) -> ExError {
    ExError::new(ExErrorKind::Serialization)
        .with_op(op.to_string())
        .with_message(err.to_string())
}

pub fn not_found(op: &str, entity_id: &str, what: &str) -> ExError {
    ExError::new(ExErrorKind::NotFound)
        .with_op(op.to_string())
        .with_entity_id(entity_id.to_string())
        .with_message(format!("{} not found", what))
}

/// Write rejected by an enabled foreign-key constraint
pub fn constraint_violation(table: &str, constraint: &str, reason: String) -> ExError {
    ExError::new(ExErrorKind::Constraint)
        .with_op("enforce_foreign_key")
        .with_table(table.to_string())
        .with_entity_id(constraint.to_string())
        .with_message(reason)
}
