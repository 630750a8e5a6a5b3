use pitr_core_types::RequestId;
use thiserror::Error;

/// Result type alias using PitrError
pub type Result<T> = std::result::Result<T, PitrError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Each kind maps to a stable error code that can be used for programmatic
/// handling, for assertions in tests, and inside persisted rollback records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Rejected before any mutation
    Validation,
    NotFound,
    Concurrency,
    ExpiredSnapshot,
    Cancelled,

    // Restoration
    /// Dependency graph has a cycle across distinct tables (handled, not fatal)
    SchemaCycle,
    /// Row-level apply failure during restore or replay
    Restore,
    /// Disable or re-enable of a foreign-key constraint failed
    Constraint,
    /// Post-restore state does not match the expected state
    Integrity,
    Timeout,

    // Integration/IO
    Io,
    Serialization,
    Persistence,
    Config,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::Validation => "ERR_VALIDATION",
            ExErrorKind::NotFound => "ERR_NOT_FOUND",
            ExErrorKind::Concurrency => "ERR_CONCURRENCY",
            ExErrorKind::ExpiredSnapshot => "ERR_EXPIRED_SNAPSHOT",
            ExErrorKind::Cancelled => "ERR_CANCELLED",
            ExErrorKind::SchemaCycle => "ERR_SCHEMA_CYCLE",
            ExErrorKind::Restore => "ERR_RESTORE",
            ExErrorKind::Constraint => "ERR_CONSTRAINT",
            ExErrorKind::Integrity => "ERR_INTEGRITY",
            ExErrorKind::Timeout => "ERR_TIMEOUT",
            ExErrorKind::Io => "ERR_IO",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Persistence => "ERR_PERSISTENCE",
            ExErrorKind::Config => "ERR_CONFIG",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }

    /// Whether this kind is raised before the engine has mutated anything.
    pub fn is_pre_mutation(&self) -> bool {
        matches!(
            self,
            ExErrorKind::Validation
                | ExErrorKind::NotFound
                | ExErrorKind::Concurrency
                | ExErrorKind::ExpiredSnapshot
                | ExErrorKind::Cancelled
        )
    }
}

/// Canonical structured error type
///
/// Classification fields for programmatic handling plus context for
/// diagnosing a failed operation without re-running it.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    entity_id: Option<String>,
    table: Option<String>,
    rollback_id: Option<String>,
    request_id: Option<RequestId>,
    message: String,
    source: Option<Box<ExError>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            entity_id: None,
            table: None,
            rollback_id: None,
            request_id: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add entity ID context (snapshot id, backup id, record id)
    pub fn with_entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    /// Add table context
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Add rollback ID context
    pub fn with_rollback_id(mut self, id: impl Into<String>) -> Self {
        self.rollback_id = Some(id.into());
        self
    }

    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.entity_id.as_deref()
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn rollback_id(&self) -> Option<&str> {
        self.rollback_id.as_deref()
    }

    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the source error, if any
    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(entity_id) = &self.entity_id {
            write!(f, " (entity_id: {})", entity_id)?;
        }
        if let Some(table) = &self.table {
            write!(f, " (table: {})", table)?;
        }
        if let Some(rollback_id) = &self.rollback_id {
            write!(f, " (rollback_id: {})", rollback_id)?;
        }
        if let Some(source) = &self.source {
            write!(f, " caused by {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Error taxonomy for the pure PITR core
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PitrError {
    // ===== Input Validation =====
    /// A required field was empty
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    /// Table is not registered in the schema registry
    #[error("Unknown table: {table}")]
    UnknownTable { table: String },

    /// Row carries a column the table schema does not declare
    #[error("Unknown column {column} in table {table}")]
    UnknownColumn { table: String, column: String },

    /// Column declared twice in one schema
    #[error("Duplicate column {column} in table {table}")]
    DuplicateColumn { table: String, column: String },

    /// Value type does not match the declared column type
    #[error("Type mismatch in {table}.{column}: expected {expected}, found {found}")]
    TypeMismatch {
        table: String,
        column: String,
        expected: String,
        found: String,
    },

    /// Non-nullable column missing or null
    #[error("Column {table}.{column} is not nullable")]
    NullViolation { table: String, column: String },

    /// Primary key column missing from schema or row
    #[error("Missing primary key in table {table}")]
    MissingPrimaryKey { table: String },

    /// Primary key value is not an integer or text
    #[error("Invalid primary key value in {table}.{column}")]
    InvalidPrimaryKey { table: String, column: String },

    /// Foreign key definition is malformed
    #[error("Invalid foreign key {constraint}: {reason}")]
    InvalidForeignKey { constraint: String, reason: String },

    // ===== Planning =====
    /// Dependency graph contains a cycle across distinct tables
    #[error("Foreign key cycle across tables: {}", tables.join(", "))]
    SchemaCycle { tables: Vec<String> },

    // ===== Replay =====
    /// A change-log entry cannot be applied to the current table state
    #[error("Cannot replay change on {table}/{record_id}: {reason}")]
    ReplayConflict {
        table: String,
        record_id: String,
        reason: String,
    },

    // ===== State Machine =====
    /// Rollback status transition not permitted
    #[error("Invalid rollback transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    // ===== Configuration =====
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // ===== Generic Errors =====
    /// Serialization error (JSON/TOML encoding or decoding)
    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl From<serde_json::Error> for PitrError {
    fn from(err: serde_json::Error) -> Self {
        PitrError::Serialization {
            message: err.to_string(),
        }
    }
}

/// Conversion from PitrError to ExError
///
/// Core failures surface at store/engine boundaries in the canonical facility.
impl From<PitrError> for ExError {
    fn from(err: PitrError) -> Self {
        let message = err.to_string();
        match err {
            PitrError::MissingField { .. }
            | PitrError::UnknownColumn { .. }
            | PitrError::DuplicateColumn { .. }
            | PitrError::TypeMismatch { .. }
            | PitrError::NullViolation { .. }
            | PitrError::MissingPrimaryKey { .. }
            | PitrError::InvalidPrimaryKey { .. } => {
                ExError::new(ExErrorKind::Validation).with_message(message)
            }

            PitrError::UnknownTable { table } => ExError::new(ExErrorKind::Validation)
                .with_table(table)
                .with_message(message),

            PitrError::InvalidForeignKey { constraint, .. } => {
                ExError::new(ExErrorKind::Validation)
                    .with_entity_id(constraint)
                    .with_message(message)
            }

            PitrError::SchemaCycle { .. } => ExError::new(ExErrorKind::SchemaCycle)
                .with_op("restoration_order")
                .with_message(message),

            PitrError::ReplayConflict {
                table, record_id, ..
            } => ExError::new(ExErrorKind::Restore)
                .with_op("replay")
                .with_table(table)
                .with_entity_id(record_id)
                .with_message(message),

            PitrError::InvalidTransition { .. } => {
                ExError::new(ExErrorKind::Internal).with_message(message)
            }

            PitrError::InvalidConfig { .. } => {
                ExError::new(ExErrorKind::Config).with_message(message)
            }

            PitrError::Serialization { .. } => {
                ExError::new(ExErrorKind::Serialization).with_message(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_unique() {
        let kinds = [
            ExErrorKind::Validation,
            ExErrorKind::NotFound,
            ExErrorKind::Concurrency,
            ExErrorKind::ExpiredSnapshot,
            ExErrorKind::Cancelled,
            ExErrorKind::SchemaCycle,
            ExErrorKind::Restore,
            ExErrorKind::Constraint,
            ExErrorKind::Integrity,
            ExErrorKind::Timeout,
            ExErrorKind::Io,
            ExErrorKind::Serialization,
            ExErrorKind::Persistence,
            ExErrorKind::Config,
            ExErrorKind::Internal,
        ];
        let mut codes: Vec<_> = kinds.iter().map(|k| k.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), kinds.len());
    }

    #[test]
    fn test_display_includes_context() {
        let err = ExError::new(ExErrorKind::Concurrency)
            .with_op("disable_constraints")
            .with_table("orders")
            .with_message("lease held by rb-1");
        let text = err.to_string();
        assert!(text.starts_with("[ERR_CONCURRENCY]"));
        assert!(text.contains("disable_constraints"));
        assert!(text.contains("table: orders"));
    }

    #[test]
    fn test_source_chain() {
        let root = ExError::new(ExErrorKind::Restore).with_message("row rejected");
        let err = ExError::new(ExErrorKind::Constraint).with_source(root);
        assert_eq!(
            err.source_error().map(|e| e.kind()),
            Some(ExErrorKind::Restore)
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
