use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::unknown_tag;
use super::value::TypedRow;
use crate::errors::{PitrError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOperation {
    Insert,
    Update,
    Delete,
}

impl ChangeOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeOperation::Insert => "insert",
            ChangeOperation::Update => "update",
            ChangeOperation::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "insert" => Ok(ChangeOperation::Insert),
            "update" => Ok(ChangeOperation::Update),
            "delete" => Ok(ChangeOperation::Delete),
            other => Err(unknown_tag("change operation", other)),
        }
    }
}

/// A change event before it has been assigned a sequence
#[derive(Debug, Clone, PartialEq)]
pub struct NewChangeLogEntry {
    pub tenant_id: String,
    pub table_name: String,
    pub record_id: String,
    pub operation: ChangeOperation,
    pub old_data: Option<TypedRow>,
    pub new_data: Option<TypedRow>,
    pub changed_at: DateTime<Utc>,
    pub backup_job_id: Option<String>,
}

impl NewChangeLogEntry {
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("tenant_id", &self.tenant_id),
            ("table_name", &self.table_name),
            ("record_id", &self.record_id),
        ] {
            if value.trim().is_empty() {
                return Err(PitrError::MissingField {
                    field: field.to_string(),
                });
            }
        }
        if matches!(
            self.operation,
            ChangeOperation::Insert | ChangeOperation::Update
        ) && self.new_data.is_none()
        {
            return Err(PitrError::MissingField {
                field: "new_data".to_string(),
            });
        }
        Ok(())
    }
}

/// A persisted change event. `sequence` is assigned on append and breaks
/// ties between entries with the same `changed_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub sequence: i64,
    pub tenant_id: String,
    pub table_name: String,
    pub record_id: String,
    pub operation: ChangeOperation,
    pub old_data: Option<TypedRow>,
    pub new_data: Option<TypedRow>,
    pub changed_at: DateTime<Utc>,
    pub backup_job_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(op: ChangeOperation) -> NewChangeLogEntry {
        NewChangeLogEntry {
            tenant_id: "t1".into(),
            table_name: "a".into(),
            record_id: "id1".into(),
            operation: op,
            old_data: None,
            new_data: None,
            changed_at: Utc::now(),
            backup_job_id: None,
        }
    }

    #[test]
    fn test_missing_tenant_rejected() {
        let mut e = entry(ChangeOperation::Delete);
        e.tenant_id = String::new();
        assert_eq!(
            e.validate(),
            Err(PitrError::MissingField {
                field: "tenant_id".into()
            })
        );
    }

    #[test]
    fn test_insert_requires_new_data() {
        assert!(entry(ChangeOperation::Insert).validate().is_err());
        assert!(entry(ChangeOperation::Delete).validate().is_ok());
    }

    #[test]
    fn test_operation_tags() {
        for op in [
            ChangeOperation::Insert,
            ChangeOperation::Update,
            ChangeOperation::Delete,
        ] {
            assert_eq!(ChangeOperation::parse(op.as_str()).unwrap(), op);
        }
        assert!(ChangeOperation::parse("upsert").is_err());
    }
}
