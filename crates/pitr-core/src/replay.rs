//! Change-log replay over an in-memory table state.
//!
//! Restoration starts from the snapshot rows and applies the change-log
//! entries recorded after the snapshot, in `(changed_at, sequence)` order,
//! up to the rollback's target timestamp. The same fold computes the
//! expected post-restore state used by integrity validation.

use crate::errors::{PitrError, Result};
use crate::model::{ChangeLogEntry, ChangeOperation, TableSchema, TypedRow};
use std::collections::BTreeMap;

/// Rows of one table keyed by record id
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableState {
    rows: BTreeMap<String, TypedRow>,
}

impl TableState {
    /// Build a state from snapshot rows, validating each row.
    pub fn from_rows(schema: &TableSchema, rows: &[TypedRow]) -> Result<Self> {
        let mut state = Self::default();
        for row in rows {
            schema.validate_row(row)?;
            let record_id = schema.record_id(row)?;
            state.rows.insert(record_id, row.clone());
        }
        Ok(state)
    }

    /// Apply one change-log entry.
    ///
    /// Inserts must target an absent record; updates and deletes must
    /// target a present one. Row images are validated against `schema` and
    /// their primary key must match the entry's record id.
    pub fn apply(&mut self, schema: &TableSchema, entry: &ChangeLogEntry) -> Result<()> {
        let conflict = |reason: &str| PitrError::ReplayConflict {
            table: entry.table_name.clone(),
            record_id: entry.record_id.clone(),
            reason: reason.to_string(),
        };

        match entry.operation {
            ChangeOperation::Insert | ChangeOperation::Update => {
                let row = entry
                    .new_data
                    .as_ref()
                    .ok_or_else(|| conflict("missing new_data"))?;
                schema.validate_row(row)?;
                if schema.record_id(row)? != entry.record_id {
                    return Err(conflict("primary key does not match record id"));
                }
                let exists = self.rows.contains_key(&entry.record_id);
                if entry.operation == ChangeOperation::Insert && exists {
                    return Err(conflict("insert of existing record"));
                }
                if entry.operation == ChangeOperation::Update && !exists {
                    return Err(conflict("update of missing record"));
                }
                self.rows.insert(entry.record_id.clone(), row.clone());
            }
            ChangeOperation::Delete => {
                if self.rows.remove(&entry.record_id).is_none() {
                    return Err(conflict("delete of missing record"));
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, record_id: &str) -> Option<&TypedRow> {
        self.rows.get(record_id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn record_ids(&self) -> impl Iterator<Item = &String> {
        self.rows.keys()
    }

    /// Rows in record-id order
    pub fn into_rows(self) -> Vec<TypedRow> {
        self.rows.into_values().collect()
    }
}

/// Snapshot rows of one table with `entries` applied in order.
pub fn replay_table(
    schema: &TableSchema,
    rows: &[TypedRow],
    entries: &[ChangeLogEntry],
) -> Result<Vec<TypedRow>> {
    let mut state = TableState::from_rows(schema, rows)?;
    for entry in entries {
        state.apply(schema, entry)?;
    }
    Ok(state.into_rows())
}
