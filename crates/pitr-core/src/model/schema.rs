//! Per-table schema registry
//!
//! Every managed table is described by a `TableSchema`. Rows are validated
//! against it when a snapshot is captured, when a snapshot is restored and
//! when change-log entries are replayed, so a payload that no longer fits
//! its table fails loudly instead of being written half-parsed.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::unknown_tag;
use super::value::TypedRow;
use crate::errors::{PitrError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Boolean,
    Timestamp,
    Json,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Real => "real",
            ColumnType::Text => "text",
            ColumnType::Boolean => "boolean",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Json => "json",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "integer" => Ok(ColumnType::Integer),
            "real" => Ok(ColumnType::Real),
            "text" => Ok(ColumnType::Text),
            "boolean" => Ok(ColumnType::Boolean),
            "timestamp" => Ok(ColumnType::Timestamp),
            "json" => Ok(ColumnType::Json),
            other => Err(unknown_tag("column type", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    #[serde(default)]
    pub nullable: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// A foreign key from `column` of the owning table to the primary key of
/// `references_table`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyDef {
    pub constraint_name: String,
    pub column: String,
    pub references_table: String,
    pub references_column: String,
}

impl ForeignKeyDef {
    pub fn new(
        constraint_name: impl Into<String>,
        column: impl Into<String>,
        references_table: impl Into<String>,
        references_column: impl Into<String>,
    ) -> Self {
        Self {
            constraint_name: constraint_name.into(),
            column: column.into(),
            references_table: references_table.into(),
            references_column: references_column.into(),
        }
    }

    /// DDL-style definition stored on the lease so the constraint can be
    /// re-created exactly as it was.
    pub fn definition(&self) -> String {
        format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}({})",
            self.constraint_name, self.column, self.references_table, self.references_column
        )
    }

    /// Parse a definition produced by [`ForeignKeyDef::definition`].
    pub fn parse_definition(definition: &str) -> Result<Self> {
        let invalid = |reason: &str| PitrError::InvalidForeignKey {
            constraint: definition.to_string(),
            reason: reason.to_string(),
        };

        let rest = definition
            .strip_prefix("CONSTRAINT ")
            .ok_or_else(|| invalid("missing CONSTRAINT prefix"))?;
        let (name, rest) = rest
            .split_once(" FOREIGN KEY (")
            .ok_or_else(|| invalid("missing FOREIGN KEY clause"))?;
        let (column, rest) = rest
            .split_once(") REFERENCES ")
            .ok_or_else(|| invalid("missing REFERENCES clause"))?;
        let (table, rest) = rest
            .split_once('(')
            .ok_or_else(|| invalid("missing referenced column"))?;
        let referenced = rest
            .strip_suffix(')')
            .ok_or_else(|| invalid("unterminated referenced column"))?;

        Ok(Self::new(name, column, table, referenced))
    }

    pub fn is_self_reference(&self, owner: &str) -> bool {
        self.references_table == owner
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    /// Logical schema the table lives in; constraints are global within it
    #[serde(default = "default_schema_name")]
    pub schema_name: String,
    pub primary_key: String,
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyDef>,
}

fn default_schema_name() -> String {
    "public".to_string()
}

impl TableSchema {
    pub fn new(name: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema_name: default_schema_name(),
            primary_key: primary_key.into(),
            columns: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn foreign_key(mut self, fk: ForeignKeyDef) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    pub fn column_def(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Structural checks that do not need other tables.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(PitrError::MissingField {
                field: "table_name".to_string(),
            });
        }

        let mut seen = BTreeSet::new();
        for col in &self.columns {
            if !seen.insert(col.name.as_str()) {
                return Err(PitrError::DuplicateColumn {
                    table: self.name.clone(),
                    column: col.name.clone(),
                });
            }
        }

        match self.column_def(&self.primary_key) {
            None => {
                return Err(PitrError::MissingPrimaryKey {
                    table: self.name.clone(),
                })
            }
            Some(pk) if !matches!(pk.column_type, ColumnType::Integer | ColumnType::Text) => {
                return Err(PitrError::InvalidPrimaryKey {
                    table: self.name.clone(),
                    column: pk.name.clone(),
                })
            }
            Some(_) => {}
        }

        for fk in &self.foreign_keys {
            if fk.constraint_name.trim().is_empty() {
                return Err(PitrError::InvalidForeignKey {
                    constraint: format!("{}.{}", self.name, fk.column),
                    reason: "constraint name is empty".to_string(),
                });
            }
            if self.column_def(&fk.column).is_none() {
                return Err(PitrError::InvalidForeignKey {
                    constraint: fk.constraint_name.clone(),
                    reason: format!("column {} not in table {}", fk.column, self.name),
                });
            }
        }

        Ok(())
    }

    /// Validate a row against this schema.
    pub fn validate_row(&self, row: &TypedRow) -> Result<()> {
        for (column, value) in row.columns() {
            let def = self
                .column_def(column)
                .ok_or_else(|| PitrError::UnknownColumn {
                    table: self.name.clone(),
                    column: column.clone(),
                })?;
            if !value.is_null() && !value.fits(def.column_type) {
                return Err(PitrError::TypeMismatch {
                    table: self.name.clone(),
                    column: column.clone(),
                    expected: def.column_type.as_str().to_string(),
                    found: value.type_name().to_string(),
                });
            }
        }

        for def in &self.columns {
            let missing = row.get(&def.name).map_or(true, |v| v.is_null());
            if missing && !def.nullable {
                return Err(PitrError::NullViolation {
                    table: self.name.clone(),
                    column: def.name.clone(),
                });
            }
        }

        Ok(())
    }

    /// Primary key of a row in key form.
    pub fn record_id(&self, row: &TypedRow) -> Result<String> {
        row.get(&self.primary_key)
            .ok_or_else(|| PitrError::MissingPrimaryKey {
                table: self.name.clone(),
            })?
            .as_key()
            .ok_or_else(|| PitrError::InvalidPrimaryKey {
                table: self.name.clone(),
                column: self.primary_key.clone(),
            })
    }
}

/// Registry of all managed table schemas, keyed by table name.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    tables: BTreeMap<String, TableSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a table schema.
    ///
    /// Referenced tables must already be registered, except for
    /// self-references, and every foreign key must target the referenced
    /// table's primary key.
    pub fn register(&mut self, schema: TableSchema) -> Result<()> {
        schema.validate()?;
        self.check_foreign_keys(&schema)?;
        self.tables.insert(schema.name.clone(), schema);
        Ok(())
    }

    /// Rebuild a registry from stored schemas in any order.
    ///
    /// Foreign keys are checked against the complete set, so schemas that
    /// were re-registered into a reference loop still load.
    pub fn from_schemas(schemas: impl IntoIterator<Item = TableSchema>) -> Result<Self> {
        let mut registry = Self::new();
        for schema in schemas {
            schema.validate()?;
            registry.tables.insert(schema.name.clone(), schema);
        }
        for schema in registry.tables.values() {
            registry.check_foreign_keys(schema)?;
        }
        Ok(registry)
    }

    fn check_foreign_keys(&self, schema: &TableSchema) -> Result<()> {
        for fk in &schema.foreign_keys {
            let target = if fk.is_self_reference(&schema.name) {
                schema
            } else {
                self.tables
                    .get(&fk.references_table)
                    .ok_or_else(|| PitrError::InvalidForeignKey {
                        constraint: fk.constraint_name.clone(),
                        reason: format!("referenced table {} is not registered", fk.references_table),
                    })?
            };
            if target.primary_key != fk.references_column {
                return Err(PitrError::InvalidForeignKey {
                    constraint: fk.constraint_name.clone(),
                    reason: format!(
                        "must reference primary key {}.{}",
                        target.name, target.primary_key
                    ),
                });
            }
        }
        Ok(())
    }

    pub fn get(&self, table: &str) -> Result<&TableSchema> {
        self.tables.get(table).ok_or_else(|| PitrError::UnknownTable {
            table: table.to_string(),
        })
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.values()
    }

    /// Foreign keys on other tables (or the table itself) that point at `table`.
    pub fn referencing(&self, table: &str) -> Vec<(&TableSchema, &ForeignKeyDef)> {
        self.tables
            .values()
            .flat_map(|t| t.foreign_keys.iter().map(move |fk| (t, fk)))
            .filter(|(_, fk)| fk.references_table == table)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Value;

    fn parent() -> TableSchema {
        TableSchema::new("a", "id")
            .column(ColumnDef::new("id", ColumnType::Text))
            .column(ColumnDef::new("val", ColumnType::Integer))
    }

    fn child() -> TableSchema {
        TableSchema::new("b", "id")
            .column(ColumnDef::new("id", ColumnType::Text))
            .column(ColumnDef::new("a_id", ColumnType::Text).nullable())
            .column(ColumnDef::new("val", ColumnType::Integer))
            .foreign_key(ForeignKeyDef::new("fk_b_a", "a_id", "a", "id"))
    }

    #[test]
    fn test_definition_round_trips() {
        let fk = ForeignKeyDef::new("fk_b_a", "a_id", "a", "id");
        let parsed = ForeignKeyDef::parse_definition(&fk.definition()).unwrap();
        assert_eq!(parsed, fk);
    }

    #[test]
    fn test_malformed_definition_rejected() {
        assert!(ForeignKeyDef::parse_definition("FOREIGN KEY a_id").is_err());
    }

    #[test]
    fn test_register_requires_parent_first() {
        let mut registry = SchemaRegistry::new();
        assert!(matches!(
            registry.register(child()),
            Err(PitrError::InvalidForeignKey { .. })
        ));
        registry.register(parent()).unwrap();
        registry.register(child()).unwrap();
        assert_eq!(registry.referencing("a").len(), 1);
    }

    #[test]
    fn test_from_schemas_accepts_any_order() {
        let registry = SchemaRegistry::from_schemas(vec![child(), parent()]).unwrap();
        assert!(registry.contains("a"));
        assert!(registry.contains("b"));

        assert!(SchemaRegistry::from_schemas(vec![child()]).is_err());
    }

    #[test]
    fn test_self_reference_registers() {
        let mut registry = SchemaRegistry::new();
        let employees = TableSchema::new("employees", "id")
            .column(ColumnDef::new("id", ColumnType::Integer))
            .column(ColumnDef::new("manager_id", ColumnType::Integer).nullable())
            .foreign_key(ForeignKeyDef::new(
                "fk_emp_manager",
                "manager_id",
                "employees",
                "id",
            ));
        registry.register(employees).unwrap();
    }

    #[test]
    fn test_fk_must_target_primary_key() {
        let mut registry = SchemaRegistry::new();
        registry.register(parent()).unwrap();
        let bad = child();
        let bad = TableSchema {
            foreign_keys: vec![ForeignKeyDef::new("fk_b_a", "a_id", "a", "val")],
            ..bad
        };
        assert!(registry.register(bad).is_err());
    }

    #[test]
    fn test_validate_row() {
        let schema = child();
        let ok = TypedRow::new().with("id", "id1").with("a_id", "id1").with("val", 10);
        schema.validate_row(&ok).unwrap();

        let nullable_missing = TypedRow::new().with("id", "id2").with("val", 1);
        schema.validate_row(&nullable_missing).unwrap();

        let wrong_type = TypedRow::new().with("id", "id1").with("val", "ten");
        assert!(matches!(
            schema.validate_row(&wrong_type),
            Err(PitrError::TypeMismatch { .. })
        ));

        let missing = TypedRow::new().with("id", "id1");
        assert!(matches!(
            schema.validate_row(&missing),
            Err(PitrError::NullViolation { .. })
        ));

        let extra = ok.clone().with("color", "red");
        assert!(matches!(
            schema.validate_row(&extra),
            Err(PitrError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_record_id() {
        let schema = parent();
        let row = TypedRow::new().with("id", "id1").with("val", 1);
        assert_eq!(schema.record_id(&row).unwrap(), "id1");

        let row = TypedRow::new().with("id", Value::Null).with("val", 1);
        assert!(schema.record_id(&row).is_err());
    }

    #[test]
    fn test_real_primary_key_rejected() {
        let schema = TableSchema::new("m", "id").column(ColumnDef::new("id", ColumnType::Real));
        assert!(matches!(
            schema.validate(),
            Err(PitrError::InvalidPrimaryKey { .. })
        ));
    }
}
