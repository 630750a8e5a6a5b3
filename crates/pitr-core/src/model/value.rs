use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::schema::ColumnType;

/// A single typed column value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    /// Unix milliseconds
    Timestamp(i64),
    Json(serde_json::Value),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Timestamp(_) => "timestamp",
            Value::Json(_) => "json",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether a non-null value may be stored in a column of `column_type`.
    ///
    /// Integers widen into real columns; nothing else converts.
    pub fn fits(&self, column_type: ColumnType) -> bool {
        matches!(
            (self, column_type),
            (Value::Bool(_), ColumnType::Boolean)
                | (Value::Integer(_), ColumnType::Integer)
                | (Value::Integer(_), ColumnType::Real)
                | (Value::Real(_), ColumnType::Real)
                | (Value::Text(_), ColumnType::Text)
                | (Value::Timestamp(_), ColumnType::Timestamp)
                | (Value::Json(_), ColumnType::Json)
        )
    }

    /// Key form used for primary and foreign key lookups.
    pub fn as_key(&self) -> Option<String> {
        match self {
            Value::Integer(i) => Some(i.to_string()),
            Value::Text(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

/// One row of a managed table, column name → value.
///
/// Columns are kept sorted so serialization is canonical.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypedRow(BTreeMap<String, Value>);

impl TypedRow {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style column assignment
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(column.into(), value.into());
        self
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Value)> for TypedRow {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_widens_to_real() {
        assert!(Value::Integer(3).fits(ColumnType::Real));
        assert!(!Value::Real(3.0).fits(ColumnType::Integer));
        assert!(!Value::Text("3".into()).fits(ColumnType::Integer));
    }

    #[test]
    fn test_key_form() {
        assert_eq!(Value::Integer(7).as_key().as_deref(), Some("7"));
        assert_eq!(Value::from("id1").as_key().as_deref(), Some("id1"));
        assert_eq!(Value::Bool(true).as_key(), None);
    }

    #[test]
    fn test_row_serialization_is_column_ordered() {
        let a = TypedRow::new().with("b", 2).with("a", 1);
        let b = TypedRow::new().with("a", 1).with("b", 2);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }
}
