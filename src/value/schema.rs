//! Column metadata for one query result

use std::sync::Arc;

use super::coercion::DriverType;
use super::types::{LogicalType, Value};

/// One result column: its name, native type and logical type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    name: String,
    driver_type: DriverType,
}

impl Column {
    pub fn new(name: impl Into<String>, driver_type: DriverType) -> Self {
        Self {
            name: name.into(),
            driver_type,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn driver_type(&self) -> &DriverType {
        &self.driver_type
    }

    pub fn logical_type(&self) -> LogicalType {
        self.driver_type.logical_type()
    }
}

/// Ordered, immutable column list of a result set
///
/// Column order is the output column order of every format. Cloning is
/// cheap; all clones share the same column list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    columns: Arc<[Column]>,
}

/// One result row, positionally matching its [`ColumnSchema`]
pub type Row = Vec<Value>;

impl ColumnSchema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns: columns.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(Column::name)
    }

    /// Index of the first value that does not fit its column, if any
    pub fn first_mismatch(&self, row: &[Value]) -> Option<usize> {
        if row.len() != self.columns.len() {
            return Some(row.len().min(self.columns.len()));
        }
        row.iter()
            .zip(self.columns.iter())
            .position(|(value, column)| !value.conforms_to(column.logical_type()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::coercion::resolve_type;

    fn schema() -> ColumnSchema {
        ColumnSchema::new(vec![
            Column::new("id", resolve_type("id", "BIGINT").unwrap()),
            Column::new("name", resolve_type("name", "VARCHAR").unwrap()),
        ])
    }

    #[test]
    fn test_names_in_order() {
        let schema = schema();
        let names: Vec<&str> = schema.names().collect();
        assert_eq!(names, vec!["id", "name"]);
    }

    #[test]
    fn test_first_mismatch() {
        let schema = schema();
        assert_eq!(
            schema.first_mismatch(&[Value::Integer(1), Value::Absent]),
            None
        );
        assert_eq!(
            schema.first_mismatch(&[Value::Integer(1), Value::Integer(2)]),
            Some(1)
        );
        assert_eq!(schema.first_mismatch(&[Value::Integer(1)]), Some(1));
    }
}
