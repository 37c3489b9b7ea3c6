//! Column descriptors and materialized results

use super::types::{DeclaredType, WireType};
use super::value::HostValue;
use serde::{Deserialize, Serialize};

/// Describes one result column or bind slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Type the database declared for the column
    pub declared_type: DeclaredType,
    /// Wire representation the driver uses for the column's values
    pub native_type: WireType,
    pub precision: u16,
    pub scale: u16,
    pub max_size: usize,
    pub nullable: bool,
}

impl ColumnInfo {
    /// Descriptor with a name and types, zero precision/scale/size, nullable
    pub fn new(name: impl Into<String>, declared_type: DeclaredType, native_type: WireType) -> Self {
        Self {
            name: name.into(),
            declared_type,
            native_type,
            precision: 0,
            scale: 0,
            max_size: 0,
            nullable: true,
        }
    }

    pub fn with_precision(mut self, precision: u16, scale: u16) -> Self {
        self.precision = precision;
        self.scale = scale;
        self
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// One decoded row, positionally aligned with the result's columns
pub type Row = Vec<HostValue>;

/// Eager snapshot of one executed statement's output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    columns: Vec<ColumnInfo>,
    rows: Vec<Row>,
}

impl QueryResult {
    pub(crate) fn new(columns: Vec<ColumnInfo>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Column names in ordinal order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    /// Value at `row` in the column called `column`
    pub fn get(&self, row: usize, column: &str) -> Option<&HostValue> {
        let index = self.columns.iter().position(|c| c.name == column)?;
        self.rows.get(row)?.get(index)
    }
}

impl<'a> IntoIterator for &'a QueryResult {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> QueryResult {
        QueryResult::new(
            vec![
                ColumnInfo::new("a", DeclaredType::Int, WireType::Val32),
                ColumnInfo::new("b", DeclaredType::Varchar, WireType::String),
            ],
            vec![
                vec![HostValue::Integer(1), HostValue::from("x")],
                vec![HostValue::Integer(2), HostValue::Null],
            ],
        )
    }

    #[test]
    fn test_result_accessors() {
        let result = sample();
        assert_eq!(result.column_names(), vec!["a", "b"]);
        assert_eq!(result.len(), 2);
        assert!(!result.is_empty());
        assert_eq!(result.first().unwrap()[0], HostValue::Integer(1));
        assert_eq!(result.get(1, "a"), Some(&HostValue::Integer(2)));
        assert_eq!(result.get(1, "b"), Some(&HostValue::Null));
        assert_eq!(result.get(0, "missing"), None);
        assert_eq!(result.get(5, "a"), None);
    }

    #[test]
    fn test_result_iteration() {
        let result = sample();
        let mut count = 0;
        for row in &result {
            assert_eq!(row.len(), 2);
            count += 1;
        }
        assert_eq!(count, 2);
        assert_eq!(result.iter().count(), 2);
    }

    #[test]
    fn test_column_builder() {
        let col = ColumnInfo::new("price", DeclaredType::Decimal, WireType::String)
            .with_precision(10, 2)
            .with_max_size(12)
            .not_null();
        assert_eq!(col.precision, 10);
        assert_eq!(col.scale, 2);
        assert_eq!(col.max_size, 12);
        assert!(!col.nullable);
    }
}
