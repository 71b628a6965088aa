//! Row-ordered tables of typed cells.

use std::fmt;

use serde_json::{Map, Number, Value};

use crate::errors::CodingError;

/// Name of the single column a flat text sequence is normalized into.
pub const TEXT_COLUMN: &str = "text";

/// One table value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// Missing value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Whole number.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Text.
    Text(String),
    /// Nested array or object.
    Json(Value),
}

impl Cell {
    /// Text handed to the model for this cell.
    ///
    /// `Null` becomes the empty string, scalars their display form, and
    /// nested values compact JSON.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => s.clone(),
            Self::Json(v) => v.to_string(),
        }
    }

    /// Converts back to JSON.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
            Self::Text(s) => Value::String(s.clone()),
            Self::Json(v) => v.clone(),
        }
    }
}

impl From<Value> for Cell {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float))
                .unwrap_or_else(|| Self::Json(Value::Number(n))),
            Value::String(s) => Self::Text(s),
            nested @ (Value::Array(_) | Value::Object(_)) => Self::Json(nested),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

/// Ordered rows under uniquely named columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Creates an empty table.
    ///
    /// # Errors
    ///
    /// Returns [`CodingError::InvalidArgument`] on duplicate column names.
    pub fn new<I, S>(columns: I) -> Result<Self, CodingError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        for (i, name) in columns.iter().enumerate() {
            if columns[..i].contains(name) {
                return Err(CodingError::InvalidArgument {
                    argument: "table",
                    reason: format!("duplicate column '{name}'"),
                });
            }
        }
        Ok(Self {
            columns,
            rows: Vec::new(),
        })
    }

    /// Single-column table named [`TEXT_COLUMN`].
    #[must_use]
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: vec![TEXT_COLUMN.to_string()],
            rows: texts.into_iter().map(|t| vec![Cell::Text(t.into())]).collect(),
        }
    }

    /// Builds a table from JSON objects; columns follow first appearance and
    /// absent keys become `Null`.
    ///
    /// # Errors
    ///
    /// Returns [`CodingError::InvalidArgument`] if a record is not an object.
    pub fn from_records(records: Vec<Value>) -> Result<Self, CodingError> {
        let mut objects = Vec::with_capacity(records.len());
        let mut columns: Vec<String> = Vec::new();
        for (i, record) in records.into_iter().enumerate() {
            let Value::Object(map) = record else {
                return Err(CodingError::InvalidArgument {
                    argument: "table",
                    reason: format!("record {i} is not an object"),
                });
            };
            for key in map.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
            objects.push(map);
        }

        let rows = objects
            .into_iter()
            .map(|mut map| {
                columns
                    .iter()
                    .map(|c| map.remove(c).map_or(Cell::Null, Cell::from))
                    .collect()
            })
            .collect();
        Ok(Self { columns, rows })
    }

    /// Appends a row.
    ///
    /// # Errors
    ///
    /// Returns [`CodingError::InvalidArgument`] if the row width differs
    /// from the column count.
    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<(), CodingError> {
        if row.len() != self.columns.len() {
            return Err(CodingError::InvalidArgument {
                argument: "table",
                reason: format!(
                    "row {} has {} cells, expected {}",
                    self.rows.len(),
                    row.len(),
                    self.columns.len()
                ),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Column names in order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows in order.
    #[must_use]
    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// `true` when the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Resolves a selector to a column index.
    ///
    /// # Errors
    ///
    /// Returns [`CodingError::ColumnNotFound`] for unknown names or
    /// out-of-range indices.
    pub fn column_index(&self, selector: &ColumnSelector) -> Result<usize, CodingError> {
        let found = match selector {
            ColumnSelector::Name(name) => self.columns.iter().position(|c| c == name),
            ColumnSelector::Index(i) => (*i < self.columns.len()).then_some(*i),
        };
        found.ok_or_else(|| CodingError::ColumnNotFound {
            column: selector.to_string(),
            available: self.columns.clone(),
        })
    }

    /// Texts of one column, one per row, in row order.
    ///
    /// # Errors
    ///
    /// Propagates [`Table::column_index`] errors.
    pub fn texts(&self, selector: &ColumnSelector) -> Result<Vec<String>, CodingError> {
        let index = self.column_index(selector)?;
        Ok(self.rows.iter().map(|row| row[index].to_text()).collect())
    }

    /// Rows as JSON objects keyed by column name.
    #[must_use]
    pub fn to_records(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().map(Cell::to_json))
                    .collect()
            })
            .collect()
    }

    /// Appends `fields` as new columns, taking each row's values from the
    /// matching result object. Missing properties become `Null`.
    ///
    /// # Errors
    ///
    /// Returns [`CodingError::InvalidArgument`] if a field name collides with
    /// an existing column, the result count differs from the row count, or a
    /// result is not an object.
    pub fn with_results(mut self, fields: &[String], results: Vec<Value>) -> Result<Self, CodingError> {
        if let Some(clash) = fields.iter().find(|f| self.columns.contains(f)) {
            return Err(CodingError::InvalidArgument {
                argument: "schema",
                reason: format!("field '{clash}' collides with an input column"),
            });
        }
        if results.len() != self.rows.len() {
            return Err(CodingError::InvalidArgument {
                argument: "results",
                reason: format!("{} results for {} rows", results.len(), self.rows.len()),
            });
        }

        if let Some(row) = results.iter().position(|r| !r.is_object()) {
            return Err(CodingError::InvalidArgument {
                argument: "results",
                reason: format!("result for row {row} is not an object: {}", results[row]),
            });
        }

        for (row, result) in self.rows.iter_mut().zip(results) {
            let Value::Object(mut object) = result else {
                continue;
            };
            row.extend(
                fields
                    .iter()
                    .map(|f| object.remove(f).map_or(Cell::Null, Cell::from)),
            );
        }
        self.columns.extend(fields.iter().cloned());
        Ok(self)
    }
}

/// Selector prefix forcing the rest of the text to be read as a column name.
pub const NAME_PREFIX: &str = "name:";

/// Identifies the text column of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSelector {
    /// By name.
    Name(String),
    /// By 0-based position.
    Index(usize),
}

impl ColumnSelector {
    /// Selects by name.
    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// Selects by 0-based position.
    #[must_use]
    pub const fn index(index: usize) -> Self {
        Self::Index(index)
    }

    /// Accepts exactly one selector out of a list.
    ///
    /// # Errors
    ///
    /// Returns [`CodingError::InvalidArgument`] for zero or several columns.
    pub fn single(selectors: Vec<Self>) -> Result<Self, CodingError> {
        let count = selectors.len();
        let mut iter = selectors.into_iter();
        match (iter.next(), count) {
            (Some(only), 1) => Ok(only),
            _ => Err(CodingError::InvalidArgument {
                argument: "column",
                reason: format!("exactly one column must be selected, got {count}"),
            }),
        }
    }

    /// Parses a command-line selector: a bare number is an index, anything
    /// else a name. A comma-separated list is rejected. The prefix `name:`
    /// takes the rest verbatim as a column name, for headers that are
    /// numeric or contain commas.
    ///
    /// # Errors
    ///
    /// Returns [`CodingError::InvalidArgument`] for empty or multi-column input.
    pub fn parse(text: &str) -> Result<Self, CodingError> {
        if let Some(name) = text.strip_prefix(NAME_PREFIX) {
            if name.is_empty() {
                return Err(CodingError::InvalidArgument {
                    argument: "column",
                    reason: format!("empty column name in '{text}'"),
                });
            }
            return Ok(Self::name(name));
        }
        let parts: Vec<&str> = text.split(',').map(str::trim).collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(CodingError::InvalidArgument {
                argument: "column",
                reason: format!("empty column selector '{text}'"),
            });
        }
        let selectors = parts
            .into_iter()
            .map(|p| p.parse::<usize>().map_or_else(|_| Self::name(p), Self::Index))
            .collect();
        Self::single(selectors)
    }
}

impl Default for ColumnSelector {
    fn default() -> Self {
        Self::Index(0)
    }
}

impl fmt::Display for ColumnSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "'{name}'"),
            Self::Index(i) => write!(f, "#{i}"),
        }
    }
}

impl From<&str> for ColumnSelector {
    fn from(name: &str) -> Self {
        Self::name(name)
    }
}

impl From<usize> for ColumnSelector {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// What a coding call accepts: a table, or bare texts.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// A table with a designated text column.
    Table(Table),
    /// A flat sequence of texts.
    Texts(Vec<String>),
}

impl Input {
    /// Normalizes to a table; bare texts become a single [`TEXT_COLUMN`].
    #[must_use]
    pub fn into_table(self) -> Table {
        match self {
            Self::Table(table) => table,
            Self::Texts(texts) => Table::from_texts(texts),
        }
    }
}

impl From<Table> for Input {
    fn from(table: Table) -> Self {
        Self::Table(table)
    }
}

impl From<Vec<String>> for Input {
    fn from(texts: Vec<String>) -> Self {
        Self::Texts(texts)
    }
}

impl From<Vec<&str>> for Input {
    fn from(texts: Vec<&str>) -> Self {
        Self::Texts(texts.into_iter().map(ToString::to_string).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn survey() -> Table {
        let mut table = Table::new(["id", "text"]).unwrap();
        table.push_row(vec![Cell::Int(1), "I like bananas".into()]).unwrap();
        table.push_row(vec![Cell::Int(2), Cell::Null]).unwrap();
        table
    }

    #[test]
    fn test_duplicate_columns_rejected() {
        assert!(matches!(
            Table::new(["a", "b", "a"]),
            Err(CodingError::InvalidArgument { argument: "table", .. })
        ));
    }

    #[test]
    fn test_push_row_checks_width() {
        let mut table = Table::new(["a"]).unwrap();
        assert!(table.push_row(vec![Cell::Null, Cell::Null]).is_err());
    }

    #[test]
    fn test_texts_by_name_and_index() {
        let table = survey();
        let by_name = table.texts(&ColumnSelector::name("text")).unwrap();
        let by_index = table.texts(&ColumnSelector::index(1)).unwrap();
        assert_eq!(by_name, vec!["I like bananas".to_string(), String::new()]);
        assert_eq!(by_name, by_index);
        assert_eq!(
            table.texts(&ColumnSelector::index(0)).unwrap(),
            vec!["1".to_string(), "2".to_string()]
        );
    }

    #[test]
    fn test_missing_column() {
        let err = survey().texts(&ColumnSelector::name("answer")).unwrap_err();
        match err {
            CodingError::ColumnNotFound { column, available } => {
                assert_eq!(column, "'answer'");
                assert_eq!(available, vec!["id".to_string(), "text".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(survey().texts(&ColumnSelector::index(2)).is_err());
    }

    #[test]
    fn test_cell_text_policy() {
        assert_eq!(Cell::Null.to_text(), "");
        assert_eq!(Cell::Bool(true).to_text(), "true");
        assert_eq!(Cell::Float(2.5).to_text(), "2.5");
        assert_eq!(Cell::Json(json!({"a": [1, 2]})).to_text(), r#"{"a":[1,2]}"#);
    }

    #[test]
    fn test_selector_parse() {
        assert_eq!(ColumnSelector::parse("text").unwrap(), ColumnSelector::name("text"));
        assert_eq!(ColumnSelector::parse("2").unwrap(), ColumnSelector::index(2));
        assert!(matches!(
            ColumnSelector::parse("a,b"),
            Err(CodingError::InvalidArgument { argument: "column", .. })
        ));
        assert!(ColumnSelector::parse("").is_err());
        assert!(ColumnSelector::single(Vec::new()).is_err());
    }

    #[test]
    fn test_selector_name_prefix() {
        assert_eq!(ColumnSelector::parse("name:2021").unwrap(), ColumnSelector::name("2021"));
        assert_eq!(
            ColumnSelector::parse("name:likes, dislikes").unwrap(),
            ColumnSelector::name("likes, dislikes")
        );
        assert!(ColumnSelector::parse("name:").is_err());

        let mut table = Table::new(["id", "2021"]).unwrap();
        table.push_row(vec![Cell::Int(7), "answer".into()]).unwrap();
        let selector = ColumnSelector::parse("name:2021").unwrap();
        assert_eq!(table.texts(&selector).unwrap(), vec!["answer".to_string()]);
    }

    #[test]
    fn test_with_results_rejects_non_objects() {
        let fields = vec!["favorite_fruits".to_string()];
        let err = survey()
            .with_results(&fields, vec![json!({}), json!("bananas")])
            .unwrap_err();
        assert!(matches!(err, CodingError::InvalidArgument { argument: "results", .. }));
        assert!(err.to_string().contains("row 1"));
    }

    #[test]
    fn test_from_records_fills_missing_keys() {
        let table = Table::from_records(vec![
            json!({"id": 1, "text": "a"}),
            json!({"text": "b", "wave": 2}),
        ])
        .unwrap();
        assert_eq!(table.columns(), ["id", "text", "wave"]);
        assert_eq!(table.rows()[1], vec![Cell::Null, "b".into(), Cell::Int(2)]);
        assert!(Table::from_records(vec![json!([1])]).is_err());
    }

    #[test]
    fn test_with_results_appends_columns() {
        let fields = vec!["favorite_fruits".to_string()];
        let merged = survey()
            .with_results(
                &fields,
                vec![json!({"favorite_fruits": "bananas"}), json!({})],
            )
            .unwrap();

        assert_eq!(merged.columns(), ["id", "text", "favorite_fruits"]);
        assert_eq!(merged.rows()[0][2], Cell::Text("bananas".to_string()));
        assert_eq!(merged.rows()[1][2], Cell::Null);
        assert_eq!(merged.to_records()[0]["favorite_fruits"], "bananas");
    }

    #[test]
    fn test_with_results_rejects_collisions() {
        let fields = vec!["text".to_string()];
        let err = survey()
            .with_results(&fields, vec![json!({}), json!({})])
            .unwrap_err();
        assert!(err.to_string().contains("collides"));
    }
}
