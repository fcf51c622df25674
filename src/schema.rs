//! Column type detection for input tables.
//!
//! Every column of every loaded table is classified into exactly one of
//! three chart-facing types: numeric dtypes are quantitative, date/time
//! dtypes are temporal, everything else is nominal. Detection is a total
//! function: unknown dtypes default to nominal rather than failing.
//!
//! Schemas are ordered. Several parser rules ("first quantitative column",
//! "first available temporal column") depend on column order, so a schema is
//! a `Vec<ColumnInfo>` rather than a map.

use polars::prelude::{DataFrame, DataType};
use serde::{Deserialize, Serialize};

/// Chart-facing type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Quantitative,
    Temporal,
    Nominal,
}

impl ColumnType {
    /// Classify a polars dtype.
    pub fn from_dtype(dtype: &DataType) -> Self {
        if dtype.is_primitive_numeric() {
            ColumnType::Quantitative
        } else if matches!(
            dtype,
            DataType::Date | DataType::Datetime(_, _) | DataType::Time
        ) {
            ColumnType::Temporal
        } else {
            ColumnType::Nominal
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ColumnType::Quantitative => "quantitative",
            ColumnType::Temporal => "temporal",
            ColumnType::Nominal => "nominal",
        };
        write!(f, "{}", s)
    }
}

/// A column with its detected type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub column_type: ColumnType,
}

/// Ordered schema of a single table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableSchema {
    columns: Vec<ColumnInfo>,
}

impl TableSchema {
    pub fn new(columns: Vec<ColumnInfo>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.column_type)
    }

    /// Temporal columns of this table, in schema order.
    pub fn temporal_columns(&self) -> impl Iterator<Item = &ColumnInfo> {
        self.columns
            .iter()
            .filter(|c| c.column_type == ColumnType::Temporal)
    }
}

/// Classify each column of a table.
pub fn detect_schema(df: &DataFrame) -> TableSchema {
    let columns = df
        .get_columns()
        .iter()
        .map(|col| ColumnInfo {
            name: col.name().to_string(),
            column_type: ColumnType::from_dtype(col.dtype()),
        })
        .collect();
    TableSchema::new(columns)
}

/// Schemas of every loaded table, in load order, plus the combined column
/// view used by the parser. Built once per request; immutable afterwards.
#[derive(Debug, Clone, Default)]
pub struct SchemaSet {
    tables: Vec<(String, TableSchema)>,
}

impl SchemaSet {
    /// Detect schemas for a set of named tables.
    pub fn detect(tables: &[(String, DataFrame)]) -> Self {
        Self {
            tables: tables
                .iter()
                .map(|(name, df)| (name.clone(), detect_schema(df)))
                .collect(),
        }
    }

    pub fn from_schemas(tables: Vec<(String, TableSchema)>) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> impl Iterator<Item = (&str, &TableSchema)> {
        self.tables.iter().map(|(n, s)| (n.as_str(), s))
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s)
    }

    /// All columns across all tables, first occurrence wins, table order
    /// preserved.
    pub fn columns(&self) -> Vec<ColumnInfo> {
        let mut seen = Vec::new();
        let mut out: Vec<ColumnInfo> = Vec::new();
        for (_, schema) in &self.tables {
            for col in schema.columns() {
                if !seen.contains(&col.name) {
                    seen.push(col.name.clone());
                    out.push(col.clone());
                }
            }
        }
        out
    }

    /// Type of a column, first owning table wins.
    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.tables
            .iter()
            .find_map(|(_, schema)| schema.column_type(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.column_type(name).is_some()
    }

    /// Tables owning a column, in table order.
    pub fn owners(&self, column: &str) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|(_, schema)| schema.contains(column))
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn labs() -> DataFrame {
        df!(
            "patient_id" => [1i64, 2, 3],
            "glucose_level" => [98.5f64, 104.2, 91.0],
            "age_group" => ["adult", "senior", "adult"],
        )
        .unwrap()
    }

    #[test]
    fn test_detect_schema_types() {
        let mut frame = labs();
        let dates = Column::new(
            "date".into(),
            [
                chrono::NaiveDate::from_ymd_opt(2025, 3, 13).unwrap(),
                chrono::NaiveDate::from_ymd_opt(2025, 6, 12).unwrap(),
                chrono::NaiveDate::from_ymd_opt(2025, 9, 15).unwrap(),
            ],
        );
        frame.with_column(dates).unwrap();

        let schema = detect_schema(&frame);
        assert_eq!(
            schema.column_type("patient_id"),
            Some(ColumnType::Quantitative)
        );
        assert_eq!(
            schema.column_type("glucose_level"),
            Some(ColumnType::Quantitative)
        );
        assert_eq!(schema.column_type("age_group"), Some(ColumnType::Nominal));
        assert_eq!(schema.column_type("date"), Some(ColumnType::Temporal));
        assert_eq!(schema.column_type("missing"), None);
    }

    #[test]
    fn test_boolean_is_nominal() {
        let frame = df!("smoker" => [true, false]).unwrap();
        let schema = detect_schema(&frame);
        assert_eq!(schema.column_type("smoker"), Some(ColumnType::Nominal));
    }

    #[test]
    fn test_schema_set_ownership() {
        let labs_schema = detect_schema(&labs());
        let vitals_schema = detect_schema(
            &df!(
                "patient_id" => [1i64, 2],
                "heart_rate" => [72.0f64, 80.5],
            )
            .unwrap(),
        );
        let set = SchemaSet::from_schemas(vec![
            ("labs".to_string(), labs_schema),
            ("vitals".to_string(), vitals_schema),
        ]);

        assert_eq!(set.owners("glucose_level"), vec!["labs"]);
        assert_eq!(set.owners("heart_rate"), vec!["vitals"]);
        assert_eq!(set.owners("patient_id"), vec!["labs", "vitals"]);
        assert!(set.owners("unknown").is_empty());

        // Combined view keeps first occurrence and table order
        let combined = set.columns();
        let names: Vec<&str> = combined.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["patient_id", "glucose_level", "age_group", "heart_rate"]
        );
    }
}
