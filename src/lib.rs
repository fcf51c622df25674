/*!
# clinviz - Natural-Language Clinical Charting

clinviz turns a short natural-language request about clinical tables into a
validated, renderable chart specification.

## Example

```text
mean glucose by age group
```

against a labs table with a quantitative `glucose_level` column and a nominal
`age_group` column becomes

```json
{
  "chart": {"type": "bar", "title": "Glucose Level by Category", "statistics": {"aggregation": ["mean"]}},
  "encoding": {
    "x": {"column": "age_group", "type": "nominal"},
    "y": {"column": "mean_glucose_level"},
    "color": null,
    "tooltip": ["age_group", "mean_glucose_level"]
  },
  "data": {"filters": []}
}
```

## Architecture

A request flows through a straight chain of stages, each fully consuming its
input before producing output:

- **schema** detection → column types (quantitative / temporal / nominal)
- **parser** → structured [`Intent`] extracted from free text (never fails;
  unresolved fields stay unset)
- **merge** planning and execution → one safely combined table, with hard
  failures on any row-explosion risk
- **aggregate** → grouped or scalar statistics tables named `{fn}_{metric}`
- **spec** compilation → the [`ChartSpec`] contract handed to renderers

## Core Components

- [`parser`] - Rule-ordered intent extraction against a column vocabulary
- [`merge`] - Cross-table merge planning and safe execution
- [`aggregate`] - Statistics computation over the merged table
- [`spec`] - Chart specification types and compilation
- [`pipeline`] - End-to-end request orchestration
*/

pub mod aggregate;
pub mod merge;
pub mod parser;
pub mod pipeline;
pub mod reader;
pub mod schema;
pub mod spec;
pub mod validate;
pub mod vocab;

// Re-export key types for convenience
pub use parser::{AggFn, ChartType, Filter, FilterOp, FilterValue, Intent, Statistics, YAxis};
pub use pipeline::Outcome;
pub use schema::{ColumnInfo, ColumnType, SchemaSet, TableSchema};
pub use spec::ChartSpec;
pub use vocab::Vocabulary;

// DataFrame abstraction (wraps Polars)
pub use polars::prelude::DataFrame;

/// Main library error type
#[derive(thiserror::Error, Debug)]
pub enum ClinvizError {
    #[error("Schema error: {0}")]
    SchemaError(String),

    #[error("Merge safety violation: {0}")]
    MergeSafetyError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Data source error: {0}")]
    ReaderError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<polars::prelude::PolarsError> for ClinvizError {
    fn from(e: polars::prelude::PolarsError) -> Self {
        ClinvizError::InternalError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClinvizError>;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
