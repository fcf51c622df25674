//! Typed intent structures produced by the parser.
//!
//! The intent is the contract between the parser and the rest of the
//! pipeline. It is deliberately explicit about what could not be resolved:
//! `chart_type`, `x_axis` and `y_axis` stay `None` rather than being
//! guessed, and the spec compiler degrades gracefully when they are unset.
//!
//! # Structure
//!
//! ```text
//! Intent
//! ├─ chart_type: Option<ChartType>      (unset = unresolved)
//! ├─ x_axis: Option<String>
//! ├─ y_axis: Option<YAxis>              (single / multi / dual, mutually exclusive)
//! ├─ color: Option<String>              (grouping / series-splitting column)
//! ├─ filters: Vec<Filter>               (conflict-checked at insertion)
//! ├─ statistics: Statistics             (aggregations + confidence interval)
//! ├─ mentioned_columns: Vec<String>     (deduplicated, first-seen order)
//! └─ ambiguous: bool                    (ambiguity guard fired; no defaulting)
//! ```

use serde::{Deserialize, Serialize};

/// Supported chart types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Line,
    Bar,
    Pie,
    Boxplot,
    Violin,
}

impl std::fmt::Display for ChartType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChartType::Line => "line",
            ChartType::Bar => "bar",
            ChartType::Pie => "pie",
            ChartType::Boxplot => "boxplot",
            ChartType::Violin => "violin",
        };
        write!(f, "{}", s)
    }
}

/// Aggregation functions. A closed set: every variant has exactly one
/// implementation in the aggregator, so there is no name-based dispatch
/// and no per-call fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggFn {
    Mean,
    Median,
    Std,
    Var,
    Sum,
    Count,
}

impl AggFn {
    /// Column name for an aggregated metric, e.g. `mean_glucose_level`.
    pub fn column_name(&self, metric: &str) -> String {
        format!("{}_{}", self, metric)
    }
}

impl std::fmt::Display for AggFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AggFn::Mean => "mean",
            AggFn::Median => "median",
            AggFn::Std => "std",
            AggFn::Var => "var",
            AggFn::Sum => "sum",
            AggFn::Count => "count",
        };
        write!(f, "{}", s)
    }
}

/// Filter comparison operators, with their wire names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "range")]
    Range,
}

impl std::fmt::Display for FilterOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FilterOp::Eq => "==",
            FilterOp::Ne => "!=",
            FilterOp::Gt => ">",
            FilterOp::Ge => ">=",
            FilterOp::Lt => "<",
            FilterOp::Le => "<=",
            FilterOp::Range => "range",
        };
        write!(f, "{}", s)
    }
}

/// Filter values: a scalar for comparison operators, an ordered pair of ISO
/// timestamps for `range`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Bool(bool),
    Number(f64),
    Range(String, String),
    Text(String),
}

impl std::fmt::Display for FilterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterValue::Bool(b) => write!(f, "{}", b),
            FilterValue::Number(n) => write!(f, "{}", n),
            FilterValue::Range(start, end) => write!(f, "[{}, {}]", start, end),
            FilterValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// A single filter condition on the merged table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub column: String,
    pub operator: FilterOp,
    pub value: FilterValue,
}

impl Filter {
    pub fn new(column: impl Into<String>, operator: FilterOp, value: FilterValue) -> Self {
        Self {
            column: column.into(),
            operator,
            value,
        }
    }
}

/// Requested statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub aggregation: Vec<AggFn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_interval: Option<f64>,
}

impl Statistics {
    pub fn is_empty(&self) -> bool {
        self.aggregation.is_empty() && self.confidence_interval.is_none()
    }
}

/// The y-axis of a request. The three shapes are mutually exclusive by
/// construction: a request is single-metric, multi-metric on one shared
/// axis, or split across two independently scaled axes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum YAxis {
    Dual {
        left: Vec<String>,
        right: Vec<String>,
    },
    Multi(Vec<String>),
    Single(String),
}

impl YAxis {
    /// All metrics in order: single, multi, or left-then-right.
    pub fn metrics(&self) -> Vec<&str> {
        match self {
            YAxis::Single(m) => vec![m.as_str()],
            YAxis::Multi(ms) => ms.iter().map(String::as_str).collect(),
            YAxis::Dual { left, right } => left
                .iter()
                .chain(right.iter())
                .map(String::as_str)
                .collect(),
        }
    }

    pub fn is_dual(&self) -> bool {
        matches!(self, YAxis::Dual { .. })
    }
}

/// The parsed meaning of one user query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub chart_type: Option<ChartType>,
    pub x_axis: Option<String>,
    pub y_axis: Option<YAxis>,
    pub color: Option<String>,
    pub filters: Vec<Filter>,
    pub statistics: Statistics,
    pub mentioned_columns: Vec<String>,
    /// The ambiguity guard fired: axes were reset and defaulting suppressed.
    #[serde(default)]
    pub ambiguous: bool,
}

impl Intent {
    /// Whether the required fields for compiling a renderable spec are set.
    /// `chart_type` and `x_axis` are either both set or the intent is
    /// incomplete and the caller must ask for clarification.
    pub fn is_complete(&self) -> bool {
        self.chart_type.is_some() && self.x_axis.is_some()
    }

    /// Metrics of the y-axis, empty when unset.
    pub fn metrics(&self) -> Vec<&str> {
        self.y_axis.as_ref().map(YAxis::metrics).unwrap_or_default()
    }

    /// Columns referenced by filters, first-seen order, deduplicated.
    pub fn filter_columns(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for f in &self.filters {
            if !out.contains(&f.column.as_str()) {
                out.push(&f.column);
            }
        }
        out
    }

    /// Record a referenced column, keeping first-seen order.
    pub fn mention(&mut self, column: &str) {
        if !self.mentioned_columns.iter().any(|c| c == column) {
            self.mentioned_columns.push(column.to_string());
        }
    }
}
