/*!
Chart Specification Compiler

Maps an [`Intent`] plus the final table's column set to the chart
specification consumed by renderers. This is the sole contract handed to
rendering:

```json
{
  "chart": {"type": "line|bar|pie|boxplot|violin", "title": "...", "statistics": {...}},
  "encoding": {
    "x": {"column": "...", "type": "temporal|nominal|quantitative"},
    "y": {"column": "..."},
    "color": {"column": "..."} | null,
    "tooltip": ["...", "..."]
  },
  "data": {"filters": [...]}
}
```

Dual-axis specs carry `y_left`/`y_right` instead of `y`. An intent missing
its chart type or x-axis compiles to an *incomplete* spec whose `encoding`
is `{}` - callers must treat that as "ask the user for more information",
never as render-ready.
*/

use serde::{Deserialize, Serialize};

use crate::parser::{ChartType, Filter, FilterOp, FilterValue, Intent, Statistics, YAxis};
use crate::schema::ColumnType;

/// Top-level chart specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub chart: ChartBlock,
    pub encoding: Encoding,
    pub data: DataBlock,
}

impl ChartSpec {
    /// Whether this spec can be handed to a renderer.
    pub fn is_render_ready(&self) -> bool {
        !matches!(self.encoding, Encoding::Incomplete {})
    }
}

/// The `chart` block: type, human-readable title, requested statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartBlock {
    #[serde(rename = "type")]
    pub chart_type: Option<ChartType>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<Statistics>,
}

/// The `data` block: filters that were applied to produce the table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataBlock {
    pub filters: Vec<Filter>,
}

/// Axis reference with a resolved axis type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisEncoding {
    pub column: String,
    #[serde(rename = "type")]
    pub axis_type: ColumnType,
}

/// A column reference: one column or an ordered list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnEncoding {
    pub column: Columns,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Columns {
    Many(Vec<String>),
    One(String),
}

impl ColumnEncoding {
    fn one(column: impl Into<String>) -> Self {
        Self {
            column: Columns::One(column.into()),
        }
    }

    fn many(columns: Vec<String>) -> Self {
        Self {
            column: Columns::Many(columns),
        }
    }
}

/// The encoding block. Single-axis and dual-axis are distinct shapes, and
/// an incomplete spec has no encoding at all (serialized as `{}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Encoding {
    Dual {
        x: AxisEncoding,
        y_left: ColumnEncoding,
        y_right: ColumnEncoding,
        color: Option<ColumnEncoding>,
        tooltip: Vec<String>,
    },
    Single {
        x: AxisEncoding,
        y: ColumnEncoding,
        color: Option<ColumnEncoding>,
        tooltip: Vec<String>,
    },
    Incomplete {},
}

/// Compile an intent against the final table's columns.
pub fn compile(intent: &Intent, final_columns: &[String]) -> ChartSpec {
    let statistics = (!intent.statistics.is_empty()).then(|| intent.statistics.clone());
    let data = DataBlock {
        filters: intent.filters.clone(),
    };

    // Normalize the x-axis against the merged table: a `day` axis becomes
    // `date` when only `date` survived the merge.
    let has = |name: &str| final_columns.iter().any(|c| c == name);
    let x_axis = match intent.x_axis.as_deref() {
        Some("day") if !has("day") && has("date") => Some("date".to_string()),
        other => other.map(|s| s.to_string()),
    };

    let (Some(chart_type), Some(x_axis)) = (intent.chart_type, x_axis) else {
        return ChartSpec {
            chart: ChartBlock {
                chart_type: intent.chart_type,
                title: "Value".to_string(),
                statistics,
            },
            encoding: Encoding::Incomplete {},
            data,
        };
    };

    let chart = ChartBlock {
        chart_type: Some(chart_type),
        title: build_title(intent),
        statistics: statistics.clone(),
    };

    // A color column that did not survive the merge is dropped, not
    // propagated into an invalid encoding.
    let color = intent
        .color
        .as_deref()
        .filter(|c| has(c))
        .map(ColumnEncoding::one);

    let encoding = match &intent.y_axis {
        Some(YAxis::Dual { left, right }) => {
            let mut tooltip = vec![x_axis.clone()];
            tooltip.extend(left.iter().cloned());
            tooltip.extend(right.iter().cloned());
            Encoding::Dual {
                x: AxisEncoding {
                    column: x_axis,
                    axis_type: ColumnType::Temporal,
                },
                y_left: ColumnEncoding::many(left.clone()),
                y_right: ColumnEncoding::many(right.clone()),
                color,
                tooltip,
            }
        }
        y_axis => {
            let metrics: Vec<String> = match y_axis {
                Some(YAxis::Single(m)) => vec![m.clone()],
                Some(YAxis::Multi(ms)) => ms.clone(),
                _ => Vec::new(),
            };

            let x = AxisEncoding {
                column: x_axis.clone(),
                axis_type: x_axis_type(chart_type),
            };

            // Aggregation rewrites the y reference to the aggregator's
            // output column, `{fn}_{metric}`.
            let first_agg = intent.statistics.aggregation.first();
            let y = match (first_agg, metrics.as_slice()) {
                (Some(agg), [metric, ..]) => ColumnEncoding::one(agg.column_name(metric)),
                (None, [metric]) => ColumnEncoding::one(metric.clone()),
                (None, ms) if ms.len() > 1 => ColumnEncoding::many(ms.to_vec()),
                _ => ColumnEncoding::one(String::new()),
            };

            let mut tooltip = vec![x_axis];
            match &y.column {
                Columns::One(c) => tooltip.push(c.clone()),
                Columns::Many(cs) => tooltip.extend(cs.iter().cloned()),
            }

            Encoding::Single {
                x,
                y,
                color,
                tooltip,
            }
        }
    };

    ChartSpec {
        chart,
        encoding,
        data,
    }
}

/// The x-axis type implied by a chart type.
fn x_axis_type(chart_type: ChartType) -> ColumnType {
    match chart_type {
        ChartType::Line => ColumnType::Temporal,
        ChartType::Bar | ChartType::Boxplot | ChartType::Violin | ChartType::Pie => {
            ColumnType::Nominal
        }
    }
}

/// Human-readable title: metric names, a chart-type suffix, and the applied
/// filters in parentheses.
pub fn build_title(intent: &Intent) -> String {
    let metrics = intent.metrics();
    let mut title = if metrics.is_empty() {
        "Value".to_string()
    } else {
        metrics
            .iter()
            .map(|m| human_case(m))
            .collect::<Vec<_>>()
            .join(", ")
    };

    match intent.chart_type {
        Some(ChartType::Line) => title.push_str(" Over Time"),
        Some(ChartType::Bar) => title.push_str(" by Category"),
        Some(ChartType::Boxplot) | Some(ChartType::Violin) => title.push_str(" Distribution"),
        _ => {}
    }

    if !intent.filters.is_empty() {
        let parts: Vec<String> = intent.filters.iter().map(render_filter).collect();
        title.push_str(&format!(" ({})", parts.join(", ")));
    }

    title
}

/// Render one filter for the title, with symbolic operators and
/// "between ... and ..." phrasing for date ranges.
fn render_filter(filter: &Filter) -> String {
    let column = human_case(&filter.column);
    match (&filter.operator, &filter.value) {
        (FilterOp::Range, FilterValue::Range(start, end)) => {
            format!("{} between {} and {}", column, date_part(start), date_part(end))
        }
        (op, value) => {
            let symbol = match op {
                FilterOp::Eq => "=",
                FilterOp::Ne => "≠",
                FilterOp::Ge => "≥",
                FilterOp::Le => "≤",
                FilterOp::Gt => ">",
                FilterOp::Lt => "<",
                FilterOp::Range => "between",
            };
            format!("{} {} {}", column, symbol, render_value(value))
        }
    }
}

fn render_value(value: &FilterValue) -> String {
    match value {
        FilterValue::Text(s) => {
            // Timestamps read better as bare dates
            if s.contains('T') {
                date_part(s).to_string()
            } else {
                s.clone()
            }
        }
        other => other.to_string(),
    }
}

fn date_part(timestamp: &str) -> &str {
    timestamp.split('T').next().unwrap_or(timestamp)
}

/// Underscores to spaces, Title Case.
pub fn human_case(name: &str) -> String {
    name.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
