//! Statistics over the merged table.
//!
//! When the intent requests aggregation, each requested metric × function
//! pair becomes a column named `{function}_{metric}` - either one row per
//! group (the x-axis is a nominal column) or a single overall row. Without
//! a request the merged table passes through unchanged.
//!
//! Aggregation functions are a closed enum; every [`AggFn`] maps to exactly
//! one polars expression. A metric that is not numeric aggregates to null
//! rather than failing.
//!
//! Demographic columns are preserved by taking the first observed value per
//! group. This is a deliberate simplification, not an invariant: it assumes
//! the group is homogeneous in those columns, which real data does not
//! guarantee. Callers must not read preserved demographics as group facts.

use polars::prelude::*;

use crate::parser::{AggFn, ChartType, Intent, YAxis};
use crate::schema::ColumnType;
use crate::vocab::Vocabulary;
use crate::Result;

impl AggFn {
    /// The polars expression computing this function over a metric column.
    fn expr(&self, metric: &str) -> Expr {
        let column = col(metric);
        let agg = match self {
            AggFn::Mean => column.mean(),
            AggFn::Median => column.median(),
            AggFn::Std => column.std(1),
            AggFn::Var => column.var(1),
            AggFn::Sum => column.sum(),
            AggFn::Count => column.count(),
        };
        agg.alias(self.column_name(metric))
    }
}

/// Result of the aggregation stage.
#[derive(Debug)]
pub struct Aggregated {
    pub table: DataFrame,
    /// Chart type after degeneracy handling. A one-row aggregate cannot be
    /// a line chart, so `line` silently becomes `bar`.
    pub chart_type: Option<ChartType>,
}

/// Aggregate the merged table per the intent, or pass it through unchanged.
pub fn aggregate(intent: &Intent, merged: &DataFrame, vocab: &Vocabulary) -> Result<Aggregated> {
    let aggs = &intent.statistics.aggregation;
    let metrics: Vec<String> = match &intent.y_axis {
        Some(YAxis::Single(m)) => vec![m.clone()],
        Some(YAxis::Multi(ms)) => ms.clone(),
        // Dual-axis requests plot raw aligned series
        Some(YAxis::Dual { .. }) | None => Vec::new(),
    };

    if aggs.is_empty() || metrics.is_empty() {
        return Ok(Aggregated {
            table: merged.clone(),
            chart_type: intent.chart_type,
        });
    }

    let mut exprs: Vec<Expr> = Vec::new();
    for metric in &metrics {
        let Ok(column) = merged.column(metric) else {
            continue;
        };
        let numeric = ColumnType::from_dtype(column.dtype()) == ColumnType::Quantitative;
        for agg in aggs {
            if numeric {
                exprs.push(agg.expr(metric));
            } else {
                // Aggregating a non-numeric metric yields null, not an error
                exprs.push(lit(NULL).alias(agg.column_name(metric)));
            }
        }
    }

    // Demographics ride along as the first observed value
    let group_col = intent.x_axis.as_deref().filter(|x| {
        merged
            .column(x)
            .map(|c| ColumnType::from_dtype(c.dtype()) == ColumnType::Nominal)
            .unwrap_or(false)
    });
    for column in &vocab.preserve_columns {
        if merged.column(column).is_ok() && group_col != Some(column.as_str()) {
            exprs.push(col(column.as_str()).first().alias(column.as_str()));
        }
    }

    let table = match group_col {
        Some(x) => merged
            .clone()
            .lazy()
            .group_by_stable([col(x)])
            .agg(exprs)
            .collect()?,
        None => merged.clone().lazy().select(exprs).collect()?,
    };

    // Degeneracy rule: a one-point line chart is meaningless
    let chart_type = match intent.chart_type {
        Some(ChartType::Line) if table.height() == 1 => {
            tracing::debug!("single-row aggregate: line downgraded to bar");
            Some(ChartType::Bar)
        }
        other => other,
    };

    Ok(Aggregated { table, chart_type })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Statistics;

    fn merged() -> DataFrame {
        df!(
            "patient_id" => [1i64, 1, 2, 2, 3],
            "glucose_level" => [100.0f64, 110.0, 90.0, 94.0, 120.0],
            "age_group" => ["adult", "adult", "senior", "senior", "adult"],
            "gender" => ["male", "male", "female", "female", "male"],
        )
        .unwrap()
    }

    fn intent(aggs: Vec<AggFn>, x: &str) -> Intent {
        Intent {
            chart_type: Some(ChartType::Bar),
            x_axis: Some(x.to_string()),
            y_axis: Some(YAxis::Single("glucose_level".to_string())),
            statistics: Statistics {
                aggregation: aggs,
                confidence_interval: None,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_pass_through_without_request() {
        let intent = Intent {
            y_axis: Some(YAxis::Single("glucose_level".to_string())),
            ..Default::default()
        };
        let out = aggregate(&intent, &merged(), &Vocabulary::clinical()).unwrap();
        assert_eq!(out.table.height(), merged().height());
    }

    #[test]
    fn test_grouped_mean_one_row_per_group() {
        let out = aggregate(
            &intent(vec![AggFn::Mean], "age_group"),
            &merged(),
            &Vocabulary::clinical(),
        )
        .unwrap();

        assert_eq!(out.table.height(), 2);
        let means: Vec<f64> = out
            .table
            .column("mean_glucose_level")
            .unwrap()
            .f64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        // Stable grouping: adult first (100, 110, 120), then senior (90, 94)
        assert_eq!(means, vec![110.0, 92.0]);
        // Demographics preserved by first value
        let genders: Vec<&str> = out
            .table
            .column("gender")
            .unwrap()
            .str()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(genders, vec!["male", "female"]);
    }

    #[test]
    fn test_multiple_functions_name_columns() {
        let out = aggregate(
            &intent(vec![AggFn::Mean, AggFn::Std], "age_group"),
            &merged(),
            &Vocabulary::clinical(),
        )
        .unwrap();
        assert!(out.table.column("mean_glucose_level").is_ok());
        assert!(out.table.column("std_glucose_level").is_ok());
    }

    #[test]
    fn test_ungrouped_single_row() {
        // Temporal-or-absent x-axis means one overall row
        let mut intent = intent(vec![AggFn::Mean], "age_group");
        intent.x_axis = None;
        let out = aggregate(&intent, &merged(), &Vocabulary::clinical()).unwrap();
        assert_eq!(out.table.height(), 1);
        let mean = out
            .table
            .column("mean_glucose_level")
            .unwrap()
            .f64()
            .unwrap()
            .get(0)
            .unwrap();
        assert!((mean - 102.8).abs() < 1e-9);
    }

    #[test]
    fn test_degeneracy_line_to_bar() {
        let mut intent = intent(vec![AggFn::Mean], "age_group");
        intent.x_axis = None;
        intent.chart_type = Some(ChartType::Line);
        let out = aggregate(&intent, &merged(), &Vocabulary::clinical()).unwrap();
        assert_eq!(out.table.height(), 1);
        assert_eq!(out.chart_type, Some(ChartType::Bar));
    }

    #[test]
    fn test_multi_row_line_not_downgraded() {
        let mut intent = intent(vec![AggFn::Mean], "age_group");
        intent.chart_type = Some(ChartType::Line);
        let out = aggregate(&intent, &merged(), &Vocabulary::clinical()).unwrap();
        assert_eq!(out.chart_type, Some(ChartType::Line));
    }

    #[test]
    fn test_non_numeric_metric_yields_null() {
        let intent = Intent {
            x_axis: Some("age_group".to_string()),
            y_axis: Some(YAxis::Single("gender".to_string())),
            statistics: Statistics {
                aggregation: vec![AggFn::Mean],
                confidence_interval: None,
            },
            ..Default::default()
        };
        let out = aggregate(&intent, &merged(), &Vocabulary::clinical()).unwrap();
        let column = out.table.column("mean_gender").unwrap();
        assert_eq!(column.null_count(), column.len());
    }
}
