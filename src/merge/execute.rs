//! Merge plan execution.
//!
//! The executor never trades safety for convenience: a join whose right side
//! is not unique on the key, or whose result grows past the primary table,
//! is a hard failure. Silent row duplication would corrupt every aggregate
//! and chart downstream.
//!
//! Inputs are never mutated; every mode returns a new table.

use polars::prelude::*;

use crate::parser::{Filter, FilterOp, FilterValue};
use crate::vocab::Vocabulary;
use crate::{ClinvizError, Result};

use super::MergePlan;

/// Execute a merge plan against the loaded tables.
pub fn execute(
    plan: &MergePlan,
    tables: &[(String, DataFrame)],
    vocab: &Vocabulary,
) -> Result<DataFrame> {
    match plan {
        MergePlan::Merge {
            primary,
            joins,
            filters,
        } => {
            let mut merged = coerce_bool_like(lookup(tables, primary)?.clone())?;
            for join in joins {
                let right = coerce_bool_like(lookup(tables, &join.table)?.clone())?;
                merged = safe_inner_join(&merged, &right, &join.join_key)?;
            }
            apply_filters(merged, filters)
        }

        MergePlan::FilterThenPlot {
            filter_table,
            metric_table,
            join_key,
            filters,
        } => {
            let filter_df = coerce_bool_like(lookup(tables, filter_table)?.clone())?;
            require_column(&filter_df, join_key)?;
            let allowed = apply_filters(filter_df, filters)?;

            let metric_df = coerce_bool_like(lookup(tables, metric_table)?.clone())?;
            require_column(&metric_df, join_key)?;

            // Semi join: subset the metric table to allowed identifiers
            // without pulling any filter-table columns across the grain
            // boundary.
            let out = metric_df
                .lazy()
                .join(
                    allowed.lazy().select([col(join_key.as_str())]),
                    [col(join_key.as_str())],
                    [col(join_key.as_str())],
                    JoinArgs::new(JoinType::Semi),
                )
                .collect()?;
            Ok(out)
        }

        MergePlan::DualAxisAlign {
            left_table,
            right_table,
            left_metric,
            right_metric,
            left_time_col,
            right_time_col,
            group_key,
            filters,
        } => {
            let left = coerce_bool_like(lookup(tables, left_table)?.clone())?;
            let right = coerce_bool_like(lookup(tables, right_table)?.clone())?;
            let left = apply_matching_filters(left, filters)?;
            let right = apply_matching_filters(right, filters)?;
            align_dual_axis(
                &left,
                &right,
                left_time_col,
                right_time_col,
                group_key,
                left_metric,
                right_metric,
                &vocab.preserve_columns,
            )
        }
    }
}

/// Inner join with the row-explosion guard.
///
/// The left side may repeat the key (time series); the right side must be
/// unique on it. After the join the row count may never exceed the left
/// side's.
pub fn safe_inner_join(left: &DataFrame, right: &DataFrame, key: &str) -> Result<DataFrame> {
    require_column(left, key)?;
    require_column(right, key)?;

    let unique_keys = right
        .column(key)?
        .as_materialized_series()
        .n_unique()?;
    if unique_keys != right.height() {
        return Err(ClinvizError::MergeSafetyError(format!(
            "right side has duplicate '{}' values ({} rows, {} distinct) - unsafe to merge",
            key,
            right.height(),
            unique_keys
        )));
    }

    let joined = left
        .clone()
        .lazy()
        .join(
            right.clone().lazy(),
            [col(key)],
            [col(key)],
            JoinArgs::new(JoinType::Inner),
        )
        .collect()?;

    if joined.height() > left.height() {
        return Err(ClinvizError::MergeSafetyError(format!(
            "join grew the result to {} rows from {} in the primary table",
            joined.height(),
            left.height()
        )));
    }

    Ok(joined)
}

/// Apply filters sequentially (logical AND). Every filter column must exist.
pub fn apply_filters(df: DataFrame, filters: &[Filter]) -> Result<DataFrame> {
    let mut out = df;
    for filter in filters {
        require_column(&out, &filter.column)?;
        let predicate = filter_expr(&out, filter)?;
        out = out.lazy().filter(predicate).collect()?;
    }
    Ok(out)
}

/// Apply only the filters whose column exists in this table. Used by
/// dual-axis alignment, where each side carries its own columns.
fn apply_matching_filters(df: DataFrame, filters: &[Filter]) -> Result<DataFrame> {
    let mut out = df;
    for filter in filters {
        if out.column(&filter.column).is_err() {
            continue;
        }
        let predicate = filter_expr(&out, filter)?;
        out = out.lazy().filter(predicate).collect()?;
    }
    Ok(out)
}

/// Nearest-timestamp alignment of two independently sampled series, per
/// group. Keeps the group key, the left time column, both metrics, and the
/// demographic columns either side carries.
#[allow(clippy::too_many_arguments)]
fn align_dual_axis(
    left: &DataFrame,
    right: &DataFrame,
    left_time_col: &str,
    right_time_col: &str,
    group_key: &str,
    left_metric: &str,
    right_metric: &str,
    preserve: &[String],
) -> Result<DataFrame> {
    for (df, column) in [
        (left, group_key),
        (left, left_time_col),
        (left, left_metric),
        (right, group_key),
        (right, right_time_col),
        (right, right_metric),
    ] {
        require_column(df, column)?;
    }

    let has = |df: &DataFrame, name: &str| df.column(name).is_ok();

    let mut left_cols: Vec<String> = vec![
        group_key.to_string(),
        left_time_col.to_string(),
        left_metric.to_string(),
    ];
    for column in preserve {
        if has(left, column) {
            left_cols.push(column.clone());
        }
    }

    let mut right_cols: Vec<String> = vec![
        group_key.to_string(),
        right_time_col.to_string(),
        right_metric.to_string(),
    ];
    for column in preserve {
        if has(right, column) && !left_cols.contains(column) {
            right_cols.push(column.clone());
        }
    }

    // As-of joins need both sides sorted on the time key.
    let left_sub = left
        .select(left_cols.clone())?
        .sort([left_time_col], Default::default())?;
    let right_sub = right
        .select(right_cols)?
        .sort([right_time_col], Default::default())?;

    let aligned = left_sub
        .lazy()
        .join_builder()
        .with(right_sub.lazy())
        .left_on([col(left_time_col)])
        .right_on([col(right_time_col)])
        .how(JoinType::AsOf(Box::new(AsOfOptions {
            strategy: AsofStrategy::Nearest,
            left_by: Some(vec![group_key.into()]),
            right_by: Some(vec![group_key.into()]),
            ..Default::default()
        })))
        .finish()
        .collect()?;

    let mut keep: Vec<String> = vec![
        group_key.to_string(),
        left_time_col.to_string(),
        left_metric.to_string(),
        right_metric.to_string(),
    ];
    for column in preserve {
        if has(&aligned, column) && !keep.contains(column) {
            keep.push(column.clone());
        }
    }
    Ok(aligned.select(keep)?)
}

/// Replace string columns holding only "true"/"false" with real booleans so
/// equality filters behave.
pub fn coerce_bool_like(df: DataFrame) -> Result<DataFrame> {
    let mut bool_like: Vec<String> = Vec::new();
    for column in df.get_columns() {
        if !matches!(column.dtype(), DataType::String) {
            continue;
        }
        let ca = column.as_materialized_series().str()?.clone();
        let mut any = false;
        let mut all = true;
        for value in ca.into_iter().flatten() {
            any = true;
            if !value.eq_ignore_ascii_case("true") && !value.eq_ignore_ascii_case("false") {
                all = false;
                break;
            }
        }
        if any && all {
            bool_like.push(column.name().to_string());
        }
    }

    let mut out = df.lazy();
    for name in &bool_like {
        out = out.with_column(
            col(name.as_str())
                .str()
                .to_lowercase()
                .eq(lit("true"))
                .alias(name.as_str()),
        );
    }
    Ok(out.collect()?)
}

/// Build the polars predicate for one filter, coercing the value to the
/// column's dtype. Text values against boolean columns read as `true`
/// unless they spell "false", so `smoker == "smoker"` selects smokers.
fn filter_expr(df: &DataFrame, filter: &Filter) -> Result<Expr> {
    let dtype = df.column(&filter.column)?.dtype().clone();
    let column = col(filter.column.as_str());

    let scalar = |value: &FilterValue| -> Result<Expr> {
        match value {
            FilterValue::Number(n) => Ok(lit(*n)),
            FilterValue::Bool(b) => Ok(lit(*b)),
            FilterValue::Text(s) => match dtype {
                DataType::Boolean => Ok(lit(!s.eq_ignore_ascii_case("false"))),
                DataType::Date | DataType::Datetime(_, _) => temporal_lit(s),
                _ => Ok(lit(s.clone())),
            },
            FilterValue::Range(_, _) => Err(ClinvizError::ValidationError(format!(
                "range value used with comparison operator on '{}'",
                filter.column
            ))),
        }
    };

    let expr = match filter.operator {
        FilterOp::Eq => column.eq(scalar(&filter.value)?),
        FilterOp::Ne => column.neq(scalar(&filter.value)?),
        FilterOp::Gt => column.gt(scalar(&filter.value)?),
        FilterOp::Ge => column.gt_eq(scalar(&filter.value)?),
        FilterOp::Lt => column.lt(scalar(&filter.value)?),
        FilterOp::Le => column.lt_eq(scalar(&filter.value)?),
        FilterOp::Range => {
            let FilterValue::Range(start, end) = &filter.value else {
                return Err(ClinvizError::ValidationError(format!(
                    "range operator on '{}' requires a two-timestamp value",
                    filter.column
                )));
            };
            let (start, end) = match dtype {
                DataType::Date | DataType::Datetime(_, _) => {
                    (temporal_lit(start)?, temporal_lit(end)?)
                }
                _ => (lit(start.clone()), lit(end.clone())),
            };
            return Ok(column.clone().gt_eq(start).and(column.lt_eq(end)));
        }
    };
    Ok(expr)
}

/// Parse an ISO timestamp (with or without a time part) into a literal.
fn temporal_lit(value: &str) -> Result<Expr> {
    let parsed = chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| {
            chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .map(|d| d.and_hms_opt(0, 0, 0).expect("midnight"))
        })
        .map_err(|_| {
            ClinvizError::ValidationError(format!("'{}' is not an ISO timestamp", value))
        })?;
    Ok(lit(parsed))
}

fn lookup<'a>(tables: &'a [(String, DataFrame)], name: &str) -> Result<&'a DataFrame> {
    tables
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, df)| df)
        .ok_or_else(|| ClinvizError::SchemaError(format!("unknown table '{}'", name)))
}

fn require_column(df: &DataFrame, name: &str) -> Result<()> {
    if df.column(name).is_err() {
        return Err(ClinvizError::SchemaError(format!(
            "column '{}' does not exist in the table",
            name
        )));
    }
    Ok(())
}
