/*!
Merge Planning Module

Decides how the tables needed by an [`Intent`] should be combined, then
executes that decision safely.

## Modes

The planner emits one of three tagged plans:

- [`MergePlan::Merge`] - a plain inner join onto a primary table, used when
  the mentioned columns can be brought together on the identifier key.
- [`MergePlan::FilterThenPlot`] - used when the filter columns and the
  plotted columns live in different tables with incompatible grain. Joining
  a one-row-per-patient filter table onto a many-rows-per-patient metric
  table just to filter would invite row explosion; instead the filters run
  on their own table to produce an allowed-identifier set, and the metric
  table is subset to those identifiers.
- [`MergePlan::DualAxisAlign`] - used when the two sides of a dual-axis
  request live in different tables with independent sampling schedules. The
  sides are aligned by nearest timestamp per group rather than joined on
  exact keys.

Plans are computed fresh per request from the intent and schemas and are
never persisted. Execution guarantees are in [`execute`].
*/

pub mod execute;

pub use execute::execute;

use serde::{Deserialize, Serialize};

use crate::parser::{Filter, Intent, YAxis};
use crate::schema::{ColumnType, SchemaSet};
use crate::vocab::Vocabulary;
use crate::{ClinvizError, Result};

/// One join in a [`MergePlan::Merge`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    pub table: String,
    pub join_key: String,
}

/// How to combine the source tables for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum MergePlan {
    Merge {
        primary: String,
        joins: Vec<Join>,
        filters: Vec<Filter>,
    },
    FilterThenPlot {
        filter_table: String,
        metric_table: String,
        join_key: String,
        filters: Vec<Filter>,
    },
    DualAxisAlign {
        left_table: String,
        right_table: String,
        left_metric: String,
        right_metric: String,
        left_time_col: String,
        right_time_col: String,
        group_key: String,
        filters: Vec<Filter>,
    },
}

/// Build a merge plan from the parsed intent and the table schemas.
pub fn plan(intent: &Intent, schemas: &SchemaSet, vocab: &Vocabulary) -> Result<MergePlan> {
    // Every mentioned column must have an owning table.
    for column in &intent.mentioned_columns {
        if schemas.owners(column).is_empty() {
            return Err(ClinvizError::SchemaError(format!(
                "column '{}' does not exist in any loaded table",
                column
            )));
        }
    }

    let filters = intent.filters.clone();

    // Filter-then-plot: filter columns and plotted columns live in disjoint
    // table sets.
    let filter_cols = intent.filter_columns();
    let metric_cols: Vec<&String> = intent
        .mentioned_columns
        .iter()
        .filter(|c| !filter_cols.contains(&c.as_str()))
        .collect();

    let filter_tables = owning_tables(schemas, filter_cols.iter().copied());
    let metric_tables = owning_tables(schemas, metric_cols.iter().map(|c| c.as_str()));

    let disjoint = !filter_tables.is_empty()
        && !metric_tables.is_empty()
        && filter_tables.iter().all(|t| !metric_tables.contains(t));
    if disjoint {
        let plan = MergePlan::FilterThenPlot {
            filter_table: filter_tables[0].clone(),
            metric_table: metric_tables[0].clone(),
            join_key: vocab.join_key.clone(),
            filters,
        };
        tracing::debug!(?plan, "filter-then-plot mode");
        return Ok(plan);
    }

    // Dual-axis alignment: the two sides live in different tables.
    if let Some(YAxis::Dual { left, right }) = &intent.y_axis {
        let (Some(left_metric), Some(right_metric)) = (left.first(), right.first()) else {
            return Err(ClinvizError::SchemaError(
                "dual-axis intent with an empty side".to_string(),
            ));
        };
        let left_owners = schemas.owners(left_metric);
        let right_owners = schemas.owners(right_metric);
        let (Some(left_table), Some(right_table)) = (left_owners.first(), right_owners.first())
        else {
            return Err(ClinvizError::SchemaError(format!(
                "dual-axis metrics '{}'/'{}' are missing from the loaded tables",
                left_metric, right_metric
            )));
        };
        if left_table != right_table {
            let plan = MergePlan::DualAxisAlign {
                left_table: left_table.to_string(),
                right_table: right_table.to_string(),
                left_metric: left_metric.clone(),
                right_metric: right_metric.clone(),
                left_time_col: time_column(schemas, left_table)?,
                right_time_col: time_column(schemas, right_table)?,
                group_key: vocab.join_key.clone(),
                filters,
            };
            tracing::debug!(?plan, "dual-axis alignment mode");
            return Ok(plan);
        }
    }

    // Plain merge: primary is the table holding all mentioned columns, or
    // the owner of the first mentioned column as a deterministic fallback.
    let primary = schemas
        .tables()
        .find(|(_, schema)| {
            intent
                .mentioned_columns
                .iter()
                .all(|c| schema.contains(c))
        })
        .map(|(name, _)| name.to_string())
        .or_else(|| {
            intent
                .mentioned_columns
                .first()
                .and_then(|c| schemas.owners(c).first().map(|t| t.to_string()))
        })
        .or_else(|| schemas.tables().next().map(|(name, _)| name.to_string()))
        .ok_or_else(|| ClinvizError::SchemaError("no tables loaded".to_string()))?;

    let primary_schema = schemas
        .table(&primary)
        .expect("primary chosen from the schema set");

    let mut joins: Vec<Join> = Vec::new();
    for column in &intent.mentioned_columns {
        if primary_schema.contains(column) {
            continue;
        }
        for owner in schemas.owners(column) {
            if owner != primary && !joins.iter().any(|j| j.table == owner) {
                joins.push(Join {
                    table: owner.to_string(),
                    join_key: vocab.join_key.clone(),
                });
            }
        }
    }

    let plan = MergePlan::Merge {
        primary,
        joins,
        filters,
    };
    tracing::debug!(?plan, "merge mode");
    Ok(plan)
}

/// Tables owning at least one of the given columns, in table order.
fn owning_tables<'a>(schemas: &SchemaSet, columns: impl Iterator<Item = &'a str>) -> Vec<String> {
    let columns: Vec<&str> = columns.collect();
    schemas
        .tables()
        .filter(|(_, schema)| columns.iter().any(|c| schema.contains(c)))
        .map(|(name, _)| name.to_string())
        .collect()
}

/// The time column used to align one side of a dual-axis request,
/// preferring `date` over `day` over any other temporal column.
fn time_column(schemas: &SchemaSet, table: &str) -> Result<String> {
    let schema = schemas
        .table(table)
        .ok_or_else(|| ClinvizError::SchemaError(format!("unknown table '{}'", table)))?;
    for preferred in ["date", "day"] {
        if schema.column_type(preferred) == Some(ColumnType::Temporal) {
            return Ok(preferred.to_string());
        }
    }
    schema
        .temporal_columns()
        .next()
        .map(|c| c.name.clone())
        .ok_or_else(|| {
            ClinvizError::SchemaError(format!(
                "table '{}' has no temporal column to align on",
                table
            ))
        })
}
