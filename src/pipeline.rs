//! End-to-end request orchestration.
//!
//! One request is a straight synchronous chain: detect schemas, parse,
//! plan, merge, aggregate, compile, validate. Each stage fully consumes its
//! input before the next runs; there is no shared mutable state between
//! requests, so independent requests can run concurrently on separate
//! pipeline instances.
//!
//! Terminal states: a render-ready spec with its table, an incomplete spec
//! asking the user for clarification, or a hard error from the merge safety
//! checks or validation.

use polars::prelude::DataFrame;

use crate::aggregate::aggregate;
use crate::merge;
use crate::parser::{Intent, ParseTrace, Parser};
use crate::schema::{detect_schema, ColumnType, SchemaSet};
use crate::spec::{compile, ChartSpec};
use crate::validate::validate;
use crate::vocab::Vocabulary;
use crate::{ClinvizError, Result};

/// Terminal state of one request.
#[derive(Debug)]
pub enum Outcome {
    /// The spec is render-ready and the table carries every referenced
    /// column.
    Chart { spec: ChartSpec, table: DataFrame },
    /// Required intent fields could not be resolved; the caller must ask
    /// the user for more information and must not render.
    NeedsClarification { intent: Intent, spec: ChartSpec },
}

/// Run one request against the loaded tables.
pub fn run(query: &str, tables: &[(String, DataFrame)], vocab: &Vocabulary) -> Result<Outcome> {
    run_traced(query, tables, vocab).map(|(outcome, _)| outcome)
}

/// Like [`run`], also returning the parser's decision trace.
pub fn run_traced(
    query: &str,
    tables: &[(String, DataFrame)],
    vocab: &Vocabulary,
) -> Result<(Outcome, ParseTrace)> {
    let schemas = SchemaSet::detect(tables);
    let (mut intent, trace) = Parser::new(&schemas, vocab).parse_with_trace(query);
    tracing::debug!(?intent, "parsed intent");

    if !intent.is_complete() {
        let spec = compile(&intent, &[]);
        return Ok((Outcome::NeedsClarification { intent, spec }, trace));
    }

    let plan = merge::plan(&intent, &schemas, vocab)?;
    let merged = merge::execute(&plan, tables, vocab)?;
    tracing::debug!(rows = merged.height(), "merged table");

    let aggregated = aggregate(&intent, &merged, vocab)?;
    intent.chart_type = aggregated.chart_type;

    // An overall (ungrouped) aggregate consumes the x-axis column. The
    // downgraded one-row chart stays renderable by re-anchoring the axis
    // on a surviving nominal column; with none left the request needs
    // clarification instead.
    if !intent.statistics.aggregation.is_empty() {
        if let Some(x) = intent.x_axis.clone() {
            if aggregated.table.column(&x).is_err() {
                let table_schema = detect_schema(&aggregated.table);
                intent.x_axis = table_schema
                    .columns()
                    .iter()
                    .find(|c| c.column_type == ColumnType::Nominal)
                    .map(|c| c.name.clone());
                tracing::debug!(x_axis = ?intent.x_axis, "x-axis re-anchored after aggregation");
            }
        }
    }

    let final_columns: Vec<String> = aggregated
        .table
        .get_column_names_str()
        .into_iter()
        .map(|s| s.to_string())
        .collect();
    let spec = compile(&intent, &final_columns);

    if !spec.is_render_ready() {
        return Ok((Outcome::NeedsClarification { intent, spec }, trace));
    }

    let table_schema = detect_schema(&aggregated.table);
    let validated = validate(&spec, table_schema.columns());
    if !validated.valid() {
        let messages: Vec<String> = validated
            .errors()
            .iter()
            .map(|e| e.message.clone())
            .collect();
        return Err(ClinvizError::ValidationError(messages.join("; ")));
    }

    Ok((
        Outcome::Chart {
            spec,
            table: aggregated.table,
        },
        trace,
    ))
}
