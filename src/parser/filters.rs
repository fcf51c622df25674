//! Filter extraction sub-rules.
//!
//! Applied in a fixed sequence, each rule appending filters through
//! [`push_filter`], which enforces the insertion invariant: an identical
//! `(column, operator, value)` triple is skipped (idempotent insertion) and
//! a contradictory filter on the same column is rejected. There is no later
//! validation pass; the list is consistent at every point.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use regex::Regex;

use super::trace::ParseTrace;
use super::{match_column, word_find};
use crate::parser::{Filter, FilterOp, FilterValue, Intent};
use crate::schema::{ColumnType, SchemaSet};
use crate::vocab::Vocabulary;

/// Insert a filter, enforcing the conflict invariant.
///
/// Returns `true` if the filter was added. Exact duplicates are skipped
/// silently so that applying the same rule twice leaves the list unchanged.
/// A conflict is an existing filter on the same column with the same value
/// but a different operator, or a second equality on the same column.
pub(crate) fn push_filter(intent: &mut Intent, filter: Filter, trace: &mut ParseTrace) -> bool {
    if intent.filters.contains(&filter) {
        return false;
    }
    let conflicting = intent.filters.iter().any(|existing| {
        existing.column == filter.column
            && ((existing.value == filter.value && existing.operator != filter.operator)
                || (existing.operator == FilterOp::Eq && filter.operator == FilterOp::Eq))
    });
    if conflicting {
        trace.record(
            "filters",
            format!(
                "rejected conflicting filter {} {} {}",
                filter.column, filter.operator, filter.value
            ),
        );
        return false;
    }
    trace.record(
        "filters",
        format!("{} {} {}", filter.column, filter.operator, filter.value),
    );
    intent.mention(&filter.column);
    intent.filters.push(filter);
    true
}

/// Context shared by the extraction sub-rules.
pub(crate) struct FilterContext<'a> {
    pub text: &'a str,
    pub schemas: &'a SchemaSet,
    pub vocab: &'a Vocabulary,
    /// Grouping column chosen before filter extraction; categorical words
    /// targeting it are grouping dimensions, not filters.
    pub group_col: Option<&'a str>,
    pub reference_time: NaiveDateTime,
}

/// Run all sub-rules in order.
pub(crate) fn extract(ctx: &FilterContext<'_>, intent: &mut Intent, trace: &mut ParseTrace) {
    simple_numeric(ctx, intent, trace);
    categorical(ctx, intent, trace);
    age_ranges(ctx, intent, trace);
    generic_numeric(ctx, intent, trace);
    temporal(ctx, intent, trace);
}

/// `<column> over|>|>= N` against columns mentioned by their exact name.
fn simple_numeric(ctx: &FilterContext<'_>, intent: &mut Intent, trace: &mut ParseTrace) {
    for info in ctx.schemas.columns() {
        if info.column_type != ColumnType::Quantitative {
            continue;
        }
        let name = info.name.replace('_', " ");
        let pattern = format!(r"{}\s+(over|>=|>)\s+(\d+)", regex::escape(&name));
        let Ok(re) = Regex::new(&pattern) else {
            continue;
        };
        if let Some(caps) = re.captures(ctx.text) {
            let op = match &caps[1] {
                ">=" => FilterOp::Ge,
                _ => FilterOp::Gt,
            };
            let value: f64 = caps[2].parse().unwrap_or(0.0);
            push_filter(
                intent,
                Filter::new(&info.name, op, FilterValue::Number(value)),
                trace,
            );
        }
    }
}

/// Categorical keyword filters with negation handling.
fn categorical(ctx: &FilterContext<'_>, intent: &mut Intent, trace: &mut ParseTrace) {
    for entry in &ctx.vocab.categorical_values {
        // The grouping dimension is not also a filter.
        if ctx.group_col == Some(entry.column.as_str()) {
            continue;
        }
        if !ctx.schemas.contains(&entry.column) {
            continue;
        }

        let negated = [
            format!("non-{}", entry.word),
            format!("non {}", entry.word),
            format!("not {}", entry.word),
            format!("excluding {}", entry.word),
        ]
        .iter()
        .any(|phrase| ctx.text.contains(phrase.as_str()));

        if negated {
            push_filter(
                intent,
                Filter::new(
                    &entry.column,
                    FilterOp::Ne,
                    FilterValue::Text(entry.value.clone()),
                ),
                trace,
            );
            continue;
        }

        if word_find(ctx.text, &entry.word).is_some() {
            push_filter(
                intent,
                Filter::new(
                    &entry.column,
                    FilterOp::Eq,
                    FilterValue::Text(entry.value.clone()),
                ),
                trace,
            );
        }
    }
}

/// Age phrases that map numeric bounds onto the nominal `age_group` column.
fn age_ranges(ctx: &FilterContext<'_>, intent: &mut Intent, trace: &mut ParseTrace) {
    if !ctx.schemas.contains("age_group") {
        return;
    }
    let rules: [(&str, &str); 3] = [
        (r"(over|above)\s+6[0-9]\b", "senior"),
        (r"(under|below)\s+(1[0-8]|[0-9])\b", "child"),
        (r"between\s+1[8-9]\s+and\s+6[0-4]\b", "adult"),
    ];
    for (pattern, value) in rules {
        let Ok(re) = Regex::new(pattern) else {
            continue;
        };
        if re.is_match(ctx.text) {
            push_filter(
                intent,
                Filter::new(
                    "age_group",
                    FilterOp::Eq,
                    FilterValue::Text(value.to_string()),
                ),
                trace,
            );
        }
    }
}

/// Generic `<word> <op> <number>` conditions resolved by fuzzy column
/// matching. Only quantitative columns can carry a numeric comparison.
fn generic_numeric(ctx: &FilterContext<'_>, intent: &mut Intent, trace: &mut ParseTrace) {
    let re = Regex::new(r"(\w+)\s*(over|>=|<=|>|<|under|below)\s*(\d+)").expect("static pattern");
    for caps in re.captures_iter(ctx.text) {
        let Some(column) = match_column(&caps[1], ctx.schemas, ctx.vocab) else {
            continue;
        };
        if ctx.schemas.column_type(&column) != Some(ColumnType::Quantitative) {
            continue;
        }
        let op = match &caps[2] {
            "over" | ">" => FilterOp::Gt,
            ">=" => FilterOp::Ge,
            "under" | "below" | "<" => FilterOp::Lt,
            "<=" => FilterOp::Le,
            _ => continue,
        };
        let value: f64 = caps[3].parse().unwrap_or(0.0);
        push_filter(
            intent,
            Filter::new(column, op, FilterValue::Number(value)),
            trace,
        );
    }
}

/// Temporal phrase filters.
///
/// Relative windows ("last 7 days") are open-ended and produce `>=`;
/// absolute calendar phrases ("january", "between jan 5 and jan 12") are
/// closed and produce `range`. Calendar phrases resolve against the
/// reference clock's year.
fn temporal(ctx: &FilterContext<'_>, intent: &mut Intent, trace: &mut ParseTrace) {
    let Some(time_col) = temporal_filter_column(ctx) else {
        return;
    };
    let iso = |t: NaiveDateTime| t.format("%Y-%m-%dT%H:%M:%S").to_string();

    let week = Regex::new(r"(last|past)\s+(7\s+days|week)").expect("static pattern");
    if week.is_match(ctx.text) {
        push_filter(
            intent,
            Filter::new(
                &time_col,
                FilterOp::Ge,
                FilterValue::Text(iso(ctx.reference_time - Duration::days(7))),
            ),
            trace,
        );
    }

    let month = Regex::new(r"(last|past)\s+(30\s+days|month)").expect("static pattern");
    if month.is_match(ctx.text) {
        push_filter(
            intent,
            Filter::new(
                &time_col,
                FilterOp::Ge,
                FilterValue::Text(iso(ctx.reference_time - Duration::days(30))),
            ),
            trace,
        );
    }

    let year = ctx.reference_time.year();
    let midnight = |date: NaiveDate| iso(date.and_hms_opt(0, 0, 0).expect("midnight"));

    let between = Regex::new(r"between\s+jan(?:uary)?\s+(\d+)\s+and\s+jan(?:uary)?\s+(\d+)")
        .expect("static pattern");
    if let Some(caps) = between.captures(ctx.text) {
        let start: u32 = caps[1].parse().unwrap_or(1);
        let end: u32 = caps[2].parse().unwrap_or(31);
        if let (Some(start), Some(end)) = (
            NaiveDate::from_ymd_opt(year, 1, start),
            NaiveDate::from_ymd_opt(year, 1, end),
        ) {
            push_filter(
                intent,
                Filter::new(
                    &time_col,
                    FilterOp::Range,
                    FilterValue::Range(midnight(start), midnight(end)),
                ),
                trace,
            );
        }
    } else if ctx.text.contains("january") {
        let start = NaiveDate::from_ymd_opt(year, 1, 1).expect("january first");
        let end = NaiveDate::from_ymd_opt(year, 1, 31).expect("january last");
        push_filter(
            intent,
            Filter::new(
                &time_col,
                FilterOp::Range,
                FilterValue::Range(midnight(start), midnight(end)),
            ),
            trace,
        );
    }
}

/// The column temporal filters apply to: the preferred temporal column of
/// the vocabulary that exists in the schema, else the first temporal column.
fn temporal_filter_column(ctx: &FilterContext<'_>) -> Option<String> {
    for preferred in &ctx.vocab.temporal_preference {
        if ctx.schemas.column_type(preferred) == Some(ColumnType::Temporal) {
            return Some(preferred.clone());
        }
    }
    ctx.schemas
        .columns()
        .into_iter()
        .find(|c| c.column_type == ColumnType::Temporal)
        .map(|c| c.name)
}
