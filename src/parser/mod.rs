/*!
Intent Parser Module

Turns free text plus column-type knowledge into a typed [`Intent`].

## Architecture

Parsing is an ordered sequence of independent rule stages. Later stages may
see and overwrite earlier tentative results, and the stage order is part of
the contract - reordering changes output, and the tests pin it:

1. Chart-type keyword scan
2. Statistics extraction (aggregation keywords, `N% ci` confidence interval)
3. Metric candidate detection (clinical vocabulary + synonyms, whole-word)
4. X-axis inference (explicit temporal > metric-table temporal > "over time"
   > first temporal > first mentioned)
5. Grouping and color ("color by X" / "group by X" / plain "by X")
6. Filter extraction (see [`filters`])
7. Ambiguity guard (two metrics joined by a connector, no dual-axis request)
8. Dual-axis split and y-axis resolution
9. Defaulting (suppressed after the ambiguity guard)
10. Chart-type inference from axis types
11. Final filter deduplication

The parser never fails: malformed input leaves fields unset and the caller
sees an incomplete intent.
*/

mod filters;
mod intent;
mod trace;

pub use intent::{AggFn, ChartType, Filter, FilterOp, FilterValue, Intent, Statistics, YAxis};
pub use trace::{ParseTrace, TraceEvent};

use chrono::{NaiveDateTime, Utc};
use regex::Regex;

use crate::schema::{ColumnType, SchemaSet, TableSchema};
use crate::vocab::Vocabulary;

/// Parse a query against the detected schemas. Never fails; unresolved
/// fields stay unset.
pub fn parse(text: &str, schemas: &SchemaSet, vocab: &Vocabulary) -> Intent {
    Parser::new(schemas, vocab).parse(text)
}

/// Rule-ordered intent parser. Holds only borrowed, immutable state, so one
/// parser can serve any number of queries.
pub struct Parser<'a> {
    schemas: &'a SchemaSet,
    vocab: &'a Vocabulary,
    reference_time: NaiveDateTime,
}

impl<'a> Parser<'a> {
    pub fn new(schemas: &'a SchemaSet, vocab: &'a Vocabulary) -> Self {
        Self {
            schemas,
            vocab,
            reference_time: Utc::now().naive_utc(),
        }
    }

    /// Pin the clock used by relative temporal filters ("last 7 days").
    pub fn with_reference_time(mut self, reference_time: NaiveDateTime) -> Self {
        self.reference_time = reference_time;
        self
    }

    pub fn parse(&self, text: &str) -> Intent {
        self.parse_with_trace(text).0
    }

    pub fn parse_with_trace(&self, text: &str) -> (Intent, ParseTrace) {
        let text = text.to_lowercase();
        let mut intent = Intent::default();
        let mut trace = ParseTrace::new();

        // Stage 1: chart-type keyword scan
        for (keyword, chart_type) in &self.vocab.chart_keywords {
            if text.contains(keyword.as_str()) {
                intent.chart_type = Some(*chart_type);
                trace.record("chart_type", format!("keyword '{}' -> {}", keyword, chart_type));
                break;
            }
        }

        // Stage 2: statistics
        for (agg, keywords) in &self.vocab.aggregation_keywords {
            if keywords.iter().any(|k| word_find(&text, k).is_some()) {
                intent.statistics.aggregation.push(*agg);
                trace.record("statistics", format!("aggregation {}", agg));
            }
        }
        if intent.statistics.aggregation.is_empty() && word_find(&text, "statistics").is_some() {
            intent.statistics.aggregation.push(AggFn::Mean);
            trace.record("statistics", "bare 'statistics' -> mean");
        }
        let ci = Regex::new(r"(\d+)%\s*ci").expect("static pattern");
        if let Some(caps) = ci.captures(&text) {
            if let Ok(percent) = caps[1].parse::<f64>() {
                intent.statistics.confidence_interval = Some(percent / 100.0);
                trace.record("statistics", format!("confidence interval {}", percent / 100.0));
            }
        }

        // Stage 3: metric candidates, ordered by first appearance in the text
        let candidates = self.metric_candidates(&text);
        for metric in &candidates {
            intent.mention(metric);
            trace.record("metrics", format!("candidate {}", metric));
        }

        // Stage 4: x-axis inference
        if let Some(x) = self.infer_x_axis(&text, &candidates, &mut trace) {
            intent.mention(&x);
            intent.x_axis = Some(x);
        }

        // Stage 5: grouping and color
        let group_col = self.detect_grouping(&text, &mut intent, &mut trace);

        // Stage 6: filter extraction
        let ctx = filters::FilterContext {
            text: &text,
            schemas: self.schemas,
            vocab: self.vocab,
            group_col: group_col.as_deref(),
            reference_time: self.reference_time,
        };
        filters::extract(&ctx, &mut intent, &mut trace);

        // Stage 7: ambiguity guard
        let wants_dual = self
            .vocab
            .dual_axis_keywords
            .iter()
            .any(|k| text.contains(k.as_str()));
        let has_connector = self.vocab.connector_patterns.iter().any(|pattern| {
            Regex::new(pattern)
                .map(|re| re.is_match(&text))
                .unwrap_or(false)
        });
        if candidates.len() >= 2 && has_connector && !wants_dual {
            intent.ambiguous = true;
            intent.chart_type = None;
            intent.x_axis = None;
            intent.y_axis = None;
            trace.record(
                "ambiguity",
                format!(
                    "{} metrics joined by a connector with no dual-axis request",
                    candidates.len()
                ),
            );
        }

        // Stage 8: y-axis resolution and dual-axis split
        if !intent.ambiguous {
            let filter_cols: Vec<String> =
                intent.filter_columns().iter().map(|c| c.to_string()).collect();
            let mut metrics: Vec<String> = candidates
                .iter()
                .filter(|m| !filter_cols.contains(*m))
                .cloned()
                .collect();
            if metrics.is_empty() {
                if let Some(fallback) = self.first_quantitative() {
                    trace.record("metrics", format!("fallback to {}", fallback));
                    metrics.push(fallback);
                }
            }
            for metric in &metrics {
                intent.mention(metric);
            }
            if metrics.len() >= 2 && wants_dual {
                trace.record(
                    "dual_axis",
                    format!("left {} / right {}", metrics[0], metrics[1]),
                );
                intent.y_axis = Some(YAxis::Dual {
                    left: vec![metrics[0].clone()],
                    right: vec![metrics[1].clone()],
                });
            } else if metrics.len() == 1 {
                intent.y_axis = Some(YAxis::Single(metrics.remove(0)));
            } else if metrics.len() > 1 {
                intent.y_axis = Some(YAxis::Multi(metrics));
            }
        }

        // Stage 9: defaulting (suppressed after the ambiguity guard)
        if !intent.ambiguous {
            if intent.x_axis.is_none() && intent.y_axis.is_none() {
                if let Some(x) = self.primary_temporal() {
                    intent.mention(&x);
                    intent.x_axis = Some(x);
                }
                for metric in &self.vocab.metric_priority {
                    if self.schemas.contains(metric) {
                        intent.mention(metric);
                        intent.y_axis = Some(YAxis::Single(metric.clone()));
                        break;
                    }
                }
                intent.chart_type = Some(ChartType::Line);
                trace.record("defaults", "x, y and chart type defaulted");
            }
            let x_equals_y = matches!(
                (&intent.x_axis, &intent.y_axis),
                (Some(x), Some(YAxis::Single(y))) if x == y
            );
            if x_equals_y {
                intent.x_axis = self.primary_temporal();
                trace.record("defaults", "x equals y; x reset to primary temporal");
            }
        }

        // Stage 10: chart-type inference
        if intent.chart_type.is_none() && !intent.ambiguous {
            let x_type = intent
                .x_axis
                .as_deref()
                .and_then(|x| self.schemas.column_type(x));
            intent.chart_type = match x_type {
                Some(ColumnType::Temporal) => Some(ChartType::Line),
                Some(ColumnType::Nominal) => Some(ChartType::Bar),
                _ => {
                    let quantitative_y = intent.metrics().iter().any(|m| {
                        self.schemas.column_type(m) == Some(ColumnType::Quantitative)
                    });
                    quantitative_y.then_some(ChartType::Line)
                }
            };
            if let Some(chart_type) = intent.chart_type {
                trace.record("chart_type", format!("inferred {}", chart_type));
            }
        }

        // Stage 11: final filter deduplication by (column, operator, value)
        let mut seen: Vec<Filter> = Vec::new();
        intent.filters.retain(|f| {
            if seen.contains(f) {
                false
            } else {
                seen.push(f.clone());
                true
            }
        });

        (intent, trace)
    }

    /// Stage 3: whole-word scan of metric columns and synonyms, ordered by
    /// first appearance in the text.
    fn metric_candidates(&self, text: &str) -> Vec<String> {
        let mut found: Vec<(usize, String)> = Vec::new();
        let mut add = |pos: usize, column: &str| {
            if !found.iter().any(|(_, c)| c == column) {
                found.push((pos, column.to_string()));
            }
        };

        for column in &self.vocab.metric_columns {
            if !self.schemas.contains(column) {
                continue;
            }
            if let Some(pos) =
                word_find(text, column).or_else(|| word_find(text, &normalize(column)))
            {
                add(pos, column);
            }
        }
        for (phrase, column) in &self.vocab.metric_synonyms {
            if !self.schemas.contains(column) {
                continue;
            }
            if let Some(pos) = word_find(text, phrase) {
                add(pos, column);
            }
        }

        found.sort_by_key(|(pos, _)| *pos);
        found.into_iter().map(|(_, c)| c).collect()
    }

    /// Stage 4: x-axis inference priority chain.
    fn infer_x_axis(
        &self,
        text: &str,
        candidates: &[String],
        trace: &mut ParseTrace,
    ) -> Option<String> {
        let temporal: Vec<String> = self
            .schemas
            .columns()
            .into_iter()
            .filter(|c| c.column_type == ColumnType::Temporal)
            .map(|c| c.name)
            .collect();

        // (a) explicit mention of a temporal column
        for col in &temporal {
            if word_find(text, col).is_some() || word_find(text, &normalize(col)).is_some() {
                trace.record("x_axis", format!("explicit temporal mention {}", col));
                return Some(col.clone());
            }
        }

        // (b) temporal column belonging to the table that owns the metrics,
        // preferring higher-resolution columns
        if !candidates.is_empty() {
            let mut best: Option<(usize, &TableSchema)> = None;
            for (_, schema) in self.schemas.tables() {
                if !candidates.iter().any(|m| schema.contains(m)) {
                    continue;
                }
                let rank = self.temporal_rank(schema);
                if best.map(|(r, _)| rank > r).unwrap_or(true) {
                    best = Some((rank, schema));
                }
            }
            if let Some((_, schema)) = best {
                if let Some(col) = self.preferred_temporal_of(schema) {
                    trace.record("x_axis", format!("metric-table temporal {}", col));
                    return Some(col);
                }
            }
        }

        // (c) "over time"
        if text.contains("over time") && !temporal.is_empty() {
            let col = self.preferred_temporal(&temporal);
            trace.record("x_axis", format!("'over time' -> {}", col));
            return Some(col);
        }

        // (d) first available temporal column
        if !temporal.is_empty() {
            let col = self.preferred_temporal(&temporal);
            trace.record("x_axis", format!("first temporal {}", col));
            return Some(col);
        }

        // (e) first mentioned column as last resort
        candidates.first().cloned()
    }

    /// Stage 5: "color by" / "group by" set the color column; a plain
    /// "by <nominal column>" phrase instead overrides the x-axis. Returns
    /// the grouping column so filter extraction can exempt it.
    fn detect_grouping(
        &self,
        text: &str,
        intent: &mut Intent,
        trace: &mut ParseTrace,
    ) -> Option<String> {
        for phrase in ["color by", "group by"] {
            if let Some(idx) = text.find(phrase) {
                let after = &text[idx + phrase.len()..];
                if let Some(column) = match_column(after, self.schemas, self.vocab) {
                    trace.record("grouping", format!("{} -> color {}", phrase, column));
                    intent.mention(&column);
                    intent.color = Some(column);
                }
                return None;
            }
        }

        for info in self.schemas.columns() {
            if info.column_type != ColumnType::Nominal {
                continue;
            }
            if text.contains(&format!("by {}", normalize(&info.name))) {
                trace.record("grouping", format!("by-phrase -> x {}", info.name));
                intent.mention(&info.name);
                intent.x_axis = Some(info.name.clone());
                return Some(info.name);
            }
        }

        if text.contains("by age") && self.schemas.contains("age_group") {
            trace.record("grouping", "by-age phrase -> x age_group");
            intent.mention("age_group");
            intent.x_axis = Some("age_group".to_string());
            return Some("age_group".to_string());
        }

        None
    }

    /// Highest-resolution temporal column a table carries, as a rank.
    fn temporal_rank(&self, schema: &TableSchema) -> usize {
        let n = self.vocab.temporal_preference.len();
        for (idx, preferred) in self.vocab.temporal_preference.iter().enumerate() {
            if schema.column_type(preferred) == Some(ColumnType::Temporal) {
                return n - idx;
            }
        }
        0
    }

    fn preferred_temporal_of(&self, schema: &TableSchema) -> Option<String> {
        for preferred in &self.vocab.temporal_preference {
            if schema.column_type(preferred) == Some(ColumnType::Temporal) {
                return Some(preferred.clone());
            }
        }
        schema.temporal_columns().next().map(|c| c.name.clone())
    }

    fn preferred_temporal(&self, temporal: &[String]) -> String {
        for preferred in &self.vocab.temporal_preference {
            if temporal.iter().any(|c| c == preferred) {
                return preferred.clone();
            }
        }
        temporal[0].clone()
    }

    /// The designated default x-axis column.
    fn primary_temporal(&self) -> Option<String> {
        let temporal: Vec<String> = self
            .schemas
            .columns()
            .into_iter()
            .filter(|c| c.column_type == ColumnType::Temporal)
            .map(|c| c.name)
            .collect();
        (!temporal.is_empty()).then(|| self.preferred_temporal(&temporal))
    }

    /// First quantitative, non-identifier column of the combined schema.
    fn first_quantitative(&self) -> Option<String> {
        self.schemas
            .columns()
            .into_iter()
            .find(|c| {
                c.column_type == ColumnType::Quantitative && !self.vocab.is_id_like(&c.name)
            })
            .map(|c| c.name)
    }
}

/// Lowercase, underscores and hyphens to spaces.
pub(crate) fn normalize(text: &str) -> String {
    text.to_lowercase().replace(['_', '-'], " ").trim().to_string()
}

/// Whole-word search; returns the match position.
pub(crate) fn word_find(text: &str, phrase: &str) -> Option<usize> {
    let pattern = format!(r"\b{}\b", regex::escape(phrase));
    Regex::new(&pattern)
        .ok()
        .and_then(|re| re.find(text))
        .map(|m| m.start())
}

/// Fuzzy column matching: synonym, then exact normalized name, then partial
/// word containment (temporal columns are never matched partially).
pub(crate) fn match_column(
    user_text: &str,
    schemas: &SchemaSet,
    vocab: &Vocabulary,
) -> Option<String> {
    let text = normalize(user_text);

    for (phrase, column) in &vocab.metric_synonyms {
        if text.contains(phrase.as_str()) && schemas.contains(column) {
            return Some(column.clone());
        }
    }

    for info in schemas.columns() {
        if text.contains(&normalize(&info.name)) {
            return Some(info.name);
        }
    }

    for info in schemas.columns() {
        if info.column_type == ColumnType::Temporal {
            continue;
        }
        let col_norm = normalize(&info.name);
        for word in text.split_whitespace() {
            if col_norm.contains(word) {
                return Some(info.name);
            }
        }
    }

    None
}
