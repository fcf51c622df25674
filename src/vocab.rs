//! Vocabulary configuration for the intent parser.
//!
//! All keyword tables the parser matches against live here: metric synonyms,
//! categorical filter words, chart-type and aggregation keywords, connector
//! and dual-axis phrases, and the clinical priority/preserve lists used by
//! defaulting and aggregation.
//!
//! The vocabulary is built once at process start and passed by reference into
//! every pipeline stage that needs it. It is immutable after construction and
//! `Send + Sync`, so concurrent requests can share a single instance without
//! locking.

use crate::parser::{AggFn, ChartType};

/// A categorical filter word: a token in the request that maps to an
/// equality filter on a column (e.g. "smokers" → `smoker == "smoker"`).
#[derive(Debug, Clone)]
pub struct CategoricalValue {
    /// The word as it appears in text (matched whole-word)
    pub word: String,
    /// The column the filter targets
    pub column: String,
    /// The normalized filter value
    pub value: String,
}

impl CategoricalValue {
    fn new(word: &str, column: &str, value: &str) -> Self {
        Self {
            word: word.to_string(),
            column: column.to_string(),
            value: value.to_string(),
        }
    }
}

/// Immutable keyword tables and policy lists used by the parser, planner,
/// executor and aggregator.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    /// Phrase → canonical column name (matched whole-word on normalized text)
    pub metric_synonyms: Vec<(String, String)>,
    /// Clinical metric columns recognized directly by name
    pub metric_columns: Vec<String>,
    /// Categorical filter words with negation support
    pub categorical_values: Vec<CategoricalValue>,
    /// Chart-type keywords, scanned in order; first literal match wins
    pub chart_keywords: Vec<(String, ChartType)>,
    /// Aggregation keywords per function, scanned in fixed function order
    pub aggregation_keywords: Vec<(AggFn, Vec<String>)>,
    /// Phrases that request a dual-axis comparison
    pub dual_axis_keywords: Vec<String>,
    /// Regex fragments that join two metrics in one request ("and", "vs", ...)
    pub connector_patterns: Vec<String>,
    /// Defaulting order for the y-axis when nothing was mentioned
    pub metric_priority: Vec<String>,
    /// Columns that are identifiers, never metrics
    pub id_like_columns: Vec<String>,
    /// Identifier column shared by the source tables
    pub join_key: String,
    /// Demographic columns carried through alignment and aggregation
    pub preserve_columns: Vec<String>,
    /// Temporal column preference, highest resolution first
    pub temporal_preference: Vec<String>,
}

impl Vocabulary {
    /// The clinical vocabulary used by the standard labs/vitals deployment.
    pub fn clinical() -> Self {
        let owned = |items: &[&str]| -> Vec<String> {
            items.iter().map(|s| s.to_string()).collect()
        };
        let pairs = |items: &[(&str, &str)]| -> Vec<(String, String)> {
            items
                .iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect()
        };

        Self {
            metric_synonyms: pairs(&[
                ("blood pressure", "blood_pressure"),
                ("bp", "blood_pressure"),
                ("pressure", "blood_pressure"),
                ("heart rate", "heart_rate"),
                ("hr", "heart_rate"),
                ("pulse", "heart_rate"),
                ("glucose", "glucose_level"),
                ("sugar", "glucose_level"),
                ("oxygen saturation", "oxygen_saturation"),
                ("oxygen", "oxygen_saturation"),
                ("o2", "oxygen_saturation"),
                ("temperature", "temperature"),
                ("temp", "temperature"),
            ]),
            metric_columns: owned(&[
                "glucose_level",
                "cholesterol",
                "hba1c",
                "blood_pressure",
                "heart_rate",
                "temperature",
                "oxygen_saturation",
            ]),
            categorical_values: vec![
                CategoricalValue::new("senior", "age_group", "senior"),
                CategoricalValue::new("seniors", "age_group", "senior"),
                CategoricalValue::new("elderly", "age_group", "senior"),
                CategoricalValue::new("adult", "age_group", "adult"),
                CategoricalValue::new("adults", "age_group", "adult"),
                CategoricalValue::new("child", "age_group", "child"),
                CategoricalValue::new("children", "age_group", "child"),
                CategoricalValue::new("kid", "age_group", "child"),
                CategoricalValue::new("kids", "age_group", "child"),
                CategoricalValue::new("male", "gender", "male"),
                CategoricalValue::new("man", "gender", "male"),
                CategoricalValue::new("men", "gender", "male"),
                CategoricalValue::new("female", "gender", "female"),
                CategoricalValue::new("woman", "gender", "female"),
                CategoricalValue::new("women", "gender", "female"),
                CategoricalValue::new("smoker", "smoker", "smoker"),
                CategoricalValue::new("smokers", "smoker", "smoker"),
            ],
            chart_keywords: vec![
                ("line".to_string(), ChartType::Line),
                ("bar".to_string(), ChartType::Bar),
                ("pie".to_string(), ChartType::Pie),
                ("boxplot".to_string(), ChartType::Boxplot),
                ("box".to_string(), ChartType::Boxplot),
                ("violin".to_string(), ChartType::Violin),
            ],
            aggregation_keywords: vec![
                (AggFn::Mean, owned(&["mean", "average"])),
                (AggFn::Median, owned(&["median"])),
                (AggFn::Std, owned(&["std", "stdev", "standard deviation"])),
                (AggFn::Var, owned(&["variance"])),
                (AggFn::Sum, owned(&["sum", "total"])),
                (AggFn::Count, owned(&["count", "number of"])),
            ],
            dual_axis_keywords: owned(&[
                "compare",
                "versus",
                "vs",
                "side by side",
                "separate axes",
                "dual axis",
            ]),
            connector_patterns: owned(&[
                r"\band\b",
                r"\badn\b",
                r"\ban\b",
                r"\bnad\b",
                r"\bvs\b",
                r"\bversus\b",
                "&",
                r"\bplus\b",
                ",",
            ]),
            metric_priority: owned(&[
                "blood_pressure",
                "heart_rate",
                "glucose_level",
                "oxygen_saturation",
                "temperature",
            ]),
            id_like_columns: owned(&["patient_id", "id", "record_id"]),
            join_key: "patient_id".to_string(),
            preserve_columns: owned(&["gender", "age_group", "ethnicity", "smoker"]),
            temporal_preference: owned(&["day", "time", "date"]),
        }
    }

    /// Resolve a synonym or metric column phrase to a canonical column name.
    pub fn canonical_metric(&self, phrase: &str) -> Option<&str> {
        self.metric_synonyms
            .iter()
            .find(|(key, _)| key == phrase)
            .map(|(_, col)| col.as_str())
    }

    /// Whether a column is identifier-like and must never become a metric.
    pub fn is_id_like(&self, column: &str) -> bool {
        self.id_like_columns.iter().any(|c| c == column)
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::clinical()
    }
}
