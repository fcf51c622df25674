//! Pre-render spec validation.
//!
//! A compiled spec is checked against the final table before rendering is
//! attempted: every referenced column must exist, filters must be well
//! formed for their column types, and a requested confidence interval must
//! lie in (0, 1). Any error is fatal; rendering must not be attempted.

use crate::parser::{FilterOp, FilterValue};
use crate::schema::{ColumnInfo, ColumnType};
use crate::spec::{ChartSpec, Columns, Encoding};

/// Result of [`validate`] - errors are fatal, warnings are advisory.
#[derive(Debug, Default)]
pub struct Validated {
    errors: Vec<ValidationError>,
    warnings: Vec<ValidationWarning>,
}

/// A validation error (fatal).
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

/// A validation warning (non-fatal).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub message: String,
}

impl Validated {
    /// Whether the spec is safe to hand to a renderer.
    pub fn valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn warnings(&self) -> &[ValidationWarning] {
        &self.warnings
    }

    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(ValidationError {
            message: message.into(),
        });
    }

    fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(ValidationWarning {
            message: message.into(),
        });
    }
}

/// Validate a compiled spec against the final table's columns.
pub fn validate(spec: &ChartSpec, columns: &[ColumnInfo]) -> Validated {
    let mut out = Validated::default();

    let exists = |name: &str| columns.iter().any(|c| c.name == name);
    let column_type =
        |name: &str| columns.iter().find(|c| c.name == name).map(|c| c.column_type);

    let check_columns = |out: &mut Validated, what: &str, refs: &Columns| match refs {
        Columns::One(c) => {
            if !exists(c) {
                out.error(format!("{} references non-existent column '{}'", what, c));
            }
        }
        Columns::Many(cs) => {
            for c in cs {
                if !exists(c) {
                    out.error(format!("{} references non-existent column '{}'", what, c));
                }
            }
        }
    };

    match &spec.encoding {
        Encoding::Incomplete {} => {
            out.warning("incomplete spec: clarification required before rendering");
        }
        Encoding::Single {
            x,
            y,
            color,
            tooltip,
        } => {
            if spec.chart.chart_type.is_none() {
                out.error("complete encoding with no chart type");
            }
            if !exists(&x.column) {
                out.error(format!("x-axis references non-existent column '{}'", x.column));
            }
            check_columns(&mut out, "y-axis", &y.column);
            if let Some(color) = color {
                check_columns(&mut out, "color", &color.column);
            }
            for c in tooltip {
                if !exists(c) {
                    out.error(format!("tooltip references non-existent column '{}'", c));
                }
            }
        }
        Encoding::Dual {
            x,
            y_left,
            y_right,
            color,
            tooltip,
        } => {
            if spec.chart.chart_type.is_none() {
                out.error("complete encoding with no chart type");
            }
            if !exists(&x.column) {
                out.error(format!("x-axis references non-existent column '{}'", x.column));
            }
            check_columns(&mut out, "left y-axis", &y_left.column);
            check_columns(&mut out, "right y-axis", &y_right.column);
            if let Some(color) = color {
                check_columns(&mut out, "color", &color.column);
            }
            for c in tooltip {
                if !exists(c) {
                    out.error(format!("tooltip references non-existent column '{}'", c));
                }
            }
        }
    }

    for filter in &spec.data.filters {
        match (&filter.operator, &filter.value) {
            (FilterOp::Range, FilterValue::Range(_, _)) => {}
            (FilterOp::Range, _) => {
                out.error(format!(
                    "range filter on '{}' requires a two-timestamp value",
                    filter.column
                ));
            }
            (_, FilterValue::Range(_, _)) => {
                out.error(format!(
                    "comparison filter on '{}' cannot take a range value",
                    filter.column
                ));
            }
            (_, value) => {
                if column_type(&filter.column) == Some(ColumnType::Quantitative)
                    && !matches!(value, FilterValue::Number(_))
                {
                    out.error(format!(
                        "filter value for quantitative column '{}' must be numeric",
                        filter.column
                    ));
                }
            }
        }
    }

    if let Some(statistics) = &spec.chart.statistics {
        if let Some(ci) = statistics.confidence_interval {
            if !(ci > 0.0 && ci < 1.0) {
                out.error(format!(
                    "confidence interval must be between 0 and 1, got {}",
                    ci
                ));
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{AggFn, ChartType, Filter, Intent, Statistics, YAxis};
    use crate::spec::compile;

    fn cols(entries: &[(&str, ColumnType)]) -> Vec<ColumnInfo> {
        entries
            .iter()
            .map(|(name, t)| ColumnInfo {
                name: name.to_string(),
                column_type: *t,
            })
            .collect()
    }

    fn bar_intent() -> Intent {
        Intent {
            chart_type: Some(ChartType::Bar),
            x_axis: Some("age_group".to_string()),
            y_axis: Some(YAxis::Single("glucose_level".to_string())),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_spec_passes() {
        let spec = compile(
            &bar_intent(),
            &["age_group".to_string(), "glucose_level".to_string()],
        );
        let validated = validate(
            &spec,
            &cols(&[
                ("age_group", ColumnType::Nominal),
                ("glucose_level", ColumnType::Quantitative),
            ]),
        );
        assert!(validated.valid(), "{:?}", validated.errors());
    }

    #[test]
    fn test_missing_axis_column_fails() {
        let spec = compile(
            &bar_intent(),
            &["age_group".to_string(), "glucose_level".to_string()],
        );
        let validated = validate(&spec, &cols(&[("age_group", ColumnType::Nominal)]));
        assert!(!validated.valid());
        assert!(validated.errors()[0].message.contains("glucose_level"));
    }

    #[test]
    fn test_incomplete_spec_warns_but_passes() {
        let spec = compile(&Intent::default(), &[]);
        let validated = validate(&spec, &[]);
        assert!(validated.valid());
        assert_eq!(validated.warnings().len(), 1);
    }

    #[test]
    fn test_non_numeric_filter_on_quantitative_column() {
        let mut intent = bar_intent();
        intent.filters.push(Filter::new(
            "glucose_level",
            crate::parser::FilterOp::Gt,
            crate::parser::FilterValue::Text("high".into()),
        ));
        let spec = compile(
            &intent,
            &["age_group".to_string(), "glucose_level".to_string()],
        );
        let validated = validate(
            &spec,
            &cols(&[
                ("age_group", ColumnType::Nominal),
                ("glucose_level", ColumnType::Quantitative),
            ]),
        );
        assert!(!validated.valid());
    }

    #[test]
    fn test_confidence_interval_bounds() {
        let mut intent = bar_intent();
        intent.statistics = Statistics {
            aggregation: vec![AggFn::Mean],
            confidence_interval: Some(1.5),
        };
        let spec = compile(
            &intent,
            &[
                "age_group".to_string(),
                "mean_glucose_level".to_string(),
            ],
        );
        let validated = validate(
            &spec,
            &cols(&[
                ("age_group", ColumnType::Nominal),
                ("mean_glucose_level", ColumnType::Quantitative),
            ]),
        );
        assert!(!validated.valid());
        assert!(validated
            .errors()
            .iter()
            .any(|e| e.message.contains("confidence interval")));
    }
}
