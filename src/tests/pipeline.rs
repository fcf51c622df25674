//! End-to-end pipeline tests: query text in, chart spec and table out.

use chrono::NaiveDate;
use polars::prelude::*;

use clinviz::pipeline::{run, Outcome};
use clinviz::vocab::Vocabulary;
use clinviz::{ClinvizError, FilterOp, FilterValue};

fn ts(month: u32, day: u32, hour: u32) -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, month, day)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

/// Labs table with demographics merged in, one row per draw.
fn labs() -> DataFrame {
    df!(
        "patient_id" => [1i64, 1, 2, 2, 3, 3, 4, 4],
        "date" => [
            ts(3, 13, 15), ts(6, 12, 15),
            ts(3, 13, 16), ts(6, 12, 16),
            ts(3, 13, 17), ts(6, 12, 17),
            ts(3, 13, 18), ts(6, 12, 18),
        ],
        "glucose_level" => [100.0f64, 110.0, 120.0, 130.0, 90.0, 92.0, 105.0, 109.0],
        "cholesterol" => [180.0f64, 185.0, 200.0, 205.0, 150.0, 152.0, 190.0, 195.0],
        "hba1c" => [5.5f64, 5.6, 6.1, 6.2, 5.0, 5.1, 5.8, 5.9],
        "gender" => ["male", "male", "female", "female", "female", "female", "male", "male"],
        "age_group" => ["adult", "adult", "senior", "senior", "child", "child", "adult", "adult"],
        "smoker" => ["false", "false", "true", "true", "false", "false", "true", "true"],
    )
    .unwrap()
}

/// Vitals table with demographics merged in, one row per reading.
fn vitals() -> DataFrame {
    df!(
        "patient_id" => [1i64, 1, 2, 2, 3, 3, 4, 4],
        "date" => [
            ts(1, 10, 8), ts(4, 11, 8),
            ts(1, 10, 9), ts(4, 11, 9),
            ts(1, 10, 10), ts(4, 11, 10),
            ts(1, 10, 11), ts(4, 11, 11),
        ],
        "blood_pressure" => [120.0f64, 122.0, 135.0, 137.0, 100.0, 101.0, 128.0, 130.0],
        "heart_rate" => [72.0f64, 74.0, 80.0, 82.0, 95.0, 96.0, 76.0, 78.0],
        "temperature" => [98.6f64, 98.5, 98.9, 99.0, 98.4, 98.3, 98.7, 98.8],
        "oxygen_saturation" => [97.0f64, 97.5, 95.0, 95.5, 98.0, 98.5, 96.0, 96.5],
        "gender" => ["male", "male", "female", "female", "female", "female", "male", "male"],
        "age_group" => ["adult", "adult", "senior", "senior", "child", "child", "adult", "adult"],
        "smoker" => ["false", "false", "true", "true", "false", "false", "true", "true"],
    )
    .unwrap()
}

fn both() -> Vec<(String, DataFrame)> {
    vec![
        ("labs".to_string(), labs()),
        ("vitals".to_string(), vitals()),
    ]
}

fn expect_chart(outcome: Outcome) -> (serde_json::Value, DataFrame) {
    match outcome {
        Outcome::Chart { spec, table } => (serde_json::to_value(&spec).unwrap(), table),
        Outcome::NeedsClarification { intent, .. } => {
            panic!("expected a chart, needs clarification: {:?}", intent)
        }
    }
}

#[test]
fn mean_glucose_by_age_group() {
    let vocab = Vocabulary::clinical();
    let outcome = run("mean glucose by age group", &both(), &vocab).unwrap();
    let (spec, table) = expect_chart(outcome);

    assert_eq!(spec["chart"]["type"], "bar");
    assert_eq!(spec["chart"]["statistics"]["aggregation"], serde_json::json!(["mean"]));
    assert_eq!(spec["encoding"]["x"]["column"], "age_group");
    assert_eq!(spec["encoding"]["x"]["type"], "nominal");
    assert_eq!(spec["encoding"]["y"]["column"], "mean_glucose_level");

    // One row per distinct age group
    assert_eq!(table.height(), 3);
    let means: Vec<f64> = table
        .column("mean_glucose_level")
        .unwrap()
        .f64()
        .unwrap()
        .into_no_null_iter()
        .collect();
    // Stable group order: adult (100,110,105,109), senior (120,130), child (90,92)
    assert_eq!(means, vec![106.0, 125.0, 91.0]);
}

#[test]
fn glucose_over_time() {
    let vocab = Vocabulary::clinical();
    let outcome = run("glucose over time", &both(), &vocab).unwrap();
    let (spec, table) = expect_chart(outcome);

    assert_eq!(spec["chart"]["type"], "line");
    assert_eq!(spec["encoding"]["x"]["column"], "date");
    assert_eq!(spec["encoding"]["x"]["type"], "temporal");
    assert_eq!(spec["encoding"]["y"]["column"], "glucose_level");
    // No aggregation requested: raw rows pass through
    assert!(spec["chart"].get("statistics").is_none());
    assert_eq!(table.height(), labs().height());
}

#[test]
fn ambiguous_two_metric_request_asks_for_clarification() {
    let vocab = Vocabulary::clinical();
    let outcome = run("mean cholesterol and glucose", &both(), &vocab).unwrap();
    match outcome {
        Outcome::NeedsClarification { intent, spec } => {
            assert!(intent.ambiguous);
            assert_eq!(intent.chart_type, None);
            assert_eq!(intent.x_axis, None);
            assert_eq!(intent.y_axis, None);
            let json = serde_json::to_value(&spec).unwrap();
            assert_eq!(json["encoding"], serde_json::json!({}));
        }
        Outcome::Chart { spec, .. } => panic!("expected clarification, got chart {:?}", spec),
    }
}

#[test]
fn smokers_over_sixty_filters() {
    let vocab = Vocabulary::clinical();
    let outcome = run("glucose for smokers over 60", &both(), &vocab).unwrap();
    let (spec, table) = expect_chart(outcome);

    let filters = spec["data"]["filters"].as_array().unwrap();
    assert!(filters.contains(&serde_json::json!({
        "column": "smoker", "operator": "==", "value": "smoker"
    })));
    assert!(filters.contains(&serde_json::json!({
        "column": "age_group", "operator": "==", "value": "senior"
    })));

    // Only patient 2 is both a smoker and senior
    let ids: Vec<i64> = table
        .column("patient_id")
        .unwrap()
        .i64()
        .unwrap()
        .into_no_null_iter()
        .collect();
    assert!(!ids.is_empty());
    assert!(ids.iter().all(|id| *id == 2));
}

#[test]
fn filter_on_one_table_plot_on_another() {
    // Patient-level attributes and reading-level metrics have different
    // grain; the filter runs on its own table and the metric table is
    // subset by identifier.
    let patients = df!(
        "patient_id" => [1i64, 2, 3, 4],
        "gender" => ["male", "female", "female", "male"],
        "age_group" => ["adult", "senior", "child", "adult"],
        "smoker" => ["false", "true", "false", "true"],
    )
    .unwrap();
    let readings = df!(
        "patient_id" => [1i64, 1, 2, 2, 3, 4],
        "date" => [ts(1, 10, 8), ts(4, 11, 8), ts(1, 10, 9), ts(4, 11, 9), ts(1, 10, 10), ts(1, 10, 11)],
        "heart_rate" => [72.0f64, 74.0, 80.0, 82.0, 95.0, 76.0],
    )
    .unwrap();
    let tables = vec![
        ("patients".to_string(), patients),
        ("vitals".to_string(), readings),
    ];

    let vocab = Vocabulary::clinical();
    let outcome = run("heart rate for smokers", &tables, &vocab).unwrap();
    let (spec, table) = expect_chart(outcome);

    assert_eq!(spec["encoding"]["y"]["column"], "heart_rate");
    // Patients 2 and 4 smoke; three of the six readings are theirs
    assert_eq!(table.height(), 3);
    let ids: Vec<i64> = table
        .column("patient_id")
        .unwrap()
        .i64()
        .unwrap()
        .into_no_null_iter()
        .collect();
    assert!(ids.iter().all(|id| *id == 2 || *id == 4));
    // The grain boundary holds: no patient-level columns crossed over
    assert!(table.column("age_group").is_err());
}

#[test]
fn overall_mean_collapses_to_single_bar() {
    let vocab = Vocabulary::clinical();
    let outcome = run("mean glucose", &both(), &vocab).unwrap();
    let (spec, table) = expect_chart(outcome);

    // One-row aggregate: a line chart would be meaningless
    assert_eq!(spec["chart"]["type"], "bar");
    assert_eq!(table.height(), 1);
    let mean = table
        .column("mean_glucose_level")
        .unwrap()
        .f64()
        .unwrap()
        .get(0)
        .unwrap();
    assert!((mean - 107.0).abs() < 1e-9);
}

#[test]
fn dual_axis_across_tables() {
    let vocab = Vocabulary::clinical();
    let outcome = run("compare glucose and heart rate", &both(), &vocab).unwrap();
    let (spec, table) = expect_chart(outcome);

    assert_eq!(spec["chart"]["type"], "line");
    assert_eq!(
        spec["encoding"]["y_left"]["column"],
        serde_json::json!(["glucose_level"])
    );
    assert_eq!(
        spec["encoding"]["y_right"]["column"],
        serde_json::json!(["heart_rate"])
    );
    assert!(spec["encoding"].get("y").is_none());
    assert_eq!(
        spec["encoding"]["tooltip"],
        serde_json::json!(["date", "glucose_level", "heart_rate"])
    );

    // One aligned row per lab draw, each carrying the nearest vitals reading
    assert_eq!(table.height(), labs().height());
    assert!(table.column("glucose_level").is_ok());
    assert!(table.column("heart_rate").is_ok());
}

#[test]
fn cross_table_metrics_without_dual_axis_fail_safely() {
    // Joining the many-rows-per-patient vitals table onto labs would fan
    // rows out; the executor must refuse rather than silently duplicate.
    let vocab = Vocabulary::clinical();
    let err = run("glucose cholesterol heart rate over time", &both(), &vocab).unwrap_err();
    assert!(matches!(err, ClinvizError::MergeSafetyError(_)));
}

#[test]
fn aggregation_naming_holds_for_each_function() {
    let vocab = Vocabulary::clinical();
    let outcome = run("mean and std glucose by age group", &both(), &vocab).unwrap();
    let (spec, table) = expect_chart(outcome);

    assert!(table.column("mean_glucose_level").is_ok());
    assert!(table.column("std_glucose_level").is_ok());
    // The y-axis references the first requested aggregation
    assert_eq!(spec["encoding"]["y"]["column"], "mean_glucose_level");
}

#[test]
fn incomplete_spec_is_never_render_ready() {
    let vocab = Vocabulary::clinical();
    let outcome = run("mean cholesterol and glucose", &both(), &vocab).unwrap();
    if let Outcome::NeedsClarification { spec, .. } = outcome {
        assert!(!spec.is_render_ready());
    } else {
        panic!("expected clarification");
    }
}

#[test]
fn filters_render_into_the_title() {
    let vocab = Vocabulary::clinical();
    let outcome = run("mean glucose for seniors", &both(), &vocab).unwrap();
    let (spec, _) = expect_chart(outcome);
    let title = spec["chart"]["title"].as_str().unwrap();
    assert!(title.contains("Glucose Level"), "title: {}", title);
    assert!(title.contains("Age Group = senior"), "title: {}", title);
}

#[test]
fn parser_filter_wire_shapes() {
    // The wire format of extracted filters is part of the contract.
    use clinviz::parser::Filter;
    let filter = Filter::new("heart_rate", FilterOp::Ge, FilterValue::Number(90.0));
    assert_eq!(
        serde_json::to_value(&filter).unwrap(),
        serde_json::json!({"column": "heart_rate", "operator": ">=", "value": 90.0})
    );
}
