//! End-to-end calls through the engine, the way a front end makes them.

use millkit_algorithms::default_registry;
use millkit_kernel::{Engine, EngineConfig, EngineError};
use serde_json::json;
use std::f64::consts::TAU;
use std::sync::Arc;

fn engine() -> Engine {
    Engine::new(Arc::new(default_registry().expect("catalogue")))
}

#[test]
fn fft_finds_a_pure_tone() {
    let signal: Vec<f64> = (0..512)
        .map(|i| 2.0 * (TAU * 50.0 * i as f64 / 512.0).sin())
        .collect();
    let response = engine()
        .calculate("fft", &json!({"signal": signal, "sample_rate": 512.0}))
        .expect("fft");
    let result = &response.result.result;
    assert_eq!(result["dominant_frequency_hz"], json!(50.0));
    let amplitude = result["dominant_amplitude"].as_f64().unwrap();
    assert!((amplitude - 2.0).abs() < 1e-9);
}

#[test]
fn setup_planning_groups_features_by_orientation() {
    let engine = engine();
    let example = engine.registry().lookup("csp_setup_planning").unwrap().example();
    let response = engine.calculate("csp_setup_planning", &example).expect("plan");
    let result = &response.result.result;
    assert_eq!(result["setup_count"], json!(3));
    assert_eq!(result["all_constraints_met"], json!(true));
    assert_eq!(result["unassigned"], json!([]));
}

#[test]
fn assignment_balances_two_machines() {
    let response = engine()
        .calculate(
            "ilp_assignment",
            &json!({"processing_times": [[3, 3], [3, 3], [2, 2], [2, 2], [2, 2]]}),
        )
        .expect("assignment");
    let result = &response.result.result;
    assert_eq!(result["makespan"], json!(6.0));
    assert_eq!(result["optimal"], json!(true));
}

#[test]
fn validation_warnings_travel_with_the_result() {
    let response = engine()
        .calculate(
            "taylor_tool_life",
            &json!({"cutting_speed": 500.0, "taylor_n": 0.25, "taylor_c": 400.0}),
        )
        .expect("taylor");
    assert!(
        response
            .result
            .warnings
            .iter()
            .any(|w| w.starts_with("cutting_speed: ")),
        "{:?}",
        response.result.warnings
    );
}

#[test]
fn unknown_id_lists_the_catalogue() {
    let err = engine()
        .calculate("warp_drive", &json!({}))
        .expect_err("unknown id");
    match &err {
        EngineError::UnknownAlgorithm {
            algorithm_id,
            known_ids,
        } => {
            assert_eq!(algorithm_id, "warp_drive");
            assert_eq!(known_ids.len(), 26);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(err.to_envelope()["error"]["kind"], json!("unknown_algorithm"));
}

#[test]
fn ids_are_trimmed_before_lookup() {
    assert!(engine().describe("  kmeans ").is_ok());
}

#[test]
fn gate_reports_every_missing_field_at_once() {
    let response = engine()
        .validate("taylor_tool_life", &json!({}))
        .expect("known id");
    insta::assert_json_snapshot!(response, @r#"
    {
      "algorithm_id": "taylor_tool_life",
      "algorithm_name": "Taylor Tool Life",
      "validation": {
        "valid": false,
        "issues": [
          {
            "field": "cutting_speed",
            "message": "is required",
            "severity": "error"
          },
          {
            "field": "taylor_n",
            "message": "is required",
            "severity": "error"
          },
          {
            "field": "taylor_c",
            "message": "is required",
            "severity": "error"
          }
        ]
      }
    }
    "#);
}

#[test]
fn non_object_params_are_a_validation_error() {
    let err = engine()
        .calculate("kmeans", &json!([1, 2, 3]))
        .expect_err("array params");
    let EngineError::Validation { issues, .. } = err else {
        panic!("expected validation error");
    };
    assert_eq!(issues[0].field, "params");
}

#[test]
fn disabled_benchmark_is_refused() {
    let config = EngineConfig {
        benchmark_enabled: false,
        ..EngineConfig::default()
    };
    let engine = Engine::with_config(Arc::new(default_registry().unwrap()), config);
    let err = engine.benchmark("fft", &json!({})).expect_err("disabled");
    assert_eq!(err.kind(), "benchmark_disabled");
}

#[test]
fn benchmark_runs_past_the_gate_and_reports_the_verdict() {
    let response = engine()
        .benchmark("kmeans", &json!({"data": [[0.0], [1.0]], "k": 5}))
        .expect("benchmark");
    assert!(!response.validation.valid);
    let outcome = serde_json::to_value(&response.outcome).unwrap();
    assert_eq!(outcome["status"], json!("failed"));
    assert_eq!(outcome["error"]["kind"], json!("execution"));
}
