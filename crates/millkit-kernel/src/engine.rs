//! The execution engine.
//!
//! Three entry points over one injected registry:
//!
//! - [`Engine::validate`]: lookup, then the algorithm's validation pass.
//! - [`Engine::calculate`]: lookup, the validation gate, then a timed,
//!   panic-contained `calculate` whose output is scanned for non-finite values.
//! - [`Engine::benchmark`]: the same timed execution *without* the gate, for
//!   robustness sweeps and fuzzing. It is never the default path.
//!
//! All three return structured data; nothing a caller sends can make the
//! engine panic or leak an internal failure unnormalised.

use crate::config::EngineConfig;
use crate::contract::{DynAlgorithm, ResultEnvelope, ValidationIssue, ValidationResult};
use crate::error::EngineError;
use crate::params::Params;
use crate::registry::Registry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Instant;

/// Inbound call shape shared by validate, calculate and benchmark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculateRequest {
    pub algorithm_id: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidateResponse {
    pub algorithm_id: String,
    pub algorithm_name: String,
    pub validation: ValidationResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalculateResponse {
    pub algorithm_id: String,
    pub algorithm_name: String,
    pub result: ResultEnvelope<Value>,
    pub execution_time_ms: f64,
}

/// What happened when the ungated computation ran.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BenchmarkOutcome {
    Completed { result: ResultEnvelope<Value> },
    Failed { error: EngineError },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkResponse {
    pub algorithm_id: String,
    pub algorithm_name: String,
    /// The verdict the gate would have reached; reported, not enforced.
    pub validation: ValidationResult,
    pub outcome: BenchmarkOutcome,
    pub execution_time_ms: f64,
}

#[derive(Debug, Clone)]
pub struct Engine {
    registry: Arc<Registry>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self::with_config(registry, EngineConfig::default())
    }

    pub fn with_config(registry: Arc<Registry>, config: EngineConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn list(&self) -> Vec<&'static str> {
        self.registry.list()
    }

    pub fn describe(&self, id: &str) -> Result<&'static crate::AlgorithmMeta, EngineError> {
        Ok(self.lookup(id)?.describe())
    }

    pub fn validate(&self, id: &str, params: &Value) -> Result<ValidateResponse, EngineError> {
        let algorithm = self.lookup(id)?;
        let meta = algorithm.describe();
        let validation = guarded_validate(algorithm, params)?;
        tracing::debug!(
            algorithm_id = meta.id,
            valid = validation.valid,
            issues = validation.issues.len(),
            "validate"
        );
        Ok(ValidateResponse {
            algorithm_id: meta.id.to_string(),
            algorithm_name: meta.name.to_string(),
            validation,
        })
    }

    pub fn calculate(&self, id: &str, params: &Value) -> Result<CalculateResponse, EngineError> {
        let algorithm = self.lookup(id)?;
        let meta = algorithm.describe();
        let validation = guarded_validate(algorithm, params)?;
        if !validation.valid {
            tracing::debug!(algorithm_id = meta.id, "calculate rejected by validation gate");
            return Err(EngineError::Validation {
                algorithm_id: meta.id.to_string(),
                issues: validation.issues,
            });
        }

        let (outcome, elapsed_ms) = self.execute(algorithm, params);
        let mut result = outcome?;
        // Validation warnings travel with the result as advisories.
        for issue in validation.warnings() {
            result
                .warnings
                .push(format!("{}: {}", issue.field, issue.message));
        }
        Ok(CalculateResponse {
            algorithm_id: meta.id.to_string(),
            algorithm_name: meta.name.to_string(),
            result,
            execution_time_ms: elapsed_ms,
        })
    }

    /// Ungated execution for robustness sweeps.
    ///
    /// Runs `calculate` on whatever the parser could salvage from `params`,
    /// even when validation fails, and reports any resulting execution error
    /// in the outcome instead of suppressing it. Use [`Engine::calculate`]
    /// for anything that consumes the result.
    pub fn benchmark(&self, id: &str, params: &Value) -> Result<BenchmarkResponse, EngineError> {
        let algorithm = self.lookup(id)?;
        let meta = algorithm.describe();
        if !self.config.benchmark_enabled {
            return Err(EngineError::BenchmarkDisabled {
                algorithm_id: meta.id.to_string(),
            });
        }
        let validation = match guarded_validate(algorithm, params) {
            Ok(validation) => validation,
            Err(error) => {
                return Ok(BenchmarkResponse {
                    algorithm_id: meta.id.to_string(),
                    algorithm_name: meta.name.to_string(),
                    validation: ValidationResult::from_issues(vec![ValidationIssue::error(
                        "params",
                        "validation did not complete",
                    )]),
                    outcome: BenchmarkOutcome::Failed { error },
                    execution_time_ms: 0.0,
                });
            }
        };
        let (outcome, elapsed_ms) = self.execute(algorithm, params);
        let outcome = match outcome {
            Ok(result) => BenchmarkOutcome::Completed { result },
            Err(error) => BenchmarkOutcome::Failed { error },
        };
        Ok(BenchmarkResponse {
            algorithm_id: meta.id.to_string(),
            algorithm_name: meta.name.to_string(),
            validation,
            outcome,
            execution_time_ms: elapsed_ms,
        })
    }

    fn lookup(&self, id: &str) -> Result<&dyn DynAlgorithm, EngineError> {
        self.registry
            .lookup(id.trim())
            .ok_or_else(|| EngineError::UnknownAlgorithm {
                algorithm_id: id.to_string(),
                known_ids: self.registry.list().into_iter().map(String::from).collect(),
            })
    }

    fn execute(
        &self,
        algorithm: &dyn DynAlgorithm,
        params: &Value,
    ) -> (Result<ResultEnvelope<Value>, EngineError>, f64) {
        let meta = algorithm.describe();
        let execution_error = |message: String| EngineError::Execution {
            algorithm_id: meta.id.to_string(),
            message,
        };

        let empty = Params::new();
        let map = params.as_object().unwrap_or(&empty);
        let started = Instant::now();
        let caught = catch_unwind(AssertUnwindSafe(|| algorithm.calculate(map)));
        let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;

        let outcome = match caught {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(err)) => Err(execution_error(err.to_string())),
            Err(payload) => Err(execution_error(format!(
                "internal panic: {}",
                panic_message(payload.as_ref())
            ))),
        };

        match &outcome {
            Err(err) => tracing::error!(algorithm_id = meta.id, error = %err, "execution failed"),
            Ok(_) if elapsed_ms > self.config.slow_call_warn_ms => tracing::warn!(
                algorithm_id = meta.id,
                elapsed_ms,
                threshold_ms = self.config.slow_call_warn_ms,
                "slow calculation"
            ),
            Ok(_) => tracing::debug!(algorithm_id = meta.id, elapsed_ms, "calculated"),
        }
        (outcome, elapsed_ms)
    }
}

/// [`validate_with`] with a panic in the parser turned into an `Execution` error.
fn guarded_validate(
    algorithm: &dyn DynAlgorithm,
    params: &Value,
) -> Result<ValidationResult, EngineError> {
    catch_unwind(AssertUnwindSafe(|| validate_with(algorithm, params))).map_err(|payload| {
        let meta = algorithm.describe();
        let error = EngineError::Execution {
            algorithm_id: meta.id.to_string(),
            message: format!(
                "internal panic during validation: {}",
                panic_message(payload.as_ref())
            ),
        };
        tracing::error!(algorithm_id = meta.id, error = %error, "validation failed to complete");
        error
    })
}

/// Parameters must be a JSON object; `null` counts as an empty one.
fn validate_with(algorithm: &dyn DynAlgorithm, params: &Value) -> ValidationResult {
    match params {
        Value::Object(map) => algorithm.validate(map),
        Value::Null => algorithm.validate(&Params::new()),
        _ => ValidationResult::from_issues(vec![ValidationIssue::error(
            "params",
            "must be a JSON object",
        )]),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::fixtures::{Doubler, Fragile};
    use serde_json::json;

    fn engine() -> Engine {
        let registry = Registry::new(vec![Box::new(Doubler), Box::new(Fragile)]).unwrap();
        Engine::new(Arc::new(registry))
    }

    #[test]
    fn calculate_happy_path_is_tagged_and_timed() {
        let response = engine().calculate("doubler", &json!({"x": 4.0})).unwrap();
        assert_eq!(response.algorithm_id, "doubler");
        assert_eq!(response.algorithm_name, "Doubler");
        assert_eq!(response.result.result, json!({"y": 8.0}));
        assert!(response.execution_time_ms >= 0.0);
    }

    #[test]
    fn unknown_algorithm_is_structured() {
        let err = engine().calculate("nope", &json!({})).unwrap_err();
        match err {
            EngineError::UnknownAlgorithm {
                algorithm_id,
                known_ids,
            } => {
                assert_eq!(algorithm_id, "nope");
                assert_eq!(known_ids, vec!["doubler", "fragile"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(engine().validate("nope", &json!({})).is_err());
    }

    #[test]
    fn gate_blocks_invalid_input() {
        let err = engine().calculate("fragile", &json!({"x": -1.0})).unwrap_err();
        let EngineError::Validation { issues, .. } = err else {
            panic!("expected validation error");
        };
        assert_eq!(issues[0].field, "x");
    }

    #[test]
    fn non_object_params_fail_validation() {
        let response = engine().validate("doubler", &json!([1, 2])).unwrap();
        assert!(!response.validation.valid);
        assert_eq!(response.validation.issues[0].field, "params");
    }

    #[test]
    fn validation_warnings_become_result_warnings() {
        let response = engine().calculate("doubler", &json!({"x": 2e6})).unwrap();
        assert!(response.result.warnings.contains(&"large input".to_string()));
        assert!(
            response
                .result
                .warnings
                .iter()
                .any(|w| w.starts_with("x: unusually large"))
        );
    }

    #[test]
    fn benchmark_bypasses_gate_and_surfaces_panics() {
        let response = engine().benchmark("fragile", &json!({"x": -1.0})).unwrap();
        assert!(!response.validation.valid);
        let BenchmarkOutcome::Failed { error } = response.outcome else {
            panic!("expected failure outcome");
        };
        assert_eq!(error.kind(), "execution");
        assert!(error.to_string().contains("negative input reached fragile"));
    }

    #[test]
    fn benchmark_surfaces_non_finite_output() {
        let response = engine().benchmark("fragile", &json!({"x": 0.0})).unwrap();
        let BenchmarkOutcome::Failed { error } = response.outcome else {
            panic!("expected failure outcome");
        };
        assert!(error.to_string().contains("non-finite value in output at y"));
    }

    #[test]
    fn panicking_parser_is_contained_on_every_entry_point() {
        let engine = engine();
        let params = json!({"x": 1e308});
        for err in [
            engine.validate("fragile", &params).unwrap_err(),
            engine.calculate("fragile", &params).unwrap_err(),
        ] {
            assert_eq!(err.kind(), "execution");
            assert!(err.to_string().contains("fragile cannot parse"), "{err}");
        }
        let response = engine.benchmark("fragile", &params).unwrap();
        assert!(!response.validation.valid);
        assert!(matches!(response.outcome, BenchmarkOutcome::Failed { .. }));
    }

    #[test]
    fn benchmark_can_be_disabled() {
        let registry = Registry::new(vec![Box::new(Doubler)]).unwrap();
        let config = EngineConfig {
            benchmark_enabled: false,
            ..EngineConfig::default()
        };
        let engine = Engine::with_config(Arc::new(registry), config);
        let err = engine.benchmark("doubler", &json!({"x": 1.0})).unwrap_err();
        assert_eq!(err.kind(), "benchmark_disabled");
    }

    #[test]
    fn validate_is_idempotent() {
        let engine = engine();
        let params = json!({"x": "not a number"});
        let first = engine.validate("doubler", &params).unwrap();
        let second = engine.validate("doubler", &params).unwrap();
        assert_eq!(first, second);
        assert!(!first.validation.valid);
    }

    #[test]
    fn engines_share_one_registry_across_threads() {
        let engine = engine();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let engine = engine.clone();
                std::thread::spawn(move || {
                    engine
                        .calculate("doubler", &json!({"x": f64::from(i) + 1.0}))
                        .map(|r| r.result.result["y"].as_f64())
                })
            })
            .collect();
        let mut ys: Vec<f64> = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap().unwrap())
            .collect();
        ys.sort_by(f64::total_cmp);
        assert_eq!(ys, vec![2.0, 4.0, 6.0, 8.0]);
    }
}
