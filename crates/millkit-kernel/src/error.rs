//! Error types for registry construction, algorithm execution and dispatch.

use crate::contract::ValidationIssue;
use millkit_numerics::NumericsError;
use serde::Serialize;
use serde_json::Value;

/// Registry construction failures. These stop start-up.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("duplicate algorithm id: {0}")]
    DuplicateId(String),

    #[error("algorithm `{name}` registered with an empty id")]
    EmptyId { name: String },
}

/// Failures raised inside an algorithm's `calculate`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AlgorithmError {
    /// The computed payload contains `NaN` or an infinity.
    #[error("non-finite value in output at {path}")]
    NonFinite { path: String },

    #[error("numerics: {0}")]
    Numerics(#[from] NumericsError),

    /// The input cannot be computed on; reached only through the benchmark path.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("output serialisation failed: {0}")]
    Serialization(String),
}

/// Structured, JSON-safe failures returned by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineError {
    #[error("unknown algorithm `{algorithm_id}`")]
    UnknownAlgorithm {
        algorithm_id: String,
        known_ids: Vec<String>,
    },

    #[error("validation failed for `{algorithm_id}` ({} issue(s))", .issues.len())]
    Validation {
        algorithm_id: String,
        issues: Vec<ValidationIssue>,
    },

    #[error("execution error in `{algorithm_id}`: {message}")]
    Execution {
        algorithm_id: String,
        message: String,
    },

    #[error("benchmark entry point is disabled by configuration")]
    BenchmarkDisabled { algorithm_id: String },
}

impl EngineError {
    pub fn algorithm_id(&self) -> &str {
        match self {
            Self::UnknownAlgorithm { algorithm_id, .. }
            | Self::Validation { algorithm_id, .. }
            | Self::Execution { algorithm_id, .. }
            | Self::BenchmarkDisabled { algorithm_id } => algorithm_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownAlgorithm { .. } => "unknown_algorithm",
            Self::Validation { .. } => "validation",
            Self::Execution { .. } => "execution",
            Self::BenchmarkDisabled { .. } => "benchmark_disabled",
        }
    }

    /// `{"error": {"kind": ..., "algorithm_id": ..., "message": ..., ...}}`
    pub fn to_envelope(&self) -> Value {
        let mut body = serde_json::to_value(self).unwrap_or_else(|_| {
            serde_json::json!({"kind": self.kind(), "algorithm_id": self.algorithm_id()})
        });
        if let Some(map) = body.as_object_mut() {
            map.insert("message".to_string(), Value::String(self.to_string()));
        }
        serde_json::json!({ "error": body })
    }
}

/// Engine configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid engine config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid engine config value: {0}")]
    Value(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_algorithm_envelope_lists_known_ids() {
        let err = EngineError::UnknownAlgorithm {
            algorithm_id: "nope".into(),
            known_ids: vec!["fft".into(), "tsp".into()],
        };
        assert_eq!(
            err.to_envelope(),
            json!({
                "error": {
                    "kind": "unknown_algorithm",
                    "algorithm_id": "nope",
                    "known_ids": ["fft", "tsp"],
                    "message": "unknown algorithm `nope`"
                }
            })
        );
    }

    #[test]
    fn validation_message_counts_issues() {
        let err = EngineError::Validation {
            algorithm_id: "kienzle_force".into(),
            issues: vec![ValidationIssue::error("feed", "is required")],
        };
        assert_eq!(
            err.to_string(),
            "validation failed for `kienzle_force` (1 issue(s))"
        );
        assert_eq!(err.kind(), "validation");
    }
}
