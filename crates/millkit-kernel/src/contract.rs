//! The algorithm contract and its result types.

use crate::error::AlgorithmError;
use crate::finite::find_non_finite;
use crate::params::{ParamReader, Params};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Whether a wrong answer can hurt people or machines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyClass {
    Standard,
    SafetyCritical,
}

/// Algorithm family tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    ManufacturingPhysics,
    Optimization,
    SignalControl,
    Combinatorial,
    NumericLearning,
}

impl Domain {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ManufacturingPhysics => "manufacturing_physics",
            Self::Optimization => "optimization",
            Self::SignalControl => "signal_control",
            Self::Combinatorial => "combinatorial",
            Self::NumericLearning => "numeric_learning",
        }
    }
}

/// Human-readable descriptor of one input or output field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub unit: &'static str,
    pub description: &'static str,
    pub required: bool,
}

impl FieldSpec {
    pub const fn required(name: &'static str, unit: &'static str, description: &'static str) -> Self {
        Self {
            name,
            unit,
            description,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, unit: &'static str, description: &'static str) -> Self {
        Self {
            name,
            unit,
            description,
            required: false,
        }
    }

    /// Output descriptors are always present in the result.
    pub const fn output(name: &'static str, unit: &'static str, description: &'static str) -> Self {
        Self::required(name, unit, description)
    }
}

/// Static self-description attached one-to-one with each algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AlgorithmMeta {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub formula: &'static str,
    pub reference: &'static str,
    pub safety_class: SafetyClass,
    pub domain: Domain,
    pub inputs: &'static [FieldSpec],
    pub outputs: &'static [FieldSpec],
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
    pub severity: Severity,
}

impl ValidationIssue {
    pub fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: Severity::Error,
        }
    }

    pub fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: Severity::Warning,
        }
    }
}

/// Verdict of one validation pass. `valid` iff no issue is an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Issues keep the order they were found in.
    pub fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        let valid = !issues.iter().any(|i| i.severity == Severity::Error);
        Self { valid, issues }
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
    }
}

/// A typed payload plus the non-fatal advisories raised while computing it.
///
/// The payload is flattened, so `{"makespan": 7.0, "warnings": []}` rather
/// than a nested `result` object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultEnvelope<T> {
    #[serde(flatten)]
    pub result: T,
    pub warnings: Vec<String>,
}

impl<T> ResultEnvelope<T> {
    pub fn new(result: T) -> Self {
        Self {
            result,
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(result: T, warnings: Vec<String>) -> Self {
        Self { result, warnings }
    }
}

/// The typed side of the contract, implemented by every algorithm.
///
/// `parse` must always produce an input, substituting neutral values for
/// anything missing or malformed, and record each problem on the reader.
/// The engine calls `calculate` only when the reader collected no errors;
/// the benchmark path calls it regardless, so `calculate` should degrade
/// into an [`AlgorithmError`] rather than panic on nonsense input.
pub trait Algorithm: Send + Sync + 'static {
    type Input;
    type Output: Serialize;

    fn meta(&self) -> &'static AlgorithmMeta;

    /// A known-good parameter map, shown by `describe` and used in tests.
    fn example(&self) -> Value;

    fn parse(&self, params: &mut ParamReader<'_>) -> Self::Input;

    fn calculate(
        &self,
        input: &Self::Input,
    ) -> Result<ResultEnvelope<Self::Output>, AlgorithmError>;
}

/// Object-safe contract stored in the registry.
pub trait DynAlgorithm: Send + Sync {
    fn describe(&self) -> &'static AlgorithmMeta;

    fn example(&self) -> Value;

    /// Pure and idempotent: every issue, in one pass.
    fn validate(&self, params: &Params) -> ValidationResult;

    /// Compute without consulting `validate`. Output is scanned for
    /// non-finite values before it is serialised.
    fn calculate(&self, params: &Params) -> Result<ResultEnvelope<Value>, AlgorithmError>;
}

impl<A: Algorithm> DynAlgorithm for A {
    fn describe(&self) -> &'static AlgorithmMeta {
        self.meta()
    }

    fn example(&self) -> Value {
        Algorithm::example(self)
    }

    fn validate(&self, params: &Params) -> ValidationResult {
        let mut reader = ParamReader::new(params);
        let _ = self.parse(&mut reader);
        ValidationResult::from_issues(reader.into_issues())
    }

    fn calculate(&self, params: &Params) -> Result<ResultEnvelope<Value>, AlgorithmError> {
        let mut reader = ParamReader::new(params);
        let input = self.parse(&mut reader);
        let envelope = Algorithm::calculate(self, &input)?;
        if let Some(path) = find_non_finite(&envelope.result) {
            return Err(AlgorithmError::NonFinite { path });
        }
        let result = serde_json::to_value(&envelope.result)
            .map_err(|e| AlgorithmError::Serialization(e.to_string()))?;
        if !result.is_object() {
            return Err(AlgorithmError::Serialization(
                "algorithm output must serialise to a JSON object".into(),
            ));
        }
        Ok(ResultEnvelope::with_warnings(result, envelope.warnings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn warnings_do_not_invalidate() {
        let result = ValidationResult::from_issues(vec![ValidationIssue::warning(
            "seed",
            "defaulted",
        )]);
        assert!(result.valid);
        assert_eq!(result.warnings().count(), 1);
        assert_eq!(result.errors().count(), 0);
    }

    #[test]
    fn any_error_invalidates() {
        let result = ValidationResult::from_issues(vec![
            ValidationIssue::warning("a", "w"),
            ValidationIssue::error("b", "e"),
        ]);
        assert!(!result.valid);
        assert_eq!(result.issues[0].field, "a");
    }

    #[test]
    fn envelope_flattens_payload() {
        #[derive(Serialize)]
        struct Out {
            force: f64,
        }
        let env = ResultEnvelope::with_warnings(Out { force: 12.5 }, vec!["w".into()]);
        assert_eq!(
            serde_json::to_value(&env).unwrap(),
            json!({"force": 12.5, "warnings": ["w"]})
        );
    }

    #[test]
    fn issue_serialises_snake_case_severity() {
        insta::assert_json_snapshot!(ValidationIssue::error("feed", "is required"), @r#"
        {
          "field": "feed",
          "message": "is required",
          "severity": "error"
        }
        "#);
    }
}
