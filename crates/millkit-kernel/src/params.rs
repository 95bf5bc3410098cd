//! Parsing the untyped parameter map into typed inputs.
//!
//! A [`ParamReader`] hands out values and records problems as it goes. It
//! never stops at the first problem: a missing field yields a neutral value
//! (`0.0`, an empty vector) and an error issue, and parsing carries on so the
//! caller sees every violation at once. Range checks on a field that already
//! failed are skipped so one mistake is reported once.

use crate::contract::{Severity, ValidationIssue};
use serde_json::{Map, Value};

/// The flat, JSON-compatible parameter map every call receives.
pub type Params = Map<String, Value>;

/// Largest magnitude any numeric parameter may take.
pub const MAX_MAGNITUDE: f64 = 1e12;

/// Smallest value a strictly positive quantity may take.
pub const MIN_POSITIVE: f64 = 1e-12;

/// Finite and within `±MAX_MAGNITUDE`.
pub fn in_numeric_range(x: f64) -> bool {
    x.is_finite() && x.abs() <= MAX_MAGNITUDE
}

fn bounded(value: &Value) -> Option<f64> {
    value.as_f64().filter(|x| in_numeric_range(*x))
}

pub struct ParamReader<'a> {
    params: &'a Params,
    issues: Vec<ValidationIssue>,
}

impl<'a> ParamReader<'a> {
    pub fn new(params: &'a Params) -> Self {
        Self {
            params,
            issues: Vec::new(),
        }
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    pub fn into_issues(self) -> Vec<ValidationIssue> {
        self.issues
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    /// Whether `field` already carries an error issue.
    pub fn failed(&self, field: &str) -> bool {
        self.issues
            .iter()
            .any(|i| i.severity == Severity::Error && i.field == field)
    }

    pub fn has(&self, field: &str) -> bool {
        self.params.get(field).is_some_and(|v| !v.is_null())
    }

    pub fn raw(&self, field: &str) -> Option<&'a Value> {
        self.params.get(field).filter(|v| !v.is_null())
    }

    pub fn error(&mut self, field: &str, message: impl Into<String>) {
        self.issues.push(ValidationIssue::error(field, message));
    }

    pub fn warning(&mut self, field: &str, message: impl Into<String>) {
        self.issues.push(ValidationIssue::warning(field, message));
    }

    // ─── Scalars ────────────────────────────────────────────────────────

    pub fn required_f64(&mut self, field: &str) -> f64 {
        match self.raw(field) {
            None => {
                self.error(field, "is required");
                0.0
            }
            Some(v) => self.number(field, v).unwrap_or(0.0),
        }
    }

    pub fn optional_f64(&mut self, field: &str, default: f64) -> f64 {
        match self.raw(field) {
            None => default,
            Some(v) => self.number(field, v).unwrap_or(default),
        }
    }

    /// `None` when absent; a type error is still recorded.
    pub fn maybe_f64(&mut self, field: &str) -> Option<f64> {
        let v = self.raw(field)?;
        self.number(field, v)
    }

    pub fn required_usize(&mut self, field: &str) -> usize {
        match self.raw(field) {
            None => {
                self.error(field, "is required");
                0
            }
            Some(v) => self.count(field, v).unwrap_or(0),
        }
    }

    pub fn optional_usize(&mut self, field: &str, default: usize) -> usize {
        match self.raw(field) {
            None => default,
            Some(v) => self.count(field, v).unwrap_or(default),
        }
    }

    /// Seeds accept any non-negative integer that fits in `u64`.
    pub fn optional_u64(&mut self, field: &str, default: u64) -> u64 {
        match self.raw(field) {
            None => default,
            Some(v) => match v.as_u64() {
                Some(n) => n,
                None => {
                    self.error(field, "must be a non-negative integer");
                    default
                }
            },
        }
    }

    pub fn optional_bool(&mut self, field: &str, default: bool) -> bool {
        match self.raw(field) {
            None => default,
            Some(Value::Bool(b)) => *b,
            Some(_) => {
                self.error(field, "must be a boolean");
                default
            }
        }
    }

    pub fn optional_str(&mut self, field: &str, default: &str) -> String {
        match self.raw(field) {
            None => default.to_string(),
            Some(Value::String(s)) => s.trim().to_string(),
            Some(_) => {
                self.error(field, "must be a string");
                default.to_string()
            }
        }
    }

    /// A string restricted to `allowed`; returns the matching static name.
    pub fn choice(
        &mut self,
        field: &str,
        allowed: &[&'static str],
        default: &'static str,
    ) -> &'static str {
        let value = self.optional_str(field, default).to_ascii_lowercase();
        match allowed.iter().find(|a| **a == value) {
            Some(found) => *found,
            None => {
                if !self.failed(field) {
                    self.error(
                        field,
                        format!("must be one of: {}", allowed.join(", ")),
                    );
                }
                default
            }
        }
    }

    // ─── Arrays ─────────────────────────────────────────────────────────

    pub fn required_f64_array(&mut self, field: &str) -> Vec<f64> {
        match self.raw(field) {
            None => {
                self.error(field, "is required");
                Vec::new()
            }
            Some(v) => self.number_array(field, v).unwrap_or_default(),
        }
    }

    pub fn optional_f64_array(&mut self, field: &str) -> Option<Vec<f64>> {
        let v = self.raw(field)?;
        self.number_array(field, v)
    }

    /// An array of numeric arrays. Rows may be ragged; use
    /// [`ensure_rectangular`](Self::ensure_rectangular) when they must not be.
    pub fn required_matrix(&mut self, field: &str) -> Vec<Vec<f64>> {
        match self.raw(field) {
            None => {
                self.error(field, "is required");
                Vec::new()
            }
            Some(v) => self.number_matrix(field, v).unwrap_or_default(),
        }
    }

    pub fn optional_matrix(&mut self, field: &str) -> Option<Vec<Vec<f64>>> {
        let v = self.raw(field)?;
        self.number_matrix(field, v)
    }

    pub fn required_array(&mut self, field: &str) -> &'a [Value] {
        match self.raw(field) {
            None => {
                self.error(field, "is required");
                &[]
            }
            Some(Value::Array(items)) => items,
            Some(_) => {
                self.error(field, "must be an array");
                &[]
            }
        }
    }

    // ─── Checks ─────────────────────────────────────────────────────────

    /// Record `message` against `field` unless `ok` or the field already failed.
    pub fn ensure(&mut self, field: &str, ok: bool, message: impl Into<String>) -> bool {
        if ok || self.failed(field) {
            return ok;
        }
        self.error(field, message);
        false
    }

    pub fn ensure_positive(&mut self, field: &str, value: f64) -> bool {
        if !self.ensure(field, value > 0.0, "must be greater than zero") {
            return false;
        }
        self.ensure(
            field,
            value >= MIN_POSITIVE,
            format!("must be at least {MIN_POSITIVE:e}"),
        )
    }

    pub fn ensure_non_negative(&mut self, field: &str, value: f64) -> bool {
        self.ensure(field, value >= 0.0, "must not be negative")
    }

    pub fn ensure_range(&mut self, field: &str, value: f64, low: f64, high: f64) -> bool {
        self.ensure(
            field,
            (low..=high).contains(&value),
            format!("must be between {low} and {high}"),
        )
    }

    pub fn ensure_count(&mut self, field: &str, value: usize, low: usize, high: usize) -> bool {
        self.ensure(
            field,
            (low..=high).contains(&value),
            format!("must be between {low} and {high}"),
        )
    }

    pub fn ensure_len(&mut self, field: &str, len: usize, expected: usize) -> bool {
        self.ensure(
            field,
            len == expected,
            format!("must have {expected} entries, got {len}"),
        )
    }

    pub fn ensure_min_len(&mut self, field: &str, len: usize, min: usize) -> bool {
        self.ensure(
            field,
            len >= min,
            format!("must have at least {min} entries, got {len}"),
        )
    }

    /// Every row has `cols` entries.
    pub fn ensure_rectangular(&mut self, field: &str, rows: &[Vec<f64>], cols: usize) -> bool {
        match rows.iter().position(|r| r.len() != cols) {
            None => true,
            Some(i) => self.ensure(
                field,
                false,
                format!("row {i} must have {cols} entries, got {}", rows[i].len()),
            ),
        }
    }

    // ─── Conversions ────────────────────────────────────────────────────

    fn number(&mut self, field: &str, value: &Value) -> Option<f64> {
        match bounded(value) {
            Some(x) => Some(x),
            None => {
                self.error(field, format!("must be a finite number within ±{MAX_MAGNITUDE:e}"));
                None
            }
        }
    }

    fn count(&mut self, field: &str, value: &Value) -> Option<usize> {
        let n = value.as_f64().filter(|x| x.is_finite());
        match n {
            Some(x) if x >= 0.0 && x.fract() == 0.0 && x <= usize::MAX as f64 => Some(x as usize),
            _ => {
                self.error(field, "must be a non-negative integer");
                None
            }
        }
    }

    fn number_array(&mut self, field: &str, value: &Value) -> Option<Vec<f64>> {
        let Some(items) = value.as_array() else {
            self.error(field, "must be an array of numbers");
            return None;
        };
        let parsed: Option<Vec<f64>> = items
            .iter()
            .map(bounded)
            .collect();
        if parsed.is_none() {
            self.error(
                field,
                format!("must contain only finite numbers within ±{MAX_MAGNITUDE:e}"),
            );
        }
        parsed
    }

    fn number_matrix(&mut self, field: &str, value: &Value) -> Option<Vec<Vec<f64>>> {
        let Some(rows) = value.as_array() else {
            self.error(field, "must be an array of numeric arrays");
            return None;
        };
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let parsed: Option<Vec<f64>> = row.as_array().and_then(|cells| {
                cells.iter().map(bounded).collect()
            });
            match parsed {
                Some(r) => out.push(r),
                None => {
                    self.error(field, "must be an array of numeric arrays");
                    return None;
                }
            }
        }
        Some(out)
    }
}

/// Read a numeric array out of an arbitrary JSON value (for nested records).
pub fn as_f64_vec(value: &Value) -> Option<Vec<f64>> {
    value.as_array()?.iter().map(bounded).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn missing_fields_are_all_reported() {
        let p = params(json!({}));
        let mut r = ParamReader::new(&p);
        let a = r.required_f64("a");
        let b = r.required_f64_array("b");
        assert_eq!(a, 0.0);
        assert!(b.is_empty());
        let fields: Vec<&str> = r.issues().iter().map(|i| i.field.as_str()).collect();
        assert_eq!(fields, vec!["a", "b"]);
    }

    #[test]
    fn failed_field_is_not_double_reported() {
        let p = params(json!({}));
        let mut r = ParamReader::new(&p);
        let d = r.required_f64("diameter");
        r.ensure_positive("diameter", d);
        assert_eq!(r.issues().len(), 1);
    }

    #[test]
    fn type_errors_are_reported() {
        let p = params(json!({"n": 2.5, "xs": [1, "two"], "flag": "yes", "m": [[1, 2], 3]}));
        let mut r = ParamReader::new(&p);
        assert_eq!(r.optional_usize("n", 4), 4);
        assert!(r.optional_f64_array("xs").is_none());
        assert!(r.optional_bool("flag", true));
        assert!(r.optional_matrix("m").is_none());
        assert_eq!(r.issues().len(), 4);
        assert!(r.has_errors());
    }

    #[test]
    fn choice_is_case_insensitive() {
        let p = params(json!({"method": "Linear", "window": "boxcar"}));
        let mut r = ParamReader::new(&p);
        assert_eq!(r.choice("method", &["linear", "cubic"], "cubic"), "linear");
        assert_eq!(r.choice("window", &["hann", "none"], "none"), "none");
        assert_eq!(r.issues().len(), 1);
        assert_eq!(r.issues()[0].field, "window");
    }

    #[test]
    fn rectangular_check_names_the_row() {
        let p = params(json!({}));
        let mut r = ParamReader::new(&p);
        let rows = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(!r.ensure_rectangular("times", &rows, 2));
        assert!(r.issues()[0].message.contains("row 1"));
    }

    #[test]
    fn magnitudes_are_bounded() {
        let p = params(json!({"big": 1e300, "tiny": 1e-300, "ok": 2e11, "row": [1.0, -1e13]}));
        let mut r = ParamReader::new(&p);
        assert_eq!(r.maybe_f64("big"), None);
        let tiny = r.required_f64("tiny");
        assert!(!r.ensure_positive("tiny", tiny));
        let ok = r.required_f64("ok");
        assert!(r.ensure_positive("ok", ok));
        assert!(r.optional_f64_array("row").is_none());
        let fields: Vec<&str> = r.issues().iter().map(|i| i.field.as_str()).collect();
        assert_eq!(fields, vec!["big", "tiny", "row"]);
    }

    #[test]
    fn null_counts_as_absent() {
        let p = params(json!({"seed": null}));
        let mut r = ParamReader::new(&p);
        assert_eq!(r.optional_u64("seed", 42), 42);
        assert!(!r.has("seed"));
        assert!(r.issues().is_empty());
    }
}
