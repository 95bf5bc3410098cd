//! Two-input Mamdani fuzzy controller (error, error rate → correction).
//!
//! Each universe `[−r, r]` is split into five evenly spaced triangular sets
//! NB, NS, ZE, PS, PB. The rule base is the usual diagonal PD table: the
//! output set index is the sum of the input set indices, shifted and clamped.

use millkit_kernel::{
    Algorithm, AlgorithmError, AlgorithmMeta, Domain, FieldSpec, ParamReader, ResultEnvelope,
    SafetyClass,
};
use serde::Serialize;
use serde_json::{Value, json};

pub const LABELS: [&str; 5] = ["NB", "NS", "ZE", "PS", "PB"];
const RESOLUTION: usize = 201;

pub struct FuzzyController;

static META: AlgorithmMeta = AlgorithmMeta {
    id: "fuzzy_controller",
    name: "Fuzzy Logic Controller",
    description: "Mamdani inference over error and error rate with five triangular sets per variable, min-max composition and centroid defuzzification.",
    formula: "μ_rule = min(μ_E(e), μ_DE(ė)),  μ_out(y) = max_rules min(μ_rule, μ_U(y)),  u = ∫ y μ_out dy / ∫ μ_out dy",
    reference: "Mamdani, E. H., Assilian, S. (1975). An experiment in linguistic synthesis with a fuzzy logic controller. International Journal of Man-Machine Studies 7(1), 1-13.",
    safety_class: SafetyClass::Standard,
    domain: Domain::SignalControl,
    inputs: &[
        FieldSpec::required("error", "-", "setpoint minus measurement"),
        FieldSpec::required("error_rate", "1/s", "time derivative of the error"),
        FieldSpec::optional("error_range", "-", "r_e, error universe is [−r_e, r_e], default 1"),
        FieldSpec::optional("error_rate_range", "1/s", "r_de, default 1"),
        FieldSpec::optional("output_range", "-", "r_u, output universe, default 1"),
    ],
    outputs: &[
        FieldSpec::output("output", "-", "defuzzified control correction"),
        FieldSpec::output("error_memberships", "-", "degree in NB..PB"),
        FieldSpec::output("error_rate_memberships", "-", "degree in NB..PB"),
        FieldSpec::output("output_strengths", "-", "aggregated firing per output set"),
        FieldSpec::output("activated_rules", "-", "rules with non-zero firing strength"),
    ],
};

#[derive(Debug, Clone)]
pub struct FuzzyInput {
    error: f64,
    error_rate: f64,
    error_range: f64,
    rate_range: f64,
    output_range: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FiredRule {
    pub error_set: &'static str,
    pub error_rate_set: &'static str,
    pub output_set: &'static str,
    pub strength: f64,
}

#[derive(Debug, Serialize)]
pub struct FuzzyOutput {
    pub output: f64,
    pub error_memberships: [f64; 5],
    pub error_rate_memberships: [f64; 5],
    pub output_strengths: [f64; 5],
    pub activated_rules: Vec<FiredRule>,
}

fn triangle(x: f64, centre: f64, half_width: f64) -> f64 {
    (1.0 - (x - centre).abs() / half_width).max(0.0)
}

/// Memberships of `x` in the five sets over `[−range, range]`.
pub fn memberships(x: f64, range: f64) -> [f64; 5] {
    let half = range / 2.0;
    let x = x.clamp(-range, range);
    std::array::from_fn(|i| triangle(x, -range + i as f64 * half, half))
}

fn rule_output(error_set: usize, rate_set: usize) -> usize {
    (error_set + rate_set).saturating_sub(2).min(4)
}

impl Algorithm for FuzzyController {
    type Input = FuzzyInput;
    type Output = FuzzyOutput;

    fn meta(&self) -> &'static AlgorithmMeta {
        &META
    }

    fn example(&self) -> Value {
        json!({
            "error": 0.4,
            "error_rate": -0.1,
            "error_range": 1.0,
            "error_rate_range": 0.5,
            "output_range": 10.0
        })
    }

    fn parse(&self, params: &mut ParamReader<'_>) -> FuzzyInput {
        let error = params.required_f64("error");
        let error_rate = params.required_f64("error_rate");
        let error_range = params.optional_f64("error_range", 1.0);
        params.ensure_positive("error_range", error_range);
        let rate_range = params.optional_f64("error_rate_range", 1.0);
        params.ensure_positive("error_rate_range", rate_range);
        let output_range = params.optional_f64("output_range", 1.0);
        params.ensure_positive("output_range", output_range);

        if !params.failed("error_range") && error.abs() > error_range {
            params.warning("error", "outside the universe; clamped to its edge");
        }
        if !params.failed("error_rate_range") && error_rate.abs() > rate_range {
            params.warning("error_rate", "outside the universe; clamped to its edge");
        }
        FuzzyInput {
            error,
            error_rate,
            error_range,
            rate_range,
            output_range,
        }
    }

    fn calculate(
        &self,
        input: &FuzzyInput,
    ) -> Result<ResultEnvelope<FuzzyOutput>, AlgorithmError> {
        if input.error_range <= 0.0 || input.rate_range <= 0.0 || input.output_range <= 0.0 {
            return Err(AlgorithmError::InvalidInput(
                "universe ranges must be positive".into(),
            ));
        }
        let mu_e = memberships(input.error, input.error_range);
        let mu_de = memberships(input.error_rate, input.rate_range);

        let mut strengths = [0.0_f64; 5];
        let mut fired = Vec::new();
        for (i, &a) in mu_e.iter().enumerate() {
            for (j, &b) in mu_de.iter().enumerate() {
                let strength = a.min(b);
                if strength <= 0.0 {
                    continue;
                }
                let k = rule_output(i, j);
                strengths[k] = strengths[k].max(strength);
                fired.push(FiredRule {
                    error_set: LABELS[i],
                    error_rate_set: LABELS[j],
                    output_set: LABELS[k],
                    strength,
                });
            }
        }

        let r = input.output_range;
        let half = r / 2.0;
        let (mut moment, mut area) = (0.0, 0.0);
        for s in 0..RESOLUTION {
            let y = -r + 2.0 * r * s as f64 / (RESOLUTION - 1) as f64;
            let mu = strengths
                .iter()
                .enumerate()
                .map(|(k, &w)| w.min(triangle(y, -r + k as f64 * half, half)))
                .fold(0.0, f64::max);
            moment += y * mu;
            area += mu;
        }
        let output = if area > 0.0 { moment / area } else { 0.0 };

        Ok(ResultEnvelope::new(FuzzyOutput {
            output,
            error_memberships: mu_e,
            error_rate_memberships: mu_de,
            output_strengths: strengths,
            activated_rules: fired,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::run;

    fn output(error: f64, rate: f64) -> f64 {
        run(&FuzzyController, json!({"error": error, "error_rate": rate}))
            .result
            .output
    }

    #[test]
    fn memberships_form_a_partition() {
        for x in [-1.0, -0.7, -0.25, 0.0, 0.1, 0.5, 0.99] {
            let total: f64 = memberships(x, 1.0).iter().sum();
            assert!((total - 1.0).abs() < 1e-12, "x = {x}");
        }
    }

    #[test]
    fn zero_error_gives_zero_output() {
        assert!(output(0.0, 0.0).abs() < 1e-12);
    }

    #[test]
    fn surface_is_odd_symmetric_and_monotone() {
        for (e, de) in [(0.3, 0.1), (0.8, -0.2), (-0.5, 0.4)] {
            assert!((output(e, de) + output(-e, -de)).abs() < 1e-9);
        }
        assert!(output(0.2, 0.0) < output(0.6, 0.0));
        assert!(output(1.0, 1.0) > 0.8);
    }

    #[test]
    fn out_of_universe_input_is_clamped() {
        let out = run(&FuzzyController, json!({"error": 3.0, "error_rate": 0.0}));
        assert_eq!(out.result.error_memberships, [0.0, 0.0, 0.0, 0.0, 1.0]);
        assert_eq!(out.result.activated_rules.len(), 1);
        assert_eq!(out.result.activated_rules[0].output_set, "PB");
    }
}
