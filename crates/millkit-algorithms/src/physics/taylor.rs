//! Extended Taylor tool-life equation.

use millkit_kernel::{
    Algorithm, AlgorithmError, AlgorithmMeta, Domain, FieldSpec, ParamReader, ResultEnvelope,
    SafetyClass,
};
use serde::Serialize;
use serde_json::{Value, json};

/// Tool lives beyond this are reported at the cap.
const MAX_TOOL_LIFE_MIN: f64 = 1e9;

pub struct TaylorToolLife;

static META: AlgorithmMeta = AlgorithmMeta {
    id: "taylor_tool_life",
    name: "Taylor Tool Life",
    description: "Tool life at a cutting speed, and the speed that achieves a target life.",
    formula: "V · T^n · f^a · ap^b = C",
    reference: "Taylor, F. W. (1907). On the Art of Cutting Metals. Transactions of the ASME 28, 31-350.",
    safety_class: SafetyClass::Standard,
    domain: Domain::ManufacturingPhysics,
    inputs: &[
        FieldSpec::required("cutting_speed", "m/min", "cutting speed V"),
        FieldSpec::required("taylor_n", "-", "tool-life exponent n, 0.05-0.95"),
        FieldSpec::required("taylor_c", "m/min", "Taylor constant C, the speed for a one-minute life"),
        FieldSpec::optional("feed", "mm/rev", "feed for the extended form"),
        FieldSpec::optional("feed_exponent", "-", "a, default 0"),
        FieldSpec::optional("depth_of_cut", "mm", "depth for the extended form"),
        FieldSpec::optional("depth_exponent", "-", "b, default 0"),
        FieldSpec::optional("target_tool_life", "min", "solve for the speed giving this life"),
    ],
    outputs: &[
        FieldSpec::output("tool_life_min", "min", "predicted tool life T"),
        FieldSpec::output("tool_life_capped", "-", "true when T exceeded 1e9 min and was capped"),
        FieldSpec::output("speed_for_target_life", "m/min", "null without target_tool_life"),
    ],
};

#[derive(Debug, Clone)]
pub struct TaylorInput {
    speed: f64,
    n: f64,
    c: f64,
    feed_term: f64,
    depth_term: f64,
    target_life: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct TaylorOutput {
    pub tool_life_min: f64,
    pub tool_life_capped: bool,
    pub speed_for_target_life: Option<f64>,
}

/// `value^exponent` for an optional positive base paired with its exponent.
fn extension_term(
    params: &mut ParamReader<'_>,
    value_field: &str,
    exponent_field: &str,
) -> f64 {
    let value = params.maybe_f64(value_field);
    let exponent = params.maybe_f64(exponent_field);
    match (value, exponent) {
        (Some(v), Some(e)) => {
            let ok = params.ensure_positive(value_field, v) & params.ensure_range(exponent_field, e, 0.0, 2.0);
            if ok { v.powf(e) } else { 1.0 }
        }
        (None, Some(_)) => {
            params.error(value_field, format!("is required when {exponent_field} is given"));
            1.0
        }
        (Some(v), None) => {
            params.ensure_positive(value_field, v);
            1.0
        }
        (None, None) => 1.0,
    }
}

impl Algorithm for TaylorToolLife {
    type Input = TaylorInput;
    type Output = TaylorOutput;

    fn meta(&self) -> &'static AlgorithmMeta {
        &META
    }

    fn example(&self) -> Value {
        json!({
            "cutting_speed": 200.0,
            "taylor_n": 0.25,
            "taylor_c": 400.0,
            "target_tool_life": 30.0
        })
    }

    fn parse(&self, params: &mut ParamReader<'_>) -> TaylorInput {
        let speed = params.required_f64("cutting_speed");
        params.ensure_positive("cutting_speed", speed);
        let n = params.required_f64("taylor_n");
        params.ensure_range("taylor_n", n, 0.05, 0.95);
        let c = params.required_f64("taylor_c");
        params.ensure_positive("taylor_c", c);
        let feed_term = extension_term(params, "feed", "feed_exponent");
        let depth_term = extension_term(params, "depth_of_cut", "depth_exponent");
        let target_life = params.maybe_f64("target_tool_life");
        if let Some(t) = target_life {
            params.ensure_positive("target_tool_life", t);
        }
        if speed > 0.0 && c > 0.0 && speed > c {
            params.warning(
                "cutting_speed",
                "cutting speed exceeds the Taylor constant; tool life will be under one minute",
            );
        }
        TaylorInput {
            speed,
            n,
            c,
            feed_term,
            depth_term,
            target_life,
        }
    }

    fn calculate(&self, input: &TaylorInput) -> Result<ResultEnvelope<TaylorOutput>, AlgorithmError> {
        if !(input.speed > 0.0 && input.n > 0.0 && input.c > 0.0) {
            return Err(AlgorithmError::InvalidInput(
                "speed, n and C must be positive".into(),
            ));
        }
        let extension = input.feed_term * input.depth_term;
        let ln_life = (input.c / (input.speed * extension)).ln() / input.n;
        let cap = MAX_TOOL_LIFE_MIN.ln();
        let capped = ln_life > cap;
        let tool_life = ln_life.min(cap).exp();

        let speed_for_target = input
            .target_life
            .filter(|t| *t > 0.0)
            .map(|t| input.c / (t.powf(input.n) * extension));

        let mut warnings = Vec::new();
        if capped {
            warnings.push(format!(
                "tool life exceeds {MAX_TOOL_LIFE_MIN:e} min and was capped; the cutting speed is far below the fitted range"
            ));
        }
        Ok(ResultEnvelope::with_warnings(
            TaylorOutput {
                tool_life_min: tool_life,
                tool_life_capped: capped,
                speed_for_target_life: speed_for_target,
            },
            warnings,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{error_fields, parse, run};

    #[test]
    fn classic_form_and_inverse() {
        let out = run(&TaylorToolLife, TaylorToolLife.example()).result;
        assert!((out.tool_life_min - 16.0).abs() < 1e-9);
        let v = out.speed_for_target_life.unwrap();
        assert!((v - 400.0 / 30f64.powf(0.25)).abs() < 1e-9);
        assert!(!out.tool_life_capped);
    }

    #[test]
    fn life_falls_as_speed_rises() {
        let life = |v: f64| {
            run(&TaylorToolLife, json!({"cutting_speed": v, "taylor_n": 0.3, "taylor_c": 350.0}))
                .result
                .tool_life_min
        };
        assert!(life(150.0) > life(200.0));
        assert!(life(200.0) > life(300.0));
    }

    #[test]
    fn exponent_without_its_variable_is_an_error() {
        let (_, issues) = parse(
            &TaylorToolLife,
            json!({"cutting_speed": 100.0, "taylor_n": 0.25, "taylor_c": 300.0, "feed_exponent": 0.5}),
        );
        assert_eq!(error_fields(&issues), vec!["feed"]);
    }

    #[test]
    fn absurdly_slow_speed_is_capped_not_infinite() {
        let out = run(
            &TaylorToolLife,
            json!({"cutting_speed": 1e-6, "taylor_n": 0.05, "taylor_c": 1000.0}),
        );
        assert!(out.result.tool_life_capped);
        assert!(out.result.tool_life_min.is_finite());
        assert_eq!(out.warnings.len(), 1);
    }
}
