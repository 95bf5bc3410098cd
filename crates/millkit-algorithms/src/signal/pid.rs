//! Closed-loop PID simulation against a first-order plant.

use millkit_kernel::{
    Algorithm, AlgorithmError, AlgorithmMeta, Domain, FieldSpec, ParamReader, ResultEnvelope,
    SafetyClass,
};
use serde::Serialize;
use serde_json::{Value, json};

const MAX_STEPS: usize = 200_000;
/// Settling band as a fraction of the step size.
const SETTLING_BAND: f64 = 0.02;

/// Output magnitude treated as a runaway loop.
const DIVERGENCE_LIMIT: f64 = 1e150;

pub struct PidController;

static META: AlgorithmMeta = AlgorithmMeta {
    id: "pid_controller",
    name: "PID Controller",
    description: "Simulates a PID loop on a first-order plant with output limits and anti-windup, and reports the step-response metrics.",
    formula: "u = Kp e + Ki ∫e dt − Kd dy/dt,  y[k+1] = a y[k] + K (1 − a) u[k],  a = e^{−Δt/τ}",
    reference: "Åström, K. J., Hägglund, T. (2006). Advanced PID Control. ISA.",
    safety_class: SafetyClass::Standard,
    domain: Domain::SignalControl,
    inputs: &[
        FieldSpec::required("kp", "-", "proportional gain"),
        FieldSpec::optional("ki", "1/s", "integral gain, default 0"),
        FieldSpec::optional("kd", "s", "derivative gain, default 0"),
        FieldSpec::required("setpoint", "-", "target output"),
        FieldSpec::optional("initial_output", "-", "plant output at t = 0, default 0"),
        FieldSpec::optional("plant_gain", "-", "K, steady-state plant gain, default 1"),
        FieldSpec::optional("time_constant", "s", "τ, plant time constant, default 1"),
        FieldSpec::optional("dt", "s", "sample period, default 0.01"),
        FieldSpec::optional("duration", "s", "simulated time, default 10"),
        FieldSpec::optional("output_min", "-", "lower actuator limit"),
        FieldSpec::optional("output_max", "-", "upper actuator limit"),
    ],
    outputs: &[
        FieldSpec::output("time", "s", "sample times"),
        FieldSpec::output("output", "-", "plant output per sample"),
        FieldSpec::output("control", "-", "actuator command per sample"),
        FieldSpec::output("final_value", "-", "last plant output"),
        FieldSpec::output("steady_state_error", "-", "setpoint − final_value"),
        FieldSpec::output("overshoot_percent", "%", "peak excursion past the setpoint"),
        FieldSpec::output("rise_time", "s", "10 % to 90 % of the step, null if never reached"),
        FieldSpec::output("settling_time", "s", "entry into the ±2 % band for good, null if never"),
        FieldSpec::output("saturated_fraction", "-", "share of samples at an actuator limit"),
    ],
};

#[derive(Debug, Clone)]
pub struct PidInput {
    kp: f64,
    ki: f64,
    kd: f64,
    setpoint: f64,
    y0: f64,
    plant_gain: f64,
    tau: f64,
    dt: f64,
    steps: usize,
    limits: (f64, f64),
}

#[derive(Debug, Serialize)]
pub struct PidOutput {
    pub time: Vec<f64>,
    pub output: Vec<f64>,
    pub control: Vec<f64>,
    pub final_value: f64,
    pub steady_state_error: f64,
    pub overshoot_percent: f64,
    pub rise_time: Option<f64>,
    pub settling_time: Option<f64>,
    pub saturated_fraction: f64,
}

#[derive(Debug, Default)]
struct StepMetrics {
    overshoot_percent: f64,
    rise_time: Option<f64>,
    settling_time: Option<f64>,
}

fn step_metrics(time: &[f64], output: &[f64], y0: f64, setpoint: f64) -> StepMetrics {
    let step = setpoint - y0;
    if step.abs() < f64::EPSILON || output.is_empty() {
        return StepMetrics::default();
    }
    // Progress along the step, 0 at the start and 1 at the setpoint.
    let progress = |y: f64| (y - y0) / step;

    let peak = output.iter().map(|&y| progress(y)).fold(f64::MIN, f64::max);
    let overshoot_percent = ((peak - 1.0) * 100.0).max(0.0);

    let first_at = |level: f64| {
        output
            .iter()
            .position(|&y| progress(y) >= level)
            .map(|i| time[i])
    };
    let rise_time = match (first_at(0.1), first_at(0.9)) {
        (Some(t10), Some(t90)) => Some(t90 - t10),
        _ => None,
    };

    let band = SETTLING_BAND * step.abs();
    let settling_time = match output.iter().rposition(|&y| (y - setpoint).abs() > band) {
        None => Some(0.0),
        Some(last) if last + 1 < output.len() => Some(time[last + 1]),
        Some(_) => None,
    };
    StepMetrics {
        overshoot_percent,
        rise_time,
        settling_time,
    }
}

impl Algorithm for PidController {
    type Input = PidInput;
    type Output = PidOutput;

    fn meta(&self) -> &'static AlgorithmMeta {
        &META
    }

    fn example(&self) -> Value {
        json!({
            "kp": 2.0,
            "ki": 1.0,
            "kd": 0.1,
            "setpoint": 1.0,
            "time_constant": 1.0,
            "dt": 0.01,
            "duration": 15.0,
            "output_min": 0.0,
            "output_max": 5.0
        })
    }

    fn parse(&self, params: &mut ParamReader<'_>) -> PidInput {
        let kp = params.required_f64("kp");
        params.ensure_non_negative("kp", kp);
        let ki = params.optional_f64("ki", 0.0);
        params.ensure_non_negative("ki", ki);
        let kd = params.optional_f64("kd", 0.0);
        params.ensure_non_negative("kd", kd);
        let setpoint = params.required_f64("setpoint");
        let y0 = params.optional_f64("initial_output", 0.0);
        let plant_gain = params.optional_f64("plant_gain", 1.0);
        params.ensure("plant_gain", plant_gain != 0.0, "must not be zero");
        let tau = params.optional_f64("time_constant", 1.0);
        params.ensure_positive("time_constant", tau);
        let dt = params.optional_f64("dt", 0.01);
        params.ensure_positive("dt", dt);
        let duration = params.optional_f64("duration", 10.0);
        params.ensure_positive("duration", duration);

        let mut steps = 0;
        if !params.failed("dt") && !params.failed("duration") {
            let n = (duration / dt).round();
            if params.ensure(
                "duration",
                n >= 1.0 && n <= MAX_STEPS as f64,
                format!("duration / dt must give between 1 and {MAX_STEPS} steps"),
            ) {
                steps = n as usize;
            }
        }

        let low = params.maybe_f64("output_min").unwrap_or(f64::NEG_INFINITY);
        let high = params.maybe_f64("output_max").unwrap_or(f64::INFINITY);
        params.ensure("output_max", high > low, "must be greater than output_min");
        if kp == 0.0 && ki == 0.0 && kd == 0.0 && !params.failed("kp") {
            params.warning("kp", "all gains are zero; the loop is open");
        }
        PidInput {
            kp,
            ki,
            kd,
            setpoint,
            y0,
            plant_gain,
            tau,
            dt,
            steps,
            limits: (low, high),
        }
    }

    fn calculate(&self, input: &PidInput) -> Result<ResultEnvelope<PidOutput>, AlgorithmError> {
        let (low, high) = input.limits;
        if input.steps == 0 || input.dt <= 0.0 || input.tau <= 0.0 || high <= low {
            return Err(AlgorithmError::InvalidInput(
                "need a positive step count, sample period, time constant and ordered limits"
                    .into(),
            ));
        }
        let a = (-input.dt / input.tau).exp();
        let b = input.plant_gain * (1.0 - a);

        let mut y = input.y0;
        let mut previous = y;
        let mut integral = 0.0;
        let mut saturated = 0usize;
        let mut time = Vec::with_capacity(input.steps);
        let mut output = Vec::with_capacity(input.steps);
        let mut control = Vec::with_capacity(input.steps);

        let mut diverged_at = None;
        for k in 0..input.steps {
            let error = input.setpoint - y;
            // Derivative on measurement avoids a kick on setpoint changes.
            let derivative = if k == 0 { 0.0 } else { -(y - previous) / input.dt };
            let command = |i: f64| input.kp * error + input.ki * i + input.kd * derivative;

            let candidate = integral + error * input.dt;
            let raw = command(candidate);
            let winding_up = (raw > high && error > 0.0) || (raw < low && error < 0.0);
            if !winding_up {
                integral = candidate;
            }
            let u_raw = command(integral);
            let u = u_raw.clamp(low, high);
            if u != u_raw {
                saturated += 1;
            }

            let next = a * y + b * u;
            if !(next.abs() <= DIVERGENCE_LIMIT && u.is_finite()) {
                diverged_at = Some(k);
                break;
            }
            previous = y;
            y = next;
            time.push((k + 1) as f64 * input.dt);
            output.push(y);
            control.push(u);
        }

        let metrics = step_metrics(&time, &output, input.y0, input.setpoint);
        let saturated_fraction = saturated as f64 / input.steps as f64;
        let mut warnings = Vec::new();
        if let Some(k) = diverged_at {
            warnings.push(format!(
                "the loop diverged at step {k}; the simulation stopped at the last finite output"
            ));
        }
        if metrics.settling_time.is_none() && (input.setpoint - input.y0).abs() > f64::EPSILON {
            warnings.push("output has not settled within ±2 % by the end of the run".to_string());
        }
        if metrics.overshoot_percent > 25.0 {
            warnings.push(format!(
                "overshoot of {:.1} % suggests an underdamped loop",
                metrics.overshoot_percent
            ));
        }
        if saturated_fraction > 0.5 {
            warnings.push("actuator is saturated for most of the run".to_string());
        }

        Ok(ResultEnvelope::with_warnings(
            PidOutput {
                final_value: y,
                steady_state_error: input.setpoint - y,
                overshoot_percent: metrics.overshoot_percent,
                rise_time: metrics.rise_time,
                settling_time: metrics.settling_time,
                saturated_fraction,
                time,
                output,
                control,
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
    fn proportional_only_leaves_offset() {
        let out = run(
            &PidController,
            json!({"kp": 4.0, "setpoint": 1.0, "duration": 20.0}),
        )
        .result;
        // Type-0 loop: y∞ = Kp K / (1 + Kp K).
        assert!((out.final_value - 0.8).abs() < 1e-6);
        assert!((out.steady_state_error - 0.2).abs() < 1e-6);
    }

    #[test]
    fn integral_action_removes_offset() {
        let out = run(
            &PidController,
            json!({"kp": 2.0, "ki": 1.0, "setpoint": 1.0, "duration": 30.0}),
        )
        .result;
        assert!(out.steady_state_error.abs() < 1e-3);
        assert!(out.settling_time.is_some());
        assert!(out.rise_time.is_some());
    }

    #[test]
    fn example_settles_without_saturation() {
        let out = run(&PidController, PidController.example());
        assert!(out.warnings.is_empty(), "{:?}", out.warnings);
        assert_eq!(out.result.output.len(), 1500);
        assert!(out.result.control.iter().all(|u| (0.0..=5.0).contains(u)));
    }

    #[test]
    fn weak_actuator_saturates_and_warns() {
        let out = run(
            &PidController,
            json!({"kp": 5.0, "ki": 2.0, "setpoint": 1.0, "output_max": 0.5, "duration": 10.0}),
        );
        assert!(out.result.final_value < 0.51);
        assert!(out.result.saturated_fraction > 0.9);
        assert!(out.warnings.iter().any(|w| w.contains("settled")));
    }

    #[test]
    fn bad_timing_is_rejected() {
        let (_, issues) = parse(
            &PidController,
            json!({"kp": 1.0, "setpoint": 1.0, "dt": 0.0, "output_min": 2.0, "output_max": 1.0}),
        );
        assert_eq!(error_fields(&issues), vec!["dt", "output_max"]);
    }

    #[test]
    fn runaway_loop_stops_with_a_warning() {
        let out = run(
            &PidController,
            json!({
                "kp": 1e12, "kd": 1e12, "setpoint": 1.0,
                "plant_gain": -1.0, "time_constant": 1e-6,
                "dt": 0.01, "duration": 10.0
            }),
        );
        assert!(out.result.output.len() < 1000);
        assert!(out.result.final_value.is_finite());
        assert!(out.warnings.iter().any(|w| w.contains("diverged")));
    }
}
