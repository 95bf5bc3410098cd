//! Digital-twin fusion: combine model predictions with sensor readings.

use millkit_kernel::{
    Algorithm, AlgorithmError, AlgorithmMeta, Domain, FieldSpec, MIN_POSITIVE, ParamReader,
    ResultEnvelope, SafetyClass,
};
use serde::Serialize;
use serde_json::{Value, json};

const MAX_CHANNELS: usize = 10_000;

pub struct DigitalTwinFusion;

static META: AlgorithmMeta = AlgorithmMeta {
    id: "digital_twin_fusion",
    name: "Digital Twin Sensor Fusion",
    description: "Inverse-variance fusion of model predictions and sensor measurements per channel, with a normalised residual test that flags channels where the twin and the machine disagree.",
    formula: "x̂ = (x_m/σ_m² + x_s/σ_s²) / (1/σ_m² + 1/σ_s²),  σ̂² = 1 / (1/σ_m² + 1/σ_s²),  z = (x_s − x_m) / √(σ_m² + σ_s²)",
    reference: "Durrant-Whyte, H., Henderson, T. C. (2008). Multisensor data fusion. Springer Handbook of Robotics, 585-610; Tao, F. et al. (2019). Digital twin in industry: state-of-the-art. IEEE TII 15(4), 2405-2415.",
    safety_class: SafetyClass::Standard,
    domain: Domain::SignalControl,
    inputs: &[
        FieldSpec::required("model_values", "-", "twin prediction per channel"),
        FieldSpec::required("model_variances", "-", "prediction variance per channel, > 0"),
        FieldSpec::required("sensor_values", "-", "measurement per channel"),
        FieldSpec::required("sensor_variances", "-", "measurement variance per channel, > 0"),
        FieldSpec::optional("anomaly_threshold", "-", "|z| above which a channel is anomalous, default 3"),
        FieldSpec::optional("channel_names", "-", "label per channel"),
    ],
    outputs: &[
        FieldSpec::output("channels", "-", "name, fused_value, fused_variance, residual, z_score, anomaly"),
        FieldSpec::output("anomaly_count", "-", "channels over the threshold"),
        FieldSpec::output("health_score", "-", "fraction of channels within the threshold"),
        FieldSpec::output("max_abs_z", "-", "largest |z| over all channels"),
    ],
};

#[derive(Debug, Clone)]
pub struct FusionInput {
    model: Vec<f64>,
    model_var: Vec<f64>,
    sensor: Vec<f64>,
    sensor_var: Vec<f64>,
    threshold: f64,
    names: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct FusedChannel {
    pub name: String,
    pub fused_value: f64,
    pub fused_variance: f64,
    pub residual: f64,
    pub z_score: f64,
    pub anomaly: bool,
}

#[derive(Debug, Serialize)]
pub struct FusionOutput {
    pub channels: Vec<FusedChannel>,
    pub anomaly_count: usize,
    pub health_score: f64,
    pub max_abs_z: f64,
}

fn read_names(params: &mut ParamReader<'_>, count: usize) -> Vec<String> {
    let default = || -> Vec<String> { (0..count).map(|i| format!("channel_{i}")).collect() };
    let Some(raw) = params.raw("channel_names") else {
        return default();
    };
    let names: Option<Vec<String>> = raw
        .as_array()
        .and_then(|items| items.iter().map(|v| v.as_str().map(str::to_string)).collect());
    match names {
        Some(names) => {
            params.ensure_len("channel_names", names.len(), count);
            names
        }
        None => {
            params.error("channel_names", "must be an array of strings");
            default()
        }
    }
}

impl Algorithm for DigitalTwinFusion {
    type Input = FusionInput;
    type Output = FusionOutput;

    fn meta(&self) -> &'static AlgorithmMeta {
        &META
    }

    fn example(&self) -> Value {
        json!({
            "model_values": [850.0, 42.0, 0.012],
            "model_variances": [400.0, 4.0, 0.000004],
            "sensor_values": [880.0, 55.0, 0.013],
            "sensor_variances": [100.0, 1.0, 0.000001],
            "anomaly_threshold": 3.0,
            "channel_names": ["cutting_force_n", "spindle_temp_c", "vibration_mm"]
        })
    }

    fn parse(&self, params: &mut ParamReader<'_>) -> FusionInput {
        let model = params.required_f64_array("model_values");
        let model_var = params.required_f64_array("model_variances");
        let sensor = params.required_f64_array("sensor_values");
        let sensor_var = params.required_f64_array("sensor_variances");
        let count = model.len();
        if params.has("model_values") {
            params.ensure_count("model_values", count, 1, MAX_CHANNELS);
        }
        for (field, values) in [
            ("model_variances", &model_var),
            ("sensor_values", &sensor),
            ("sensor_variances", &sensor_var),
        ] {
            if params.has(field) {
                params.ensure_len(field, values.len(), count);
            }
        }
        for (field, values) in [("model_variances", &model_var), ("sensor_variances", &sensor_var)] {
            params.ensure(
                field,
                values.iter().all(|v| *v >= MIN_POSITIVE),
                format!("every variance must be at least {MIN_POSITIVE:e}"),
            );
        }
        let threshold = params.optional_f64("anomaly_threshold", 3.0);
        params.ensure_positive("anomaly_threshold", threshold);
        let names = read_names(params, count);
        FusionInput {
            model,
            model_var,
            sensor,
            sensor_var,
            threshold,
            names,
        }
    }

    fn calculate(
        &self,
        input: &FusionInput,
    ) -> Result<ResultEnvelope<FusionOutput>, AlgorithmError> {
        let n = input.model.len();
        if n == 0
            || [input.model_var.len(), input.sensor.len(), input.sensor_var.len()]
                .iter()
                .any(|&len| len != n)
            || input.model_var.iter().chain(&input.sensor_var).any(|v| *v <= 0.0)
        {
            return Err(AlgorithmError::InvalidInput(
                "channel arrays must be non-empty, equally long, with positive variances".into(),
            ));
        }

        let mut warnings = Vec::new();
        let channels: Vec<FusedChannel> = (0..n)
            .map(|i| {
                let (xm, vm) = (input.model[i], input.model_var[i]);
                let (xs, vs) = (input.sensor[i], input.sensor_var[i]);
                let (wm, ws) = (1.0 / vm, 1.0 / vs);
                let residual = xs - xm;
                let z_score = residual / (vm + vs).sqrt();
                let anomaly = z_score.abs() > input.threshold;
                let name = input
                    .names
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| format!("channel_{i}"));
                if anomaly {
                    warnings.push(format!(
                        "{name}: sensor deviates from the twin by {z_score:+.2}σ"
                    ));
                }
                FusedChannel {
                    name,
                    fused_value: (wm * xm + ws * xs) / (wm + ws),
                    fused_variance: 1.0 / (wm + ws),
                    residual,
                    z_score,
                    anomaly,
                }
            })
            .collect();

        let anomaly_count = channels.iter().filter(|c| c.anomaly).count();
        let max_abs_z = channels.iter().map(|c| c.z_score.abs()).fold(0.0, f64::max);
        Ok(ResultEnvelope::with_warnings(
            FusionOutput {
                health_score: 1.0 - anomaly_count as f64 / n as f64,
                anomaly_count,
                max_abs_z,
                channels,
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
    fn equal_variances_average_the_sources() {
        let out = run(
            &DigitalTwinFusion,
            json!({
                "model_values": [10.0],
                "model_variances": [4.0],
                "sensor_values": [12.0],
                "sensor_variances": [4.0]
            }),
        )
        .result;
        let c = &out.channels[0];
        assert_eq!(c.name, "channel_0");
        assert!((c.fused_value - 11.0).abs() < 1e-12);
        assert!((c.fused_variance - 2.0).abs() < 1e-12);
        assert!((c.z_score - 2.0 / 8f64.sqrt()).abs() < 1e-12);
        assert_eq!(out.health_score, 1.0);
    }

    #[test]
    fn example_flags_the_hot_spindle() {
        let out = run(&DigitalTwinFusion, DigitalTwinFusion.example());
        let flagged: Vec<&str> = out
            .result
            .channels
            .iter()
            .filter(|c| c.anomaly)
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(flagged, vec!["spindle_temp_c"]);
        assert_eq!(out.warnings.len(), 1);
        assert!((out.result.health_score - 2.0 / 3.0).abs() < 1e-12);
        // Fusion is never less certain than the better source.
        for (c, best) in out.result.channels.iter().zip([100.0, 1.0, 0.000001]) {
            assert!(c.fused_variance < best);
        }
    }

    #[test]
    fn mismatched_lengths_and_zero_variance_are_reported() {
        let (_, issues) = parse(
            &DigitalTwinFusion,
            json!({
                "model_values": [1.0, 2.0],
                "model_variances": [1.0, 0.0],
                "sensor_values": [1.0],
                "sensor_variances": [1.0, 1.0],
                "channel_names": ["a", "b", "c"]
            }),
        );
        assert_eq!(
            error_fields(&issues),
            vec!["sensor_values", "model_variances", "channel_names"]
        );
    }

    #[test]
    fn vanishing_variance_is_rejected() {
        let mut p = DigitalTwinFusion.example();
        p["sensor_variances"][0] = json!(1e-300);
        let (_, issues) = parse(&DigitalTwinFusion, p);
        assert_eq!(error_fields(&issues), vec!["sensor_variances"]);
    }
}
