//! Linear Kalman filter over a batch of measurements.
//!
//! The covariance update uses the Joseph form so `P` stays symmetric and
//! positive semi-definite even when the gain is computed from a poorly
//! conditioned innovation covariance.

use millkit_kernel::{
    Algorithm, AlgorithmError, AlgorithmMeta, Domain, FieldSpec, MAX_MAGNITUDE, ParamReader,
    ResultEnvelope, SafetyClass, as_f64_vec, in_numeric_range,
};
use millkit_numerics::{Matrix, vector};
use serde::Serialize;
use serde_json::{Value, json};

const MAX_STATES: usize = 32;
const MAX_STEPS: usize = 100_000;
/// Mean NIS above `INCONSISTENT_NIS · m` flags a mistuned filter.
const INCONSISTENT_NIS: f64 = 3.0;

pub struct KalmanFilter;

static META: AlgorithmMeta = AlgorithmMeta {
    id: "kalman_filter",
    name: "Kalman Filter",
    description: "Discrete linear Kalman filter: predict with the state model, correct with each measurement, and report the filtered track, innovations and a consistency check.",
    formula: "x⁻ = F x,  P⁻ = F P Fᵀ + Q,  S = H P⁻ Hᵀ + R,  K = P⁻ Hᵀ S⁻¹,  x = x⁻ + K(z − H x⁻),  P = (I − KH) P⁻ (I − KH)ᵀ + K R Kᵀ",
    reference: "Kalman, R. E. (1960). A new approach to linear filtering and prediction problems. Journal of Basic Engineering 82(1), 35-45; Bar-Shalom, Y., Li, X. R., Kirubarajan, T. (2001). Estimation with Applications to Tracking and Navigation. Wiley.",
    safety_class: SafetyClass::Standard,
    domain: Domain::SignalControl,
    inputs: &[
        FieldSpec::required("measurements", "-", "one measurement vector per step; plain numbers for a scalar sensor"),
        FieldSpec::required("state_transition", "-", "F, n×n"),
        FieldSpec::required("observation", "-", "H, m×n"),
        FieldSpec::required("process_noise", "-", "Q, n×n"),
        FieldSpec::required("measurement_noise", "-", "R, m×m"),
        FieldSpec::optional("initial_state", "-", "x₀, default zeros"),
        FieldSpec::optional("initial_covariance", "-", "P₀, default identity"),
    ],
    outputs: &[
        FieldSpec::output("filtered_states", "-", "posterior state per step"),
        FieldSpec::output("covariance_diagonals", "-", "posterior variances per step"),
        FieldSpec::output("innovations", "-", "z − H x⁻ per step"),
        FieldSpec::output("final_state", "-", "last posterior state"),
        FieldSpec::output("final_covariance", "-", "last posterior covariance"),
        FieldSpec::output("mean_nis", "-", "mean normalised innovation squared"),
        FieldSpec::output("skipped_updates", "-", "steps where S could not be inverted"),
    ],
};

#[derive(Debug, Clone)]
pub struct KalmanInput {
    measurements: Vec<Vec<f64>>,
    f: Vec<Vec<f64>>,
    h: Vec<Vec<f64>>,
    q: Vec<Vec<f64>>,
    r: Vec<Vec<f64>>,
    x0: Vec<f64>,
    p0: Vec<Vec<f64>>,
}

#[derive(Debug, Serialize)]
pub struct KalmanOutput {
    pub filtered_states: Vec<Vec<f64>>,
    pub covariance_diagonals: Vec<Vec<f64>>,
    pub innovations: Vec<Vec<f64>>,
    pub final_state: Vec<f64>,
    pub final_covariance: Vec<Vec<f64>>,
    pub mean_nis: f64,
    pub skipped_updates: usize,
}

/// Accepts `[[z…], …]` or, for a scalar sensor, `[z, …]`.
fn read_measurements(params: &mut ParamReader<'_>) -> Vec<Vec<f64>> {
    let items = params.required_array("measurements");
    if items.iter().all(Value::is_number) {
        let scalars: Option<Vec<Vec<f64>>> = items
            .iter()
            .map(|v| v.as_f64().filter(|x| in_numeric_range(*x)).map(|x| vec![x]))
            .collect();
        return scalars.unwrap_or_else(|| {
            params.error(
                "measurements",
                format!("must contain only finite numbers within ±{MAX_MAGNITUDE:e}"),
            );
            Vec::new()
        });
    }
    match items.iter().map(as_f64_vec).collect::<Option<Vec<_>>>() {
        Some(rows) => rows,
        None => {
            params.error(
                "measurements",
                "must be an array of numbers or of numeric arrays",
            );
            Vec::new()
        }
    }
}

fn ensure_shape(
    params: &mut ParamReader<'_>,
    field: &str,
    m: &[Vec<f64>],
    rows: usize,
    cols: usize,
) -> bool {
    params.ensure_len(field, m.len(), rows) && params.ensure_rectangular(field, m, cols)
}

fn diagonal(p: &Matrix) -> Vec<f64> {
    (0..p.rows()).map(|i| p[(i, i)]).collect()
}

fn all_finite(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}

impl Algorithm for KalmanFilter {
    type Input = KalmanInput;
    type Output = KalmanOutput;

    fn meta(&self) -> &'static AlgorithmMeta {
        &META
    }

    fn example(&self) -> Value {
        // Constant-velocity track observed in position only.
        json!({
            "measurements": [1.1, 2.0, 2.9, 4.2, 5.1, 5.8, 7.1, 8.0, 8.9, 10.1],
            "state_transition": [[1.0, 1.0], [0.0, 1.0]],
            "observation": [[1.0, 0.0]],
            "process_noise": [[0.001, 0.0], [0.0, 0.001]],
            "measurement_noise": [[0.25]],
            "initial_state": [0.0, 1.0],
            "initial_covariance": [[1.0, 0.0], [0.0, 1.0]]
        })
    }

    fn parse(&self, params: &mut ParamReader<'_>) -> KalmanInput {
        let measurements = read_measurements(params);
        let f = params.required_matrix("state_transition");
        let h = params.required_matrix("observation");
        let q = params.required_matrix("process_noise");
        let r = params.required_matrix("measurement_noise");

        let n = f.len();
        if params.has("state_transition") {
            params.ensure_count("state_transition", n, 1, MAX_STATES);
            ensure_shape(params, "state_transition", &f, n, n);
        }
        let m = h.len();
        if params.has("observation") && params.ensure_count("observation", m, 1, MAX_STATES) {
            ensure_shape(params, "observation", &h, m, n);
        }
        if params.has("process_noise") {
            ensure_shape(params, "process_noise", &q, n, n);
            params.ensure(
                "process_noise",
                q.iter().enumerate().all(|(i, row)| row.get(i).is_none_or(|v| *v >= 0.0)),
                "diagonal entries must not be negative",
            );
        }
        if params.has("measurement_noise") {
            ensure_shape(params, "measurement_noise", &r, m, m);
            params.ensure(
                "measurement_noise",
                r.iter().enumerate().all(|(i, row)| row.get(i).is_none_or(|v| *v >= 0.0)),
                "diagonal entries must not be negative",
            );
        }
        if params.has("measurements") && !params.failed("measurements") {
            params.ensure_count("measurements", measurements.len(), 1, MAX_STEPS);
            if let Some(i) = measurements.iter().position(|z| z.len() != m) {
                params.ensure(
                    "measurements",
                    false,
                    format!("step {i} must have {m} entries, got {}", measurements[i].len()),
                );
            }
        }

        let x0 = params.optional_f64_array("initial_state");
        if let Some(x0) = &x0 {
            params.ensure_len("initial_state", x0.len(), n);
        }
        let p0 = params.optional_matrix("initial_covariance");
        if let Some(p0) = &p0 {
            ensure_shape(params, "initial_covariance", p0, n, n);
        }
        KalmanInput {
            measurements,
            f,
            h,
            q,
            r,
            x0: x0.unwrap_or_else(|| vec![0.0; n]),
            p0: p0.unwrap_or_else(|| Matrix::identity(n).to_rows()),
        }
    }

    fn calculate(
        &self,
        input: &KalmanInput,
    ) -> Result<ResultEnvelope<KalmanOutput>, AlgorithmError> {
        let f = Matrix::from_rows(&input.f)?;
        let h = Matrix::from_rows(&input.h)?;
        let q = Matrix::from_rows(&input.q)?;
        let r = Matrix::from_rows(&input.r)?;
        let mut p = Matrix::from_rows(&input.p0)?;
        let mut x = input.x0.clone();
        let n = f.rows();
        let m = h.rows();
        if input.measurements.is_empty() || x.len() != n {
            return Err(AlgorithmError::InvalidInput(
                "need at least one measurement and an initial state of the model's order".into(),
            ));
        }
        let ft = f.transpose();
        let ht = h.transpose();
        let identity = Matrix::identity(n);

        let steps = input.measurements.len();
        let mut states = Vec::with_capacity(steps);
        let mut diagonals = Vec::with_capacity(steps);
        let mut innovations = Vec::with_capacity(steps);
        let mut nis_total = 0.0;
        let mut updates = 0usize;
        let mut skipped = 0usize;

        let mut diverged_at = None;
        for (step, z) in input.measurements.iter().enumerate() {
            let checkpoint = (x.clone(), p.clone(), nis_total, updates, skipped);
            x = f.mul_vec(&x)?;
            p = f.matmul(&p)?.matmul(&ft)?.add(&q)?;

            let y = vector::sub(z, &h.mul_vec(&x)?);
            let s = h.matmul(&p)?.matmul(&ht)?.add(&r)?;
            match s.inverse() {
                Ok(s_inv) => {
                    let k = p.matmul(&ht)?.matmul(&s_inv)?;
                    x = vector::add(&x, &k.mul_vec(&y)?);
                    let a = identity.sub(&k.matmul(&h)?)?;
                    p = a
                        .matmul(&p)?
                        .matmul(&a.transpose())?
                        .add(&k.matmul(&r)?.matmul(&k.transpose())?)?;
                    nis_total += vector::dot(&y, &s_inv.mul_vec(&y)?);
                    updates += 1;
                }
                Err(_) => skipped += 1,
            }
            if !(all_finite(&x) && all_finite(&y) && all_finite(&diagonal(&p)) && nis_total.is_finite()) {
                (x, p, nis_total, updates, skipped) = checkpoint;
                diverged_at = Some(step);
                break;
            }
            states.push(x.clone());
            diagonals.push(diagonal(&p));
            innovations.push(y);
        }

        let mean_nis = if updates > 0 {
            nis_total / updates as f64
        } else {
            0.0
        };
        let mut warnings = Vec::new();
        if let Some(step) = diverged_at {
            warnings.push(format!(
                "the estimate diverged at step {step}; filtering stopped and the last finite state is reported"
            ));
        }
        if skipped > 0 {
            warnings.push(format!(
                "innovation covariance was singular at {skipped} step(s); those steps are prediction only"
            ));
        }
        if updates >= 5 && mean_nis > INCONSISTENT_NIS * m as f64 {
            warnings.push(format!(
                "mean NIS {mean_nis:.2} exceeds {:.0}; noise covariances look too small for the data",
                INCONSISTENT_NIS * m as f64
            ));
        }

        Ok(ResultEnvelope::with_warnings(
            KalmanOutput {
                filtered_states: states,
                covariance_diagonals: diagonals,
                innovations,
                final_state: x,
                final_covariance: p.to_rows(),
                mean_nis,
                skipped_updates: skipped,
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
    fn static_state_converges_to_measurement_mean() {
        let out = run(
            &KalmanFilter,
            json!({
                "measurements": [1.0, 2.0, 3.0, 4.0],
                "state_transition": [[1.0]],
                "observation": [[1.0]],
                "process_noise": [[0.0]],
                "measurement_noise": [[1.0]],
                "initial_covariance": [[1e6]]
            }),
        )
        .result;
        assert!((out.final_state[0] - 2.5).abs() < 1e-4);
        // Four unit-variance observations leave variance 1/4.
        assert!((out.final_covariance[0][0] - 0.25).abs() < 1e-4);
    }

    #[test]
    fn tracks_velocity_from_positions() {
        let out = run(&KalmanFilter, KalmanFilter.example());
        assert_eq!(out.result.filtered_states.len(), 10);
        let velocity = out.result.final_state[1];
        assert!((velocity - 1.0).abs() < 0.1, "velocity {velocity}");
        let var = &out.result.covariance_diagonals;
        assert!(var[9][0] < var[0][0]);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn shape_mismatches_are_all_reported() {
        let (_, issues) = parse(
            &KalmanFilter,
            json!({
                "measurements": [[1.0, 2.0]],
                "state_transition": [[1.0, 0.0], [0.0, 1.0]],
                "observation": [[1.0, 0.0]],
                "process_noise": [[0.1]],
                "measurement_noise": [[1.0]],
                "initial_state": [0.0]
            }),
        );
        assert_eq!(
            error_fields(&issues),
            vec!["process_noise", "measurements", "initial_state"]
        );
    }

    #[test]
    fn overconfident_noise_is_flagged() {
        let out = run(
            &KalmanFilter,
            json!({
                "measurements": [0.0, 5.0, -5.0, 5.0, -5.0, 5.0, -5.0],
                "state_transition": [[1.0]],
                "observation": [[1.0]],
                "process_noise": [[1e-6]],
                "measurement_noise": [[0.01]]
            }),
        );
        assert!(out.warnings.iter().any(|w| w.contains("NIS")));
    }

    #[test]
    fn unobserved_unstable_state_stops_at_divergence() {
        let out = run(
            &KalmanFilter,
            json!({
                "measurements": vec![0.0; 400],
                "state_transition": [[10.0]],
                "observation": [[0.0]],
                "process_noise": [[0.0]],
                "measurement_noise": [[1.0]],
                "initial_state": [1.0]
            }),
        );
        let states = &out.result.filtered_states;
        assert!(states.len() > 100 && states.len() < 400, "{}", states.len());
        assert!(out.result.final_state.iter().all(|v| v.is_finite()));
        assert!(out.warnings.iter().any(|w| w.contains("diverged")));
    }
}
