//! Least-squares polynomial regression.
//!
//! The fit runs on centred and scaled abscissae so the normal equations stay
//! well conditioned up to degree 8; the coefficients are expanded back to
//! powers of the raw `x` before they are reported.

use millkit_kernel::{
    Algorithm, AlgorithmError, AlgorithmMeta, Domain, FieldSpec, ParamReader, ResultEnvelope,
    SafetyClass,
};
use millkit_numerics::{Matrix, stats};
use serde::Serialize;
use serde_json::{Value, json};

const MAX_DEGREE: usize = 8;
const MAX_SAMPLES: usize = 100_000;
const POOR_FIT_R2: f64 = 0.5;

pub struct Regression;

static META: AlgorithmMeta = AlgorithmMeta {
    id: "regression",
    name: "Polynomial Regression",
    description: "Fits y = Σ c_k x^k by ordinary least squares and reports goodness of fit and predictions.",
    formula: "c = argmin ‖y − V c‖²,  V_{ik} = x_i^k;  R² = 1 − SS_res / SS_tot;  R²_adj = 1 − (1 − R²)(n − 1)/(n − p − 1)",
    reference: "Montgomery, D.C., Peck, E.A., Vining, G.G. (2012). Introduction to Linear Regression Analysis, 5th ed. Wiley.",
    safety_class: SafetyClass::Standard,
    domain: Domain::NumericLearning,
    inputs: &[
        FieldSpec::required("x", "-", "sample abscissae"),
        FieldSpec::required("y", "-", "sample responses, same length as x"),
        FieldSpec::optional("degree", "-", "polynomial degree 1 to 8, default 1"),
        FieldSpec::optional("x_predict", "-", "abscissae to evaluate the fitted polynomial at"),
    ],
    outputs: &[
        FieldSpec::output("coefficients", "-", "c_0 … c_degree, ascending powers of x"),
        FieldSpec::output("r_squared", "-", "coefficient of determination"),
        FieldSpec::output("adjusted_r_squared", "-", "R² penalised for the number of terms"),
        FieldSpec::output("rmse", "-", "root mean square residual"),
        FieldSpec::output("residuals", "-", "y − fitted per sample"),
        FieldSpec::output("fitted", "-", "model value per sample"),
        FieldSpec::output("predictions", "-", "model values at x_predict, if given"),
        FieldSpec::output("equation", "-", "human-readable polynomial"),
    ],
};

#[derive(Debug, Clone)]
pub struct RegressionInput {
    x: Vec<f64>,
    y: Vec<f64>,
    degree: usize,
    x_predict: Option<Vec<f64>>,
}

#[derive(Debug, Serialize)]
pub struct RegressionOutput {
    pub coefficients: Vec<f64>,
    pub r_squared: f64,
    pub adjusted_r_squared: f64,
    pub rmse: f64,
    pub residuals: Vec<f64>,
    pub fitted: Vec<f64>,
    pub predictions: Option<Vec<f64>>,
    pub equation: String,
}

/// Horner evaluation, coefficients in ascending powers.
pub fn evaluate(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

fn distinct_count(values: &[f64]) -> usize {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted.dedup();
    sorted.len()
}

/// Expand Σ a_k t^k with t = (x − shift) / scale into powers of x.
fn unscale(a: &[f64], shift: f64, scale: f64) -> Vec<f64> {
    let mut out = vec![0.0; a.len()];
    // (x − shift)^k built up one factor at a time.
    let mut power = vec![1.0];
    for (k, ak) in a.iter().enumerate() {
        let factor = ak / scale.powi(k as i32);
        for (j, p) in power.iter().enumerate() {
            out[j] += factor * p;
        }
        let mut next = vec![0.0; power.len() + 1];
        for (j, p) in power.iter().enumerate() {
            next[j + 1] += p;
            next[j] -= shift * p;
        }
        power = next;
    }
    out
}

/// Least-squares solution on the centred and scaled basis.
struct Fit {
    scaled: Vec<f64>,
    shift: f64,
    scale: f64,
}

impl Fit {
    fn new(x: &[f64], y: &[f64], degree: usize) -> Result<Self, AlgorithmError> {
        let p = degree + 1;
        let shift = stats::mean(x);
        let scale = x
            .iter()
            .map(|v| (v - shift).abs())
            .fold(0.0, f64::max)
            .max(f64::MIN_POSITIVE);

        // Normal equations Vᵀ V a = Vᵀ y on the scaled basis.
        let mut gram = Matrix::zeros(p, p);
        let mut rhs = vec![0.0; p];
        for (xi, yi) in x.iter().zip(y) {
            let t = (xi - shift) / scale;
            let powers: Vec<f64> = (0..p).map(|k| t.powi(k as i32)).collect();
            for r in 0..p {
                rhs[r] += powers[r] * yi;
                for c in 0..p {
                    gram[(r, c)] += powers[r] * powers[c];
                }
            }
        }
        let scaled = gram.solve(&rhs)?;
        Ok(Self {
            scaled,
            shift,
            scale,
        })
    }

    fn at(&self, x: f64) -> f64 {
        evaluate(&self.scaled, (x - self.shift) / self.scale)
    }

    fn coefficients(&self) -> Vec<f64> {
        unscale(&self.scaled, self.shift, self.scale)
    }

    /// Every reported number stays finite for these samples and queries.
    fn is_representable(&self, x: &[f64], y: &[f64], queries: &[f64]) -> bool {
        let fitted: Vec<f64> = x.iter().map(|v| self.at(*v)).collect();
        self.coefficients().iter().all(|c| c.is_finite())
            && stats::rmse(y, &fitted).is_finite()
            && queries.iter().all(|q| self.at(*q).is_finite())
    }
}

fn format_equation(coefficients: &[f64]) -> String {
    let mut terms = Vec::new();
    for (k, c) in coefficients.iter().enumerate().rev() {
        let magnitude = format!("{:.6}", c.abs());
        let body = match k {
            0 => magnitude,
            1 => format!("{magnitude}·x"),
            _ => format!("{magnitude}·x^{k}"),
        };
        if terms.is_empty() {
            terms.push(if *c < 0.0 { format!("-{body}") } else { body });
        } else {
            terms.push(format!("{} {body}", if *c < 0.0 { '-' } else { '+' }));
        }
    }
    format!("y = {}", terms.join(" "))
}

impl Algorithm for Regression {
    type Input = RegressionInput;
    type Output = RegressionOutput;

    fn meta(&self) -> &'static AlgorithmMeta {
        &META
    }

    fn example(&self) -> Value {
        // Flank wear (mm) against cutting time (min): quadratic break-in curve.
        json!({
            "x": [0.0, 2.0, 4.0, 6.0, 8.0, 10.0, 12.0, 14.0],
            "y": [0.0, 0.07, 0.11, 0.14, 0.17, 0.21, 0.26, 0.32],
            "degree": 2,
            "x_predict": [16.0]
        })
    }

    fn parse(&self, params: &mut ParamReader<'_>) -> RegressionInput {
        let x = params.required_f64_array("x");
        let y = params.required_f64_array("y");
        let degree = params.optional_usize("degree", 1);
        params.ensure_count("degree", degree, 1, MAX_DEGREE);
        if params.has("x") {
            params.ensure_count("x", x.len(), 2, MAX_SAMPLES);
        }
        if params.has("y") && !params.failed("x") {
            params.ensure_len("y", y.len(), x.len());
        }
        if !params.failed("x") && !params.failed("degree") {
            params.ensure(
                "x",
                distinct_count(&x) > degree,
                format!("needs at least {} distinct values for degree {degree}", degree + 1),
            );
        }
        let x_predict = params.optional_f64_array("x_predict");
        if let Some(xp) = &x_predict
            && let (Some(lo), Some(hi)) = (
                x.iter().copied().reduce(f64::min),
                x.iter().copied().reduce(f64::max),
            )
            && xp.iter().any(|v| *v < lo || *v > hi)
        {
            params.warning("x_predict", format!("extrapolates outside [{lo}, {hi}]"));
        }
        if !params.has_errors() {
            let queries = x_predict.as_deref().unwrap_or_default();
            let usable = Fit::new(&x, &y, degree)
                .is_ok_and(|fit| fit.is_representable(&x, &y, queries));
            params.ensure(
                "x",
                usable,
                format!("abscissae are too tightly clustered for a degree-{degree} fit"),
            );
        }
        RegressionInput {
            x,
            y,
            degree,
            x_predict,
        }
    }

    fn calculate(
        &self,
        input: &RegressionInput,
    ) -> Result<ResultEnvelope<RegressionOutput>, AlgorithmError> {
        let (x, y) = (&input.x, &input.y);
        let n = x.len();
        let p = input.degree + 1;
        if n != y.len() || distinct_count(x) < p {
            return Err(AlgorithmError::InvalidInput(format!(
                "{n} samples cannot determine a degree-{} polynomial",
                input.degree
            )));
        }

        let fit = Fit::new(x, y, input.degree)?;
        let coefficients = fit.coefficients();
        let fitted: Vec<f64> = x.iter().map(|v| fit.at(*v)).collect();
        let residuals: Vec<f64> = y.iter().zip(&fitted).map(|(a, f)| a - f).collect();
        let r_squared = stats::r_squared(y, &fitted);
        let adjusted_r_squared = if n > p {
            1.0 - (1.0 - r_squared) * (n - 1) as f64 / (n - p) as f64
        } else {
            r_squared
        };
        let rmse = stats::rmse(y, &fitted);
        let predictions = input
            .x_predict
            .as_ref()
            .map(|xp| xp.iter().map(|v| fit.at(*v)).collect());

        let mut warnings = Vec::new();
        if r_squared < POOR_FIT_R2 {
            warnings.push(format!(
                "poor fit: R² = {r_squared:.3}; consider another degree or model"
            ));
        }
        if n == p {
            warnings.push("as many terms as samples: the fit interpolates".into());
        }

        Ok(ResultEnvelope::with_warnings(
            RegressionOutput {
                equation: format_equation(&coefficients),
                coefficients,
                r_squared,
                adjusted_r_squared,
                rmse,
                residuals,
                fitted,
                predictions,
            },
            warnings,
        ))
    }
}
