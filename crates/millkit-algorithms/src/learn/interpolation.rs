//! One-dimensional interpolation: piecewise linear or natural cubic spline.

use millkit_kernel::{
    Algorithm, AlgorithmError, AlgorithmMeta, Domain, FieldSpec, MIN_POSITIVE, ParamReader,
    ResultEnvelope, SafetyClass,
};
use serde::Serialize;
use serde_json::{Value, json};

const MAX_KNOTS: usize = 100_000;
const METHODS: &[&str] = &["linear", "cubic_spline"];

pub struct Interpolation;

static META: AlgorithmMeta = AlgorithmMeta {
    id: "interpolation",
    name: "1D Interpolation",
    description: "Evaluates a piecewise linear interpolant or a natural cubic spline through tabulated points.",
    formula: "linear: y = y_i + (y_{i+1} − y_i)(x − x_i)/h_i;  spline: S''(x_0) = S''(x_n) = 0, C² continuous, tridiagonal solve for S''(x_i)",
    reference: "Burden, R.L., Faires, J.D. (2011). Numerical Analysis, 9th ed., §3.5 Cubic Spline Interpolation. Brooks/Cole.",
    safety_class: SafetyClass::Standard,
    domain: Domain::NumericLearning,
    inputs: &[
        FieldSpec::required("x_points", "-", "knot abscissae, strictly increasing"),
        FieldSpec::required("y_points", "-", "knot values, same length as x_points"),
        FieldSpec::required("query", "-", "abscissae to evaluate"),
        FieldSpec::optional("method", "-", "linear | cubic_spline, default cubic_spline"),
        FieldSpec::optional("extrapolate", "-", "extend the end pieces past the knots, default false"),
    ],
    outputs: &[
        FieldSpec::output("values", "-", "interpolated value per query"),
        FieldSpec::output("derivatives", "-", "first derivative per query"),
        FieldSpec::output("method", "-", "method used"),
        FieldSpec::output("out_of_range", "-", "indices of queries outside the knot span"),
    ],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Linear,
    CubicSpline,
}

#[derive(Debug, Clone)]
pub struct InterpolationInput {
    x: Vec<f64>,
    y: Vec<f64>,
    query: Vec<f64>,
    method: Method,
    extrapolate: bool,
}

#[derive(Debug, Serialize)]
pub struct InterpolationOutput {
    pub values: Vec<f64>,
    pub derivatives: Vec<f64>,
    pub method: Method,
    pub out_of_range: Vec<usize>,
}

/// Second derivatives of the natural cubic spline at each knot (Thomas algorithm).
pub fn natural_spline_moments(x: &[f64], y: &[f64]) -> Vec<f64> {
    let n = x.len();
    let mut m = vec![0.0; n];
    if n < 3 {
        return m;
    }
    let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
    // Interior rows i = 1..n-1: h_{i-1} M_{i-1} + 2(h_{i-1}+h_i) M_i + h_i M_{i+1} = r_i
    let k = n - 2;
    let mut diag = vec![0.0; k];
    let mut rhs = vec![0.0; k];
    for j in 0..k {
        let i = j + 1;
        diag[j] = 2.0 * (h[i - 1] + h[i]);
        rhs[j] = 6.0 * ((y[i + 1] - y[i]) / h[i] - (y[i] - y[i - 1]) / h[i - 1]);
    }
    for j in 1..k {
        let w = h[j] / diag[j - 1];
        diag[j] -= w * h[j];
        rhs[j] -= w * rhs[j - 1];
    }
    m[k] = rhs[k - 1] / diag[k - 1];
    for j in (0..k - 1).rev() {
        m[j + 1] = (rhs[j] - h[j + 1] * m[j + 2]) / diag[j];
    }
    m
}

/// Index of the piece containing `t`, clamped to the end pieces.
fn piece(x: &[f64], t: f64) -> usize {
    x.partition_point(|v| *v <= t)
        .saturating_sub(1)
        .min(x.len() - 2)
}

fn evaluate(method: Method, x: &[f64], y: &[f64], m: &[f64], t: f64) -> (f64, f64) {
    let i = piece(x, t);
    let h = x[i + 1] - x[i];
    match method {
        Method::Linear => {
            let slope = (y[i + 1] - y[i]) / h;
            (y[i] + slope * (t - x[i]), slope)
        }
        Method::CubicSpline => {
            let a = (x[i + 1] - t) / h;
            let b = (t - x[i]) / h;
            let value = a * y[i]
                + b * y[i + 1]
                + ((a * a * a - a) * m[i] + (b * b * b - b) * m[i + 1]) * h * h / 6.0;
            let slope = (y[i + 1] - y[i]) / h
                + ((1.0 - 3.0 * a * a) * m[i] + (3.0 * b * b - 1.0) * m[i + 1]) * h / 6.0;
            (value, slope)
        }
    }
}

impl Algorithm for Interpolation {
    type Input = InterpolationInput;
    type Output = InterpolationOutput;

    fn meta(&self) -> &'static AlgorithmMeta {
        &META
    }

    fn example(&self) -> Value {
        // Recommended cutting speed (m/min) against workpiece hardness (HB).
        json!({
            "x_points": [150.0, 200.0, 250.0, 300.0, 350.0],
            "y_points": [320.0, 260.0, 210.0, 175.0, 150.0],
            "query": [175.0, 225.0, 280.0, 340.0],
            "method": "cubic_spline"
        })
    }

    fn parse(&self, params: &mut ParamReader<'_>) -> InterpolationInput {
        let x = params.required_f64_array("x_points");
        if params.has("x_points")
            && params.ensure_count("x_points", x.len(), 2, MAX_KNOTS)
            && let Some(i) = x.windows(2).position(|w| w[1] - w[0] < MIN_POSITIVE)
        {
            let message = if x[i + 1] <= x[i] {
                format!("must be strictly increasing (entry {} ≤ entry {i})", i + 1)
            } else {
                format!("entries {i} and {} are closer than {MIN_POSITIVE:e}", i + 1)
            };
            params.error("x_points", message);
        }
        let y = params.required_f64_array("y_points");
        if params.has("y_points") && !params.failed("x_points") {
            params.ensure_len("y_points", y.len(), x.len());
        }
        let query = params.required_f64_array("query");
        if params.has("query") {
            params.ensure_count("query", query.len(), 1, MAX_KNOTS);
        }
        let method = match params.choice("method", METHODS, "cubic_spline") {
            "linear" => Method::Linear,
            _ => Method::CubicSpline,
        };
        let extrapolate = params.optional_bool("extrapolate", false);
        if let (Some(lo), Some(hi)) = (x.first(), x.last())
            && !params.failed("x_points")
        {
            let outside = query.iter().filter(|q| *q < lo || *q > hi).count();
            if outside > 0 {
                let action = if extrapolate { "extrapolated" } else { "clamped to the end knots" };
                params.warning(
                    "query",
                    format!("{outside} queries outside [{lo}, {hi}] will be {action}"),
                );
            }
        }
        InterpolationInput {
            x,
            y,
            query,
            method,
            extrapolate,
        }
    }

    fn calculate(
        &self,
        input: &InterpolationInput,
    ) -> Result<ResultEnvelope<InterpolationOutput>, AlgorithmError> {
        let (x, y) = (&input.x, &input.y);
        if x.len() < 2 || x.len() != y.len() || x.windows(2).any(|w| w[1] <= w[0]) {
            return Err(AlgorithmError::InvalidInput(
                "x_points must be strictly increasing and match y_points".into(),
            ));
        }
        let moments = match input.method {
            Method::CubicSpline => natural_spline_moments(x, y),
            Method::Linear => Vec::new(),
        };
        let (lo, hi) = (x[0], x[x.len() - 1]);
        let mut values = Vec::with_capacity(input.query.len());
        let mut derivatives = Vec::with_capacity(input.query.len());
        let mut out_of_range = Vec::new();
        for (q_index, &q) in input.query.iter().enumerate() {
            let outside = q < lo || q > hi;
            if outside {
                out_of_range.push(q_index);
            }
            let t = if outside && !input.extrapolate {
                q.clamp(lo, hi)
            } else {
                q
            };
            let (value, slope) = evaluate(input.method, x, y, &moments, t);
            values.push(value);
            derivatives.push(if outside && !input.extrapolate { 0.0 } else { slope });
        }

        let mut warnings = Vec::new();
        if !out_of_range.is_empty() {
            warnings.push(format!(
                "{} queries outside the knot span",
                out_of_range.len()
            ));
        }
        Ok(ResultEnvelope::with_warnings(
            InterpolationOutput {
                values,
                derivatives,
                method: input.method,
                out_of_range,
            },
            warnings,
        ))
    }
}
