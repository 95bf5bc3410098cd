//! Bayesian optimisation with a Gaussian-process surrogate and expected
//! improvement.
//!
//! The surrogate works on coordinates rescaled to the unit cube and on
//! standardised objective values, so one length scale serves any bounds.
//! The acquisition is maximised over a random candidate set: half uniform
//! over the cube, half Gaussian perturbations of the incumbent.

use super::{
    Incumbent, OptimizationResult, PROBLEM_FIELDS, Problem, RESULT_FIELDS,
    ensure_evaluation_budget,
};
use millkit_kernel::{
    Algorithm, AlgorithmError, AlgorithmMeta, Domain, FieldSpec, ParamReader, ResultEnvelope,
    SafetyClass,
};
use millkit_numerics::{Matrix, SeededRng, stats, vector};
use serde_json::{Value, json};

const NOISE: f64 = 1e-6;
const MAX_JITTER: f64 = 1e-2;
const LOCAL_SPREAD: f64 = 0.05;

pub struct BayesianOptimization;

static META: AlgorithmMeta = AlgorithmMeta {
    id: "bayesian_optimization",
    name: "Bayesian Optimisation",
    description: "Sample-efficient search that fits a Gaussian process to evaluated points and samples where expected improvement is largest.",
    formula: "EI(x) = (f* − μ(x) − ξ) Φ(z) + σ(x) φ(z),  z = (f* − μ(x) − ξ) / σ(x),  k(x, x') = exp(−‖x − x'‖² / 2ℓ²)",
    reference: "Jones, D. R., Schonlau, M., Welch, W. J. (1998). Efficient global optimization of expensive black-box functions. Journal of Global Optimization 13, 455-492.",
    safety_class: SafetyClass::Standard,
    domain: Domain::Optimization,
    inputs: &[
        PROBLEM_FIELDS[0],
        PROBLEM_FIELDS[1],
        PROBLEM_FIELDS[2],
        PROBLEM_FIELDS[3],
        PROBLEM_FIELDS[4],
        FieldSpec::optional("initial_samples", "-", "random points before the model is used, default 5"),
        FieldSpec::optional("iterations", "-", "model-guided evaluations, default 25"),
        FieldSpec::optional("candidates", "-", "acquisition candidates per iteration, default 500"),
        FieldSpec::optional("length_scale", "-", "RBF length scale on the unit cube, default 0.2"),
        FieldSpec::optional("exploration", "-", "EI margin ξ, default 0.01"),
    ],
    outputs: &RESULT_FIELDS,
};

#[derive(Debug, Clone)]
pub struct BoConfig {
    initial_samples: usize,
    iterations: usize,
    candidates: usize,
    length_scale: f64,
    exploration: f64,
}

impl BoConfig {
    fn parse(params: &mut ParamReader<'_>) -> Self {
        let initial_samples = params.optional_usize("initial_samples", 5);
        params.ensure_count("initial_samples", initial_samples, 2, 50);
        let iterations = params.optional_usize("iterations", 25);
        params.ensure_count("iterations", iterations, 1, 200);
        let candidates = params.optional_usize("candidates", 500);
        params.ensure_count("candidates", candidates, 10, 20_000);
        // Each acquisition prediction costs one pass over the samples seen so far.
        ensure_evaluation_budget(
            params,
            "candidates",
            &[
                ("candidates", candidates),
                ("iterations", iterations),
                (
                    "(initial_samples + iterations)",
                    initial_samples.saturating_add(iterations),
                ),
            ],
        );
        let length_scale = params.optional_f64("length_scale", 0.2);
        params.ensure(
            "length_scale",
            length_scale > 0.0 && length_scale <= 10.0,
            "must be in (0, 10]",
        );
        let exploration = params.optional_f64("exploration", 0.01);
        params.ensure_range("exploration", exploration, 0.0, 10.0);
        Self {
            initial_samples,
            iterations,
            candidates,
            length_scale,
            exploration,
        }
    }
}

/// GP posterior over standardised targets.
struct Surrogate {
    points: Vec<Vec<f64>>,
    factor: Matrix,
    alpha: Vec<f64>,
    length_scale: f64,
}

impl Surrogate {
    fn kernel(&self, a: &[f64], b: &[f64]) -> f64 {
        rbf(a, b, self.length_scale)
    }

    /// Fit to `points` (unit cube) and standardised `targets`, adding jitter
    /// to the diagonal until the Gram matrix factorises.
    fn fit(points: &[Vec<f64>], targets: &[f64], length_scale: f64) -> Option<Self> {
        let n = points.len();
        let mut jitter = NOISE;
        while jitter <= MAX_JITTER {
            let mut gram = Matrix::zeros(n, n);
            for i in 0..n {
                for j in 0..n {
                    gram[(i, j)] = rbf(&points[i], &points[j], length_scale);
                }
                gram[(i, i)] += jitter;
            }
            if let Ok(factor) = gram.cholesky()
                && let Ok(alpha) = Matrix::cholesky_solve(&factor, targets)
            {
                return Some(Self {
                    points: points.to_vec(),
                    factor,
                    alpha,
                    length_scale,
                });
            }
            jitter *= 10.0;
        }
        None
    }

    /// Posterior mean and standard deviation at `x`.
    fn predict(&self, x: &[f64]) -> (f64, f64) {
        let k: Vec<f64> = self.points.iter().map(|p| self.kernel(p, x)).collect();
        let mean = vector::dot(&k, &self.alpha);
        // v = L⁻¹ k by forward substitution.
        let n = k.len();
        let mut v = vec![0.0; n];
        for i in 0..n {
            let s: f64 = (0..i).map(|j| self.factor[(i, j)] * v[j]).sum();
            v[i] = (k[i] - s) / self.factor[(i, i)];
        }
        let variance = (1.0 - vector::dot(&v, &v)).max(1e-12);
        (mean, variance.sqrt())
    }
}

fn rbf(a: &[f64], b: &[f64], length_scale: f64) -> f64 {
    (-vector::squared_distance(a, b) / (2.0 * length_scale * length_scale)).exp()
}

fn expected_improvement(mean: f64, sd: f64, best: f64, xi: f64) -> f64 {
    let improvement = best - mean - xi;
    let z = improvement / sd;
    improvement * stats::normal_cdf(z) + sd * stats::normal_pdf(z)
}

impl Problem {
    fn to_unit(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .enumerate()
            .map(|(i, v)| (v - self.lower[i]) / self.span(i))
            .collect()
    }

    fn from_unit(&self, u: &[f64]) -> Vec<f64> {
        let mut x: Vec<f64> = u
            .iter()
            .enumerate()
            .map(|(i, v)| self.lower[i] + v.clamp(0.0, 1.0) * self.span(i))
            .collect();
        self.clamp(&mut x);
        x
    }
}

impl Algorithm for BayesianOptimization {
    type Input = (Problem, BoConfig);
    type Output = OptimizationResult;

    fn meta(&self) -> &'static AlgorithmMeta {
        &META
    }

    fn example(&self) -> Value {
        json!({
            "dimensions": 2,
            "lower_bounds": [-3.0, -3.0],
            "upper_bounds": [3.0, 3.0],
            "objective": "sphere",
            "initial_samples": 6,
            "iterations": 20,
            "seed": 21
        })
    }

    fn parse(&self, params: &mut ParamReader<'_>) -> (Problem, BoConfig) {
        (Problem::parse(params), BoConfig::parse(params))
    }

    fn calculate(
        &self,
        (problem, config): &(Problem, BoConfig),
    ) -> Result<ResultEnvelope<OptimizationResult>, AlgorithmError> {
        problem.check()?;
        let dims = problem.dimensions();
        let mut rng = SeededRng::new(problem.seed);
        let mut incumbent = Incumbent::new();
        let mut unit_points: Vec<Vec<f64>> = Vec::new();
        let mut values: Vec<f64> = Vec::new();
        let mut fallbacks = 0usize;

        for _ in 0..config.initial_samples {
            let x = problem.random_point(&mut rng);
            values.push(incumbent.evaluate(problem, &x));
            unit_points.push(problem.to_unit(&x));
        }

        for _ in 0..config.iterations {
            let mean = stats::mean(&values);
            let sd = stats::std_dev(&values);
            let sd = if sd > 1e-12 { sd } else { 1.0 };
            let targets: Vec<f64> = values.iter().map(|v| (v - mean) / sd).collect();
            let best_target = targets.iter().copied().fold(f64::INFINITY, f64::min);
            let best_unit = problem.to_unit(incumbent.best());

            let next_unit = match Surrogate::fit(&unit_points, &targets, config.length_scale) {
                Some(model) => {
                    let mut chosen = Vec::new();
                    let mut chosen_ei = f64::NEG_INFINITY;
                    for c in 0..config.candidates {
                        let candidate: Vec<f64> = if c % 2 == 0 {
                            (0..dims).map(|_| rng.unit()).collect()
                        } else {
                            best_unit
                                .iter()
                                .map(|u| (u + rng.normal(0.0, LOCAL_SPREAD)).clamp(0.0, 1.0))
                                .collect()
                        };
                        let (mu, sigma) = model.predict(&candidate);
                        let ei = expected_improvement(mu, sigma, best_target, config.exploration);
                        if ei > chosen_ei {
                            chosen_ei = ei;
                            chosen = candidate;
                        }
                    }
                    chosen
                }
                None => {
                    fallbacks += 1;
                    (0..dims).map(|_| rng.unit()).collect()
                }
            };

            let x = problem.from_unit(&next_unit);
            values.push(incumbent.evaluate(problem, &x));
            unit_points.push(problem.to_unit(&x));
            incumbent.end_iteration();
        }

        let mut envelope = incumbent.finish(problem);
        if fallbacks > 0 {
            envelope.warnings.push(format!(
                "surrogate could not be factorised in {fallbacks} iteration(s); a random point was sampled instead"
            ));
        }
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimize::checks::assert_well_formed;
    use crate::testing::run;

    #[test]
    fn expected_improvement_prefers_low_mean_and_high_uncertainty() {
        assert!(expected_improvement(-1.0, 0.1, 0.0, 0.0) > expected_improvement(0.5, 0.1, 0.0, 0.0));
        assert!(expected_improvement(0.5, 1.0, 0.0, 0.0) > expected_improvement(0.5, 0.1, 0.0, 0.0));
        assert!(expected_improvement(10.0, 1e-6, 0.0, 0.0) >= 0.0);
    }

    #[test]
    fn surrogate_interpolates_its_data() {
        let points = vec![vec![0.1], vec![0.5], vec![0.9]];
        let targets = vec![1.0, -1.0, 0.5];
        let model = Surrogate::fit(&points, &targets, 0.2).unwrap();
        for (p, t) in points.iter().zip(&targets) {
            let (mu, sigma) = model.predict(p);
            assert!((mu - t).abs() < 1e-3);
            assert!(sigma < 0.05);
        }
        let (_, far) = model.predict(&[0.3]);
        assert!(far > 0.05);
    }

    #[test]
    fn beats_its_random_start_on_sphere() {
        let p = BayesianOptimization.example();
        let out = run(&BayesianOptimization, p.clone()).result;
        assert_well_formed(&out, &p);
        assert_eq!(out.evaluations, 26);
        assert_eq!(out.iterations, 20);
        assert!(out.best_value < 0.5, "best {}", out.best_value);
    }
}
