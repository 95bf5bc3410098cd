//! Seeded metaheuristics over a box-bounded continuous search space.
//!
//! All optimisers share the problem description ([`Problem`]: objective,
//! bounds, seed), the output shape ([`OptimizationResult`]) and the
//! bookkeeping of the best point seen so far ([`Incumbent`]). Every
//! candidate is clamped into the bounds before it is evaluated, so the
//! reported solution is always feasible, and every random draw comes from
//! one [`SeededRng`] built from the caller's seed.

use millkit_kernel::{AlgorithmError, FieldSpec, ParamReader, ResultEnvelope};
use millkit_numerics::{SeededRng, finite_or, vector};
use serde::Serialize;
use std::f64::consts::{E, TAU};

pub mod annealing;
pub mod ant_colony;
pub mod bayesian;
pub mod genetic;
pub mod swarm;

pub const OBJECTIVES: &[&str] = &["sphere", "rastrigin", "rosenbrock", "ackley"];
pub const DEFAULT_SEED: u64 = 42;
const MAX_DIMENSIONS: usize = 50;
const MAX_ABS_BOUND: f64 = 1e6;
/// Ceiling on the work one run may request, counted in objective or
/// surrogate evaluations.
pub(crate) const MAX_EVALUATIONS: usize = 10_000_000;

/// Fields common to every optimiser, in declaration order.
pub(crate) const PROBLEM_FIELDS: [FieldSpec; 5] = [
    FieldSpec::required("dimensions", "-", "number of decision variables, 1-50"),
    FieldSpec::required("lower_bounds", "-", "per-dimension lower bound"),
    FieldSpec::required("upper_bounds", "-", "per-dimension upper bound, strictly above the lower"),
    FieldSpec::optional("objective", "-", "sphere | rastrigin | rosenbrock | ackley (default sphere)"),
    FieldSpec::optional("seed", "-", "random seed, default 42"),
];

pub(crate) const RESULT_FIELDS: [FieldSpec; 7] = [
    FieldSpec::output("objective", "-", "objective that was minimised"),
    FieldSpec::output("best_solution", "-", "best point found, inside the bounds"),
    FieldSpec::output("best_value", "-", "objective at best_solution"),
    FieldSpec::output("convergence", "-", "best value after each iteration"),
    FieldSpec::output("evaluations", "-", "objective evaluations spent"),
    FieldSpec::output("iterations", "-", "iterations run"),
    FieldSpec::output("seed", "-", "seed used"),
];

/// Built-in benchmark objectives, all minimised with optimum 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    Sphere,
    Rastrigin,
    Rosenbrock,
    Ackley,
}

impl Objective {
    pub fn from_name(name: &str) -> Self {
        match name {
            "rastrigin" => Self::Rastrigin,
            "rosenbrock" => Self::Rosenbrock,
            "ackley" => Self::Ackley,
            _ => Self::Sphere,
        }
    }

    pub fn evaluate(self, x: &[f64]) -> f64 {
        match self {
            Self::Sphere => x.iter().map(|v| v * v).sum(),
            Self::Rastrigin => {
                10.0 * x.len() as f64
                    + x.iter()
                        .map(|v| v * v - 10.0 * (TAU * v).cos())
                        .sum::<f64>()
            }
            Self::Rosenbrock => x
                .windows(2)
                .map(|w| 100.0 * (w[1] - w[0] * w[0]).powi(2) + (1.0 - w[0]).powi(2))
                .sum(),
            Self::Ackley => {
                if x.is_empty() {
                    return 0.0;
                }
                let n = x.len() as f64;
                let sq = x.iter().map(|v| v * v).sum::<f64>() / n;
                let cos = x.iter().map(|v| (TAU * v).cos()).sum::<f64>() / n;
                -20.0 * (-0.2 * sq.sqrt()).exp() - cos.exp() + 20.0 + E
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Problem {
    pub objective: Objective,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    pub seed: u64,
}

impl Problem {
    pub fn parse(params: &mut ParamReader<'_>) -> Self {
        let dimensions = params.required_usize("dimensions");
        params.ensure_count("dimensions", dimensions, 1, MAX_DIMENSIONS);
        let lower = params.required_f64_array("lower_bounds");
        let upper = params.required_f64_array("upper_bounds");
        if !params.failed("dimensions") {
            if params.has("lower_bounds") {
                params.ensure_len("lower_bounds", lower.len(), dimensions);
            }
            if params.has("upper_bounds") {
                params.ensure_len("upper_bounds", upper.len(), dimensions);
            }
        }
        let in_range = |b: &[f64]| b.iter().all(|v| v.abs() <= MAX_ABS_BOUND);
        params.ensure(
            "lower_bounds",
            in_range(lower.as_slice()),
            format!("entries must lie within ±{MAX_ABS_BOUND:e}"),
        );
        params.ensure(
            "upper_bounds",
            in_range(upper.as_slice()),
            format!("entries must lie within ±{MAX_ABS_BOUND:e}"),
        );
        if !params.failed("lower_bounds") && !params.failed("upper_bounds") {
            if let Some(i) = lower.iter().zip(&upper).position(|(lo, hi)| lo >= hi) {
                params.error(
                    "upper_bounds",
                    format!("upper_bounds[{i}] must be greater than lower_bounds[{i}]"),
                );
            }
        }
        let objective = Objective::from_name(params.choice("objective", OBJECTIVES, "sphere"));
        if objective == Objective::Rosenbrock && dimensions == 1 {
            params.warning("objective", "rosenbrock is constant in one dimension");
        }
        let seed = params.optional_u64("seed", DEFAULT_SEED);
        Self {
            objective,
            lower,
            upper,
            seed,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.lower.len()
    }

    /// Refuse a problem that cannot be searched; only the benchmark path
    /// can get here with one.
    pub fn check(&self) -> Result<(), AlgorithmError> {
        if self.lower.is_empty() || self.lower.len() != self.upper.len() {
            return Err(AlgorithmError::InvalidInput(format!(
                "bounds must be non-empty and equally long (got {} and {})",
                self.lower.len(),
                self.upper.len()
            )));
        }
        if self.lower.iter().zip(&self.upper).any(|(lo, hi)| lo >= hi) {
            return Err(AlgorithmError::InvalidInput(
                "every lower bound must be below its upper bound".into(),
            ));
        }
        Ok(())
    }

    pub fn span(&self, i: usize) -> f64 {
        self.upper[i] - self.lower[i]
    }

    pub fn clamp(&self, x: &mut [f64]) {
        vector::clamp_into(x, &self.lower, &self.upper);
    }

    pub fn random_point(&self, rng: &mut SeededRng) -> Vec<f64> {
        self.lower
            .iter()
            .zip(&self.upper)
            .map(|(lo, hi)| rng.uniform(*lo, *hi))
            .collect()
    }

    pub fn evaluate(&self, x: &[f64]) -> f64 {
        finite_or(self.objective.evaluate(x), f64::MAX)
    }
}

/// Reject a configuration whose `factors` multiply past [`MAX_EVALUATIONS`].
/// The issue lands on `field`; factors that already failed their own
/// checks are not reported twice.
pub(crate) fn ensure_evaluation_budget(
    params: &mut ParamReader<'_>,
    field: &str,
    factors: &[(&str, usize)],
) -> bool {
    if factors.iter().any(|(name, _)| params.failed(name)) {
        return false;
    }
    let work = factors
        .iter()
        .fold(1usize, |acc, (_, n)| acc.saturating_mul(*n));
    let names: Vec<&str> = factors.iter().map(|(name, _)| *name).collect();
    params.ensure(
        field,
        work <= MAX_EVALUATIONS,
        format!("{} must not exceed {MAX_EVALUATIONS}", names.join(" × ")),
    )
}

/// Shared output of every optimiser.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizationResult {
    pub objective: Objective,
    pub best_solution: Vec<f64>,
    pub best_value: f64,
    pub convergence: Vec<f64>,
    pub evaluations: usize,
    pub iterations: usize,
    pub seed: u64,
}

/// Best point seen so far plus the convergence curve.
#[derive(Debug)]
pub struct Incumbent {
    best: Vec<f64>,
    value: f64,
    curve: Vec<f64>,
    evaluations: usize,
}

impl Incumbent {
    pub fn new() -> Self {
        Self {
            best: Vec::new(),
            value: f64::INFINITY,
            curve: Vec::new(),
            evaluations: 0,
        }
    }

    /// Evaluate `x` (already clamped), keep it if it improves, return its value.
    pub fn evaluate(&mut self, problem: &Problem, x: &[f64]) -> f64 {
        let value = problem.evaluate(x);
        self.evaluations += 1;
        if value < self.value {
            self.value = value;
            self.best = x.to_vec();
        }
        value
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn best(&self) -> &[f64] {
        &self.best
    }

    pub fn end_iteration(&mut self) {
        self.curve.push(self.value);
    }

    pub fn finish(self, problem: &Problem) -> ResultEnvelope<OptimizationResult> {
        let mut warnings = Vec::new();
        let iterations = self.curve.len();
        if iterations >= 8 && self.value > 1e-6 {
            let tail = &self.curve[iterations - iterations / 4 - 1..];
            if tail.iter().all(|v| *v == self.value) {
                warnings.push(
                    "no improvement over the final quarter of iterations; the search may be stuck in a local minimum"
                        .to_string(),
                );
            }
        }
        let value = if self.value.is_finite() { self.value } else { f64::MAX };
        ResultEnvelope::with_warnings(
            OptimizationResult {
                objective: problem.objective,
                best_solution: self.best,
                best_value: value,
                convergence: self.curve,
                evaluations: self.evaluations,
                iterations,
                seed: problem.seed,
            },
            warnings,
        )
    }
}

impl Default for Incumbent {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod checks {
    //! Assertions every optimiser must satisfy.

    use super::*;
    use serde_json::Value;

    pub fn assert_well_formed(out: &OptimizationResult, params: &Value) {
        let lower: Vec<f64> = serde_json::from_value(params["lower_bounds"].clone()).unwrap();
        let upper: Vec<f64> = serde_json::from_value(params["upper_bounds"].clone()).unwrap();
        assert_eq!(out.best_solution.len(), lower.len());
        for ((x, lo), hi) in out.best_solution.iter().zip(&lower).zip(&upper) {
            assert!(lo <= x && x <= hi, "{x} outside [{lo}, {hi}]");
        }
        assert_eq!(out.objective.evaluate(&out.best_solution), out.best_value);
        assert!(out.convergence.windows(2).all(|w| w[1] <= w[0]));
        assert_eq!(out.convergence.last().copied(), Some(out.best_value));
    }
}
