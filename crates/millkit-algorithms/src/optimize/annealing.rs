//! Simulated annealing with geometric cooling and Gaussian neighbourhoods.

use super::{Incumbent, OptimizationResult, PROBLEM_FIELDS, Problem, RESULT_FIELDS};
use millkit_kernel::{
    Algorithm, AlgorithmError, AlgorithmMeta, Domain, FieldSpec, ParamReader, ResultEnvelope,
    SafetyClass,
};
use millkit_numerics::SeededRng;
use serde_json::{Value, json};

const MIN_TEMPERATURE: f64 = 1e-12;

pub struct SimulatedAnnealing;

static META: AlgorithmMeta = AlgorithmMeta {
    id: "simulated_annealing",
    name: "Simulated Annealing",
    description: "Single-point stochastic search accepting uphill moves with Metropolis probability under a geometric cooling schedule.",
    formula: "P(accept) = min(1, exp(−Δf / T_k)),  T_k = T₀ · α^k",
    reference: "Kirkpatrick, S., Gelatt, C. D., Vecchi, M. P. (1983). Optimization by simulated annealing. Science 220(4598), 671-680.",
    safety_class: SafetyClass::Standard,
    domain: Domain::Optimization,
    inputs: &[
        PROBLEM_FIELDS[0],
        PROBLEM_FIELDS[1],
        PROBLEM_FIELDS[2],
        PROBLEM_FIELDS[3],
        PROBLEM_FIELDS[4],
        FieldSpec::optional("iterations", "-", "moves to attempt, default 5000"),
        FieldSpec::optional("initial_temperature", "-", "T₀, default 100"),
        FieldSpec::optional("cooling_rate", "-", "α in (0, 1), default 0.995"),
        FieldSpec::optional("step_size", "-", "neighbour std-dev as a fraction of each span, default 0.1"),
        FieldSpec::optional("initial_solution", "-", "starting point inside the bounds; random by default"),
    ],
    outputs: &RESULT_FIELDS,
};

#[derive(Debug, Clone)]
pub struct SaConfig {
    iterations: usize,
    initial_temperature: f64,
    cooling_rate: f64,
    step_size: f64,
    start: Option<Vec<f64>>,
}

impl SaConfig {
    fn parse(params: &mut ParamReader<'_>, problem: &Problem) -> Self {
        let iterations = params.optional_usize("iterations", 5000);
        params.ensure_count("iterations", iterations, 1, 1_000_000);
        let initial_temperature = params.optional_f64("initial_temperature", 100.0);
        params.ensure_positive("initial_temperature", initial_temperature);
        let cooling_rate = params.optional_f64("cooling_rate", 0.995);
        params.ensure(
            "cooling_rate",
            cooling_rate > 0.0 && cooling_rate < 1.0,
            "must be in (0, 1)",
        );
        let step_size = params.optional_f64("step_size", 0.1);
        params.ensure(
            "step_size",
            step_size > 0.0 && step_size <= 1.0,
            "must be in (0, 1]",
        );
        let start = params.optional_f64_array("initial_solution");
        if let Some(x) = &start
            && !params.failed("lower_bounds")
            && !params.failed("upper_bounds")
            && params.ensure_len("initial_solution", x.len(), problem.dimensions())
        {
            let outside = x
                .iter()
                .zip(problem.lower.iter().zip(&problem.upper))
                .position(|(v, (lo, hi))| v < lo || v > hi);
            if let Some(i) = outside {
                params.error(
                    "initial_solution",
                    format!("initial_solution[{i}] lies outside the bounds"),
                );
            }
        }
        Self {
            iterations,
            initial_temperature,
            cooling_rate,
            step_size,
            start,
        }
    }
}

impl Algorithm for SimulatedAnnealing {
    type Input = (Problem, SaConfig);
    type Output = OptimizationResult;

    fn meta(&self) -> &'static AlgorithmMeta {
        &META
    }

    fn example(&self) -> Value {
        json!({
            "dimensions": 2,
            "lower_bounds": [-2.0, -1.0],
            "upper_bounds": [2.0, 3.0],
            "objective": "rosenbrock",
            "iterations": 4000,
            "initial_temperature": 10.0,
            "seed": 11
        })
    }

    fn parse(&self, params: &mut ParamReader<'_>) -> (Problem, SaConfig) {
        let problem = Problem::parse(params);
        let config = SaConfig::parse(params, &problem);
        (problem, config)
    }

    fn calculate(
        &self,
        (problem, config): &(Problem, SaConfig),
    ) -> Result<ResultEnvelope<OptimizationResult>, AlgorithmError> {
        problem.check()?;
        let mut rng = SeededRng::new(problem.seed);
        let mut incumbent = Incumbent::new();

        let mut current = match &config.start {
            Some(x) if x.len() == problem.dimensions() => x.clone(),
            _ => problem.random_point(&mut rng),
        };
        problem.clamp(&mut current);
        let mut current_value = incumbent.evaluate(problem, &current);
        let mut temperature = config.initial_temperature;

        for _ in 0..config.iterations {
            let mut candidate: Vec<f64> = current
                .iter()
                .enumerate()
                .map(|(i, x)| x + rng.normal(0.0, config.step_size * problem.span(i)))
                .collect();
            problem.clamp(&mut candidate);
            let value = incumbent.evaluate(problem, &candidate);
            let delta = value - current_value;
            if delta <= 0.0 || rng.unit() < (-delta / temperature.max(MIN_TEMPERATURE)).exp() {
                current = candidate;
                current_value = value;
            }
            temperature *= config.cooling_rate;
            incumbent.end_iteration();
        }

        Ok(incumbent.finish(problem))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimize::checks::assert_well_formed;
    use crate::testing::{error_fields, parse, run};

    #[test]
    fn descends_rosenbrock_valley() {
        let p = SimulatedAnnealing.example();
        let out = run(&SimulatedAnnealing, p.clone()).result;
        assert_well_formed(&out, &p);
        assert!(out.best_value < 1.0, "best {}", out.best_value);
        assert_eq!(out.evaluations, 4001);
    }

    #[test]
    fn seed_changes_the_trajectory() {
        let mut other = SimulatedAnnealing.example();
        other["seed"] = json!(12);
        let a = run(&SimulatedAnnealing, SimulatedAnnealing.example()).result;
        let b = run(&SimulatedAnnealing, other).result;
        assert_ne!(a.convergence, b.convergence);
    }

    #[test]
    fn start_point_must_be_inside_bounds() {
        let mut p = SimulatedAnnealing.example();
        p["initial_solution"] = json!([0.0, 5.0]);
        let (_, issues) = parse(&SimulatedAnnealing, p);
        assert_eq!(error_fields(&issues), vec!["initial_solution"]);
        assert!(issues[0].message.contains("[1]"));
    }

    #[test]
    fn explicit_start_is_evaluated_first() {
        let mut p = SimulatedAnnealing.example();
        p["initial_solution"] = json!([1.0, 1.0]);
        p["iterations"] = json!(10);
        let out = run(&SimulatedAnnealing, p).result;
        assert_eq!(out.best_value, 0.0);
        assert_eq!(out.best_solution, vec![1.0, 1.0]);
    }
}
