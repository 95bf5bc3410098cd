//! Ant colony optimisation for continuous domains (ACO_R).
//!
//! The pheromone trail is a ranked archive of solutions. Each ant picks a
//! guide from the archive with rank-based Gaussian weights and samples every
//! coordinate from a normal centred on the guide, with a spread proportional
//! to the archive's mean distance from it.

use super::{
    Incumbent, OptimizationResult, PROBLEM_FIELDS, Problem, RESULT_FIELDS,
    ensure_evaluation_budget,
};
use millkit_kernel::{
    Algorithm, AlgorithmError, AlgorithmMeta, Domain, FieldSpec, ParamReader, ResultEnvelope,
    SafetyClass,
};
use millkit_numerics::SeededRng;
use serde_json::{Value, json};

/// Floor on the sampling spread, relative to each span.
const MIN_SPREAD_FRACTION: f64 = 1e-9;

pub struct AntColony;

static META: AlgorithmMeta = AlgorithmMeta {
    id: "ant_colony",
    name: "Ant Colony Optimisation (ACO_R)",
    description: "Continuous ant colony search over a ranked solution archive with Gaussian kernel sampling.",
    formula: "w_l = exp(−(l − 1)² / (2 q² k²)),  σ_i = ξ Σ_e |s_e,i − s_l,i| / (k − 1),  x_i ~ N(s_l,i, σ_i)",
    reference: "Socha, K., Dorigo, M. (2008). Ant colony optimization for continuous domains. European Journal of Operational Research 185(3), 1155-1173.",
    safety_class: SafetyClass::Standard,
    domain: Domain::Optimization,
    inputs: &[
        PROBLEM_FIELDS[0],
        PROBLEM_FIELDS[1],
        PROBLEM_FIELDS[2],
        PROBLEM_FIELDS[3],
        PROBLEM_FIELDS[4],
        FieldSpec::optional("archive_size", "-", "k, solutions kept as pheromone, default 10"),
        FieldSpec::optional("ants", "-", "new solutions per iteration, default 20"),
        FieldSpec::optional("iterations", "-", "iterations, default 100"),
        FieldSpec::optional("locality", "-", "q, smaller favours the best ranks, default 0.5"),
        FieldSpec::optional("evaporation", "-", "ξ, spread multiplier, default 0.85"),
    ],
    outputs: &RESULT_FIELDS,
};

#[derive(Debug, Clone)]
pub struct AcoConfig {
    archive: usize,
    ants: usize,
    iterations: usize,
    locality: f64,
    evaporation: f64,
}

impl AcoConfig {
    fn parse(params: &mut ParamReader<'_>) -> Self {
        let archive = params.optional_usize("archive_size", 10);
        params.ensure_count("archive_size", archive, 2, 500);
        let ants = params.optional_usize("ants", 20);
        params.ensure_count("ants", ants, 1, 5_000);
        let iterations = params.optional_usize("iterations", 100);
        params.ensure_count("iterations", iterations, 1, 100_000);
        ensure_evaluation_budget(params, "iterations", &[("ants", ants), ("iterations", iterations)]);
        let locality = params.optional_f64("locality", 0.5);
        params.ensure(
            "locality",
            locality > 0.0 && locality <= 10.0,
            "must be in (0, 10]",
        );
        let evaporation = params.optional_f64("evaporation", 0.85);
        params.ensure(
            "evaporation",
            evaporation > 0.0 && evaporation <= 5.0,
            "must be in (0, 5]",
        );
        Self {
            archive,
            ants,
            iterations,
            locality,
            evaporation,
        }
    }
}

fn rank_weights(k: usize, q: f64) -> Vec<f64> {
    let spread = 2.0 * q * q * (k * k) as f64;
    (0..k).map(|l| (-((l * l) as f64) / spread).exp()).collect()
}

fn sort_archive(archive: &mut [(Vec<f64>, f64)]) {
    archive.sort_by(|a, b| a.1.total_cmp(&b.1));
}

impl Algorithm for AntColony {
    type Input = (Problem, AcoConfig);
    type Output = OptimizationResult;

    fn meta(&self) -> &'static AlgorithmMeta {
        &META
    }

    fn example(&self) -> Value {
        json!({
            "dimensions": 3,
            "lower_bounds": [-5.0, -5.0, -5.0],
            "upper_bounds": [5.0, 5.0, 5.0],
            "objective": "sphere",
            "archive_size": 10,
            "ants": 20,
            "iterations": 80,
            "seed": 9
        })
    }

    fn parse(&self, params: &mut ParamReader<'_>) -> (Problem, AcoConfig) {
        (Problem::parse(params), AcoConfig::parse(params))
    }

    fn calculate(
        &self,
        (problem, config): &(Problem, AcoConfig),
    ) -> Result<ResultEnvelope<OptimizationResult>, AlgorithmError> {
        problem.check()?;
        if config.archive < 2 {
            return Err(AlgorithmError::InvalidInput(
                "archive must hold at least two solutions".into(),
            ));
        }
        let dims = problem.dimensions();
        let k = config.archive;
        let weights = rank_weights(k, config.locality);
        let mut rng = SeededRng::new(problem.seed);
        let mut incumbent = Incumbent::new();

        let mut archive: Vec<(Vec<f64>, f64)> = (0..k)
            .map(|_| {
                let x = problem.random_point(&mut rng);
                let value = incumbent.evaluate(problem, &x);
                (x, value)
            })
            .collect();
        sort_archive(&mut archive);

        for _ in 0..config.iterations {
            let mut offspring = Vec::with_capacity(config.ants);
            for _ in 0..config.ants {
                let guide = &archive[rng.weighted_index(&weights).min(k - 1)].0;
                let mut x: Vec<f64> = (0..dims)
                    .map(|i| {
                        let mean_distance = archive
                            .iter()
                            .map(|(s, _)| (s[i] - guide[i]).abs())
                            .sum::<f64>()
                            / (k - 1) as f64;
                        let sigma = (config.evaporation * mean_distance)
                            .max(MIN_SPREAD_FRACTION * problem.span(i));
                        rng.normal(guide[i], sigma)
                    })
                    .collect();
                problem.clamp(&mut x);
                let value = incumbent.evaluate(problem, &x);
                offspring.push((x, value));
            }
            archive.extend(offspring);
            sort_archive(&mut archive);
            archive.truncate(k);
            incumbent.end_iteration();
        }

        Ok(incumbent.finish(problem))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimize::checks::assert_well_formed;
    use crate::testing::run;

    #[test]
    fn weights_decrease_with_rank() {
        let w = rank_weights(5, 0.5);
        assert_eq!(w[0], 1.0);
        assert!(w.windows(2).all(|p| p[1] < p[0]));
    }

    #[test]
    fn archive_search_closes_in_on_sphere_minimum() {
        let p = AntColony.example();
        let out = run(&AntColony, p.clone()).result;
        assert_well_formed(&out, &p);
        assert!(out.best_value < 1e-2, "best {}", out.best_value);
        assert_eq!(out.evaluations, 10 + 20 * 80);
    }

    #[test]
    fn rastrigin_in_tight_bounds_is_feasible() {
        let p = json!({
            "dimensions": 2,
            "lower_bounds": [2.0, 2.0],
            "upper_bounds": [3.0, 4.0],
            "objective": "rastrigin",
            "iterations": 30
        });
        let out = run(&AntColony, p.clone()).result;
        assert_well_formed(&out, &p);
    }
}
