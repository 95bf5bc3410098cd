//! Real-coded genetic algorithm: tournament selection, blend crossover,
//! Gaussian mutation, elitism.

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

/// BLX-α exploration beyond the parents' interval.
const BLEND_ALPHA: f64 = 0.5;
/// Mutation standard deviation as a fraction of each dimension's span.
const MUTATION_SCALE: f64 = 0.1;

pub struct GeneticAlgorithm;

static META: AlgorithmMeta = AlgorithmMeta {
    id: "genetic_algorithm",
    name: "Genetic Algorithm",
    description: "Population-based search with tournament selection, blend crossover, Gaussian mutation and elitism.",
    formula: "child_i ~ U[min(p1_i, p2_i) − αd, max(p1_i, p2_i) + αd],  d = |p1_i − p2_i|,  α = 0.5",
    reference: "Eshelman, L. J., Schaffer, J. D. (1993). Real-coded genetic algorithms and interval-schemata. Foundations of Genetic Algorithms 2, 187-202.",
    safety_class: SafetyClass::Standard,
    domain: Domain::Optimization,
    inputs: &[
        PROBLEM_FIELDS[0],
        PROBLEM_FIELDS[1],
        PROBLEM_FIELDS[2],
        PROBLEM_FIELDS[3],
        PROBLEM_FIELDS[4],
        FieldSpec::optional("population_size", "-", "individuals per generation, default 50"),
        FieldSpec::optional("generations", "-", "generations to evolve, default 100"),
        FieldSpec::optional("crossover_rate", "-", "probability of crossover, default 0.9"),
        FieldSpec::optional("mutation_rate", "-", "per-gene mutation probability, default 0.1"),
        FieldSpec::optional("elite_count", "-", "individuals copied unchanged, default 2"),
        FieldSpec::optional("tournament_size", "-", "contestants per selection, default 3"),
    ],
    outputs: &RESULT_FIELDS,
};

#[derive(Debug, Clone)]
pub struct GaConfig {
    population: usize,
    generations: usize,
    crossover_rate: f64,
    mutation_rate: f64,
    elites: usize,
    tournament: usize,
}

impl GaConfig {
    fn parse(params: &mut ParamReader<'_>) -> Self {
        let population = params.optional_usize("population_size", 50);
        params.ensure_count("population_size", population, 4, 10_000);
        let generations = params.optional_usize("generations", 100);
        params.ensure_count("generations", generations, 1, 100_000);
        let crossover_rate = params.optional_f64("crossover_rate", 0.9);
        params.ensure_range("crossover_rate", crossover_rate, 0.0, 1.0);
        let mutation_rate = params.optional_f64("mutation_rate", 0.1);
        params.ensure_range("mutation_rate", mutation_rate, 0.0, 1.0);
        let elites = params.optional_usize("elite_count", 2);
        params.ensure(
            "elite_count",
            elites < population,
            "must be smaller than population_size",
        );
        let tournament = params.optional_usize("tournament_size", 3);
        params.ensure_count("tournament_size", tournament, 1, population.max(1));
        ensure_evaluation_budget(
            params,
            "generations",
            &[("population_size", population), ("generations", generations)],
        );
        Self {
            population,
            generations,
            crossover_rate,
            mutation_rate,
            elites,
            tournament,
        }
    }
}

fn tournament<'p>(
    population: &'p [Vec<f64>],
    fitness: &[f64],
    size: usize,
    rng: &mut SeededRng,
) -> &'p [f64] {
    let mut winner = rng.index(population.len());
    for _ in 1..size {
        let challenger = rng.index(population.len());
        if fitness[challenger] < fitness[winner] {
            winner = challenger;
        }
    }
    &population[winner]
}

fn blend(a: &[f64], b: &[f64], rng: &mut SeededRng) -> Vec<f64> {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let (lo, hi) = if x <= y { (*x, *y) } else { (*y, *x) };
            let d = hi - lo;
            rng.uniform(lo - BLEND_ALPHA * d, hi + BLEND_ALPHA * d)
        })
        .collect()
}

impl Algorithm for GeneticAlgorithm {
    type Input = (Problem, GaConfig);
    type Output = OptimizationResult;

    fn meta(&self) -> &'static AlgorithmMeta {
        &META
    }

    fn example(&self) -> Value {
        json!({
            "dimensions": 2,
            "lower_bounds": [-5.12, -5.12],
            "upper_bounds": [5.12, 5.12],
            "objective": "rastrigin",
            "population_size": 40,
            "generations": 60,
            "seed": 7
        })
    }

    fn parse(&self, params: &mut ParamReader<'_>) -> (Problem, GaConfig) {
        (Problem::parse(params), GaConfig::parse(params))
    }

    fn calculate(
        &self,
        (problem, config): &(Problem, GaConfig),
    ) -> Result<ResultEnvelope<OptimizationResult>, AlgorithmError> {
        problem.check()?;
        if config.population < 2 || config.elites >= config.population {
            return Err(AlgorithmError::InvalidInput(
                "population must hold at least two individuals and more than the elites".into(),
            ));
        }
        let mut rng = SeededRng::new(problem.seed);
        let mut incumbent = Incumbent::new();

        let mut population: Vec<Vec<f64>> = (0..config.population)
            .map(|_| problem.random_point(&mut rng))
            .collect();
        let mut fitness: Vec<f64> = population
            .iter()
            .map(|x| incumbent.evaluate(problem, x))
            .collect();

        for _ in 0..config.generations {
            let mut order: Vec<usize> = (0..population.len()).collect();
            order.sort_by(|&a, &b| fitness[a].total_cmp(&fitness[b]));

            let mut next: Vec<Vec<f64>> = Vec::with_capacity(config.population);
            let mut next_fitness: Vec<f64> = Vec::with_capacity(config.population);
            for &i in order.iter().take(config.elites) {
                next.push(population[i].clone());
                next_fitness.push(fitness[i]);
            }

            while next.len() < config.population {
                let a = tournament(&population, &fitness, config.tournament, &mut rng);
                let b = tournament(&population, &fitness, config.tournament, &mut rng);
                let mut child = if rng.chance(config.crossover_rate) {
                    blend(a, b, &mut rng)
                } else {
                    a.to_vec()
                };
                for (i, gene) in child.iter_mut().enumerate() {
                    if rng.chance(config.mutation_rate) {
                        *gene += rng.normal(0.0, MUTATION_SCALE * problem.span(i));
                    }
                }
                problem.clamp(&mut child);
                next_fitness.push(incumbent.evaluate(problem, &child));
                next.push(child);
            }

            population = next;
            fitness = next_fitness;
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
    fn finds_the_sphere_basin() {
        let p = json!({
            "dimensions": 3,
            "lower_bounds": [-10.0, -10.0, -10.0],
            "upper_bounds": [10.0, 10.0, 10.0],
            "generations": 150,
            "seed": 3
        });
        let out = run(&GeneticAlgorithm, p.clone()).result;
        assert_well_formed(&out, &p);
        assert!(out.best_value < 0.05, "best {}", out.best_value);
        assert_eq!(out.iterations, 150);
        assert_eq!(out.evaluations, 50 + 150 * 48);
    }

    #[test]
    fn same_seed_same_answer() {
        let a = run(&GeneticAlgorithm, GeneticAlgorithm.example()).result;
        let b = run(&GeneticAlgorithm, GeneticAlgorithm.example()).result;
        assert_eq!(a.best_solution, b.best_solution);
        assert_eq!(a.convergence, b.convergence);
    }

    #[test]
    fn elites_must_fit_in_the_population() {
        let mut p = GeneticAlgorithm.example();
        p["elite_count"] = json!(40);
        let (_, issues) = parse(&GeneticAlgorithm, p);
        assert_eq!(error_fields(&issues), vec!["elite_count"]);
    }

    #[test]
    fn results_stay_inside_narrow_bounds() {
        let p = json!({
            "dimensions": 2,
            "lower_bounds": [1.0, 2.0],
            "upper_bounds": [1.5, 2.25],
            "objective": "ackley",
            "generations": 20
        });
        let out = run(&GeneticAlgorithm, p.clone()).result;
        assert_well_formed(&out, &p);
    }
}
