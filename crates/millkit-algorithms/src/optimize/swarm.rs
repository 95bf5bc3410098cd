//! Global-best particle swarm optimisation with inertia weight.

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

/// Velocity clamp as a fraction of each dimension's span.
const MAX_VELOCITY_FRACTION: f64 = 0.2;

pub struct ParticleSwarm;

static META: AlgorithmMeta = AlgorithmMeta {
    id: "particle_swarm",
    name: "Particle Swarm Optimisation",
    description: "Swarm of particles pulled towards their own best and the swarm's best position.",
    formula: "v ← w v + c₁ r₁ (p_best − x) + c₂ r₂ (g_best − x),  x ← x + v",
    reference: "Kennedy, J., Eberhart, R. (1995). Particle swarm optimization. Proc. IEEE Int. Conf. on Neural Networks, 1942-1948; Shi, Y., Eberhart, R. (1998). A modified particle swarm optimizer. IEEE WCCI, 69-73.",
    safety_class: SafetyClass::Standard,
    domain: Domain::Optimization,
    inputs: &[
        PROBLEM_FIELDS[0],
        PROBLEM_FIELDS[1],
        PROBLEM_FIELDS[2],
        PROBLEM_FIELDS[3],
        PROBLEM_FIELDS[4],
        FieldSpec::optional("swarm_size", "-", "particles, default 30"),
        FieldSpec::optional("iterations", "-", "velocity updates, default 200"),
        FieldSpec::optional("inertia", "-", "w, default 0.7"),
        FieldSpec::optional("cognitive", "-", "c₁, default 1.5"),
        FieldSpec::optional("social", "-", "c₂, default 1.5"),
    ],
    outputs: &RESULT_FIELDS,
};

#[derive(Debug, Clone)]
pub struct PsoConfig {
    swarm: usize,
    iterations: usize,
    inertia: f64,
    cognitive: f64,
    social: f64,
}

impl PsoConfig {
    fn parse(params: &mut ParamReader<'_>) -> Self {
        let swarm = params.optional_usize("swarm_size", 30);
        params.ensure_count("swarm_size", swarm, 2, 10_000);
        let iterations = params.optional_usize("iterations", 200);
        params.ensure_count("iterations", iterations, 1, 100_000);
        ensure_evaluation_budget(
            params,
            "iterations",
            &[("swarm_size", swarm), ("iterations", iterations)],
        );
        let inertia = params.optional_f64("inertia", 0.7);
        params.ensure_range("inertia", inertia, 0.0, 1.5);
        let cognitive = params.optional_f64("cognitive", 1.5);
        params.ensure_range("cognitive", cognitive, 0.0, 4.0);
        let social = params.optional_f64("social", 1.5);
        params.ensure_range("social", social, 0.0, 4.0);
        if inertia >= 1.0 && !params.failed("inertia") {
            params.warning("inertia", "inertia of 1 or more lets velocities grow; the swarm may not settle");
        }
        Self {
            swarm,
            iterations,
            inertia,
            cognitive,
            social,
        }
    }
}

struct Particle {
    position: Vec<f64>,
    velocity: Vec<f64>,
    best: Vec<f64>,
    best_value: f64,
}

impl Algorithm for ParticleSwarm {
    type Input = (Problem, PsoConfig);
    type Output = OptimizationResult;

    fn meta(&self) -> &'static AlgorithmMeta {
        &META
    }

    fn example(&self) -> Value {
        json!({
            "dimensions": 4,
            "lower_bounds": [-32.0, -32.0, -32.0, -32.0],
            "upper_bounds": [32.0, 32.0, 32.0, 32.0],
            "objective": "ackley",
            "swarm_size": 30,
            "iterations": 150,
            "seed": 5
        })
    }

    fn parse(&self, params: &mut ParamReader<'_>) -> (Problem, PsoConfig) {
        (Problem::parse(params), PsoConfig::parse(params))
    }

    fn calculate(
        &self,
        (problem, config): &(Problem, PsoConfig),
    ) -> Result<ResultEnvelope<OptimizationResult>, AlgorithmError> {
        problem.check()?;
        let dims = problem.dimensions();
        let vmax: Vec<f64> = (0..dims)
            .map(|i| MAX_VELOCITY_FRACTION * problem.span(i))
            .collect();
        let mut rng = SeededRng::new(problem.seed);
        let mut incumbent = Incumbent::new();

        let mut particles: Vec<Particle> = (0..config.swarm)
            .map(|_| {
                let position = problem.random_point(&mut rng);
                let velocity = vmax.iter().map(|v| rng.uniform(-v, *v)).collect();
                let value = incumbent.evaluate(problem, &position);
                Particle {
                    best: position.clone(),
                    position,
                    velocity,
                    best_value: value,
                }
            })
            .collect();

        for _ in 0..config.iterations {
            let global = incumbent.best().to_vec();
            for particle in &mut particles {
                for i in 0..dims {
                    let r1 = rng.unit();
                    let r2 = rng.unit();
                    let v = config.inertia * particle.velocity[i]
                        + config.cognitive * r1 * (particle.best[i] - particle.position[i])
                        + config.social * r2 * (global[i] - particle.position[i]);
                    particle.velocity[i] = v.clamp(-vmax[i], vmax[i]);
                    particle.position[i] += particle.velocity[i];
                }
                problem.clamp(&mut particle.position);
                let value = incumbent.evaluate(problem, &particle.position);
                if value < particle.best_value {
                    particle.best_value = value;
                    particle.best.clone_from(&particle.position);
                }
            }
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
    fn converges_on_sphere() {
        let p = json!({
            "dimensions": 5,
            "lower_bounds": [-5.0, -5.0, -5.0, -5.0, -5.0],
            "upper_bounds": [5.0, 5.0, 5.0, 5.0, 5.0],
            "iterations": 200
        });
        let out = run(&ParticleSwarm, p.clone()).result;
        assert_well_formed(&out, &p);
        assert!(out.best_value < 1e-3, "best {}", out.best_value);
        assert_eq!(out.evaluations, 30 + 30 * 200);
    }

    #[test]
    fn ackley_result_is_well_formed_and_repeatable() {
        let p = ParticleSwarm.example();
        let a = run(&ParticleSwarm, p.clone()).result;
        let b = run(&ParticleSwarm, p.clone()).result;
        assert_well_formed(&a, &p);
        assert_eq!(a.best_solution, b.best_solution);
    }

    #[test]
    fn oversized_search_is_rejected_at_the_gate() {
        let mut p = ParticleSwarm.example();
        p["swarm_size"] = json!(10_000);
        p["iterations"] = json!(100_000);
        let (_, issues) = parse(&ParticleSwarm, p);
        assert_eq!(error_fields(&issues), vec!["iterations"]);
        assert!(issues[0].message.contains("swarm_size × iterations"));
    }
}
