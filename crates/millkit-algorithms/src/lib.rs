//! # Millkit Algorithms
//!
//! Every concrete method Millkit ships, grouped by family:
//!
//! | Module            | Ids |
//! |-------------------|-----|
//! | [`physics`]       | `kienzle_force`, `taylor_tool_life`, `johnson_cook`, `chip_thinning`, `stability_lobes` |
//! | [`optimize`]      | `genetic_algorithm`, `simulated_annealing`, `particle_swarm`, `bayesian_optimization`, `ant_colony` |
//! | [`signal`]        | `fft`, `stft`, `wavelet`, `kalman_filter`, `pid_controller`, `fuzzy_controller`, `digital_twin_fusion` |
//! | [`combinatorial`] | `ilp_assignment`, `csp_setup_planning`, `job_shop`, `tsp` |
//! | [`learn`]         | `kmeans`, `regression`, `decision_tree`, `interpolation`, `fea_2d` |
//!
//! Each algorithm is a unit struct implementing [`millkit_kernel::Algorithm`];
//! [`catalogue`] lists them and [`default_registry`] freezes them into a
//! [`Registry`].

use millkit_kernel::{DynAlgorithm, Registry, RegistryError};

pub mod combinatorial;
pub mod learn;
mod nested;
pub mod optimize;
pub mod physics;
pub mod signal;

/// One boxed instance of every shipped algorithm.
pub fn catalogue() -> Vec<Box<dyn DynAlgorithm>> {
    vec![
        Box::new(physics::kienzle::KienzleForce),
        Box::new(physics::taylor::TaylorToolLife),
        Box::new(physics::johnson_cook::JohnsonCook),
        Box::new(physics::chip_thinning::ChipThinning),
        Box::new(physics::stability::StabilityLobes),
        Box::new(optimize::genetic::GeneticAlgorithm),
        Box::new(optimize::annealing::SimulatedAnnealing),
        Box::new(optimize::swarm::ParticleSwarm),
        Box::new(optimize::bayesian::BayesianOptimization),
        Box::new(optimize::ant_colony::AntColony),
        Box::new(signal::fft::Fft),
        Box::new(signal::stft::Stft),
        Box::new(signal::wavelet::Wavelet),
        Box::new(signal::kalman::KalmanFilter),
        Box::new(signal::pid::PidController),
        Box::new(signal::fuzzy::FuzzyController),
        Box::new(signal::fusion::DigitalTwinFusion),
        Box::new(combinatorial::assignment::IlpAssignment),
        Box::new(combinatorial::setup_planning::SetupPlanning),
        Box::new(combinatorial::job_shop::JobShop),
        Box::new(combinatorial::tsp::Tsp),
        Box::new(learn::kmeans::KMeans),
        Box::new(learn::regression::Regression),
        Box::new(learn::decision_tree::DecisionTree),
        Box::new(learn::interpolation::Interpolation),
        Box::new(learn::truss::TrussFea),
    ]
}

/// The registry every front end serves.
pub fn default_registry() -> Result<Registry, RegistryError> {
    Registry::new(catalogue())
}

#[cfg(test)]
pub(crate) mod testing {
    use millkit_kernel::{Algorithm, ParamReader, Params, ResultEnvelope, ValidationIssue};
    use serde_json::Value;

    pub fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap_or_default()
    }

    /// Parse `value` and return the input plus every issue found.
    pub fn parse<A: Algorithm>(algorithm: &A, value: Value) -> (A::Input, Vec<ValidationIssue>) {
        let p = params(value);
        let mut reader = ParamReader::new(&p);
        let input = algorithm.parse(&mut reader);
        (input, reader.into_issues())
    }

    /// Parse, insist on no errors, calculate.
    pub fn run<A: Algorithm>(algorithm: &A, value: Value) -> ResultEnvelope<A::Output> {
        let (input, issues) = parse(algorithm, value);
        let errors: Vec<_> = issues
            .iter()
            .filter(|i| i.severity == millkit_kernel::Severity::Error)
            .collect();
        assert!(errors.is_empty(), "unexpected validation errors: {errors:?}");
        algorithm.calculate(&input).expect("calculate")
    }

    pub fn error_fields(issues: &[ValidationIssue]) -> Vec<&str> {
        issues
            .iter()
            .filter(|i| i.severity == millkit_kernel::Severity::Error)
            .map(|i| i.field.as_str())
            .collect()
    }
}
