//! # Millkit Kernel
//!
//! One safe calling convention for many unrelated numeric methods:
//! untyped JSON parameters in, a typed, finite, explainable result out.
//!
//! ## Architecture
//!
//! ```text
//! Algorithm            ← typed contract: parse → calculate, static meta
//!     │ (blanket impl)
//! DynAlgorithm         ← object-safe validate / calculate / describe
//!     │
//! Registry             ← immutable id → algorithm map, built once
//!     │
//! Engine               ← lookup, validation gate, timing, error normalisation
//! ```
//!
//! Algorithms never see raw JSON after parsing: [`ParamReader`] turns the
//! parameter map into a typed input while collecting every issue in one
//! pass, and the engine only calls `calculate` once that pass reported no
//! errors. The separate [`Engine::benchmark`] path skips the gate for
//! robustness sweeps.

pub mod config;
pub mod contract;
pub mod engine;
pub mod error;
pub mod finite;
pub mod params;
pub mod registry;

pub use config::EngineConfig;
pub use contract::{
    Algorithm, AlgorithmMeta, Domain, DynAlgorithm, FieldSpec, ResultEnvelope, SafetyClass,
    Severity, ValidationIssue, ValidationResult,
};
pub use engine::{
    BenchmarkOutcome, BenchmarkResponse, CalculateRequest, CalculateResponse, Engine,
    ValidateResponse,
};
pub use error::{AlgorithmError, ConfigError, EngineError, RegistryError};
pub use finite::find_non_finite;
pub use params::{
    MAX_MAGNITUDE, MIN_POSITIVE, ParamReader, Params, as_f64_vec, in_numeric_range,
};
pub use registry::Registry;
