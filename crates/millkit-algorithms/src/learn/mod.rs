//! Classical numeric learners and solvers.
//!
//! Everything here is deterministic for a given input. The only random step,
//! k-means++ seeding, draws from the caller's `seed`.

pub mod decision_tree;
pub mod interpolation;
pub mod kmeans;
pub mod regression;
pub mod truss;
