//! Assignment, setup planning, scheduling and routing.
//!
//! These solvers never fail just because a perfect answer does not exist.
//! They return the best plan they found together with feasibility metrics
//! (`optimal`, `all_constraints_met`, unassigned items, violation counts)
//! and leave the judgement to the caller.

pub mod assignment;
pub mod job_shop;
pub mod setup_planning;
pub mod tsp;
