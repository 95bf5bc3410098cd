//! Closed-form machining physics.
//!
//! Units follow shop-floor convention: millimetres, metres per minute,
//! newtons, megapascals, degrees Celsius. Angles are taken in degrees at the
//! boundary and converted once.

pub mod chip_thinning;
pub mod johnson_cook;
pub mod kienzle;
pub mod stability;
pub mod taylor;
