pub mod benchmark;
pub mod calculate;
pub mod describe;
pub mod dispatch;
pub mod list;
pub mod registry_check;
pub mod validate;
