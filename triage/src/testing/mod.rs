//! Test support: byte fixtures and scripted doubles.
//!
//! Kept in the library (not behind `cfg(test)`) so downstream crates can
//! exercise their own stage and store implementations with the same tools.

pub mod fixtures;
pub mod mocks;
