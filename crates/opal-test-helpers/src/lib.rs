//! Test utilities and fixtures for opal
//!
//! Shared by the unit tests, the integration tests under `tests/` and the
//! benchmarks of the other crates.

pub mod compile;
pub mod fixtures;
pub mod lookup;
