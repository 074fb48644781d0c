//! Seeded synthetic data for tests, doc examples and benchmarks.

pub mod data;

pub use data::{synthetic_housing, synthetic_records};
