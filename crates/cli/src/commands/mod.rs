//! CLI command implementations.

pub mod dataset;
pub mod session;
