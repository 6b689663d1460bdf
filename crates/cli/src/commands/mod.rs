//! CLI command implementations

pub mod plan;
