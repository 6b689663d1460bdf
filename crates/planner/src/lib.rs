//! Upgrade planner service
//!
//! Serves upgrade plans over HTTP alongside health and metrics endpoints.

pub mod api;
pub mod config;
