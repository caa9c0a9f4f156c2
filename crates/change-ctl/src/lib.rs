//! Operator tooling around the change-control engine.

pub mod config;
pub mod scenario;
