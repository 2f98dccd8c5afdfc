//! Request lifecycle, proposal matching and review workflows for a
//! home-services marketplace.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
