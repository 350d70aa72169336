//! The Function Mesh control-plane core.
//!
//! Decommissions deployed functions, sinks & sources, collects the stats of their replicas, and
//! bridges access to function state.

pub mod actions;
pub mod broker;
pub mod cleaner;
pub mod config;
pub mod database;
pub mod error;
#[cfg(test)]
mod fixtures;
pub mod grpc;
pub mod k8s;
pub mod models;
pub mod service;
#[cfg(test)]
mod service_test;
pub mod state;
pub mod stats;
pub mod teardown;
mod utils;
#[cfg(test)]
mod utils_test;

use anyhow::{Context, Result};
use tracing_subscriber::prelude::*;

pub use crate::config::Config;
pub use crate::service::{Dependencies, MeshComponents};

/// Setup the tracing/logging system.
///
/// Hosts embedding the controller call this once at startup.
pub fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        // Filter spans based on the RUST_LOG env var.
        .with(tracing_subscriber::EnvFilter::from_default_env())
        // Send a copy of all spans to stdout in compact form.
        .with(tracing_subscriber::fmt::layer().with_target(true).with_level(true).with_ansi(true))
        // Install this registry as the global tracing registry.
        .try_init()
        .context("error initializing logging/tracing system")
}
