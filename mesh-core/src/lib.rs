//! Shared models of the Function Mesh control plane.

pub mod authz;
pub mod crd;
pub mod descriptor;
pub mod error;
pub mod names;

pub use error::AppError;
