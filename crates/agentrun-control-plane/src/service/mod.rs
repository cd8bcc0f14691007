//! Producer-side services behind the HTTP layer.

pub mod run_service;

pub use run_service::{RunService, ServiceError};
