//! Domain layer for the launch merge engine
//!
//! This module contains the launch and item models, the merge model and the
//! ports through which the engine reaches storage and subscribers.

pub mod errors;
pub mod models;
pub mod ports;

// Re-export error types for convenient access
pub use errors::{DomainError, DomainResult};
