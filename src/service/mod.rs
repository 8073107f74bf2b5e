//! Service layer for the tete-a-tete chat relay
//!
//! This module contains the inbound dispatcher, the application state that
//! wires every component together, and health checks.

pub mod app;
pub mod chat;
pub mod health;

pub use app::{AppState, ServiceError};
pub use chat::{ChatService, ChatSettings};
pub use health::{HealthCheck, HealthProbe, HealthStatus};
