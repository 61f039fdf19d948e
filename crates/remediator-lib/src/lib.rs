//! Core library for the kube-remediator agent
//!
//! This crate provides:
//! - Pod observation snapshots and health-evaluation policies
//! - The reconcile driver (startup sweep + poll ticker or watch stream)
//! - The action executor with idempotent delete / delete-and-recreate
//! - The Kubernetes client boundary
//! - Configuration, health checks and Prometheus metrics

pub mod config;
pub mod driver;
pub mod executor;
pub mod health;
pub mod k8s;
pub mod models;
pub mod observability;
pub mod policy;
pub mod remediator;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::{RemediatorPolicy, Settings, SettingsError};
pub use health::{ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse};
pub use models::*;
pub use observability::RemediatorMetrics;
pub use remediator::{Remediator, RemediatorKind};
