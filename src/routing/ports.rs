use async_trait::async_trait;

use crate::routing::{
    error::RoutingError,
    types::{Target, TargetId},
};

/// Durable list of targets.
///
/// `list_all` returns targets in insertion order; appends never reorder earlier entries, so
/// value ties resolve the same way on every call.
#[async_trait]
pub trait TargetStorePort: Send + Sync {
    async fn list_all(&self) -> Result<Vec<Target>, RoutingError>;

    /// Appends `target`; fails with `Conflict` when the id is already stored.
    async fn create(&self, target: Target) -> Result<(), RoutingError>;

    async fn get(&self, id: &str) -> Result<Target, RoutingError>;

    /// Replaces the record stored under `id` in place, keeping its position.
    async fn replace(&self, id: &str, target: Target) -> Result<(), RoutingError>;

    async fn health_check(&self) -> Result<(), RoutingError>;
}

pub(crate) fn position_of(targets: &[Target], id: &str) -> Option<usize> {
    targets.iter().position(|target| target.id == id)
}

pub(crate) fn missing_target(id: &str) -> RoutingError {
    crate::routing::error::not_found(format!("target '{id}' not found"))
}

pub(crate) fn duplicate_target(id: &TargetId) -> RoutingError {
    crate::routing::error::conflict(format!("target '{id}' already exists"))
}
