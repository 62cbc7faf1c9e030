use std::sync::Arc;

use time::OffsetDateTime;

use crate::{
    observability::metrics,
    routing::{
        allocator::{QuotaAllocator, TargetLocks},
        error::{RoutingError, RoutingErrorKind},
        matcher::match_targets,
        ports::TargetStorePort,
        types::{RouteDecision, Target, Visitor},
    },
};

#[derive(Clone)]
pub struct RoutingEngine {
    store: Arc<dyn TargetStorePort>,
    allocator: QuotaAllocator,
    locks: TargetLocks,
}

impl RoutingEngine {
    pub fn new(store: Arc<dyn TargetStorePort>) -> Self {
        let locks = TargetLocks::new();
        Self {
            allocator: QuotaAllocator::new(Arc::clone(&store), locks.clone()),
            store,
            locks,
        }
    }

    pub async fn route(&self, visitor: Visitor) -> Result<RouteDecision, RoutingError> {
        self.route_at(visitor, OffsetDateTime::now_utc()).await
    }

    /// Same as [`RoutingEngine::route`] with an explicit allocation clock.
    #[tracing::instrument(name = "route_visitor", target = "routing", skip(self, visitor))]
    pub async fn route_at(
        &self,
        mut visitor: Visitor,
        now: OffsetDateTime,
    ) -> Result<RouteDecision, RoutingError> {
        let targets = self.observe(self.store.list_all().await)?;
        let listed = targets.len();
        let matched = match_targets(&mut visitor, targets);
        let matched_count = matched.len();

        let decision = match self.observe(self.allocator.allocate(matched, now).await)? {
            Some(target) => RouteDecision::Selected(target),
            None => RouteDecision::Reject,
        };

        match &decision {
            RouteDecision::Selected(target) => {
                tracing::info!(
                    target: "routing",
                    listed,
                    matched = matched_count,
                    target_id = %target.id,
                    remain_accepts_per_day = ?target.remain_accepts_per_day,
                    "visitor_routed"
                );
                metrics::record_route_decision(metrics::DECISION_SELECTED);
            }
            RouteDecision::Reject => {
                tracing::info!(
                    target: "routing",
                    listed,
                    matched = matched_count,
                    "visitor_rejected"
                );
                metrics::record_route_decision(metrics::DECISION_REJECT);
            }
        }

        Ok(decision)
    }

    /// Stores a new target. Quota state always starts fresh, whatever the body carried.
    pub async fn create_target(&self, mut target: Target) -> Result<(), RoutingError> {
        target.remain_accepts_per_day = None;
        target.last_accept_date = None;
        let id = target.id.clone();
        self.observe(self.store.create(target).await)?;
        tracing::info!(target: "routing", target_id = %id, "target_created");
        metrics::record_target_created();
        Ok(())
    }

    pub async fn list_targets(&self) -> Result<Vec<Target>, RoutingError> {
        self.observe(self.store.list_all().await)
    }

    pub async fn get_target(&self, id: &str) -> Result<Target, RoutingError> {
        self.observe(self.store.get(id).await)
    }

    /// Full replace of the record stored under `id`. The id itself never changes.
    pub async fn update_target(&self, id: &str, mut target: Target) -> Result<(), RoutingError> {
        target.id = id.to_string();
        let _section = self.locks.acquire(id).await;
        self.observe(self.store.replace(id, target).await)?;
        tracing::info!(target: "routing", target_id = %id, "target_updated");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), RoutingError> {
        self.observe(self.store.health_check().await)
    }

    fn observe<T>(&self, result: Result<T, RoutingError>) -> Result<T, RoutingError> {
        if let Err(err) = &result {
            if err.kind == RoutingErrorKind::StorageError {
                tracing::error!(target: "routing", error = %err, "target_store_failed");
                metrics::record_storage_error();
            }
        }
        result
    }
}
