use std::sync::Arc;

use async_trait::async_trait;
use quota_router::routing::{
    RouteDecision, RoutingEngine, RoutingError, RoutingErrorKind, Target, TargetStorePort,
    error::storage_error,
};
use time::macros::datetime;

use crate::fixtures::{engine_with, target, target_one, target_two, visitor};

#[tokio::test]
async fn given_two_per_day_target_when_routed_three_times_then_third_visit_is_rejected() {
    let (engine, _store) = engine_with(vec![target_one()]);
    let now = datetime!(2018-07-19 14:30 UTC);
    let visit = || visitor("ca", datetime!(2018-07-19 14:28:59.513 UTC));

    let first = engine.route_at(visit(), now).await.expect("route should succeed");
    let second = engine.route_at(visit(), now).await.expect("route should succeed");
    let third = engine.route_at(visit(), now).await.expect("route should succeed");

    assert_eq!(first.selected_url(), Some("http://exampleUrl1.com"));
    assert_eq!(second.selected_url(), Some("http://exampleUrl1.com"));
    assert_eq!(third, RouteDecision::Reject);
}

#[tokio::test]
async fn given_two_matching_targets_when_routed_then_higher_value_wins() {
    let (engine, _store) = engine_with(vec![target_one(), target_two()]);
    let decision = engine
        .route_at(
            visitor("ca", datetime!(2018-07-19 12:28:59.513 UTC)),
            datetime!(2018-07-19 12:30 UTC),
        )
        .await
        .expect("route should succeed");
    assert_eq!(decision.selected_url(), Some("http://exampleUrl2.com"));
}

#[tokio::test]
async fn given_visitor_outside_target_hours_when_routed_then_rejected() {
    let (engine, store) = engine_with(vec![target_one()]);
    let decision = engine
        .route_at(
            visitor("ny", datetime!(2018-07-19 10:28:59.513 UTC)),
            datetime!(2018-07-19 10:30 UTC),
        )
        .await
        .expect("route should succeed");

    assert_eq!(decision, RouteDecision::Reject);
    let untouched = store.get("1").await.expect("target should exist");
    assert_eq!(untouched.remain_accepts_per_day, None);
}

#[tokio::test]
async fn given_exhausted_target_when_next_utc_day_starts_then_budget_is_restored() {
    let (engine, store) = engine_with(vec![target_one()]);
    let visit = || visitor("ca", datetime!(2018-07-19 13:00 UTC));
    let day_one = datetime!(2018-07-19 23:58 UTC);
    let day_two = datetime!(2018-07-20 00:02 UTC);

    for _ in 0..2 {
        engine.route_at(visit(), day_one).await.expect("route should succeed");
    }
    assert_eq!(
        engine.route_at(visit(), day_one).await.expect("route should succeed"),
        RouteDecision::Reject
    );

    let next = engine.route_at(visit(), day_two).await.expect("route should succeed");
    assert_eq!(next.selected_url(), Some("http://exampleUrl1.com"));
    let stored = store.get("1").await.expect("target should exist");
    assert_eq!(stored.remain_accepts_per_day, Some(1));
    assert_eq!(stored.last_accept_date, Some(day_two));
}

#[tokio::test]
async fn given_duplicate_id_when_creating_then_conflict_leaves_store_untouched() {
    let (engine, store) = engine_with(vec![]);
    engine.create_target(target_one()).await.expect("first create should succeed");

    let mut impostor = target_two();
    impostor.id = "1".to_string();
    let err = engine
        .create_target(impostor)
        .await
        .expect_err("duplicate id must conflict");

    assert_eq!(err.kind, RoutingErrorKind::Conflict);
    assert_eq!(store.list_all().await.expect("list should succeed"), vec![target_one()]);
}

#[tokio::test]
async fn given_update_with_other_body_id_when_replacing_then_path_id_is_kept() {
    let (engine, _store) = engine_with(vec![target_one(), target_two()]);
    let mut replacement = target("999", "2.00", 10);
    replacement.url = "http://replaced.example".to_string();

    engine
        .update_target("1", replacement)
        .await
        .expect("update should succeed");

    let listed = engine.list_targets().await.expect("list should succeed");
    let ids: Vec<&str> = listed.iter().map(|item| item.id.as_str()).collect();
    assert_eq!(ids, ["1", "2"]);
    assert_eq!(listed[0].url, "http://replaced.example");
}

#[tokio::test]
async fn given_unknown_id_when_reading_or_updating_then_not_found() {
    let (engine, _store) = engine_with(vec![target_one()]);

    let get_err = engine.get_target("missing").await.expect_err("get must fail");
    assert_eq!(get_err.kind, RoutingErrorKind::NotFound);

    let update_err = engine
        .update_target("missing", target_two())
        .await
        .expect_err("update must fail");
    assert_eq!(update_err.kind, RoutingErrorKind::NotFound);
}

struct ReadOnlyStore {
    targets: Vec<Target>,
}

#[async_trait]
impl TargetStorePort for ReadOnlyStore {
    async fn list_all(&self) -> Result<Vec<Target>, RoutingError> {
        Ok(self.targets.clone())
    }

    async fn create(&self, _target: Target) -> Result<(), RoutingError> {
        Err(storage_error("store is read-only"))
    }

    async fn get(&self, id: &str) -> Result<Target, RoutingError> {
        self.targets
            .iter()
            .find(|target| target.id == id)
            .cloned()
            .ok_or_else(|| quota_router::routing::error::not_found(id))
    }

    async fn replace(&self, _id: &str, _target: Target) -> Result<(), RoutingError> {
        Err(storage_error("store is read-only"))
    }

    async fn health_check(&self) -> Result<(), RoutingError> {
        Err(storage_error("store is read-only"))
    }
}

#[tokio::test]
async fn given_failing_write_when_routing_then_storage_error_is_surfaced() {
    let engine = RoutingEngine::new(Arc::new(ReadOnlyStore {
        targets: vec![target_one()],
    }));

    let err = engine
        .route_at(
            visitor("ca", datetime!(2018-07-19 14:00 UTC)),
            datetime!(2018-07-19 14:00 UTC),
        )
        .await
        .expect_err("write failure must propagate");

    assert_eq!(err.kind, RoutingErrorKind::StorageError);
    assert_eq!(err.message, "store is read-only");
}

#[tokio::test]
async fn given_target_created_with_inflated_quota_when_routed_then_daily_max_still_holds() {
    let (engine, store) = engine_with(vec![]);
    let mut inflated = target("1", "1.00", 1);
    inflated.remain_accepts_per_day = Some(50);
    inflated.last_accept_date = Some(datetime!(2024-06-01 00:00 UTC));
    engine.create_target(inflated).await.expect("create should succeed");

    let stored = store.get("1").await.expect("target should exist");
    assert_eq!(stored.remain_accepts_per_day, None);
    assert_eq!(stored.last_accept_date, None);

    let now = datetime!(2024-06-01 12:00 UTC);
    let mut sold = 0;
    for _ in 0..10 {
        let decision = engine
            .route_at(visitor("ca", now), now)
            .await
            .expect("route should succeed");
        if decision.selected_url().is_some() {
            sold += 1;
        }
    }
    assert_eq!(sold, 1);
}

#[tokio::test]
async fn given_update_with_inflated_remainder_when_routed_then_daily_max_still_holds() {
    let (engine, _store) = engine_with(vec![target("1", "1.00", 2)]);
    let now = datetime!(2024-06-01 12:00 UTC);

    let mut inflated = target("1", "1.00", 2);
    inflated.remain_accepts_per_day = Some(50);
    inflated.last_accept_date = Some(now);
    engine.update_target("1", inflated).await.expect("update should succeed");

    let mut sold = 0;
    for _ in 0..10 {
        if engine
            .route_at(visitor("ca", now), now)
            .await
            .expect("route should succeed")
            .selected_url()
            .is_some()
        {
            sold += 1;
        }
    }
    assert_eq!(sold, 2);
}
