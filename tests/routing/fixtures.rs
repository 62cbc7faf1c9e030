use std::{collections::BTreeMap, sync::Arc};

use quota_router::routing::{
    AcceptRule, InMemoryTargetStore, RoutingEngine, Target, TargetStorePort, Visitor,
};
use rust_decimal::Decimal;
use time::OffsetDateTime;

pub fn rule(values: &[&str]) -> AcceptRule {
    AcceptRule::In(values.iter().map(|value| value.to_string()).collect())
}

pub fn target(id: &str, value: &str, max_accepts_per_day: u32) -> Target {
    Target {
        id: id.to_string(),
        url: format!("http://exampleUrl{id}.com"),
        value: value.parse::<Decimal>().expect("fixture value should parse"),
        max_accepts_per_day,
        accept_rules: BTreeMap::new(),
        remain_accepts_per_day: None,
        last_accept_date: None,
    }
}

pub fn with_rules(mut target: Target, rules: &[(&str, &[&str])]) -> Target {
    for (attribute, values) in rules {
        target.accept_rules.insert(attribute.to_string(), rule(values));
    }
    target
}

/// Target 1: value 0.50, two per day, ca/ny during hours 12-14.
pub fn target_one() -> Target {
    with_rules(
        target("1", "0.50", 2),
        &[("geoState", &["ca", "ny"]), ("hour", &["12", "13", "14"])],
    )
}

/// Target 2: value 0.60, five per day, ca/ny during hours 10-12.
pub fn target_two() -> Target {
    with_rules(
        target("2", "0.60", 5),
        &[("geoState", &["ca", "ny"]), ("hour", &["10", "11", "12"])],
    )
}

pub fn visitor(geo_state: &str, timestamp: OffsetDateTime) -> Visitor {
    Visitor::new(timestamp)
        .with_attribute("geoState", geo_state)
        .with_attribute("publisher", "abc")
}

pub fn engine_with(targets: Vec<Target>) -> (RoutingEngine, Arc<dyn TargetStorePort>) {
    let store: Arc<dyn TargetStorePort> = Arc::new(InMemoryTargetStore::with_targets(targets));
    (RoutingEngine::new(Arc::clone(&store)), store)
}
