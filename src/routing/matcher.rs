use serde_json::Value;
use time::{OffsetDateTime, UtcOffset};

use crate::routing::types::{HOUR_ATTRIBUTE, Target, Visitor};

/// UTC hour of `timestamp` as a zero-padded two character string.
pub fn hour_bucket(timestamp: OffsetDateTime) -> String {
    format!("{:02}", timestamp.to_offset(UtcOffset::UTC).hour())
}

/// Injects the derived `hour` attribute, replacing any value the caller supplied.
pub fn derive_hour(visitor: &mut Visitor) {
    visitor.attributes.insert(
        HOUR_ATTRIBUTE.to_string(),
        Value::String(hour_bucket(visitor.timestamp)),
    );
}

/// Every rule key must be present on the visitor and admit its value.
pub fn target_matches(target: &Target, visitor: &Visitor) -> bool {
    target.accept_rules.iter().all(|(attribute, rule)| {
        visitor
            .attributes
            .get(attribute)
            .is_some_and(|value| rule.admits(value))
    })
}

pub fn match_targets(visitor: &mut Visitor, targets: Vec<Target>) -> Vec<Target> {
    derive_hour(visitor);
    targets
        .into_iter()
        .filter(|target| target_matches(target, visitor))
        .collect()
}
