use quota_router::routing::{
    matcher::{hour_bucket, match_targets, target_matches},
    types::Visitor,
};
use serde_json::json;
use time::{Duration, macros::datetime};

use crate::fixtures::{target, target_one, target_two, visitor, with_rules};

#[test]
fn given_target_without_rules_when_matching_then_every_visitor_matches() {
    let open = target("open", "0.10", 1);
    let bare = Visitor::new(datetime!(2018-07-19 03:00 UTC));
    let rich = visitor("tx", datetime!(2018-07-19 22:00 UTC)).with_attribute("device", "mobile");

    assert!(target_matches(&open, &bare));
    assert!(target_matches(&open, &rich));
}

#[test]
fn given_every_hour_of_a_day_when_bucketing_then_hour_is_two_digit_utc() {
    let midnight = datetime!(2018-07-19 00:00 UTC);
    for hour in 0..24 {
        let bucket = hour_bucket(midnight + Duration::hours(hour) + Duration::minutes(59));
        assert_eq!(bucket.len(), 2);
        assert_eq!(bucket, format!("{hour:02}"));
    }
}

#[test]
fn given_visitor_in_rule_hours_when_matching_then_target_is_kept() {
    let mut ca_at_two_pm = visitor("ca", datetime!(2018-07-19 14:28:59.513 UTC));
    let matched = match_targets(&mut ca_at_two_pm, vec![target_one(), target_two()]);

    let ids: Vec<&str> = matched.iter().map(|item| item.id.as_str()).collect();
    assert_eq!(ids, ["1"]);
    assert_eq!(ca_at_two_pm.attributes["hour"], json!("14"));
}

#[test]
fn given_visitor_outside_rule_hours_when_matching_then_nothing_matches() {
    let mut ny_at_ten = visitor("ny", datetime!(2018-07-19 10:28:59.513 UTC));
    assert!(match_targets(&mut ny_at_ten, vec![target_one()]).is_empty());
}

#[test]
fn given_overlapping_hour_when_matching_then_input_order_is_preserved() {
    let mut ca_at_noon = visitor("ca", datetime!(2018-07-19 12:05 UTC));
    let matched = match_targets(&mut ca_at_noon, vec![target_two(), target_one()]);
    let ids: Vec<&str> = matched.iter().map(|item| item.id.as_str()).collect();
    assert_eq!(ids, ["2", "1"]);
}

#[test]
fn given_missing_visitor_attribute_when_matching_then_target_is_skipped() {
    let publisher_only = with_rules(target("p", "1.00", 1), &[("publisher", &["xyz"])]);
    let region_only = with_rules(target("r", "1.00", 1), &[("region", &["west"])]);
    let mut abc = visitor("ca", datetime!(2018-07-19 12:00 UTC));

    assert!(match_targets(&mut abc, vec![publisher_only, region_only]).is_empty());
}

#[test]
fn given_visitor_supplied_hour_when_matching_then_derived_hour_wins() {
    let mut spoofed = visitor("ca", datetime!(2018-07-19 09:00 UTC)).with_attribute("hour", "13");
    assert!(match_targets(&mut spoofed, vec![target_one()]).is_empty());
}
