use std::{borrow::Cow, collections::BTreeMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

pub type TargetId = String;

/// Attribute injected into every visitor before matching.
pub const HOUR_ATTRIBUTE: &str = "hour";

/// A per-attribute constraint on visitors.
///
/// Wire form is `{"$in": [..]}`. New rule kinds are added as new variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcceptRule {
    #[serde(rename = "$in", deserialize_with = "wire::text_list")]
    In(Vec<String>),
}

impl AcceptRule {
    pub fn admits(&self, attribute: &Value) -> bool {
        let Some(text) = scalar_text(attribute) else {
            return false;
        };
        match self {
            AcceptRule::In(allowed) => allowed.iter().any(|item| item.as_str() == text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub id: TargetId,
    pub url: String,
    pub value: Decimal,
    #[serde(deserialize_with = "wire::lenient_u32")]
    pub max_accepts_per_day: u32,
    #[serde(rename = "accept", alias = "acceptRules", default)]
    pub accept_rules: BTreeMap<String, AcceptRule>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "wire::lenient_opt_u32"
    )]
    pub remain_accepts_per_day: Option<u32>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub last_accept_date: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visitor {
    #[serde(with = "wire::event_time")]
    pub timestamp: OffsetDateTime,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, Value>,
}

impl Visitor {
    pub fn new(timestamp: OffsetDateTime) -> Self {
        Self {
            timestamp,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Selected(Target),
    Reject,
}

impl RouteDecision {
    pub fn selected_url(&self) -> Option<&str> {
        match self {
            RouteDecision::Selected(target) => Some(target.url.as_str()),
            RouteDecision::Reject => None,
        }
    }
}

/// Text form of a scalar JSON value; objects, arrays and null have none.
pub fn scalar_text(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::String(text) => Some(Cow::Borrowed(text.as_str())),
        Value::Number(number) => Some(Cow::Owned(number.to_string())),
        Value::Bool(flag) => Some(Cow::Owned(flag.to_string())),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

mod wire {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use serde_json::Value;
    use time::{OffsetDateTime, UtcOffset, format_description::well_known::Rfc3339};

    use super::scalar_text;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText {
        Number(u64),
        Text(String),
    }

    impl NumberOrText {
        fn into_u32<E: Error>(self) -> Result<u32, E> {
            match self {
                NumberOrText::Number(number) => u32::try_from(number).map_err(E::custom),
                NumberOrText::Text(text) => text.trim().parse::<u32>().map_err(E::custom),
            }
        }
    }

    pub fn lenient_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
    where
        D: Deserializer<'de>,
    {
        NumberOrText::deserialize(deserializer)?.into_u32()
    }

    pub fn lenient_opt_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<NumberOrText>::deserialize(deserializer)?
            .map(NumberOrText::into_u32)
            .transpose()
    }

    pub fn text_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Vec::<Value>::deserialize(deserializer)?
            .iter()
            .map(|item| {
                scalar_text(item)
                    .map(|text| text.into_owned())
                    .ok_or_else(|| D::Error::custom(format!("rule value must be a scalar, got {item}")))
            })
            .collect()
    }

    pub mod event_time {
        use super::*;

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawEventTime {
            EpochMillis(i64),
            Text(String),
        }

        pub fn serialize<S>(timestamp: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            time::serde::rfc3339::serialize(timestamp, serializer)
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
        where
            D: Deserializer<'de>,
        {
            let parsed = match RawEventTime::deserialize(deserializer)? {
                RawEventTime::EpochMillis(millis) => {
                    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
                        .map_err(D::Error::custom)?
                }
                RawEventTime::Text(text) => {
                    OffsetDateTime::parse(text.trim(), &Rfc3339).map_err(D::Error::custom)?
                }
            };
            Ok(parsed.to_offset(UtcOffset::UTC))
        }
    }
}
