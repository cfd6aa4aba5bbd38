use crate::errors::{Error, Result};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

/// Typed telemetry update for one bin. Absent fields keep the stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryMessage {
    pub device_id: String,
    pub fill_level: Option<i32>,
    pub battery_level: Option<i32>,
}

/// JSON body published by the bins
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryPayload {
    #[serde(
        default,
        deserialize_with = "whole_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub fill_level: Option<i32>,
    #[serde(
        default,
        deserialize_with = "whole_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub battery_level: Option<i32>,
}

/// Accepts `50` and `50.0` alike; fractional or out-of-range numbers are rejected.
fn whole_number<'de, D>(deserializer: D) -> std::result::Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<f64>::deserialize(deserializer)? {
        None => Ok(None),
        Some(v) if v.fract() == 0.0 && v >= i32::MIN as f64 && v <= i32::MAX as f64 => {
            Ok(Some(v as i32))
        }
        Some(v) => Err(D::Error::custom(format!("expected a whole number, got {}", v))),
    }
}

/// Subscription filter covering every bin in a namespace
pub fn topic_filter(namespace: &str) -> String {
    format!("{}/bins/+/telemetry", namespace)
}

/// Extract the device id from `{namespace}/bins/{device_id}/telemetry`
pub fn parse_topic<'a>(namespace: &str, topic: &'a str) -> Result<&'a str> {
    let parts: Vec<&str> = topic.split('/').collect();

    match parts.as_slice() {
        [ns, "bins", device_id, "telemetry"] if *ns == namespace && !device_id.is_empty() => {
            Ok(*device_id)
        }
        _ => Err(Error::Validation(format!(
            "Unexpected topic '{}': expected '{}/bins/{{device_id}}/telemetry'",
            topic, namespace
        ))),
    }
}

/// Parse a raw publish into a typed message, rejecting anything malformed
pub fn parse_message(namespace: &str, topic: &str, payload: &[u8]) -> Result<TelemetryMessage> {
    let device_id = parse_topic(namespace, topic)?;
    let body: TelemetryPayload = serde_json::from_slice(payload)?;

    Ok(TelemetryMessage {
        device_id: device_id.to_string(),
        fill_level: body.fill_level,
        battery_level: body.battery_level,
    })
}
