//! Data models returned by the flow HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Component path of the structure + state snapshot endpoint.
pub const FULL_STRUCT_AND_STATES_PATH: &str = "/api/flow/context/full_struct_and_states";

/// Component path of the time-series query endpoint.
pub const TIMESERIES_PATH: &str = "/flow/timeseries/rest";

/// Full registry structure with the latest known states.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FullStructAndStates {
    #[serde(default)]
    pub things: Vec<Thing>,
    #[serde(default)]
    pub states: Vec<StateRecord>,
}

/// A physical device known to the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thing {
    pub id: i64,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub location_alias: String,
    #[serde(default)]
    pub services: Vec<ServiceRef>,
}

/// A service exposed by a thing, addressed by its event topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRef {
    pub name: String,
    pub topic: String,
}

/// One state entry as stored by the flow context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    /// State key, `<entity>@<topic>`.
    pub name: String,
    #[serde(default)]
    pub value_type: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thing_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A `[timestampSeconds, value]` pair from the time-series endpoint.
///
/// The value is `null` for empty buckets when the query fills gaps with nulls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeseriesPoint(pub f64, pub Option<f64>);

impl TimeseriesPoint {
    pub fn timestamp_secs(&self) -> f64 {
        self.0
    }

    pub fn value(&self) -> Option<f64> {
        self.1
    }

    /// Timestamp in milliseconds, the unit chart sinks expect.
    pub fn timestamp_millis(&self) -> i64 {
        (self.0 * 1000.0).round() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snapshot_tolerates_missing_sections() {
        let snap: FullStructAndStates = serde_json::from_value(json!({})).unwrap();
        assert!(snap.things.is_empty());
        assert!(snap.states.is_empty());
    }

    #[test]
    fn timeseries_points_decode_from_pairs() {
        let points: Vec<TimeseriesPoint> =
            serde_json::from_value(json!([[1700000000, 21.5], [1700000060.5, 22]])).unwrap();
        assert_eq!(points[0].timestamp_millis(), 1_700_000_000_000);
        assert_eq!(points[1].timestamp_millis(), 1_700_000_060_500);
        assert_eq!(points[1].value(), Some(22.0));
    }

    #[test]
    fn null_values_do_not_reject_the_series() {
        let points: Vec<TimeseriesPoint> =
            serde_json::from_str("[[1700000000, 21.5], [1700000060, null]]").unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].value(), Some(21.5));
        assert_eq!(points[1].value(), None);
        assert_eq!(points[1].timestamp_millis(), 1_700_000_060_000);
    }
}
