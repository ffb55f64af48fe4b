//! Data structures for appliance responses.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

/// One archived sample as served by `getData.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub secs: i64,
    #[serde(default)]
    pub nanos: i64,
    pub val: PointValue,
    #[serde(default)]
    pub severity: i32,
    #[serde(default)]
    pub status: i32,
}

impl Point {
    /// Sample timestamp in milliseconds since the Unix epoch.
    pub fn timestamp_millis(&self) -> i64 {
        self.secs * 1000 + self.nanos / 1_000_000
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let nanos = self.nanos.clamp(0, 999_999_999) as u32;
        Utc.timestamp_opt(self.secs, nanos).single()
    }

    /// Extracts the value as an f64 if possible. Waveforms yield their
    /// first element, matching how the appliance reports scalars of
    /// single-element arrays.
    pub fn value_as_f64(&self) -> Option<f64> {
        match &self.val {
            PointValue::Scalar(v) => Some(*v),
            PointValue::Array(arr) => arr.first().copied(),
            PointValue::Text(_) => None,
        }
    }
}

/// Sample payload. The appliance serves numbers for scalar and enum PVs,
/// arrays for waveforms, and strings for string PVs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointValue {
    Scalar(f64),
    Array(Vec<f64>),
    Text(String),
}

impl fmt::Display for PointValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(v) => write!(f, "{v}"),
            Self::Array(arr) => {
                let rendered: Vec<String> = arr.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", rendered.join(";"))
            }
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Metadata block preceding the samples of one PV. Fields the appliance
/// serves under EPICS record names are aliased; everything else passes
/// through in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "EGU")]
    pub egu: Option<String>,
    #[serde(
        default,
        alias = "PREC",
        deserialize_with = "de_opt_i32_from_string_or_number"
    )]
    pub precision: Option<i32>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, JsonValue>,
}

/// Ordered samples for one PV, timestamps non-decreasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub meta: Meta,
    #[serde(rename = "data")]
    pub points: Vec<Point>,
}

impl TimeSeries {
    pub fn pv(&self) -> &str {
        &self.meta.name
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&Point> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&Point> {
        self.points.last()
    }

    /// True when sample timestamps are non-decreasing.
    pub fn is_monotonic(&self) -> bool {
        self.points
            .windows(2)
            .all(|w| (w[0].secs, w[0].nanos) <= (w[1].secs, w[1].nanos))
    }
}

/// Half-open request window `[start, end]` in UTC.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Window ending now and reaching `window` into the past.
    pub fn recent(window: Duration) -> Self {
        let end = Utc::now();
        let span = chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::hours(1));
        Self {
            start: end - span,
            end,
        }
    }
}

/// Identity block returned by `getApplianceInfo`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplianceInfo {
    pub identity: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default, rename = "mgmtURL")]
    pub mgmt_url: Option<String>,
    #[serde(default, rename = "engineURL")]
    pub engine_url: Option<String>,
    #[serde(default, rename = "etlURL")]
    pub etl_url: Option<String>,
    #[serde(default, rename = "retrievalURL")]
    pub retrieval_url: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, JsonValue>,
}

/// One entry of a `getPVStatus` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PvStatus {
    pub pv_name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub appliance: Option<String>,
    #[serde(default, deserialize_with = "de_opt_bool_from_string_or_bool")]
    pub connection_state: Option<bool>,
    #[serde(default)]
    pub last_event: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, JsonValue>,
}

impl PvStatus {
    /// The appliance reports exactly this status string for archived PVs.
    pub fn is_archived(&self) -> bool {
        self.status.eq_ignore_ascii_case("being archived")
    }
}

/// Archiving parameters of a PV, from `getPVTypeInfo`. The appliance
/// serializes numbers and booleans as strings here; the typed fields
/// absorb both spellings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PvTypeInfo {
    pub pv_name: String,
    #[serde(default, deserialize_with = "de_opt_bool_from_string_or_bool")]
    pub paused: Option<bool>,
    #[serde(default)]
    pub sampling_method: Option<String>,
    #[serde(default, deserialize_with = "de_opt_f64_from_string_or_number")]
    pub sampling_period: Option<f64>,
    #[serde(default, rename = "DBRType")]
    pub dbr_type: Option<String>,
    #[serde(default)]
    pub creation_time: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, JsonValue>,
}

/// One row of a `getPVDetails` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PvDetail {
    pub source: String,
    pub name: String,
    #[serde(default)]
    pub value: JsonValue,
}

fn de_opt_i32_from_string_or_number<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: JsonValue = Deserialize::deserialize(deserializer)?;
    match value {
        JsonValue::String(s) => {
            // PREC arrives as "0.0" from some releases; truncate.
            if let Ok(f) = s.parse::<f64>() {
                Ok(Some(f as i32))
            } else {
                s.parse().map(Some).map_err(D::Error::custom)
            }
        }
        JsonValue::Number(n) => n
            .as_i64()
            .map(|n| Some(n as i32))
            .ok_or_else(|| D::Error::custom("invalid integer")),
        JsonValue::Null => Ok(None),
        other => Err(D::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

fn de_opt_f64_from_string_or_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: JsonValue = Deserialize::deserialize(deserializer)?;
    match value {
        JsonValue::String(s) => s.parse::<f64>().map(Some).map_err(D::Error::custom),
        JsonValue::Number(n) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| D::Error::custom("invalid number")),
        JsonValue::Null => Ok(None),
        other => Err(D::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

fn de_opt_bool_from_string_or_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: JsonValue = Deserialize::deserialize(deserializer)?;
    match value {
        JsonValue::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" => Ok(Some(true)),
            "false" => Ok(Some(false)),
            other => Err(D::Error::custom(format!("expected boolean, got '{other}'"))),
        },
        JsonValue::Bool(b) => Ok(Some(b)),
        JsonValue::Null => Ok(None),
        other => Err(D::Error::custom(format!(
            "expected string or boolean, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const GET_DATA_REPLY: &str = r#"
        [
          {
            "meta": {"name": "TST:gaussianNoise", "EGU": "mm", "PREC": "2"},
            "data": [
              {"secs": 1618516200, "val": 0.12, "nanos": 250000000, "severity": 0, "status": 0},
              {"secs": 1618516201, "val": 0.15, "nanos": 0, "severity": 0, "status": 0},
              {"secs": 1618516202, "val": 0.13, "nanos": 500000000, "severity": 1, "status": 3}
            ]
          }
        ]
    "#;

    #[test]
    fn decodes_a_get_data_reply() {
        let series: Vec<TimeSeries> = serde_json::from_str(GET_DATA_REPLY).unwrap();
        assert_eq!(series.len(), 1);
        let series = &series[0];
        assert_eq!(series.pv(), "TST:gaussianNoise");
        assert_eq!(series.meta.egu.as_deref(), Some("mm"));
        assert_eq!(series.meta.precision, Some(2));
        assert_eq!(series.len(), 3);
        assert_eq!(series.points[0].val, PointValue::Scalar(0.12));
        assert_eq!(series.points[2].severity, 1);
        assert!(series.is_monotonic());
    }

    #[test]
    fn untagged_values_cover_waveforms_and_strings() {
        let point: Point =
            serde_json::from_str(r#"{"secs": 1, "val": [1.0, 2.5, 3.0]}"#).unwrap();
        assert_eq!(point.val, PointValue::Array(vec![1.0, 2.5, 3.0]));
        assert_eq!(point.value_as_f64(), Some(1.0));

        let point: Point = serde_json::from_str(r#"{"secs": 1, "val": "RAMPING"}"#).unwrap();
        assert_eq!(point.val, PointValue::Text("RAMPING".to_string()));
        assert_eq!(point.value_as_f64(), None);

        // enum PVs arrive as integers
        let point: Point = serde_json::from_str(r#"{"secs": 1, "val": 2}"#).unwrap();
        assert_eq!(point.value_as_f64(), Some(2.0));
    }

    #[test]
    fn timestamp_accessors_combine_secs_and_nanos() {
        let point = Point {
            secs: 1618516200,
            nanos: 250_000_000,
            val: PointValue::Scalar(1.0),
            severity: 0,
            status: 0,
        };
        assert_eq!(point.timestamp_millis(), 1618516200_250);
        let ts = point.timestamp().unwrap();
        assert_eq!(ts.timestamp(), 1618516200);
    }

    #[test]
    fn monotonic_check_catches_out_of_order_samples() {
        let mut series: Vec<TimeSeries> = serde_json::from_str(GET_DATA_REPLY).unwrap();
        let mut series = series.pop().unwrap();
        assert!(series.is_monotonic());
        series.points.swap(0, 2);
        assert!(!series.is_monotonic());
    }

    #[test]
    fn equal_timestamps_still_count_as_monotonic() {
        let series: TimeSeries = serde_json::from_str(
            r#"{"meta": {"name": "TST:pv"},
                "data": [{"secs": 5, "val": 1.0}, {"secs": 5, "val": 2.0}]}"#,
        )
        .unwrap();
        assert!(series.is_monotonic());
    }

    #[test]
    fn pv_status_absorbs_stringly_booleans() {
        let status: PvStatus = serde_json::from_str(
            r#"{"pvName": "TST:pv", "status": "Being archived",
                "connectionState": "true", "appliance": "appliance0",
                "samplingPeriod": "1.0"}"#,
        )
        .unwrap();
        assert_eq!(status.pv_name, "TST:pv");
        assert!(status.is_archived());
        assert_eq!(status.connection_state, Some(true));
        assert!(status.extra.contains_key("samplingPeriod"));
    }

    #[test]
    fn pv_type_info_absorbs_stringly_numbers() {
        let info: PvTypeInfo = serde_json::from_str(
            r#"{"pvName": "TST:pv", "paused": "false",
                "samplingMethod": "MONITOR", "samplingPeriod": "1.0",
                "DBRType": "DBR_SCALAR_DOUBLE"}"#,
        )
        .unwrap();
        assert_eq!(info.paused, Some(false));
        assert_eq!(info.sampling_period, Some(1.0));
        assert_eq!(info.dbr_type.as_deref(), Some("DBR_SCALAR_DOUBLE"));
    }

    #[test]
    fn appliance_info_keeps_upper_case_url_keys() {
        let info: ApplianceInfo = serde_json::from_str(
            r#"{"identity": "appliance0", "version": "1.1.0",
                "mgmtURL": "http://a/mgmt/bpl", "retrievalURL": "http://a/retrieval"}"#,
        )
        .unwrap();
        assert_eq!(info.identity, "appliance0");
        assert_eq!(info.mgmt_url.as_deref(), Some("http://a/mgmt/bpl"));
    }
}
