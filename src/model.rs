/// Core data types for the icing monitor.
///
/// `Series` is the hourly table every stage passes around: an ordered map
/// from hour-aligned site-local timestamp to a `Row` of named fields. A field
/// that is not in the row is "not yet observed", which is different from a
/// classification of "NO ICE".

use chrono::{Duration, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::IcingError;

/// Site-local, hour-aligned instant. The only join key between series.
pub type Timestamp = NaiveDateTime;

/// Timestamp format used on the wire and in cooldown records.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Returns true when minutes, seconds and sub-seconds are all zero.
pub fn is_hour_aligned(ts: &NaiveDateTime) -> bool {
    ts.minute() == 0 && ts.second() == 0 && ts.nanosecond() == 0
}

/// Truncates a timestamp to the start of its hour.
pub fn floor_hour(ts: NaiveDateTime) -> Timestamp {
    ts.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

/// Parses the timestamp shapes the collaborators emit
/// (`2024-01-05 13:00`, `2024-01-05 13:00:00`, `2024-01-05T13:00:00`).
pub fn parse_timestamp(text: &str) -> Result<NaiveDateTime, IcingError> {
    let trimmed = text.trim();
    const FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y/%m/%d %H:%M",
    ];
    FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(trimmed, f).ok())
        .ok_or_else(|| IcingError::UnparsableTimestamp(trimmed.to_string()))
}

// ---------------------------------------------------------------------------
// Field values and rows
// ---------------------------------------------------------------------------

/// A present field value: a measurement or a derived label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Label(String),
}

impl FieldValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(v) => Some(*v),
            FieldValue::Label(_) => None,
        }
    }

    pub fn as_label(&self) -> Option<&str> {
        match self {
            FieldValue::Label(s) => Some(s),
            FieldValue::Number(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(v) => write!(f, "{}", v),
            FieldValue::Label(s) => write!(f, "{}", s),
        }
    }
}

/// One hour of data. Absent fields are simply not stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    fields: BTreeMap<String, FieldValue>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(FieldValue::as_number)
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(FieldValue::as_label)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Stores a number; NaN and infinities count as absent.
    pub fn set_number(&mut self, name: &str, value: f64) {
        if value.is_finite() {
            self.fields.insert(name.to_string(), FieldValue::Number(value));
        } else {
            self.fields.remove(name);
        }
    }

    pub fn set_label(&mut self, name: &str, value: &str) {
        self.fields.insert(name.to_string(), FieldValue::Label(value.to_string()));
    }

    /// Sets `name` to `value`, or removes it when `value` is `None`.
    pub fn set_opt(&mut self, name: &str, value: Option<FieldValue>) {
        match value {
            Some(FieldValue::Number(v)) => self.set_number(name, v),
            Some(v) => {
                self.fields.insert(name.to_string(), v);
            }
            None => {
                self.fields.remove(name);
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }
}

impl<const N: usize> From<[(&str, FieldValue); N]> for Row {
    fn from(pairs: [(&str, FieldValue); N]) -> Self {
        let mut row = Row::new();
        for (name, value) in pairs {
            row.set_opt(name, Some(value));
        }
        row
    }
}

// ---------------------------------------------------------------------------
// Series
// ---------------------------------------------------------------------------

/// Ordered hourly table. Every key is hour-aligned; construction rejects
/// anything else with `InvalidTimestamp`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    rows: BTreeMap<Timestamp, Row>,
}

impl Series {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a series from timestamped rows. Rows sharing a timestamp are
    /// merged field by field, later rows winning.
    pub fn from_rows<I>(rows: I) -> Result<Self, IcingError>
    where
        I: IntoIterator<Item = (NaiveDateTime, Row)>,
    {
        let mut series = Series::new();
        for (ts, row) in rows {
            series.upsert(ts, row)?;
        }
        Ok(series)
    }

    /// Replaces the row at `ts`.
    pub fn insert(&mut self, ts: NaiveDateTime, row: Row) -> Result<(), IcingError> {
        if !is_hour_aligned(&ts) {
            return Err(IcingError::InvalidTimestamp(ts));
        }
        self.rows.insert(ts, row);
        Ok(())
    }

    /// Insert for timestamps already known to be aligned (derived by whole-hour
    /// steps from an existing key).
    pub(crate) fn insert_aligned(&mut self, ts: Timestamp, row: Row) {
        debug_assert!(is_hour_aligned(&ts));
        self.rows.insert(ts, row);
    }

    /// Merges `row` into the row at `ts`, present fields overwriting.
    pub fn upsert(&mut self, ts: NaiveDateTime, row: Row) -> Result<(), IcingError> {
        if !is_hour_aligned(&ts) {
            return Err(IcingError::InvalidTimestamp(ts));
        }
        self.upsert_aligned(ts, row);
        Ok(())
    }

    /// `upsert` for a key taken from another series.
    pub(crate) fn upsert_aligned(&mut self, ts: Timestamp, row: Row) {
        debug_assert!(is_hour_aligned(&ts));
        let target = self.rows.entry(ts).or_default();
        for (name, value) in row.fields {
            target.fields.insert(name, value);
        }
    }

    pub fn get(&self, ts: &Timestamp) -> Option<&Row> {
        self.rows.get(ts)
    }

    pub fn contains(&self, ts: &Timestamp) -> bool {
        self.rows.contains_key(ts)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first_timestamp(&self) -> Option<Timestamp> {
        self.rows.keys().next().copied()
    }

    pub fn last_timestamp(&self) -> Option<Timestamp> {
        self.rows.keys().next_back().copied()
    }

    pub fn timestamps(&self) -> impl Iterator<Item = &Timestamp> {
        self.rows.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Timestamp, &Row)> {
        self.rows.iter()
    }

    pub(crate) fn rows_mut(&mut self) -> impl Iterator<Item = (&Timestamp, &mut Row)> {
        self.rows.iter_mut()
    }

    /// Rows with `start <= ts <= end`, in order.
    pub fn range(&self, start: NaiveDateTime, end: NaiveDateTime) -> impl Iterator<Item = (&Timestamp, &Row)> {
        self.rows.range(start..).take_while(move |(ts, _)| **ts <= end)
    }

    /// True when some row carries `name`.
    pub fn has_field(&self, name: &str) -> bool {
        self.rows.values().any(|r| r.contains(name))
    }

    /// Drops every row before `start`.
    pub fn retain_from(&mut self, start: Timestamp) {
        self.rows = self.rows.split_off(&start);
    }

    /// True when adjacent timestamps are exactly one hour apart.
    pub fn is_gap_free(&self) -> bool {
        let keys: Vec<&Timestamp> = self.rows.keys().collect();
        keys.windows(2).all(|w| *w[1] - *w[0] == Duration::hours(1))
    }
}

impl IntoIterator for Series {
    type Item = (Timestamp, Row);
    type IntoIter = std::collections::btree_map::IntoIter<Timestamp, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

// ---------------------------------------------------------------------------
// Icing categories and source groups
// ---------------------------------------------------------------------------

/// Icing morphology, plus the explicit "no condition" outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IcingType {
    NoIce,
    Glaze,
    HardRime,
    SoftRime,
}

impl IcingType {
    pub fn label(&self) -> &'static str {
        match self {
            IcingType::NoIce => "NO ICE",
            IcingType::Glaze => "Glaze",
            IcingType::HardRime => "Hard Rime",
            IcingType::SoftRime => "Soft Rime",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "NO ICE" => Some(IcingType::NoIce),
            "Glaze" => Some(IcingType::Glaze),
            "Hard Rime" => Some(IcingType::HardRime),
            "Soft Rime" => Some(IcingType::SoftRime),
            _ => None,
        }
    }

    /// Glaze, Hard Rime and Soft Rime all count as icing.
    pub fn is_icing(&self) -> bool {
        !matches!(self, IcingType::NoIce)
    }
}

impl fmt::Display for IcingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Trigger policy used for the final icing verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerPolicy {
    /// Instrument severity or liquid water content above zero
    SensorSeverity,
    /// Snow-water above 1 or RH above the icing type's threshold
    ForecastHumidity,
}

/// A data source contributing a parallel set of classification columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceGroup {
    Forecast,
    SensorPrimary,
    SensorSecondary,
    SensorTertiary,
}

impl SourceGroup {
    pub const ALL: [SourceGroup; 4] = [
        SourceGroup::Forecast,
        SourceGroup::SensorPrimary,
        SourceGroup::SensorSecondary,
        SourceGroup::SensorTertiary,
    ];

    /// Column prefix for derived fields (`FCST_Icing`, `MCMS1_WindZone m/s`, ...).
    pub fn prefix(&self) -> &'static str {
        match self {
            SourceGroup::Forecast => "FCST",
            SourceGroup::SensorPrimary => "MCMS",
            SourceGroup::SensorSecondary => "MCMS1",
            SourceGroup::SensorTertiary => "MCMS2",
        }
    }

    pub fn trigger_policy(&self) -> TriggerPolicy {
        match self {
            SourceGroup::Forecast => TriggerPolicy::ForecastHumidity,
            _ => TriggerPolicy::SensorSeverity,
        }
    }

    /// Names of the source fields this group reads for a given site.
    pub fn source_fields(&self, site_id: &str) -> GroupFields {
        match self {
            SourceGroup::Forecast => GroupFields {
                wind_speed: FCST_WS.to_string(),
                temperature: FCST_TEMP.to_string(),
                liquid_water: FCST_SNOW_WATER.to_string(),
                relative_humidity: FCST_RH.to_string(),
                severity: None,
            },
            sensor => {
                let tag = |t: &str| format!("{}-{}-{}", site_id, sensor.prefix(), t);
                GroupFields {
                    wind_speed: tag(SENSOR_TAG_WIND_SPEED),
                    temperature: tag(SENSOR_TAG_TEMPERATURE),
                    liquid_water: tag(SENSOR_TAG_LWC),
                    relative_humidity: tag(SENSOR_TAG_RH),
                    severity: Some(tag(SENSOR_TAG_SEVERITY)),
                }
            }
        }
    }

    /// Name of a derived column for this group.
    pub fn column(&self, suffix: &str) -> String {
        format!("{}_{}", self.prefix(), suffix)
    }
}

impl fmt::Display for SourceGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.prefix())
    }
}

/// Resolved source field names for one group at one site.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupFields {
    pub wind_speed: String,
    pub temperature: String,
    pub liquid_water: String,
    pub relative_humidity: String,
    pub severity: Option<String>,
}

impl GroupFields {
    pub fn all(&self) -> Vec<&str> {
        let mut names = vec![
            self.wind_speed.as_str(),
            self.temperature.as_str(),
            self.liquid_water.as_str(),
            self.relative_humidity.as_str(),
        ];
        if let Some(sev) = &self.severity {
            names.push(sev.as_str());
        }
        names
    }
}

// ---------------------------------------------------------------------------
// Field names
// ---------------------------------------------------------------------------

/// Consolidated forecast fields.
pub const FCST_WS: &str = "FCST_WS";
pub const FCST_TEMP: &str = "FCST_Temp";
pub const FCST_RH: &str = "FCST_RH";
pub const FCST_SNOW_WATER: &str = "FCST_SnowWater";

/// Sensor package measurement tags.
pub const SENSOR_TAG_WIND_SPEED: &str = "WindSpeed";
pub const SENSOR_TAG_TEMPERATURE: &str = "NacelleTemperature2";
pub const SENSOR_TAG_LWC: &str = "LWC";
pub const SENSOR_TAG_RH: &str = "RH";
pub const SENSOR_TAG_SEVERITY: &str = "IcingSeverity";

/// Suffixes of derived per-group columns.
pub const COL_GLAZE_CURVE: &str = "GlazeCurve";
pub const COL_HARD_RIME_CURVE: &str = "HardRimeCurve";
pub const COL_ICING_TYPE_ZONE: &str = "IcingTypeZone";
pub const COL_RH_THRESHOLD: &str = "RH_Threshold";
pub const COL_ICING: &str = "Icing";
pub const COL_WIND_ZONE: &str = "WindZone m/s";
pub const COL_PITCH_ZONE: &str = "PitchZone";
pub const COL_TEMP_ZONE: &str = "TempZone";

// ---------------------------------------------------------------------------
// Alert cooldown
// ---------------------------------------------------------------------------

/// Site-local time of the most recent alert sent for a site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertCooldownRecord {
    pub site_id: String,
    pub last_alert: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 5).unwrap().and_hms_opt(h, 0, 0).unwrap()
    }

    #[test]
    fn test_series_rejects_non_hour_aligned_timestamp() {
        let bad = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap().and_hms_opt(3, 30, 0).unwrap();
        let mut series = Series::new();
        let err = series.insert(bad, Row::new()).unwrap_err();
        assert!(matches!(err, IcingError::InvalidTimestamp(t) if t == bad));
    }

    #[test]
    fn test_upsert_merges_fields_later_wins() {
        let mut series = Series::new();
        series.upsert(ts(1), Row::from([("a", FieldValue::Number(1.0))])).unwrap();
        series
            .upsert(ts(1), Row::from([("a", FieldValue::Number(2.0)), ("b", FieldValue::Number(3.0))]))
            .unwrap();
        let row = series.get(&ts(1)).unwrap();
        assert_eq!(row.number("a"), Some(2.0));
        assert_eq!(row.number("b"), Some(3.0));
    }

    #[test]
    fn test_nan_is_absent() {
        let mut row = Row::new();
        row.set_number("x", f64::NAN);
        assert!(!row.contains("x"));
    }

    #[test]
    fn test_floor_hour_and_parse() {
        let parsed = parse_timestamp("2024-01-05 03:47").unwrap();
        assert_eq!(floor_hour(parsed), ts(3));
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_gap_detection() {
        let mut series = Series::new();
        series.insert(ts(1), Row::new()).unwrap();
        series.insert(ts(2), Row::new()).unwrap();
        assert!(series.is_gap_free());
        series.insert(ts(4), Row::new()).unwrap();
        assert!(!series.is_gap_free());
    }

    #[test]
    fn test_sensor_group_field_names() {
        let fields = SourceGroup::SensorSecondary.source_fields("DFS");
        assert_eq!(fields.wind_speed, "DFS-MCMS1-WindSpeed");
        assert_eq!(fields.temperature, "DFS-MCMS1-NacelleTemperature2");
        assert_eq!(fields.severity.as_deref(), Some("DFS-MCMS1-IcingSeverity"));
        assert_eq!(SourceGroup::Forecast.source_fields("DFS").severity, None);
    }

    #[test]
    fn test_icing_type_labels_round_trip_and_hits() {
        for t in [IcingType::NoIce, IcingType::Glaze, IcingType::HardRime, IcingType::SoftRime] {
            assert_eq!(IcingType::from_label(t.label()), Some(t));
        }
        assert!(!IcingType::NoIce.is_icing());
        assert!(IcingType::SoftRime.is_icing());
    }
}
