/// Persistence for reconciled series and alert cooldowns.
///
/// Each site owns several tables: `combined` (telemetry + forecast, the only
/// one that is classified) and one raw table per forecast model. A store
/// replaces a table wholesale; callers only store after reconciliation and
/// classification both succeeded, and write all of a site's tables in one
/// `store_all` call.
///
/// Backends:
/// - `file`     — one JSON document per site/table under a data directory
/// - `postgres` — rows in `icing.series_rows` with JSONB fields
/// - `cooldown` — JSON file of last-alert timestamps

pub mod cooldown;
pub mod file;
pub mod postgres;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ForecastModel;
use crate::error::IcingError;
use crate::model::{AlertCooldownRecord, Row, Series, TIMESTAMP_FORMAT};

pub use cooldown::FileCooldownStore;
pub use file::FileStore;
pub use self::postgres::PgStore;

/// Which of a site's series is being read or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeriesTable {
    Combined,
    Model(ForecastModel),
}

impl SeriesTable {
    pub fn name(&self) -> &'static str {
        match self {
            SeriesTable::Combined => "combined",
            SeriesTable::Model(ForecastModel::Hrrr) => "hrrr",
            SeriesTable::Model(ForecastModel::Nam) => "nam",
            SeriesTable::Model(ForecastModel::Gfs) => "gfs",
        }
    }
}

impl fmt::Display for SeriesTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Load/store of hourly series. At most one writer per site at a time.
pub trait SeriesStore: Send + Sync {
    /// `None` when nothing was ever stored for this site/table.
    fn load(&self, site_id: &str, table: SeriesTable) -> Result<Option<Series>, IcingError>;

    /// Replaces the stored series.
    fn store(&self, site_id: &str, table: SeriesTable, series: &Series) -> Result<(), IcingError> {
        self.store_all(site_id, &[(table, series)])
    }

    /// Replaces several of a site's tables together. On error none of them
    /// is replaced.
    fn store_all(&self, site_id: &str, tables: &[(SeriesTable, &Series)]) -> Result<(), IcingError>;
}

/// Last-alert timestamps, read and rewritten only by the alert stage.
pub trait CooldownStore: Send + Sync {
    fn load_cooldown(&self, site_id: &str) -> Result<Option<AlertCooldownRecord>, IcingError>;

    fn save_cooldown(&self, record: &AlertCooldownRecord) -> Result<(), IcingError>;
}

// ---------------------------------------------------------------------------
// Serialized row form shared by the JSON backends
// ---------------------------------------------------------------------------

/// One persisted hour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRow {
    pub timestamp: String,
    pub fields: Row,
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn series_to_rows(series: &Series) -> Vec<StoredRow> {
    series
        .iter()
        .map(|(ts, row)| StoredRow { timestamp: format_timestamp(ts), fields: row.clone() })
        .collect()
}

/// Rebuilds a series, rejecting unparsable or non-hour-aligned timestamps.
pub fn rows_to_series(rows: Vec<StoredRow>) -> Result<Series, IcingError> {
    let mut series = Series::new();
    for stored in rows {
        let ts = NaiveDateTime::parse_from_str(&stored.timestamp, TIMESTAMP_FORMAT)
            .map_err(|_| IcingError::UnparsableTimestamp(stored.timestamp.clone()))?;
        series.insert(ts, stored.fields)?;
    }
    Ok(series)
}
