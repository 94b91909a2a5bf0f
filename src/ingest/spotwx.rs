/// SpotWx point-forecast API client
///
/// Retrieves HRRR, NAM and GFS model output for a latitude/longitude as CSV.
/// The API returns one row per forecast hour in the requested timezone with a
/// `DATETIME` column plus one column per parameter (TMP, RH, WSPD, SQP, ...).
///
/// API: https://spotwx.io/api.php?key=...&lat=...&lon=...&tz=...&model=...

use chrono::Duration;
use tracing::{debug, warn};

use crate::config::{ForecastModel, SiteSpec};
use crate::error::IcingError;
use crate::model::{floor_hour, parse_timestamp, Row, Series};

use super::ForecastSource;

pub const SPOTWX_BASE_URL: &str = "https://spotwx.io/api.php";

/// Timestamp column every response must carry.
pub const DATETIME_COLUMN: &str = "DATETIME";

pub const PARAM_WIND_SPEED: &str = "WSPD";
pub const PARAM_TEMPERATURE: &str = "TMP";
pub const PARAM_RH: &str = "RH";
pub const PARAM_SNOW_WATER: &str = "SQP";

/// km/h to m/s
const KMH_TO_MS: f64 = 0.27778;
/// Reference height of the model wind field (m)
const MODEL_WIND_HEIGHT_M: f64 = 80.0;
/// Wind shear exponent for the power-law height correction
const SHEAR_EXPONENT: f64 = 0.2;

// ============================================================================
// Pure helpers
// ============================================================================

/// Column name of a parameter once prefixed with its model (`HRRR_TMP`).
pub fn model_column(model: ForecastModel, param: &str) -> String {
    format!("{}_{}", model.prefix(), param)
}

/// Converts a SpotWx wind speed (km/h at model height) to m/s at hub height.
pub fn hub_height_wind(kmh: f64, hub_height_m: f64) -> f64 {
    kmh * KMH_TO_MS * (hub_height_m / MODEL_WIND_HEIGHT_M).powf(SHEAR_EXPONENT)
}

/// Request URL. The timezone is the DST-adjusted site offset.
pub fn build_url(base: &str, api_key: &str, spec: &SiteSpec, model: ForecastModel) -> String {
    format!(
        "{}?key={}&lat={}&lon={}&tz={}&model={}",
        base,
        urlencoding::encode(api_key),
        spec.latitude,
        spec.longitude,
        spec.utc_offset_hours(),
        model.api_name()
    )
}

/// Parses a SpotWx CSV body into a raw series.
///
/// Timestamps are floored to the hour. Numeric cells become fields named by
/// their header; empty and non-numeric cells (DATE, TIME, PTYPE) are left out.
pub fn parse_csv(body: &str, model: ForecastModel) -> Result<Series, IcingError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(body.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| IcingError::fetch("spotwx", format!("{} header: {}", model, e)))?
        .clone();
    let dt_idx = headers
        .iter()
        .position(|h| h == DATETIME_COLUMN)
        .ok_or_else(|| IcingError::fetch("spotwx", format!("'{}' column not found in {} data", DATETIME_COLUMN, model)))?;

    let mut series = Series::new();
    for record in reader.records() {
        let record = record.map_err(|e| IcingError::fetch("spotwx", format!("{} row: {}", model, e)))?;
        let Some(dt_text) = record.get(dt_idx) else {
            continue;
        };
        let ts = floor_hour(parse_timestamp(dt_text)?);

        let mut row = Row::new();
        for (i, cell) in record.iter().enumerate() {
            if i == dt_idx {
                continue;
            }
            if let (Some(name), Ok(v)) = (headers.get(i), cell.parse::<f64>()) {
                row.set_number(name, v);
            }
        }
        series.upsert(ts, row)?;
    }
    Ok(series)
}

/// Keeps `params` from a raw model series, prefixes them with the model name
/// and converts wind speed to hub-height m/s.
pub fn select_parameters(
    raw: &Series,
    model: ForecastModel,
    params: &[String],
    hub_height_m: f64,
) -> Series {
    for p in params {
        if !raw.is_empty() && !raw.has_field(p) {
            warn!(%model, parameter = %p, "configured parameter missing from forecast");
        }
    }

    let mut out = Series::new();
    for (ts, row) in raw.iter() {
        let mut selected = Row::new();
        for p in params {
            if let Some(v) = row.number(p) {
                let v = if p.contains(PARAM_WIND_SPEED) { hub_height_wind(v, hub_height_m) } else { v };
                selected.set_number(&model_column(model, p), v);
            }
        }
        out.insert_aligned(*ts, selected);
    }
    out
}

// ============================================================================
// HTTP client
// ============================================================================

pub struct SpotWxClient {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
}

impl SpotWxClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, IcingError> {
        Self::with_base_url(SPOTWX_BASE_URL, api_key)
    }

    pub fn with_base_url(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, IcingError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;
        Ok(Self { client, base_url: base_url.into(), api_key: api_key.into() })
    }
}

impl ForecastSource for SpotWxClient {
    fn fetch_model(&self, spec: &SiteSpec, model: ForecastModel) -> Result<Series, IcingError> {
        debug!(
            site = %spec.site_id,
            %model,
            lat = spec.latitude,
            lon = spec.longitude,
            tz = spec.utc_offset_hours(),
            "fetching forecast"
        );
        let url = build_url(&self.base_url, &self.api_key, spec, model);
        let response = self.client.get(&url).send()?;

        if !response.status().is_success() {
            return Err(IcingError::fetch(
                "spotwx",
                format!("{} request for {} failed: HTTP {}", model, spec.site_id, response.status()),
            ));
        }
        let body = response.text()?;
        let series = parse_csv(&body, model)?;

        if let (Some(first), Some(last)) = (series.first_timestamp(), series.last_timestamp()) {
            debug!(%model, %first, hours = (last - first + Duration::hours(1)).num_hours(), "forecast parsed");
        }
        Ok(series)
    }
}

// ============================================================================
// Tests
// ============================================================================
