/// Bazefield SCADA API client
///
/// Retrieves hourly AVERAGE aggregates for turbine production measures and
/// icing-sensor (MCMS) tags. Measurement names are `{asset}-{tag}`, e.g.
/// `DFS-MCMS1-WindSpeed` or `MN-T07-ActivePower`.
///
/// Response shape for measurement aggregates:
///   timeSeriesList[]
///     .measurementName
///     .timeSeries[]
///       .t        — epoch milliseconds, UTC
///       .t_local  — server-local string (ignored; converted from `t`)
///       .v        — value, may be null
///       .q        — quality flag (ignored)

use chrono::DateTime;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::SiteSpec;
use crate::error::IcingError;
use crate::model::{floor_hour, Series};

use super::TelemetrySource;

/// Asset item type for wind turbines.
pub const TURBINE_ITEM_TYPE: i64 = 44;

/// Server-side cap on tags per aggregate request.
pub const MAX_TAGS_PER_REQUEST: usize = 30;

// ============================================================================
// Bazefield API Response Structures
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct BazefieldAsset {
    pub title: String,
    #[serde(rename = "itemType")]
    pub item_type: ItemType,
    pub site: AssetSite,
}

#[derive(Debug, Deserialize)]
pub struct ItemType {
    #[serde(rename = "itemTypeId")]
    pub item_type_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct AssetSite {
    #[serde(rename = "shortName")]
    pub short_name: String,
}

#[derive(Debug, Deserialize)]
pub struct AggregateResponse {
    #[serde(rename = "timeSeriesList", default)]
    pub time_series_list: Vec<MeasurementSeries>,
}

#[derive(Debug, Deserialize)]
pub struct MeasurementSeries {
    #[serde(rename = "measurementName")]
    pub measurement_name: String,
    #[serde(rename = "timeSeries", default)]
    pub time_series: Vec<MeasurementPoint>,
}

#[derive(Debug, Deserialize)]
pub struct MeasurementPoint {
    pub t: i64,
    pub v: Option<f64>,
}

/// Relative time window and aggregation interval for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateWindow {
    pub from: String,
    pub to: String,
    pub interval: String,
}

impl Default for AggregateWindow {
    /// The last completed hour.
    fn default() -> Self {
        Self {
            from: "*h-1h".to_string(),
            to: "*h".to_string(),
            interval: "1h".to_string(),
        }
    }
}

// ============================================================================
// Pure helpers
// ============================================================================

/// Turbine titles for a site: item type 44 whose site short name matches.
pub fn turbine_titles(assets: &[BazefieldAsset], site_id: &str) -> Vec<String> {
    assets
        .iter()
        .filter(|a| a.item_type.item_type_id == TURBINE_ITEM_TYPE && a.site.short_name == site_id)
        .map(|a| a.title.clone())
        .collect()
}

/// `{asset}-{tag}` for every asset and tag.
pub fn measurement_tags(assets: &[String], tags: &[String]) -> Vec<String> {
    assets
        .iter()
        .flat_map(|asset| tags.iter().map(move |t| format!("{}-{}", asset, t)))
        .collect()
}

/// Aggregate request URL for one batch of tags.
pub fn aggregate_url(base: &str, tags: &[String], window: &AggregateWindow) -> String {
    let joined = tags
        .iter()
        .map(|t| urlencoding::encode(t).into_owned())
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "{}/measurements/{}/aggregates/AVERAGE/from/{}/to/{}/interval/{}?format=json",
        base.trim_end_matches('/'),
        joined,
        window.from,
        window.to,
        window.interval
    )
}

/// Parses an aggregate response into site-local hourly rows.
pub fn parse_aggregates(body: &str, spec: &SiteSpec) -> Result<Series, IcingError> {
    let response: AggregateResponse = serde_json::from_str(body)
        .map_err(|e| IcingError::fetch("bazefield", format!("malformed aggregate response: {}", e)))?;
    aggregates_to_series(&response, spec)
}

pub fn aggregates_to_series(response: &AggregateResponse, spec: &SiteSpec) -> Result<Series, IcingError> {
    let mut series = Series::new();
    for measurement in &response.time_series_list {
        for point in &measurement.time_series {
            let Some(value) = point.v else { continue };
            let Some(utc) = DateTime::from_timestamp_millis(point.t) else {
                warn!(measurement = %measurement.measurement_name, t = point.t, "timestamp out of range");
                continue;
            };
            let ts = floor_hour(spec.to_local(utc));
            let mut row = crate::model::Row::new();
            row.set_number(&measurement.measurement_name, value);
            series.upsert(ts, row)?;
        }
    }
    Ok(series)
}

// ============================================================================
// HTTP client
// ============================================================================

pub struct BazefieldClient {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    window: AggregateWindow,
}

impl BazefieldClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, IcingError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            window: AggregateWindow::default(),
        })
    }

    fn get(&self, url: &str) -> Result<String, IcingError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .send()?;
        if !response.status().is_success() {
            return Err(IcingError::fetch("bazefield", format!("HTTP {} for {}", response.status(), url)));
        }
        Ok(response.text()?)
    }

    /// Turbine asset titles for a site.
    pub fn turbine_assets(&self, site_id: &str) -> Result<Vec<String>, IcingError> {
        let url = format!("{}/turbines/{}?format=json", self.base_url.trim_end_matches('/'), site_id);
        let assets: Vec<BazefieldAsset> = serde_json::from_str(&self.get(&url)?)
            .map_err(|e| IcingError::fetch("bazefield", format!("malformed asset list: {}", e)))?;
        Ok(turbine_titles(&assets, site_id))
    }

    /// Fetches `tags` in batches and merges the results.
    pub fn fetch_tags(&self, spec: &SiteSpec, tags: &[String]) -> Result<Series, IcingError> {
        let batches = tags.chunks(MAX_TAGS_PER_REQUEST);
        if batches.len() > 1 {
            debug!(site = %spec.site_id, batches = batches.len(), "querying bazefield in batches");
        }

        let mut merged = Series::new();
        for batch in batches {
            let url = aggregate_url(&self.base_url, batch, &self.window);
            let part = parse_aggregates(&self.get(&url)?, spec)?;
            for (ts, row) in part {
                merged.upsert(ts, row)?;
            }
        }
        Ok(merged)
    }
}

impl TelemetrySource for BazefieldClient {
    fn fetch_sensors(&self, spec: &SiteSpec) -> Result<Series, IcingError> {
        let mut merged = Series::new();
        for package in &spec.sensors {
            let tags = measurement_tags(std::slice::from_ref(&package.tag_prefix), &package.tags);
            for (ts, row) in self.fetch_tags(spec, &tags)? {
                merged.upsert(ts, row)?;
            }
        }
        Ok(merged)
    }

    fn fetch_turbines(&self, spec: &SiteSpec) -> Result<Series, IcingError> {
        let titles = self.turbine_assets(&spec.site_id)?;
        if titles.is_empty() {
            warn!(site = %spec.site_id, "no turbine assets found");
            return Ok(Series::new());
        }
        let tags = measurement_tags(&titles, &spec.turbine_measures);
        self.fetch_tags(spec, &tags)
    }
}

/// Telemetry source for deployments without SCADA access.
#[derive(Debug, Default)]
pub struct NoTelemetry;

impl TelemetrySource for NoTelemetry {
    fn fetch_sensors(&self, _spec: &SiteSpec) -> Result<Series, IcingError> {
        Ok(Series::new())
    }

    fn fetch_turbines(&self, _spec: &SiteSpec) -> Result<Series, IcingError> {
        Ok(Series::new())
    }
}

// ============================================================================
// Tests
// ============================================================================
