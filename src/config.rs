/// Site registry loader - parses sites.toml
///
/// Keeps per-site thresholds, zone boundaries, timezone handling and the
/// list of forecast parameters / sensor packages out of the code, so a site
/// can be tuned or added without recompiling the service.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::IcingError;
use crate::model::IcingType;

/// Default location of the registry, relative to the working directory.
pub const DEFAULT_SITES_FILE: &str = "sites.toml";

// ---------------------------------------------------------------------------
// Site specification
// ---------------------------------------------------------------------------

/// Static configuration for one wind site. Immutable for a processing run.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteSpec {
    pub site_id: String,
    #[serde(default)]
    pub name: Option<String>,

    // Geographic location (forecast requests are made for this point)
    pub latitude: f64,
    pub longitude: f64,

    /// Standard-time offset from UTC, in hours
    pub tz_offset_hours: i32,
    /// When set, one hour is added to the offset (flat, not calendar-aware)
    #[serde(default)]
    pub dst_observed: bool,

    /// Used for the forecast wind-speed height correction
    pub hub_height_m: f64,

    pub rh_thresholds: RhThresholds,
    /// Exactly four bands, ascending upper bounds
    pub wind_zones: Vec<WindZoneBand>,
    pub pitch: PitchBreakpoints,

    #[serde(default)]
    pub forecast: ForecastConfig,

    #[serde(default)]
    pub sensors: Vec<SensorPackage>,

    /// Turbine production measures fetched for every turbine asset
    #[serde(default = "default_turbine_measures")]
    pub turbine_measures: Vec<String>,
}

/// Relative-humidity trigger thresholds (percent), one per icing type.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RhThresholds {
    pub glaze: f64,
    pub hard_rime: f64,
    pub soft_rime: f64,
}

impl RhThresholds {
    /// Threshold for an icing type; NO ICE maps to 0.
    pub fn for_type(&self, icing: IcingType) -> f64 {
        match icing {
            IcingType::Glaze => self.glaze,
            IcingType::HardRime => self.hard_rime,
            IcingType::SoftRime => self.soft_rime,
            IcingType::NoIce => 0.0,
        }
    }
}

/// One wind-speed band; `upper_ms` is inclusive.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WindZoneBand {
    pub label: String,
    pub upper_ms: f64,
}

/// Pitch-control wind-speed breakpoints (m/s).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PitchBreakpoints {
    pub pitch_in_ms: f64,
    pub pitch_out_ms: f64,
}

/// Numerical weather prediction models offered by SpotWx.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
pub enum ForecastModel {
    #[serde(rename = "HRRR")]
    Hrrr,
    #[serde(rename = "NAM")]
    Nam,
    #[serde(rename = "GFS")]
    Gfs,
}

impl ForecastModel {
    /// Column prefix, e.g. `HRRR`.
    pub fn prefix(&self) -> &'static str {
        match self {
            ForecastModel::Hrrr => "HRRR",
            ForecastModel::Nam => "NAM",
            ForecastModel::Gfs => "GFS",
        }
    }

    /// Model name as the SpotWx API expects it.
    pub fn api_name(&self) -> &'static str {
        match self {
            ForecastModel::Hrrr => "hrrr",
            ForecastModel::Nam => "nam",
            ForecastModel::Gfs => "gfs",
        }
    }
}

impl fmt::Display for ForecastModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.prefix())
    }
}

/// Which models to request and which raw parameters to keep from each.
#[derive(Debug, Clone, Deserialize)]
pub struct ForecastConfig {
    /// Priority order for consolidating into the FCST group
    #[serde(default = "default_models")]
    pub models: Vec<ForecastModel>,
    /// Raw SpotWx parameters keyed by model prefix (`HRRR = ["TMP", ...]`)
    #[serde(default)]
    pub parameters: BTreeMap<String, Vec<String>>,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self { models: default_models(), parameters: BTreeMap::new() }
    }
}

impl ForecastConfig {
    /// Parameters configured for a model (empty if none).
    pub fn parameters_for(&self, model: ForecastModel) -> &[String] {
        self.parameters.get(model.prefix()).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// A physical icing sensor package (e.g. `MN-MCMS`, `DFS-MCMS1`).
#[derive(Debug, Clone, Deserialize)]
pub struct SensorPackage {
    /// Asset name used as the measurement tag prefix
    pub tag_prefix: String,
    #[serde(default = "default_sensor_tags")]
    pub tags: Vec<String>,
}

fn default_models() -> Vec<ForecastModel> {
    vec![ForecastModel::Hrrr, ForecastModel::Nam, ForecastModel::Gfs]
}

fn default_sensor_tags() -> Vec<String> {
    [
        "LWC",
        "NacelleTemperature",
        "NacelleTemperature2",
        "Precipitation",
        "RH",
        "WindSpeed",
        "IcingSeverity",
        "IceThickness",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_turbine_measures() -> Vec<String> {
    ["KPI-PerformanceIndex", "ActivePower", "KPI-TheoreticalPower"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl SiteSpec {
    /// Effective UTC offset in hours, DST included.
    pub fn utc_offset_hours(&self) -> i64 {
        self.tz_offset_hours as i64 + if self.dst_observed { 1 } else { 0 }
    }

    /// Converts a UTC instant to naive site-local time.
    pub fn to_local(&self, utc: DateTime<Utc>) -> NaiveDateTime {
        utc.naive_utc() + Duration::hours(self.utc_offset_hours())
    }

    /// Checks the invariants the classifier relies on.
    pub fn validate(&self) -> Result<(), IcingError> {
        let fail = |msg: String| Err(IcingError::ConfigLoadError(format!("{}: {}", self.site_id, msg)));

        if self.site_id.trim().is_empty() {
            return Err(IcingError::ConfigLoadError("site_id must not be empty".to_string()));
        }
        if !(self.hub_height_m > 0.0) {
            return fail(format!("hub height must be positive, got {}", self.hub_height_m));
        }
        for (name, v) in [
            ("glaze", self.rh_thresholds.glaze),
            ("hard_rime", self.rh_thresholds.hard_rime),
            ("soft_rime", self.rh_thresholds.soft_rime),
        ] {
            if !(0.0..=100.0).contains(&v) {
                return fail(format!("RH threshold {} out of range: {}", name, v));
            }
        }
        if self.wind_zones.len() != 4 {
            return fail(format!("expected 4 wind zones, found {}", self.wind_zones.len()));
        }
        if let Some(band) = self.wind_zones.iter().find(|b| !b.upper_ms.is_finite()) {
            return fail(format!("wind zone '{}' upper bound is not finite", band.label));
        }
        if self.wind_zones.windows(2).any(|w| w[0].upper_ms >= w[1].upper_ms) {
            return fail("wind zone upper bounds must be strictly ascending".to_string());
        }
        if !self.pitch.pitch_in_ms.is_finite() || !self.pitch.pitch_out_ms.is_finite() {
            return fail("pitch breakpoints must be finite".to_string());
        }
        if self.pitch.pitch_in_ms > self.pitch.pitch_out_ms {
            return fail(format!(
                "PitchIN ({}) must not exceed PitchOUT ({})",
                self.pitch.pitch_in_ms, self.pitch.pitch_out_ms
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Root configuration structure for TOML parsing
#[derive(Debug, Deserialize)]
struct SiteFile {
    site: Vec<SiteSpec>,
}

/// All configured sites, keyed by site id. Loaded once per run.
#[derive(Debug, Clone, Default)]
pub struct SiteRegistry {
    sites: HashMap<String, SiteSpec>,
}

impl SiteRegistry {
    /// Parses and validates a registry from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, IcingError> {
        let file: SiteFile = toml::from_str(contents)
            .map_err(|e| IcingError::ConfigLoadError(e.to_string()))?;

        let mut sites = HashMap::new();
        for spec in file.site {
            spec.validate()?;
            if sites.contains_key(&spec.site_id) {
                return Err(IcingError::ConfigLoadError(format!(
                    "duplicate site id '{}'",
                    spec.site_id
                )));
            }
            sites.insert(spec.site_id.clone(), spec);
        }
        Ok(Self { sites })
    }

    /// Resolves a site id to its specification.
    pub fn site_spec(&self, site_id: &str) -> Result<&SiteSpec, IcingError> {
        self.sites
            .get(site_id)
            .ok_or_else(|| IcingError::ConfigNotFound(site_id.to_string()))
    }

    /// Site ids in sorted order.
    pub fn site_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sites.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

/// Loads the site registry from a TOML file.
pub fn load_registry<P: AsRef<Path>>(path: P) -> Result<SiteRegistry, IcingError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .map_err(|e| IcingError::ConfigLoadError(format!("{}: {}", path.display(), e)))?;
    SiteRegistry::from_toml_str(&contents)
}

/// Loads the registry from `sites.toml` in the working directory.
pub fn load_registry_default() -> Result<SiteRegistry, IcingError> {
    load_registry(DEFAULT_SITES_FILE)
}
