/// Data ingestion.
///
/// Two collaborators feed the pipeline:
/// - `spotwx`    — point forecasts (HRRR / NAM / GFS) as CSV
/// - `bazefield` — hourly averaged turbine and icing-sensor telemetry as JSON
///
/// The traits below are the seam the daemon depends on, so tests can swap in
/// canned series without touching the network. The free functions turn the
/// raw per-source series into the single combined batch that gets reconciled.

pub mod bazefield;
pub mod spotwx;

#[cfg(test)]
pub(crate) mod fixtures;

use tracing::debug;

use crate::config::{ForecastModel, SiteSpec};
use crate::error::IcingError;
use crate::model::{Series, FCST_RH, FCST_SNOW_WATER, FCST_TEMP, FCST_WS};

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Fetches one weather model's forecast for a site.
pub trait ForecastSource: Send + Sync {
    /// Raw model output in site-local time, unprefixed columns, source units.
    fn fetch_model(&self, spec: &SiteSpec, model: ForecastModel) -> Result<Series, IcingError>;
}

/// Fetches the latest hourly telemetry for a site.
pub trait TelemetrySource: Send + Sync {
    /// Icing sensor packages, fields named `{tag_prefix}-{tag}`.
    fn fetch_sensors(&self, spec: &SiteSpec) -> Result<Series, IcingError>;

    /// Turbine production measures, fields named `{turbine}-{measure}`.
    fn fetch_turbines(&self, spec: &SiteSpec) -> Result<Series, IcingError>;
}

// ---------------------------------------------------------------------------
// Forecast assembly
// ---------------------------------------------------------------------------

/// Forecast data for one run: the merged multi-model batch plus each model's
/// raw output, which is kept in its own table.
#[derive(Debug, Clone, Default)]
pub struct ForecastBatch {
    pub merged: Series,
    pub per_model: Vec<(ForecastModel, Series)>,
}

/// Consolidated field and the raw SpotWx parameter it is taken from.
const CONSOLIDATED: [(&str, &str); 4] = [
    (FCST_WS, spotwx::PARAM_WIND_SPEED),
    (FCST_TEMP, spotwx::PARAM_TEMPERATURE),
    (FCST_RH, spotwx::PARAM_RH),
    (FCST_SNOW_WATER, spotwx::PARAM_SNOW_WATER),
];

/// Fetches every configured model, keeps the configured parameters, merges
/// them on timestamp and fills the consolidated `FCST_*` fields.
pub fn fetch_forecast(source: &dyn ForecastSource, spec: &SiteSpec) -> Result<ForecastBatch, IcingError> {
    let mut batch = ForecastBatch::default();

    for &model in &spec.forecast.models {
        let raw = source.fetch_model(spec, model)?;
        debug!(site = %spec.site_id, %model, rows = raw.len(), "forecast fetched");

        let selected = spotwx::select_parameters(
            &raw,
            model,
            spec.forecast.parameters_for(model),
            spec.hub_height_m,
        );
        for (ts, row) in selected {
            batch.merged.upsert(ts, row)?;
        }
        batch.per_model.push((model, raw));
    }

    consolidate_forecast(&mut batch.merged, &spec.forecast.models);
    Ok(batch)
}

/// Fills `FCST_WS`, `FCST_Temp`, `FCST_RH` and `FCST_SnowWater` for each hour
/// from the first model in `priority` that has the parameter.
pub fn consolidate_forecast(series: &mut Series, priority: &[ForecastModel]) {
    for (_, row) in series.rows_mut() {
        for (target, param) in CONSOLIDATED {
            let value = priority
                .iter()
                .find_map(|m| row.number(&spotwx::model_column(*m, param)));
            match value {
                Some(v) => row.set_number(target, v),
                None => {
                    row.remove(target);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Telemetry and combination
// ---------------------------------------------------------------------------

/// Sensor and turbine telemetry merged on timestamp.
pub fn fetch_telemetry(source: &dyn TelemetrySource, spec: &SiteSpec) -> Result<Series, IcingError> {
    let mut telemetry = source.fetch_turbines(spec)?;
    for (ts, row) in source.fetch_sensors(spec)? {
        telemetry.upsert(ts, row)?;
    }
    Ok(telemetry)
}

/// Joins telemetry onto the forecast. When telemetry is present the combined
/// batch starts at its earliest hour; earlier forecast hours are dropped.
pub fn combine(forecast: &Series, telemetry: &Series) -> Series {
    let mut combined = forecast.clone();
    if let Some(start) = telemetry.first_timestamp() {
        combined.retain_from(start);
    }
    for (ts, row) in telemetry.iter() {
        combined.upsert_aligned(*ts, row.clone());
    }
    combined
}
