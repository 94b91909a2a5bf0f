/// Integration tests for the per-site pipeline and the worker-pool run
///
/// These tests drive `Daemon::run_once_at` end to end with canned forecast
/// and telemetry sources, a temp-directory JSON store and an in-memory alert
/// sink, so no network or database is needed:
/// 1. First run persists a classified, gap-free combined table and alerts
/// 2. A second run inside the cooldown is suppressed
/// 3. Stored history is merged, never regressed
/// 4. One failing or panicking site never blocks the others
/// 5. A failed save leaves every stored table as it was
///
/// Run with: cargo test --test pipeline_integration

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use icemon_service::alert::evaluator::AlertDecision;
use icemon_service::alert::{AlertSink, MemorySink};
use icemon_service::config::{ForecastModel, SiteRegistry, SiteSpec};
use icemon_service::daemon::{Daemon, DaemonConfig, Services};
use icemon_service::error::{IcingError, PipelineStage};
use icemon_service::ingest::{ForecastSource, TelemetrySource};
use icemon_service::logging;
use icemon_service::model::{Row, Series, SourceGroup};
use icemon_service::store::{CooldownStore, FileCooldownStore, FileStore, SeriesStore, SeriesTable};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

const SITE_TEMPLATE: &str = r#"
    [[site]]
    site_id = "{ID}"
    latitude = 45.0
    longitude = -75.0
    tz_offset_hours = -5
    hub_height_m = 80.0
    rh_thresholds = { glaze = 90.0, hard_rime = 92.0, soft_rime = 85.0 }
    wind_zones = [
        { label = "0-4", upper_ms = 4.0 },
        { label = "4-8", upper_ms = 8.0 },
        { label = "8-12", upper_ms = 12.0 },
        { label = "12+", upper_ms = 25.0 },
    ]
    pitch = { pitch_in_ms = 3.0, pitch_out_ms = 10.0 }

    [site.forecast]
    models = ["HRRR"]

    [site.forecast.parameters]
    HRRR = ["TMP", "RH", "WSPD", "SQP"]

    [[site.sensors]]
    tag_prefix = "{ID}-MCMS"
"#;

fn registry(ids: &[&str]) -> SiteRegistry {
    let toml: String = ids.iter().map(|id| SITE_TEMPLATE.replace("{ID}", id)).collect();
    SiteRegistry::from_toml_str(&toml).expect("test registry should parse")
}

fn local(h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 5).unwrap().and_hms_opt(h, 0, 0).unwrap()
}

/// 13:00 UTC, 08:00 at the test sites.
fn now_utc() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 5, 13, 0, 0).unwrap()
}

/// Raw HRRR output from 08:00 to 20:00 local: -8 °C, RH 95 %, 43.2 km/h.
/// At hub height 80 m that is about 18.2 m/s, which puts -8 °C between the
/// hard-rime and glaze curves every hour.
fn icing_forecast() -> Series {
    Series::from_rows((8..=20).map(|h| {
        let mut row = Row::new();
        row.set_number("TMP", -8.0);
        row.set_number("RH", 95.0);
        row.set_number("WSPD", 43.2);
        row.set_number("SQP", 0.0);
        (local(h), row)
    }))
    .unwrap()
}

struct FakeForecast;

impl ForecastSource for FakeForecast {
    fn fetch_model(&self, spec: &SiteSpec, _model: ForecastModel) -> Result<Series, IcingError> {
        match spec.site_id.as_str() {
            "BAD" => Err(IcingError::fetch("spotwx", "HTTP 503 Service Unavailable")),
            "BOOM" => panic!("forecast parser exploded"),
            _ => Ok(icing_forecast()),
        }
    }
}

/// One sensor hour at 07:00 local for every site; no turbines.
struct FakeTelemetry;

impl TelemetrySource for FakeTelemetry {
    fn fetch_sensors(&self, spec: &SiteSpec) -> Result<Series, IcingError> {
        let tag = |t: &str| format!("{}-MCMS-{}", spec.site_id, t);
        let mut row = Row::new();
        row.set_number(&tag("WindSpeed"), 8.0);
        row.set_number(&tag("NacelleTemperature2"), -1.0);
        row.set_number(&tag("LWC"), 0.1);
        row.set_number(&tag("RH"), 97.0);
        row.set_number(&tag("IcingSeverity"), 0.0);
        Series::from_rows(vec![(local(7), row)])
    }

    fn fetch_turbines(&self, _spec: &SiteSpec) -> Result<Series, IcingError> {
        Ok(Series::new())
    }
}

struct Harness {
    _dir: TempDir,
    store: Arc<FileStore>,
    cooldowns: Arc<FileCooldownStore>,
    sink: Arc<MemorySink>,
    daemon: Daemon,
}

fn harness(ids: &[&str]) -> Harness {
    logging::init_test();
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::new(dir.path().join("data")));
    let cooldowns = Arc::new(FileCooldownStore::new(dir.path().join("data").join("cooldown.json")));
    let sink = Arc::new(MemorySink::new());

    let store_dyn: Arc<dyn SeriesStore> = store.clone();
    let cooldowns_dyn: Arc<dyn CooldownStore> = cooldowns.clone();
    let sink_dyn: Arc<dyn AlertSink> = sink.clone();
    let services = Services {
        forecast: Arc::new(FakeForecast),
        telemetry: Arc::new(FakeTelemetry),
        store: store_dyn,
        cooldowns: cooldowns_dyn,
        alerts: sink_dyn,
    };
    let config = DaemonConfig { workers: 2, ..DaemonConfig::default() };
    let daemon = Daemon::with_services(config, registry(ids), services);

    Harness { _dir: dir, store, cooldowns, sink, daemon }
}

// ---------------------------------------------------------------------------
// 1. First run
// ---------------------------------------------------------------------------

#[test]
fn test_first_run_persists_classified_series_and_alerts() {
    let h = harness(&["TST"]);
    let summary = h.daemon.run_once_at(now_utc()).unwrap();

    assert!(summary.failures.is_empty(), "unexpected failures: {:?}", summary.failures);
    assert_eq!(summary.reports.len(), 1);
    let report = &summary.reports[0];
    assert_eq!(report.decision, AlertDecision::Send { now: local(8), run_start: local(8) });
    assert!(report.alert_delivered);
    assert_eq!(report.groups, vec![SourceGroup::Forecast, SourceGroup::SensorPrimary]);

    let sent = h.sink.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1.subject, "Consecutive Icing Signs - TST");

    let combined = h.store.load("TST", SeriesTable::Combined).unwrap().expect("combined stored");
    assert!(combined.is_gap_free());
    assert_eq!(combined.first_timestamp(), Some(local(7)), "starts at first telemetry hour");
    assert_eq!(combined.last_timestamp(), Some(local(20)));

    let at8 = combined.get(&local(8)).unwrap();
    assert_eq!(at8.label("FCST_Icing"), Some("Hard Rime"));
    assert_eq!(at8.label("FCST_IcingTypeZone"), Some("Hard Rime"));
    assert_eq!(at8.label("FCST_TempZone"), Some("-5 to -10"));

    let at7 = combined.get(&local(7)).unwrap();
    assert_eq!(at7.label("MCMS_Icing"), Some("Glaze"), "LWC above zero triggers");
    assert!(!at7.contains("FCST_Icing"), "no forecast at 07:00");

    let hrrr = h.store.load("TST", SeriesTable::Model(ForecastModel::Hrrr)).unwrap().expect("hrrr stored");
    assert_eq!(hrrr.get(&local(8)).unwrap().number("WSPD"), Some(43.2), "raw model table keeps km/h");

    let cooldown = h.cooldowns.load_cooldown("TST").unwrap().expect("cooldown recorded");
    assert_eq!(cooldown.last_alert, local(8));
}

// ---------------------------------------------------------------------------
// 2. Cooldown
// ---------------------------------------------------------------------------

#[test]
fn test_second_run_within_cooldown_is_suppressed() {
    let h = harness(&["TST"]);
    h.daemon.run_once_at(now_utc()).unwrap();
    let summary = h.daemon.run_once_at(now_utc() + Duration::hours(1)).unwrap();

    assert!(matches!(
        summary.reports[0].decision,
        AlertDecision::SuppressedByCooldown { last_alert, .. } if last_alert == local(8)
    ));
    assert_eq!(h.sink.sent().len(), 1, "no second alert");
}

#[test]
fn test_run_after_cooldown_alerts_again() {
    let h = harness(&["TST"]);
    h.daemon.run_once_at(now_utc()).unwrap();
    let summary = h.daemon.run_once_at(now_utc() + Duration::hours(6)).unwrap();

    assert!(summary.reports[0].decision.is_send());
    assert_eq!(h.sink.sent().len(), 2);
    assert_eq!(h.cooldowns.load_cooldown("TST").unwrap().unwrap().last_alert, local(14));
}

// ---------------------------------------------------------------------------
// 3. History merge
// ---------------------------------------------------------------------------

#[test]
fn test_existing_history_is_extended_not_replaced() {
    let h = harness(&["TST"]);

    let mut old = Row::new();
    old.set_number("TST-MCMS-RH", 88.0);
    old.set_label("FCST_Icing", "NO ICE");
    let history = Series::from_rows(vec![(local(3), old.clone())]).unwrap();
    h.store.store("TST", SeriesTable::Combined, &history).unwrap();

    h.daemon.run_once_at(now_utc()).unwrap();
    let combined = h.store.load("TST", SeriesTable::Combined).unwrap().unwrap();

    assert_eq!(combined.first_timestamp(), Some(local(3)));
    assert!(combined.is_gap_free());
    assert_eq!(combined.len(), 18, "03:00 through 20:00");
    assert_eq!(combined.get(&local(3)).unwrap().number("TST-MCMS-RH"), Some(88.0));
    assert!(combined.contains(&local(5)), "gap hour filled");
    assert!(!combined.get(&local(5)).unwrap().contains("FCST_Icing"));
}

// ---------------------------------------------------------------------------
// 4. Failure isolation
// ---------------------------------------------------------------------------

#[test]
fn test_failing_site_does_not_block_others() {
    let h = harness(&["BAD", "TST"]);
    let summary = h.daemon.run_once_at(now_utc()).unwrap();

    assert_eq!(summary.reports.len(), 1);
    assert_eq!(summary.reports[0].site_id, "TST");

    assert_eq!(summary.failures.len(), 1);
    let failure = &summary.failures[0];
    assert_eq!(failure.site_id, "BAD");
    assert_eq!(failure.stage, PipelineStage::Fetch);
    assert!(matches!(failure.error, IcingError::FetchError { .. }));

    assert!(h.store.load("BAD", SeriesTable::Combined).unwrap().is_none(), "nothing persisted");
}

#[test]
fn test_panicking_site_reported_as_worker_failure() {
    let h = harness(&["BOOM", "TST"]);
    let summary = h.daemon.run_once_at(now_utc()).unwrap();

    assert_eq!(summary.reports.len(), 1);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].site_id, "BOOM");
    assert_eq!(summary.failures[0].stage, PipelineStage::Worker);
    assert!(h.store.load("BOOM", SeriesTable::Combined).unwrap().is_none());
}

#[test]
fn test_unknown_site_in_filter_is_config_failure() {
    let mut h = harness(&["TST"]);
    let config = DaemonConfig {
        site_filter: Some(vec!["NOPE".to_string()]),
        ..h.daemon.config().clone()
    };
    let services = Services {
        forecast: Arc::new(FakeForecast),
        telemetry: Arc::new(FakeTelemetry),
        store: h.store.clone(),
        cooldowns: h.cooldowns.clone(),
        alerts: h.sink.clone(),
    };
    h.daemon = Daemon::with_services(config, registry(&["TST"]), services);

    let summary = h.daemon.run_once_at(now_utc()).unwrap();
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].stage, PipelineStage::Config);
    assert!(matches!(summary.failures[0].error, IcingError::ConfigNotFound(_)));
}

// ---------------------------------------------------------------------------
// 5. Persistence failures
// ---------------------------------------------------------------------------

#[test]
fn test_failed_model_table_write_leaves_combined_untouched() {
    let h = harness(&["TST"]);

    let mut old = Row::new();
    old.set_number("TST-MCMS-RH", 88.0);
    let history = Series::from_rows(vec![(local(3), old)]).unwrap();
    h.store.store("TST", SeriesTable::Combined, &history).unwrap();

    // A directory on the hrrr temp path makes that table unwritable
    let hrrr_path = h.store.path_for("TST", SeriesTable::Model(ForecastModel::Hrrr));
    let blocker = hrrr_path.with_extension("json.tmp");
    fs::create_dir_all(&blocker).unwrap();

    let summary = h.daemon.run_once_at(now_utc()).unwrap();
    assert!(summary.reports.is_empty());
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].stage, PipelineStage::Persist);

    assert_eq!(h.store.load("TST", SeriesTable::Combined).unwrap(), Some(history));
    assert!(h.store.load("TST", SeriesTable::Model(ForecastModel::Hrrr)).unwrap().is_none());
    assert!(h.sink.sent().is_empty(), "no alert without a save");
    assert!(h.cooldowns.load_cooldown("TST").unwrap().is_none());

    // Once the store is writable again the next run catches up
    fs::remove_dir(&blocker).unwrap();
    let summary = h.daemon.run_once_at(now_utc()).unwrap();
    assert!(summary.failures.is_empty());
    assert_eq!(h.store.load("TST", SeriesTable::Combined).unwrap().unwrap().first_timestamp(), Some(local(3)));
    assert_eq!(h.sink.sent().len(), 1);
}

#[test]
fn test_failed_fetch_leaves_stored_tables_untouched() {
    let h = harness(&["BAD"]);
    let history = Series::from_rows(vec![(local(3), Row::new())]).unwrap();
    h.store.store("BAD", SeriesTable::Combined, &history).unwrap();

    let summary = h.daemon.run_once_at(now_utc()).unwrap();
    assert_eq!(summary.failures[0].stage, PipelineStage::Fetch);
    assert_eq!(h.store.load("BAD", SeriesTable::Combined).unwrap(), Some(history));
}
