/// Core daemon implementation for the icing monitor
///
/// This module implements the main daemon loop that:
/// 1. Loads the site registry and prunes the log file on startup
/// 2. Fans sites out to a fixed-size worker pool, one task per site
/// 3. Per site: fetch → load → reconcile → classify → evaluate → persist
/// 4. Sends sustained-icing alerts and records their cooldown
/// 5. Collects every site's outcome; one site's failure never stops another

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use threadpool::ThreadPool;
use tracing::{debug, error, info, warn};

use crate::alert::delivery::{self, AlertMessage, AlertSink, LogSink, WebhookSink};
use crate::alert::evaluator::{self, AlertDecision, AlertPolicy};
use crate::analysis::{icing, reconcile};
use crate::config::{self, SiteRegistry};
use crate::error::{IcingError, PipelineStage, SiteFailure};
use crate::ingest::bazefield::{BazefieldClient, NoTelemetry};
use crate::ingest::spotwx::SpotWxClient;
use crate::ingest::{self, ForecastSource, TelemetrySource};
use crate::logging;
use crate::model::{Series, SourceGroup};
use crate::store::{CooldownStore, FileCooldownStore, FileStore, PgStore, SeriesStore, SeriesTable};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Site registry file (default: sites.toml)
    pub sites_file: PathBuf,

    /// JSON series store root (default: data/)
    pub data_dir: PathBuf,

    /// Cooldown record file used with the file store (default: data/cooldown.json)
    pub cooldown_file: PathBuf,

    /// Worker pool size (default: 4)
    pub workers: usize,

    /// How often to run all sites (default: 60 minutes, the data is hourly)
    pub poll_interval_minutes: u64,

    pub alert_policy: AlertPolicy,

    pub log_file: Option<PathBuf>,
    pub log_retention_days: i64,

    /// Restrict the run to these site ids (default: every configured site)
    pub site_filter: Option<Vec<String>>,

    pub spotwx_api_key: Option<String>,
    pub bazefield_base_url: Option<String>,
    pub bazefield_api_key: Option<String>,
    pub alert_webhook: Option<String>,
    pub alert_recipients: Vec<String>,

    /// PostgreSQL store when set, JSON files otherwise
    pub database_url: Option<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            sites_file: PathBuf::from(config::DEFAULT_SITES_FILE),
            data_dir: PathBuf::from("data"),
            cooldown_file: PathBuf::from("data").join("cooldown.json"),
            workers: 4,
            poll_interval_minutes: 60,
            alert_policy: AlertPolicy::default(),
            log_file: None,
            log_retention_days: logging::DEFAULT_LOG_RETENTION_DAYS,
            site_filter: None,
            spotwx_api_key: None,
            bazefield_base_url: None,
            bazefield_api_key: None,
            alert_webhook: None,
            alert_recipients: Vec::new(),
            database_url: None,
        }
    }
}

impl DaemonConfig {
    /// Defaults overridden from the environment (and `.env`, if present).
    pub fn from_env() -> Result<Self, IcingError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env` with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, IcingError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut cfg = Self::default();

        if let Some(v) = get("ICEMON_SITES_FILE") {
            cfg.sites_file = PathBuf::from(v);
        }
        if let Some(v) = get("ICEMON_DATA_DIR") {
            cfg.data_dir = PathBuf::from(&v);
            cfg.cooldown_file = cfg.data_dir.join("cooldown.json");
        }
        if let Some(v) = get("ICEMON_WORKERS") {
            cfg.workers = parse_positive("ICEMON_WORKERS", &v)?;
        }
        if let Some(v) = get("ICEMON_POLL_MINUTES") {
            cfg.poll_interval_minutes = parse_positive("ICEMON_POLL_MINUTES", &v)? as u64;
        }
        if let Some(v) = get("ICEMON_ALERT_RECIPIENTS") {
            cfg.alert_recipients = v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }
        cfg.alert_webhook = get("ICEMON_ALERT_WEBHOOK");
        cfg.spotwx_api_key = get("SPOTWX_API_KEY");
        cfg.bazefield_base_url = get("BAZEFIELD_BASE_URL");
        cfg.bazefield_api_key = get("BAZEFIELD_API_KEY");
        cfg.database_url = get("DATABASE_URL");
        Ok(cfg)
    }
}

fn parse_positive(key: &str, value: &str) -> Result<usize, IcingError> {
    match value.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(IcingError::ConfigLoadError(format!("{} must be a positive integer, got '{}'", key, value))),
    }
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Everything a site task talks to. Shared read-only across workers.
#[derive(Clone)]
pub struct Services {
    pub forecast: Arc<dyn ForecastSource>,
    pub telemetry: Arc<dyn TelemetrySource>,
    pub store: Arc<dyn SeriesStore>,
    pub cooldowns: Arc<dyn CooldownStore>,
    pub alerts: Arc<dyn AlertSink>,
}

impl Services {
    /// Real clients built from configuration.
    pub fn from_config(config: &DaemonConfig) -> Result<Self, IcingError> {
        let api_key = config
            .spotwx_api_key
            .clone()
            .ok_or_else(|| IcingError::ConfigLoadError("SPOTWX_API_KEY is not set".to_string()))?;
        let forecast: Arc<dyn ForecastSource> = Arc::new(SpotWxClient::new(api_key)?);

        let telemetry: Arc<dyn TelemetrySource> = match &config.bazefield_base_url {
            Some(url) => {
                let key = config.bazefield_api_key.clone().ok_or_else(|| {
                    IcingError::ConfigLoadError("BAZEFIELD_API_KEY is required with BAZEFIELD_BASE_URL".to_string())
                })?;
                Arc::new(BazefieldClient::new(url.clone(), key)?)
            }
            None => {
                warn!("BAZEFIELD_BASE_URL not set, running forecast-only");
                Arc::new(NoTelemetry)
            }
        };

        let (store, cooldowns): (Arc<dyn SeriesStore>, Arc<dyn CooldownStore>) = match &config.database_url {
            Some(url) => {
                let pg = Arc::new(PgStore::connect(url)?);
                let store: Arc<dyn SeriesStore> = pg.clone();
                let cooldowns: Arc<dyn CooldownStore> = pg;
                (store, cooldowns)
            }
            None => {
                let store: Arc<dyn SeriesStore> = Arc::new(FileStore::new(&config.data_dir));
                let cooldowns: Arc<dyn CooldownStore> = Arc::new(FileCooldownStore::new(&config.cooldown_file));
                (store, cooldowns)
            }
        };

        let alerts: Arc<dyn AlertSink> = match &config.alert_webhook {
            Some(url) => Arc::new(WebhookSink::new(url.clone(), config.alert_recipients.clone())?),
            None => Arc::new(LogSink),
        };

        Ok(Self { forecast, telemetry, store, cooldowns, alerts })
    }
}

// ---------------------------------------------------------------------------
// Per-site pipeline
// ---------------------------------------------------------------------------

/// Successful outcome of one site task.
#[derive(Debug, Clone)]
pub struct SiteReport {
    pub site_id: String,
    /// Rows in the persisted combined series
    pub rows: usize,
    /// Groups that had every source field and were classified
    pub groups: Vec<SourceGroup>,
    pub decision: AlertDecision,
    pub alert_delivered: bool,
}

/// Runs one site end to end. Nothing is persisted unless reconciliation and
/// classification of every table succeeded.
pub fn process_site(
    site_id: &str,
    registry: &SiteRegistry,
    services: &Services,
    policy: &AlertPolicy,
    now_utc: DateTime<Utc>,
) -> Result<SiteReport, SiteFailure> {
    let fail = move |stage: PipelineStage| move |e: IcingError| SiteFailure::new(site_id, stage, e);

    let spec = registry.site_spec(site_id).map_err(fail(PipelineStage::Config))?;

    // Fetch
    let forecast = ingest::fetch_forecast(services.forecast.as_ref(), spec).map_err(fail(PipelineStage::Fetch))?;
    let telemetry = ingest::fetch_telemetry(services.telemetry.as_ref(), spec).map_err(fail(PipelineStage::Fetch))?;
    let incoming = ingest::combine(&forecast.merged, &telemetry);
    debug!(site = site_id, forecast_rows = forecast.merged.len(), telemetry_rows = telemetry.len(), "fetched");

    // Load + reconcile every table before anything is written
    let load = |table: SeriesTable| {
        services
            .store
            .load(site_id, table)
            .map(Option::unwrap_or_default)
            .map_err(fail(PipelineStage::Load))
    };

    let existing = load(SeriesTable::Combined)?;
    let merged = reconcile::reconcile(&existing, &incoming);

    let mut model_tables = Vec::with_capacity(forecast.per_model.len());
    for (model, raw) in &forecast.per_model {
        let table = SeriesTable::Model(*model);
        let existing = load(table)?;
        model_tables.push((table, reconcile::reconcile(&existing, raw)));
    }

    // Classify
    let groups = icing::present_groups(&merged, &spec.site_id);
    let classified = icing::classify(&merged, spec, &SourceGroup::ALL);

    // Evaluate
    let cooldown = services.cooldowns.load_cooldown(site_id).map_err(fail(PipelineStage::Evaluate))?;
    let decision = evaluator::evaluate_with_policy(&classified, spec, cooldown.as_ref(), now_utc, policy);

    // Persist every table together, combined last
    let mut tables: Vec<(SeriesTable, &Series)> = model_tables.iter().map(|(t, s)| (*t, s)).collect();
    tables.push((SeriesTable::Combined, &classified));
    services.store.store_all(site_id, &tables).map_err(fail(PipelineStage::Persist))?;

    let mut alert_delivered = false;
    match &decision {
        AlertDecision::Send { run_start, .. } => {
            info!(site = site_id, %run_start, "sustained icing forecast, sending alert");
            alert_delivered = delivery::deliver(
                services.alerts.as_ref(),
                site_id,
                &AlertMessage::consecutive_icing(site_id),
            );
            if let Some(record) = decision.new_cooldown(site_id) {
                services.cooldowns.save_cooldown(&record).map_err(fail(PipelineStage::Persist))?;
            }
        }
        AlertDecision::SuppressedByCooldown { last_alert, .. } => {
            info!(site = site_id, %last_alert, "icing alert suppressed by cooldown");
        }
        AlertDecision::NoAlert => {}
    }

    Ok(SiteReport {
        site_id: site_id.to_string(),
        rows: classified.len(),
        groups,
        decision,
        alert_delivered,
    })
}

// ---------------------------------------------------------------------------
// Daemon State
// ---------------------------------------------------------------------------

/// Outcome of one pass over every site.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub reports: Vec<SiteReport>,
    pub failures: Vec<SiteFailure>,
}

impl RunSummary {
    pub fn alerts_sent(&self) -> usize {
        self.reports.iter().filter(|r| r.decision.is_send()).count()
    }
}

/// Main daemon state
pub struct Daemon {
    config: DaemonConfig,
    registry: Arc<SiteRegistry>,
    services: Option<Services>,
}

impl Daemon {
    pub fn with_config(config: DaemonConfig) -> Self {
        Self {
            config,
            registry: Arc::new(SiteRegistry::default()),
            services: None,
        }
    }

    /// Daemon with pre-built collaborators (tests, dry runs).
    pub fn with_services(config: DaemonConfig, registry: SiteRegistry, services: Services) -> Self {
        Self {
            config,
            registry: Arc::new(registry),
            services: Some(services),
        }
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    pub fn registry(&self) -> &SiteRegistry {
        &self.registry
    }

    /// Initialize daemon: prune the log, load the registry, build clients
    pub fn initialize(&mut self) -> Result<(), IcingError> {
        if let Some(path) = &self.config.log_file {
            let removed = logging::prune_log_file(path, self.config.log_retention_days, Utc::now())?;
            if removed > 0 {
                info!(removed, path = %path.display(), "pruned old log lines");
            }
        }

        let registry = config::load_registry(&self.config.sites_file)?;
        if registry.is_empty() {
            return Err(IcingError::ConfigLoadError(format!(
                "no sites configured in {}",
                self.config.sites_file.display()
            )));
        }
        if let Some(filter) = &self.config.site_filter {
            for id in filter {
                registry.site_spec(id)?;
            }
        }
        self.registry = Arc::new(registry);

        if self.services.is_none() {
            self.services = Some(Services::from_config(&self.config)?);
        }
        Ok(())
    }

    /// Site ids this daemon processes.
    pub fn site_ids(&self) -> Vec<String> {
        match &self.config.site_filter {
            Some(filter) => filter.clone(),
            None => self.registry.site_ids(),
        }
    }

    /// One pass over every site at the current time.
    pub fn run_once(&self) -> Result<RunSummary, IcingError> {
        self.run_once_at(Utc::now())
    }

    /// One pass over every site, as of `now_utc`.
    pub fn run_once_at(&self, now_utc: DateTime<Utc>) -> Result<RunSummary, IcingError> {
        let services = self
            .services
            .clone()
            .ok_or_else(|| IcingError::ConfigLoadError("daemon not initialized".to_string()))?;

        let site_ids = self.site_ids();
        let pool = ThreadPool::new(self.config.workers.max(1));
        let (tx, rx) = mpsc::channel();

        for site_id in &site_ids {
            let tx = tx.clone();
            let site_id = site_id.clone();
            let registry = Arc::clone(&self.registry);
            let services = services.clone();
            let policy = self.config.alert_policy;

            pool.execute(move || {
                let outcome = process_site(&site_id, &registry, &services, &policy, now_utc);
                // Receiver outlives the pool; a send error only means the run was abandoned
                let _ = tx.send((site_id, outcome));
            });
        }
        drop(tx);

        let mut outcomes: HashMap<String, Result<SiteReport, SiteFailure>> = rx.iter().collect();
        pool.join();

        let mut summary = RunSummary::default();
        for site_id in site_ids {
            match outcomes.remove(&site_id) {
                Some(Ok(report)) => summary.reports.push(report),
                Some(Err(failure)) => summary.failures.push(failure),
                None => summary.failures.push(SiteFailure::new(
                    &site_id,
                    PipelineStage::Worker,
                    IcingError::TaskAborted(format!("no outcome reported for {}", site_id)),
                )),
            }
        }

        for failure in &summary.failures {
            error!(site = %failure.site_id, stage = %failure.stage, error = %failure.error, "site failed");
        }
        Ok(summary)
    }

    /// Main daemon loop (runs indefinitely)
    pub fn run(&self) -> Result<(), IcingError> {
        info!(
            poll_minutes = self.config.poll_interval_minutes,
            sites = self.site_ids().len(),
            workers = self.config.workers,
            "starting daemon loop"
        );

        loop {
            let start = Utc::now();

            let summary = self.run_once_at(start)?;
            info!(
                succeeded = summary.reports.len(),
                failed = summary.failures.len(),
                alerts = summary.alerts_sent(),
                "run complete"
            );

            // Sleep until next poll interval
            let elapsed = (Utc::now() - start).num_seconds();
            let sleep_seconds = (self.config.poll_interval_minutes * 60) as i64 - elapsed;

            if sleep_seconds > 0 {
                std::thread::sleep(std::time::Duration::from_secs(sleep_seconds as u64));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
