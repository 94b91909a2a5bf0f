/// icemon_service: wind-farm icing monitoring service.
///
/// # Module structure
///
/// ```text
/// icemon_service
/// ├── model       — shared data types (Series, Row, SourceGroup, IcingType, …)
/// ├── error       — IcingError taxonomy and per-site failure context
/// ├── config      — site registry loader (sites.toml)
/// ├── zones       — wind / pitch / temperature zone banding
/// ├── logging     — tracing setup and log-file retention
/// ├── daemon      — worker pool, per-site pipeline, polling loop
/// ├── db          — PostgreSQL connection and schema validation
/// ├── ingest
/// │   ├── spotwx    — SpotWx forecast CSV: URL construction + parsing
/// │   ├── bazefield — Bazefield telemetry JSON: assets, batching, parsing
/// │   └── fixtures (test only) — representative API response payloads
/// ├── analysis
/// │   ├── reconcile — gap-free hourly upsert of new batches into history
/// │   └── icing     — curves, icing type, trigger verdicts, zones
/// ├── alert
/// │   ├── evaluator — forward-window sustained icing check with cooldown
/// │   └── delivery  — alert text, webhook / log sinks
/// └── store
///     ├── file      — JSON documents per site/table
///     ├── cooldown  — JSON last-alert map
///     └── postgres  — icing.series_rows / icing.alert_cooldown
/// ```

/// Public modules
pub mod alert;
pub mod analysis;
pub mod config;
pub mod daemon;
pub mod db;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod store;
pub mod zones;
