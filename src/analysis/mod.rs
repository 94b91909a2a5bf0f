/// Data analysis for the icing monitor.
///
/// Submodules:
/// - `reconcile` — merges fresh batches into the persisted hourly history.
/// - `icing`     — per-hour icing classification and operating zones.

pub mod icing;
pub mod reconcile;
