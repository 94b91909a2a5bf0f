/// Alerting: sustained-icing evaluation and notification delivery.
///
/// Submodules:
/// - `evaluator` — forward-window scan with per-site cooldown.
/// - `delivery`  — message text and the sinks alerts are sent through.

pub mod delivery;
pub mod evaluator;

pub use delivery::{AlertMessage, AlertSink, LogSink, MemorySink, WebhookSink};
pub use evaluator::{evaluate, AlertDecision, AlertPolicy};
