/// Error taxonomy for the icing monitor.
///
/// Reconciliation and classification never produce errors on well-formed
/// input; missing readings degrade to absent fields instead. Everything here
/// is raised at a boundary: configuration, timestamp validation, fetch, or
/// persistence.

use chrono::NaiveDateTime;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IcingError {
    /// Site id missing from the configuration store
    #[error("site '{0}' not found in site registry")]
    ConfigNotFound(String),

    /// Configuration store unreadable, unparsable, or failing validation
    #[error("failed to load site configuration: {0}")]
    ConfigLoadError(String),

    /// Timestamp not aligned to the hour (precondition of every Series)
    #[error("timestamp {0} is not hour-aligned")]
    InvalidTimestamp(NaiveDateTime),

    /// Timestamp text that could not be parsed at all
    #[error("unparsable timestamp '{0}'")]
    UnparsableTimestamp(String),

    /// Reported by a fetch collaborator, surfaced unchanged
    #[error("fetch failed ({source_name}): {message}")]
    FetchError { source_name: String, message: String },

    /// Store unreadable or unwritable
    #[error("persistence failed: {0}")]
    PersistenceError(String),

    /// A worker ended without reporting an outcome (it panicked)
    #[error("worker task aborted: {0}")]
    TaskAborted(String),
}

impl IcingError {
    pub fn fetch(source_name: &str, message: impl fmt::Display) -> Self {
        IcingError::FetchError {
            source_name: source_name.to_string(),
            message: message.to_string(),
        }
    }

    pub fn persistence(message: impl fmt::Display) -> Self {
        IcingError::PersistenceError(message.to_string())
    }
}

impl From<reqwest::Error> for IcingError {
    fn from(e: reqwest::Error) -> Self {
        let source_name = e
            .url()
            .and_then(|u| u.host_str().map(String::from))
            .unwrap_or_else(|| "http".to_string());
        IcingError::FetchError { source_name, message: e.to_string() }
    }
}

// ---------------------------------------------------------------------------
// Per-site failure context
// ---------------------------------------------------------------------------

/// Stage of the per-site pipeline at which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Config,
    Fetch,
    Load,
    Evaluate,
    Persist,
    /// The worker thread panicked before reporting an outcome
    Worker,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Config => "config",
            PipelineStage::Fetch => "fetch",
            PipelineStage::Load => "load",
            PipelineStage::Evaluate => "evaluate",
            PipelineStage::Persist => "persist",
            PipelineStage::Worker => "worker",
        };
        write!(f, "{}", name)
    }
}

/// A failed site task, with enough context to log and report it.
#[derive(Debug, Error)]
#[error("site {site_id} failed at {stage}: {error}")]
pub struct SiteFailure {
    pub site_id: String,
    pub stage: PipelineStage,
    #[source]
    pub error: IcingError,
}

impl SiteFailure {
    pub fn new(site_id: &str, stage: PipelineStage, error: IcingError) -> Self {
        Self { site_id: site_id.to_string(), stage, error }
    }
}
