/// Alert delivery.
///
/// Delivery is fire-and-forget: a failed send is logged and dropped, never
/// retried and never allowed to fail the site's run.

use serde::Serialize;
use std::sync::Mutex;
use tracing::{info, warn};

use crate::error::IcingError;

/// Subject and body of a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub subject: String,
    pub body: String,
}

impl AlertMessage {
    /// Standard sustained-icing notification for a site.
    pub fn consecutive_icing(site_id: &str) -> Self {
        Self {
            subject: format!("Consecutive Icing Signs - {}", site_id),
            body: format!(
                "The condition of three hours consecutive of icing possibility in the next 12 hours has been met at {}.",
                site_id
            ),
        }
    }
}

/// Where alerts go.
pub trait AlertSink: Send + Sync {
    fn send(&self, site_id: &str, message: &AlertMessage) -> Result<(), IcingError>;
}

/// Sends through `sink`, logging instead of propagating failures.
pub fn deliver(sink: &dyn AlertSink, site_id: &str, message: &AlertMessage) -> bool {
    match sink.send(site_id, message) {
        Ok(()) => {
            info!(site = site_id, subject = %message.subject, "alert sent");
            true
        }
        Err(e) => {
            warn!(site = site_id, error = %e, "alert delivery failed");
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Webhook
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    subject: &'a str,
    body: &'a str,
    recipients: &'a [String],
}

/// Posts `{subject, body, recipients}` as JSON to a mail relay or chat hook.
pub struct WebhookSink {
    url: String,
    recipients: Vec<String>,
    client: reqwest::blocking::Client,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, recipients: Vec<String>) -> Result<Self, IcingError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self { url: url.into(), recipients, client })
    }
}

impl AlertSink for WebhookSink {
    fn send(&self, _site_id: &str, message: &AlertMessage) -> Result<(), IcingError> {
        let payload = WebhookPayload {
            subject: &message.subject,
            body: &message.body,
            recipients: &self.recipients,
        };
        let response = self.client.post(&self.url).json(&payload).send()?;
        if !response.status().is_success() {
            return Err(IcingError::fetch("alert webhook", format!("HTTP {}", response.status())));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Log-only and in-memory sinks
// ---------------------------------------------------------------------------

/// Writes alerts to the log. Used when no webhook is configured.
#[derive(Debug, Default)]
pub struct LogSink;

impl AlertSink for LogSink {
    fn send(&self, site_id: &str, message: &AlertMessage) -> Result<(), IcingError> {
        warn!(site = site_id, subject = %message.subject, "{}", message.body);
        Ok(())
    }
}

/// Keeps every alert in memory; handy for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    sent: Mutex<Vec<(String, AlertMessage)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(String, AlertMessage)> {
        self.sent.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl AlertSink for MemorySink {
    fn send(&self, site_id: &str, message: &AlertMessage) -> Result<(), IcingError> {
        self.sent
            .lock()
            .map_err(|_| IcingError::persistence("alert log lock poisoned"))?
            .push((site_id.to_string(), message.clone()));
        Ok(())
    }
}
