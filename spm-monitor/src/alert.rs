//! Alert sink
//!
//! A detection batch with at least one anomaly produces a single alert. The
//! payload follows the Slack incoming-webhook shape: a short text plus one
//! attachment with labelled fields.
//!
//! Alerting is best-effort: callers log `AlertError` and carry on.

use crate::ledger::MonitorType;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Webhook request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub const MISSING_ITEMS_TEXT: &str = "Missing items";

/// Attachment colour used for drift batches
const WARNING_COLOR: &str = "#f2c744";

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("Alert request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Alert sink returned {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentField {
    pub title: String,
    pub value: String,
    pub short: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertAttachment {
    pub color: String,
    pub fields: Vec<AttachmentField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertPayload {
    pub text: String,
    pub attachments: Vec<AlertAttachment>,
}

impl AlertPayload {
    /// Summary of one detection batch
    pub fn missing_items(
        source_label: &str,
        environment: &str,
        organization_id: Option<&str>,
        count: usize,
        monitor_type: MonitorType,
    ) -> Self {
        let field = |title: &str, value: String| AttachmentField {
            title: title.to_string(),
            value,
            short: true,
        };

        let mut fields = vec![
            field("School", source_label.to_string()),
            field("Environment", environment.to_string()),
        ];
        if let Some(org) = organization_id.filter(|o| !o.is_empty()) {
            fields.push(field("Organization", org.to_string()));
        }
        fields.push(field("Count", count.to_string()));
        fields.push(field("Type", monitor_type.to_string()));

        Self {
            text: MISSING_ITEMS_TEXT.to_string(),
            attachments: vec![AlertAttachment {
                color: WARNING_COLOR.to_string(),
                fields,
            }],
        }
    }
}

/// Destination for alert batches
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, payload: &AlertPayload) -> Result<(), AlertError>;
}

/// Posts alerts to a Slack-compatible incoming webhook
pub struct SlackWebhookSink {
    http_client: Client,
    webhook_url: String,
}

impl SlackWebhookSink {
    pub fn new(webhook_url: String) -> Result<Self, AlertError> {
        let http_client = Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self {
            http_client,
            webhook_url,
        })
    }
}

#[async_trait]
impl AlertSink for SlackWebhookSink {
    async fn send(&self, payload: &AlertPayload) -> Result<(), AlertError> {
        let response = self
            .http_client
            .post(&self.webhook_url)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AlertError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!(status = status.as_u16(), "Alert delivered");
        Ok(())
    }
}

/// Writes alerts to the log; used when no webhook is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn send(&self, payload: &AlertPayload) -> Result<(), AlertError> {
        let fields = payload
            .attachments
            .iter()
            .flat_map(|a| a.fields.iter())
            .map(|f| format!("{}={}", f.title, f.value))
            .collect::<Vec<_>>()
            .join(" ");
        info!(alert = %payload.text, "{}", fields);
        Ok(())
    }
}

/// Webhook sink when a URL is configured, log sink otherwise
pub fn sink_for(webhook_url: Option<&str>) -> Result<Arc<dyn AlertSink>, AlertError> {
    match webhook_url {
        Some(url) => Ok(Arc::new(SlackWebhookSink::new(url.to_string())?)),
        None => Ok(Arc::new(LogAlertSink)),
    }
}
