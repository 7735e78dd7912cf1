use async_trait::async_trait;
use spm_monitor::alert::{AlertError, AlertPayload, AlertSink};
use std::sync::Mutex;

/// Keeps every payload it is asked to send
#[derive(Default)]
pub struct RecordingAlertSink {
    sent: Mutex<Vec<AlertPayload>>,
}

impl RecordingAlertSink {
    pub fn sent(&self) -> Vec<AlertPayload> {
        self.sent.lock().unwrap().clone()
    }

    /// Value of the `Count` field of each sent alert
    pub fn counts(&self) -> Vec<String> {
        self.sent()
            .iter()
            .flat_map(|p| p.attachments.iter())
            .flat_map(|a| a.fields.iter())
            .filter(|f| f.title == "Count")
            .map(|f| f.value.clone())
            .collect()
    }
}

#[async_trait]
impl AlertSink for RecordingAlertSink {
    async fn send(&self, payload: &AlertPayload) -> Result<(), AlertError> {
        self.sent.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

/// Rejects every alert
#[derive(Default)]
pub struct FailingAlertSink;

#[async_trait]
impl AlertSink for FailingAlertSink {
    async fn send(&self, _payload: &AlertPayload) -> Result<(), AlertError> {
        Err(AlertError::Status {
            status: 500,
            body: "webhook down".to_string(),
        })
    }
}
