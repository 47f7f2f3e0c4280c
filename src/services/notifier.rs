//! Downstream completion notification.
//!
//! Delivery is best-effort: callers log a failure and carry on.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::WebhookSettings;
use crate::error::{AppError, AppResult};
use crate::models::CompletionNotice;

const WEBHOOK_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Receiver of "request finished uploading" notices.
#[async_trait]
pub trait CompletionNotifier: Send + Sync + 'static {
    async fn notify(&self, notice: &CompletionNotice) -> AppResult<()>;
}

/// Posts completion notices as JSON to a configured URL.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(settings: &WebhookSettings) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(WEBHOOK_CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| AppError::Webhook(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: settings.url.clone(),
        })
    }
}

#[async_trait]
impl CompletionNotifier for WebhookNotifier {
    async fn notify(&self, notice: &CompletionNotice) -> AppResult<()> {
        let response = self
            .client
            .post(&self.url)
            .json(notice)
            .send()
            .await
            .map_err(|e| AppError::Webhook(format!("POST {} failed: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Webhook(format!(
                "POST {} answered {}",
                self.url, status
            )));
        }

        debug!(request_id = %notice.request_id, "Completion webhook delivered");
        Ok(())
    }
}
