//! AlertService - Print Failure Notifications
//!
//! ## Responsibilities
//!
//! - Discord webhook message with the captured image attached
//! - Cooldown between alerts
//! - Fire-and-forget delivery; failures are logged only

use crate::ai_client::AnalysisVerdict;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Webhook request timeout
const SEND_TIMEOUT: Duration = Duration::from_secs(15);

/// Longest analysis excerpt included in a message
const MAX_EXCERPT_CHARS: usize = 1500;

/// Whether a new alert may go out at `now`
pub fn cooldown_elapsed(
    last_sent: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    cooldown: chrono::Duration,
) -> bool {
    match last_sent {
        None => true,
        Some(last) => now - last >= cooldown,
    }
}

/// AlertService instance
pub struct AlertService {
    client: reqwest::Client,
    webhook_url: Option<String>,
    cooldown: chrono::Duration,
    last_sent: Mutex<Option<DateTime<Utc>>>,
}

impl AlertService {
    /// Create new AlertService; without a webhook URL alerts are disabled
    pub fn new(webhook_url: Option<String>, cooldown_minutes: u64) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(SEND_TIMEOUT).build()?;
        let webhook_url = webhook_url.filter(|u| !u.trim().is_empty());

        if webhook_url.is_none() {
            tracing::info!("Discord webhook not configured, failure alerts disabled");
        }

        Ok(Self {
            client,
            webhook_url,
            cooldown: chrono::Duration::minutes(cooldown_minutes as i64),
            last_sent: Mutex::new(None),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    /// Allow the next failure to alert immediately
    pub async fn reset_cooldown(&self) {
        *self.last_sent.lock().await = None;
        tracing::info!("Alert cooldown reset");
    }

    /// Time of the last delivered alert
    pub async fn last_sent(&self) -> Option<DateTime<Utc>> {
        *self.last_sent.lock().await
    }

    /// Send in the background; the caller never waits on the webhook
    pub fn spawn_failure_alert(self: &Arc<Self>, verdict: AnalysisVerdict, image: Option<Vec<u8>>) {
        if !self.is_enabled() || !verdict.is_failure() {
            return;
        }

        let service = self.clone();
        tokio::spawn(async move {
            if let Err(e) = service.notify_failure(&verdict, image).await {
                tracing::error!(error = %e, "Failed to send failure alert");
            }
        });
    }

    /// Send an alert for a failed print unless cooling down
    ///
    /// Returns whether a message was delivered.
    pub async fn notify_failure(&self, verdict: &AnalysisVerdict, image: Option<Vec<u8>>) -> Result<bool> {
        let Some(url) = self.webhook_url.as_deref() else {
            return Ok(false);
        };
        if !verdict.is_failure() {
            return Ok(false);
        }

        // Reserve the slot before sending so overlapping failures do not double-alert
        let now = Utc::now();
        let previous = {
            let mut last = self.last_sent.lock().await;
            if !cooldown_elapsed(*last, now, self.cooldown) {
                tracing::debug!(last_sent = ?*last, "Alert suppressed by cooldown");
                return Ok(false);
            }
            last.replace(now)
        };

        match self.send(url, verdict, image).await {
            Ok(()) => {
                tracing::info!(confidence = verdict.confidence, "Failure alert sent");
                Ok(true)
            }
            Err(e) => {
                let mut last = self.last_sent.lock().await;
                if *last == Some(now) {
                    *last = previous;
                }
                Err(e)
            }
        }
    }

    async fn send(&self, url: &str, verdict: &AnalysisVerdict, image: Option<Vec<u8>>) -> Result<()> {
        let payload = json!({ "content": format_message(verdict) });
        let mut form = Form::new().text("payload_json", payload.to_string());

        if let Some(data) = image {
            form = form.part(
                "files[0]",
                Part::bytes(data)
                    .file_name("print_failure.jpg")
                    .mime_str("image/jpeg")?,
            );
        }

        let resp = self.client.post(url).multipart(form).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Internal(format!(
                "Discord webhook returned {}: {}",
                status, body
            )));
        }
        Ok(())
    }
}

fn format_message(verdict: &AnalysisVerdict) -> String {
    let excerpt: String = verdict.free_text.chars().take(MAX_EXCERPT_CHARS).collect();
    format!(
        "🚨 **3D print failure detected**\n\
         Time: {}\n\
         Confidence: {:.0}%\n\n\
         {}",
        verdict.analyzed_at.format("%Y-%m-%d %H:%M:%S UTC"),
        verdict.confidence * 100.0,
        excerpt
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai_client::{verdict_from_text, AnalysisErrorKind};
    use crate::config_store::AiConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn failure_verdict() -> AnalysisVerdict {
        verdict_from_text(
            "❌ PRINT FAILURE: spaghetti on the bed".to_string(),
            &AiConfig::default(),
            1,
            300,
        )
    }

    #[test]
    fn test_cooldown_elapsed() {
        let now = Utc::now();
        let cooldown = chrono::Duration::minutes(5);
        assert!(cooldown_elapsed(None, now, cooldown));
        assert!(!cooldown_elapsed(Some(now - chrono::Duration::minutes(2)), now, cooldown));
        assert!(cooldown_elapsed(Some(now - chrono::Duration::minutes(5)), now, cooldown));
    }

    #[tokio::test]
    async fn test_alert_respects_cooldown() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/webhook"))
            .respond_with(ResponseTemplate::new(204))
            .expect(2)
            .mount(&server)
            .await;

        let alerts = AlertService::new(Some(format!("{}/webhook", server.uri())), 5).unwrap();
        let verdict = failure_verdict();

        assert!(alerts.notify_failure(&verdict, Some(vec![0xFF, 0xD8])).await.unwrap());
        assert!(!alerts.notify_failure(&verdict, None).await.unwrap());

        alerts.reset_cooldown().await;
        assert!(alerts.notify_failure(&verdict, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_analysis_does_not_alert() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let alerts = AlertService::new(Some(server.uri()), 5).unwrap();
        let verdict = AnalysisVerdict::failed(AnalysisErrorKind::Timeout, "timed out", 4, 100);
        assert!(!alerts.notify_failure(&verdict, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_webhook_error_releases_cooldown() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let alerts = AlertService::new(Some(server.uri()), 5).unwrap();
        assert!(alerts.notify_failure(&failure_verdict(), None).await.is_err());
        assert!(alerts.last_sent().await.is_none());
    }

    #[tokio::test]
    async fn test_disabled_without_webhook() {
        let alerts = AlertService::new(None, 5).unwrap();
        assert!(!alerts.is_enabled());
        assert!(!alerts.notify_failure(&failure_verdict(), None).await.unwrap());
    }
}
