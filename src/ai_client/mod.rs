//! AIClient - Image Analysis Service Adapter
//!
//! ## Responsibilities
//!
//! - Build the analysis request from configuration (prompt, sampling)
//! - Timeout and retry policy
//! - Turn free-form answer text into an `AnalysisVerdict`
//!
//! `analyze` never returns an error: exhausted retries produce a failed,
//! fail-closed verdict that the cycle records like any other.

mod classifier;
mod types;

pub use classifier::*;
pub use types::*;

use crate::config_store::AiConfig;
use crate::error::Result;
use async_trait::async_trait;
use base64::Engine;
use reqwest::StatusCode;
use std::time::{Duration, Instant};

/// Default generateContent endpoint
pub const DEFAULT_API_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent";

/// Image analysis seam used by the monitoring cycle
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Analyze one JPEG frame
    async fn analyze(&self, image: &[u8], config: &AiConfig) -> AnalysisVerdict;
}

/// Classify answer text into a successful verdict
pub fn verdict_from_text(text: String, config: &AiConfig, attempts: u32, duration_ms: u64) -> AnalysisVerdict {
    let classification = classify(&text, &config.keyword_settings);
    let confidence = extract_confidence(&text).unwrap_or(DEFAULT_CONFIDENCE);
    AnalysisVerdict::from_classification(text, classification, confidence, attempts, duration_ms)
}

/// One failed attempt
#[derive(Debug)]
struct AttemptError {
    kind: AnalysisErrorKind,
    message: String,
    /// Request refused as sent (4xx other than 429); retrying cannot help
    rejected: bool,
}

impl AttemptError {
    fn new(kind: AnalysisErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            rejected: false,
        }
    }

    fn rejected(message: impl Into<String>) -> Self {
        Self {
            kind: AnalysisErrorKind::ServiceError,
            message: message.into(),
            rejected: true,
        }
    }

    fn retryable(&self) -> bool {
        !self.rejected && self.kind.is_transient()
    }
}

/// Gemini generateContent client
pub struct GeminiClient {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
}

impl GeminiClient {
    /// Create new client; a missing key yields failed verdicts, not a startup error
    pub fn new(api_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        let api_key = api_key.filter(|k| !k.trim().is_empty());

        if api_key.is_none() {
            tracing::warn!("GEMINI_API_KEY not set, analyses will fail");
        }

        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key,
        })
    }

    fn build_request(image: &[u8], config: &AiConfig) -> GenerateRequest {
        let g = &config.gemini_settings;
        GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part {
                        text: Some(g.prompt.clone()),
                        inline_data: None,
                    },
                    Part {
                        text: None,
                        inline_data: Some(InlineData {
                            mime_type: "image/jpeg".to_string(),
                            data: base64::engine::general_purpose::STANDARD.encode(image),
                        }),
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: g.temperature,
                max_output_tokens: g.max_output_tokens,
                top_p: g.top_p,
                top_k: g.top_k,
            },
        }
    }

    async fn attempt(
        &self,
        key: &str,
        body: &GenerateRequest,
        timeout: Duration,
    ) -> std::result::Result<String, AttemptError> {
        let resp = self
            .client
            .post(&self.api_url)
            .query(&[("key", key)])
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AttemptError::new(
                        AnalysisErrorKind::Timeout,
                        format!("No answer within {}s", timeout.as_secs()),
                    )
                } else {
                    AttemptError::new(AnalysisErrorKind::Network, e.to_string())
                }
            })?;

        let status = resp.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            let body = resp.text().await.unwrap_or_default();
            return Err(AttemptError::new(
                AnalysisErrorKind::ServiceError,
                format!("Service returned {}: {}", status, truncate(&body, 200)),
            ));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AttemptError::rejected(
                format!("Service rejected request {}: {}", status, truncate(&body, 200)),
            ));
        }

        let parsed: GenerateResponse = resp.json().await.map_err(|e| {
            if e.is_timeout() {
                AttemptError::new(AnalysisErrorKind::Timeout, e.to_string())
            } else {
                AttemptError::new(AnalysisErrorKind::InvalidResponse, e.to_string())
            }
        })?;

        parsed.text().ok_or_else(|| {
            AttemptError::new(AnalysisErrorKind::InvalidResponse, "Empty answer from service")
        })
    }
}

#[async_trait]
impl Analyzer for GeminiClient {
    async fn analyze(&self, image: &[u8], config: &AiConfig) -> AnalysisVerdict {
        let started = Instant::now();

        let Some(key) = self.api_key.as_deref() else {
            return AnalysisVerdict::failed(
                AnalysisErrorKind::ConfigInvalid,
                "Analysis service API key is not configured",
                0,
                0,
            );
        };

        let settings = &config.analysis_settings;
        let timeout = Duration::from_secs(settings.timeout_seconds);
        let backoff = Duration::from_millis(settings.retry_backoff_ms);
        let max_attempts = settings.retry_attempts.saturating_add(1);
        let body = Self::build_request(image, config);

        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.attempt(key, &body, timeout).await {
                Ok(text) => {
                    let duration_ms = started.elapsed().as_millis() as u64;
                    let verdict = verdict_from_text(text, config, attempts, duration_ms);
                    tracing::info!(
                        binary_status = verdict.binary_status,
                        confidence = verdict.confidence,
                        attempts = attempts,
                        duration_ms = duration_ms,
                        "Analysis completed"
                    );
                    return verdict;
                }
                Err(e) if e.retryable() && attempts < max_attempts => {
                    tracing::warn!(
                        attempt = attempts,
                        max_attempts = max_attempts,
                        kind = ?e.kind,
                        error = %e.message,
                        "Analysis attempt failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    let duration_ms = started.elapsed().as_millis() as u64;
                    tracing::error!(
                        attempts = attempts,
                        kind = ?e.kind,
                        error = %e.message,
                        "Analysis failed"
                    );
                    return AnalysisVerdict::failed(e.kind, e.message, attempts, duration_ms);
                }
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_config(retry_attempts: u32) -> AiConfig {
        let mut config = AiConfig::default();
        config.analysis_settings.retry_attempts = retry_attempts;
        config.analysis_settings.retry_backoff_ms = 10;
        config.analysis_settings.timeout_seconds = 5;
        config
    }

    fn answer(text: &str) -> serde_json::Value {
        json!({ "candidates": [ { "content": { "parts": [ { "text": text } ] } } ] })
    }

    #[test]
    fn test_retry_classification() {
        assert!(AttemptError::new(AnalysisErrorKind::Timeout, "t").retryable());
        assert!(AttemptError::new(AnalysisErrorKind::Network, "n").retryable());
        assert!(AttemptError::new(AnalysisErrorKind::ServiceError, "503").retryable());
        assert!(!AttemptError::rejected("400").retryable());
        assert!(!AttemptError::new(AnalysisErrorKind::InvalidResponse, "x").retryable());
    }

    #[tokio::test]
    async fn test_retries_after_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/generate"))
            .and(query_param("key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(answer(
                "❌ PRINT FAILURE: part detached. Confidence: 0.9",
            )))
            .mount(&server)
            .await;

        let client = GeminiClient::new(format!("{}/generate", server.uri()), Some("test-key".to_string())).unwrap();
        let verdict = client.analyze(b"jpeg", &fast_config(3)).await;

        assert!(verdict.succeeded);
        assert_eq!(verdict.attempts, 2);
        assert_eq!(verdict.binary_status, 0);
        assert_eq!(verdict.confidence, 0.9);
        assert_eq!(verdict.print_status, Some(crate::status_aggregator::PrintStatus::Failed));
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_closed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("✅ PRINT LOOKS GOOD"))
            .expect(3)
            .mount(&server)
            .await;

        let client = GeminiClient::new(server.uri(), Some("test-key".to_string())).unwrap();
        let verdict = client.analyze(b"jpeg", &fast_config(2)).await;

        assert!(!verdict.succeeded);
        assert_eq!(verdict.binary_status, 0);
        assert_eq!(verdict.confidence, 0.0);
        assert_eq!(verdict.attempts, 3);
        assert_eq!(verdict.error_kind, Some(AnalysisErrorKind::ServiceError));
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let client = GeminiClient::new(server.uri(), Some("test-key".to_string())).unwrap();
        let verdict = client.analyze(b"jpeg", &fast_config(3)).await;

        assert!(!verdict.succeeded);
        assert_eq!(verdict.attempts, 1);
    }

    #[tokio::test]
    async fn test_empty_answer_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .mount(&server)
            .await;

        let client = GeminiClient::new(server.uri(), Some("test-key".to_string())).unwrap();
        let verdict = client.analyze(b"jpeg", &fast_config(3)).await;

        assert_eq!(verdict.error_kind, Some(AnalysisErrorKind::InvalidResponse));
        assert_eq!(verdict.binary_status, 0);
    }

    #[tokio::test]
    async fn test_missing_key_is_config_invalid() {
        let client = GeminiClient::new(DEFAULT_API_URL, None).unwrap();
        let verdict = client.analyze(b"jpeg", &AiConfig::default()).await;
        assert_eq!(verdict.error_kind, Some(AnalysisErrorKind::ConfigInvalid));
        assert_eq!(verdict.binary_status, 0);
    }

    #[test]
    fn test_request_carries_prompt_and_image() {
        let config = AiConfig::default();
        let req = GeminiClient::build_request(&[0xFF, 0xD8], &config);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], config.gemini_settings.prompt);
        assert_eq!(json["contents"][0]["parts"][1]["inline_data"]["data"], "/9g=");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 1024);
    }

    #[test]
    fn test_default_confidence() {
        let v = verdict_from_text("Layers look even".to_string(), &AiConfig::default(), 1, 10);
        assert_eq!(v.confidence, DEFAULT_CONFIDENCE);
        assert_eq!(v.binary_status, 1);
    }
}
