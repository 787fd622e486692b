//! Analysis verdict and Gemini wire types

use crate::error::Error;
use crate::status_aggregator::PrintStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why an analysis did not produce a usable answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisErrorKind {
    Timeout,
    ServiceError,
    Network,
    InvalidResponse,
    ConfigInvalid,
}

impl AnalysisErrorKind {
    /// Worth another attempt
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AnalysisErrorKind::Timeout | AnalysisErrorKind::ServiceError | AnalysisErrorKind::Network
        )
    }
}

/// Structured judgment derived from one analysis call
///
/// Immutable once built. A failed verdict is always `binary_status == 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisVerdict {
    /// 1 = looks good, 0 = bad or unknown
    pub binary_status: u8,
    pub confidence: f32,
    pub free_text: String,
    pub succeeded: bool,
    pub error_kind: Option<AnalysisErrorKind>,
    /// Classified print status; `None` keeps the previous one
    pub print_status: Option<PrintStatus>,
    pub print_progress: u8,
    pub analyzed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub attempts: u32,
}

impl AnalysisVerdict {
    /// Fail-closed verdict after retries are exhausted
    pub fn failed(kind: AnalysisErrorKind, message: impl Into<String>, attempts: u32, duration_ms: u64) -> Self {
        Self {
            binary_status: 0,
            confidence: 0.0,
            free_text: message.into(),
            succeeded: false,
            error_kind: Some(kind),
            print_status: None,
            print_progress: 0,
            analyzed_at: Utc::now(),
            duration_ms,
            attempts,
        }
    }

    /// Verdict from classified service text
    pub fn from_classification(
        text: String,
        classification: super::Classification,
        confidence: f32,
        attempts: u32,
        duration_ms: u64,
    ) -> Self {
        Self {
            binary_status: classification.binary_status,
            confidence: confidence.clamp(0.0, 1.0),
            free_text: text,
            succeeded: true,
            error_kind: None,
            print_status: classification.print_status,
            print_progress: classification.print_progress,
            analyzed_at: Utc::now(),
            duration_ms,
            attempts,
        }
    }

    /// Verdict says the print went wrong
    pub fn is_failure(&self) -> bool {
        self.succeeded && self.binary_status == 0
    }

    /// Error equivalent of a failed verdict
    pub fn to_error(&self) -> Option<Error> {
        let message = self.free_text.clone();
        self.error_kind.map(|kind| match kind {
            AnalysisErrorKind::Timeout => Error::AnalysisTimeout(message),
            AnalysisErrorKind::ConfigInvalid => Error::ConfigInvalid(message),
            AnalysisErrorKind::ServiceError
            | AnalysisErrorKind::Network
            | AnalysisErrorKind::InvalidResponse => Error::AnalysisService(message),
        })
    }
}

// ========================================
// generateContent request/response
// ========================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub(crate) struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub(crate) struct Part {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub top_p: f32,
    pub top_k: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Candidate {
    #[serde(default)]
    pub content: Content,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate
    pub fn text(&self) -> Option<String> {
        let text: String = self
            .candidates
            .first()?
            .content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_verdict_is_fail_closed() {
        let v = AnalysisVerdict::failed(AnalysisErrorKind::Timeout, "timed out", 4, 100_000);
        assert_eq!(v.binary_status, 0);
        assert_eq!(v.confidence, 0.0);
        assert!(!v.succeeded);
        assert!(!v.is_failure());
        assert_eq!(v.error_kind, Some(AnalysisErrorKind::Timeout));
        assert!(matches!(v.to_error(), Some(Error::AnalysisTimeout(_))));
    }

    #[test]
    fn test_response_text() {
        let json = r#"{"candidates":[{"content":{"parts":[{"text":"✅ PRINT LOOKS GOOD"},{"text":": layers even"}]}}]}"#;
        let resp: GenerateResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.text().as_deref(), Some("✅ PRINT LOOKS GOOD: layers even"));

        let empty: GenerateResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(empty.text().is_none());
    }

    #[test]
    fn test_request_field_names() {
        let req = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: Some("prompt".to_string()),
                    inline_data: None,
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.3,
                max_output_tokens: 1024,
                top_p: 0.8,
                top_k: 40,
            },
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 1024);
        assert_eq!(json["generationConfig"]["topK"], 40);
        assert!(json["contents"][0]["parts"][0].get("inline_data").is_none());
    }
}
