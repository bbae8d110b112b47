//! Gemini `generateContent` client that writes advice for journal entries.

use crate::config::Config;
use async_trait::async_trait;
use moodcam_core::SymptomEntry;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeminiError {
    #[error("GEMINI_API_KEY is not configured")]
    MissingApiKey,
    #[error("Gemini API request failed: {0}")]
    Request(String),
    #[error("Gemini API returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("failed to parse Gemini response: {0}")]
    Parse(String),
    #[error("Gemini API returned no text in the response candidates")]
    EmptyResponse,
}

/// Produces advice text for one entry.
#[async_trait]
pub trait AdviceGenerator: Send + Sync {
    async fn generate(&self, entry: &SymptomEntry) -> Result<String, GeminiError>;
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
    language: String,
}

impl GeminiClient {
    pub fn new(config: &Config) -> Result<Self, GeminiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| GeminiError::Request(e.to_string()))?;
        Ok(Self {
            client,
            api_key: config.gemini_api_key.clone(),
            model: config.gemini_model.clone(),
            base_url: config.gemini_base_url.trim_end_matches('/').to_string(),
            language: config.advice_language.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl AdviceGenerator for GeminiClient {
    async fn generate(&self, entry: &SymptomEntry) -> Result<String, GeminiError> {
        let api_key = self.api_key.as_deref().ok_or(GeminiError::MissingApiKey)?;
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: build_prompt(entry, &self.language),
                }],
            }],
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GeminiError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read Gemini error body".to_string());
            return Err(map_http_error(status, &body_text));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| GeminiError::Parse(e.to_string()))?;
        extract_text(parsed)
    }
}

/// Prompt asking for short supportive advice about one entry.
pub fn build_prompt(entry: &SymptomEntry, language: &str) -> String {
    format!(
        "You are a caring wellness assistant. A user recorded this symptom/mood entry:\n\
         - Time: {time}\n\
         - Emotion: {emotion}\n\
         - Severity: {severity}\n\
         - Note: {note}\n\n\
         Reply in {language} with short, warm and practical advice (3 to 5 sentences). \
         Do not diagnose. If the symptoms sound serious, suggest seeing a doctor.",
        time = entry.time.to_rfc3339(),
        emotion = entry.emotion,
        severity = entry.severity,
        note = entry.note.trim(),
    )
}

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ContentResponse>,
}

#[derive(Deserialize)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Deserialize)]
struct PartResponse {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

fn extract_text(response: GenerateContentResponse) -> Result<String, GeminiError> {
    response
        .candidates
        .and_then(|candidates| candidates.into_iter().next())
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or(GeminiError::EmptyResponse)
}

fn map_http_error(status: StatusCode, body: &str) -> GeminiError {
    let message = serde_json::from_str::<ErrorWrapper>(body)
        .map(|wrapper| {
            let msg = wrapper.error.message.unwrap_or_else(|| body.to_string());
            match wrapper.error.status {
                Some(s) if !s.is_empty() => format!("{s}: {msg}"),
                _ => msg,
            }
        })
        .unwrap_or_else(|_| body.to_string());
    GeminiError::Status {
        status: status.as_u16(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use moodcam_core::{Mood, Severity};

    fn entry() -> SymptomEntry {
        SymptomEntry {
            id: 1,
            note: "  headache after lunch ".into(),
            emotion: Mood::Sad,
            severity: Severity::Moderate,
            time: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
            advice: None,
        }
    }

    #[test]
    fn test_build_prompt_includes_fields() {
        let prompt = build_prompt(&entry(), "Vietnamese");
        assert!(prompt.contains("Time: 2024-05-01T12:30:00+00:00"));
        assert!(prompt.contains("Emotion: sad"));
        assert!(prompt.contains("Severity: moderate"));
        assert!(prompt.contains("Note: headache after lunch\n"));
        assert!(prompt.contains("Reply in Vietnamese"));
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let parsed: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"Rest "},{"text":"and hydrate."}]}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(parsed).unwrap(), "Rest and hydrate.");
    }

    #[test]
    fn test_extract_text_empty() {
        let parsed: GenerateContentResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert!(matches!(extract_text(parsed), Err(GeminiError::EmptyResponse)));

        let parsed: GenerateContentResponse =
            serde_json::from_str(r#"{"candidates":[{"content":{"parts":[{"text":"  "}]}}]}"#)
                .unwrap();
        assert!(matches!(extract_text(parsed), Err(GeminiError::EmptyResponse)));
    }

    #[test]
    fn test_map_http_error() {
        let body = r#"{"error":{"code":403,"message":"API key not valid","status":"PERMISSION_DENIED"}}"#;
        match map_http_error(StatusCode::FORBIDDEN, body) {
            GeminiError::Status { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "PERMISSION_DENIED: API key not valid");
            }
            other => panic!("unexpected {other:?}"),
        }

        match map_http_error(StatusCode::BAD_GATEWAY, "upstream down") {
            GeminiError::Status { message, .. } => assert_eq!(message, "upstream down"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let config = Config::from_sources(Default::default(), |_| None);
        let client = GeminiClient::new(&config).unwrap();
        assert!(matches!(
            client.generate(&entry()).await,
            Err(GeminiError::MissingApiKey)
        ));
    }

    #[test]
    fn test_endpoint() {
        let mut config = Config::from_sources(Default::default(), |_| None);
        config.gemini_base_url = "http://localhost:9999/v1beta/".into();
        let client = GeminiClient::new(&config).unwrap();
        assert_eq!(
            client.endpoint(),
            "http://localhost:9999/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }
}
