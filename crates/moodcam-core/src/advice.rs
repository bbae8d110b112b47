//! Advice proxy contract, shared by the proxy server and its clients.

use crate::journal::SymptomEntry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Route the proxy serves.
pub const ADVICE_PATH: &str = "/api/gemini_advice";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdviceError {
    #[error("advice request failed: {0}")]
    Transport(String),
    #[error("advice service returned HTTP {status}")]
    Status { status: u16 },
    #[error("malformed advice response: {0}")]
    Malformed(String),
    #[error("advice service reported failure: {}", .0.as_deref().unwrap_or("no reason given"))]
    Unsuccessful(Option<String>),
}

/// Response body of the advice route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdviceResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AdviceResponse {
    pub fn ok(advice: impl Into<String>) -> Self {
        Self {
            success: true,
            advice: Some(advice.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            advice: None,
            error: Some(error.into()),
        }
    }

    /// Advice text, if the response is a success carrying non-empty advice.
    pub fn into_advice(self) -> Result<String, AdviceError> {
        match (self.success, self.advice) {
            (true, Some(advice)) if !advice.trim().is_empty() => Ok(advice),
            (true, _) => Err(AdviceError::Malformed("success without advice".into())),
            (false, _) => Err(AdviceError::Unsuccessful(self.error)),
        }
    }
}

/// Something that turns a journal entry into advice text.
#[async_trait]
pub trait AdviceService: Send + Sync {
    async fn advise(&self, entry: &SymptomEntry) -> Result<String, AdviceError>;
}

/// Advice disabled: every request fails.
pub struct NoAdvice;

#[async_trait]
impl AdviceService for NoAdvice {
    async fn advise(&self, _entry: &SymptomEntry) -> Result<String, AdviceError> {
        Err(AdviceError::Unsuccessful(Some("advice disabled".into())))
    }
}
