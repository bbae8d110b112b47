//! HTTP client for the advice proxy.

use async_trait::async_trait;
use moodcam_core::advice::ADVICE_PATH;
use moodcam_core::{AdviceError, AdviceResponse, AdviceService, SymptomEntry};
use reqwest::Client;
use std::time::Duration;

pub struct HttpAdviceClient {
    client: Client,
    url: String,
}

impl HttpAdviceClient {
    /// `base_url` is the proxy root, e.g. `http://127.0.0.1:3000`.
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: advice_url(base_url),
        })
    }
}

fn advice_url(base_url: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), ADVICE_PATH)
}

#[async_trait]
impl AdviceService for HttpAdviceClient {
    async fn advise(&self, entry: &SymptomEntry) -> Result<String, AdviceError> {
        let response = self
            .client
            .post(&self.url)
            .json(entry)
            .send()
            .await
            .map_err(|e| AdviceError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdviceError::Status {
                status: status.as_u16(),
            });
        }

        let body: AdviceResponse = response
            .json()
            .await
            .map_err(|e| AdviceError::Malformed(e.to_string()))?;
        body.into_advice()
    }
}
