//! Detection capability served over HTTP by a local inference server.
//!
//! `GET /health` answers 2xx once the server is up, `POST /load` takes
//! `{"model_url": ...}`, and `POST /detect` takes a JPEG frame and returns a
//! JSON array of faces (`box` plus `expressions`).

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use moodcam_core::{CapabilityError, DetectOptions, DetectionCapability, FaceDetection, Frame};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

const JPEG_QUALITY: u8 = 85;

#[derive(Serialize)]
struct LoadRequest<'a> {
    model_url: &'a str,
}

pub struct HttpCapability {
    client: Client,
    base_url: String,
}

impl HttpCapability {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Encode an RGB frame as JPEG.
pub fn encode_jpeg(frame: &Frame) -> Result<Vec<u8>, CapabilityError> {
    let image = RgbImage::from_raw(frame.width, frame.height, frame.data.clone()).ok_or_else(
        || {
            CapabilityError::Detection(format!(
                "frame buffer does not match {}x{}",
                frame.width, frame.height
            ))
        },
    )?;
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
        .encode_image(&image)
        .map_err(|e| CapabilityError::Detection(format!("jpeg encoding failed: {e}")))?;
    Ok(jpeg)
}

#[async_trait]
impl DetectionCapability for HttpCapability {
    async fn probe(&self) -> bool {
        match self.client.get(self.url("/health")).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::trace!(error = %e, "capability probe failed");
                false
            }
        }
    }

    async fn load_assets(&self, base_url: &str) -> Result<(), CapabilityError> {
        let asset_error = |reason: String| CapabilityError::AssetLoad {
            base_url: base_url.to_string(),
            reason,
        };

        let response = self
            .client
            .post(self.url("/load"))
            .json(&LoadRequest { model_url: base_url })
            .send()
            .await
            .map_err(|e| asset_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(asset_error(format!("HTTP {}: {}", status.as_u16(), body.trim())));
        }
        tracing::info!(model_url = base_url, "capability models loaded");
        Ok(())
    }

    async fn detect_faces(
        &self,
        frame: &Frame,
        options: &DetectOptions,
    ) -> Result<Vec<FaceDetection>, CapabilityError> {
        let jpeg = encode_jpeg(frame)?;
        let response = self
            .client
            .post(self.url("/detect"))
            .query(&[
                ("input_size", options.input_size.to_string()),
                ("score_threshold", options.score_threshold.to_string()),
            ])
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(jpeg)
            .send()
            .await
            .map_err(|e| CapabilityError::Detection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CapabilityError::Detection(format!(
                "detect returned HTTP {}",
                status.as_u16()
            )));
        }
        response
            .json::<Vec<FaceDetection>>()
            .await
            .map_err(|e| CapabilityError::Detection(format!("malformed detections: {e}")))
    }
}
