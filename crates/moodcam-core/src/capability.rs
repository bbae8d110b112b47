//! Detection capability: the opaque face/expression detector the session drives.

use crate::types::{FaceDetection, Frame};
use async_trait::async_trait;
use thiserror::Error;

/// Input resolution handed to the detector on every tick.
pub const DETECT_INPUT_SIZE: u32 = 224;
/// Minimum face score the detector should report.
pub const DETECT_SCORE_THRESHOLD: f32 = 0.5;

#[derive(Error, Debug)]
pub enum CapabilityError {
    #[error("detection capability is not available")]
    Unavailable,
    #[error("failed to load model assets from {base_url}: {reason}")]
    AssetLoad { base_url: String, reason: String },
    #[error("detection failed: {0}")]
    Detection(String),
}

/// Per-call detector options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectOptions {
    pub input_size: u32,
    pub score_threshold: f32,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            input_size: DETECT_INPUT_SIZE,
            score_threshold: DETECT_SCORE_THRESHOLD,
        }
    }
}

/// Face detection plus expression classification.
///
/// Implementations are injected into the session; tests substitute doubles.
#[async_trait]
pub trait DetectionCapability: Send + Sync {
    /// Whether the capability is reachable right now. Polled until true.
    async fn probe(&self) -> bool;

    /// Load the detector and expression model assets from `base_url`.
    async fn load_assets(&self, base_url: &str) -> Result<(), CapabilityError>;

    /// Detect every face in `frame`, each with its expression mapping.
    async fn detect_faces(
        &self,
        frame: &Frame,
        options: &DetectOptions,
    ) -> Result<Vec<FaceDetection>, CapabilityError>;
}
