//! Camera media contract: request a stream, read frames, stop tracks.

use crate::types::Frame;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MediaError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("camera not found: {0}")]
    DeviceNotFound(String),
    #[error("camera busy")]
    DeviceBusy,
    #[error("no frame available yet")]
    NoFrame,
    #[error("stream ended")]
    Ended,
    #[error("media error: {0}")]
    Other(String),
}

/// Which way the requested camera should face.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingMode {
    /// Towards the user (front camera).
    User,
    /// Away from the user (rear camera).
    Environment,
}

/// Requested video stream shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoConstraints {
    pub width: u32,
    pub height: u32,
    pub facing_mode: FacingMode,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            width: 720,
            height: 560,
            facing_mode: FacingMode::User,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
}

/// One stoppable track of a stream.
pub trait MediaTrack: Send + Sync {
    fn kind(&self) -> TrackKind;
    fn label(&self) -> &str;
    /// Stop the track and release its device. Must be idempotent.
    fn stop(&self);
    fn is_live(&self) -> bool;
}

/// A live capture stream.
pub trait MediaStream: Send + Sync {
    fn tracks(&self) -> Vec<Arc<dyn MediaTrack>>;

    /// Most recent video frame.
    fn latest_frame(&self) -> Result<Frame, MediaError>;

    /// True once every video track has stopped.
    fn is_ended(&self) -> bool {
        self.tracks()
            .iter()
            .filter(|t| t.kind() == TrackKind::Video)
            .all(|t| !t.is_live())
    }

    fn stop_all(&self) {
        for track in self.tracks() {
            track.stop();
        }
    }
}

/// Source of camera streams.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn get_user_media(
        &self,
        constraints: &VideoConstraints,
    ) -> Result<Arc<dyn MediaStream>, MediaError>;
}
