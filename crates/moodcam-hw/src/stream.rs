//! [`MediaDevices`] backed by V4L2 capture threads.
//!
//! Each stream owns one capture thread that pushes the newest frame into a
//! watch channel. Stopping the track clears its live flag and the thread
//! exits after the next dequeue, closing the device.

use crate::camera::Camera;
use async_trait::async_trait;
use moodcam_core::media::TrackKind;
use moodcam_core::{
    FacingMode, Frame, MediaDevices, MediaError, MediaStream, MediaTrack, VideoConstraints,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};

/// Camera devices selected by facing mode.
#[derive(Debug, Clone)]
pub struct V4lMediaDevices {
    pub user_device: String,
    /// Rear camera; requests for it fall back to `user_device` when unset.
    pub environment_device: Option<String>,
}

impl V4lMediaDevices {
    pub fn new(user_device: impl Into<String>) -> Self {
        Self {
            user_device: user_device.into(),
            environment_device: None,
        }
    }

    pub fn with_environment_device(mut self, device: impl Into<String>) -> Self {
        self.environment_device = Some(device.into());
        self
    }

    fn device_for(&self, facing_mode: FacingMode) -> &str {
        match (facing_mode, &self.environment_device) {
            (FacingMode::Environment, Some(device)) => device,
            _ => &self.user_device,
        }
    }
}

#[async_trait]
impl MediaDevices for V4lMediaDevices {
    async fn get_user_media(
        &self,
        constraints: &VideoConstraints,
    ) -> Result<Arc<dyn MediaStream>, MediaError> {
        let device = self.device_for(constraints.facing_mode).to_string();
        let (width, height) = (constraints.width, constraints.height);
        let (ready_tx, ready_rx) = oneshot::channel::<Result<String, MediaError>>();
        let (frame_tx, frame_rx) = watch::channel::<Option<Frame>>(None);
        let track = Arc::new(V4lTrack::new(device.clone()));
        let thread_track = track.clone();

        std::thread::Builder::new()
            .name("moodcam-capture".into())
            .spawn(move || {
                let camera = match Camera::open(&device, width, height) {
                    Ok(camera) => camera,
                    Err(e) => {
                        thread_track.stop();
                        let _ = ready_tx.send(Err(e.into()));
                        return;
                    }
                };
                if ready_tx.send(Ok(camera.device_path.clone())).is_err() {
                    // Requester went away before the device opened.
                    thread_track.stop();
                    return;
                }

                let result = camera.run_capture(&thread_track.live, |frame| {
                    frame_tx.send_replace(Some(frame));
                });
                match result {
                    Ok(frames) => tracing::info!(device = %device, frames, "capture stopped"),
                    Err(e) => tracing::error!(device = %device, error = %e, "capture failed"),
                }
                thread_track.stop();
            })
            .map_err(|e| MediaError::Other(format!("failed to spawn capture thread: {e}")))?;

        let path = ready_rx
            .await
            .map_err(|_| MediaError::Other("capture thread exited before opening".into()))??;
        tracing::debug!(device = %path, "camera stream ready");

        Ok(Arc::new(V4lStream::new(track, frame_rx)))
    }
}

/// The single video track of a [`V4lStream`].
pub struct V4lTrack {
    label: String,
    live: AtomicBool,
}

impl V4lTrack {
    fn new(label: String) -> Self {
        Self {
            label,
            live: AtomicBool::new(true),
        }
    }
}

impl MediaTrack for V4lTrack {
    fn kind(&self) -> TrackKind {
        TrackKind::Video
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn stop(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            tracing::debug!(device = %self.label, "track stopped");
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

pub struct V4lStream {
    track: Arc<V4lTrack>,
    frames: watch::Receiver<Option<Frame>>,
}

impl V4lStream {
    fn new(track: Arc<V4lTrack>, frames: watch::Receiver<Option<Frame>>) -> Self {
        Self { track, frames }
    }
}

impl MediaStream for V4lStream {
    fn tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        vec![self.track.clone()]
    }

    fn latest_frame(&self) -> Result<Frame, MediaError> {
        if !self.track.is_live() {
            return Err(MediaError::Ended);
        }
        self.frames.borrow().clone().ok_or(MediaError::NoFrame)
    }
}
