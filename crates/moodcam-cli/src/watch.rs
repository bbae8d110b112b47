//! `moodcam watch`: run a camera session and print what it would show.

use crate::capability_client::HttpCapability;
use anyhow::{anyhow, Context, Result};
use moodcam_core::{
    BoundingBox, CameraSession, CanvasOverlay, FacingMode, OverlaySurface, SessionConfig,
    VideoConstraints,
};
use moodcam_hw::V4lMediaDevices;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

pub struct WatchOptions {
    pub capability_url: String,
    pub model_url: String,
    pub camera_device: String,
    pub environment_device: Option<String>,
    pub facing_mode: FacingMode,
    pub width: u32,
    pub height: u32,
    /// Write the final overlay here on exit.
    pub snapshot: Option<PathBuf>,
    /// Stop after this long instead of waiting for ctrl-c.
    pub duration: Option<Duration>,
}

/// Overlay canvas the session draws into while we keep a handle for saving.
#[derive(Clone)]
struct SharedCanvas(Arc<Mutex<CanvasOverlay>>);

impl SharedCanvas {
    fn new(width: u32, height: u32) -> Self {
        Self(Arc::new(Mutex::new(CanvasOverlay::new(width, height))))
    }

    fn with<R>(&self, f: impl FnOnce(&mut CanvasOverlay) -> R) -> R {
        let mut canvas = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut canvas)
    }

    fn save(&self, path: &Path) -> Result<()> {
        self.with(|canvas| canvas.save(path))
            .with_context(|| format!("failed to write overlay to {}", path.display()))
    }
}

impl OverlaySurface for SharedCanvas {
    fn size(&self) -> (u32, u32) {
        self.with(|c| c.size())
    }

    fn clear(&mut self) {
        self.with(|c| c.clear())
    }

    fn draw_box(&mut self, bounding_box: &BoundingBox) {
        self.with(|c| c.draw_box(bounding_box))
    }

    fn draw_label(&mut self, anchor: (f32, f32), text: &str) {
        self.with(|c| c.draw_label(anchor, text))
    }
}

pub async fn run(opts: WatchOptions) -> Result<()> {
    let capability = Arc::new(HttpCapability::new(
        &opts.capability_url,
        Duration::from_secs(10),
    )?);
    let mut media = V4lMediaDevices::new(&opts.camera_device);
    if let Some(device) = &opts.environment_device {
        media = media.with_environment_device(device);
    }

    let config = SessionConfig {
        model_url: opts.model_url.clone(),
        constraints: VideoConstraints {
            width: opts.width,
            height: opts.height,
            facing_mode: opts.facing_mode,
        },
        ..SessionConfig::default()
    };
    let canvas = SharedCanvas::new(opts.width, opts.height);
    let session = CameraSession::new(capability, Arc::new(media), Box::new(canvas.clone()), config);

    tracing::info!(
        device = %opts.camera_device,
        capability = %opts.capability_url,
        "starting session"
    );
    session.initialize();

    let mut snapshots = session.subscribe();
    let mut emotions = session.subscribe_emotion();
    let stop_after = async {
        match opts.duration {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(stop_after);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut last = String::new();
    let outcome = loop {
        let line = session.presentation().to_string();
        if line != last {
            if !line.is_empty() {
                println!("{line}");
            }
            last = line;
        }
        if let Some(error) = session.snapshot().error {
            break Err(anyhow!(error));
        }

        tokio::select! {
            changed = snapshots.changed() => if changed.is_err() { break Ok(()) },
            changed = emotions.changed() => if changed.is_err() { break Ok(()) },
            _ = &mut ctrl_c => break Ok(()),
            _ = &mut stop_after => break Ok(()),
        }
    };

    session.teardown();
    if let Some(path) = &opts.snapshot {
        canvas.save(path)?;
        println!("overlay written to {}", path.display());
    }
    outcome
}
