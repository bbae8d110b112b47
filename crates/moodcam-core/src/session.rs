//! Camera session: capability loading, stream acquisition and teardown.
//!
//! A session is mounted on construction and unmounted by `teardown()` or
//! drop. While mounted it owns at most one capture stream (bound to its
//! video surface) and at most one detection timer.

use crate::capability::{CapabilityError, DetectionCapability};
use crate::detection::{timer_period, DetectionConfig, DetectionLoop};
use crate::emotion::DominantEmotion;
use crate::lock;
use crate::media::{MediaDevices, VideoConstraints};
use crate::overlay::OverlaySurface;
use crate::presentation::Presentation;
use crate::surface::VideoSurface;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

/// Default location the capability loads its model assets from.
pub const DEFAULT_MODEL_URL: &str = "/models";
/// How often capability availability is polled while loading.
pub const CAPABILITY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Terminal session failures. The display strings are what the user sees.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Face detection library not loaded")]
    CapabilityUnavailable,
    #[error("Failed to load face detection models")]
    ModelLoadFailed { reason: String },
    #[error("Failed to access webcam")]
    CameraAccessDenied { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    LoadingCapability,
    CapabilityLoadFailed,
    Streaming,
    StreamFailed,
}

/// Observable session status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub error: Option<SessionError>,
}

impl SessionSnapshot {
    fn idle() -> Self {
        Self {
            state: SessionState::Idle,
            error: None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, SessionState::Idle | SessionState::LoadingCapability)
    }

    pub fn is_terminal(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub model_url: String,
    pub constraints: VideoConstraints,
    pub poll_interval: Duration,
    pub detection: DetectionConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model_url: DEFAULT_MODEL_URL.to_string(),
            constraints: VideoConstraints::default(),
            poll_interval: CAPABILITY_POLL_INTERVAL,
            detection: DetectionConfig::default(),
        }
    }
}

struct Shared {
    capability: Arc<dyn DetectionCapability>,
    media: Arc<dyn MediaDevices>,
    surface: Arc<VideoSurface>,
    detection: DetectionLoop,
    config: SessionConfig,
    /// Held while binding a stream or tearing down, so the two never interleave.
    mounted: Mutex<bool>,
    snapshot: watch::Sender<SessionSnapshot>,
}

impl Shared {
    fn is_mounted(&self) -> bool {
        *lock(&self.mounted)
    }

    /// Publish a new snapshot unless the session has been unmounted.
    fn publish(&self, state: SessionState, error: Option<SessionError>) {
        let mounted = lock(&self.mounted);
        if *mounted {
            self.snapshot.send_replace(SessionSnapshot { state, error });
        }
    }

    async fn initialize(&self) {
        self.publish(SessionState::LoadingCapability, None);

        let mut poll = time::interval(timer_period(self.config.poll_interval));
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            poll.tick().await;
            if !self.is_mounted() {
                return;
            }
            if self.capability.probe().await {
                break;
            }
            tracing::trace!("detection capability not available yet");
        }

        tracing::info!(url = %self.config.model_url, "loading detection models");
        match self.capability.load_assets(&self.config.model_url).await {
            Ok(()) => tracing::info!("detection models loaded"),
            Err(CapabilityError::Unavailable) => {
                tracing::error!("detection capability vanished before model load");
                self.publish(
                    SessionState::CapabilityLoadFailed,
                    Some(SessionError::CapabilityUnavailable),
                );
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to load detection models");
                self.publish(
                    SessionState::CapabilityLoadFailed,
                    Some(SessionError::ModelLoadFailed {
                        reason: e.to_string(),
                    }),
                );
                return;
            }
        }

        if !self.is_mounted() {
            return;
        }
        self.start_video().await;
    }

    async fn start_video(&self) {
        let constraints = self.config.constraints;
        let stream = match self.media.get_user_media(&constraints).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(error = %e, "camera access failed");
                self.publish(
                    SessionState::StreamFailed,
                    Some(SessionError::CameraAccessDenied {
                        reason: e.to_string(),
                    }),
                );
                return;
            }
        };

        let mounted = lock(&self.mounted);
        if !*mounted {
            tracing::debug!("stream arrived after unmount; stopping it");
            stream.stop_all();
            return;
        }
        if let Some(previous) = self.surface.bind(stream) {
            previous.stop_all();
        }
        tracing::info!(
            width = constraints.width,
            height = constraints.height,
            facing = ?constraints.facing_mode,
            "camera stream bound"
        );
        self.snapshot.send_replace(SessionSnapshot {
            state: SessionState::Streaming,
            error: None,
        });

        // Autoplay.
        if self.surface.play() {
            self.detection.start();
        }
    }
}

/// A mounted emotion-detection session.
pub struct CameraSession {
    shared: Arc<Shared>,
    init: Mutex<Option<JoinHandle<()>>>,
}

impl CameraSession {
    /// Mount a session. Nothing happens until [`initialize`](Self::initialize).
    pub fn new(
        capability: Arc<dyn DetectionCapability>,
        media: Arc<dyn MediaDevices>,
        overlay: Box<dyn OverlaySurface>,
        config: SessionConfig,
    ) -> Self {
        let surface = Arc::new(VideoSurface::new(
            config.constraints.width,
            config.constraints.height,
        ));
        let detection = DetectionLoop::new(
            Arc::clone(&capability),
            Arc::clone(&surface),
            overlay,
            config.detection,
        );
        let (snapshot, _) = watch::channel(SessionSnapshot::idle());

        Self {
            shared: Arc::new(Shared {
                capability,
                media,
                surface,
                detection,
                config,
                mounted: Mutex::new(true),
                snapshot,
            }),
            init: Mutex::new(None),
        }
    }

    /// Spawn capability loading followed by camera acquisition.
    ///
    /// Must be called from within a tokio runtime. Calling it again is a no-op.
    pub fn initialize(&self) {
        let mut init = lock(&self.init);
        if init.is_some() || !self.shared.is_mounted() {
            tracing::debug!("session already initialized or unmounted");
            return;
        }
        let shared = Arc::clone(&self.shared);
        *init = Some(tokio::spawn(async move { shared.initialize().await }));
    }

    /// Playback (re)started on the video surface: restart detection.
    pub fn handle_play(&self) -> bool {
        let mounted = lock(&self.shared.mounted);
        if !*mounted || !self.shared.surface.play() {
            return false;
        }
        self.shared.detection.start();
        true
    }

    /// Pause playback; the timer keeps running and its ticks are skipped.
    pub fn pause(&self) {
        self.shared.surface.pause();
    }

    /// Release everything the session holds. Safe to call repeatedly.
    pub fn teardown(&self) {
        let was_mounted = {
            let mut mounted = lock(&self.shared.mounted);
            std::mem::replace(&mut *mounted, false)
        };

        if let Some(handle) = lock(&self.init).take() {
            handle.abort();
        }
        self.shared.detection.stop();
        if let Some(stream) = self.shared.surface.unbind() {
            stream.stop_all();
            tracing::info!("camera stream released");
        }
        if was_mounted {
            tracing::debug!("session torn down");
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.shared.is_mounted()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.snapshot.subscribe()
    }

    pub fn subscribe_emotion(&self) -> watch::Receiver<Option<DominantEmotion>> {
        self.shared.detection.subscribe()
    }

    pub fn presentation(&self) -> Presentation {
        Presentation::new(&self.snapshot(), self.shared.detection.current_emotion().as_ref())
    }

    pub fn surface(&self) -> &Arc<VideoSurface> {
        &self.shared.surface
    }

    pub fn detection(&self) -> &DetectionLoop {
        &self.shared.detection
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::LoopState;
    use crate::media::{FacingMode, MediaError, MediaStream};
    use crate::testing::{FakeCapability, FakeMediaDevices, RecordingOverlay};
    use crate::types::ExpressionScores;

    fn session(cap: Arc<FakeCapability>, media: Arc<FakeMediaDevices>) -> CameraSession {
        CameraSession::new(
            cap,
            media,
            Box::new(RecordingOverlay::new(720, 560)),
            SessionConfig::default(),
        )
    }

    async fn wait_state(session: &CameraSession, state: SessionState) -> SessionSnapshot {
        let mut rx = session.subscribe();
        let snap = rx.wait_for(|s| s.state == state).await.unwrap();
        snap.clone()
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_streams_and_starts_detection() {
        let cap = Arc::new(FakeCapability::available());
        let media = Arc::new(FakeMediaDevices::new());
        let s = session(cap.clone(), media.clone());
        assert!(s.snapshot().is_loading());

        s.initialize();
        let snap = wait_state(&s, SessionState::Streaming).await;
        assert!(snap.error.is_none());
        assert_eq!(cap.loaded_from(), vec!["/models".to_string()]);
        assert_eq!(s.detection().state(), LoopState::Running);

        let requested = media.requests();
        assert_eq!(requested.len(), 1);
        assert_eq!((requested[0].width, requested[0].height), (720, 560));
        assert_eq!(requested[0].facing_mode, FacingMode::User);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_capability_appears() {
        let cap = Arc::new(FakeCapability::unavailable());
        let media = Arc::new(FakeMediaDevices::new());
        let s = session(cap.clone(), media);
        s.initialize();

        time::sleep(Duration::from_millis(550)).await;
        assert_eq!(s.snapshot().state, SessionState::LoadingCapability);
        assert!(cap.probe_calls() >= 5);
        assert!(cap.loaded_from().is_empty());

        cap.set_available(true);
        wait_state(&s, SessionState::Streaming).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_model_load_failure_is_terminal() {
        let cap = Arc::new(FakeCapability::available());
        cap.fail_load(CapabilityError::AssetLoad {
            base_url: "/models".into(),
            reason: "404".into(),
        });
        let media = Arc::new(FakeMediaDevices::new());
        let s = session(cap, media.clone());
        s.initialize();

        let snap = wait_state(&s, SessionState::CapabilityLoadFailed).await;
        assert!(matches!(snap.error, Some(SessionError::ModelLoadFailed { .. })));
        assert_eq!(
            snap.error.unwrap().to_string(),
            "Failed to load face detection models"
        );
        assert!(media.requests().is_empty());

        let p = s.presentation();
        assert!(!p.loading);
        assert_eq!(p.error.as_deref(), Some("Failed to load face detection models"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_capability_vanishing_reports_unavailable() {
        let cap = Arc::new(FakeCapability::available());
        cap.fail_load(CapabilityError::Unavailable);
        let s = session(cap, Arc::new(FakeMediaDevices::new()));
        s.initialize();

        let snap = wait_state(&s, SessionState::CapabilityLoadFailed).await;
        assert_eq!(snap.error, Some(SessionError::CapabilityUnavailable));
    }

    #[tokio::test(start_paused = true)]
    async fn test_camera_failure_is_terminal() {
        let cap = Arc::new(FakeCapability::available());
        let media = Arc::new(FakeMediaDevices::failing(MediaError::PermissionDenied(
            "denied".into(),
        )));
        let s = session(cap, media);
        s.initialize();

        let snap = wait_state(&s, SessionState::StreamFailed).await;
        assert_eq!(snap.error.unwrap().to_string(), "Failed to access webcam");
        assert_eq!(s.detection().state(), LoopState::NotStarted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_stops_tracks_and_timer() {
        let cap = Arc::new(FakeCapability::available());
        let media = Arc::new(FakeMediaDevices::new());
        let s = session(cap.clone(), media.clone());
        s.initialize();
        wait_state(&s, SessionState::Streaming).await;

        let stream = media.issued()[0].clone();
        assert!(stream.tracks().iter().all(|t| t.is_live()));

        s.teardown();
        assert!(stream.tracks().iter().all(|t| !t.is_live()));
        assert_eq!(s.detection().state(), LoopState::Stopped);
        assert!(!s.surface().has_stream());

        let calls = cap.detect_calls();
        time::sleep(Duration::from_millis(500)).await;
        assert_eq!(cap.detect_calls(), calls);

        // Second teardown is harmless.
        s.teardown();
        assert!(!s.is_mounted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_releases_stream() {
        let media = Arc::new(FakeMediaDevices::new());
        {
            let s = session(Arc::new(FakeCapability::available()), media.clone());
            s.initialize();
            wait_state(&s, SessionState::Streaming).await;
        }
        let stream = media.issued()[0].clone();
        assert!(stream.tracks().iter().all(|t| !t.is_live()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_teardown_during_inference_changes_nothing() {
        let cap = Arc::new(FakeCapability::available());
        cap.push_faces(vec![FakeCapability::face(
            [("happy", 0.9f32)].into_iter().collect::<ExpressionScores>(),
        )]);
        let release = cap.hold_next_detect();
        let overlay = RecordingOverlay::new(720, 560);
        let s = CameraSession::new(
            cap.clone(),
            Arc::new(FakeMediaDevices::new()),
            Box::new(overlay.clone()),
            SessionConfig::default(),
        );
        s.initialize();
        while cap.detect_calls() == 0 {
            time::sleep(Duration::from_millis(5)).await;
        }

        s.teardown();
        let clears = overlay.clear_count();
        release.send(()).unwrap();
        time::sleep(Duration::from_millis(300)).await;

        assert_eq!(overlay.clear_count(), clears);
        assert!(s.detection().current_emotion().is_none());
        assert_eq!(s.presentation().emotion, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_poll_interval_still_loads() {
        let s = CameraSession::new(
            Arc::new(FakeCapability::available()),
            Arc::new(FakeMediaDevices::new()),
            Box::new(RecordingOverlay::new(720, 560)),
            SessionConfig {
                poll_interval: Duration::ZERO,
                ..SessionConfig::default()
            },
        );
        s.initialize();
        wait_state(&s, SessionState::Streaming).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_arriving_after_unmount_is_stopped() {
        let cap = Arc::new(FakeCapability::available());
        let media = Arc::new(FakeMediaDevices::new());
        media.set_delay(Duration::from_secs(1));
        let s = session(cap, media.clone());
        s.initialize();

        // Let init reach the camera request, then unmount mid-flight.
        time::sleep(Duration::from_millis(300)).await;
        assert_eq!(media.requests().len(), 1);
        let before = s.snapshot();

        // Abort drops the pending request; whatever it produced must not be bound.
        s.teardown();
        time::sleep(Duration::from_secs(2)).await;
        assert!(!s.surface().has_stream());
        assert_eq!(s.snapshot(), before);
        for stream in media.issued() {
            assert!(stream.tracks().iter().all(|t| !t.is_live()));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_keeps_one_timer() {
        let cap = Arc::new(FakeCapability::available());
        let s = session(cap.clone(), Arc::new(FakeMediaDevices::new()));
        s.initialize();
        wait_state(&s, SessionState::Streaming).await;

        let base = cap.detect_calls();
        s.pause();
        assert!(s.handle_play());
        assert!(s.handle_play());
        time::sleep(Duration::from_millis(250)).await;
        assert_eq!(cap.detect_calls() - base, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_emotion_flows_to_presentation() {
        let cap = Arc::new(FakeCapability::available());
        let happy: ExpressionScores = [("happy", 0.9f32), ("sad", 0.1)].into_iter().collect();
        cap.push_faces(vec![FakeCapability::face(happy)]);
        let s = session(cap, Arc::new(FakeMediaDevices::new()));
        s.initialize();
        wait_state(&s, SessionState::Streaming).await;

        let mut rx = s.subscribe_emotion();
        rx.wait_for(|e| e.is_some()).await.unwrap();

        let p = s.presentation();
        assert!(!p.loading);
        assert!(p.error.is_none());
        assert_eq!(p.emotion.as_deref(), Some("happy"));
    }
}
