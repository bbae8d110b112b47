//! Detection loop: periodic inference over the live video.
//!
//! One timer task per loop. Each tick reads the displayed frame, asks the
//! capability for faces, redraws the overlay and publishes the dominant
//! emotion of the first face. Tick failures are logged and swallowed so the
//! timer never dies.

use crate::capability::{CapabilityError, DetectOptions, DetectionCapability};
use crate::emotion::{dominant_emotion, DominantEmotion};
use crate::lock;
use crate::media::MediaError;
use crate::overlay::{self, OverlaySurface};
use crate::surface::VideoSurface;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

/// Default tick period.
pub const DETECT_INTERVAL: Duration = Duration::from_millis(100);
/// Shortest period a timer runs at; tokio intervals reject zero.
pub const MIN_TIMER_PERIOD: Duration = Duration::from_millis(1);

/// Clamp a configured timer period to [`MIN_TIMER_PERIOD`].
pub(crate) fn timer_period(requested: Duration) -> Duration {
    if requested < MIN_TIMER_PERIOD {
        tracing::warn!(
            requested_ms = requested.as_millis() as u64,
            "timer period too short; using 1ms"
        );
        return MIN_TIMER_PERIOD;
    }
    requested
}

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("frame read failed: {0}")]
    Frame(#[from] MediaError),
    #[error(transparent)]
    Capability(#[from] CapabilityError),
    #[error("capability panicked during detection")]
    Panicked,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionConfig {
    pub interval: Duration,
    pub options: DetectOptions,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            interval: DETECT_INTERVAL,
            options: DetectOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    NotStarted,
    Running,
    Stopped,
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Video paused or ended.
    Skipped,
    /// No usable face; overlay and emotion left as they were.
    NoFace,
    Detected(DominantEmotion),
    /// Logged and ignored.
    Failed,
}

struct LoopInner {
    capability: Arc<dyn DetectionCapability>,
    surface: Arc<VideoSurface>,
    overlay: Mutex<Box<dyn OverlaySurface>>,
    emotion: watch::Sender<Option<DominantEmotion>>,
    config: DetectionConfig,
    /// Bumped by every start and stop. A tick only publishes while the
    /// generation it started under is still current.
    generation: AtomicU64,
}

impl LoopInner {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    async fn tick(&self, generation: u64) -> TickOutcome {
        if !self.is_current(generation) {
            return TickOutcome::Skipped;
        }
        if self.surface.is_paused() || self.surface.is_ended() {
            return TickOutcome::Skipped;
        }

        match AssertUnwindSafe(self.detect(generation)).catch_unwind().await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "detection tick failed");
                TickOutcome::Failed
            }
            Err(_) => {
                tracing::warn!(error = %DetectionError::Panicked, "detection tick failed");
                TickOutcome::Failed
            }
        }
    }

    async fn detect(&self, generation: u64) -> Result<TickOutcome, DetectionError> {
        let frame = self.surface.current_frame()?;
        let faces = self
            .capability
            .detect_faces(&frame, &self.config.options)
            .await?;

        let Some(first) = faces.first() else {
            tracing::trace!(seq = frame.sequence, "no face in frame");
            return Ok(TickOutcome::NoFace);
        };
        let Some(dominant) = dominant_emotion(&first.expressions) else {
            tracing::debug!(seq = frame.sequence, "first face has no expression scores");
            return Ok(TickOutcome::NoFace);
        };

        // The overlay lock also fences `stop()`: once it returns, no tick of
        // an older generation can still be drawing or publishing.
        let mut canvas = lock(&self.overlay);
        if !self.is_current(generation) {
            tracing::debug!(seq = frame.sequence, "loop stopped during inference; result dropped");
            return Ok(TickOutcome::Skipped);
        }
        overlay::redraw(canvas.as_mut(), &faces, frame.size(), &dominant);
        self.emotion.send_replace(Some(dominant.clone()));
        drop(canvas);

        tracing::debug!(
            seq = frame.sequence,
            faces = faces.len(),
            emotion = %dominant.label,
            probability = dominant.probability,
            "detected"
        );
        Ok(TickOutcome::Detected(dominant))
    }
}

/// Owns the detection timer. At most one timer runs at a time.
pub struct DetectionLoop {
    inner: Arc<LoopInner>,
    timer: Mutex<Option<JoinHandle<()>>>,
    state: Mutex<LoopState>,
}

impl DetectionLoop {
    pub fn new(
        capability: Arc<dyn DetectionCapability>,
        surface: Arc<VideoSurface>,
        overlay: Box<dyn OverlaySurface>,
        config: DetectionConfig,
    ) -> Self {
        let (emotion, _) = watch::channel(None);
        Self {
            inner: Arc::new(LoopInner {
                capability,
                surface,
                overlay: Mutex::new(overlay),
                emotion,
                config,
                generation: AtomicU64::new(0),
            }),
            timer: Mutex::new(None),
            state: Mutex::new(LoopState::NotStarted),
        }
    }

    pub fn state(&self) -> LoopState {
        *lock(&self.state)
    }

    /// Receiver for the last published dominant emotion.
    pub fn subscribe(&self) -> watch::Receiver<Option<DominantEmotion>> {
        self.inner.emotion.subscribe()
    }

    /// Last published dominant emotion, if any.
    pub fn current_emotion(&self) -> Option<DominantEmotion> {
        self.inner.emotion.borrow().clone()
    }

    /// Run `f` against the overlay surface.
    pub fn with_overlay<R>(&self, f: impl FnOnce(&mut dyn OverlaySurface) -> R) -> R {
        let mut overlay = lock(&self.inner.overlay);
        f(overlay.as_mut())
    }

    /// Start ticking, cancelling any timer already running.
    ///
    /// Ticks run one at a time inside the timer task; a tick that overruns
    /// the period delays the next instead of overlapping it.
    pub fn start(&self) {
        let mut timer = lock(&self.timer);
        if let Some(prev) = timer.take() {
            prev.abort();
            tracing::debug!("cancelled previous detection timer");
        }

        let inner = Arc::clone(&self.inner);
        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let period = timer_period(inner.config.interval);
        *timer = Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                inner.tick(generation).await;
            }
        }));
        *lock(&self.state) = LoopState::Running;
        tracing::info!(interval_ms = period.as_millis() as u64, "detection loop started");
    }

    /// Cancel the timer. Safe to call any number of times.
    ///
    /// When this returns no tick already in flight will touch the overlay or
    /// the published emotion, even one whose inference is still running on
    /// another worker.
    pub fn stop(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = lock(&self.timer).take() {
            handle.abort();
            tracing::info!("detection loop stopped");
        }
        drop(lock(&self.inner.overlay));
        let mut state = lock(&self.state);
        if *state == LoopState::Running {
            *state = LoopState::Stopped;
        }
    }

    /// Run one tick inline, outside the timer. A `stop()` issued while it
    /// runs discards its result.
    pub async fn tick(&self) -> TickOutcome {
        let generation = self.inner.generation.load(Ordering::SeqCst);
        self.inner.tick(generation).await
    }
}

impl Drop for DetectionLoop {
    fn drop(&mut self) {
        self.stop();
    }
}
