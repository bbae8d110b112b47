//! moodcam-core — emotion-detection session lifecycle and symptom journal.
//!
//! The face/expression detector and the camera are reached through traits
//! ([`DetectionCapability`], [`MediaDevices`]) so hosts can plug in real
//! backends and tests can plug in doubles.

pub mod advice;
pub mod capability;
pub mod detection;
pub mod emotion;
pub mod journal;
pub mod media;
pub mod overlay;
pub mod presentation;
pub mod session;
pub mod storage;
pub mod surface;
pub mod types;

#[cfg(test)]
mod testing;

pub use advice::{AdviceError, AdviceResponse, AdviceService};
pub use capability::{CapabilityError, DetectOptions, DetectionCapability};
pub use detection::{DetectionConfig, DetectionLoop, TickOutcome};
pub use emotion::{dominant_emotion, DominantEmotion};
pub use journal::{Mood, Severity, SymptomEntry, SymptomLog};
pub use media::{FacingMode, MediaDevices, MediaError, MediaStream, MediaTrack, VideoConstraints};
pub use overlay::{CanvasOverlay, OverlaySurface};
pub use presentation::Presentation;
pub use session::{CameraSession, SessionConfig, SessionError, SessionSnapshot, SessionState};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use types::{BoundingBox, ExpressionScores, FaceDetection, Frame};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T: ?Sized>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
