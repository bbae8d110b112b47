//! Test doubles for the capability, media, overlay and advice seams.

use crate::advice::{AdviceError, AdviceService};
use crate::capability::{CapabilityError, DetectOptions, DetectionCapability};
use crate::journal::SymptomEntry;
use crate::lock;
use crate::media::{
    MediaDevices, MediaError, MediaStream, MediaTrack, TrackKind, VideoConstraints,
};
use crate::overlay::OverlaySurface;
use crate::types::{BoundingBox, ExpressionScores, FaceDetection, Frame};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

enum Scripted {
    Faces(Vec<FaceDetection>),
    Error(String),
    Panic,
}

/// Capability whose detections are scripted per call. An empty script
/// answers with no faces.
pub struct FakeCapability {
    available: AtomicBool,
    load_error: Mutex<Option<CapabilityError>>,
    loaded_from: Mutex<Vec<String>>,
    script: Mutex<VecDeque<Scripted>>,
    probes: AtomicUsize,
    detects: AtomicUsize,
    gate: Mutex<Option<mpsc::Receiver<()>>>,
}

impl FakeCapability {
    pub fn available() -> Self {
        Self {
            available: AtomicBool::new(true),
            load_error: Mutex::new(None),
            loaded_from: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
            probes: AtomicUsize::new(0),
            detects: AtomicUsize::new(0),
            gate: Mutex::new(None),
        }
    }

    pub fn unavailable() -> Self {
        let cap = Self::available();
        cap.set_available(false);
        cap
    }

    /// A 10x10 face at (10, 10).
    pub fn face(expressions: ExpressionScores) -> FaceDetection {
        FaceDetection {
            bounding_box: BoundingBox { x: 10.0, y: 10.0, width: 10.0, height: 10.0, score: 0.9 },
            expressions,
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn fail_load(&self, error: CapabilityError) {
        *lock(&self.load_error) = Some(error);
    }

    pub fn push_faces(&self, faces: Vec<FaceDetection>) {
        lock(&self.script).push_back(Scripted::Faces(faces));
    }

    pub fn push_error(&self, message: &str) {
        lock(&self.script).push_back(Scripted::Error(message.to_string()));
    }

    pub fn push_panic(&self) {
        lock(&self.script).push_back(Scripted::Panic);
    }

    /// Block the next `detect_faces` call on its worker thread until the
    /// returned sender fires. The call is counted before it blocks.
    pub fn hold_next_detect(&self) -> mpsc::Sender<()> {
        let (tx, rx) = mpsc::channel();
        *lock(&self.gate) = Some(rx);
        tx
    }

    pub fn loaded_from(&self) -> Vec<String> {
        lock(&self.loaded_from).clone()
    }

    pub fn probe_calls(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn detect_calls(&self) -> usize {
        self.detects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DetectionCapability for FakeCapability {
    async fn probe(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.available.load(Ordering::SeqCst)
    }

    async fn load_assets(&self, base_url: &str) -> Result<(), CapabilityError> {
        lock(&self.loaded_from).push(base_url.to_string());
        match lock(&self.load_error).take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn detect_faces(
        &self,
        _frame: &Frame,
        options: &DetectOptions,
    ) -> Result<Vec<FaceDetection>, CapabilityError> {
        assert_eq!(*options, DetectOptions::default());
        self.detects.fetch_add(1, Ordering::SeqCst);
        let gate = lock(&self.gate).take();
        if let Some(gate) = gate {
            let _ = gate.recv();
        }
        let next = lock(&self.script).pop_front();
        match next {
            Some(Scripted::Faces(faces)) => Ok(faces),
            Some(Scripted::Error(message)) => Err(CapabilityError::Detection(message)),
            Some(Scripted::Panic) => panic!("scripted capability panic"),
            None => Ok(Vec::new()),
        }
    }
}

pub struct FakeTrack {
    live: AtomicBool,
}

impl MediaTrack for FakeTrack {
    fn kind(&self) -> TrackKind {
        TrackKind::Video
    }

    fn label(&self) -> &str {
        "fake camera"
    }

    fn stop(&self) {
        self.live.store(false, Ordering::SeqCst);
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

/// Stream of mid-grey frames at a fixed size.
pub struct FakeStream {
    width: u32,
    height: u32,
    track: Arc<FakeTrack>,
    sequence: AtomicUsize,
}

impl FakeStream {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            track: Arc::new(FakeTrack {
                live: AtomicBool::new(true),
            }),
            sequence: AtomicUsize::new(0),
        }
    }
}

impl MediaStream for FakeStream {
    fn tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        vec![self.track.clone()]
    }

    fn latest_frame(&self) -> Result<Frame, MediaError> {
        if !self.track.is_live() {
            return Err(MediaError::Ended);
        }
        Ok(Frame {
            data: vec![128; (self.width * self.height * 3) as usize],
            width: self.width,
            height: self.height,
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst) as u32,
            timestamp: std::time::Instant::now(),
        })
    }
}

/// Hands out [`FakeStream`]s, or a fixed error.
pub struct FakeMediaDevices {
    error: Option<MediaError>,
    delay: Mutex<Option<Duration>>,
    requests: Mutex<Vec<VideoConstraints>>,
    issued: Mutex<Vec<Arc<FakeStream>>>,
}

impl FakeMediaDevices {
    pub fn new() -> Self {
        Self {
            error: None,
            delay: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            issued: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: MediaError) -> Self {
        Self {
            error: Some(error),
            ..Self::new()
        }
    }

    /// Delay every request by `delay` before a stream is produced.
    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = Some(delay);
    }

    pub fn requests(&self) -> Vec<VideoConstraints> {
        lock(&self.requests).clone()
    }

    pub fn issued(&self) -> Vec<Arc<FakeStream>> {
        lock(&self.issued).clone()
    }
}

#[async_trait]
impl MediaDevices for FakeMediaDevices {
    async fn get_user_media(
        &self,
        constraints: &VideoConstraints,
    ) -> Result<Arc<dyn MediaStream>, MediaError> {
        lock(&self.requests).push(*constraints);
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(e) = &self.error {
            return Err(e.clone());
        }
        let stream = Arc::new(FakeStream::new(constraints.width / 2, constraints.height / 2));
        lock(&self.issued).push(stream.clone());
        Ok(stream)
    }
}

#[derive(Default)]
struct OverlayRecord {
    clears: usize,
    boxes: Vec<BoundingBox>,
    labels: Vec<String>,
}

/// Overlay that records draw calls since the last clear. Clones share state.
#[derive(Clone)]
pub struct RecordingOverlay {
    size: (u32, u32),
    record: Arc<Mutex<OverlayRecord>>,
}

impl RecordingOverlay {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            record: Arc::new(Mutex::new(OverlayRecord::default())),
        }
    }

    pub fn clear_count(&self) -> usize {
        lock(&self.record).clears
    }

    pub fn boxes(&self) -> Vec<BoundingBox> {
        lock(&self.record).boxes.clone()
    }

    pub fn labels(&self) -> Vec<String> {
        lock(&self.record).labels.clone()
    }
}

impl OverlaySurface for RecordingOverlay {
    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn clear(&mut self) {
        let mut r = lock(&self.record);
        r.clears += 1;
        r.boxes.clear();
        r.labels.clear();
    }

    fn draw_box(&mut self, bounding_box: &BoundingBox) {
        lock(&self.record).boxes.push(*bounding_box);
    }

    fn draw_label(&mut self, _anchor: (f32, f32), text: &str) {
        lock(&self.record).labels.push(text.to_string());
    }
}

enum AdviceMode {
    Fixed(Result<String, AdviceError>),
    /// Each request waits until `resolve` is called for its id.
    Pending,
}

pub struct ScriptedAdvice {
    mode: AdviceMode,
    resolved: Mutex<HashMap<i64, Result<String, AdviceError>>>,
    notify: Notify,
    requests: Mutex<Vec<SymptomEntry>>,
}

impl ScriptedAdvice {
    fn with_mode(mode: AdviceMode) -> Self {
        Self {
            mode,
            resolved: Mutex::new(HashMap::new()),
            notify: Notify::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn ok(advice: &str) -> Self {
        Self::with_mode(AdviceMode::Fixed(Ok(advice.to_string())))
    }

    pub fn failing() -> Self {
        Self::with_mode(AdviceMode::Fixed(Err(AdviceError::Transport(
            "connection refused".into(),
        ))))
    }

    pub fn pending() -> Self {
        Self::with_mode(AdviceMode::Pending)
    }

    pub fn resolve(&self, id: i64, result: Result<String, AdviceError>) {
        lock(&self.resolved).insert(id, result);
        self.notify.notify_waiters();
    }

    pub fn calls(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn requests(&self) -> Vec<SymptomEntry> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl AdviceService for ScriptedAdvice {
    async fn advise(&self, entry: &SymptomEntry) -> Result<String, AdviceError> {
        lock(&self.requests).push(entry.clone());
        match &self.mode {
            AdviceMode::Fixed(result) => result.clone(),
            AdviceMode::Pending => loop {
                let notified = self.notify.notified();
                let ready = lock(&self.resolved).remove(&entry.id);
                if let Some(result) = ready {
                    return result;
                }
                notified.await;
            },
        }
    }
}
