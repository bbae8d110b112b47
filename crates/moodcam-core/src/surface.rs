//! Video display surface: the bound stream plus its playback state.

use crate::lock;
use crate::media::{MediaError, MediaStream};
use crate::types::Frame;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Where the live video is shown. Owns at most one bound stream.
pub struct VideoSurface {
    width: u32,
    height: u32,
    stream: Mutex<Option<Arc<dyn MediaStream>>>,
    paused: AtomicBool,
}

impl VideoSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            stream: Mutex::new(None),
            paused: AtomicBool::new(true),
        }
    }

    /// Display size in pixels.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Bind `stream` as the video source, returning any stream it replaced.
    /// The surface starts out paused.
    pub fn bind(&self, stream: Arc<dyn MediaStream>) -> Option<Arc<dyn MediaStream>> {
        self.paused.store(true, Ordering::SeqCst);
        lock(&self.stream).replace(stream)
    }

    /// Detach the bound stream without stopping it.
    pub fn unbind(&self) -> Option<Arc<dyn MediaStream>> {
        self.paused.store(true, Ordering::SeqCst);
        lock(&self.stream).take()
    }

    pub fn has_stream(&self) -> bool {
        lock(&self.stream).is_some()
    }

    /// Start playback. Returns false if nothing is bound or the stream has ended.
    pub fn play(&self) -> bool {
        if self.is_ended() {
            return false;
        }
        self.paused.store(false, Ordering::SeqCst);
        true
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Ended when no stream is bound or its video tracks have all stopped.
    pub fn is_ended(&self) -> bool {
        match lock(&self.stream).as_ref() {
            Some(stream) => stream.is_ended(),
            None => true,
        }
    }

    /// Frame currently on display.
    pub fn current_frame(&self) -> Result<Frame, MediaError> {
        let stream = lock(&self.stream).clone().ok_or(MediaError::Ended)?;
        stream.latest_frame()
    }
}
