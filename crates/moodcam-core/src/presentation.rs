//! What the user sees over the video: a loading indicator or an error, plus
//! the last dominant emotion.

use crate::emotion::DominantEmotion;
use crate::session::SessionSnapshot;
use std::fmt;

pub const LOADING_MESSAGE: &str = "Loading face detection models...";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layer {
    Loading { message: String },
    Error { message: String },
    EmotionBadge { label: String },
}

/// Visible state. `loading` and `error` are never both set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presentation {
    pub loading: bool,
    pub error: Option<String>,
    pub emotion: Option<String>,
}

impl Presentation {
    pub fn new(snapshot: &SessionSnapshot, emotion: Option<&DominantEmotion>) -> Self {
        let error = snapshot.error.as_ref().map(|e| e.to_string());
        Self {
            loading: error.is_none() && snapshot.is_loading(),
            error,
            emotion: emotion.map(|e| e.label.clone()),
        }
    }

    /// Layers bottom to top.
    pub fn layers(&self) -> Vec<Layer> {
        let mut layers = Vec::with_capacity(2);
        if self.loading {
            layers.push(Layer::Loading {
                message: LOADING_MESSAGE.to_string(),
            });
        } else if let Some(message) = &self.error {
            layers.push(Layer::Error {
                message: message.clone(),
            });
        }
        if let Some(label) = &self.emotion {
            layers.push(Layer::EmotionBadge {
                label: label.clone(),
            });
        }
        layers
    }
}

impl fmt::Display for Presentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for layer in self.layers() {
            if !first {
                f.write_str(" | ")?;
            }
            first = false;
            match layer {
                Layer::Loading { message } => write!(f, "{message}")?,
                Layer::Error { message } => write!(f, "Error: {message}")?,
                Layer::EmotionBadge { label } => write!(f, "Emotion: {label}")?,
            }
        }
        Ok(())
    }
}
