//! Dominant-emotion selection over an expression mapping.

use crate::types::ExpressionScores;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The winning expression label for one face in one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DominantEmotion {
    pub label: String,
    pub probability: f32,
}

impl DominantEmotion {
    /// Probability as a whole percentage, rounded half away from zero.
    pub fn percent(&self) -> u32 {
        (self.probability * 100.0).round().clamp(0.0, 100.0) as u32
    }

    /// Overlay caption, e.g. `happy: 90%`.
    pub fn caption(&self) -> String {
        format!("{}: {}%", self.label, self.percent())
    }
}

impl fmt::Display for DominantEmotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// Argmax over `scores`.
///
/// Ties keep the first label in iteration order; NaN never wins.
/// Returns `None` for an empty mapping or one holding only NaN.
pub fn dominant_emotion(scores: &ExpressionScores) -> Option<DominantEmotion> {
    let mut best: Option<(&str, f32)> = None;

    for (label, p) in scores.iter() {
        if p.is_nan() {
            continue;
        }
        match best {
            Some((_, best_p)) if p <= best_p => {}
            _ => best = Some((label, p)),
        }
    }

    best.map(|(label, probability)| DominantEmotion {
        label: label.to_string(),
        probability,
    })
}
