use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Bounding box for a detected face, in the pixel space of the frame it came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Detector confidence for this box.
    #[serde(default)]
    pub score: f32,
}

impl BoundingBox {
    /// Bottom-left corner, where the emotion label is anchored.
    pub fn bottom_left(&self) -> (f32, f32) {
        (self.x, self.y + self.height)
    }

    /// Rescale from a `from` pixel space into a `to` pixel space.
    pub fn rescaled(&self, from: (u32, u32), to: (u32, u32)) -> BoundingBox {
        let sx = if from.0 > 0 { to.0 as f32 / from.0 as f32 } else { 1.0 };
        let sy = if from.1 > 0 { to.1 as f32 / from.1 as f32 } else { 1.0 };
        BoundingBox {
            x: self.x * sx,
            y: self.y * sy,
            width: self.width * sx,
            height: self.height * sy,
            score: self.score,
        }
    }
}

/// Expression label → probability, kept in the order the capability reported it.
///
/// Order matters: it is the tie-break order for dominant-emotion selection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpressionScores(Vec<(String, f32)>);

impl ExpressionScores {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Insert or overwrite a label, keeping first-insertion position.
    pub fn insert(&mut self, label: impl Into<String>, probability: f32) {
        let label = label.into();
        match self.0.iter_mut().find(|(l, _)| *l == label) {
            Some(slot) => slot.1 = probability,
            None => self.0.push((label, probability)),
        }
    }

    pub fn get(&self, label: &str) -> Option<f32> {
        self.0.iter().find(|(l, _)| l == label).map(|(_, p)| *p)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.0.iter().map(|(l, p)| (l.as_str(), *p))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<L: Into<String>> FromIterator<(L, f32)> for ExpressionScores {
    fn from_iter<I: IntoIterator<Item = (L, f32)>>(iter: I) -> Self {
        let mut scores = ExpressionScores::new();
        for (label, p) in iter {
            scores.insert(label, p);
        }
        scores
    }
}

impl Serialize for ExpressionScores {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (label, p) in &self.0 {
            map.serialize_entry(label, p)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ExpressionScores {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ScoresVisitor;

        impl<'de> Visitor<'de> for ScoresVisitor {
            type Value = ExpressionScores;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of expression label to probability")
            }

            // Visit entries in document order so the tie-break order survives.
            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut scores = ExpressionScores::new();
                while let Some((label, p)) = access.next_entry::<String, f32>()? {
                    scores.insert(label, p);
                }
                Ok(scores)
            }
        }

        deserializer.deserialize_map(ScoresVisitor)
    }
}

/// One face reported by the detection capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceDetection {
    #[serde(rename = "box")]
    pub bounding_box: BoundingBox,
    pub expressions: ExpressionScores,
}

/// A captured RGB8 video frame.
#[derive(Clone)]
pub struct Frame {
    /// Packed RGB pixel data (width * height * 3 bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub sequence: u32,
    pub timestamp: std::time::Instant,
}

impl Frame {
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .field("bytes", &self.data.len())
            .finish()
    }
}
