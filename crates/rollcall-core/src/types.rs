use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// Borrowed view of an interleaved RGB image (3 bytes per pixel, row-major).
#[derive(Debug, Clone, Copy)]
pub struct ImageView<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
}

impl<'a> ImageView<'a> {
    pub fn new(data: &'a [u8], width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
        }
    }

    /// True if the buffer holds at least `width * height * 3` bytes.
    pub fn is_complete(&self) -> bool {
        self.data.len() >= self.width as usize * self.height as usize * 3
    }

    /// RGB triple at (x, y), or black when out of bounds.
    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        let w = self.width as usize;
        if x >= w || y >= self.height as usize {
            return [0, 0, 0];
        }
        let i = (y * w + x) * 3;
        match self.data.get(i..i + 3) {
            Some(p) => [p[0], p[1], p[2]],
            None => [0, 0, 0],
        }
    }
}

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Scale horizontal coordinates by `sx` and vertical ones by `sy` (used
    /// to map boxes found on a downscaled frame back onto the full-size one).
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            x: self.x * sx,
            y: self.y * sy,
            width: self.width * sx,
            height: self.height * sy,
            confidence: self.confidence,
            landmarks: self
                .landmarks
                .map(|lms| lms.map(|(x, y)| (x * sx, y * sy))),
        }
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance between two embeddings.
    ///
    /// Embeddings of different dimensionality are never comparable and
    /// report an infinite distance.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            return f32::INFINITY;
        }
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// A person the register knows about, enrolled once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownIdentity {
    pub name: String,
    pub embedding: Embedding,
}

/// A face found in one frame. Lives only for the frame it was found in.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub bbox: BoundingBox,
    pub embedding: Embedding,
}

/// One line of the attendance register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceRecord {
    pub name: String,
    pub time: NaiveTime,
}

impl AttendanceRecord {
    /// Time of day as written to the register (`HH-MM-SS`).
    pub fn time_label(&self) -> String {
        self.time.format("%H-%M-%S").to_string()
    }
}

/// Outcome of matching one probe embedding against the gallery.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub matched: bool,
    /// Smallest distance to any known identity (infinite for an empty gallery).
    pub distance: f32,
    /// Gallery index of the nearest identity.
    pub index: Option<usize>,
    /// Name of the matched identity, set only when `matched`.
    pub name: Option<String>,
}

impl MatchResult {
    fn unmatched(distance: f32, index: Option<usize>) -> Self {
        Self {
            matched: false,
            distance,
            index,
            name: None,
        }
    }
}

/// Default threshold on the minimum distance.
pub const DEFAULT_THRESHOLD: f32 = 0.6;
/// Default tolerance of the per-identity match test.
pub const DEFAULT_TOLERANCE: f32 = 0.6;

/// Strategy for deciding whether a probe embedding belongs to a known identity.
///
/// A name is assigned only when two tests agree: the nearest identity is
/// within `threshold`, and the per-identity match test (same distance,
/// `tolerance`) accepts that same identity.
pub trait Matcher {
    fn distance(&self, a: &Embedding, b: &Embedding) -> f32;

    fn threshold(&self) -> f32;

    fn tolerance(&self) -> f32;

    /// Distance from `probe` to every gallery entry, in gallery order.
    fn distances(&self, gallery: &[KnownIdentity], probe: &Embedding) -> Vec<f32> {
        gallery
            .iter()
            .map(|known| self.distance(&known.embedding, probe))
            .collect()
    }

    /// Yes/no match test against every gallery entry, in gallery order.
    fn matches(&self, gallery: &[KnownIdentity], probe: &Embedding) -> Vec<bool> {
        let tolerance = self.tolerance();
        self.distances(gallery, probe)
            .into_iter()
            .map(|d| d <= tolerance)
            .collect()
    }

    fn compare(&self, probe: &Embedding, gallery: &[KnownIdentity]) -> MatchResult {
        let distances = self.distances(gallery, probe);

        // First index wins on ties.
        let mut best: Option<(usize, f32)> = None;
        for (i, &d) in distances.iter().enumerate() {
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((i, d));
            }
        }

        let Some((idx, d_min)) = best else {
            return MatchResult::unmatched(f32::INFINITY, None);
        };

        if d_min.is_nan() || d_min > self.threshold() {
            return MatchResult::unmatched(d_min, Some(idx));
        }

        let confirmed = self
            .matches(gallery, probe)
            .get(idx)
            .copied()
            .unwrap_or(false);
        if !confirmed {
            return MatchResult::unmatched(d_min, Some(idx));
        }

        MatchResult {
            matched: true,
            distance: d_min,
            index: Some(idx),
            name: Some(gallery[idx].name.clone()),
        }
    }
}

/// Euclidean-distance matcher.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanMatcher {
    pub threshold: f32,
    pub tolerance: f32,
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl Matcher for EuclideanMatcher {
    fn distance(&self, a: &Embedding, b: &Embedding) -> f32 {
        a.euclidean_distance(b)
    }

    fn threshold(&self) -> f32 {
        self.threshold
    }

    fn tolerance(&self) -> f32 {
        self.tolerance
    }
}
