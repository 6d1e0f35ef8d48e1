//! rollcall-core: Face detection, embedding and attendance matching.
//!
//! Uses SCRFD for face detection and ArcFace for face embeddings, both
//! running via ONNX Runtime on the CPU. Matching and roster bookkeeping are
//! plain Rust and independent of the models.

pub mod alignment;
pub mod analyzer;
pub mod attendance;
pub mod detector;
pub mod gallery;
pub mod recognizer;
pub mod roster;
pub mod types;

pub use analyzer::{AnalyzerError, FaceAnalyzer, OnnxAnalyzer};
pub use attendance::{attend, FrameOutcome};
pub use gallery::{Gallery, GalleryError, ReferenceImage};
pub use roster::Roster;
pub use types::{
    AttendanceRecord, BoundingBox, DetectedFace, Embedding, EuclideanMatcher, ImageView,
    KnownIdentity, MatchResult, Matcher,
};

/// Default model directory: `$XDG_DATA_HOME/rollcall/models`, falling back
/// to `~/.local/share/rollcall/models`.
pub fn default_model_dir() -> std::path::PathBuf {
    let data_dir = std::env::var("XDG_DATA_HOME")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            std::path::PathBuf::from(home).join(".local/share")
        });
    data_dir.join("rollcall/models")
}
