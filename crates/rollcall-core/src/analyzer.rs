//! The face-recognition capability: find faces, then embed them.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{BoundingBox, DetectedFace, Embedding, ImageView};
use std::path::Path;
use thiserror::Error;

/// File name of the SCRFD detection model inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// File name of the ArcFace recognition model inside the model directory.
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("{0}")]
    Other(String),
}

/// Face detection and embedding over RGB images.
pub trait FaceAnalyzer {
    /// Locate every face in the image.
    fn detect_faces(&mut self, image: &ImageView<'_>) -> Result<Vec<BoundingBox>, AnalyzerError>;

    /// One embedding per box, in the order of `boxes`.
    fn compute_embeddings(
        &mut self,
        image: &ImageView<'_>,
        boxes: &[BoundingBox],
    ) -> Result<Vec<Embedding>, AnalyzerError>;

    /// Detect then embed, pairing each box with its embedding.
    fn analyze(&mut self, image: &ImageView<'_>) -> Result<Vec<DetectedFace>, AnalyzerError> {
        let boxes = self.detect_faces(image)?;
        if boxes.is_empty() {
            return Ok(Vec::new());
        }
        let embeddings = self.compute_embeddings(image, &boxes)?;
        if embeddings.len() != boxes.len() {
            return Err(AnalyzerError::Other(format!(
                "{} faces detected but {} embeddings computed",
                boxes.len(),
                embeddings.len()
            )));
        }
        Ok(boxes
            .into_iter()
            .zip(embeddings)
            .map(|(bbox, embedding)| DetectedFace { bbox, embedding })
            .collect())
    }
}

/// SCRFD + ArcFace running on ONNX Runtime.
pub struct OnnxAnalyzer {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxAnalyzer {
    /// Load both models from `model_dir`. Fails fast if either is missing.
    pub fn load(model_dir: &Path) -> Result<Self, AnalyzerError> {
        let det_path = model_dir.join(DETECTOR_MODEL_FILE);
        let rec_path = model_dir.join(RECOGNIZER_MODEL_FILE);

        let detector = FaceDetector::load(&det_path.to_string_lossy())?;
        let recognizer = FaceRecognizer::load(&rec_path.to_string_lossy())?;

        Ok(Self {
            detector,
            recognizer,
        })
    }
}

impl FaceAnalyzer for OnnxAnalyzer {
    fn detect_faces(&mut self, image: &ImageView<'_>) -> Result<Vec<BoundingBox>, AnalyzerError> {
        Ok(self.detector.detect(image)?)
    }

    fn compute_embeddings(
        &mut self,
        image: &ImageView<'_>,
        boxes: &[BoundingBox],
    ) -> Result<Vec<Embedding>, AnalyzerError> {
        boxes
            .iter()
            .map(|b| self.recognizer.extract(image, b).map_err(AnalyzerError::from))
            .collect()
    }
}
