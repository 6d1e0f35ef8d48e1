//! ArcFace face embedder via ONNX Runtime.
//!
//! Produces L2-normalised 512-dimensional embeddings from aligned RGB face
//! crops, using the w600k_r50 ArcFace model.

use crate::alignment::{self, ALIGNED_SIZE};
use crate::types::{BoundingBox, Embedding, ImageView};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5; // symmetric, unlike SCRFD's 128.0
const ARCFACE_EMBEDDING_DIM: usize = 512;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model file not found: {0}; download w600k_r50.onnx from insightface into the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face has no landmarks; the detector must return landmarks for alignment")]
    NoLandmarks,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// ArcFace-based face embedder.
pub struct FaceRecognizer {
    session: Session,
}

impl FaceRecognizer {
    /// Load the ArcFace ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, RecognizerError> {
        if !Path::new(model_path).exists() {
            return Err(RecognizerError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded ArcFace model"
        );

        Ok(Self { session })
    }

    /// Compute the embedding of one detected face.
    ///
    /// The face is aligned to the canonical 112×112 crop using its
    /// landmarks before inference.
    pub fn extract(
        &mut self,
        image: &ImageView<'_>,
        face: &BoundingBox,
    ) -> Result<Embedding, RecognizerError> {
        let landmarks = face.landmarks.as_ref().ok_or(RecognizerError::NoLandmarks)?;
        let aligned = alignment::align_face(image, landmarks);
        let input = preprocess(&aligned);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.len() != ARCFACE_EMBEDDING_DIM {
            return Err(RecognizerError::InferenceFailed(format!(
                "expected {ARCFACE_EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(Embedding::new(l2_normalize(raw)))
    }
}

fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw.to_vec()
    }
}

/// Convert a 112×112 RGB crop into a normalised NCHW tensor.
fn preprocess(aligned: &[u8]) -> Array4<f32> {
    let size = ALIGNED_SIZE;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (i, px) in aligned.chunks_exact(3).take(size * size).enumerate() {
        let (y, x) = (i / size, i % size);
        for c in 0..3 {
            tensor[[0, c, y, x]] = (px[c] as f32 - ARCFACE_MEAN) / ARCFACE_STD;
        }
    }
    tensor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_output_shape() {
        let aligned = vec![128u8; ALIGNED_SIZE * ALIGNED_SIZE * 3];
        let tensor = preprocess(&aligned);
        assert_eq!(tensor.shape(), &[1, 3, ALIGNED_SIZE, ALIGNED_SIZE]);
    }

    #[test]
    fn test_preprocess_normalization() {
        let aligned = vec![255u8; ALIGNED_SIZE * ALIGNED_SIZE * 3];
        let tensor = preprocess(&aligned);
        assert!((tensor[[0, 2, 111, 111]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_keeps_channel_order() {
        let mut aligned = vec![0u8; ALIGNED_SIZE * ALIGNED_SIZE * 3];
        // Pixel (x=1, y=0) is pure blue.
        aligned[5] = 255;
        let tensor = preprocess(&aligned);
        assert!((tensor[[0, 2, 0, 1]] - 1.0).abs() < 1e-6);
        assert!((tensor[[0, 0, 0, 1]] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize() {
        let v = l2_normalize(&[3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        assert_eq!(l2_normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
    }
}
