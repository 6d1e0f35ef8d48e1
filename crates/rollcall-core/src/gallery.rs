//! Known identities, enrolled once from reference photos.

use crate::analyzer::{AnalyzerError, FaceAnalyzer};
use crate::types::{ImageView, KnownIdentity};
use image::RgbImage;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("no reference images configured")]
    Empty,
    #[error("duplicate identity name: {0}")]
    DuplicateName(String),
    #[error("reference image for {name} not found: {path}")]
    ImageNotFound { name: String, path: PathBuf },
    #[error("reference image for {name} could not be decoded ({path}): {source}")]
    ImageDecode {
        name: String,
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("no face found in reference image for {name}: {path}; use a clear, front-facing photo")]
    NoFace { name: String, path: PathBuf },
    #[error("face analysis failed for {name}: {source}")]
    Analyzer {
        name: String,
        #[source]
        source: AnalyzerError,
    },
}

/// A named reference photo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    pub name: String,
    pub path: PathBuf,
}

impl ReferenceImage {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Decode the photo into RGB.
    pub fn load(&self) -> Result<RgbImage, GalleryError> {
        if !self.path.exists() {
            return Err(GalleryError::ImageNotFound {
                name: self.name.clone(),
                path: self.path.clone(),
            });
        }
        image::open(&self.path)
            .map(|img| img.to_rgb8())
            .map_err(|source| GalleryError::ImageDecode {
                name: self.name.clone(),
                path: self.path.clone(),
                source,
            })
    }
}

/// The fixed set of known identities for a run, in enrollment order.
#[derive(Debug, Clone)]
pub struct Gallery {
    identities: Vec<KnownIdentity>,
}

impl Gallery {
    /// Build a gallery from precomputed identities.
    pub fn from_identities(identities: Vec<KnownIdentity>) -> Result<Self, GalleryError> {
        if identities.is_empty() {
            return Err(GalleryError::Empty);
        }
        let mut seen = HashSet::new();
        for identity in &identities {
            if !seen.insert(identity.name.as_str()) {
                return Err(GalleryError::DuplicateName(identity.name.clone()));
            }
        }
        Ok(Self { identities })
    }

    /// Enroll one identity per reference photo.
    ///
    /// Each photo must contain at least one face; when it contains several,
    /// the most confident detection is used.
    pub fn enroll<A: FaceAnalyzer + ?Sized>(
        references: &[ReferenceImage],
        analyzer: &mut A,
    ) -> Result<Self, GalleryError> {
        if references.is_empty() {
            return Err(GalleryError::Empty);
        }

        let mut identities = Vec::with_capacity(references.len());
        for reference in references {
            let rgb = reference.load()?;
            let embedding = enroll_one(reference, &rgb, analyzer)?;
            tracing::info!(
                name = %reference.name,
                path = %reference.path.display(),
                dim = embedding.embedding.dim(),
                "identity enrolled"
            );
            identities.push(embedding);
        }

        Self::from_identities(identities)
    }

    pub fn identities(&self) -> &[KnownIdentity] {
        &self.identities
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.identities.iter().map(|k| k.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

fn enroll_one<A: FaceAnalyzer + ?Sized>(
    reference: &ReferenceImage,
    rgb: &RgbImage,
    analyzer: &mut A,
) -> Result<KnownIdentity, GalleryError> {
    let analyzer_err = |source| GalleryError::Analyzer {
        name: reference.name.clone(),
        source,
    };
    let no_face = || GalleryError::NoFace {
        name: reference.name.clone(),
        path: reference.path.clone(),
    };

    let view = ImageView::new(rgb.as_raw(), rgb.width(), rgb.height());
    let boxes = analyzer.detect_faces(&view).map_err(analyzer_err)?;
    if boxes.len() > 1 {
        tracing::warn!(
            name = %reference.name,
            faces = boxes.len(),
            "reference image has several faces; using the most confident"
        );
    }
    let best = boxes
        .into_iter()
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
        .ok_or_else(no_face)?;

    let embedding = analyzer
        .compute_embeddings(&view, std::slice::from_ref(&best))
        .map_err(analyzer_err)?
        .into_iter()
        .next()
        .ok_or_else(no_face)?;

    Ok(KnownIdentity {
        name: reference.name.clone(),
        embedding,
    })
}

/// Resolve `path` against `base` unless it is already absolute.
pub fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, Embedding};

    /// Finds one face per bright pixel in the first row; the embedding is
    /// the mean colour of the image.
    struct PixelAnalyzer;

    impl FaceAnalyzer for PixelAnalyzer {
        fn detect_faces(&mut self, image: &ImageView<'_>) -> Result<Vec<BoundingBox>, AnalyzerError> {
            Ok((0..image.width as usize)
                .filter(|&x| image.pixel(x, 0)[0] > 128)
                .map(|x| BoundingBox {
                    x: x as f32,
                    y: 0.0,
                    width: 1.0,
                    height: 1.0,
                    confidence: x as f32 / 10.0,
                    landmarks: None,
                })
                .collect())
        }

        fn compute_embeddings(
            &mut self,
            _: &ImageView<'_>,
            boxes: &[BoundingBox],
        ) -> Result<Vec<Embedding>, AnalyzerError> {
            Ok(boxes.iter().map(|b| Embedding::new(vec![b.x, 1.0])).collect())
        }
    }

    fn write_png(dir: &Path, file: &str, bright: &[u32]) -> PathBuf {
        let mut img = RgbImage::new(4, 2);
        for &x in bright {
            img.put_pixel(x, 0, image::Rgb([255, 255, 255]));
        }
        let path = dir.join(file);
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn test_enroll_in_reference_order() {
        let dir = tempfile::tempdir().unwrap();
        let refs = vec![
            ReferenceImage::new("MonaLisa", write_png(dir.path(), "a.png", &[0])),
            ReferenceImage::new("Sachin", write_png(dir.path(), "b.png", &[1])),
        ];

        let gallery = Gallery::enroll(&refs, &mut PixelAnalyzer).unwrap();
        assert_eq!(gallery.names().collect::<Vec<_>>(), vec!["MonaLisa", "Sachin"]);
        assert_eq!(gallery.identities()[1].embedding.values, vec![1.0, 1.0]);
    }

    #[test]
    fn test_enroll_uses_most_confident_face() {
        let dir = tempfile::tempdir().unwrap();
        let refs = vec![ReferenceImage::new(
            "Group",
            write_png(dir.path(), "group.png", &[1, 3, 2]),
        )];

        let gallery = Gallery::enroll(&refs, &mut PixelAnalyzer).unwrap();
        assert_eq!(gallery.identities()[0].embedding.values, vec![3.0, 1.0]);
    }

    #[test]
    fn test_enroll_missing_image() {
        let dir = tempfile::tempdir().unwrap();
        let refs = vec![ReferenceImage::new("Tesla", dir.path().join("tesla.jpeg"))];

        let err = Gallery::enroll(&refs, &mut PixelAnalyzer).unwrap_err();
        assert!(matches!(err, GalleryError::ImageNotFound { ref name, .. } if name == "Tesla"));
    }

    #[test]
    fn test_enroll_undecodable_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tata.jpg");
        std::fs::write(&path, b"not an image").unwrap();
        let refs = vec![ReferenceImage::new("Ratan Tata", path)];

        let err = Gallery::enroll(&refs, &mut PixelAnalyzer).unwrap_err();
        assert!(matches!(err, GalleryError::ImageDecode { .. }));
    }

    #[test]
    fn test_enroll_no_face() {
        let dir = tempfile::tempdir().unwrap();
        let refs = vec![ReferenceImage::new("Nobody", write_png(dir.path(), "dark.png", &[]))];

        let err = Gallery::enroll(&refs, &mut PixelAnalyzer).unwrap_err();
        assert!(matches!(err, GalleryError::NoFace { ref name, .. } if name == "Nobody"));
        assert!(err.to_string().contains("dark.png"));
    }

    #[test]
    fn test_enroll_rejects_duplicates_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "a.png", &[0]);
        let refs = vec![
            ReferenceImage::new("Twin", path.clone()),
            ReferenceImage::new("Twin", path),
        ];
        assert!(matches!(
            Gallery::enroll(&refs, &mut PixelAnalyzer),
            Err(GalleryError::DuplicateName(ref n)) if n == "Twin"
        ));
        assert!(matches!(
            Gallery::enroll(&[], &mut PixelAnalyzer),
            Err(GalleryError::Empty)
        ));
    }

    #[test]
    fn test_resolve_path() {
        let base = Path::new("/srv/roster");
        assert_eq!(
            resolve_path(base, Path::new("photos/a.jpg")),
            PathBuf::from("/srv/roster/photos/a.jpg")
        );
        assert_eq!(
            resolve_path(base, Path::new("/abs/b.jpg")),
            PathBuf::from("/abs/b.jpg")
        );
    }
}
