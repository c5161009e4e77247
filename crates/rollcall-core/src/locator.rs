//! Face locator seam.
//!
//! The pipeline only needs `locate(grid) -> boxes`; the trained model behind
//! it is loaded once and handed to the pipeline as an immutable handle.

use crate::types::{BoundingBox, PixelGrid};

/// Pluggable face locator.
///
/// Implementations must be safe to call concurrently from several worker
/// threads, hence `&self` and `Send + Sync`.
pub trait FaceLocator: Send + Sync {
    /// Locate faces in `grid`, in detection order. An empty vector means no face.
    fn locate(&self, grid: &PixelGrid) -> Vec<BoundingBox>;
}

impl<L: FaceLocator + ?Sized> FaceLocator for &L {
    fn locate(&self, grid: &PixelGrid) -> Vec<BoundingBox> {
        (**self).locate(grid)
    }
}

impl<L: FaceLocator + ?Sized> FaceLocator for Box<L> {
    fn locate(&self, grid: &PixelGrid) -> Vec<BoundingBox> {
        (**self).locate(grid)
    }
}

/// Locator that reports a fixed list of boxes regardless of the image.
///
/// Used when the caller already knows where the face is (manual crop,
/// upstream detector) and by tests.
#[derive(Debug, Clone, Default)]
pub struct FixedLocator {
    boxes: Vec<BoundingBox>,
}

impl FixedLocator {
    pub fn new(boxes: Vec<BoundingBox>) -> Self {
        Self { boxes }
    }

    pub fn none() -> Self {
        Self::default()
    }
}

impl FaceLocator for FixedLocator {
    fn locate(&self, _grid: &PixelGrid) -> Vec<BoundingBox> {
        self.boxes.clone()
    }
}

#[cfg(feature = "rustface")]
pub use seeta::{LocatorError, SeetaLocator};

#[cfg(feature = "rustface")]
mod seeta {
    use super::FaceLocator;
    use crate::extractor::preprocess::equalize_histogram;
    use crate::types::{BoundingBox, PixelGrid};
    use std::path::Path;
    use thiserror::Error;

    const MIN_FACE_SIZE: u32 = 80;
    const SCORE_THRESHOLD: f64 = 2.0;
    const PYRAMID_SCALE_FACTOR: f32 = 0.8;
    const WINDOW_STEP: u32 = 4;

    #[derive(Error, Debug)]
    pub enum LocatorError {
        #[error("model file not found: {0}")]
        ModelNotFound(String),
        #[error("failed to load face model {path}: {reason}")]
        ModelLoad { path: String, reason: String },
    }

    /// Face locator backed by the SeetaFace cascade (`rustface` crate).
    ///
    /// The model is read once; each call builds a short-lived detector from a
    /// clone of it, so concurrent calls never share mutable state.
    pub struct SeetaLocator {
        model: rustface::Model,
        min_face_size: u32,
    }

    impl SeetaLocator {
        /// Load the SeetaFace frontal model from `model_path`.
        pub fn load(model_path: &Path) -> Result<Self, LocatorError> {
            let display = model_path.display().to_string();
            if !model_path.exists() {
                return Err(LocatorError::ModelNotFound(display));
            }
            let file = std::fs::File::open(model_path).map_err(|e| LocatorError::ModelLoad {
                path: display.clone(),
                reason: e.to_string(),
            })?;
            let model = rustface::read_model(std::io::BufReader::new(file)).map_err(|e| {
                LocatorError::ModelLoad {
                    path: display.clone(),
                    reason: e.to_string(),
                }
            })?;
            tracing::info!(path = %model_path.display(), "loaded SeetaFace model");
            Ok(Self {
                model,
                min_face_size: MIN_FACE_SIZE,
            })
        }

        pub fn with_min_face_size(mut self, min_face_size: u32) -> Self {
            self.min_face_size = min_face_size;
            self
        }
    }

    impl FaceLocator for SeetaLocator {
        fn locate(&self, grid: &PixelGrid) -> Vec<BoundingBox> {
            let mut gray = grid.to_gray().data().to_vec();
            equalize_histogram(&mut gray);

            let mut detector = rustface::create_detector_with_model(self.model.clone());
            detector.set_min_face_size(self.min_face_size);
            detector.set_score_thresh(SCORE_THRESHOLD);
            detector.set_pyramid_scale_factor(PYRAMID_SCALE_FACTOR);
            detector.set_slide_window_step(WINDOW_STEP, WINDOW_STEP);

            let faces = detector.detect(&rustface::ImageData::new(
                &gray,
                grid.width(),
                grid.height(),
            ));

            let (w, h) = (grid.width() as i64, grid.height() as i64);
            let boxes: Vec<BoundingBox> = faces
                .iter()
                .filter_map(|face| {
                    let bbox = face.bbox();
                    // Clamp to the frame; the cascade can report partially outside boxes.
                    let x0 = (bbox.x() as i64).clamp(0, w);
                    let y0 = (bbox.y() as i64).clamp(0, h);
                    let x1 = (bbox.x() as i64 + bbox.width() as i64).clamp(0, w);
                    let y1 = (bbox.y() as i64 + bbox.height() as i64).clamp(0, h);
                    (x1 > x0 && y1 > y0).then(|| {
                        BoundingBox::new(x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32)
                    })
                })
                .collect();

            tracing::debug!(faces = boxes.len(), "SeetaFace detection");
            boxes
        }
    }
}
