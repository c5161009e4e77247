//! Enrollment and recognition over decode → locate → extract → match.

use crate::decode::{self, DecodeError};
use crate::extractor::{ExtractionError, FeatureExtractor};
use crate::locator::FaceLocator;
use crate::matcher::{MatchPolicy, DEFAULT_TOLERANCE};
use crate::types::{FaceDescriptor, FaceMatch, KnownSet, PixelGrid, RecognitionOutcome, SubjectId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Smallest face side accepted for enrollment, in pixels.
pub const DEFAULT_MIN_FACE_SIZE: u32 = 100;

#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("could not decode image: {0}")]
    Decode(#[from] DecodeError),
    #[error("no face detected")]
    NoFace,
    #[error("expected exactly one face, found {count}")]
    MultipleFaces { count: usize },
    #[error("face is {width}x{height}, smaller than the {min}x{min} minimum")]
    FaceTooSmall { width: u32, height: u32, min: u32 },
    #[error("could not extract face features: {0}")]
    Extraction(#[from] ExtractionError),
}

/// Tunable pipeline parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Minimum cosine similarity to accept a match (strictly greater).
    pub tolerance: f32,
    /// Enrollment rejects faces narrower or shorter than this.
    pub min_face_size: u32,
    pub match_policy: MatchPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            min_face_size: DEFAULT_MIN_FACE_SIZE,
            match_policy: MatchPolicy::default(),
        }
    }
}

/// Recognition pipeline bound to one locator handle.
///
/// Holds no mutable state; one instance can serve concurrent callers.
pub struct Pipeline<L> {
    locator: L,
    extractor: FeatureExtractor,
    config: PipelineConfig,
}

impl<L: FaceLocator> Pipeline<L> {
    pub fn new(locator: L) -> Self {
        Self::with_config(locator, PipelineConfig::default())
    }

    pub fn with_config(locator: L, config: PipelineConfig) -> Self {
        Self {
            locator,
            extractor: FeatureExtractor::new(),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn locator(&self) -> &L {
        &self.locator
    }

    /// Enroll from a base64 text payload.
    pub fn enroll(&self, payload: &str) -> Result<FaceDescriptor, EnrollError> {
        let grid = decode::decode_payload(payload)?;
        self.enroll_grid(&grid)
    }

    /// Enroll from a decoded image. Requires exactly one face of at least
    /// `min_face_size` on each side.
    pub fn enroll_grid(&self, grid: &PixelGrid) -> Result<FaceDescriptor, EnrollError> {
        let faces = self.locator.locate(grid);
        let face = match faces.as_slice() {
            [] => return Err(EnrollError::NoFace),
            [face] => *face,
            _ => {
                tracing::warn!(count = faces.len(), "enroll: expected exactly one face");
                return Err(EnrollError::MultipleFaces { count: faces.len() });
            }
        };

        let min = self.config.min_face_size;
        if face.width < min || face.height < min {
            return Err(EnrollError::FaceTooSmall {
                width: face.width,
                height: face.height,
                min,
            });
        }

        let descriptor = self.extractor.extract(grid, &face)?;
        tracing::info!(
            x = face.x,
            y = face.y,
            width = face.width,
            height = face.height,
            "enroll: descriptor extracted"
        );
        Ok(descriptor)
    }

    /// Subject ids matched in a base64 payload, one per matched face in
    /// detection order. Undecodable input yields an empty result.
    pub fn recognize(&self, payload: &str, known: &KnownSet, tolerance: f32) -> Vec<SubjectId> {
        match self.recognize_detailed(payload, known, tolerance) {
            Ok(outcome) => outcome.subjects(),
            Err(err) => {
                tracing::error!(error = %err, "recognize: failed to decode image");
                Vec::new()
            }
        }
    }

    /// Like [`recognize`](Self::recognize) but keeps the outcome and decode error.
    pub fn recognize_detailed(
        &self,
        payload: &str,
        known: &KnownSet,
        tolerance: f32,
    ) -> Result<RecognitionOutcome, DecodeError> {
        let grid = decode::decode_payload(payload)?;
        Ok(self.recognize_grid(&grid, known, tolerance))
    }

    /// Match every located face in `grid` against `known`.
    ///
    /// A face whose extraction fails is skipped; the rest are still matched.
    pub fn recognize_grid(
        &self,
        grid: &PixelGrid,
        known: &KnownSet,
        tolerance: f32,
    ) -> RecognitionOutcome {
        let faces = self.locator.locate(grid);
        if faces.is_empty() {
            tracing::warn!("recognize: no faces detected");
            return RecognitionOutcome::NoFace;
        }
        if known.is_empty() {
            tracing::warn!("recognize: known set is empty");
            return RecognitionOutcome::Matches(Vec::new());
        }

        let matcher = self.config.match_policy.matcher();
        let mut extracted = 0usize;
        let mut matches: Vec<FaceMatch> = Vec::new();

        for (face_index, face) in faces.iter().enumerate() {
            let descriptor = match self.extractor.extract(grid, face) {
                Ok(d) => d,
                Err(err) => {
                    tracing::warn!(face_index, error = %err, "recognize: skipping face");
                    continue;
                }
            };
            extracted += 1;

            let decision = matcher.compare(&descriptor, known, tolerance);
            match decision.accepted {
                Some(mut m) => {
                    m.face_index = face_index;
                    tracing::info!(
                        face_index,
                        subject = %m.subject,
                        similarity = m.similarity,
                        "recognize: match"
                    );
                    matches.push(m);
                }
                None => {
                    tracing::info!(
                        face_index,
                        highest = ?decision.highest,
                        tolerance,
                        "recognize: no match above tolerance"
                    );
                }
            }
        }

        if extracted == 0 {
            return RecognitionOutcome::ExtractionFailed;
        }
        tracing::debug!(faces = faces.len(), extracted, matched = matches.len(), "recognize: done");
        RecognitionOutcome::Matches(matches)
    }

    /// Recognize with the configured tolerance.
    pub fn recognize_with_defaults(&self, payload: &str, known: &KnownSet) -> Vec<SubjectId> {
        self.recognize(payload, known, self.config.tolerance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::FixedLocator;
    use crate::types::BoundingBox;

    fn grid() -> PixelGrid {
        let (w, h) = (320u32, 240u32);
        let data = (0..w * h).map(|i| ((i % w) * 3 ^ (i / w) * 5) as u8).collect();
        PixelGrid::from_gray(data, w, h).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert!((config.tolerance - 0.75).abs() < f32::EPSILON);
        assert_eq!(config.min_face_size, 100);
        assert_eq!(config.match_policy, MatchPolicy::Best);
    }

    #[test]
    fn test_enroll_no_face() {
        let pipeline = Pipeline::new(FixedLocator::none());
        assert!(matches!(pipeline.enroll_grid(&grid()), Err(EnrollError::NoFace)));
    }

    #[test]
    fn test_enroll_multiple_faces() {
        let pipeline = Pipeline::new(FixedLocator::new(vec![
            BoundingBox::new(0, 0, 120, 120),
            BoundingBox::new(150, 0, 120, 120),
        ]));
        assert!(matches!(
            pipeline.enroll_grid(&grid()),
            Err(EnrollError::MultipleFaces { count: 2 })
        ));
    }

    #[test]
    fn test_enroll_too_small() {
        let pipeline = Pipeline::new(FixedLocator::new(vec![BoundingBox::new(10, 10, 99, 150)]));
        assert!(matches!(
            pipeline.enroll_grid(&grid()),
            Err(EnrollError::FaceTooSmall { width: 99, height: 150, min: 100 })
        ));
    }

    #[test]
    fn test_enroll_exactly_min_size_accepted() {
        let pipeline = Pipeline::new(FixedLocator::new(vec![BoundingBox::new(10, 10, 100, 100)]));
        assert!(pipeline.enroll_grid(&grid()).is_ok());
    }

    #[test]
    fn test_enroll_box_outside_image() {
        let pipeline = Pipeline::new(FixedLocator::new(vec![BoundingBox::new(400, 10, 120, 120)]));
        assert!(matches!(pipeline.enroll_grid(&grid()), Err(EnrollError::Extraction(_))));
    }

    #[test]
    fn test_enroll_bad_payload() {
        let pipeline = Pipeline::new(FixedLocator::none());
        assert!(matches!(pipeline.enroll("not base64 at all!"), Err(EnrollError::Decode(_))));
    }

    #[test]
    fn test_recognize_bad_payload_is_empty() {
        let pipeline = Pipeline::new(FixedLocator::new(vec![BoundingBox::new(0, 0, 120, 120)]));
        let known: KnownSet = [("a", FaceDescriptor::normalized(vec![1.0]))].into_iter().collect();
        assert!(pipeline.recognize("%%%", &known, 0.75).is_empty());
        assert!(pipeline.recognize_detailed("%%%", &known, 0.75).is_err());
    }

    #[test]
    fn test_recognize_grid_no_face() {
        let pipeline = Pipeline::new(FixedLocator::none());
        let known: KnownSet = [("a", FaceDescriptor::normalized(vec![1.0]))].into_iter().collect();
        assert_eq!(pipeline.recognize_grid(&grid(), &known, 0.75), RecognitionOutcome::NoFace);
    }

    #[test]
    fn test_recognize_grid_all_extractions_fail() {
        let pipeline = Pipeline::new(FixedLocator::new(vec![BoundingBox::new(500, 500, 50, 50)]));
        let known: KnownSet = [("a", FaceDescriptor::normalized(vec![1.0]))].into_iter().collect();
        assert_eq!(
            pipeline.recognize_grid(&grid(), &known, 0.75),
            RecognitionOutcome::ExtractionFailed
        );
    }

    #[test]
    fn test_recognize_grid_skips_failed_face() {
        let good = BoundingBox::new(100, 60, 110, 110);
        let enroller = Pipeline::new(FixedLocator::new(vec![good]));
        let descriptor = enroller.enroll_grid(&grid()).unwrap();
        let known: KnownSet = [("a", descriptor)].into_iter().collect();

        let bad = BoundingBox::new(900, 0, 50, 50);
        let pipeline = Pipeline::new(FixedLocator::new(vec![bad, good]));
        let outcome = pipeline.recognize_grid(&grid(), &known, 0.75);
        match outcome {
            RecognitionOutcome::Matches(m) => {
                assert_eq!(m.len(), 1);
                assert_eq!(m[0].face_index, 1);
                assert_eq!(m[0].subject.as_str(), "a");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}
