//! Face descriptor extraction.
//!
//! Turns one located face into a fixed-length, L2-normalized descriptor:
//! 64 cell histograms of radius-2 texture codes followed by a gradient
//! orientation histogram, both computed on a 200×200 canonical crop.

pub mod hog;
pub mod lbp;
pub mod preprocess;

use crate::types::{BoundingBox, FaceDescriptor, PixelGrid};
use thiserror::Error;

/// Side length of the canonical face crop.
pub const CANONICAL_SIZE: usize = 200;
pub const TEXTURE_LEN: usize = lbp::SEGMENT_LEN;
pub const GRADIENT_LEN: usize = hog::SEGMENT_LEN;
/// Length of every descriptor produced by [`FeatureExtractor`].
pub const DESCRIPTOR_LEN: usize = TEXTURE_LEN + GRADIENT_LEN;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("face region is empty")]
    EmptyRegion,
    #[error("face box {bbox:?} lies outside the {width}x{height} image")]
    OutOfBounds {
        bbox: BoundingBox,
        width: u32,
        height: u32,
    },
    #[error("descriptor has {actual} values, expected {expected}")]
    BadLength { expected: usize, actual: usize },
}

/// Texture + gradient descriptor extractor.
///
/// Stateless; all parameters are fixed so that every descriptor it
/// produces is comparable with every other.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract the descriptor for the face in `bbox`.
    pub fn extract(
        &self,
        grid: &PixelGrid,
        bbox: &BoundingBox,
    ) -> Result<FaceDescriptor, ExtractionError> {
        let face = preprocess::prepare_face(grid, bbox, CANONICAL_SIZE)?;

        let codes = lbp::texture_codes(&face, CANONICAL_SIZE, CANONICAL_SIZE);
        let mut raw = lbp::cell_histograms(&codes, CANONICAL_SIZE, CANONICAL_SIZE);
        raw.extend(hog::gradient_histograms(&face, CANONICAL_SIZE, CANONICAL_SIZE));

        if raw.len() != DESCRIPTOR_LEN {
            return Err(ExtractionError::BadLength {
                expected: DESCRIPTOR_LEN,
                actual: raw.len(),
            });
        }

        let descriptor = FaceDescriptor::normalized(raw);
        tracing::trace!(
            x = bbox.x,
            y = bbox.y,
            width = bbox.width,
            height = bbox.height,
            degenerate = descriptor.is_degenerate(),
            "extracted face descriptor"
        );
        Ok(descriptor)
    }
}
