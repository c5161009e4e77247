//! rollcall-core: face descriptor extraction and matching engine.
//!
//! Builds a texture + gradient descriptor for each located face and matches
//! it against caller-supplied enrolled descriptors by cosine similarity.
//! Face location is delegated to a [`FaceLocator`] handle.

pub mod decode;
pub mod extractor;
pub mod locator;
pub mod matcher;
pub mod pipeline;
pub mod types;

pub use decode::DecodeError;
pub use extractor::{ExtractionError, FeatureExtractor, DESCRIPTOR_LEN};
pub use locator::{FaceLocator, FixedLocator};
#[cfg(feature = "rustface")]
pub use locator::{LocatorError, SeetaLocator};
pub use matcher::{BestMatch, FirstMatch, MatchDecision, MatchPolicy, Matcher, DEFAULT_TOLERANCE};
pub use pipeline::{EnrollError, Pipeline, PipelineConfig, DEFAULT_MIN_FACE_SIZE};
pub use types::{
    BoundingBox, DescriptorError, FaceDescriptor, FaceMatch, GridError, KnownSet, PixelGrid,
    RecognitionOutcome, SubjectId,
};
