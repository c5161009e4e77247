use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum GridError {
    #[error("unsupported channel count: {0} (expected 1 or 3)")]
    UnsupportedChannels(u8),
    #[error("expected {expected} samples for {width}x{height}x{channels}, got {actual}")]
    LengthMismatch {
        width: u32,
        height: u32,
        channels: u8,
        expected: usize,
        actual: usize,
    },
}

#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("descriptor JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("descriptor is empty")]
    Empty,
    #[error("descriptor contains a non-finite value at index {0}")]
    NonFinite(usize),
}

/// Row-major 8-bit image buffer with one (gray) or three (RGB) channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelGrid {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
}

impl PixelGrid {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8) -> Result<Self, GridError> {
        if channels != 1 && channels != 3 {
            return Err(GridError::UnsupportedChannels(channels));
        }
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(GridError::LengthMismatch {
                width,
                height,
                channels,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            channels,
        })
    }

    pub fn from_gray(data: Vec<u8>, width: u32, height: u32) -> Result<Self, GridError> {
        Self::new(data, width, height, 1)
    }

    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32) -> Result<Self, GridError> {
        Self::new(data, width, height, 3)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Sample at `(x, y)` in channel `c`. Caller guarantees bounds.
    #[inline]
    pub fn sample(&self, x: usize, y: usize, c: usize) -> u8 {
        let ch = self.channels as usize;
        self.data[(y * self.width as usize + x) * ch + c]
    }

    /// Single-channel view of the grid.
    ///
    /// RGB is converted with BT.601 luma weights in 14-bit fixed point
    /// (`0.299 R + 0.587 G + 0.114 B`, rounded).
    pub fn to_gray(&self) -> PixelGrid {
        if self.channels == 1 {
            return self.clone();
        }
        let data = self
            .data
            .chunks_exact(3)
            .map(|px| {
                let (r, g, b) = (px[0] as u32, px[1] as u32, px[2] as u32);
                ((r * 4899 + g * 9617 + b * 1868 + (1 << 13)) >> 14) as u8
            })
            .collect();
        PixelGrid {
            data,
            width: self.width,
            height: self.height,
            channels: 1,
        }
    }
}

/// Axis-aligned face region in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Fixed-length face descriptor: texture histogram segment followed by
/// the gradient-orientation segment.
///
/// Extracted descriptors have unit L2 norm unless the raw vector was all
/// zeros. Descriptors loaded from storage are kept as-is; similarity
/// re-normalizes both sides, so legacy un-normalized rows still compare.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaceDescriptor {
    values: Vec<f32>,
}

impl FaceDescriptor {
    /// L2-normalize `raw` into a descriptor. The zero vector is left untouched.
    pub fn normalized(raw: Vec<f32>) -> Self {
        let norm = l2_norm(&raw);
        let values = if norm > 0.0 {
            raw.iter().map(|v| (*v as f64 / norm) as f32).collect()
        } else {
            raw
        };
        Self { values }
    }

    /// Wrap stored values without touching them.
    pub fn from_values(values: Vec<f32>) -> Result<Self, DescriptorError> {
        if values.is_empty() {
            return Err(DescriptorError::Empty);
        }
        if let Some(idx) = values.iter().position(|v| !v.is_finite()) {
            return Err(DescriptorError::NonFinite(idx));
        }
        Ok(Self { values })
    }

    /// Parse the stored JSON array form.
    pub fn from_json(json: &str) -> Result<Self, DescriptorError> {
        let values: Vec<f32> = serde_json::from_str(json)?;
        Self::from_values(values)
    }

    /// Serialize to the stored JSON array form.
    pub fn to_json(&self) -> Result<String, DescriptorError> {
        Ok(serde_json::to_string(&self.values)?)
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn norm(&self) -> f64 {
        l2_norm(&self.values)
    }

    /// True for the all-zero vector, which never matches above zero.
    pub fn is_degenerate(&self) -> bool {
        self.values.iter().all(|v| *v == 0.0)
    }

    /// Descriptors are only comparable when produced with the same layout.
    pub fn is_comparable(&self, other: &FaceDescriptor) -> bool {
        self.values.len() == other.values.len()
    }

    /// Cosine similarity in [-1, 1].
    ///
    /// Equals the plain dot product for unit descriptors. Returns 0.0 when
    /// either side is degenerate or the lengths differ.
    pub fn similarity(&self, other: &FaceDescriptor) -> f32 {
        if !self.is_comparable(other) {
            return 0.0;
        }

        let mut dot = 0.0f64;
        let mut norm_a = 0.0f64;
        let mut norm_b = 0.0f64;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            let (a, b) = (*a as f64, *b as f64);
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 {
            (dot / denom).clamp(-1.0, 1.0) as f32
        } else {
            0.0
        }
    }
}

fn l2_norm(values: &[f32]) -> f64 {
    values
        .iter()
        .map(|v| (*v as f64) * (*v as f64))
        .sum::<f64>()
        .sqrt()
}

/// Opaque subject identifier owned by the persistence layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubjectId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SubjectId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Enrolled descriptors in scan order, one per subject.
#[derive(Debug, Clone, Default)]
pub struct KnownSet {
    entries: Vec<(SubjectId, FaceDescriptor)>,
    index: HashMap<SubjectId, usize>,
}

impl KnownSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    /// Add or replace a subject's descriptor. A replaced subject keeps its position.
    pub fn insert(&mut self, subject: impl Into<SubjectId>, descriptor: FaceDescriptor) {
        let subject = subject.into();
        match self.index.get(&subject) {
            Some(&pos) => self.entries[pos].1 = descriptor,
            None => {
                self.index.insert(subject.clone(), self.entries.len());
                self.entries.push((subject, descriptor));
            }
        }
    }

    pub fn get(&self, subject: &SubjectId) -> Option<&FaceDescriptor> {
        self.index.get(subject).map(|&pos| &self.entries[pos].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SubjectId, &FaceDescriptor)> {
        self.entries.iter().map(|(id, d)| (id, d))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S: Into<SubjectId>> FromIterator<(S, FaceDescriptor)> for KnownSet {
    fn from_iter<I: IntoIterator<Item = (S, FaceDescriptor)>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut set = KnownSet::with_capacity(iter.size_hint().0);
        for (subject, descriptor) in iter {
            set.insert(subject, descriptor);
        }
        set
    }
}

/// One detected face that cleared the tolerance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceMatch {
    /// Position of the face in detection order.
    pub face_index: usize,
    pub subject: SubjectId,
    /// Cosine similarity of the accepted entry.
    pub similarity: f32,
}

/// Result of scanning one image against a known set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "matches", rename_all = "snake_case")]
pub enum RecognitionOutcome {
    NoFace,
    /// Faces were located but none produced a descriptor.
    ExtractionFailed,
    /// Accepted matches in detection order; faces without a match are omitted.
    Matches(Vec<FaceMatch>),
}

impl RecognitionOutcome {
    pub fn subjects(&self) -> Vec<SubjectId> {
        match self {
            RecognitionOutcome::Matches(matches) => {
                matches.iter().map(|m| m.subject.clone()).collect()
            }
            _ => Vec::new(),
        }
    }
}
