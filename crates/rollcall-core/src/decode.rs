//! Image payload decoding.
//!
//! Capture clients post frames as base64 text, usually with a
//! `data:image/<fmt>;base64,` prefix. Everything here returns
//! [`DecodeError`] instead of panicking on malformed input.

use crate::types::PixelGrid;
use base64::Engine;
use thiserror::Error;

const DATA_URI_MARKER: &str = ";base64,";

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("empty image payload")]
    Empty,
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("failed to decode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("image dimensions are zero")]
    ZeroDimensions,
}

/// Remove a leading `data:image/...;base64,` scheme marker if present.
pub fn strip_data_uri(payload: &str) -> &str {
    let trimmed = payload.trim();
    if trimmed.starts_with("data:image/") {
        if let Some(pos) = trimmed.find(DATA_URI_MARKER) {
            return &trimmed[pos + DATA_URI_MARKER.len()..];
        }
    }
    trimmed
}

/// Decode a base64 text payload (optionally data-URI prefixed) into a grid.
///
/// Line breaks and other ASCII whitespace inside the base64 text are
/// ignored, so wrapped output from `base64(1)` decodes as-is.
pub fn decode_payload(payload: &str) -> Result<PixelGrid, DecodeError> {
    let encoded: String = strip_data_uri(payload)
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    if encoded.is_empty() {
        return Err(DecodeError::Empty);
    }
    let bytes = base64::engine::general_purpose::STANDARD.decode(&encoded)?;
    decode_image(&bytes)
}

/// Decode encoded image bytes (PNG, JPEG, ...) into an RGB grid.
pub fn decode_image(bytes: &[u8]) -> Result<PixelGrid, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    let img = image::load_from_memory(bytes)?;
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    if width == 0 || height == 0 {
        return Err(DecodeError::ZeroDimensions);
    }
    tracing::debug!(width, height, "decoded image payload");
    // Dimensions come straight from the decoded buffer, so the length always agrees.
    PixelGrid::from_rgb(rgb.into_raw(), width, height).map_err(|_| DecodeError::ZeroDimensions)
}
