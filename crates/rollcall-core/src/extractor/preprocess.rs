//! Face crop preparation: margin expansion, canonical resize, grayscale,
//! histogram equalization and Gaussian smoothing.

use super::ExtractionError;
use crate::types::{BoundingBox, PixelGrid};

/// Margin added on every side, as a fraction of the box width.
const MARGIN_FRACTION: f32 = 0.2;

/// 5-tap binomial kernel, the fixed 5×5 Gaussian used when sigma is derived from the size.
const GAUSSIAN_5: [u32; 5] = [1, 4, 6, 4, 1];
const GAUSSIAN_5_SHIFT: u32 = 4;

/// A pixel rectangle that is known to lie inside its image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

/// Grow `bbox` by 20% of its width on every side, clamped to the image.
///
/// The width-based margin is used vertically as well.
pub fn expand_box(
    bbox: &BoundingBox,
    image_width: u32,
    image_height: u32,
) -> Result<Region, ExtractionError> {
    let (img_w, img_h) = (image_width as i64, image_height as i64);
    let (x, y) = (bbox.x as i64, bbox.y as i64);
    let (w, h) = (bbox.width as i64, bbox.height as i64);

    if w == 0 || h == 0 {
        return Err(ExtractionError::EmptyRegion);
    }
    if x >= img_w || y >= img_h {
        return Err(ExtractionError::OutOfBounds {
            bbox: *bbox,
            width: image_width,
            height: image_height,
        });
    }

    let margin = (MARGIN_FRACTION * w as f32) as i64;
    let x0 = (x - margin).max(0);
    let y0 = (y - margin).max(0);
    let width = (img_w - x0).min(w + 2 * margin);
    let height = (img_h - y0).min(h + 2 * margin);

    if width <= 0 || height <= 0 {
        return Err(ExtractionError::EmptyRegion);
    }

    Ok(Region {
        x: x0 as usize,
        y: y0 as usize,
        width: width as usize,
        height: height as usize,
    })
}

/// Bilinear resize of `region` of `grid` to `out_w × out_h`, per channel.
///
/// Uses half-pixel centre alignment with edge clamping.
pub fn crop_resize(grid: &PixelGrid, region: Region, out_w: usize, out_h: usize) -> Vec<u8> {
    let ch = grid.channels() as usize;
    let mut resized = vec![0u8; out_w * out_h * ch];
    if region.width == 0 || region.height == 0 {
        return resized;
    }

    let scale_x = region.width as f32 / out_w as f32;
    let scale_y = region.height as f32 / out_h as f32;
    let max_x = region.width as i32 - 1;
    let max_y = region.height as i32 - 1;

    for y in 0..out_h {
        let src_y = (y as f32 + 0.5) * scale_y - 0.5;
        let y0 = (src_y.floor() as i32).clamp(0, max_y) as usize;
        let y1 = (y0 + 1).min(region.height - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);
        let fy = if src_y < 0.0 { 0.0 } else { fy };

        for x in 0..out_w {
            let src_x = (x as f32 + 0.5) * scale_x - 0.5;
            let x0 = (src_x.floor() as i32).clamp(0, max_x) as usize;
            let x1 = (x0 + 1).min(region.width - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);
            let fx = if src_x < 0.0 { 0.0 } else { fx };

            for c in 0..ch {
                let tl = grid.sample(region.x + x0, region.y + y0, c) as f32;
                let tr = grid.sample(region.x + x1, region.y + y0, c) as f32;
                let bl = grid.sample(region.x + x0, region.y + y1, c) as f32;
                let br = grid.sample(region.x + x1, region.y + y1, c) as f32;

                let val = tl * (1.0 - fx) * (1.0 - fy)
                    + tr * fx * (1.0 - fy)
                    + bl * (1.0 - fx) * fy
                    + br * fx * fy;

                resized[(y * out_w + x) * ch + c] = val.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    resized
}

/// Global histogram equalization in-place.
///
/// A single-valued image is left unchanged.
pub fn equalize_histogram(gray: &mut [u8]) {
    if gray.is_empty() {
        return;
    }
    let total = gray.len() as u64;

    let mut hist = [0u64; 256];
    for &p in gray.iter() {
        hist[p as usize] += 1;
    }

    let first = hist.iter().position(|&c| c > 0).unwrap_or(0);
    if hist[first] == total {
        return;
    }

    let cdf_min = hist[first];
    let scale = 255.0 / (total - cdf_min) as f64;
    let mut lut = [0u8; 256];
    let mut cdf = 0u64;
    for (i, &count) in hist.iter().enumerate().skip(first) {
        cdf += count;
        lut[i] = ((cdf - cdf_min) as f64 * scale).round().clamp(0.0, 255.0) as u8;
    }

    for p in gray.iter_mut() {
        *p = lut[*p as usize];
    }
}

/// Reflect-101 index: `-1 → 1`, `n → n - 2`.
#[inline]
pub(crate) fn reflect_101(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let n = n as isize;
    let mut i = i;
    while i < 0 || i >= n {
        i = if i < 0 { -i } else { 2 * (n - 1) - i };
    }
    i as usize
}

/// Separable 5×5 Gaussian smoothing with reflect-101 borders.
pub fn gaussian_blur_5x5(gray: &[u8], width: usize, height: usize) -> Vec<u8> {
    if width == 0 || height == 0 {
        return Vec::new();
    }
    let half = (GAUSSIAN_5.len() / 2) as isize;

    // Horizontal pass keeps the unnormalized 16x sums.
    let mut temp = vec![0u32; width * height];
    for y in 0..height {
        let row = &gray[y * width..(y + 1) * width];
        for x in 0..width {
            let mut acc = 0u32;
            for (k, &w) in GAUSSIAN_5.iter().enumerate() {
                let sx = reflect_101(x as isize + k as isize - half, width);
                acc += w * row[sx] as u32;
            }
            temp[y * width + x] = acc;
        }
    }

    let mut out = vec![0u8; width * height];
    let round = 1u32 << (2 * GAUSSIAN_5_SHIFT - 1);
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0u32;
            for (k, &w) in GAUSSIAN_5.iter().enumerate() {
                let sy = reflect_101(y as isize + k as isize - half, height);
                acc += w * temp[sy * width + x];
            }
            out[y * width + x] = ((acc + round) >> (2 * GAUSSIAN_5_SHIFT)).min(255) as u8;
        }
    }

    out
}

/// Crop, resize to `size × size`, convert to gray, equalize and smooth.
pub fn prepare_face(
    grid: &PixelGrid,
    bbox: &BoundingBox,
    size: usize,
) -> Result<Vec<u8>, ExtractionError> {
    if grid.is_empty() || grid.width() == 0 || grid.height() == 0 {
        return Err(ExtractionError::EmptyRegion);
    }

    let region = expand_box(bbox, grid.width(), grid.height())?;
    let resized = crop_resize(grid, region, size, size);
    let canonical = PixelGrid::new(resized, size as u32, size as u32, grid.channels())
        .map_err(|_| ExtractionError::EmptyRegion)?;

    let mut gray = canonical.to_gray().data().to_vec();
    equalize_histogram(&mut gray);
    Ok(gaussian_blur_5x5(&gray, size, size))
}
