//! Histogram-of-oriented-gradients segment.
//!
//! Fixed geometry over the canonical face: 20×20 blocks sliding by 10,
//! 10×10 cells, 9 unsigned orientation bins. Each pixel votes into up to
//! four cells of its block by bilinear spatial weights. Blocks are
//! Gaussian-weighted and L2-Hys normalized. Block and in-block cell order is
//! column-major (x outer, y inner), which fixes the layout of stored
//! descriptors.

use super::preprocess::reflect_101;
use ndarray::{Array2, Array3, Array4, ArrayView3};

pub const WINDOW: usize = 200;
pub const BLOCK: usize = 20;
pub const STRIDE: usize = 10;
pub const CELL: usize = 10;
pub const BINS: usize = 9;

const CELLS_PER_BLOCK: usize = BLOCK / CELL;
pub const BLOCK_LEN: usize = CELLS_PER_BLOCK * CELLS_PER_BLOCK * BINS;
pub const BLOCKS_PER_SIDE: usize = (WINDOW - BLOCK) / STRIDE + 1;
pub const SEGMENT_LEN: usize = BLOCKS_PER_SIDE * BLOCKS_PER_SIDE * BLOCK_LEN;

const L2HYS_CLIP: f32 = 0.2;
const BIN_WIDTH_DEG: f32 = 180.0 / BINS as f32;

/// Per-pixel orientation votes, shape `(height, width, BINS)`.
///
/// Central differences with reflect-101 borders, so edge pixels see no
/// gradient across the border. Each pixel's magnitude is split between its
/// two nearest orientation bins.
fn orientation_votes(gray: &[u8], width: usize, height: usize) -> Array3<f32> {
    let mut votes = Array3::<f32>::zeros((height, width, BINS));
    let at = |x: usize, y: usize| gray[y * width + x] as f32;

    for y in 0..height {
        let ym = reflect_101(y as isize - 1, height);
        let yp = reflect_101(y as isize + 1, height);
        for x in 0..width {
            let xm = reflect_101(x as isize - 1, width);
            let xp = reflect_101(x as isize + 1, width);
            let dx = at(xp, y) - at(xm, y);
            let dy = at(x, yp) - at(x, ym);
            let mag = (dx * dx + dy * dy).sqrt();
            if mag == 0.0 {
                continue;
            }

            let mut angle = dy.atan2(dx).to_degrees();
            if angle < 0.0 {
                angle += 180.0;
            }
            if angle >= 180.0 {
                angle -= 180.0;
            }

            let pos = angle / BIN_WIDTH_DEG - 0.5;
            let lower = pos.floor();
            let frac = pos - lower;
            let b0 = (lower as isize).rem_euclid(BINS as isize) as usize;
            let b1 = (b0 + 1) % BINS;
            votes[[y, x, b0]] += mag * (1.0 - frac);
            votes[[y, x, b1]] += mag * frac;
        }
    }

    votes
}

/// Gaussian spatial weights over one block, sigma = (BLOCK + BLOCK) / 8,
/// centred on offset `BLOCK / 2`.
fn block_weights() -> Array2<f32> {
    let sigma = (BLOCK + BLOCK) as f32 / 8.0;
    let scale = 1.0 / (2.0 * sigma * sigma);
    let centre = BLOCK as f32 * 0.5;
    Array2::from_shape_fn((BLOCK, BLOCK), |(y, x)| {
        let dy = y as f32 - centre;
        let dx = x as f32 - centre;
        (-(dx * dx + dy * dy) * scale).exp()
    })
}

/// Bilinear cell weights for one in-block offset along one axis:
/// `[(cell, weight); 2]`, with cells outside the block given weight 0.
fn cell_split(offset: usize) -> [(usize, f32); 2] {
    let pos = (offset as f32 + 0.5) / CELL as f32 - 0.5;
    let c0 = pos.floor();
    let t = pos - c0;
    let c0 = c0 as isize;
    let side = |c: isize, w: f32| {
        if (0..CELLS_PER_BLOCK as isize).contains(&c) {
            (c as usize, w)
        } else {
            (0, 0.0)
        }
    };
    [side(c0, 1.0 - t), side(c0 + 1, t)]
}

/// Combined Gaussian and bilinear cell weights for every block offset,
/// shape `(BLOCK, BLOCK, cx, cy)`.
fn block_cell_weights() -> Array4<f32> {
    let gaussian = block_weights();
    let shape = (BLOCK, BLOCK, CELLS_PER_BLOCK, CELLS_PER_BLOCK);
    let mut weights = Array4::<f32>::zeros(shape);
    for oy in 0..BLOCK {
        let ys = cell_split(oy);
        for ox in 0..BLOCK {
            let xs = cell_split(ox);
            let g = gaussian[[oy, ox]];
            for &(cx, wx) in &xs {
                for &(cy, wy) in &ys {
                    weights[[oy, ox, cx, cy]] += g * wx * wy;
                }
            }
        }
    }
    weights
}

/// Histogram for the block whose top-left corner is `(bx, by)`, cells in
/// column-major order.
fn block_histogram(
    votes: ArrayView3<f32>,
    weights: &Array4<f32>,
    bx: usize,
    by: usize,
) -> Vec<f32> {
    let mut cells = Array3::<f32>::zeros((CELLS_PER_BLOCK, CELLS_PER_BLOCK, BINS));
    for oy in 0..BLOCK {
        for ox in 0..BLOCK {
            for cx in 0..CELLS_PER_BLOCK {
                for cy in 0..CELLS_PER_BLOCK {
                    let w = weights[[oy, ox, cx, cy]];
                    if w == 0.0 {
                        continue;
                    }
                    for b in 0..BINS {
                        cells[[cx, cy, b]] += w * votes[[by + oy, bx + ox, b]];
                    }
                }
            }
        }
    }
    let mut hist = cells.into_raw_vec_and_offset().0;
    l2_hys(&mut hist);
    hist
}

/// L2 normalize, clip at 0.2, L2 normalize again.
fn l2_hys(hist: &mut [f32]) {
    let sum: f32 = hist.iter().map(|v| v * v).sum();
    let scale = 1.0 / (sum.sqrt() + hist.len() as f32 * 0.1);
    for v in hist.iter_mut() {
        *v = (*v * scale).min(L2HYS_CLIP);
    }
    let sum: f32 = hist.iter().map(|v| v * v).sum();
    let scale = 1.0 / (sum.sqrt() + 1e-3);
    for v in hist.iter_mut() {
        *v *= scale;
    }
}

/// Gradient descriptor of a `WINDOW × WINDOW` gray image.
pub fn gradient_histograms(gray: &[u8], width: usize, height: usize) -> Vec<f32> {
    debug_assert_eq!((width, height), (WINDOW, WINDOW));
    let votes = orientation_votes(gray, width, height);
    let weights = block_cell_weights();

    let mut out = Vec::with_capacity(SEGMENT_LEN);
    for bx in (0..=width - BLOCK).step_by(STRIDE) {
        for by in (0..=height - BLOCK).step_by(STRIDE) {
            out.extend(block_histogram(votes.view(), &weights, bx, by));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(f: impl Fn(usize, usize) -> u8) -> Vec<u8> {
        (0..WINDOW * WINDOW).map(|i| f(i % WINDOW, i / WINDOW)).collect()
    }

    fn block_at(out: &[f32], bx: usize, by: usize) -> &[f32] {
        let start = (bx * BLOCKS_PER_SIDE + by) * BLOCK_LEN;
        &out[start..start + BLOCK_LEN]
    }

    #[test]
    fn test_segment_length() {
        assert_eq!(SEGMENT_LEN, 12996);
        let gray = window(|x, y| ((x * 7 + y * 3) % 256) as u8);
        let out = gradient_histograms(&gray, WINDOW, WINDOW);
        assert_eq!(out.len(), SEGMENT_LEN);
    }

    #[test]
    fn test_flat_image_has_no_gradient() {
        let out = gradient_histograms(&window(|_, _| 90), WINDOW, WINDOW);
        assert!(out.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_horizontal_ramp_votes_near_zero_degrees() {
        let votes = orientation_votes(&window(|x, _| x as u8), WINDOW, WINDOW);
        // 0° sits on the boundary between the first and last bin.
        let px = votes.slice(ndarray::s![50usize, 50usize, ..]);
        assert!((px[0] - 1.0).abs() < 1e-5, "bin0 = {}", px[0]);
        assert!((px[BINS - 1] - 1.0).abs() < 1e-5, "bin8 = {}", px[BINS - 1]);
        let rest: f32 = px.iter().skip(1).take(BINS - 2).sum();
        assert!(rest.abs() < 1e-5);
    }

    #[test]
    fn test_vertical_ramp_votes_near_ninety_degrees() {
        let votes = orientation_votes(&window(|_, y| y as u8), WINDOW, WINDOW);
        // 90° → pos 4.0 → all weight in bin 4
        assert!((votes[[60, 60, 4]] - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_border_gradient_is_zero_across_edge() {
        let votes = orientation_votes(&window(|x, _| x as u8), WINDOW, WINDOW);
        // Reflect-101 mirrors x = 1 onto x = -1, so the first and last columns cancel.
        assert!(votes.slice(ndarray::s![30usize, 0usize, ..]).iter().all(|&v| v == 0.0));
        assert!(votes.slice(ndarray::s![30usize, WINDOW - 1, ..]).iter().all(|&v| v == 0.0));
        assert!(votes.slice(ndarray::s![30usize, 1usize, ..]).iter().any(|&v| v > 0.0));
    }

    fn cell_weight(offset: usize, cell: usize) -> f32 {
        cell_split(offset)
            .iter()
            .filter(|(c, _)| *c == cell)
            .map(|(_, w)| w)
            .sum()
    }

    #[test]
    fn test_cell_split_is_bilinear() {
        // Offset 9 sits 0.45 of the way from cell 0's centre to cell 1's.
        assert!((cell_weight(9, 0) - 0.55).abs() < 1e-6);
        assert!((cell_weight(9, 1) - 0.45).abs() < 1e-6);
        // Before the first cell centre only cell 0 receives weight.
        assert!((cell_weight(2, 0) - 0.75).abs() < 1e-6);
        assert_eq!(cell_weight(2, 1), 0.0);
        // Past the last cell centre only cell 1 receives weight.
        assert_eq!(cell_weight(17, 0), 0.0);
        assert!((cell_weight(17, 1) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_pixel_between_cells_votes_into_all_four() {
        let weights = block_cell_weights();
        let g = block_weights()[[9, 9]];
        let expect = [[0.55 * 0.55, 0.55 * 0.45], [0.45 * 0.55, 0.45 * 0.45]];
        for cx in 0..CELLS_PER_BLOCK {
            for cy in 0..CELLS_PER_BLOCK {
                let w = weights[[9, 9, cx, cy]];
                assert!((w - g * expect[cx][cy]).abs() < 1e-6, "cell ({cx},{cy}) = {w}");
            }
        }
    }

    #[test]
    fn test_blocks_are_clipped_unit_vectors() {
        let out = gradient_histograms(
            &window(|x, y| (((x / 7) ^ (y / 5)) * 37 % 256) as u8),
            WINDOW,
            WINDOW,
        );
        for block in out.chunks_exact(BLOCK_LEN) {
            let norm: f32 = block.iter().map(|v| v * v).sum::<f32>().sqrt();
            if norm > 0.0 {
                assert!((norm - 1.0).abs() < 0.01, "block norm = {norm}");
            }
        }
    }

    #[test]
    fn test_block_weights_peak_at_centre_offset() {
        let w = block_weights();
        assert!((w[[10, 10]] - 1.0).abs() < 1e-6);
        assert!(w[[10, 10]] > w[[9, 9]]);
        assert!((w[[9, 10]] - w[[11, 10]]).abs() < 1e-6);
        assert!((w[[0, 19]] - w[[19, 0]]).abs() < 1e-6);
    }

    #[test]
    fn test_blocks_are_column_major() {
        // A vertical edge at x = 25 only lies inside blocks with bx in {1, 2}
        // (pixel columns 10..30 and 20..40), in every block row.
        let gray = window(|x, _| if x < 25 { 40 } else { 200 });
        let out = gradient_histograms(&gray, WINDOW, WINDOW);
        assert!(block_at(&out, 1, 0).iter().any(|&v| v > 0.0));
        assert!(block_at(&out, 0, 0).iter().all(|&v| v == 0.0));
        assert!(block_at(&out, 0, 1).iter().all(|&v| v == 0.0));
        assert!(block_at(&out, 3, 0).iter().all(|&v| v == 0.0));

        // Block (x = 1, y = 0) starts right after the first column of blocks.
        let offset = BLOCKS_PER_SIDE * BLOCK_LEN;
        assert_eq!(&out[offset..offset + BLOCK_LEN], block_at(&out, 1, 0));
        assert!(out[..offset].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_cells_are_column_major_within_block() {
        // Edge at x = 15: inside block (0, 0) it lies in the right half, so the
        // weight lands in cells with cx = 1, i.e. the second half of the block.
        let gray = window(|x, _| if x < 15 { 40 } else { 200 });
        let out = gradient_histograms(&gray, WINDOW, WINDOW);
        let block = block_at(&out, 0, 0);
        let (left, right) = block.split_at(2 * BINS);
        let left_mass: f32 = left.iter().sum();
        let right_mass: f32 = right.iter().sum();
        assert!(right_mass > left_mass, "left {left_mass}, right {right_mass}");
    }
}
