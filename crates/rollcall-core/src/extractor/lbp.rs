//! Local binary pattern texture codes and per-cell code histograms.

/// Neighbour ring radius; also the width of the border left at code 0.
pub const RADIUS: usize = 2;
/// Cells per side of the histogram grid.
pub const GRID: usize = 8;
pub const BINS: usize = 256;
pub const SEGMENT_LEN: usize = GRID * GRID * BINS;

/// Neighbour offsets `(dy, dx)` in units of `RADIUS`, clockwise from top-left.
/// Index `k` sets bit `k` of the code.
const NEIGHBOURS: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
    (1, 0),
    (1, -1),
    (0, -1),
];

/// Per-pixel 8-bit codes over a `width × height` gray image.
///
/// Bit `k` is set when neighbour `k` is greater than or equal to the centre.
/// Pixels within `RADIUS` of the border keep code 0.
pub fn texture_codes(gray: &[u8], width: usize, height: usize) -> Vec<u8> {
    let mut codes = vec![0u8; width * height];
    if width <= 2 * RADIUS || height <= 2 * RADIUS {
        return codes;
    }

    let r = RADIUS as isize;
    let w = width as isize;
    for y in RADIUS..height - RADIUS {
        for x in RADIUS..width - RADIUS {
            let centre = gray[y * width + x];
            let mut code = 0u8;
            for (bit, (dy, dx)) in NEIGHBOURS.iter().enumerate() {
                let idx = (y as isize + dy * r) * w + (x as isize + dx * r);
                if gray[idx as usize] >= centre {
                    code |= 1 << bit;
                }
            }
            codes[y * width + x] = code;
        }
    }

    codes
}

/// Density histograms of `codes` over a `GRID × GRID` cell partition.
///
/// Cells are `width / GRID` by `height / GRID` pixels; remainder rows and
/// columns are ignored. Each histogram is divided by its cell's pixel count,
/// and the 64 histograms are concatenated in row-major cell order.
pub fn cell_histograms(codes: &[u8], width: usize, height: usize) -> Vec<f32> {
    let cell_w = width / GRID;
    let cell_h = height / GRID;
    let mut out = vec![0.0f32; SEGMENT_LEN];
    if cell_w == 0 || cell_h == 0 {
        return out;
    }
    let cell_pixels = (cell_w * cell_h) as f32;

    for (cell, hist) in out.chunks_exact_mut(BINS).enumerate() {
        let (row, col) = (cell / GRID, cell % GRID);
        let mut counts = [0u32; BINS];
        for y in row * cell_h..(row + 1) * cell_h {
            let line = &codes[y * width + col * cell_w..y * width + (col + 1) * cell_w];
            for &code in line {
                counts[code as usize] += 1;
            }
        }
        for (dst, &count) in hist.iter_mut().zip(counts.iter()) {
            *dst = count as f32 / cell_pixels;
        }
    }

    out
}
