//! Dark-square primitives shared by calibration, identification and the
//! checkbox analyzer.
//!
//! Coordinates are top-left pixels `(row, col)`; intensities follow the
//! [`IntensityMatrix`] convention (0 = black). Pixels outside the matrix are
//! white paper, so a square straddling the border never looks darker than it is.

use crate::geometry::{Corner, Pixel};
use crate::matrix::IntensityMatrix;

use super::CalibrationConfig;

/// Blackness indicator in `[0, 1]` (bigger = darker) of a square, ignoring a
/// `margin`-pixel border.
///
/// The sum is normalized by `(size - margin)^2`, which slightly under-weights
/// wide margins; the checkbox thresholds are tuned against this formula.
pub(crate) fn eval_square_color(m: &IntensityMatrix, at: Pixel, size: usize, margin: usize) -> f32 {
    if size <= 2 * margin {
        return 0.0;
    }
    let inner = size - 2 * margin;
    let m32 = margin as i32;
    m.darkness_sum(at.row + m32, at.col + m32, inner, inner) / ((size - margin) * (size - margin)) as f32
}

/// Whether a square holds enough dark pixels.
///
/// Both the square (minus `margin`) and its core (2 more pixels in on every
/// side) must have more than `proportion` of their pixels below `gray_level`.
/// The core test keeps a dark printed border from passing as a filled box.
/// Squares too small for the margins never pass.
pub(crate) fn test_square_color(
    m: &IntensityMatrix,
    at: Pixel,
    size: usize,
    proportion: f32,
    gray_level: f32,
    margin: usize,
) -> bool {
    if size <= 2 * margin + 4 {
        return false;
    }
    let len = size - 2 * margin;
    let m32 = margin as i32;
    let square = m.dark_count(at.row + m32, at.col + m32, len, len, gray_level);
    let core = m.dark_count(at.row + m32 + 2, at.col + m32 + 2, len - 4, len - 4, gray_level);
    square as f32 > proportion * (len * len) as f32
        && core as f32 > proportion * ((len - 4) * (len - 4)) as f32
}

/// A corner search that ended on a candidate too light to be a printed mark.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SquareMiss {
    /// Candidate top-left pixel in image coordinates, when one was reached.
    pub candidate: Option<Pixel>,
    pub whiteness: f32,
}

/// Whiteness of a block, counting out-of-bounds pixels as white.
#[inline]
fn whiteness(area: &IntensityMatrix, i: i32, j: i32, height: usize, width: usize) -> f32 {
    (height * width) as f32 - area.darkness_sum(i, j, height, width)
}

/// Top-left pixel of the square covering mesh cell `idx`, interpolated from
/// how dark the two neighbouring cells are.
fn interpolate_cell(idx: usize, n_cells: usize, half: usize, darkness: impl Fn(usize) -> f32) -> i32 {
    if idx == 0 {
        return 0;
    }
    if idx + 1 == n_cells {
        return (half * idx) as i32;
    }
    let before = darkness(idx - 1).max(0.0);
    let after = darkness(idx + 1).max(0.0);
    let share = if before + after <= f32::EPSILON {
        0.5
    } else {
        before / (before + after)
    };
    (half as f32 * (idx as f32 - share)).round() as i32
}

/// Locate the calibration square of `corner`.
///
/// The quadrant is oriented so that `corner` becomes its top-left, split into
/// a mesh of half-square cells, and scanned along anti-diagonals for the first
/// cell at least as dark as the detection level
/// `darkest + tolerance * (white - darkest)`. The position is interpolated from
/// the neighbouring cells, then refined one pixel at a time while the shift
/// strictly darkens the square.
pub(crate) fn find_corner_square(
    m: &IntensityMatrix,
    corner: Corner,
    size: usize,
    tolerance: f32,
    config: &CalibrationConfig,
) -> Result<Pixel, SquareMiss> {
    let miss = SquareMiss {
        candidate: None,
        whiteness: 1.0,
    };
    let (height, width) = (m.rows(), m.cols());
    let qh = (height as f64 * config.quadrant_fraction) as usize;
    let qw = (width as f64 * config.quadrant_fraction) as usize;
    let half = (size / 2).max(1);
    let (n_rows, n_cols) = (qh / half, qw / half);
    if size == 0 || n_rows == 0 || n_cols == 0 || qh <= size || qw <= size {
        return Err(miss);
    }

    // Oriented copy of the quadrant, padded by one square for the final checks.
    let (ph, pw) = ((qh + size).min(height), (qw + size).min(width));
    let area = IntensityMatrix::from_fn(ph, pw, |i, j| {
        let si = if corner.is_bottom() { height - 1 - i } else { i };
        let sj = if corner.is_right() { width - 1 - j } else { j };
        m.get(si as i32, sj as i32)
    });

    let mut grid = vec![0.0f32; n_rows * n_cols];
    for ci in 0..n_rows {
        for cj in 0..n_cols {
            grid[ci * n_cols + cj] =
                whiteness(&area, (ci * half) as i32, (cj * half) as i32, half, half);
        }
    }
    let full = (half * half) as f32;
    let darkest = grid.iter().copied().fold(f32::INFINITY, f32::min);
    let level = darkest + tolerance * (full - darkest);

    // Anti-diagonal scan from the corner.
    let mut hit = None;
    'scan: for k in 0..(n_rows + n_cols) {
        let start = (k + 1).saturating_sub(n_cols);
        for ci in start..(k + 1).min(n_rows) {
            let cj = k - ci;
            if grid[ci * n_cols + cj] < level {
                hit = Some((ci, cj));
                break 'scan;
            }
        }
    }
    let (ci, cj) = hit.ok_or(miss)?;
    tracing::trace!(%corner, ci, cj, level, darkest, "corner mesh cell found");

    let mut i0 = interpolate_cell(ci, n_rows, half, |k| full - grid[k * n_cols + cj]);
    let mut j0 = interpolate_cell(cj, n_cols, half, |k| full - grid[ci * n_cols + k]);

    let s = size as i32;
    let (qh, qw) = (qh as i32, qw as i32);

    // Vertical refinement: move towards the darker edge row.
    let row = |i: i32, j: i32| whiteness(&area, i, j, 1, size);
    let mut moved = false;
    for _ in 0..config.max_refine_steps {
        if i0 < qh - s && row(i0 + s, j0) < row(i0, j0) {
            i0 += 1;
            moved = true;
        } else {
            break;
        }
    }
    if !moved {
        for _ in 0..config.max_refine_steps {
            if i0 > 0 && row(i0 - 1, j0) < row(i0 + s - 1, j0) {
                i0 -= 1;
            } else {
                break;
            }
        }
    }

    // Horizontal refinement.
    let col = |i: i32, j: i32| whiteness(&area, i, j, size, 1);
    let mut moved = false;
    for _ in 0..config.max_refine_steps {
        if j0 < qw - s && col(i0, j0 + s) < col(i0, j0) {
            j0 += 1;
            moved = true;
        } else {
            break;
        }
    }
    if !moved {
        for _ in 0..config.max_refine_steps {
            if j0 > 0 && col(i0, j0 - 1) < col(i0, j0 + s - 1) {
                j0 -= 1;
            } else {
                break;
            }
        }
    }

    let row_px = if corner.is_bottom() { height as i32 - i0 - s } else { i0 };
    let col_px = if corner.is_right() { width as i32 - j0 - s } else { j0 };
    let position = Pixel::new(row_px, col_px);

    let mean_whiteness = whiteness(&area, i0, j0, size, size) / (size * size) as f32;
    if mean_whiteness > config.max_whiteness {
        tracing::debug!(%corner, %position, mean_whiteness, "corner square not dark enough");
        return Err(SquareMiss {
            candidate: Some(position),
            whiteness: mean_whiteness,
        });
    }
    tracing::debug!(%corner, %position, mean_whiteness, "corner square found");
    Ok(position)
}

/// First dark square of side `size` inside a search window, scanning column
/// by column from the left.
///
/// A pixel darker than `gray_level` starts a candidate when at least
/// `(1 - error)` of the square is dark. The candidate is then nudged towards
/// the square's true edges by at most `error * size` pixels per axis.
pub(crate) fn find_black_square(
    m: &IntensityMatrix,
    top_left: Pixel,
    bottom_right: Pixel,
    size: usize,
    error: f32,
    gray_level: f32,
    max_steps: usize,
) -> Option<Pixel> {
    if size == 0 {
        return None;
    }
    let goal = (1.0 - error) * (size * size) as f32;
    let per_line = (1.0 - error) * size as f32;
    let max_shift = (error * size as f32).max(1.0) as i32;
    let s = size as i32;
    let dark_col = |i: i32, j: i32| m.dark_count(i, j, size, 1, gray_level) as f32;
    let dark_row = |i: i32, j: i32| m.dark_count(i, j, 1, size, gray_level) as f32;

    for j in top_left.col.max(0)..bottom_right.col.min(m.cols() as i32) {
        for i in top_left.row.max(0)..bottom_right.row.min(m.rows() as i32) {
            if m.get(i, j) >= gray_level {
                continue;
            }
            if (m.dark_count(i, j, size, size, gray_level) as f32) < goal {
                continue;
            }
            let (i0, j0) = (i, j);
            let (mut i, mut j) = (i, j);
            for _ in 0..max_steps {
                let mut moved = false;
                while (j - j0).abs() < max_shift && dark_col(i, j + s) > per_line && dark_col(i, j) < per_line {
                    j += 1;
                    moved = true;
                }
                if !moved {
                    while (j - j0).abs() < max_shift
                        && dark_col(i, j + s - 1) < per_line
                        && dark_col(i, j - 1) > per_line
                    {
                        j -= 1;
                        moved = true;
                    }
                }
                let mut moved_v = false;
                while (i - i0).abs() < max_shift && dark_row(i + s, j) > per_line && dark_row(i, j) < per_line {
                    i += 1;
                    moved_v = true;
                }
                if !moved_v {
                    while (i - i0).abs() < max_shift
                        && dark_row(i + s - 1, j) < per_line
                        && dark_row(i - 1, j) > per_line
                    {
                        i -= 1;
                        moved_v = true;
                    }
                }
                if !(moved || moved_v) {
                    break;
                }
            }
            return Some(Pixel::new(i, j));
        }
    }
    None
}
