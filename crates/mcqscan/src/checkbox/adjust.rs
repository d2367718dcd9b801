use crate::geometry::Pixel;
use crate::matrix::IntensityMatrix;

use super::CheckboxConfig;

/// Shifts tried around a misaligned edge: -1, 1, -2, 2, ...
fn offsets(delta: i32) -> impl Iterator<Item = i32> {
    (1..=delta).flat_map(|d| [-d, d])
}

/// Snap a checkbox onto its printed border.
///
/// The layout position can be off by a few pixels after rectification. When
/// the top edge row is lighter than `align_level1` (mean darkness), the
/// nearest row within `align_delta` reaching `align_level2` becomes the top
/// edge. The left edge column is then aligned the same way.
pub fn adjust_checkbox(m: &IntensityMatrix, at: Pixel, size: usize, config: &CheckboxConfig) -> Pixel {
    let len = size.max(1) as f32;
    let row_darkness = |i: i32, j: i32| m.darkness_sum(i, j, 1, size) / len;
    let col_darkness = |i: i32, j: i32| m.darkness_sum(i, j, size, 1) / len;

    let mut row = at.row;
    if row_darkness(row, at.col) < config.align_level1 {
        if let Some(d) = offsets(config.align_delta)
            .find(|&d| row_darkness(at.row + d, at.col) >= config.align_level2)
        {
            row = at.row + d;
        }
    }
    let mut col = at.col;
    if col_darkness(row, col) < config.align_level1 {
        if let Some(d) = offsets(config.align_delta)
            .find(|&d| col_darkness(row, at.col + d) >= config.align_level2)
        {
            col = at.col + d;
        }
    }
    if (row, col) != (at.row, at.col) {
        tracing::trace!(from = %at, to = %Pixel::new(row, col), "checkbox realigned");
    }
    Pixel::new(row, col)
}
