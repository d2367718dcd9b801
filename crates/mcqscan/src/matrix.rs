//! Normalized intensity matrix used by every detection stage.
//!
//! Values are in `[0, 1]` with 0 = black and 1 = white. Indexing is `(row, col)`
//! (`i` = line, `j` = column) to match how positions are reported throughout the
//! crate. Region queries clip to the matrix bounds; pixels outside the sheet
//! behave as white paper.

use image::{GrayImage, Luma};

use crate::geometry::Pixel;

#[derive(Debug, Clone, PartialEq)]
pub struct IntensityMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl IntensityMatrix {
    /// Matrix of the given shape filled with `value`.
    pub fn filled(rows: usize, cols: usize, value: f32) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    /// Blank (white) sheet.
    pub fn white(rows: usize, cols: usize) -> Self {
        Self::filled(rows, cols, 1.0)
    }

    pub fn from_fn(rows: usize, cols: usize, f: impl Fn(usize, usize) -> f32) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for i in 0..rows {
            for j in 0..cols {
                data.push(f(i, j));
            }
        }
        Self { rows, cols, data }
    }

    pub fn from_gray(gray: &GrayImage) -> Self {
        let (w, h) = gray.dimensions();
        let data = gray.as_raw().iter().map(|&v| v as f32 / 255.0).collect();
        Self {
            rows: h as usize,
            cols: w as usize,
            data,
        }
    }

    pub fn to_gray(&self) -> GrayImage {
        let mut out = GrayImage::new(self.cols as u32, self.rows as u32);
        for (idx, px) in out.pixels_mut().enumerate() {
            let v = self.data[idx].clamp(0.0, 1.0);
            *px = Luma([(v * 255.0).round() as u8]);
        }
        out
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Value at `(i, j)`, or white when outside the matrix.
    #[inline]
    pub fn get(&self, i: i32, j: i32) -> f32 {
        if i < 0 || j < 0 || i as usize >= self.rows || j as usize >= self.cols {
            return 1.0;
        }
        self.data[i as usize * self.cols + j as usize]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: f32) {
        if i < self.rows && j < self.cols {
            self.data[i * self.cols + j] = value;
        }
    }

    /// Paint an axis-aligned block, clipped to the matrix.
    pub fn fill_rect(&mut self, top_left: Pixel, height: usize, width: usize, value: f32) {
        let Some((r0, r1, c0, c1)) = self.clip(top_left.row, top_left.col, height, width) else {
            return;
        };
        for i in r0..r1 {
            let row = &mut self.data[i * self.cols..(i + 1) * self.cols];
            row[c0..c1].fill(value);
        }
    }

    /// Clip a `height x width` block at `(i, j)` to matrix bounds.
    ///
    /// Returns `(row_start, row_end, col_start, col_end)` or `None` when the
    /// block lies entirely outside.
    fn clip(&self, i: i32, j: i32, height: usize, width: usize) -> Option<(usize, usize, usize, usize)> {
        let r0 = i.max(0) as i64;
        let c0 = j.max(0) as i64;
        let r1 = (i as i64 + height as i64).min(self.rows as i64);
        let c1 = (j as i64 + width as i64).min(self.cols as i64);
        if r0 >= r1 || c0 >= c1 {
            return None;
        }
        Some((r0 as usize, r1 as usize, c0 as usize, c1 as usize))
    }

    /// Sum of intensities (whiteness) over the in-bounds part of a block.
    pub fn whiteness_sum(&self, i: i32, j: i32, height: usize, width: usize) -> f32 {
        let Some((r0, r1, c0, c1)) = self.clip(i, j, height, width) else {
            return 0.0;
        };
        let mut sum = 0.0f32;
        for r in r0..r1 {
            sum += self.data[r * self.cols + c0..r * self.cols + c1].iter().sum::<f32>();
        }
        sum
    }

    /// Sum of `1 - v` over the block; out-of-bounds pixels count as white (0).
    pub fn darkness_sum(&self, i: i32, j: i32, height: usize, width: usize) -> f32 {
        let Some((r0, r1, c0, c1)) = self.clip(i, j, height, width) else {
            return 0.0;
        };
        let mut sum = 0.0f32;
        for r in r0..r1 {
            sum += self.data[r * self.cols + c0..r * self.cols + c1]
                .iter()
                .map(|v| 1.0 - v)
                .sum::<f32>();
        }
        sum
    }

    /// Number of pixels strictly darker than `gray_level` inside the block.
    pub fn dark_count(&self, i: i32, j: i32, height: usize, width: usize, gray_level: f32) -> usize {
        let Some((r0, r1, c0, c1)) = self.clip(i, j, height, width) else {
            return 0;
        };
        let mut count = 0;
        for r in r0..r1 {
            count += self.data[r * self.cols + c0..r * self.cols + c1]
                .iter()
                .filter(|&&v| v < gray_level)
                .count();
        }
        count
    }

    /// Copy a block out of the matrix, padding out-of-bounds pixels with white.
    pub fn sub_matrix(&self, top_left: Pixel, height: usize, width: usize) -> Self {
        Self::from_fn(height, width, |i, j| {
            self.get(top_left.row + i as i32, top_left.col + j as i32)
        })
    }

    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            return 1.0;
        }
        self.data.iter().sum::<f32>() / self.data.len() as f32
    }

    /// Mirror rows and/or columns.
    pub fn flipped(&self, vertical: bool, horizontal: bool) -> Self {
        Self::from_fn(self.rows, self.cols, |i, j| {
            let si = if vertical { self.rows - 1 - i } else { i };
            let sj = if horizontal { self.cols - 1 - j } else { j };
            self.data[si * self.cols + sj]
        })
    }

    pub fn rotated_180(&self) -> Self {
        self.flipped(true, true)
    }

    /// Quarter turn counterclockwise; a landscape scan becomes portrait.
    pub fn rotated_90_ccw(&self) -> Self {
        let (rows, cols) = (self.cols, self.rows);
        Self::from_fn(rows, cols, |i, j| {
            // output (i, j) <- input (j, cols_in - 1 - i)
            self.data[j * self.cols + (self.cols - 1 - i)]
        })
    }

    /// Quarter turn clockwise.
    pub fn rotated_90_cw(&self) -> Self {
        let (rows, cols) = (self.cols, self.rows);
        Self::from_fn(rows, cols, |i, j| {
            self.data[(self.rows - 1 - j) * self.cols + i]
        })
    }
}
