//! Shared test utilities: synthetic answer sheets and a small exam layout.
//!
//! Sheets are painted directly at a chosen resolution so detection tests
//! know every expected pixel position.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::calibration::CalibrationRecord;
use crate::exam_layout::{CheckboxSpec, ExamLayout, IdGridSpec, StudentEntry, EXAM_SCHEMA_V1};
use crate::geometry::{Corner, CornerPositions, Pixel, SheetGeometry};
use crate::matrix::IntensityMatrix;

/// Darkness of a well-filled checkbox.
pub(crate) const INK: f32 = 0.85;

/// Paints an A4 answer sheet at `ppmm` pixels per millimeter.
pub(crate) struct SheetPainter {
    matrix: IntensityMatrix,
    geometry: SheetGeometry,
    ppmm: f64,
}

impl SheetPainter {
    /// Blank sheet with the four calibration squares.
    pub(crate) fn new(ppmm: f64) -> Self {
        let mut painter = Self::blank(ppmm);
        for corner in Corner::ALL {
            painter.calibration_square(corner);
        }
        painter
    }

    /// Blank sheet without any printed mark.
    pub(crate) fn blank(ppmm: f64) -> Self {
        let geometry = SheetGeometry::default();
        let rows = (geometry.paper_height_mm * ppmm).round() as usize;
        let cols = (geometry.paper_width_mm * ppmm).round() as usize;
        Self {
            matrix: IntensityMatrix::white(rows, cols),
            geometry,
            ppmm,
        }
    }

    fn px(&self, mm: f64) -> i32 {
        (mm * self.ppmm).round() as i32
    }

    /// Top-left pixel of a box whose top-left corner sits at `(x, y)` mm from
    /// the bottom-left paper corner.
    pub(crate) fn mm_to_px(&self, x_mm: f64, y_mm: f64) -> Pixel {
        Pixel::new(self.px(self.geometry.paper_height_mm - y_mm), self.px(x_mm))
    }

    pub(crate) fn calibration_square(&mut self, corner: Corner) -> &mut Self {
        let g = &self.geometry;
        let size = g.calibration_square_size_mm;
        let left = g.calibration_square_position_mm;
        let top = g.calibration_square_position_mm;
        let x = if corner.is_right() { g.paper_width_mm - left - size } else { left };
        let y = if corner.is_bottom() { g.paper_height_mm - top - size } else { top };
        let at = Pixel::new(self.px(y), self.px(x));
        let side = self.px(size) as usize;
        self.matrix.fill_rect(at, side, side, 0.0);
        self
    }

    /// Identification band: anchor square at 30 mm from the left edge, level
    /// with the top calibration squares, followed by 24 code cells.
    pub(crate) fn with_id_band(mut self, document_id: u32, page: u32) -> Self {
        let value = (document_id << 8) | (page & 0xff);
        let side = self.px(self.geometry.square_size_mm);
        let anchor = Pixel::new(self.px(self.geometry.calibration_square_position_mm), self.px(30.0));
        self.matrix.fill_rect(anchor, side as usize, side as usize, 0.0);
        for k in 0..24 {
            if value >> k & 1 == 1 {
                let at = Pixel::new(anchor.row, anchor.col + side * (k as i32 + 1));
                self.matrix.fill_rect(at, side as usize, side as usize, 0.0);
            }
        }
        self
    }

    /// Printed checkbox with a thin border, filled inside with `ink`
    /// darkness (0 = empty).
    pub(crate) fn checkbox(&mut self, x_mm: f64, y_mm: f64, ink: f32) -> &mut Self {
        let at = self.mm_to_px(x_mm, y_mm);
        let side = self.px(self.geometry.cell_size_mm) as usize;
        self.matrix.fill_rect(at, side, 1, 0.2);
        self.matrix.fill_rect(at, 1, side, 0.2);
        self.matrix
            .fill_rect(Pixel::new(at.row, at.col + side as i32 - 1), side, 1, 0.2);
        self.matrix
            .fill_rect(Pixel::new(at.row + side as i32 - 1, at.col), 1, side, 0.2);
        if ink > 0.0 {
            let inner = Pixel::new(at.row + 3, at.col + 3);
            self.matrix
                .fill_rect(inner, side.saturating_sub(6), side.saturating_sub(6), 1.0 - ink);
        }
        self
    }

    /// Every checkbox of a layout page, inked when `checked(question, answer)`.
    pub(crate) fn with_page(
        mut self,
        layout: &ExamLayout,
        document_id: u32,
        page: u32,
        checked: impl Fn(u32, u32) -> bool,
    ) -> Self {
        for b in layout.checkboxes(document_id, page) {
            let ink = if checked(b.question, b.answer) { INK } else { 0.0 };
            self.checkbox(b.x_mm, b.y_mm, ink);
        }
        self
    }

    /// Student id grid with the cells of `id` inked.
    pub(crate) fn with_student_id(mut self, grid: &IdGridSpec, id: &str) -> Self {
        let chars: Vec<char> = id.chars().collect();
        for (position, digits) in grid.digits.iter().enumerate() {
            for (index, &digit) in digits.iter().enumerate() {
                let (x, y) = grid.cell_mm(position, index, self.geometry.cell_size_mm);
                let ink = if chars.get(position) == Some(&digit) { INK } else { 0.0 };
                self.checkbox(x, y, ink);
            }
        }
        self
    }

    pub(crate) fn finish(self) -> IntensityMatrix {
        self.matrix
    }
}

/// Add uniform scan noise of the given amplitude, seeded for reproducibility.
pub(crate) fn add_noise(m: &mut IntensityMatrix, amplitude: f32, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    for i in 0..m.rows() {
        for j in 0..m.cols() {
            let v = m.get(i as i32, j as i32) + rng.gen_range(-amplitude..=amplitude);
            m.set(i, j, v.clamp(0.0, 1.0));
        }
    }
}

/// Calibration of an unrotated sheet painted at 4 px/mm.
pub(crate) fn sample_record() -> CalibrationRecord {
    let geometry = SheetGeometry::default();
    CalibrationRecord {
        corners: CornerPositions {
            tl: Pixel::new(40, 40),
            tr: Pixel::new(40, 780),
            bl: Pixel::new(1128, 40),
            br: Pixel::new(1128, 780),
        },
        reconstructed: Vec::new(),
        h_pixels_per_mm: 4.0,
        v_pixels_per_mm: 4.0,
        pixels_per_mm: 4.0,
        square_size: 10.0,
        cell_size: 20.0,
        calibration_square_size: 20,
        id_band: Pixel::new(40, 120),
        rotation_deg: 0.0,
        upside_down: false,
        transposed: false,
        origin_mm: geometry.origin_mm(),
    }
}

/// Two-page exam: document 44 with 3 questions on page 1 and 2 on page 2,
/// a student id grid of 2 digits and a three-student table.
pub(crate) fn sample_layout() -> ExamLayout {
    let mut pages = BTreeMap::new();
    let row = |question: u32, y: f64, correct: u32| -> Vec<CheckboxSpec> {
        (1..=4)
            .map(|answer| CheckboxSpec {
                question,
                answer,
                x_mm: 60.0 + 10.0 * f64::from(answer),
                y_mm: y,
                correct: Some(answer == correct),
            })
            .collect()
    };
    let mut page1 = Vec::new();
    page1.extend(row(1, 180.0, 2));
    page1.extend(row(2, 170.0, 1));
    page1.extend(row(3, 160.0, 4));
    let mut page2 = Vec::new();
    page2.extend(row(4, 250.0, 3));
    page2.extend(row(5, 240.0, 1));
    pages.insert(1, page1);
    pages.insert(2, page2);

    let mut documents = BTreeMap::new();
    documents.insert(44, pages);

    ExamLayout {
        schema: EXAM_SCHEMA_V1.to_string(),
        name: Some("sample".to_string()),
        documents,
        students: vec![
            StudentEntry::new("12", "Ada Lovelace"),
            StudentEntry::new("21", "Alan Turing"),
            StudentEntry::new("30", "Grace Hopper"),
        ],
        id_grid: Some(IdGridSpec {
            x_mm: 60.0,
            y_mm: 250.0,
            digits: vec![
                vec!['0', '1', '2', '3'],
                vec!['0', '1', '2', '3'],
            ],
        }),
    }
}
