//! Student identity grid reader.
//!
//! Each character position of the student id is a row of candidate cells;
//! the respondent blackens one cell per row.

use crate::calibration::square::{eval_square_color, test_square_color};
use crate::calibration::CalibrationRecord;
use crate::checkbox::DarkTest;
use crate::debug_dump::{Overlay, OverlayColor};
use crate::exam_layout::{IdGridSpec, StudentEntry};
use crate::geometry::{Pixel, SheetGeometry};
use crate::matrix::IntensityMatrix;
use crate::model::Student;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StudentIdConfig {
    /// A cell passing any of these is a candidate.
    pub cell_tests: Vec<DarkTest>,
    /// Blackness lead the darkest candidate needs over the runner-up.
    /// Default: [`StudentIdConfig::DEFAULT_MIN_GAP`].
    pub min_gap: f32,
}

impl StudentIdConfig {
    pub const DEFAULT_CELL_TESTS: [DarkTest; 2] = [DarkTest::new(0.3, 0.85), DarkTest::new(0.5, 0.9)];
    pub const DEFAULT_MIN_GAP: f32 = 0.2;
}

impl Default for StudentIdConfig {
    fn default() -> Self {
        Self {
            cell_tests: Self::DEFAULT_CELL_TESTS.to_vec(),
            min_gap: Self::DEFAULT_MIN_GAP,
        }
    }
}

/// Blackness of a cell, leaving out its top-left quarter where the candidate
/// character is printed.
fn cell_blackness(m: &IntensityMatrix, at: Pixel, size: usize) -> f32 {
    let half = (size / 2).max(1);
    let h = half as i32;
    (eval_square_color(m, Pixel::new(at.row, at.col + h), half, 0)
        + eval_square_color(m, Pixel::new(at.row + h, at.col), half, 0)
        + eval_square_color(m, Pixel::new(at.row + h, at.col + h), half, 0))
        / 3.0
}

/// Student id read from the grid, with the overlays of every cell.
///
/// A position whose darkest candidate does not lead the runner-up by
/// `min_gap` is left out, so the id is then usually unknown. A recognized id
/// is resolved to its name; otherwise the name stays empty and the document
/// is queued for name review.
pub fn read_student_id(
    m: &IntensityMatrix,
    record: &CalibrationRecord,
    grid: &IdGridSpec,
    geometry: &SheetGeometry,
    students: &[StudentEntry],
    config: &StudentIdConfig,
) -> (Student, Vec<Overlay>) {
    let size = record.cell_size_px();
    let same_length = {
        let mut lengths = students.iter().map(|s| s.id.chars().count());
        match lengths.next() {
            Some(first) => lengths.all(|l| l == first),
            None => false,
        }
    };

    let mut id = String::new();
    let mut overlays = Vec::new();
    for (position, candidates) in grid.digits.iter().enumerate() {
        if same_length && candidates.len() == 1 {
            id.push(candidates[0]);
            continue;
        }
        let mut dark: Vec<(f32, char)> = Vec::new();
        for (index, &digit) in candidates.iter().enumerate() {
            let (x, y) = grid.cell_mm(position, index, geometry.cell_size_mm);
            let at = record.xy_to_ij(x, y);
            let is_dark = config.cell_tests.iter().any(|t| {
                test_square_color(m, at, size, t.proportion, t.gray_level, 0)
            });
            if is_dark {
                dark.push((cell_blackness(m, at, size), digit));
                overlays.push(Overlay::square(at, size, OverlayColor::Cyan));
            } else {
                overlays.push(Overlay::square(at, size, OverlayColor::Pink));
            }
        }
        dark.sort_by(|a, b| b.0.total_cmp(&a.0));
        match dark.as_slice() {
            [] => {}
            [(_, digit)] => id.push(*digit),
            [(first, digit), (second, _), ..] if first - second > config.min_gap => id.push(*digit),
            _ => tracing::debug!(position, "ambiguous student id position"),
        }
    }

    let name = students
        .iter()
        .find(|s| s.id == id)
        .map(|s| s.name.clone())
        .unwrap_or_default();
    if name.is_empty() {
        tracing::debug!(%id, "student id not recognized");
    }
    (Student { id, name }, overlays)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{calibrate, CalibrationConfig};
    use crate::test_utils::{sample_layout, SheetPainter};

    fn read(sheet: &IntensityMatrix) -> Student {
        let layout = sample_layout();
        let grid = layout.id_grid.as_ref().expect("grid");
        let geometry = SheetGeometry::default();
        let cal = calibrate(sheet, &geometry, &CalibrationConfig::default()).expect("calibration");
        read_student_id(
            &cal.matrix,
            &cal.record,
            grid,
            &geometry,
            &layout.students,
            &StudentIdConfig::default(),
        )
        .0
    }

    #[test]
    fn known_id_resolves_to_name() {
        let layout = sample_layout();
        let grid = layout.id_grid.clone().expect("grid");
        let sheet = SheetPainter::new(4.0)
            .with_id_band(44, 1)
            .with_student_id(&grid, "21")
            .finish();
        let student = read(&sheet);
        assert_eq!(student.id, "21");
        assert_eq!(student.name, "Alan Turing");
    }

    #[test]
    fn unknown_id_keeps_an_empty_name() {
        let layout = sample_layout();
        let grid = layout.id_grid.clone().expect("grid");
        let sheet = SheetPainter::new(4.0)
            .with_id_band(44, 1)
            .with_student_id(&grid, "33")
            .finish();
        let student = read(&sheet);
        assert_eq!(student.id, "33");
        assert!(student.name.is_empty());
    }

    #[test]
    fn blank_grid_reads_nothing() {
        let layout = sample_layout();
        let grid = layout.id_grid.clone().expect("grid");
        let sheet = SheetPainter::new(4.0)
            .with_id_band(44, 1)
            .with_student_id(&grid, "")
            .finish();
        let student = read(&sheet);
        assert!(student.id.is_empty());
        assert!(student.name.is_empty());
    }

    #[test]
    fn single_candidate_positions_are_not_read() {
        let mut layout = sample_layout();
        if let Some(grid) = layout.id_grid.as_mut() {
            grid.digits[0] = vec!['2'];
        }
        let grid = layout.id_grid.clone().expect("grid");
        // only the second position is inked
        let sheet = SheetPainter::new(4.0)
            .with_id_band(44, 1)
            .with_student_id(&grid, " 1")
            .finish();
        let cal = calibrate(&sheet, &SheetGeometry::default(), &CalibrationConfig::default())
            .expect("calibration");
        let (student, _) = read_student_id(
            &cal.matrix,
            &cal.record,
            &grid,
            &SheetGeometry::default(),
            &layout.students,
            &StudentIdConfig::default(),
        );
        assert_eq!(student.id, "21");
        assert_eq!(student.name, "Alan Turing");
    }
}
