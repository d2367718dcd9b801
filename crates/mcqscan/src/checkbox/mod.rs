//! Checkbox analyzer.
//!
//! Boxes are located from the layout through the calibration transform,
//! snapped onto their printed border, measured, then classified per document
//! batch (see [`classify_batch`]).

mod adjust;
mod classify;
mod config;
mod status;

pub use adjust::adjust_checkbox;
pub use classify::{classify_batch, measure, BatchThresholds, CheckboxMetrics};
pub use config::{CheckboxConfig, DarkTest};
pub use status::CheckboxStatus;

use crate::calibration::CalibrationRecord;
use crate::exam_layout::CheckboxSpec;
use crate::geometry::Pixel;
use crate::matrix::IntensityMatrix;
use crate::{AnswerNum, QuestionNum};

/// A layout checkbox found on a picture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocatedCheckbox {
    pub question: QuestionNum,
    pub answer: AnswerNum,
    pub position: Pixel,
    pub metrics: CheckboxMetrics,
}

/// Locate and measure every checkbox of one page.
pub fn measure_page(
    m: &IntensityMatrix,
    record: &CalibrationRecord,
    boxes: &[CheckboxSpec],
    config: &CheckboxConfig,
) -> Vec<LocatedCheckbox> {
    let size = record.cell_size_px();
    boxes
        .iter()
        .map(|spec| {
            let nominal = record.xy_to_ij(spec.x_mm, spec.y_mm);
            let position = adjust_checkbox(m, nominal, size, config);
            LocatedCheckbox {
                question: spec.question,
                answer: spec.answer,
                position,
                metrics: measure(m, position, size, config),
            }
        })
        .collect()
}
