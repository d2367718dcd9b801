//! mcqscan: reads scanned multiple-choice answer sheets.
//!
//! Every sheet carries four black calibration squares, an identification
//! band (document id and page number) and a grid of checkboxes. The
//! pipeline stages are:
//!
//! 1. **Calibration** – orientation, corner squares, rotation correction,
//!    scale and id-band anchor.
//! 2. **Identification** – 24-cell band decoded to `(document id, page)`.
//! 3. **Checkboxes** – edge alignment, darkness metrics and a two-pass
//!    classification over all boxes of a document.
//! 4. **Student** – optional digit grid read against the student table.
//! 5. **Store** – every artifact cached per input-file hash, with a parallel
//!    fix tree holding operator corrections.
//! 6. **Conflicts** – duplicate pages, missing pages and questions, then an
//!    interactive review of names and uncertain checkboxes.
//!
//! # Public API
//! - [`Scanner`] as the primary entry point
//! - [`ScanConfig`] and its sections for tuning
//! - [`ExamLayout`] as the description of the printed sheets
//! - [`ScanStore`] and the [`ScanData`] tree it loads
//! - [`Console`] and [`PreviewSink`] for the interactive review

mod api;
mod calibration;
mod checkbox;
mod config;
mod conflict;
mod debug_dump;
mod error;
mod exam_layout;
mod geometry;
mod identify;
mod matrix;
mod model;
mod pipeline;
mod store;
mod student_id;

#[cfg(test)]
pub(crate) mod test_utils;

/// Document identifier decoded from the identification band.
pub type DocumentId = u32;
/// Page number within a document, starting at 1.
pub type PageNum = u32;
pub type QuestionNum = u32;
pub type AnswerNum = u32;

pub use api::Scanner;
pub use calibration::{
    calibrate, Calibrated, CalibrationConfig, CalibrationError, CalibrationRecord, CalibrationRejectContext,
    CalibrationRejectReason,
};
pub use checkbox::{
    adjust_checkbox, classify_batch, measure, measure_page, BatchThresholds, CheckboxConfig, CheckboxMetrics,
    CheckboxStatus, DarkTest, LocatedCheckbox,
};
pub use config::{PipelineConfig, ScanConfig};
pub use conflict::{
    check_data, check_integrity, closest_id, levenshtein, redundant_pictures, resolve, suggest_name, Action, Console,
    DataCheckReport, IntegrityReport, NoPreview, PngPreview, Preview, PreviewSink, ResolutionReport, ReviewError,
};
pub use debug_dump::{render_overlays, CheckboxDebug, Overlay, OverlayColor, PictureDebug, DEBUG_SCHEMA_V1};
pub use error::ScanError;
pub use exam_layout::{CheckboxSpec, ExamLayout, IdGridSpec, StudentEntry, EXAM_SCHEMA_V1};
pub use geometry::{Corner, CornerPositions, PartialCorners, Pixel, SheetGeometry};
pub use identify::{identification_overlays, read_doc_id_and_page, Identification, IdentifyConfig};
pub use matrix::IntensityMatrix;
pub use model::{
    Answer, ContentKey, Document, Page, Picture, PictureId, Question, ScanData, SkipReason, Student, Tracked,
};
pub use pipeline::{
    analyze_picture, collect_inputs, scan, ImageFileSource, PageSource, PictureAnalysis, PictureRejected,
    ScanSummary, SkippedPicture,
};
pub use store::{hash_file, PictureRecord, ScanStore, HASH_LEN};
pub use student_id::{read_student_id, StudentIdConfig};
