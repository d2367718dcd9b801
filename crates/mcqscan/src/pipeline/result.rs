use thiserror::Error;

use crate::calibration::{CalibrationError, CalibrationRecord, CalibrationRejectReason};
use crate::checkbox::{CheckboxStatus, LocatedCheckbox};
use crate::debug_dump::{CheckboxDebug, Overlay, OverlayColor, PictureDebug};
use crate::identify::Identification;
use crate::matrix::IntensityMatrix;
use crate::model::{PictureId, SkipReason, Student};
use crate::DocumentId;

/// Why a single picture could not be used.
#[derive(Debug, Error)]
pub enum PictureRejected {
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error("document {} page {} is not in the exam layout", .0.document_id, .0.page)]
    UnknownDocument(Identification),
}

impl PictureRejected {
    pub fn skip_reason(&self) -> SkipReason {
        match self {
            Self::Calibration(e) if e.reason == CalibrationRejectReason::IdBandNotFound => {
                SkipReason::IdBandNotFound
            }
            Self::Calibration(_) => SkipReason::CalibrationFailed,
            Self::UnknownDocument(_) => SkipReason::UnknownDocument,
        }
    }

    pub fn overlays(&self) -> &[Overlay] {
        match self {
            Self::Calibration(e) => &e.overlays,
            Self::UnknownDocument(_) => &[],
        }
    }
}

/// In-memory analysis of one picture.
#[derive(Debug, Clone)]
pub struct PictureAnalysis {
    /// Rectified picture; positions below refer to it.
    pub matrix: IntensityMatrix,
    pub calibration: CalibrationRecord,
    pub identification: Identification,
    /// Checkboxes with their status, classified as a single-page batch.
    pub checkboxes: Vec<(LocatedCheckbox, CheckboxStatus)>,
    /// Read from the id grid, on page 1 only.
    pub student: Option<Student>,
    pub overlays: Vec<Overlay>,
}

impl PictureAnalysis {
    /// Checked `(question, answer)` pairs.
    pub fn checked(&self) -> Vec<(u32, u32)> {
        self.checkboxes
            .iter()
            .filter(|(_, s)| s.seems_checked())
            .map(|(b, _)| (b.question, b.answer))
            .collect()
    }

    pub fn debug_dump(&self, picture: impl Into<String>) -> PictureDebug {
        let mut dump = PictureDebug::new(picture, self.matrix.cols(), self.matrix.rows());
        dump.calibration = Some(self.calibration.clone());
        dump.identification = Some(self.identification);
        dump.checkboxes = self
            .checkboxes
            .iter()
            .map(|(b, status)| CheckboxDebug {
                question: b.question,
                answer: b.answer,
                position: b.position,
                status: *status,
            })
            .collect();
        dump.overlays = self.overlays.clone();
        let size = self.calibration.cell_size_px();
        dump.overlays.extend(
            self.checkboxes
                .iter()
                .map(|(b, s)| Overlay::square(b.position, size, OverlayColor::for_checkbox(*s, false))),
        );
        dump
    }
}

/// A picture excluded during extraction.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SkippedPicture {
    pub picture: PictureId,
    pub reason: SkipReason,
    pub detail: String,
}

/// What a scan run did.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ScanSummary {
    pub inputs: usize,
    /// Pictures extracted during this run.
    pub extracted: usize,
    /// Pictures found complete in the cache.
    pub cached: usize,
    /// Pictures skipped during this run.
    pub skipped: Vec<SkippedPicture>,
    /// Documents whose checkboxes were (re)classified.
    pub analyzed_documents: Vec<DocumentId>,
    /// Cache directories removed because their input is gone.
    pub pruned: Vec<String>,
}
