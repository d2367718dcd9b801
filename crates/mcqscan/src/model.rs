//! Scan data tree: document -> page -> picture -> question -> answer.
//!
//! Automatic results are never overwritten. Manual corrections live in the
//! `amended` slot of a [`Tracked`] value and shadow the `initial` one.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::calibration::CalibrationRecord;
use crate::checkbox::CheckboxStatus;
use crate::geometry::Pixel;
use crate::identify::Identification;
use crate::{AnswerNum, DocumentId, PageNum, QuestionNum};

/// An automatic value with an optional manual correction.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Tracked<T> {
    initial: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    amended: Option<T>,
}

impl<T> Tracked<T> {
    pub fn new(initial: T) -> Self {
        Self {
            initial,
            amended: None,
        }
    }

    pub fn with_amendment(initial: T, amended: Option<T>) -> Self {
        Self { initial, amended }
    }

    pub fn initial(&self) -> &T {
        &self.initial
    }

    pub fn amended(&self) -> Option<&T> {
        self.amended.as_ref()
    }

    /// Amended value when present, initial value otherwise.
    pub fn effective(&self) -> &T {
        self.amended.as_ref().unwrap_or(&self.initial)
    }

    pub fn is_amended(&self) -> bool {
        self.amended.is_some()
    }

    pub fn amend(&mut self, value: T) {
        self.amended = Some(value);
    }

    pub fn clear_amendment(&mut self) {
        self.amended = None;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, serde::Serialize, serde::Deserialize)]
pub struct Student {
    pub id: String,
    pub name: String,
}

impl Student {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    pub fn is_named(&self) -> bool {
        !self.name.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub number: AnswerNum,
    /// Expected correctness; `None` for a neutralized answer.
    pub is_correct: Option<bool>,
    pub position: Pixel,
    pub state: Tracked<CheckboxStatus>,
}

impl Answer {
    pub fn is_checked(&self) -> bool {
        self.state.effective().seems_checked()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    pub number: QuestionNum,
    pub answers: BTreeMap<AnswerNum, Answer>,
}

impl Question {
    pub fn checked(&self) -> impl Iterator<Item = AnswerNum> + '_ {
        self.answers.values().filter(|a| a.is_checked()).map(|a| a.number)
    }
}

/// Stable identity of a picture: input file hash and page index in that file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct PictureId {
    pub file_hash: String,
    pub index: usize,
}

impl PictureId {
    pub fn new(file_hash: impl Into<String>, index: usize) -> Self {
        Self {
            file_hash: file_hash.into(),
            index,
        }
    }
}

impl std::fmt::Display for PictureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.file_hash, self.index)
    }
}

/// Why a picture is excluded from the results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Corner squares missing or inconsistent.
    CalibrationFailed,
    IdBandNotFound,
    /// The decoded document id is not in the exam layout.
    UnknownDocument,
    /// The page could not be rendered.
    Unreadable,
    /// Another picture of the same page was kept.
    Duplicate,
    /// The operator discarded the whole document.
    Discarded,
}

impl SkipReason {
    pub const ALL: [SkipReason; 6] = [
        Self::CalibrationFailed,
        Self::IdBandNotFound,
        Self::UnknownDocument,
        Self::Unreadable,
        Self::Duplicate,
        Self::Discarded,
    ];

    pub const fn code(self) -> &'static str {
        match self {
            Self::CalibrationFailed => "calibration_failed",
            Self::IdBandNotFound => "id_band_not_found",
            Self::UnknownDocument => "unknown_document",
            Self::Unreadable => "unreadable",
            Self::Duplicate => "duplicate",
            Self::Discarded => "discarded",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.code() == code)
    }

    /// Set by an operator decision (fix tree) rather than by extraction.
    pub const fn is_manual(self) -> bool {
        matches!(self, Self::Duplicate | Self::Discarded)
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Content-equivalence key: two pictures with equal keys carry the same
/// information.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentKey {
    pub document_id: DocumentId,
    pub page: PageNum,
    pub student: Option<Student>,
    pub checked: Vec<(QuestionNum, AnswerNum, bool)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Picture {
    pub id: PictureId,
    pub calibration: CalibrationRecord,
    pub identification: Identification,
    pub questions: BTreeMap<QuestionNum, Question>,
    /// Only set on page 1 when the layout has a student id grid or a
    /// student was amended.
    pub student: Option<Tracked<Student>>,
    /// Operator skip (duplicate or discarded); the data is kept.
    pub skip: Option<SkipReason>,
    /// Rectified picture on disk.
    pub image_path: PathBuf,
}

impl Picture {
    pub fn is_used(&self) -> bool {
        self.skip.is_none()
    }

    pub fn answers(&self) -> impl Iterator<Item = (QuestionNum, &Answer)> + '_ {
        self.questions
            .values()
            .flat_map(|q| q.answers.values().map(move |a| (q.number, a)))
    }

    /// Some answer still has a `PROBABLY_*` effective state.
    pub fn needs_review(&self) -> bool {
        self.answers().any(|(_, a)| a.state.effective().needs_review())
    }

    pub fn effective_student(&self) -> Option<&Student> {
        self.student.as_ref().map(Tracked::effective)
    }

    pub fn content_key(&self) -> ContentKey {
        ContentKey {
            document_id: self.identification.document_id,
            page: self.identification.page,
            student: self.effective_student().cloned(),
            checked: self
                .answers()
                .map(|(q, a)| (q, a.number, a.is_checked()))
                .collect(),
        }
    }

    /// Effective statuses keyed by `(question, answer)`.
    pub fn effective_states(&self) -> BTreeMap<(QuestionNum, AnswerNum), CheckboxStatus> {
        self.answers()
            .map(|(q, a)| ((q, a.number), *a.state.effective()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub number: PageNum,
    pub pictures: Vec<Picture>,
}

impl Page {
    pub fn used_pictures(&self) -> impl Iterator<Item = &Picture> + '_ {
        self.pictures.iter().filter(|p| p.is_used())
    }

    /// The single used picture, if there is exactly one.
    pub fn picture(&self) -> Option<&Picture> {
        let mut used = self.used_pictures();
        match (used.next(), used.next()) {
            (Some(p), None) => Some(p),
            _ => None,
        }
    }

    pub fn picture_mut(&mut self, id: &PictureId) -> Option<&mut Picture> {
        self.pictures.iter_mut().find(|p| &p.id == id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub pages: BTreeMap<PageNum, Page>,
}

impl Document {
    /// At least one of its pictures is used.
    pub fn is_active(&self) -> bool {
        self.pages.values().any(|p| p.used_pictures().next().is_some())
    }

    pub fn pictures(&self) -> impl Iterator<Item = &Picture> + '_ {
        self.pages.values().flat_map(|p| p.pictures.iter())
    }

    /// Student of the used page-1 picture.
    pub fn student(&self) -> Option<&Tracked<Student>> {
        self.pages
            .get(&1)?
            .used_pictures()
            .find_map(|p| p.student.as_ref())
    }

    /// Question numbers present on used pictures.
    pub fn answered_questions(&self) -> BTreeSet<QuestionNum> {
        self.pages
            .values()
            .flat_map(|p| p.used_pictures())
            .flat_map(|p| p.questions.keys().copied())
            .collect()
    }
}

/// Everything loaded from the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanData {
    pub documents: BTreeMap<DocumentId, Document>,
    /// Pictures excluded by extraction, with the reason.
    pub skipped: Vec<(PictureId, SkipReason)>,
}

impl ScanData {
    pub fn active_documents(&self) -> impl Iterator<Item = &Document> + '_ {
        self.documents.values().filter(|d| d.is_active())
    }

    pub fn picture(&self, id: &PictureId) -> Option<&Picture> {
        self.documents
            .values()
            .flat_map(|d| d.pictures())
            .find(|p| &p.id == id)
    }

    pub fn picture_mut(&mut self, id: &PictureId) -> Option<&mut Picture> {
        self.documents
            .values_mut()
            .flat_map(|d| d.pages.values_mut())
            .flat_map(|p| p.pictures.iter_mut())
            .find(|p| &p.id == id)
    }
}
