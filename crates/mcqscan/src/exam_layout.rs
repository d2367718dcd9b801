//! Exam layout: where every checkbox sits on every page of every document.
//!
//! Layout JSON follows the `mcqscan.exam.v1` schema. It is produced by the
//! document compiler; this crate only reads and validates it.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use crate::error::ScanError;
use crate::{AnswerNum, DocumentId, PageNum, QuestionNum};

pub const EXAM_SCHEMA_V1: &str = "mcqscan.exam.v1";

/// One printed checkbox. `(x_mm, y_mm)` is its top-left corner measured
/// from the bottom-left paper corner.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CheckboxSpec {
    pub question: QuestionNum,
    pub answer: AnswerNum,
    pub x_mm: f64,
    pub y_mm: f64,
    /// `None` marks a neutralized answer.
    #[serde(default)]
    pub correct: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StudentEntry {
    pub id: String,
    pub name: String,
}

impl StudentEntry {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Per-digit identity grid printed on page 1.
///
/// Row `p` holds the candidate characters of position `p`; cells are laid
/// out left to right from `(x_mm, y_mm)`, one row per position going down.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IdGridSpec {
    pub x_mm: f64,
    pub y_mm: f64,
    pub digits: Vec<Vec<char>>,
}

impl IdGridSpec {
    /// Top-left corner (mm) of candidate `index` at `position`.
    pub fn cell_mm(&self, position: usize, index: usize, cell_size_mm: f64) -> (f64, f64) {
        (
            self.x_mm + index as f64 * cell_size_mm,
            self.y_mm - position as f64 * cell_size_mm,
        )
    }
}

/// Validated exam layout.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExamLayout {
    pub schema: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Document id -> page number -> checkboxes of that page.
    pub documents: BTreeMap<DocumentId, BTreeMap<PageNum, Vec<CheckboxSpec>>>,
    /// Student identity table.
    #[serde(default)]
    pub students: Vec<StudentEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_grid: Option<IdGridSpec>,
}

impl ExamLayout {
    /// Load and validate a layout from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, ScanError> {
        let data = std::fs::read_to_string(path).map_err(|e| ScanError::io(path, e))?;
        let layout: Self = serde_json::from_str(&data).map_err(|e| ScanError::json(path, e))?;
        layout.validate()?;
        Ok(layout)
    }

    pub fn validate(&self) -> Result<(), ScanError> {
        if self.schema != EXAM_SCHEMA_V1 {
            return Err(ScanError::Layout(format!(
                "unsupported exam schema '{}' (expected '{}')",
                self.schema, EXAM_SCHEMA_V1
            )));
        }
        if self.documents.is_empty() {
            return Err(ScanError::Layout("no document declared".to_string()));
        }
        for (doc, pages) in &self.documents {
            if pages.is_empty() {
                return Err(ScanError::Layout(format!("document {doc} has no page")));
            }
            let mut seen = HashSet::new();
            // a page without checkboxes (cover sheet, text only) is valid
            for b in pages.values().flatten() {
                if !b.x_mm.is_finite() || !b.y_mm.is_finite() {
                    return Err(ScanError::Layout(format!(
                        "document {doc} question {} answer {}: coordinates must be finite",
                        b.question, b.answer
                    )));
                }
                if !seen.insert((b.question, b.answer)) {
                    return Err(ScanError::Layout(format!(
                        "document {doc}: duplicate checkbox for question {} answer {}",
                        b.question, b.answer
                    )));
                }
            }
        }
        let mut ids = HashSet::new();
        for s in &self.students {
            if s.id.trim().is_empty() || s.name.trim().is_empty() {
                return Err(ScanError::Layout("student id and name must not be empty".to_string()));
            }
            if !ids.insert(s.id.as_str()) {
                return Err(ScanError::Layout(format!("duplicate student id '{}'", s.id)));
            }
        }
        if let Some(grid) = &self.id_grid {
            if grid.digits.is_empty() || grid.digits.iter().any(Vec::is_empty) {
                return Err(ScanError::Layout(
                    "id_grid needs at least one candidate per position".to_string(),
                ));
            }
            if !grid.x_mm.is_finite() || !grid.y_mm.is_finite() {
                return Err(ScanError::Layout("id_grid coordinates must be finite".to_string()));
            }
        }
        Ok(())
    }

    pub fn document_ids(&self) -> impl Iterator<Item = DocumentId> + '_ {
        self.documents.keys().copied()
    }

    pub fn has_document(&self, doc: DocumentId) -> bool {
        self.documents.contains_key(&doc)
    }

    pub fn has_page(&self, doc: DocumentId, page: PageNum) -> bool {
        self.documents
            .get(&doc)
            .is_some_and(|pages| pages.contains_key(&page))
    }

    /// Page numbers declared for a document, ascending.
    pub fn pages(&self, doc: DocumentId) -> Vec<PageNum> {
        self.documents
            .get(&doc)
            .map(|pages| pages.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn checkboxes(&self, doc: DocumentId, page: PageNum) -> &[CheckboxSpec] {
        self.documents
            .get(&doc)
            .and_then(|pages| pages.get(&page))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Question numbers declared for a document, over all its pages.
    pub fn questions(&self, doc: DocumentId) -> BTreeSet<QuestionNum> {
        self.documents
            .get(&doc)
            .into_iter()
            .flat_map(|pages| pages.values())
            .flatten()
            .map(|b| b.question)
            .collect()
    }

    pub fn student_by_id(&self, id: &str) -> Option<&StudentEntry> {
        self.students.iter().find(|s| s.id == id.trim())
    }

    /// Case-insensitive lookup on the full name.
    pub fn student_by_name(&self, name: &str) -> Option<&StudentEntry> {
        let wanted = name.trim().to_lowercase();
        self.students.iter().find(|s| s.name.to_lowercase() == wanted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_layout;

    #[test]
    fn sample_layout_is_valid_and_queryable() {
        let layout = sample_layout();
        layout.validate().expect("valid layout");
        assert_eq!(layout.pages(44), vec![1, 2]);
        assert!(layout.pages(45).is_empty());
        assert!(layout.has_page(44, 2));
        assert!(!layout.has_page(44, 3));
        assert_eq!(layout.checkboxes(44, 1).len(), 12);
        assert_eq!(
            layout.questions(44).into_iter().collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5]
        );
        assert_eq!(layout.student_by_id("21").map(|s| s.name.as_str()), Some("Alan Turing"));
        assert_eq!(layout.student_by_name(" grace HOPPER").map(|s| s.id.as_str()), Some("30"));
    }

    #[test]
    fn layout_json_uses_numeric_keys() {
        let json = r#"{
            "schema": "mcqscan.exam.v1",
            "documents": {
                "7": { "1": [
                    {"question": 1, "answer": 1, "x_mm": 50.0, "y_mm": 200.0, "correct": true},
                    {"question": 1, "answer": 2, "x_mm": 60.0, "y_mm": 200.0, "correct": null}
                ] }
            }
        }"#;
        let layout: ExamLayout = serde_json::from_str(json).expect("parse layout");
        layout.validate().expect("valid layout");
        assert_eq!(layout.checkboxes(7, 1)[1].correct, None);
        assert!(layout.students.is_empty());
    }

    #[test]
    fn page_without_checkboxes_is_valid() {
        let mut layout = sample_layout();
        if let Some(pages) = layout.documents.get_mut(&44) {
            pages.insert(3, Vec::new());
        }
        layout.validate().expect("cover page is valid");
        assert_eq!(layout.pages(44), vec![1, 2, 3]);
        assert!(layout.has_page(44, 3));
        assert!(layout.checkboxes(44, 3).is_empty());
        assert_eq!(layout.questions(44).len(), 5);
    }

    #[test]
    fn validation_rejects_bad_layouts() {
        let mut wrong_schema = sample_layout();
        wrong_schema.schema = "mcqscan.exam.v0".to_string();
        assert!(wrong_schema.validate().is_err());

        let mut duplicate = sample_layout();
        if let Some(boxes) = duplicate.documents.get_mut(&44).and_then(|p| p.get_mut(&2)) {
            boxes.push(CheckboxSpec {
                question: 1,
                answer: 1,
                x_mm: 10.0,
                y_mm: 10.0,
                correct: None,
            });
        }
        let err = duplicate.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate checkbox"));

        let mut no_pages = sample_layout();
        no_pages.documents.insert(45, BTreeMap::new());
        assert!(no_pages.validate().is_err());

        let mut nan = sample_layout();
        if let Some(boxes) = nan.documents.get_mut(&44).and_then(|p| p.get_mut(&1)) {
            boxes[0].x_mm = f64::NAN;
        }
        assert!(nan.validate().is_err());
    }

    #[test]
    fn from_json_file_reports_path_on_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("exam.json");
        std::fs::write(&path, "{ not json").expect("write");
        let err = ExamLayout::from_json_file(&path).unwrap_err();
        assert!(matches!(err, ScanError::Json { .. }));

        std::fs::write(&path, serde_json::to_string(&sample_layout()).expect("serialize"))
            .expect("write");
        let layout = ExamLayout::from_json_file(&path).expect("load");
        assert_eq!(layout.students.len(), 3);
    }
}
