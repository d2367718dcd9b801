use std::collections::{BTreeMap, HashSet};

use crate::model::{Document, Page, Picture, ScanData};
use crate::{DocumentId, PageNum};

/// Open review items of structurally sound data.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct DataCheckReport {
    /// Documents whose page 1 carries no student name.
    pub unnamed: Vec<DocumentId>,
    /// Student name -> documents sharing it.
    pub duplicate_names: BTreeMap<String, Vec<DocumentId>>,
    /// Pages with a checkbox still in a `PROBABLY_*` state.
    pub ambiguous: Vec<(DocumentId, PageNum)>,
}

impl DataCheckReport {
    pub fn is_clean(&self) -> bool {
        self.unnamed.is_empty() && self.duplicate_names.is_empty() && self.ambiguous.is_empty()
    }

    /// Documents needing a name review, unnamed first, each once.
    pub fn names_to_review(&self) -> Vec<DocumentId> {
        let mut seen = HashSet::new();
        self.unnamed
            .iter()
            .chain(self.duplicate_names.values().flatten())
            .copied()
            .filter(|doc| seen.insert(*doc))
            .collect()
    }
}

/// The used page-1 picture, which carries the student identity.
pub(crate) fn first_page_picture(doc: &Document) -> Option<&Picture> {
    doc.pages.get(&1).and_then(Page::picture)
}

pub fn check_data(data: &ScanData) -> DataCheckReport {
    let mut report = DataCheckReport::default();
    let mut by_name: BTreeMap<String, Vec<&Document>> = BTreeMap::new();
    for doc in data.active_documents() {
        if let Some(picture) = first_page_picture(doc) {
            match picture.effective_student().filter(|s| s.is_named()) {
                Some(student) => by_name.entry(student.name.clone()).or_default().push(doc),
                None => report.unnamed.push(doc.id),
            }
        }
        for page in doc.pages.values() {
            if page.picture().is_some_and(Picture::needs_review) {
                report.ambiguous.push((doc.id, page.number));
            }
        }
    }
    for (name, docs) in by_name {
        if docs.len() >= 2 && !are_confirmed_homonyms(&docs) {
            report.duplicate_names.insert(name, docs.iter().map(|d| d.id).collect());
        }
    }
    report
}

/// Every document has an operator-confirmed identity and no student id is
/// shared. Confirmed names without an id (no student table) count as
/// distinct students.
fn are_confirmed_homonyms(docs: &[&Document]) -> bool {
    let mut ids = HashSet::new();
    docs.iter().all(|doc| {
        doc.student()
            .and_then(|s| s.amended())
            .is_some_and(|s| s.id.is_empty() || ids.insert(s.id.clone()))
    })
}
