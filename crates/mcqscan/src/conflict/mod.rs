//! Conflict resolution over loaded scan data.
//!
//! Two ordered phases:
//! 1. integrity: duplicate pages (identical ones disabled automatically,
//!    differing ones picked by the operator), missing pages and questions;
//! 2. data check: unnamed documents, duplicate names and pages with
//!    uncertain checkboxes, reviewed one by one until none is left.
//!
//! Every decision is written to the store's fix tree as soon as it is
//! confirmed, so an interrupted session resumes where it stopped.

mod answers;
mod data_check;
mod fuzzy;
mod integrity;
mod names;
mod review;

use std::collections::BTreeMap;
use std::io::{BufRead, Write};

pub use data_check::{check_data, DataCheckReport};
pub use fuzzy::{closest_id, levenshtein, suggest_name};
pub use integrity::{check_integrity, redundant_pictures, IntegrityReport};
pub use review::{Action, Console, NoPreview, PngPreview, Preview, PreviewSink, ReviewError};

use crate::error::ScanError;
use crate::exam_layout::ExamLayout;
use crate::model::{PictureId, ScanData};
use crate::store::ScanStore;
use crate::{DocumentId, PageNum, QuestionNum};

use names::PendingSuggestions;
use review::Session;

/// What a resolution run decided.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ResolutionReport {
    /// Duplicates disabled because an identical picture was kept.
    pub auto_resolved: Vec<PictureId>,
    /// Versions kept by the operator.
    pub manual_picks: Vec<(DocumentId, PageNum, PictureId)>,
    pub missing_pages: BTreeMap<DocumentId, Vec<PageNum>>,
    pub missing_questions: BTreeMap<DocumentId, Vec<QuestionNum>>,
    pub reviewed_names: Vec<DocumentId>,
    pub reviewed_pages: Vec<(DocumentId, PageNum)>,
    pub discarded: Vec<DocumentId>,
}

impl ResolutionReport {
    /// Fails when questions are still missing; results must not be scored.
    pub fn ensure_complete(&self) -> Result<(), ScanError> {
        if self.missing_questions.is_empty() {
            Ok(())
        } else {
            Err(ScanError::MissingQuestions {
                documents: self.missing_questions.clone(),
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReviewItem {
    Name(DocumentId),
    Answers(DocumentId, PageNum),
}

/// Run both phases, asking `console` whenever a decision is needed.
///
/// Missing questions do not stop the review; they are listed in the report
/// and turned into an error by [`ResolutionReport::ensure_complete`].
pub fn resolve<R: BufRead, W: Write>(
    store: &ScanStore,
    layout: &ExamLayout,
    data: &mut ScanData,
    console: &mut Console<R, W>,
    preview: &mut dyn PreviewSink,
) -> Result<ResolutionReport, ReviewError> {
    let integrity = check_integrity(data, layout);
    let mut session = Session {
        store,
        layout,
        data,
        console,
        preview,
        report: ResolutionReport::default(),
    };
    integrity::resolve_duplicates(&mut session, &integrity.duplicates)?;
    review_data(&mut session)?;

    let Session { data, mut report, .. } = session;
    let remaining = check_integrity(data, layout);
    for (doc, pages) in &remaining.missing_pages {
        tracing::warn!(document = doc, ?pages, "pages missing");
    }
    for (doc, questions) in &remaining.missing_questions {
        tracing::error!(document = doc, ?questions, "questions missing");
    }
    report.missing_pages = remaining.missing_pages;
    report.missing_questions = remaining.missing_questions;
    store.write_index(data)?;
    Ok(report)
}

/// Review open items in order; start over while the data check finds any.
fn review_data<R: BufRead, W: Write>(session: &mut Session<'_, R, W>) -> Result<(), ReviewError> {
    let mut pending = PendingSuggestions::new();
    loop {
        let check = check_data(session.data);
        let items: Vec<ReviewItem> = check
            .names_to_review()
            .into_iter()
            .map(ReviewItem::Name)
            .chain(check.ambiguous.iter().map(|&(doc, page)| ReviewItem::Answers(doc, page)))
            .collect();
        if items.is_empty() {
            return Ok(());
        }
        tracing::info!(items = items.len(), "review pass");
        for (name, docs) in &check.duplicate_names {
            let docs: Vec<String> = docs.iter().map(|d| d.to_string()).collect();
            session
                .console
                .say(format!("Name {name} is used by documents {}.", docs.join(", ")))?;
        }

        let mut position = 0;
        while let Some(&item) = items.get(position) {
            let action = match item {
                ReviewItem::Name(doc) => names::review_name(session, doc, &mut pending)?,
                ReviewItem::Answers(doc, page) => answers::review_answers(session, doc, page)?,
            };
            position = match action {
                Action::Next => position + 1,
                Action::Back => position.saturating_sub(1),
            };
        }
    }
}
