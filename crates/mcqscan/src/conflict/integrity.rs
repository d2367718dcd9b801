use std::collections::{BTreeMap, HashSet};
use std::io::{BufRead, Write};

use crate::debug_dump::{Overlay, OverlayColor};
use crate::exam_layout::ExamLayout;
use crate::model::{Page, Picture, PictureId, ScanData, SkipReason};
use crate::{DocumentId, PageNum, QuestionNum};

use super::review::{Preview, ReviewError, Session};

/// Structural problems of the scan data, before any correction.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct IntegrityReport {
    /// Pages with two or more used pictures.
    pub duplicates: Vec<(DocumentId, PageNum)>,
    /// Layout pages without a used picture. Not fatal.
    pub missing_pages: BTreeMap<DocumentId, Vec<PageNum>>,
    /// Layout questions absent from every used picture of the document.
    pub missing_questions: BTreeMap<DocumentId, Vec<QuestionNum>>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.duplicates.is_empty() && self.missing_pages.is_empty() && self.missing_questions.is_empty()
    }
}

/// Inspect active documents against the layout. Does not mutate anything.
pub fn check_integrity(data: &ScanData, layout: &ExamLayout) -> IntegrityReport {
    let mut report = IntegrityReport::default();
    for doc in data.active_documents() {
        for page in doc.pages.values() {
            if page.used_pictures().nth(1).is_some() {
                report.duplicates.push((doc.id, page.number));
            }
        }
        let missing_pages: Vec<PageNum> = layout
            .pages(doc.id)
            .into_iter()
            .filter(|n| doc.pages.get(n).map_or(true, |p| p.used_pictures().next().is_none()))
            .collect();
        if !missing_pages.is_empty() {
            report.missing_pages.insert(doc.id, missing_pages);
        }
        let seen = doc.answered_questions();
        let missing_questions: Vec<QuestionNum> = layout.questions(doc.id).difference(&seen).copied().collect();
        if !missing_questions.is_empty() {
            report.missing_questions.insert(doc.id, missing_questions);
        }
    }
    report
}

/// Used pictures of `page` that repeat the content of an earlier one.
pub fn redundant_pictures(page: &Page) -> Vec<PictureId> {
    let mut seen = HashSet::new();
    page.used_pictures()
        .filter(|p| !seen.insert(p.content_key()))
        .map(|p| p.id.clone())
        .collect()
}

/// Disable content-identical duplicates, then ask the operator to pick a
/// version for every page still holding several used pictures.
pub(crate) fn resolve_duplicates<R: BufRead, W: Write>(
    session: &mut Session<'_, R, W>,
    duplicates: &[(DocumentId, PageNum)],
) -> Result<(), ReviewError> {
    for &(doc, page) in duplicates {
        let redundant = session
            .data
            .documents
            .get(&doc)
            .and_then(|d| d.pages.get(&page))
            .map(redundant_pictures)
            .unwrap_or_default();
        for id in redundant {
            session.set_skip(&id, SkipReason::Duplicate)?;
            tracing::info!(document = doc, page, picture = %id, "identical duplicate disabled");
            session.report.auto_resolved.push(id);
        }
    }
    for &(doc, page) in duplicates {
        let candidates: Vec<Picture> = session
            .data
            .documents
            .get(&doc)
            .and_then(|d| d.pages.get(&page))
            .map(|p| p.used_pictures().cloned().collect())
            .unwrap_or_default();
        if candidates.len() < 2 {
            continue;
        }
        let kept = select_version(session, doc, page, &candidates)?;
        for (i, picture) in candidates.iter().enumerate() {
            if i == kept {
                session.keep(&picture.id)?;
            } else {
                session.set_skip(&picture.id, SkipReason::Duplicate)?;
            }
        }
        session.report.manual_picks.push((doc, page, candidates[kept].id.clone()));
    }
    Ok(())
}

fn select_version<R: BufRead, W: Write>(
    session: &mut Session<'_, R, W>,
    doc: DocumentId,
    page: PageNum,
    candidates: &[Picture],
) -> Result<usize, ReviewError> {
    session
        .console
        .say(format!("Document {doc}: please select a version for page {page}."))?;
    for (i, picture) in candidates.iter().enumerate() {
        session.console.say(format!("[{}] {}", i + 1, picture.id))?;
        session.show(version_preview(doc, page, i + 1, picture))?;
    }
    let prompt = format!("Select version [1-{}]:", candidates.len());
    loop {
        match session.console.ask(&prompt)?.parse::<usize>() {
            Ok(k) if (1..=candidates.len()).contains(&k) => return Ok(k - 1),
            _ => session.console.say("Invalid value.")?,
        }
    }
}

fn version_preview(doc: DocumentId, page: PageNum, rank: usize, picture: &Picture) -> Preview {
    let size = picture.calibration.cell_size_px();
    Preview {
        title: format!("Document {doc} page {page}: version {rank}"),
        image_path: picture.image_path.clone(),
        overlays: picture
            .answers()
            .map(|(_, a)| {
                let state = a.state.effective();
                Overlay::square(a.position, size, OverlayColor::for_checkbox(*state, a.state.is_amended()))
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::tests::{picture, scan_data};
    use crate::test_utils::sample_layout;

    #[test]
    fn complete_data_is_clean() {
        let layout = sample_layout();
        let data = scan_data(vec![picture("a", 0, 1, &[]), picture("a", 1, 2, &[])]);
        assert!(check_integrity(&data, &layout).is_clean());
    }

    #[test]
    fn missing_page_and_its_questions_are_reported() {
        let layout = sample_layout();
        let data = scan_data(vec![picture("a", 0, 1, &[])]);
        let report = check_integrity(&data, &layout);
        assert_eq!(report.missing_pages.get(&44), Some(&vec![2]));
        assert_eq!(report.missing_questions.get(&44), Some(&vec![4, 5]));
        assert!(report.duplicates.is_empty());
    }

    #[test]
    fn only_differing_duplicates_survive_deduplication() {
        let layout = sample_layout();
        let data = scan_data(vec![
            picture("a", 0, 1, &[(1, 2)]),
            picture("b", 0, 1, &[(1, 2)]),
            picture("c", 0, 1, &[(1, 3)]),
            picture("a", 1, 2, &[]),
        ]);
        let report = check_integrity(&data, &layout);
        assert_eq!(report.duplicates, vec![(44, 1)]);
        let page = &data.documents[&44].pages[&1];
        assert_eq!(redundant_pictures(page), vec![PictureId::new("b", 0)]);
    }

    #[test]
    fn inactive_documents_are_ignored() {
        let layout = sample_layout();
        let mut data = scan_data(vec![picture("a", 0, 1, &[])]);
        for p in data.documents.get_mut(&44).into_iter().flat_map(|d| d.pages.values_mut()) {
            for pic in &mut p.pictures {
                pic.skip = Some(SkipReason::Discarded);
            }
        }
        assert!(check_integrity(&data, &layout).is_clean());
    }
}
