use std::collections::BTreeSet;
use std::io::{BufRead, Write};

use crate::checkbox::CheckboxStatus;
use crate::debug_dump::{Overlay, OverlayColor};
use crate::model::{Page, Picture, Question};
use crate::store::CheckboxStates;
use crate::{AnswerNum, DocumentId, PageNum, QuestionNum};

use super::review::{Action, Console, Preview, ReviewError, Session};

const ENTER_COMMAND: &str = "Write <, >, or just press ENTER to review current document's answers:";
const IS_CORRECT: &str = "Is this correct ? [(y)es/(N)o]";
const SELECT_QUESTION: &str = "Write a question number, or 0 to escape:";
const EDIT_ANSWERS: &str =
    "Add or remove answers (Example: +2 -1 -4 to add answer 2, and remove answers 1 and 4):";

/// Working copy of a page's states during review.
struct PageEdit {
    states: CheckboxStates,
    /// Answers changed by the operator, now or in an earlier session.
    edited: BTreeSet<(QuestionNum, AnswerNum)>,
}

impl PageEdit {
    fn new(picture: &Picture) -> Self {
        Self {
            states: picture.effective_states(),
            edited: picture
                .answers()
                .filter(|(_, a)| a.state.is_amended())
                .map(|(q, a)| (q, a.number))
                .collect(),
        }
    }

    fn set(&mut self, key: (QuestionNum, AnswerNum), status: CheckboxStatus) {
        self.states.insert(key, status);
        self.edited.insert(key);
    }

    fn is_checked(&self, key: (QuestionNum, AnswerNum)) -> bool {
        self.states.get(&key).is_some_and(|s| s.seems_checked())
    }

    /// Definite state for every answer of the page.
    fn settled(&self) -> CheckboxStates {
        self.states.iter().map(|(k, s)| (*k, s.settled())).collect()
    }

    fn preview(&self, doc: DocumentId, page: PageNum, picture: &Picture) -> Preview {
        let size = picture.calibration.cell_size_px();
        Preview {
            title: format!("Document {doc} page {page}: answers"),
            image_path: picture.image_path.clone(),
            overlays: picture
                .answers()
                .map(|(q, a)| {
                    let key = (q, a.number);
                    let status = self.states.get(&key).copied().unwrap_or(*a.state.effective());
                    Overlay::square(a.position, size, OverlayColor::for_checkbox(status, self.edited.contains(&key)))
                })
                .collect(),
        }
    }
}

/// Let the operator check the detected answers of one page and correct
/// them question by question.
pub(crate) fn review_answers<R: BufRead, W: Write>(
    session: &mut Session<'_, R, W>,
    doc: DocumentId,
    page: PageNum,
) -> Result<Action, ReviewError> {
    let Some(document) = session.data.documents.get(&doc).filter(|d| d.is_active()) else {
        return Ok(Action::Next);
    };
    let Some(picture) = document.pages.get(&page).and_then(Page::picture).cloned() else {
        return Ok(Action::Next);
    };
    let name = document
        .student()
        .map(|s| s.effective().name.clone())
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| "(unnamed)".to_string());

    session
        .console
        .say(format!("Ambiguous answers for student {name} (document {doc}, page {page})."))?;
    session
        .console
        .say("Tip: green and magenta boxes were not detected with certainty.")?;
    match session.console.ask(ENTER_COMMAND)?.as_str() {
        Action::NEXT => return Ok(Action::Next),
        Action::BACK => return Ok(Action::Back),
        _ => {}
    }

    let mut edit = PageEdit::new(&picture);
    loop {
        session.show(edit.preview(doc, page, &picture))?;
        if matches!(session.console.ask(IS_CORRECT)?.to_lowercase().as_str(), "y" | "yes") {
            break;
        }
        loop {
            let selected = session.console.ask(SELECT_QUESTION)?;
            if selected == "0" {
                break;
            }
            let Ok(number) = selected.parse::<QuestionNum>() else {
                session.console.say("Invalid value.")?;
                continue;
            };
            let Some(question) = picture.questions.get(&number) else {
                session.console.say("Invalid number.")?;
                continue;
            };
            let edits = session.console.ask(EDIT_ANSWERS)?;
            apply_edits(session.console, question, &mut edit, &edits)?;
            session.show(edit.preview(doc, page, &picture))?;
        }
    }

    session.amend_states(&picture.id, &edit.settled())?;
    tracing::info!(document = doc, page, "answers reviewed");
    session.report.reviewed_pages.push((doc, page));
    Ok(Action::Next)
}

/// Apply `+n`/`-n` tokens in order. A malformed token stops the line.
fn apply_edits<R: BufRead, W: Write>(
    console: &mut Console<R, W>,
    question: &Question,
    edit: &mut PageEdit,
    line: &str,
) -> Result<(), ReviewError> {
    for token in line.split_whitespace() {
        let mut chars = token.chars();
        let op = chars.next();
        let Ok(answer) = chars.as_str().parse::<AnswerNum>() else {
            console.say("Invalid value.")?;
            return Ok(());
        };
        if !matches!(op, Some('+' | '-')) {
            console.say(format!("Invalid operation: {token:?}"))?;
            continue;
        }
        if !question.answers.contains_key(&answer) {
            console.say("Invalid number.")?;
            return Ok(());
        }
        let key = (question.number, answer);
        match (op, edit.is_checked(key)) {
            (Some('+'), true) => console.say(format!("Warning: answer {answer} is already marked as checked."))?,
            (Some('+'), false) => {
                edit.set(key, CheckboxStatus::Checked);
                console.say(format!("Answer {answer} checked."))?;
            }
            (_, true) => {
                edit.set(key, CheckboxStatus::Unchecked);
                console.say(format!("Answer {answer} unchecked."))?;
            }
            (_, false) => console.say(format!("Warning: answer {answer} was not marked as checked."))?,
        }
    }
    Ok(())
}
