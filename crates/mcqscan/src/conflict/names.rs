use std::collections::HashMap;
use std::io::{BufRead, Write};

use crate::model::Student;
use crate::DocumentId;

use super::data_check::first_page_picture;
use super::fuzzy::{closest_id, suggest_name};
use super::review::{Action, Preview, ReviewError, Session};

/// Suggestions offered but not yet accepted, kept across navigation.
pub(crate) type PendingSuggestions = HashMap<DocumentId, String>;

/// Ask the operator for the student of `doc` until a name is confirmed,
/// the document is discarded or the operator navigates away.
pub(crate) fn review_name<R: BufRead, W: Write>(
    session: &mut Session<'_, R, W>,
    doc: DocumentId,
    pending: &mut PendingSuggestions,
) -> Result<Action, ReviewError> {
    let Some(picture) = session.data.documents.get(&doc).and_then(first_page_picture) else {
        return Ok(Action::Next);
    };
    let id = picture.id.clone();
    let current = picture.effective_student().cloned().unwrap_or_default();
    let preview = Preview {
        title: format!("Document {doc}: student identity"),
        image_path: picture.image_path.clone(),
        overlays: Vec::new(),
    };
    session.show(preview)?;

    let console = &mut *session.console;
    console.say(format!("[Document {doc}]"))?;
    if current.is_named() {
        console.say(format!("Please verify student name or ID (current name: {}).", current.name))?;
    } else {
        console.say("No student name found.")?;
    }
    console.say(format!(
        "Commands: {} next document, {} previous document, {} discard this document.",
        Action::NEXT,
        Action::BACK,
        Action::DISCARD
    ))?;
    let mut suggestion = pending.remove(&doc).unwrap_or_default();
    if !suggestion.is_empty() {
        console.say(format!("Suggestion: {suggestion} (write `ok` to validate it)."))?;
    }

    loop {
        let mut input = session.console.ask("Name, ID or command:")?;
        let offered = std::mem::take(&mut suggestion);
        if input.eq_ignore_ascii_case("ok") {
            input = offered.clone();
        }
        match input.as_str() {
            Action::DISCARD => {
                session.discard_document(doc)?;
                return Ok(Action::Next);
            }
            Action::NEXT | Action::BACK => {
                if !offered.is_empty() {
                    pending.insert(doc, offered);
                }
                return Ok(if input == Action::NEXT { Action::Next } else { Action::Back });
            }
            "" => continue,
            _ => {}
        }
        let Some(candidate) = lookup(session, &current, &input, &mut suggestion)? else {
            continue;
        };
        session.console.say(format!("Name: {}", candidate.name))?;
        if session.console.confirm()? {
            tracing::info!(document = doc, student = %candidate.name, "student identity confirmed");
            session.amend_student(&id, candidate)?;
            session.report.reviewed_names.push(doc);
            return Ok(Action::Next);
        }
    }
}

/// Resolve operator input to a student, or print a suggestion and store it
/// in `suggestion`.
fn lookup<R: BufRead, W: Write>(
    session: &mut Session<'_, R, W>,
    current: &Student,
    input: &str,
    suggestion: &mut String,
) -> Result<Option<Student>, ReviewError> {
    let layout = session.layout;
    let students = &layout.students;
    if students.is_empty() {
        return Ok(Some(Student::new(current.id.clone(), input)));
    }
    if let Some(entry) = layout.student_by_id(input).or_else(|| layout.student_by_name(input)) {
        return Ok(Some(Student::new(entry.id.clone(), entry.name.clone())));
    }
    if input.chars().any(|c| c.is_ascii_digit()) {
        session.console.say("Unknown ID.")?;
        if let Some(entry) = closest_id(students, input) {
            session.console.say(format!(
                "Suggestion: {} → {} (write `ok` to validate it).",
                entry.id, entry.name
            ))?;
            *suggestion = entry.id.clone();
        }
    } else {
        session.console.say("Unknown name.")?;
        if let Some(entry) = suggest_name(students, input) {
            session
                .console
                .say(format!("Suggestion: {} (write `ok` to validate it).", entry.name))?;
            *suggestion = entry.name.clone();
        }
    }
    Ok(None)
}
