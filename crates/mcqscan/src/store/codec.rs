//! Plain-text formats of the small per-picture files.
//!
//! They stay human-editable: an operator can fix a checkbox file by hand.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use crate::checkbox::CheckboxStatus;
use crate::error::ScanError;
use crate::model::{Document, SkipReason, Student};
use crate::{AnswerNum, DocumentId, QuestionNum};

pub(crate) type CheckboxStates = BTreeMap<(QuestionNum, AnswerNum), CheckboxStatus>;

/// One `question, answer: STATUS` line per checkbox.
pub(crate) fn encode_checkboxes(states: &CheckboxStates) -> String {
    let mut out = String::new();
    for ((q, a), status) in states {
        let _ = writeln!(out, "{q}, {a}: {status}");
    }
    out
}

pub(crate) fn decode_checkboxes(path: &Path, text: &str) -> Result<CheckboxStates, ScanError> {
    let mut states = BTreeMap::new();
    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let bad = || ScanError::invalid(path, format!("line {}: expected `q, a: STATUS`, got {line:?}", n + 1));
        let (key, status) = line.split_once(':').ok_or_else(bad)?;
        let (q, a) = key.split_once(',').ok_or_else(bad)?;
        let q: QuestionNum = q.trim().parse().map_err(|_| bad())?;
        let a: AnswerNum = a.trim().parse().map_err(|_| bad())?;
        let status = CheckboxStatus::from_code(status.trim()).ok_or_else(bad)?;
        states.insert((q, a), status);
    }
    Ok(states)
}

/// Name on the first line, id on the second.
pub(crate) fn encode_student(student: &Student) -> String {
    format!("{}\n{}\n", student.name, student.id)
}

pub(crate) fn decode_student(text: &str) -> Student {
    let mut lines = text.lines();
    let name = lines.next().unwrap_or_default().trim();
    let id = lines.next().unwrap_or_default().trim();
    Student::new(id, name)
}

/// Reason code on the first line, free detail after it.
pub(crate) fn encode_skip(reason: SkipReason, detail: &str) -> String {
    if detail.is_empty() {
        format!("{}\n", reason.code())
    } else {
        format!("{}\n{}\n", reason.code(), detail)
    }
}

pub(crate) fn decode_skip(path: &Path, text: &str) -> Result<(SkipReason, String), ScanError> {
    let (code, detail) = text.split_once('\n').unwrap_or((text, ""));
    let reason = SkipReason::from_code(code.trim())
        .ok_or_else(|| ScanError::invalid(path, format!("unknown skip reason {:?}", code.trim())))?;
    Ok((reason, detail.trim().to_string()))
}

/// `document: page: hash/n, hash/n` for every page with a used picture.
pub(crate) fn encode_index<'a>(documents: impl IntoIterator<Item = (&'a DocumentId, &'a Document)>) -> String {
    let mut out = String::new();
    for (doc, document) in documents {
        for (page, p) in &document.pages {
            let ids: Vec<String> = p.used_pictures().map(|pic| pic.id.to_string()).collect();
            if !ids.is_empty() {
                let _ = writeln!(out, "{doc}: {page}: {}", ids.join(", "));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkbox_lines_are_strict() {
        let path = Path::new("checkboxes/0");
        let states = decode_checkboxes(path, "1, 2: CHECKED\n\n3, 1: PROBABLY_UNCHECKED\n").expect("decode");
        assert_eq!(states[&(1, 2)], CheckboxStatus::Checked);
        assert_eq!(states[&(3, 1)], CheckboxStatus::ProbablyUnchecked);
        assert_eq!(encode_checkboxes(&states), "1, 2: CHECKED\n3, 1: PROBABLY_UNCHECKED\n");

        let err = decode_checkboxes(path, "1, 2: MAYBE\n").unwrap_err();
        assert!(err.to_string().contains("line 1"));
        assert!(decode_checkboxes(path, "1 2 CHECKED").is_err());
    }

    #[test]
    fn student_file_has_name_then_id() {
        let s = Student::new("21", "Alan Turing");
        assert_eq!(encode_student(&s), "Alan Turing\n21\n");
        assert_eq!(decode_student("Alan Turing\n21\n"), s);
        assert_eq!(decode_student(""), Student::default());
    }

    #[test]
    fn skip_marker_keeps_detail() {
        let path = Path::new("0.skip");
        let text = encode_skip(SkipReason::CalibrationFailed, "square_missing: TL");
        let (reason, detail) = decode_skip(path, &text).expect("decode");
        assert_eq!(reason, SkipReason::CalibrationFailed);
        assert_eq!(detail, "square_missing: TL");
        assert_eq!(decode_skip(path, "duplicate").expect("decode").0, SkipReason::Duplicate);
        assert!(decode_skip(path, "bogus\n").is_err());
    }
}
