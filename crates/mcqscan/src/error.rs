//! Crate-level error type.
//!
//! Per-picture failures (calibration, unknown document) never surface here:
//! they become skip markers. `ScanError` covers what stops a run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("cannot decode image {}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("invalid exam layout: {0}")]
    Layout(String),
    #[error("malformed {}: {message}", path.display())]
    InvalidFormat { path: PathBuf, message: String },
    #[error("{}", describe_missing(.documents))]
    MissingQuestions {
        /// Document id -> question numbers absent from every scanned page.
        documents: BTreeMap<u32, Vec<u32>>,
    },
    #[error("cannot start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("cannot persist {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: tempfile::PersistError,
    },
}

impl ScanError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn json(path: &Path, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn invalid(path: &Path, message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

fn describe_missing(documents: &BTreeMap<u32, Vec<u32>>) -> String {
    let listed: Vec<String> = documents
        .iter()
        .map(|(doc, questions)| {
            let qs: Vec<String> = questions.iter().map(u32::to_string).collect();
            format!("document {doc}: question(s) {}", qs.join(", "))
        })
        .collect();
    format!(
        "missing questions ({}); scan the missing pages and run again",
        listed.join("; ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_questions_message_is_actionable() {
        let mut documents = BTreeMap::new();
        documents.insert(44, vec![3, 5]);
        let err = ScanError::MissingQuestions { documents };
        assert_eq!(
            err.to_string(),
            "missing questions (document 44: question(s) 3, 5); scan the missing pages and run again"
        );
    }

    #[test]
    fn io_error_names_the_path() {
        let err = ScanError::io(
            Path::new("cache/index.txt"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().starts_with("I/O error on cache/index.txt"));
    }
}
