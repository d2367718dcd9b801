use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use image::RgbImage;
use thiserror::Error;

use crate::debug_dump::{render_overlays, Overlay};
use crate::error::ScanError;
use crate::exam_layout::ExamLayout;
use crate::matrix::IntensityMatrix;
use crate::model::{PictureId, ScanData, SkipReason, Student, Tracked};
use crate::store::{CheckboxStates, ScanStore};
use crate::DocumentId;

use super::ResolutionReport;

/// Failure of an interactive session. Corrections confirmed before the
/// failure are already persisted.
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("review input closed before every item was resolved")]
    InputClosed,
    #[error("terminal i/o failed: {0}")]
    Terminal(#[source] std::io::Error),
    #[error(transparent)]
    Store(#[from] ScanError),
}

/// Navigation command of the reviewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Next,
    Back,
}

impl Action {
    pub const NEXT: &'static str = ">";
    pub const BACK: &'static str = "<";
    pub const DISCARD: &'static str = "/";
}

/// Line-based operator dialogue.
pub struct Console<R, W> {
    input: R,
    output: W,
}

impl Console<std::io::StdinLock<'static>, std::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stdout())
    }
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    pub(crate) fn say(&mut self, message: impl std::fmt::Display) -> Result<(), ReviewError> {
        writeln!(self.output, "{message}").map_err(ReviewError::Terminal)
    }

    /// Print `prompt` and read one trimmed line.
    pub(crate) fn ask(&mut self, prompt: &str) -> Result<String, ReviewError> {
        write!(self.output, "{prompt} ").map_err(ReviewError::Terminal)?;
        self.output.flush().map_err(ReviewError::Terminal)?;
        let mut line = String::new();
        let read = self.input.read_line(&mut line).map_err(ReviewError::Terminal)?;
        if read == 0 {
            return Err(ReviewError::InputClosed);
        }
        Ok(line.trim().to_string())
    }

    /// Yes/no question defaulting to yes; anything else asks again.
    pub(crate) fn confirm(&mut self) -> Result<bool, ReviewError> {
        loop {
            match self.ask("Is it correct? (Y/n)")?.to_lowercase().as_str() {
                "" | "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => continue,
            }
        }
    }
}

/// A picture to show to the operator.
#[derive(Debug, Clone, PartialEq)]
pub struct Preview {
    pub title: String,
    pub image_path: PathBuf,
    pub overlays: Vec<Overlay>,
}

impl Preview {
    /// Load the rectified picture and draw the overlays on it.
    pub fn render(&self) -> Result<RgbImage, ScanError> {
        let gray = image::open(&self.image_path)
            .map_err(|source| ScanError::Image {
                path: self.image_path.clone(),
                source,
            })?
            .to_luma8();
        Ok(render_overlays(&IntensityMatrix::from_gray(&gray), &self.overlays))
    }
}

/// Image side channel of the reviewer.
pub trait PreviewSink {
    fn show(&mut self, preview: &Preview) -> Result<(), ScanError> {
        let _ = preview;
        Ok(())
    }
}

/// Shows nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPreview;

impl PreviewSink for NoPreview {}

/// Writes each preview to a fixed PNG path, for an external viewer that
/// reloads it.
#[derive(Debug, Clone)]
pub struct PngPreview {
    path: PathBuf,
}

impl PngPreview {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreviewSink for PngPreview {
    fn show(&mut self, preview: &Preview) -> Result<(), ScanError> {
        preview.render()?.save(&self.path).map_err(|source| ScanError::Image {
            path: self.path.clone(),
            source,
        })
    }
}

/// Mutable state of one resolution run. Every correction goes to the fix
/// tree first, then to the in-memory tree.
pub(crate) struct Session<'a, R, W> {
    pub store: &'a ScanStore,
    pub layout: &'a ExamLayout,
    pub data: &'a mut ScanData,
    pub console: &'a mut Console<R, W>,
    pub preview: &'a mut dyn PreviewSink,
    pub report: ResolutionReport,
}

impl<R: BufRead, W: Write> Session<'_, R, W> {
    pub fn show(&mut self, preview: Preview) -> Result<(), ReviewError> {
        self.preview.show(&preview)?;
        Ok(())
    }

    pub fn set_skip(&mut self, id: &PictureId, reason: SkipReason) -> Result<(), ReviewError> {
        self.store.write_fix_skip(id, reason)?;
        if let Some(picture) = self.data.picture_mut(id) {
            picture.skip = Some(reason);
        }
        Ok(())
    }

    pub fn keep(&mut self, id: &PictureId) -> Result<(), ReviewError> {
        self.store.clear_fix_skip(id)?;
        if let Some(picture) = self.data.picture_mut(id) {
            picture.skip = None;
        }
        Ok(())
    }

    pub fn amend_student(&mut self, id: &PictureId, student: Student) -> Result<(), ReviewError> {
        self.store.write_fix_student(id, &student)?;
        if let Some(picture) = self.data.picture_mut(id) {
            match picture.student.as_mut() {
                Some(tracked) => tracked.amend(student),
                None => picture.student = Some(Tracked::with_amendment(Student::default(), Some(student))),
            }
        }
        Ok(())
    }

    pub fn amend_states(&mut self, id: &PictureId, states: &CheckboxStates) -> Result<(), ReviewError> {
        self.store.write_fix_checkboxes(id, states)?;
        if let Some(picture) = self.data.picture_mut(id) {
            for question in picture.questions.values_mut() {
                for answer in question.answers.values_mut() {
                    if let Some(status) = states.get(&(question.number, answer.number)) {
                        answer.state.amend(*status);
                    }
                }
            }
        }
        Ok(())
    }

    /// Mark every picture of `doc` as discarded.
    pub fn discard_document(&mut self, doc: DocumentId) -> Result<(), ReviewError> {
        let ids: Vec<PictureId> = self
            .data
            .documents
            .get(&doc)
            .map(|d| d.pictures().map(|p| p.id.clone()).collect())
            .unwrap_or_default();
        for id in &ids {
            self.set_skip(id, SkipReason::Discarded)?;
        }
        tracing::info!(document = doc, pictures = ids.len(), "document discarded");
        self.report.discarded.push(doc);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn console(input: &str) -> Console<Cursor<Vec<u8>>, Vec<u8>> {
        Console::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    #[test]
    fn ask_trims_and_detects_end_of_input() {
        let mut c = console("  Ada  \n");
        assert_eq!(c.ask("Name:").expect("line"), "Ada");
        assert!(matches!(c.ask("Name:"), Err(ReviewError::InputClosed)));
        assert_eq!(String::from_utf8(c.into_output()).expect("utf8"), "Name: Name: ");
    }

    #[test]
    fn confirm_defaults_to_yes_and_reasks_on_garbage() {
        let mut c = console("\nmaybe\nN\n");
        assert!(c.confirm().expect("first"));
        assert!(!c.confirm().expect("second"));
        let out = String::from_utf8(c.into_output()).expect("utf8");
        assert_eq!(out.matches("Is it correct? (Y/n)").count(), 3);
    }

    #[test]
    fn png_preview_renders_overlays() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("pic.png");
        image::GrayImage::from_pixel(20, 20, image::Luma([255])).save(&source).expect("save");
        let mut sink = PngPreview::new(dir.path().join("preview.png"));
        let preview = Preview {
            title: "doc 44".into(),
            image_path: source,
            overlays: vec![Overlay::square(
                crate::geometry::Pixel::new(2, 2),
                5,
                crate::debug_dump::OverlayColor::Blue,
            )],
        };
        sink.show(&preview).expect("show");
        let shown = image::open(sink.path()).expect("open").to_rgb8();
        assert_eq!(shown.get_pixel(2, 2).0, [0, 0, 255]);
        assert_eq!(shown.get_pixel(10, 10).0, [255, 255, 255]);
    }
}
