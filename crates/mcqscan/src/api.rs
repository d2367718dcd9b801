//! High-level scanning API.
//!
//! [`Scanner`] bundles an exam layout with a [`ScanConfig`] and exposes the
//! three entry points: single-picture analysis, batch scan and conflict
//! resolution.

use std::io::{BufRead, Write};
use std::path::Path;

use image::GrayImage;

use crate::config::ScanConfig;
use crate::conflict::{self, Console, PreviewSink, ResolutionReport, ReviewError};
use crate::error::ScanError;
use crate::exam_layout::ExamLayout;
use crate::model::ScanData;
use crate::pipeline::{self, PageSource, PictureAnalysis, PictureRejected, ScanSummary};
use crate::store::ScanStore;

/// Primary scanning interface.
///
/// Create once per exam, then scan any number of input directories.
///
/// # Examples
///
/// ```no_run
/// use mcqscan::{ImageFileSource, NoPreview, Console, ScanStore, Scanner};
/// use std::path::Path;
///
/// let scanner = Scanner::from_layout_json_file(Path::new("exam.json")).unwrap();
/// let store = ScanStore::open(Path::new(".scan")).unwrap();
/// let (mut data, summary) = scanner.scan(&store, &ImageFileSource, Path::new("scans")).unwrap();
/// println!("{} pictures skipped", summary.skipped.len());
/// let report = scanner
///     .resolve(&store, &mut data, &mut Console::stdio(), &mut NoPreview)
///     .unwrap();
/// report.ensure_complete().unwrap();
/// ```
pub struct Scanner {
    layout: ExamLayout,
    config: ScanConfig,
}

impl Scanner {
    /// Create a scanner with default configuration.
    pub fn new(layout: ExamLayout) -> Self {
        Self::with_config(layout, ScanConfig::default())
    }

    /// Create with full config control.
    pub fn with_config(layout: ExamLayout, config: ScanConfig) -> Self {
        Self { layout, config }
    }

    /// Load and validate a layout JSON file.
    pub fn from_layout_json_file(path: &Path) -> Result<Self, ScanError> {
        Ok(Self::new(ExamLayout::from_json_file(path)?))
    }

    pub fn layout(&self) -> &ExamLayout {
        &self.layout
    }

    /// Access the current configuration.
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Mutable access to configuration for post-construction tuning.
    pub fn config_mut(&mut self) -> &mut ScanConfig {
        &mut self.config
    }

    /// Analyze one picture in memory, without touching any store.
    ///
    /// Checkboxes are classified as a batch of this page alone.
    pub fn analyze_picture(&self, image: &GrayImage) -> Result<PictureAnalysis, PictureRejected> {
        pipeline::analyze_picture(image, &self.layout, &self.config)
    }

    /// Extract, analyze and load every input of `input_dir`, reusing what
    /// `store` already holds.
    pub fn scan(
        &self,
        store: &ScanStore,
        source: &dyn PageSource,
        input_dir: &Path,
    ) -> Result<(ScanData, ScanSummary), ScanError> {
        pipeline::scan(store, source, input_dir, &self.layout, &self.config)
    }

    /// Resolve duplicates and review open items with the operator.
    ///
    /// Call [`ResolutionReport::ensure_complete`] before scoring.
    pub fn resolve<R: BufRead, W: Write>(
        &self,
        store: &ScanStore,
        data: &mut ScanData,
        console: &mut Console<R, W>,
        preview: &mut dyn PreviewSink,
    ) -> Result<ResolutionReport, ReviewError> {
        conflict::resolve(store, &self.layout, data, console, preview)
    }
}
