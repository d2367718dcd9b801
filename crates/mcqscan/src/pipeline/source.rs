use std::path::{Path, PathBuf};

use image::GrayImage;

use crate::error::ScanError;

/// Rasterizer of input files.
///
/// Multi-page formats (PDF) are handled by an external codec implementing
/// this trait; pages are indexed from 0.
pub trait PageSource: Send + Sync {
    /// Whether `path` is an input this source can read.
    fn accepts(&self, path: &Path) -> bool;

    fn page_count(&self, path: &Path) -> Result<usize, ScanError>;

    fn render_page(&self, path: &Path, index: usize) -> Result<GrayImage, ScanError>;
}

/// Single-page PNG or JPEG scans.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageFileSource;

impl ImageFileSource {
    const EXTENSIONS: [&'static str; 3] = ["png", "jpg", "jpeg"];
}

impl PageSource for ImageFileSource {
    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| Self::EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
    }

    fn page_count(&self, _path: &Path) -> Result<usize, ScanError> {
        Ok(1)
    }

    fn render_page(&self, path: &Path, index: usize) -> Result<GrayImage, ScanError> {
        if index != 0 {
            return Err(ScanError::invalid(path, format!("no page {index} in a single-page image")));
        }
        image::open(path)
            .map(|img| img.to_luma8())
            .map_err(|source| ScanError::Image {
                path: path.to_path_buf(),
                source,
            })
    }
}

/// Files of `dir` accepted by `source`, in name order.
pub fn collect_inputs(dir: &Path, source: &dyn PageSource) -> Result<Vec<PathBuf>, ScanError> {
    let mut inputs = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| ScanError::io(dir, e))? {
        let path = entry.map_err(|e| ScanError::io(dir, e))?.path();
        if path.is_file() && source.accepts(&path) {
            inputs.push(path);
        }
    }
    inputs.sort();
    Ok(inputs)
}
