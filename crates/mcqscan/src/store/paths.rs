use std::path::{Path, PathBuf};

use crate::model::PictureId;

const CACHE_DIR: &str = "cache";
const FIX_DIR: &str = "fix";
const CHECKBOXES_DIR: &str = "checkboxes";
const STUDENTS_DIR: &str = "students";
const INDEX_FILE: &str = "index.txt";

/// File locations under a store root.
///
/// `cache/` holds automatic results and may be rebuilt; `fix/` mirrors it
/// with operator decisions only and is never pruned.
#[derive(Debug, Clone)]
pub(crate) struct StorePaths {
    root: PathBuf,
}

impl StorePaths {
    pub(crate) fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn cache_root(&self) -> PathBuf {
        self.root.join(CACHE_DIR)
    }

    pub(crate) fn fix_root(&self) -> PathBuf {
        self.root.join(FIX_DIR)
    }

    pub(crate) fn index(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    pub(crate) fn cache_dir(&self, hash: &str) -> PathBuf {
        self.cache_root().join(hash)
    }

    fn fix_dir(&self, hash: &str) -> PathBuf {
        self.fix_root().join(hash)
    }

    pub(crate) fn picture(&self, id: &PictureId) -> PathBuf {
        self.cache_dir(&id.file_hash).join(format!("{}.png", id.index))
    }

    /// Calibration and identification; written last for a picture.
    pub(crate) fn record(&self, id: &PictureId) -> PathBuf {
        self.cache_dir(&id.file_hash).join(format!("{}.json", id.index))
    }

    pub(crate) fn debug_dump(&self, id: &PictureId) -> PathBuf {
        self.cache_dir(&id.file_hash).join(format!("{}.debug.json", id.index))
    }

    pub(crate) fn skip(&self, id: &PictureId) -> PathBuf {
        self.cache_dir(&id.file_hash).join(format!("{}.skip", id.index))
    }

    pub(crate) fn checkboxes(&self, id: &PictureId) -> PathBuf {
        self.cache_dir(&id.file_hash)
            .join(CHECKBOXES_DIR)
            .join(id.index.to_string())
    }

    pub(crate) fn student(&self, id: &PictureId) -> PathBuf {
        self.cache_dir(&id.file_hash)
            .join(STUDENTS_DIR)
            .join(id.index.to_string())
    }

    pub(crate) fn fix_skip(&self, id: &PictureId) -> PathBuf {
        self.fix_dir(&id.file_hash).join(format!("{}.skip", id.index))
    }

    pub(crate) fn fix_checkboxes(&self, id: &PictureId) -> PathBuf {
        self.fix_dir(&id.file_hash)
            .join(CHECKBOXES_DIR)
            .join(id.index.to_string())
    }

    pub(crate) fn fix_student(&self, id: &PictureId) -> PathBuf {
        self.fix_dir(&id.file_hash)
            .join(STUDENTS_DIR)
            .join(id.index.to_string())
    }
}

/// Picture index of a `<n>.<ext>` file name.
pub(crate) fn index_of(file_name: &str, ext: &str) -> Option<usize> {
    file_name.strip_suffix(ext)?.strip_suffix('.')?.parse().ok()
}
