//! Write-then-rename persistence.
//!
//! Content goes to a temporary file in the destination directory, which is
//! then renamed over the target. An interrupted write leaves at most a stray
//! temporary file, never a truncated artifact.

use std::io::{Cursor, Write};
use std::path::Path;

use image::{GrayImage, ImageFormat};
use tempfile::NamedTempFile;

use crate::error::ScanError;

pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ScanError> {
    let dir = path
        .parent()
        .ok_or_else(|| ScanError::invalid(path, "no parent directory"))?;
    std::fs::create_dir_all(dir).map_err(|e| ScanError::io(dir, e))?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| ScanError::io(dir, e))?;
    tmp.write_all(bytes).map_err(|e| ScanError::io(path, e))?;
    tmp.as_file().sync_all().map_err(|e| ScanError::io(path, e))?;
    tmp.persist(path).map_err(|source| ScanError::Persist {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

pub(crate) fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), ScanError> {
    let json = serde_json::to_vec_pretty(value).map_err(|e| ScanError::json(path, e))?;
    write_atomic(path, &json)
}

pub(crate) fn write_png_atomic(path: &Path, image: &GrayImage) -> Result<(), ScanError> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageFormat::Png)
        .map_err(|source| ScanError::Image {
            path: path.to_path_buf(),
            source,
        })?;
    write_atomic(path, buf.get_ref())
}

/// Remove a file; a missing file is not an error.
pub(crate) fn remove_if_exists(path: &Path) -> Result<(), ScanError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ScanError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_creates_parents_and_replaces() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a/b/file.txt");
        write_atomic(&path, b"first").expect("first write");
        write_atomic(&path, b"second").expect("second write");
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "second");
        let leftovers = std::fs::read_dir(dir.path().join("a/b")).expect("list").count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn png_is_readable_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("0.png");
        let img = GrayImage::from_fn(4, 3, |x, y| image::Luma([(x * 10 + y) as u8]));
        write_png_atomic(&path, &img).expect("write png");
        let back = image::open(&path).expect("open png").to_luma8();
        assert_eq!(back, img);
    }

    #[test]
    fn removing_a_missing_file_is_fine() {
        let dir = tempfile::tempdir().expect("tempdir");
        remove_if_exists(&dir.path().join("nothing")).expect("remove");
    }
}
