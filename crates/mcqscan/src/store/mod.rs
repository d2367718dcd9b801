//! Disk-backed, resumable scan data store.
//!
//! Every expensive artifact of a picture is cached under the hash of its
//! input file, so an interrupted run only recomputes what is missing:
//!
//! ```text
//! <root>/cache/<hash>/<n>.png           rectified picture
//! <root>/cache/<hash>/<n>.json          calibration + identification (written last)
//! <root>/cache/<hash>/<n>.skip          extraction failure marker
//! <root>/cache/<hash>/checkboxes/<n>    detected checkbox states
//! <root>/cache/<hash>/students/<n>      student read from the id grid
//! <root>/fix/<hash>/...                 operator decisions, same layout
//! <root>/index.txt                      document: page: pictures
//! ```
//!
//! The `cache` tree only ever holds initial values and the `fix` tree only
//! amended ones, which is how manual corrections survive a re-run.

mod atomic;
mod codec;
mod paths;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use image::GrayImage;

use crate::calibration::CalibrationRecord;
use crate::checkbox::CheckboxStatus;
use crate::error::ScanError;
use crate::exam_layout::ExamLayout;
use crate::identify::Identification;
use crate::matrix::IntensityMatrix;
use crate::model::{Answer, Document, Page, Picture, PictureId, Question, ScanData, SkipReason, Student, Tracked};
use crate::{AnswerNum, QuestionNum};

use atomic::{remove_if_exists, write_atomic, write_json_atomic, write_png_atomic};
use paths::{index_of, StorePaths};

pub(crate) use codec::CheckboxStates;

/// Length of the hex digest naming a cache directory.
pub const HASH_LEN: usize = 40;

/// Hex blake3 digest of a file's content, truncated to [`HASH_LEN`].
pub fn hash_file(path: &Path) -> Result<String, ScanError> {
    let bytes = std::fs::read(path).map_err(|e| ScanError::io(path, e))?;
    let digest = blake3::hash(&bytes);
    Ok(digest.to_hex().as_str()[..HASH_LEN].to_string())
}

/// Geometry and identity of an extracted picture.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PictureRecord {
    pub calibration: CalibrationRecord,
    pub identification: Identification,
}

fn read_optional(path: &Path) -> Result<Option<String>, ScanError> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ScanError::io(path, e)),
    }
}

fn list_dir(dir: &Path) -> Result<Vec<(String, bool)>, ScanError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ScanError::io(dir, e)),
    };
    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ScanError::io(dir, e))?;
        let is_dir = entry.file_type().map_err(|e| ScanError::io(&entry.path(), e))?.is_dir();
        if let Some(name) = entry.file_name().to_str() {
            out.push((name.to_string(), is_dir));
        }
    }
    out.sort();
    Ok(out)
}

/// Handle on a store directory. Cheap to clone and share between workers;
/// each worker only writes the entries of the pictures it owns.
#[derive(Debug, Clone)]
pub struct ScanStore {
    paths: StorePaths,
}

impl ScanStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn open(root: &Path) -> Result<Self, ScanError> {
        let paths = StorePaths::new(root);
        for dir in [paths.cache_root(), paths.fix_root()] {
            std::fs::create_dir_all(&dir).map_err(|e| ScanError::io(&dir, e))?;
        }
        Ok(Self { paths })
    }

    pub fn root(&self) -> &Path {
        self.paths.root()
    }

    pub fn picture_path(&self, id: &PictureId) -> PathBuf {
        self.paths.picture(id)
    }

    /// Input hashes with a cache directory.
    pub fn hashes(&self) -> Result<Vec<String>, ScanError> {
        Ok(list_dir(&self.paths.cache_root())?
            .into_iter()
            .filter(|(_, is_dir)| *is_dir)
            .map(|(name, _)| name)
            .collect())
    }

    /// Drop cache directories of inputs that are gone. The fix tree is kept
    /// so a re-added file finds its corrections again.
    pub fn prune(&self, current: &BTreeSet<String>) -> Result<Vec<String>, ScanError> {
        let mut removed = Vec::new();
        for hash in self.hashes()? {
            if !current.contains(&hash) {
                let dir = self.paths.cache_dir(&hash);
                std::fs::remove_dir_all(&dir).map_err(|e| ScanError::io(&dir, e))?;
                tracing::info!(%hash, "pruned obsolete cache");
                removed.push(hash);
            }
        }
        Ok(removed)
    }

    /// Forget every automatic result; operator decisions are kept.
    pub fn reset_cache(&self) -> Result<(), ScanError> {
        let dir = self.paths.cache_root();
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ScanError::io(&dir, e)),
        }
        std::fs::create_dir_all(&dir).map_err(|e| ScanError::io(&dir, e))
    }

    /// Picture indices of an input that were fully extracted or skipped.
    pub fn indices(&self, hash: &str) -> Result<BTreeSet<usize>, ScanError> {
        Ok(list_dir(&self.paths.cache_dir(hash))?
            .into_iter()
            .filter(|(_, is_dir)| !is_dir)
            .filter_map(|(name, _)| index_of(&name, "json").or_else(|| index_of(&name, "skip")))
            .collect())
    }

    /// Extraction is done for this picture (stored or skipped).
    pub fn is_processed(&self, id: &PictureId) -> bool {
        self.paths.record(id).is_file() || self.paths.skip(id).is_file()
    }

    /// Store an extracted picture. The record goes last: its presence marks
    /// the picture complete.
    pub fn write_picture(&self, id: &PictureId, image: &GrayImage, record: &PictureRecord) -> Result<(), ScanError> {
        write_png_atomic(&self.paths.picture(id), image)?;
        write_json_atomic(&self.paths.record(id), record)
    }

    pub fn read_record(&self, id: &PictureId) -> Result<Option<PictureRecord>, ScanError> {
        let path = self.paths.record(id);
        match read_optional(&path)? {
            Some(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| ScanError::json(&path, e)),
            None => Ok(None),
        }
    }

    pub fn load_image(&self, id: &PictureId) -> Result<GrayImage, ScanError> {
        let path = self.paths.picture(id);
        image::open(&path)
            .map(|img| img.to_luma8())
            .map_err(|source| ScanError::Image { path, source })
    }

    pub fn load_matrix(&self, id: &PictureId) -> Result<IntensityMatrix, ScanError> {
        Ok(IntensityMatrix::from_gray(&self.load_image(id)?))
    }

    pub fn write_debug_dump<T: serde::Serialize>(&self, id: &PictureId, dump: &T) -> Result<(), ScanError> {
        write_json_atomic(&self.paths.debug_dump(id), dump)
    }

    pub fn write_skip(&self, id: &PictureId, reason: SkipReason, detail: &str) -> Result<(), ScanError> {
        write_atomic(&self.paths.skip(id), codec::encode_skip(reason, detail).as_bytes())
    }

    pub fn read_skip(&self, id: &PictureId) -> Result<Option<(SkipReason, String)>, ScanError> {
        let path = self.paths.skip(id);
        read_optional(&path)?
            .map(|text| codec::decode_skip(&path, &text))
            .transpose()
    }

    pub(crate) fn write_checkboxes(&self, id: &PictureId, states: &CheckboxStates) -> Result<(), ScanError> {
        write_atomic(&self.paths.checkboxes(id), codec::encode_checkboxes(states).as_bytes())
    }

    pub(crate) fn read_checkboxes(&self, id: &PictureId) -> Result<Option<CheckboxStates>, ScanError> {
        let path = self.paths.checkboxes(id);
        read_optional(&path)?
            .map(|text| codec::decode_checkboxes(&path, &text))
            .transpose()
    }

    pub fn write_student(&self, id: &PictureId, student: &Student) -> Result<(), ScanError> {
        write_atomic(&self.paths.student(id), codec::encode_student(student).as_bytes())
    }

    pub fn read_student(&self, id: &PictureId) -> Result<Option<Student>, ScanError> {
        Ok(read_optional(&self.paths.student(id))?.map(|t| codec::decode_student(&t)))
    }

    /// Operator checkbox corrections of a picture.
    pub(crate) fn write_fix_checkboxes(&self, id: &PictureId, states: &CheckboxStates) -> Result<(), ScanError> {
        write_atomic(&self.paths.fix_checkboxes(id), codec::encode_checkboxes(states).as_bytes())
    }

    pub(crate) fn read_fix_checkboxes(&self, id: &PictureId) -> Result<Option<CheckboxStates>, ScanError> {
        let path = self.paths.fix_checkboxes(id);
        read_optional(&path)?
            .map(|text| codec::decode_checkboxes(&path, &text))
            .transpose()
    }

    pub fn write_fix_student(&self, id: &PictureId, student: &Student) -> Result<(), ScanError> {
        write_atomic(&self.paths.fix_student(id), codec::encode_student(student).as_bytes())
    }

    pub fn read_fix_student(&self, id: &PictureId) -> Result<Option<Student>, ScanError> {
        Ok(read_optional(&self.paths.fix_student(id))?.map(|t| codec::decode_student(&t)))
    }

    /// Operator skip (duplicate or discarded document).
    pub fn write_fix_skip(&self, id: &PictureId, reason: SkipReason) -> Result<(), ScanError> {
        write_atomic(&self.paths.fix_skip(id), codec::encode_skip(reason, "").as_bytes())
    }

    pub fn clear_fix_skip(&self, id: &PictureId) -> Result<(), ScanError> {
        remove_if_exists(&self.paths.fix_skip(id))
    }

    pub fn read_fix_skip(&self, id: &PictureId) -> Result<Option<SkipReason>, ScanError> {
        let path = self.paths.fix_skip(id);
        Ok(read_optional(&path)?
            .map(|text| codec::decode_skip(&path, &text))
            .transpose()?
            .map(|(reason, _)| reason))
    }

    pub fn write_index(&self, data: &ScanData) -> Result<(), ScanError> {
        write_atomic(&self.paths.index(), codec::encode_index(&data.documents).as_bytes())
    }

    /// Detected states of a picture, if present and matching the layout
    /// page. A stale file (layout changed) counts as missing.
    pub(crate) fn checkboxes_for(
        &self,
        id: &PictureId,
        expected: &BTreeSet<(QuestionNum, AnswerNum)>,
    ) -> Result<Option<CheckboxStates>, ScanError> {
        Ok(self
            .read_checkboxes(id)?
            .filter(|states| states.len() == expected.len() && states.keys().all(|k| expected.contains(k))))
    }

    /// Build the document tree from disk.
    ///
    /// Pictures skipped at extraction go to [`ScanData::skipped`]. Pictures
    /// whose checkbox analysis is missing are left out with a warning; the
    /// pipeline's analysis stage fills them in.
    pub fn load(&self, layout: &ExamLayout) -> Result<ScanData, ScanError> {
        let mut data = ScanData::default();
        for hash in self.hashes()? {
            for index in self.indices(&hash)? {
                let id = PictureId::new(hash.as_str(), index);
                if let Some((reason, _)) = self.read_skip(&id)? {
                    data.skipped.push((id, reason));
                    continue;
                }
                let Some(record) = self.read_record(&id)? else {
                    continue;
                };
                let ident = record.identification;
                if !layout.has_page(ident.document_id, ident.page) {
                    data.skipped.push((id, SkipReason::UnknownDocument));
                    continue;
                }
                let picture = match self.load_picture(id, record, layout)? {
                    Some(p) => p,
                    None => continue,
                };
                data.documents
                    .entry(ident.document_id)
                    .or_insert_with(|| Document {
                        id: ident.document_id,
                        pages: BTreeMap::new(),
                    })
                    .pages
                    .entry(ident.page)
                    .or_insert_with(|| Page {
                        number: ident.page,
                        pictures: Vec::new(),
                    })
                    .pictures
                    .push(picture);
            }
        }
        Ok(data)
    }

    fn load_picture(&self, id: PictureId, record: PictureRecord, layout: &ExamLayout) -> Result<Option<Picture>, ScanError> {
        let PictureRecord {
            calibration,
            identification,
        } = record;
        let specs = layout.checkboxes(identification.document_id, identification.page);
        let expected: BTreeSet<_> = specs.iter().map(|b| (b.question, b.answer)).collect();
        let Some(initial) = self.checkboxes_for(&id, &expected)? else {
            tracing::warn!(picture = %id, "checkbox analysis missing, picture left out");
            return Ok(None);
        };
        let amended = self.read_fix_checkboxes(&id)?.unwrap_or_default();

        let mut questions: BTreeMap<QuestionNum, Question> = BTreeMap::new();
        for spec in specs {
            let key = (spec.question, spec.answer);
            let state = Tracked::with_amendment(
                initial.get(&key).copied().unwrap_or(CheckboxStatus::Unchecked),
                amended.get(&key).copied(),
            );
            questions
                .entry(spec.question)
                .or_insert_with(|| Question {
                    number: spec.question,
                    answers: BTreeMap::new(),
                })
                .answers
                .insert(
                    spec.answer,
                    Answer {
                        number: spec.answer,
                        is_correct: spec.correct,
                        position: calibration.xy_to_ij(spec.x_mm, spec.y_mm),
                        state,
                    },
                );
        }

        let student = if identification.page == 1 {
            Some(Tracked::with_amendment(
                self.read_student(&id)?.unwrap_or_default(),
                self.read_fix_student(&id)?,
            ))
        } else {
            None
        };

        Ok(Some(Picture {
            skip: self.read_fix_skip(&id)?,
            image_path: self.paths.picture(&id),
            id,
            calibration,
            identification,
            questions,
            student,
        }))
    }
}
