//! Stage orchestration: extraction -> analysis -> load.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use image::GrayImage;
use rayon::prelude::*;

use crate::calibration::{calibrate, Calibrated};
use crate::checkbox::{classify_batch, measure_page, CheckboxMetrics, LocatedCheckbox};
use crate::config::ScanConfig;
use crate::debug_dump::{CheckboxDebug, Overlay, OverlayColor, PictureDebug};
use crate::error::ScanError;
use crate::exam_layout::ExamLayout;
use crate::identify::{identification_overlays, read_doc_id_and_page, Identification};
use crate::matrix::IntensityMatrix;
use crate::model::{PictureId, ScanData, SkipReason, Student};
use crate::store::{hash_file, CheckboxStates, PictureRecord, ScanStore};
use crate::student_id::read_student_id;
use crate::DocumentId;

use super::result::{PictureAnalysis, PictureRejected, ScanSummary, SkippedPicture};
use super::source::{collect_inputs, PageSource};

/// Map `f` over `items` with `workers` threads; 1 stays on this thread.
fn run_parallel<T, R, F>(workers: usize, items: &[T], f: F) -> Result<Vec<R>, ScanError>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync + Send,
{
    if workers == 1 || items.len() <= 1 {
        return Ok(items.iter().map(f).collect());
    }
    let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build()?;
    Ok(pool.install(|| items.par_iter().map(f).collect()))
}

// ---------------------------------------------------------------------------
// Single picture
// ---------------------------------------------------------------------------

fn calibrate_and_identify(
    gray: &GrayImage,
    layout: &ExamLayout,
    config: &ScanConfig,
) -> Result<(Calibrated, Identification), PictureRejected> {
    let input = IntensityMatrix::from_gray(gray);
    let calibrated = calibrate(&input, &config.geometry, &config.calibration)?;
    let ident = read_doc_id_and_page(&calibrated.matrix, &calibrated.record, &config.identify);
    if !layout.has_page(ident.document_id, ident.page) {
        return Err(PictureRejected::UnknownDocument(ident));
    }
    Ok((calibrated, ident))
}

/// Analyse one picture entirely in memory, classifying its checkboxes as a
/// batch of their own.
pub fn analyze_picture(
    gray: &GrayImage,
    layout: &ExamLayout,
    config: &ScanConfig,
) -> Result<PictureAnalysis, PictureRejected> {
    let (calibrated, identification) = calibrate_and_identify(gray, layout, config)?;
    let Calibrated {
        matrix,
        record,
        mut overlays,
    } = calibrated;
    overlays.extend(identification_overlays(&matrix, &record, &config.identify));

    let boxes = measure_page(
        &matrix,
        &record,
        layout.checkboxes(identification.document_id, identification.page),
        &config.checkbox,
    );
    let metrics: Vec<CheckboxMetrics> = boxes.iter().map(|b| b.metrics).collect();
    let statuses = classify_batch(&metrics, &config.checkbox);

    let student = match (&layout.id_grid, identification.page) {
        (Some(grid), 1) => {
            let (student, grid_overlays) = read_student_id(
                &matrix,
                &record,
                grid,
                &config.geometry,
                &layout.students,
                &config.student_id,
            );
            overlays.extend(grid_overlays);
            Some(student)
        }
        _ => None,
    };

    Ok(PictureAnalysis {
        checkboxes: boxes.into_iter().zip(statuses).collect(),
        matrix,
        calibration: record,
        identification,
        student,
        overlays,
    })
}

// ---------------------------------------------------------------------------
// Stage 1: extraction
// ---------------------------------------------------------------------------

struct ExtractJob {
    id: PictureId,
    path: PathBuf,
}

enum Extracted {
    Stored,
    Skipped(SkippedPicture),
}

fn skip(store: &ScanStore, id: &PictureId, reason: SkipReason, detail: String) -> Result<Extracted, ScanError> {
    tracing::warn!(picture = %id, %reason, %detail, "picture skipped");
    store.write_skip(id, reason, &detail)?;
    Ok(Extracted::Skipped(SkippedPicture {
        picture: id.clone(),
        reason,
        detail,
    }))
}

fn extract_one(
    store: &ScanStore,
    source: &dyn PageSource,
    job: &ExtractJob,
    layout: &ExamLayout,
    config: &ScanConfig,
) -> Result<Extracted, ScanError> {
    let gray = match source.render_page(&job.path, job.id.index) {
        Ok(gray) => gray,
        Err(e) => return skip(store, &job.id, SkipReason::Unreadable, e.to_string()),
    };
    match calibrate_and_identify(&gray, layout, config) {
        Ok((calibrated, identification)) => {
            let record = PictureRecord {
                calibration: calibrated.record,
                identification,
            };
            if config.pipeline.write_debug_dumps {
                let mut dump = PictureDebug::new(job.id.to_string(), calibrated.matrix.cols(), calibrated.matrix.rows());
                dump.calibration = Some(record.calibration.clone());
                dump.identification = Some(identification);
                dump.overlays = calibrated.overlays;
                dump.overlays.extend(identification_overlays(
                    &calibrated.matrix,
                    &record.calibration,
                    &config.identify,
                ));
                store.write_debug_dump(&job.id, &dump)?;
            }
            store.write_picture(&job.id, &calibrated.matrix.to_gray(), &record)?;
            tracing::debug!(
                picture = %job.id,
                document_id = identification.document_id,
                page = identification.page,
                "picture extracted"
            );
            Ok(Extracted::Stored)
        }
        Err(rejected) => {
            if config.pipeline.write_debug_dumps {
                let mut dump = PictureDebug::new(job.id.to_string(), gray.width() as usize, gray.height() as usize);
                dump.failure = Some(rejected.to_string());
                dump.overlays = rejected.overlays().to_vec();
                store.write_debug_dump(&job.id, &dump)?;
            }
            skip(store, &job.id, rejected.skip_reason(), rejected.to_string())
        }
    }
}

/// Hash inputs, prune stale caches and extract every missing picture.
fn extract(
    store: &ScanStore,
    source: &dyn PageSource,
    inputs: &[PathBuf],
    layout: &ExamLayout,
    config: &ScanConfig,
    summary: &mut ScanSummary,
) -> Result<(), ScanError> {
    let mut hashes = BTreeSet::new();
    let mut jobs = Vec::new();
    for path in inputs {
        let hash = hash_file(path)?;
        let pages = match source.page_count(path) {
            Ok(n) => n,
            Err(e) => {
                // not persisted: the input is retried on the next run
                tracing::warn!(path = %path.display(), error = %e, "cannot count pages, input skipped");
                summary.skipped.push(SkippedPicture {
                    picture: PictureId::new(hash.as_str(), 0),
                    reason: SkipReason::Unreadable,
                    detail: format!("{}: {e}", path.display()),
                });
                hashes.insert(hash);
                continue;
            }
        };
        for index in 0..pages {
            let id = PictureId::new(hash.as_str(), index);
            if store.is_processed(&id) {
                summary.cached += 1;
            } else {
                jobs.push(ExtractJob {
                    id,
                    path: path.clone(),
                });
            }
        }
        hashes.insert(hash);
    }
    summary.pruned = store.prune(&hashes)?;

    let outcomes = run_parallel(config.pipeline.workers, &jobs, |job| {
        extract_one(store, source, job, layout, config)
    })?;
    for outcome in outcomes {
        match outcome? {
            Extracted::Stored => summary.extracted += 1,
            Extracted::Skipped(skipped) => summary.skipped.push(skipped),
        }
    }
    tracing::info!(
        inputs = inputs.len(),
        extracted = summary.extracted,
        cached = summary.cached,
        skipped = summary.skipped.len(),
        "extraction done"
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Stage 2: analysis
// ---------------------------------------------------------------------------

type DocumentPictures = Vec<(PictureId, PictureRecord)>;

/// Extracted pictures grouped by document id.
fn extracted_documents(store: &ScanStore, layout: &ExamLayout) -> Result<BTreeMap<DocumentId, DocumentPictures>, ScanError> {
    let mut documents: BTreeMap<DocumentId, DocumentPictures> = BTreeMap::new();
    for hash in store.hashes()? {
        for index in store.indices(&hash)? {
            let id = PictureId::new(hash.as_str(), index);
            if store.read_skip(&id)?.is_some() {
                continue;
            }
            let Some(record) = store.read_record(&id)? else {
                continue;
            };
            let ident = record.identification;
            if layout.has_page(ident.document_id, ident.page) {
                documents.entry(ident.document_id).or_default().push((id, record));
            }
        }
    }
    Ok(documents)
}

fn expected_keys(layout: &ExamLayout, ident: Identification) -> BTreeSet<(u32, u32)> {
    layout
        .checkboxes(ident.document_id, ident.page)
        .iter()
        .map(|b| (b.question, b.answer))
        .collect()
}

fn needs_analysis(store: &ScanStore, layout: &ExamLayout, pictures: &DocumentPictures) -> Result<bool, ScanError> {
    for (id, record) in pictures {
        let ident = record.identification;
        if store.checkboxes_for(id, &expected_keys(layout, ident))?.is_none() {
            return Ok(true);
        }
        if ident.page == 1 && layout.id_grid.is_some() && store.read_student(id)?.is_none() {
            return Ok(true);
        }
    }
    Ok(false)
}

struct MeasuredPicture<'a> {
    id: &'a PictureId,
    record: &'a PictureRecord,
    /// `(width, height)` of the rectified picture.
    size: (usize, usize),
    boxes: Vec<LocatedCheckbox>,
    student: Option<(Student, Vec<Overlay>)>,
}

/// Classify every checkbox of a document as one batch and persist the
/// results of each of its pictures.
fn analyze_document(
    store: &ScanStore,
    layout: &ExamLayout,
    config: &ScanConfig,
    document_id: DocumentId,
    pictures: &DocumentPictures,
) -> Result<(), ScanError> {
    let mut measured = Vec::with_capacity(pictures.len());
    for (id, record) in pictures {
        let m = store.load_matrix(id)?;
        let ident = record.identification;
        let boxes = measure_page(
            &m,
            &record.calibration,
            layout.checkboxes(ident.document_id, ident.page),
            &config.checkbox,
        );
        let student = match (&layout.id_grid, ident.page) {
            (Some(grid), 1) => Some(read_student_id(
                &m,
                &record.calibration,
                grid,
                &config.geometry,
                &layout.students,
                &config.student_id,
            )),
            _ => None,
        };
        measured.push(MeasuredPicture {
            id,
            record,
            size: (m.cols(), m.rows()),
            boxes,
            student,
        });
    }

    let metrics: Vec<CheckboxMetrics> = measured
        .iter()
        .flat_map(|p| p.boxes.iter().map(|b| b.metrics))
        .collect();
    let mut statuses = classify_batch(&metrics, &config.checkbox).into_iter();

    for picture in measured {
        let classified: Vec<_> = picture.boxes.iter().zip(statuses.by_ref()).collect();
        let states: CheckboxStates = classified
            .iter()
            .map(|(b, s)| ((b.question, b.answer), *s))
            .collect();
        store.write_checkboxes(picture.id, &states)?;
        if let Some((student, _)) = &picture.student {
            store.write_student(picture.id, student)?;
        }
        if config.pipeline.write_debug_dumps {
            let calibration = &picture.record.calibration;
            let size = calibration.cell_size_px();
            let (width, height) = picture.size;
            let mut dump = PictureDebug::new(picture.id.to_string(), width, height);
            dump.calibration = Some(calibration.clone());
            dump.identification = Some(picture.record.identification);
            dump.overlays = calibration.overlays();
            for (b, status) in &classified {
                dump.checkboxes.push(CheckboxDebug {
                    question: b.question,
                    answer: b.answer,
                    position: b.position,
                    status: *status,
                });
                dump.overlays
                    .push(Overlay::square(b.position, size, OverlayColor::for_checkbox(*status, false)));
            }
            if let Some((_, grid_overlays)) = picture.student {
                dump.overlays.extend(grid_overlays);
            }
            store.write_debug_dump(picture.id, &dump)?;
        }
    }
    tracing::debug!(document_id, boxes = metrics.len(), "document classified");
    Ok(())
}

fn analyze(
    store: &ScanStore,
    layout: &ExamLayout,
    config: &ScanConfig,
    summary: &mut ScanSummary,
) -> Result<(), ScanError> {
    let mut stale = Vec::new();
    for (document_id, pictures) in extracted_documents(store, layout)? {
        if needs_analysis(store, layout, &pictures)? {
            stale.push((document_id, pictures));
        }
    }
    let outcomes = run_parallel(config.pipeline.workers, &stale, |(document_id, pictures)| {
        analyze_document(store, layout, config, *document_id, pictures)
    })?;
    for outcome in outcomes {
        outcome?;
    }
    summary.analyzed_documents = stale.iter().map(|(d, _)| *d).collect();
    tracing::info!(documents = stale.len(), "analysis done");
    Ok(())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Run extraction, analysis and load over every input of `input_dir`.
///
/// Only missing artifacts are computed: a second run over unchanged inputs
/// reads everything back from the store.
pub fn scan(
    store: &ScanStore,
    source: &dyn PageSource,
    input_dir: &Path,
    layout: &ExamLayout,
    config: &ScanConfig,
) -> Result<(ScanData, ScanSummary), ScanError> {
    let inputs = collect_inputs(input_dir, source)?;
    let mut summary = ScanSummary {
        inputs: inputs.len(),
        ..ScanSummary::default()
    };
    extract(store, source, &inputs, layout, config, &mut summary)?;
    analyze(store, layout, config, &mut summary)?;
    let data = store.load(layout)?;
    store.write_index(&data)?;
    Ok((data, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkbox::CheckboxStatus;
    use crate::config::PipelineConfig;
    use crate::pipeline::ImageFileSource;
    use crate::test_utils::{sample_layout, SheetPainter};

    const PAGE1: [(u32, u32); 3] = [(1, 2), (2, 1), (3, 4)];
    const PAGE2: [(u32, u32); 2] = [(4, 3), (5, 1)];

    fn sheet(document_id: u32, page: u32, answers: &[(u32, u32)], student: &str) -> GrayImage {
        let layout = sample_layout();
        let mut painter = SheetPainter::new(4.0)
            .with_id_band(document_id, page)
            .with_page(&layout, document_id, page, |q, a| answers.contains(&(q, a)));
        if page == 1 {
            if let Some(grid) = &layout.id_grid {
                painter = painter.with_student_id(grid, student);
            }
        }
        painter.finish().to_gray()
    }

    fn write_inputs(dir: &Path) {
        sheet(44, 1, &PAGE1, "21").save(dir.join("a_page1.png")).expect("save");
        sheet(44, 2, &PAGE2, "").save(dir.join("b_page2.png")).expect("save");
        IntensityMatrix::white(1188, 840)
            .to_gray()
            .save(dir.join("c_blank.png"))
            .expect("save");
        sheet(99, 1, &[], "").save(dir.join("d_other.png")).expect("save");
    }

    fn config(workers: usize) -> ScanConfig {
        ScanConfig {
            pipeline: PipelineConfig {
                workers,
                write_debug_dumps: true,
            },
            ..ScanConfig::default()
        }
    }

    #[test]
    fn full_scan_builds_documents_and_skips_failures() {
        let input = tempfile::tempdir().expect("tempdir");
        let root = tempfile::tempdir().expect("tempdir");
        write_inputs(input.path());
        let store = ScanStore::open(root.path()).expect("open store");
        let layout = sample_layout();

        let (data, summary) =
            scan(&store, &ImageFileSource, input.path(), &layout, &config(1)).expect("scan");
        assert_eq!(summary.inputs, 4);
        assert_eq!(summary.extracted, 2);
        assert_eq!(summary.cached, 0);
        let mut reasons: Vec<SkipReason> = summary.skipped.iter().map(|s| s.reason).collect();
        reasons.sort_by_key(|r| r.code());
        assert_eq!(reasons, vec![SkipReason::CalibrationFailed, SkipReason::UnknownDocument]);
        assert_eq!(summary.analyzed_documents, vec![44]);

        let doc = &data.documents[&44];
        let page1 = doc.pages[&1].picture().expect("page 1");
        for (q, question) in &page1.questions {
            for a in question.checked() {
                assert!(PAGE1.contains(&(*q, a)), "unexpected q{q} a{a}");
            }
            assert_eq!(question.checked().count(), 1, "question {q}");
        }
        assert!(!page1.needs_review());
        let student = doc.student().expect("student").effective();
        assert_eq!(student.name, "Alan Turing");
        let page2 = doc.pages[&2].picture().expect("page 2");
        assert_eq!(page2.questions[&4].checked().collect::<Vec<_>>(), vec![3]);
        assert_eq!(data.skipped.len(), 2);
        assert!(root.path().join("index.txt").is_file());
        assert!(root
            .path()
            .join("cache")
            .join(&page1.id.file_hash)
            .join("0.debug.json")
            .is_file());
    }

    #[test]
    fn second_run_reuses_the_cache() {
        let input = tempfile::tempdir().expect("tempdir");
        let root = tempfile::tempdir().expect("tempdir");
        write_inputs(input.path());
        let store = ScanStore::open(root.path()).expect("open store");
        let layout = sample_layout();
        let (first, _) = scan(&store, &ImageFileSource, input.path(), &layout, &config(1)).expect("scan");
        let (second, summary) =
            scan(&store, &ImageFileSource, input.path(), &layout, &config(1)).expect("rescan");
        assert_eq!(summary.extracted, 0);
        assert_eq!(summary.cached, 4);
        assert!(summary.skipped.is_empty());
        assert!(summary.analyzed_documents.is_empty());
        assert_eq!(first, second);

        // a lost checkbox file triggers re-analysis of its whole document
        let pic = &second.documents[&44].pages[&2].pictures[0];
        std::fs::remove_file(root.path().join("cache").join(&pic.id.file_hash).join("checkboxes/0"))
            .expect("remove");
        let (third, summary) =
            scan(&store, &ImageFileSource, input.path(), &layout, &config(1)).expect("rescan");
        assert_eq!(summary.analyzed_documents, vec![44]);
        assert_eq!(third, first);
    }

    #[test]
    fn removed_input_is_pruned() {
        let input = tempfile::tempdir().expect("tempdir");
        let root = tempfile::tempdir().expect("tempdir");
        write_inputs(input.path());
        let store = ScanStore::open(root.path()).expect("open store");
        let layout = sample_layout();
        scan(&store, &ImageFileSource, input.path(), &layout, &config(1)).expect("scan");
        std::fs::remove_file(input.path().join("b_page2.png")).expect("remove");
        let (data, summary) =
            scan(&store, &ImageFileSource, input.path(), &layout, &config(1)).expect("rescan");
        assert_eq!(summary.pruned.len(), 1);
        assert!(!data.documents[&44].pages.contains_key(&2));
    }

    #[test]
    fn worker_pool_matches_sequential_run() {
        let input = tempfile::tempdir().expect("tempdir");
        write_inputs(input.path());
        let layout = sample_layout();
        let mut results = Vec::new();
        for workers in [1, 3] {
            let root = tempfile::tempdir().expect("tempdir");
            let store = ScanStore::open(root.path()).expect("open store");
            let (data, _) =
                scan(&store, &ImageFileSource, input.path(), &layout, &config(workers)).expect("scan");
            let states: Vec<_> = data.documents[&44]
                .pages
                .values()
                .flat_map(|p| p.pictures.iter().map(|pic| pic.effective_states()))
                .collect();
            results.push(states);
        }
        assert_eq!(results[0], results[1]);
    }

    #[test]
    fn page_without_checkboxes_is_scanned() {
        let input = tempfile::tempdir().expect("tempdir");
        let root = tempfile::tempdir().expect("tempdir");
        let mut layout = sample_layout();
        if let Some(pages) = layout.documents.get_mut(&44) {
            pages.insert(3, Vec::new());
        }
        sheet(44, 1, &PAGE1, "21").save(input.path().join("a_page1.png")).expect("save");
        sheet(44, 2, &PAGE2, "").save(input.path().join("b_page2.png")).expect("save");
        sheet(44, 3, &[], "").save(input.path().join("c_cover.png")).expect("save");
        let store = ScanStore::open(root.path()).expect("open store");

        let (data, summary) = scan(&store, &ImageFileSource, input.path(), &layout, &config(1)).expect("scan");
        assert_eq!(summary.extracted, 3);
        assert!(summary.skipped.is_empty());
        let cover = data.documents[&44].pages[&3].picture().expect("page 3");
        assert!(cover.questions.is_empty());
        assert!(!cover.needs_review());
        assert!(crate::conflict::check_integrity(&data, &layout).is_clean());

        let (again, summary) = scan(&store, &ImageFileSource, input.path(), &layout, &config(1)).expect("rescan");
        assert!(summary.analyzed_documents.is_empty());
        assert_eq!(again, data);

        let analysis = analyze_picture(&sheet(44, 3, &[], ""), &layout, &ScanConfig::default()).expect("analysis");
        assert!(analysis.checkboxes.is_empty());
    }

    /// Image files whose page count is unreadable when named `multi.png`.
    struct DamagedPageTree;

    impl PageSource for DamagedPageTree {
        fn accepts(&self, path: &Path) -> bool {
            ImageFileSource.accepts(path)
        }

        fn page_count(&self, path: &Path) -> Result<usize, ScanError> {
            if path.file_name().is_some_and(|n| n == "multi.png") {
                return Err(ScanError::invalid(path, "damaged page tree"));
            }
            ImageFileSource.page_count(path)
        }

        fn render_page(&self, path: &Path, index: usize) -> Result<GrayImage, ScanError> {
            ImageFileSource.render_page(path, index)
        }
    }

    #[test]
    fn uncountable_input_is_reported_not_truncated() {
        let input = tempfile::tempdir().expect("tempdir");
        let root = tempfile::tempdir().expect("tempdir");
        sheet(44, 1, &PAGE1, "21").save(input.path().join("a_page1.png")).expect("save");
        sheet(44, 2, &PAGE2, "").save(input.path().join("multi.png")).expect("save");
        let store = ScanStore::open(root.path()).expect("open store");
        let layout = sample_layout();

        for _ in 0..2 {
            let (data, summary) = scan(&store, &DamagedPageTree, input.path(), &layout, &config(1)).expect("scan");
            assert_eq!(summary.inputs, 2);
            assert_eq!(summary.skipped.len(), 1);
            let skipped = &summary.skipped[0];
            assert_eq!(skipped.reason, SkipReason::Unreadable);
            assert!(skipped.detail.contains("damaged page tree"), "{}", skipped.detail);
            assert!(!data.documents[&44].pages.contains_key(&2));
            assert!(data.skipped.is_empty());
        }
    }

    #[test]
    fn single_picture_analysis_in_memory() {
        let layout = sample_layout();
        let analysis = analyze_picture(&sheet(44, 1, &PAGE1, "30"), &layout, &ScanConfig::default())
            .expect("analysis");
        assert_eq!(analysis.identification, Identification { document_id: 44, page: 1 });
        assert_eq!(analysis.checked(), PAGE1.to_vec());
        assert!(analysis
            .checkboxes
            .iter()
            .all(|(_, s)| matches!(s, CheckboxStatus::Checked | CheckboxStatus::Unchecked)));
        assert_eq!(analysis.student.map(|s| s.name), Some("Grace Hopper".to_string()));

        let page2 = analyze_picture(&sheet(44, 2, &PAGE2, ""), &layout, &ScanConfig::default())
            .expect("analysis");
        assert!(page2.student.is_none());
        let dump = serde_json::to_value(page2.debug_dump("page2.png")).expect("serialize dump");
        assert_eq!(dump["checkboxes"].as_array().map(Vec::len), Some(8));

        let err = analyze_picture(&sheet(99, 1, &[], ""), &layout, &ScanConfig::default()).unwrap_err();
        assert_eq!(err.skip_reason(), SkipReason::UnknownDocument);
    }
}
