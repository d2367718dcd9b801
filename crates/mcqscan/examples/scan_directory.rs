use mcqscan::{Console, ImageFileSource, PngPreview, ScanConfig, ScanStore, Scanner};
use std::error::Error;
use std::path::Path;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 4 {
        eprintln!(
            "Usage: {} <exam.json> <scans_dir> <store_dir> [config.json]",
            args[0]
        );
        std::process::exit(2);
    }

    let mut scanner = Scanner::from_layout_json_file(Path::new(&args[1]))?;
    if let Some(config) = args.get(4) {
        *scanner.config_mut() = ScanConfig::from_json_file(Path::new(config))?;
    }
    let store = ScanStore::open(Path::new(&args[3]))?;

    let (mut data, summary) = scanner.scan(&store, &ImageFileSource, Path::new(&args[2]))?;
    println!(
        "{} inputs: {} extracted, {} cached, {} skipped.",
        summary.inputs,
        summary.extracted,
        summary.cached,
        summary.skipped.len()
    );
    for skipped in &summary.skipped {
        println!("  {} skipped ({}): {}", skipped.picture, skipped.reason, skipped.detail);
    }

    let mut preview = PngPreview::new(store.root().join("preview.png"));
    println!("Review pictures are written to {}.", preview.path().display());
    let report = scanner.resolve(&store, &mut data, &mut Console::stdio(), &mut preview)?;
    for (doc, pages) in &report.missing_pages {
        println!("Document {doc}: missing page(s) {pages:?}.");
    }
    report.ensure_complete()?;

    for doc in data.active_documents() {
        let name = doc
            .student()
            .map(|s| s.effective().name.clone())
            .unwrap_or_default();
        println!("Document {} ({name}):", doc.id);
        for page in doc.pages.values() {
            let Some(picture) = page.picture() else { continue };
            for question in picture.questions.values() {
                let checked: Vec<_> = question.checked().collect();
                println!("  q{}: {checked:?}", question.number);
            }
        }
    }
    Ok(())
}
