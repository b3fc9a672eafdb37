use anyhow::Result;
use image::{ImageFormat, Rgb, RgbImage};
use inspection_renamer::config::toml_config::RenderSettings;
use inspection_renamer::core::extractor::RegionExtractor;
use inspection_renamer::domain::model::{BatchOutput, BatchRequest, DocumentFailure, DocumentState, Upload};
use inspection_renamer::domain::ports::{RegionCrop, TextRecognizer};
use inspection_renamer::{
    AnnotatedPageWriter, BatchEngine, PdftoppmRenderer, RenamePipeline, RenamerConfig, RenamerError,
};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use tempfile::TempDir;

const CONFIG: &str = r#"
default_preset = "old"

[[presets]]
name = "old"
dpi = 72
size = [64, 64]
[presets.regions]
reg_number = [0, 0, 32, 16]
expiry_date = [0, 32, 32, 48]

[[presets]]
name = "new"
dpi = 72
size = [64, 64]
[presets.regions]
reg_number = [32, 0, 64, 16]
expiry_date = [32, 32, 64, 48]
"#;

/// Answers by (document, preset, field); unknown keys read as empty lines.
#[derive(Default)]
struct ScriptedOcr {
    available: bool,
    lines: HashMap<(String, String, String), String>,
}

impl ScriptedOcr {
    fn available() -> Self {
        Self {
            available: true,
            ..Self::default()
        }
    }

    fn reads(mut self, document: &str, preset: &str, reg: &str, expiry: &str) -> Self {
        for (field, text) in [("reg_number", reg), ("expiry_date", expiry)] {
            self.lines.insert(
                (document.to_string(), preset.to_string(), field.to_string()),
                text.to_string(),
            );
        }
        self
    }
}

impl TextRecognizer for ScriptedOcr {
    fn check_available(&self) -> inspection_renamer::Result<()> {
        if self.available {
            Ok(())
        } else {
            Err(RenamerError::RecognitionUnavailable {
                message: "tesseract: not found".to_string(),
            })
        }
    }

    fn recognize_line(&self, crop: &RegionCrop<'_>) -> inspection_renamer::Result<String> {
        Ok(self
            .lines
            .get(&(
                crop.document.to_string(),
                crop.preset.to_string(),
                crop.field.to_string(),
            ))
            .cloned()
            .unwrap_or_default())
    }
}

fn page_png() -> Result<Vec<u8>> {
    let page = RgbImage::from_pixel(64, 64, Rgb([255, 255, 255]));
    let mut bytes = Cursor::new(Vec::new());
    page.write_to(&mut bytes, ImageFormat::Png)?;
    Ok(bytes.into_inner())
}

fn renderer() -> PdftoppmRenderer {
    // PNG 頁面直接讀取，不經過 pdftoppm
    PdftoppmRenderer::new(&RenderSettings {
        pdftoppm_path: PathBuf::from("/nonexistent/pdftoppm"),
    })
}

fn engine(ocr: ScriptedOcr) -> Result<BatchEngine<RenamePipeline<PdftoppmRenderer, ScriptedOcr>>> {
    let config = RenamerConfig::from_toml_str(CONFIG)?;
    let extractor = RegionExtractor::new(renderer(), ocr, config.preprocess());
    Ok(BatchEngine::new(RenamePipeline::new(extractor, &config)?))
}

fn request(documents: &[&str], lookup: &[u8]) -> Result<BatchRequest> {
    let page = page_png()?;
    Ok(BatchRequest {
        documents: documents
            .iter()
            .map(|name| Upload::new(*name, page.clone()))
            .collect(),
        lookup: Some(Upload::new("lookup.csv", lookup.to_vec())),
        preset: None,
    })
}

const LOOKUP: &str = "A-100,1234,大阪本社\nB-200,7,東京支店\n";

#[test]
fn test_second_preset_is_used_when_first_fails() -> Result<()> {
    let ocr = ScriptedOcr::available()
        .reads("scan.png", "old", "読めない", "")
        .reads("scan.png", "new", "品川 500 さ 1234", "令和 7年 6月 1日");

    let run = engine(ocr)?.run(request(&["scan.png"], LOOKUP.as_bytes())?)?;

    assert_eq!(run.output.file_name(), "20250601_A-100_大阪本社_品川500さ1234.png");
    let renamed = run.report.results[0].renamed().expect("renamed");
    assert_eq!(renamed.preset_used, "new");
    assert_eq!(run.report.requested_preset, "old");
    Ok(())
}

#[test]
fn test_one_success_among_three_returns_single_file() -> Result<()> {
    let ocr = ScriptedOcr::available()
        .reads("a.png", "old", "品川500さ1234", "令和7年6月1日")
        .reads("b.png", "old", "品川500あ5555", "令和7年6月1日")
        .reads("c.png", "old", "品川500あ7", "令和7年2月30日");

    let run = engine(ocr)?.run(request(&["a.png", "b.png", "c.png"], LOOKUP.as_bytes())?)?;

    assert!(matches!(run.output, BatchOutput::SingleFile { .. }));
    assert_eq!(run.report.renamed, 1);
    assert_eq!(run.report.failed, 2);
    assert_eq!(
        run.report.results[1].failure(),
        Some(&DocumentFailure::NoMatch {
            suffix: "5555".to_string()
        })
    );
    assert!(matches!(
        run.report.results[2].failure(),
        Some(DocumentFailure::FieldUnparseable { .. })
    ));
    Ok(())
}

#[test]
fn test_many_successes_produce_archive_with_failure_log() -> Result<()> {
    let ocr = ScriptedOcr::available()
        .reads("a.png", "old", "品川500さ1234", "令和7年6月1日")
        .reads("b.png", "new", "品川500あ7", "令和8年1月3l日")
        .reads("c.png", "old", "", "");

    let run = engine(ocr)?.run(request(&["a.png", "b.png", "c.png"], LOOKUP.as_bytes())?)?;
    assert_eq!(run.output.file_name(), "renamed_files.zip");

    let mut archive = zip::ZipArchive::new(Cursor::new(run.output.bytes().to_vec()))?;
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "20250601_A-100_大阪本社_品川500さ1234.png",
            "20260131_B-200_東京支店_品川500あ7.png",
            "処理ログ.txt",
        ]
    );

    let mut log = String::new();
    archive.by_name("処理ログ.txt")?.read_to_string(&mut log)?;
    assert!(log.starts_with("documents: 3, renamed: 2, failed: 1"));
    assert!(log.contains("c.png: no preset could read"));
    Ok(())
}

#[test]
fn test_all_failures_produce_report() -> Result<()> {
    let ocr = ScriptedOcr::available().reads("a.png", "old", "品川500さ1234", "平成30年6月1日");

    let run = engine(ocr)?.run(request(&["a.png"], LOOKUP.as_bytes())?)?;

    match &run.output {
        BatchOutput::FailureReport { file_name, text } => {
            assert_eq!(file_name, "failure_log.txt");
            assert!(text.contains("a.png: no preset could read"));
            assert!(text.contains("era year"));
        }
        other => panic!("expected failure report, got {}", other.kind()),
    }
    assert_eq!(
        run.report.results[0].trail,
        vec![
            DocumentState::Pending,
            DocumentState::PresetExhausted,
            DocumentState::Failed
        ]
    );
    Ok(())
}

#[test]
fn test_shift_jis_lookup_is_decoded() -> Result<()> {
    let (encoded, _, had_errors) = encoding_rs::SHIFT_JIS.encode(LOOKUP);
    assert!(!had_errors);
    let ocr = ScriptedOcr::available().reads("a.png", "old", "品川500あ7", "令和7年12月1日");

    let run = engine(ocr)?.run(request(&["a.png"], &encoded)?)?;
    assert_eq!(run.output.file_name(), "20251201_B-200_東京支店_品川500あ7.png");
    Ok(())
}

#[test]
fn test_undecodable_lookup_is_fatal() -> Result<()> {
    let ocr = ScriptedOcr::available().reads("a.png", "old", "品川500あ7", "令和7年12月1日");
    let err = engine(ocr)?
        .run(request(&["a.png"], &[0xff, 0xfe, 0x80, 0x81, 0xfc])?)
        .unwrap_err();
    assert!(matches!(err, RenamerError::UploadInvalid { .. }));
    Ok(())
}

#[test]
fn test_unavailable_recognizer_is_fatal() -> Result<()> {
    let err = engine(ScriptedOcr::default())?
        .run(request(&["a.png"], LOOKUP.as_bytes())?)
        .unwrap_err();
    assert!(matches!(err, RenamerError::RecognitionUnavailable { .. }));
    Ok(())
}

#[test]
fn test_missing_pdftoppm_is_fatal_for_pdf_batches() -> Result<()> {
    let ocr = ScriptedOcr::available().reads("a.png", "old", "品川500あ7", "令和7年12月1日");
    let err = engine(ocr)?
        .run(request(&["a.png", "scan.pdf"], LOOKUP.as_bytes())?)
        .unwrap_err();
    assert!(matches!(err, RenamerError::RecognitionUnavailable { .. }));
    Ok(())
}

#[test]
fn test_huge_era_year_fails_only_that_document() -> Result<()> {
    let ocr = ScriptedOcr::available()
        .reads("a.png", "old", "品川500さ1234", "令和7年6月1日")
        .reads("b.png", "old", "品川500あ7", "令和2147483647年6月1日");

    let run = engine(ocr)?.run(request(&["a.png", "b.png"], LOOKUP.as_bytes())?)?;
    assert_eq!(run.report.renamed, 1);
    assert!(matches!(
        run.report.results[1].failure(),
        Some(DocumentFailure::PresetExhausted { .. })
    ));
    Ok(())
}

#[test]
fn test_debug_images_are_written_for_each_attempt() -> Result<()> {
    let debug_dir = TempDir::new()?;
    let config = RenamerConfig::from_toml_str(CONFIG)?;
    let ocr = ScriptedOcr::available()
        .reads("scan.png", "new", "品川500さ1234", "令和7年6月1日");
    let extractor = RegionExtractor::new(renderer(), ocr, config.preprocess())
        .with_debug_sink(Box::new(AnnotatedPageWriter::new(debug_dir.path(), None)?));
    let engine = BatchEngine::new(RenamePipeline::new(extractor, &config)?);

    engine.run(request(&["scan.png"], LOOKUP.as_bytes())?)?;

    assert!(debug_dir.path().join("debug_scan_old.png").exists());
    assert!(debug_dir.path().join("debug_scan_new.png").exists());
    Ok(())
}
