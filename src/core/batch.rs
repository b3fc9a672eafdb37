use crate::adapters::storage::{replace_unsafe_chars, sanitize_upload_name, Workspace, FILENAME_UNSAFE_CHARS};
use crate::config::toml_config::{OutputConfig, RenamerConfig};
use crate::core::archive::build_archive;
use crate::core::extractor::RegionExtractor;
use crate::core::matching::{LookupEncoding, MatchTable};
use crate::core::resolver::{PresetResolver, Resolution};
use crate::core::validators::ExpiryDateParser;
use crate::domain::model::{
    BatchOutput, BatchReport, BatchRequest, BatchRun, DocumentFailure, DocumentOutcome,
    DocumentState, MatchRecord, ProcessingResult, RenamedDocument, Upload,
};
use crate::domain::ports::{PageRenderer, Pipeline, TextRecognizer};
use crate::utils::error::{RenamerError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const INCOMING_DIR: &str = "incoming";
const RENAMED_DIR: &str = "renamed";

/// `{date}_{identifier}_{location}_{registration}` plus the source extension, made filesystem safe.
pub fn build_output_name(
    expiry_date: &str,
    record: &MatchRecord,
    reg_number: &str,
    source_name: &str,
    placeholder: &str,
) -> String {
    let mut name = format!(
        "{}_{}_{}_{}",
        expiry_date, record.identifier, record.location, reg_number
    );
    if let Some(ext) = Path::new(source_name).extension().and_then(|e| e.to_str()) {
        name.push('.');
        name.push_str(ext);
    }
    replace_unsafe_chars(&name, FILENAME_UNSAFE_CHARS, placeholder)
}

/// Failure log body: summary line, blank line, one line per failed document.
pub fn failure_log_text(results: &[ProcessingResult]) -> String {
    let renamed = results.iter().filter(|r| r.renamed().is_some()).count();
    let mut text = format!(
        "documents: {}, renamed: {}, failed: {}\n",
        results.len(),
        renamed,
        results.len() - renamed
    );
    let lines: Vec<String> = results.iter().filter_map(ProcessingResult::log_line).collect();
    if !lines.is_empty() {
        text.push('\n');
        text.push_str(&lines.join("\n"));
        text.push('\n');
    }
    text
}

pub fn failure_report_text(results: &[ProcessingResult]) -> String {
    let lines: Vec<String> = results.iter().filter_map(ProcessingResult::log_line).collect();
    format!("All documents failed to process.\n\n{}\n", lines.join("\n"))
}

/// 追蹤單一文件的狀態轉移
struct StateTrail<'a> {
    document: &'a str,
    states: Vec<DocumentState>,
}

impl<'a> StateTrail<'a> {
    fn new(document: &'a str) -> Self {
        Self {
            document,
            states: vec![DocumentState::Pending],
        }
    }

    fn advance(&mut self, next: DocumentState) {
        let current = self.states.last().copied().unwrap_or(DocumentState::Pending);
        debug!("{}: {:?} -> {:?}", self.document, current, next);
        self.states.push(next);
    }

    fn fail(mut self, failure: DocumentFailure) -> ProcessingResult {
        self.advance(DocumentState::Failed);
        warn!("❌ {}: {}", self.document, failure);
        ProcessingResult {
            source_name: self.document.to_string(),
            state: DocumentState::Failed,
            trail: self.states,
            outcome: DocumentOutcome::Failed(failure),
        }
    }

    fn rename(mut self, renamed: RenamedDocument) -> ProcessingResult {
        self.advance(DocumentState::Renamed);
        info!("✅ {} -> {}", self.document, renamed.output_name);
        ProcessingResult {
            source_name: self.document.to_string(),
            state: DocumentState::Renamed,
            trail: self.states,
            outcome: DocumentOutcome::Renamed(renamed),
        }
    }
}

fn unexpected(error: RenamerError) -> DocumentFailure {
    DocumentFailure::Unexpected {
        message: error.to_string(),
    }
}

#[derive(Debug)]
pub struct StagedBatch {
    workspace: Workspace,
    documents: Vec<Upload>,
    table: MatchTable,
    preset: String,
}

impl StagedBatch {
    pub fn workspace_path(&self) -> &Path {
        self.workspace.path()
    }

    pub fn table(&self) -> &MatchTable {
        &self.table
    }
}

#[derive(Debug)]
pub struct ProcessedBatch {
    workspace: Workspace,
    preset: String,
    results: Vec<ProcessingResult>,
    /// Distinct output files in the order they were first produced.
    outputs: Vec<(String, PathBuf)>,
}

impl ProcessedBatch {
    pub fn results(&self) -> &[ProcessingResult] {
        &self.results
    }

    pub fn output_names(&self) -> Vec<&str> {
        self.outputs.iter().map(|(name, _)| name.as_str()).collect()
    }
}

/// Renames a batch of inspection certificates from their recognized fields.
pub struct RenamePipeline<R: PageRenderer, T: TextRecognizer> {
    extractor: RegionExtractor<R, T>,
    resolver: PresetResolver,
    default_preset: String,
    encodings: Vec<LookupEncoding>,
    output: OutputConfig,
}

impl<R: PageRenderer, T: TextRecognizer> RenamePipeline<R, T> {
    pub fn new(extractor: RegionExtractor<R, T>, config: &RenamerConfig) -> Result<Self> {
        let parser = ExpiryDateParser::new(&config.era)?;
        Ok(Self {
            extractor,
            resolver: PresetResolver::new(config.presets.clone(), parser),
            default_preset: config.default_preset.clone(),
            encodings: config.matching.encodings.clone(),
            output: config.output.clone(),
        })
    }

    pub fn resolver(&self) -> &PresetResolver {
        &self.resolver
    }

    fn process_document(
        &self,
        workspace: &Workspace,
        table: &MatchTable,
        preset: &str,
        upload: &Upload,
    ) -> ProcessingResult {
        let source_name = sanitize_upload_name(&upload.file_name);
        let mut trail = StateTrail::new(&source_name);

        let staged = match workspace.stage(INCOMING_DIR, upload) {
            Ok(path) => path,
            Err(e) => return trail.fail(unexpected(e)),
        };

        let resolved = match self
            .resolver
            .resolve(&self.extractor, &staged, &source_name, preset)
        {
            Resolution::Resolved(resolved) => {
                trail.advance(DocumentState::PresetResolved);
                resolved
            }
            Resolution::Exhausted(attempts) => {
                trail.advance(DocumentState::PresetExhausted);
                return trail.fail(DocumentFailure::PresetExhausted { attempts });
            }
        };

        if let Err(e) = resolved.expiry.to_calendar_date() {
            return trail.fail(DocumentFailure::FieldUnparseable {
                reason: e.to_string(),
            });
        }
        let expiry_date = resolved.expiry.compact();

        let (suffix, record) = table.lookup(&resolved.reg_number);
        let record = match record {
            Some(record) => {
                trail.advance(DocumentState::Matched);
                record
            }
            None => {
                trail.advance(DocumentState::Unmatched);
                return trail.fail(DocumentFailure::NoMatch { suffix });
            }
        };

        let output_name = build_output_name(
            &expiry_date,
            record,
            &resolved.reg_number,
            &source_name,
            &self.output.unsafe_char_placeholder,
        );
        let target = workspace.path().join(RENAMED_DIR).join(&output_name);
        if target.exists() {
            warn!("Output name '{}' already produced, replacing it", output_name);
        }
        if let Err(e) = fs::rename(&staged, &target) {
            return trail.fail(unexpected(e.into()));
        }

        trail.rename(RenamedDocument {
            reg_number: resolved.reg_number,
            expiry_date,
            identifier: record.identifier.clone(),
            location: record.location.clone(),
            preset_used: resolved.preset,
            output_name,
        })
    }
}

impl<R: PageRenderer, T: TextRecognizer> Pipeline for RenamePipeline<R, T> {
    type Staged = StagedBatch;
    type Processed = ProcessedBatch;

    fn stage(&self, request: BatchRequest) -> Result<StagedBatch> {
        self.extractor.recognizer().check_available()?;

        let lookup = match request.lookup {
            Some(lookup) if !request.documents.is_empty() => lookup,
            _ => {
                return Err(RenamerError::upload_invalid(
                    "both the documents and the lookup file are required",
                ))
            }
        };

        let names: Vec<&str> = request
            .documents
            .iter()
            .map(|doc| doc.file_name.as_str())
            .collect();
        self.extractor.renderer().check_available(&names)?;

        let table = MatchTable::from_bytes(&lookup.bytes, &self.encodings)?;
        if table.is_empty() {
            warn!("Lookup file '{}' has no usable rows", lookup.file_name);
        }

        let workspace = Workspace::new()?;
        fs::create_dir_all(workspace.path().join(RENAMED_DIR))?;

        let preset = request
            .preset
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| self.default_preset.clone());

        Ok(StagedBatch {
            workspace,
            documents: request.documents,
            table,
            preset,
        })
    }

    fn process(&self, staged: StagedBatch) -> Result<ProcessedBatch> {
        let StagedBatch {
            workspace,
            documents,
            table,
            preset,
        } = staged;

        let mut results = Vec::with_capacity(documents.len());
        let mut outputs: Vec<(String, PathBuf)> = Vec::new();

        for upload in &documents {
            let result = self.process_document(&workspace, &table, &preset, upload);
            if let Some(renamed) = result.renamed() {
                let path = workspace.path().join(RENAMED_DIR).join(&renamed.output_name);
                if !outputs.iter().any(|(name, _)| name == &renamed.output_name) {
                    outputs.push((renamed.output_name.clone(), path));
                }
            }
            results.push(result);
        }

        Ok(ProcessedBatch {
            workspace,
            preset,
            results,
            outputs,
        })
    }

    fn package(&self, processed: ProcessedBatch) -> Result<BatchRun> {
        let ProcessedBatch {
            workspace,
            preset,
            results,
            outputs,
        } = processed;

        let output = match outputs.as_slice() {
            [] => BatchOutput::FailureReport {
                file_name: self.output.failure_report_name.clone(),
                text: failure_report_text(&results),
            },
            [(name, path)] => BatchOutput::SingleFile {
                file_name: name.clone(),
                bytes: fs::read(path)?,
            },
            many => {
                let mut files = Vec::with_capacity(many.len());
                for (name, path) in many {
                    files.push((name.clone(), fs::read(path)?));
                }
                BatchOutput::Archive {
                    file_name: self.output.archive_name.clone(),
                    bytes: build_archive(
                        &files,
                        &self.output.failure_log_name,
                        &failure_log_text(&results),
                    )?,
                }
            }
        };

        if let Err(e) = workspace.close() {
            warn!("Workspace could not be removed: {}", e);
        }

        let renamed = results.iter().filter(|r| r.renamed().is_some()).count();
        let report = BatchReport {
            requested_preset: preset,
            output_kind: output.kind().to_string(),
            output_name: output.file_name().to_string(),
            renamed,
            failed: results.len() - renamed,
            results,
        };

        Ok(BatchRun { output, report })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::extractor::Preprocess;
    use crate::domain::model::{Region, EXPIRY_DATE_FIELD, REG_NUMBER_FIELD};
    use crate::domain::ports::RegionCrop;
    use crate::domain::model::CoordinatePreset;
    use image::RgbImage;
    use std::collections::{BTreeMap, HashMap};
    use std::io::Read;

    struct BlankPage;

    impl PageRenderer for BlankPage {
        fn render_first_page(&self, _document: &Path, _dpi: u32) -> Result<RgbImage> {
            Ok(RgbImage::new(64, 64))
        }
    }

    /// (document, field) -> text
    struct ByDocument {
        available: bool,
        texts: HashMap<(String, String), String>,
    }

    impl TextRecognizer for ByDocument {
        fn check_available(&self) -> Result<()> {
            if self.available {
                Ok(())
            } else {
                Err(RenamerError::RecognitionUnavailable {
                    message: "tesseract not installed".to_string(),
                })
            }
        }

        fn recognize_line(&self, crop: &RegionCrop<'_>) -> Result<String> {
            Ok(self
                .texts
                .get(&(crop.document.to_string(), crop.field.to_string()))
                .cloned()
                .unwrap_or_default())
        }
    }

    fn config() -> RenamerConfig {
        let mut regions = BTreeMap::new();
        regions.insert(REG_NUMBER_FIELD.to_string(), Region::new(0, 0, 32, 16));
        regions.insert(EXPIRY_DATE_FIELD.to_string(), Region::new(0, 32, 32, 48));
        RenamerConfig {
            default_preset: "only".to_string(),
            presets: vec![CoordinatePreset {
                name: "only".to_string(),
                dpi: 72,
                size: (64, 64),
                regions,
            }],
            ..RenamerConfig::default()
        }
    }

    fn pipeline(available: bool, docs: &[(&str, &str, &str)]) -> RenamePipeline<BlankPage, ByDocument> {
        let mut texts = HashMap::new();
        for (doc, reg, date) in docs {
            texts.insert((doc.to_string(), REG_NUMBER_FIELD.to_string()), reg.to_string());
            texts.insert((doc.to_string(), EXPIRY_DATE_FIELD.to_string()), date.to_string());
        }
        let extractor = RegionExtractor::new(
            BlankPage,
            ByDocument { available, texts },
            Preprocess::default(),
        );
        RenamePipeline::new(extractor, &config()).unwrap()
    }

    fn request(names: &[&str]) -> BatchRequest {
        BatchRequest {
            documents: names
                .iter()
                .map(|n| Upload::new(*n, format!("content of {}", n).into_bytes()))
                .collect(),
            lookup: Some(Upload::new(
                "lookup.csv",
                "A1,1234,大阪\nA2,0007,東京\n".as_bytes().to_vec(),
            )),
            preset: None,
        }
    }

    fn run(p: &RenamePipeline<BlankPage, ByDocument>, req: BatchRequest) -> Result<BatchRun> {
        let staged = p.stage(req)?;
        let processed = p.process(staged)?;
        p.package(processed)
    }

    #[test]
    fn test_output_name_format_and_sanitizing() {
        let record = MatchRecord {
            suffix: "1234".to_string(),
            identifier: "A/1".to_string(),
            location: "大阪".to_string(),
        };
        assert_eq!(
            build_output_name("20250601", &record, "品川500さ1234", "scan.PDF", "_"),
            "20250601_A_1_大阪_品川500さ1234.PDF"
        );
        assert_eq!(
            build_output_name("20250601", &record, "品川500さ1234", "scan", "-"),
            "20250601_A-1_大阪_品川500さ1234"
        );
    }

    #[test]
    fn test_single_success_returns_the_file() {
        let p = pipeline(
            true,
            &[
                ("a.pdf", "品川500さ1234", "令和7年6月1日"),
                ("b.pdf", "読めない", "令和7年6月1日"),
                ("c.pdf", "品川500あ9999", "令和7年6月1日"),
            ],
        );
        let run = run(&p, request(&["a.pdf", "b.pdf", "c.pdf"])).unwrap();

        assert_eq!(
            run.output,
            BatchOutput::SingleFile {
                file_name: "20250601_A1_大阪_品川500さ1234.pdf".to_string(),
                bytes: b"content of a.pdf".to_vec(),
            }
        );
        assert_eq!(run.report.renamed, 1);
        assert_eq!(run.report.failed, 2);
        assert!(matches!(
            run.report.results[1].failure(),
            Some(DocumentFailure::PresetExhausted { .. })
        ));
        assert_eq!(
            run.report.results[2].failure(),
            Some(&DocumentFailure::NoMatch {
                suffix: "9999".to_string()
            })
        );
        assert_eq!(
            run.report.results[2].trail,
            vec![
                DocumentState::Pending,
                DocumentState::PresetResolved,
                DocumentState::Unmatched,
                DocumentState::Failed,
            ]
        );
    }

    #[test]
    fn test_many_successes_are_archived_with_log() {
        let p = pipeline(
            true,
            &[
                ("a.pdf", "品川500さ1234", "令和7年6月1日"),
                ("b.png", "品川500あ7", "令和8年1月31日"),
                ("c.pdf", "品川500あ7", "令和7年2月30日"),
            ],
        );
        let run = run(&p, request(&["a.pdf", "b.png", "c.pdf"])).unwrap();
        assert_eq!(run.output.file_name(), "renamed_files.zip");

        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(run.output.bytes().to_vec())).unwrap();
        assert_eq!(archive.len(), 3);
        assert!(archive.by_name("20260131_A2_東京_品川500あ7.png").is_ok());

        let mut log = String::new();
        archive.by_name("処理ログ.txt").unwrap().read_to_string(&mut log).unwrap();
        assert!(log.starts_with("documents: 3, renamed: 2, failed: 1"));
        assert!(log.contains("c.pdf: expiry date could not be interpreted"));
    }

    #[test]
    fn test_identical_output_names_collapse_to_one_file() {
        let p = pipeline(
            true,
            &[
                ("a.pdf", "品川500さ1234", "令和7年6月1日"),
                ("b.pdf", "品川500さ1234", "令和7年6月1日"),
            ],
        );
        let run = run(&p, request(&["a.pdf", "b.pdf"])).unwrap();

        assert_eq!(run.report.renamed, 2);
        assert_eq!(
            run.output,
            BatchOutput::SingleFile {
                file_name: "20250601_A1_大阪_品川500さ1234.pdf".to_string(),
                bytes: b"content of b.pdf".to_vec(),
            }
        );
    }

    #[test]
    fn test_total_failure_produces_report() {
        let p = pipeline(true, &[("a.pdf", "品川500あ9999", "令和7年6月1日")]);
        let run = run(&p, request(&["a.pdf"])).unwrap();

        match &run.output {
            BatchOutput::FailureReport { file_name, text } => {
                assert_eq!(file_name, "failure_log.txt");
                assert!(text.starts_with("All documents failed to process."));
                assert!(text.contains("a.pdf: registration number suffix \"9999\""));
            }
            other => panic!("unexpected output {:?}", other),
        }
    }

    #[test]
    fn test_fatal_errors_before_any_document() {
        let p = pipeline(false, &[]);
        let err = p.stage(request(&["a.pdf"])).unwrap_err();
        assert!(matches!(err, RenamerError::RecognitionUnavailable { .. }));

        let p = pipeline(true, &[]);
        let mut missing_lookup = request(&["a.pdf"]);
        missing_lookup.lookup = None;
        assert!(matches!(
            p.stage(missing_lookup).unwrap_err(),
            RenamerError::UploadInvalid { .. }
        ));
        assert!(matches!(
            p.stage(request(&[])).unwrap_err(),
            RenamerError::UploadInvalid { .. }
        ));
    }

    #[test]
    fn test_workspace_removed_after_package() {
        let p = pipeline(true, &[("a.pdf", "品川500さ1234", "令和7年6月1日")]);
        let staged = p.stage(request(&["a.pdf"])).unwrap();
        let path = staged.workspace_path().to_path_buf();
        assert!(path.exists());

        let processed = p.process(staged).unwrap();
        p.package(processed).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_workspace_removed_when_every_document_fails() {
        let p = pipeline(true, &[("a.pdf", "読めない", "")]);
        let staged = p.stage(request(&["a.pdf"])).unwrap();
        let path = staged.workspace_path().to_path_buf();

        let processed = p.process(staged).unwrap();
        let run = p.package(processed).unwrap();
        assert_eq!(run.output.kind(), "failure_report");
        assert!(!path.exists());
    }

    #[test]
    fn test_workspace_removed_when_batch_is_abandoned() {
        let p = pipeline(true, &[("a.pdf", "品川500さ1234", "令和7年6月1日")]);
        let staged = p.stage(request(&["a.pdf"])).unwrap();
        let path = staged.workspace_path().to_path_buf();

        let processed = p.process(staged).unwrap();
        assert!(path.exists());
        drop(processed);
        assert!(!path.exists());
    }

    struct MissingPdfTool;

    impl PageRenderer for MissingPdfTool {
        fn check_available(&self, _documents: &[&str]) -> Result<()> {
            Err(RenamerError::RecognitionUnavailable {
                message: "pdftoppm: not found".to_string(),
            })
        }

        fn render_first_page(&self, _document: &Path, _dpi: u32) -> Result<RgbImage> {
            panic!("renderer must not run when unavailable");
        }
    }

    #[test]
    fn test_unavailable_renderer_is_fatal_before_any_document() {
        let extractor = RegionExtractor::new(
            MissingPdfTool,
            ByDocument {
                available: true,
                texts: HashMap::new(),
            },
            Preprocess::default(),
        );
        let p = RenamePipeline::new(extractor, &config()).unwrap();

        let err = p.stage(request(&["a.pdf"])).unwrap_err();
        assert!(matches!(err, RenamerError::RecognitionUnavailable { .. }));
    }

    #[test]
    fn test_failure_log_summary_without_failures() {
        assert_eq!(failure_log_text(&[]), "documents: 0, renamed: 0, failed: 0\n");
    }
}
