use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub const REG_NUMBER_FIELD: &str = "reg_number";
pub const EXPIRY_DATE_FIELD: &str = "expiry_date";

/// Pixel rectangle `(x0, y0, x1, y1)` on a rendered page, right/bottom exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u32; 4]", into = "[u32; 4]")]
pub struct Region {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl Region {
    pub const fn new(x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> u32 {
        self.x1.saturating_sub(self.x0)
    }

    pub fn height(&self) -> u32 {
        self.y1.saturating_sub(self.y0)
    }
}

impl From<[u32; 4]> for Region {
    fn from([x0, y0, x1, y1]: [u32; 4]) -> Self {
        Self { x0, y0, x1, y1 }
    }
}

impl From<Region> for [u32; 4] {
    fn from(region: Region) -> Self {
        [region.x0, region.y0, region.x1, region.y1]
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {}, {})", self.x0, self.y0, self.x1, self.y1)
    }
}

/// A known certificate layout: render resolution plus where each field sits on the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatePreset {
    pub name: String,
    pub dpi: u32,
    /// Expected page size in pixels at `dpi`.
    pub size: (u32, u32),
    pub regions: BTreeMap<String, Region>,
}

impl CoordinatePreset {
    pub fn region(&self, field: &str) -> Option<&Region> {
        self.regions.get(field)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecognizedField {
    pub field: String,
    pub raw: String,
    pub corrected: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractedFields {
    pub fields: Vec<RecognizedField>,
}

impl ExtractedFields {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.field == field)
            .map(|f| f.corrected.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchRecord {
    pub suffix: String,
    pub identifier: String,
    pub location: String,
}

/// A file handed to the batch, as received.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchRequest {
    pub documents: Vec<Upload>,
    pub lookup: Option<Upload>,
    /// Preset to try first; the configured default when `None`.
    pub preset: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentState {
    Pending,
    PresetResolved,
    PresetExhausted,
    Matched,
    Unmatched,
    Renamed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresetAttempt {
    pub preset: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentFailure {
    #[error("no preset could read a valid registration number and expiry date [{}]", summarize_attempts(.attempts))]
    PresetExhausted { attempts: Vec<PresetAttempt> },

    #[error("expiry date could not be interpreted - {reason}")]
    FieldUnparseable { reason: String },

    #[error("registration number suffix \"{suffix}\" is not in the lookup table")]
    NoMatch { suffix: String },

    #[error("unexpected error - {message}")]
    Unexpected { message: String },
}

fn summarize_attempts(attempts: &[PresetAttempt]) -> String {
    attempts
        .iter()
        .map(|a| format!("{}: {}", a.preset, a.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenamedDocument {
    pub reg_number: String,
    /// `YYYYMMDD`
    pub expiry_date: String,
    pub identifier: String,
    pub location: String,
    pub preset_used: String,
    pub output_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentOutcome {
    Renamed(RenamedDocument),
    Failed(DocumentFailure),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingResult {
    pub source_name: String,
    /// Terminal state, `Renamed` or `Failed`.
    pub state: DocumentState,
    /// Every state the document passed through, starting at `Pending`.
    pub trail: Vec<DocumentState>,
    pub outcome: DocumentOutcome,
}

impl ProcessingResult {
    pub fn renamed(&self) -> Option<&RenamedDocument> {
        match &self.outcome {
            DocumentOutcome::Renamed(doc) => Some(doc),
            DocumentOutcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&DocumentFailure> {
        match &self.outcome {
            DocumentOutcome::Failed(failure) => Some(failure),
            DocumentOutcome::Renamed(_) => None,
        }
    }

    /// Line written to the failure log, `None` for renamed documents.
    pub fn log_line(&self) -> Option<String> {
        self.failure()
            .map(|failure| format!("{}: {}", self.source_name, failure))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutput {
    SingleFile { file_name: String, bytes: Vec<u8> },
    Archive { file_name: String, bytes: Vec<u8> },
    FailureReport { file_name: String, text: String },
}

impl BatchOutput {
    pub fn file_name(&self) -> &str {
        match self {
            Self::SingleFile { file_name, .. }
            | Self::Archive { file_name, .. }
            | Self::FailureReport { file_name, .. } => file_name,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::SingleFile { bytes, .. } | Self::Archive { bytes, .. } => bytes,
            Self::FailureReport { text, .. } => text.as_bytes(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::SingleFile { .. } => "single_file",
            Self::Archive { .. } => "archive",
            Self::FailureReport { .. } => "failure_report",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchRun {
    pub output: BatchOutput,
    pub report: BatchReport,
}

/// Everything one batch produced; the JSON report is a serialization of this.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub requested_preset: String,
    pub output_kind: String,
    pub output_name: String,
    pub renamed: usize,
    pub failed: usize,
    pub results: Vec<ProcessingResult>,
}
