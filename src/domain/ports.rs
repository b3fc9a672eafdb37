use crate::domain::model::{BatchRequest, BatchRun, CoordinatePreset, ExtractedFields};
use crate::utils::error::Result;
use image::{GrayImage, RgbImage};
use std::path::Path;

/// One binarized field crop handed to the recognizer, with where it came from.
pub struct RegionCrop<'a> {
    pub document: &'a str,
    pub preset: &'a str,
    pub field: &'a str,
    /// Resolution the page was rendered at.
    pub dpi: u32,
    pub image: &'a GrayImage,
}

pub trait TextRecognizer {
    /// Fails with `RecognitionUnavailable` when the backend cannot be used at all.
    fn check_available(&self) -> Result<()>;

    /// Recognizes a single line of text.
    fn recognize_line(&self, crop: &RegionCrop<'_>) -> Result<String>;
}

pub trait PageRenderer {
    /// Fails with `RecognitionUnavailable` when none of `documents` could be rendered.
    fn check_available(&self, _documents: &[&str]) -> Result<()> {
        Ok(())
    }

    fn render_first_page(&self, document: &Path, dpi: u32) -> Result<RgbImage>;
}

/// Diagnostic hook receiving every page the extractor has read.
pub trait DebugSink {
    fn record(
        &self,
        document: &str,
        preset: &CoordinatePreset,
        page: &RgbImage,
        fields: &ExtractedFields,
    ) -> Result<()>;
}

pub trait Storage {
    fn read_file(&self, path: &str) -> Result<Vec<u8>>;
    fn write_file(&self, path: &str, data: &[u8]) -> Result<()>;
}

/// The three phases of one batch, run in order by `BatchEngine`.
pub trait Pipeline {
    type Staged;
    type Processed;

    /// Validates the submission and builds per-batch state; errors here are fatal.
    fn stage(&self, request: BatchRequest) -> Result<Self::Staged>;
    fn process(&self, staged: Self::Staged) -> Result<Self::Processed>;
    fn package(&self, processed: Self::Processed) -> Result<BatchRun>;
}
