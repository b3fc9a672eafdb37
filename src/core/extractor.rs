use crate::core::correction::correct_ocr_text;
use crate::domain::model::{CoordinatePreset, ExtractedFields, RecognizedField, Region};
use crate::domain::ports::{DebugSink, PageRenderer, RegionCrop, TextRecognizer};
use crate::utils::error::{RenamerError, Result};
use image::{imageops, GrayImage, Luma, RgbImage};
use std::path::Path;

/// Contrast and binarization applied to every crop before recognition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preprocess {
    pub contrast_factor: f32,
    /// Pixels darker than this become black, the rest white.
    pub binarize_threshold: u8,
}

impl Default for Preprocess {
    fn default() -> Self {
        Self {
            contrast_factor: 2.0,
            binarize_threshold: 190,
        }
    }
}

/// Crops `region` out of `page`, clamping it to the page bounds.
pub fn crop_region(page: &RgbImage, region: &Region) -> Result<RgbImage> {
    let x1 = region.x1.min(page.width());
    let y1 = region.y1.min(page.height());
    if region.x0 >= x1 || region.y0 >= y1 {
        return Err(RenamerError::recognition(format!(
            "region {} lies outside the {}x{} page",
            region,
            page.width(),
            page.height()
        )));
    }

    Ok(imageops::crop_imm(page, region.x0, region.y0, x1 - region.x0, y1 - region.y0).to_image())
}

/// Scales every pixel's distance from the mean luminance by `factor`.
pub fn enhance_contrast(image: &GrayImage, factor: f32) -> GrayImage {
    let pixel_count = u64::from(image.width()) * u64::from(image.height());
    if pixel_count == 0 {
        return image.clone();
    }

    let sum: u64 = image.pixels().map(|p| u64::from(p.0[0])).sum();
    let mean = (sum as f32 / pixel_count as f32 + 0.5).floor();

    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let value = mean + factor * (f32::from(pixel.0[0]) - mean);
        *pixel = Luma([(value as i32).clamp(0, 255) as u8]);
    }
    out
}

pub fn binarize(image: &GrayImage, threshold: u8) -> GrayImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let value = if pixel.0[0] < threshold { 0 } else { 255 };
        *pixel = Luma([value]);
    }
    out
}

pub struct RegionExtractor<R: PageRenderer, T: TextRecognizer> {
    renderer: R,
    recognizer: T,
    preprocess: Preprocess,
    debug_sink: Option<Box<dyn DebugSink>>,
}

impl<R: PageRenderer, T: TextRecognizer> RegionExtractor<R, T> {
    pub fn new(renderer: R, recognizer: T, preprocess: Preprocess) -> Self {
        Self {
            renderer,
            recognizer,
            preprocess,
            debug_sink: None,
        }
    }

    pub fn with_debug_sink(mut self, sink: Box<dyn DebugSink>) -> Self {
        self.debug_sink = Some(sink);
        self
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn recognizer(&self) -> &T {
        &self.recognizer
    }

    /// Crop, grayscale, contrast and threshold one region.
    pub fn prepare_region(&self, page: &RgbImage, region: &Region) -> Result<GrayImage> {
        let crop = crop_region(page, region)?;
        let gray = imageops::grayscale(&crop);
        let enhanced = enhance_contrast(&gray, self.preprocess.contrast_factor);
        Ok(binarize(&enhanced, self.preprocess.binarize_threshold))
    }

    /// Reads every region of `preset` from the first page of `document`.
    pub fn extract(
        &self,
        document: &Path,
        document_name: &str,
        preset: &CoordinatePreset,
    ) -> Result<ExtractedFields> {
        let page = self.renderer.render_first_page(document, preset.dpi)?;
        if page.dimensions() != preset.size {
            tracing::debug!(
                "Rendered page is {}x{}, preset '{}' expects {}x{}",
                page.width(),
                page.height(),
                preset.name,
                preset.size.0,
                preset.size.1
            );
        }

        let mut extracted = ExtractedFields::default();
        for (field, region) in &preset.regions {
            let image = self.prepare_region(&page, region)?;
            let crop = RegionCrop {
                document: document_name,
                preset: &preset.name,
                field,
                dpi: preset.dpi,
                image: &image,
            };
            let raw = self.recognizer.recognize_line(&crop)?.trim().to_string();
            let corrected = correct_ocr_text(&raw);
            tracing::debug!("[{}] {}: '{}' -> '{}'", preset.name, field, raw, corrected);

            extracted.fields.push(RecognizedField {
                field: field.clone(),
                raw,
                corrected,
            });
        }

        if let Some(sink) = &self.debug_sink {
            if let Err(e) = sink.record(document_name, preset, &page, &extracted) {
                tracing::warn!("Debug image for {} not written: {}", document_name, e);
            }
        }

        Ok(extracted)
    }
}
