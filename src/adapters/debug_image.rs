use crate::adapters::storage::{replace_unsafe_chars, FILENAME_UNSAFE_CHARS};
use crate::domain::model::{CoordinatePreset, ExtractedFields};
use crate::domain::ports::DebugSink;
use crate::utils::error::{RenamerError, Result};
use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};

const OUTLINE: Rgb<u8> = Rgb([255, 0, 0]);
const OUTLINE_WIDTH: u32 = 3;
const LABEL_SCALE: f32 = 24.0;

/// Saves each page with the preset's regions outlined (and labelled when a font is given).
pub struct AnnotatedPageWriter {
    dir: PathBuf,
    font: Option<FontVec>,
}

impl AnnotatedPageWriter {
    pub fn new(dir: impl Into<PathBuf>, font_path: Option<&Path>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let font = match font_path {
            Some(path) => {
                let bytes = std::fs::read(path)?;
                let font = FontVec::try_from_vec(bytes).map_err(|e| RenamerError::ConfigError {
                    message: format!("font {} could not be loaded: {}", path.display(), e),
                })?;
                Some(font)
            }
            None => None,
        };

        Ok(Self { dir, font })
    }

    pub fn output_path(&self, document: &str, preset: &str) -> PathBuf {
        let stem = Path::new(document)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(document);
        let name = format!("debug_{}_{}.png", stem, preset);
        self.dir.join(replace_unsafe_chars(&name, FILENAME_UNSAFE_CHARS, "_"))
    }

    pub fn annotate(&self, preset: &CoordinatePreset, page: &RgbImage, fields: &ExtractedFields) -> RgbImage {
        let mut canvas = page.clone();

        for (field, region) in &preset.regions {
            for inset in 0..OUTLINE_WIDTH {
                let width = region.width().saturating_sub(2 * inset);
                let height = region.height().saturating_sub(2 * inset);
                if width == 0 || height == 0 {
                    break;
                }
                let rect = Rect::at((region.x0 + inset) as i32, (region.y0 + inset) as i32)
                    .of_size(width, height);
                draw_hollow_rect_mut(&mut canvas, rect, OUTLINE);
            }

            if let (Some(font), Some(text)) = (&self.font, fields.get(field)) {
                if !text.is_empty() {
                    let y = region.y0 as i32 - 30;
                    let label = format!("{}: {}", field, text);
                    draw_text_mut(
                        &mut canvas,
                        OUTLINE,
                        region.x0 as i32,
                        y,
                        PxScale::from(LABEL_SCALE),
                        font,
                        &label,
                    );
                }
            }
        }

        canvas
    }
}

impl DebugSink for AnnotatedPageWriter {
    fn record(
        &self,
        document: &str,
        preset: &CoordinatePreset,
        page: &RgbImage,
        fields: &ExtractedFields,
    ) -> Result<()> {
        let path = self.output_path(document, &preset.name);
        self.annotate(preset, page, fields).save(&path)?;
        tracing::debug!("Debug image written to {}", path.display());
        Ok(())
    }
}
