use crate::config::toml_config::RenderSettings;
use crate::domain::ports::PageRenderer;
use crate::utils::error::{RenamerError, Result};
use image::{ImageFormat, RgbImage};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Extensions loaded directly as page images instead of going through `pdftoppm`.
pub const RASTER_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "bmp"];

pub fn is_raster_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| RASTER_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Renders the first PDF page with poppler's `pdftoppm`; raster images are read as-is.
#[derive(Debug, Clone)]
pub struct PdftoppmRenderer {
    pdftoppm_path: PathBuf,
}

impl PdftoppmRenderer {
    pub fn new(settings: &RenderSettings) -> Self {
        Self {
            pdftoppm_path: settings.pdftoppm_path.clone(),
        }
    }

    fn render_pdf(&self, document: &Path, dpi: u32) -> Result<RgbImage> {
        // 沒有輸出前綴時 pdftoppm 直接寫到 stdout
        let output = Command::new(&self.pdftoppm_path)
            .args(["-f", "1", "-l", "1", "-singlefile", "-png", "-r"])
            .arg(dpi.to_string())
            .arg(document)
            .output()
            .map_err(|e| RenamerError::RenderError {
                message: format!("cannot run {}: {}", self.pdftoppm_path.display(), e),
            })?;

        if !output.status.success() || output.stdout.is_empty() {
            return Err(RenamerError::RenderError {
                message: format!(
                    "pdftoppm could not render {}: {}",
                    document.display(),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        Ok(image::load_from_memory_with_format(&output.stdout, ImageFormat::Png)?.to_rgb8())
    }
}

impl PageRenderer for PdftoppmRenderer {
    /// Only PDFs need `pdftoppm`; a batch of page images never runs it.
    fn check_available(&self, documents: &[&str]) -> Result<()> {
        if documents.iter().all(|name| is_raster_image(Path::new(name))) {
            return Ok(());
        }

        // 舊版 poppler 的 -v 會以非零結束，只確認能否執行
        Command::new(&self.pdftoppm_path)
            .arg("-v")
            .output()
            .map_err(|e| RenamerError::RecognitionUnavailable {
                message: format!("{}: {}", self.pdftoppm_path.display(), e),
            })?;
        Ok(())
    }

    fn render_first_page(&self, document: &Path, dpi: u32) -> Result<RgbImage> {
        if is_raster_image(document) {
            tracing::debug!("Loading {} as a page image", document.display());
            return Ok(image::open(document)?.to_rgb8());
        }

        self.render_pdf(document, dpi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use tempfile::TempDir;

    #[test]
    fn test_raster_detection() {
        assert!(is_raster_image(Path::new("scan.PNG")));
        assert!(is_raster_image(Path::new("dir/scan.jpeg")));
        assert!(!is_raster_image(Path::new("certificate.pdf")));
        assert!(!is_raster_image(Path::new("noext")));
    }

    #[test]
    fn test_png_page_is_loaded_directly() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("page.png");
        RgbImage::from_pixel(40, 30, Rgb([10, 20, 30])).save(&path).unwrap();

        let renderer = PdftoppmRenderer::new(&RenderSettings {
            pdftoppm_path: PathBuf::from("/nonexistent/pdftoppm"),
        });
        let page = renderer.render_first_page(&path, 300).unwrap();
        assert_eq!(page.dimensions(), (40, 30));
        assert_eq!(page.get_pixel(0, 0), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_missing_pdftoppm_only_matters_for_pdfs() {
        let renderer = PdftoppmRenderer::new(&RenderSettings {
            pdftoppm_path: PathBuf::from("/nonexistent/pdftoppm"),
        });
        assert!(renderer.check_available(&["a.png", "b.JPG"]).is_ok());

        let err = renderer.check_available(&["a.png", "c.pdf"]).unwrap_err();
        assert!(matches!(err, RenamerError::RecognitionUnavailable { .. }));
    }

    #[test]
    fn test_missing_pdftoppm_is_a_render_error() {
        let renderer = PdftoppmRenderer::new(&RenderSettings {
            pdftoppm_path: PathBuf::from("/nonexistent/pdftoppm"),
        });
        let err = renderer
            .render_first_page(Path::new("certificate.pdf"), 300)
            .unwrap_err();
        assert!(matches!(err, RenamerError::RenderError { .. }));
    }
}
