use crate::config::toml_config::RecognitionSettings;
use crate::domain::ports::{RegionCrop, TextRecognizer};
use crate::utils::error::{RenamerError, Result};
use image::ImageFormat;
use std::io::{Cursor, Write};
use std::process::{Command, Output, Stdio};

/// Runs the `tesseract` binary once per crop, feeding PNG bytes through stdin.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    settings: RecognitionSettings,
}

impl TesseractCli {
    pub fn new(settings: RecognitionSettings) -> Self {
        Self { settings }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.settings.tesseract_path);
        // 只設定在子行程上，不改動本行程的環境
        if let Some(dir) = &self.settings.tessdata_dir {
            cmd.env("TESSDATA_PREFIX", dir);
        }
        cmd
    }

    fn unavailable(&self, detail: impl std::fmt::Display) -> RenamerError {
        RenamerError::RecognitionUnavailable {
            message: format!("{}: {}", self.settings.tesseract_path.display(), detail),
        }
    }

    pub fn list_languages(&self) -> Result<Vec<String>> {
        let output = self
            .command()
            .arg("--list-langs")
            .output()
            .map_err(|e| self.unavailable(format!("cannot run --list-langs ({})", e)))?;
        if !output.status.success() {
            return Err(self.unavailable(format!(
                "--list-langs failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(parse_language_list(&output))
    }
}

/// Older tesseract builds print the list on stderr.
fn parse_language_list(output: &Output) -> Vec<String> {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    stdout
        .lines()
        .chain(stderr.lines())
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("List of available languages"))
        .map(str::to_string)
        .collect()
}

impl TextRecognizer for TesseractCli {
    fn check_available(&self) -> Result<()> {
        let output = self
            .command()
            .arg("--version")
            .output()
            .map_err(|e| self.unavailable(e))?;
        if !output.status.success() {
            return Err(self.unavailable(format!("--version exited with {}", output.status)));
        }

        let installed = self.list_languages()?;
        for lang in self.settings.language.split('+') {
            if !installed.iter().any(|l| l == lang) {
                return Err(self.unavailable(format!(
                    "language data '{}' is not installed (found: {})",
                    lang,
                    installed.join(", ")
                )));
            }
        }

        tracing::debug!(
            "tesseract ready at {} ({})",
            self.settings.tesseract_path.display(),
            self.settings.language
        );
        Ok(())
    }

    fn recognize_line(&self, crop: &RegionCrop<'_>) -> Result<String> {
        let mut png = Vec::new();
        crop.image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

        let mut child = self
            .command()
            .arg("stdin")
            .arg("stdout")
            .arg("-l")
            .arg(&self.settings.language)
            .arg("--psm")
            .arg(self.settings.page_segmentation_mode.to_string())
            .arg("--dpi")
            .arg(crop.dpi.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RenamerError::recognition(format!("cannot start tesseract: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(&png) {
                drop(stdin);
                // 避免留下殭屍行程
                let _ = child.kill();
                let _ = child.wait();
                return Err(RenamerError::recognition(format!(
                    "cannot send image to tesseract: {}",
                    e
                )));
            }
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(RenamerError::recognition(format!(
                "tesseract failed on {} [{} / {}]: {}",
                crop.document,
                crop.preset,
                crop.field,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
