pub mod toml_config;

pub use toml_config::RenamerConfig;

use crate::utils::error::Result;
use crate::utils::validation::{validate_file_extensions, validate_path, Validate};
use std::path::{Path, PathBuf};

#[cfg(feature = "cli")]
use crate::utils::logger::LogFormat;
#[cfg(feature = "cli")]
use clap::Parser;

pub const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg", "tif", "tiff", "bmp"];

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "inspection-renamer")]
#[command(about = "Rename vehicle inspection certificates from their OCR-read registration number and expiry date")]
pub struct CliConfig {
    /// Certificates to rename (PDF or page images)
    pub documents: Vec<PathBuf>,

    /// CSV lookup file: identifier, registration suffix, location
    #[arg(short, long)]
    pub lookup: Option<PathBuf>,

    /// Preset tried first (defaults to `default_preset` from the config)
    #[arg(short, long)]
    pub preset: Option<String>,

    /// Directory the batch output is written to
    #[arg(short, long, default_value = "./output")]
    pub output: PathBuf,

    /// TOML configuration file; built-in presets are used when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Also write the per-document results as JSON
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Print the configured presets and exit
    #[arg(long)]
    pub list_presets: bool,

    /// Validate inputs and show what would be processed without running recognition
    #[arg(long)]
    pub dry_run: bool,

    /// Write annotated page images for every preset attempt
    #[arg(long, value_name = "DIR")]
    pub debug_images: Option<PathBuf>,

    /// Log CPU / memory usage per batch phase
    #[arg(long)]
    pub monitor: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(feature = "cli")]
impl CliConfig {
    /// 載入 TOML（或內建預設）並套用命令列覆蓋
    pub fn load_config(&self) -> Result<RenamerConfig> {
        let mut config = match &self.config {
            Some(path) => {
                tracing::info!("📁 Loading configuration from: {}", path.display());
                RenamerConfig::from_file(path)?
            }
            None => RenamerConfig::default(),
        };
        apply_debug_override(&mut config, self.debug_images.as_deref());
        Ok(config)
    }
}

/// `--debug-images` turns the debug sink on and points it at the given directory.
pub fn apply_debug_override(config: &mut RenamerConfig, dir: Option<&Path>) {
    if let Some(dir) = dir {
        config.debug.enabled = true;
        config.debug.dir = Some(dir.to_path_buf());
        tracing::info!("🔧 Debug images enabled: {}", dir.display());
    }
}

pub fn validate_documents(documents: &[PathBuf]) -> Result<()> {
    let names: Vec<String> = documents
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
    for name in &names {
        validate_path("documents", name)?;
    }
    validate_file_extensions("documents", &names, DOCUMENT_EXTENSIONS)
}

#[cfg(feature = "cli")]
impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        if self.list_presets {
            return Ok(());
        }
        validate_documents(&self.documents)?;
        if let Some(lookup) = &self.lookup {
            validate_path("lookup", &lookup.to_string_lossy())?;
        }
        Ok(())
    }
}
