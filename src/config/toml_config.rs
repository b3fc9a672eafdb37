use crate::core::extractor::Preprocess;
use crate::core::matching::LookupEncoding;
use crate::core::validators::EraRule;
use crate::domain::model::{CoordinatePreset, Region, EXPIRY_DATE_FIELD, REG_NUMBER_FIELD};
use crate::utils::error::{RenamerError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_path, validate_positive_number, validate_range,
    validate_required_field, Validate,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

pub const OLD_CERTIFICATE_PRESET: &str = "旧車検証_電子PDF";
pub const NEW_CERTIFICATE_PRESET: &str = "新車検証_電子PDF";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenamerConfig {
    /// Preset tried first when the caller does not name one.
    pub default_preset: String,
    pub recognition: RecognitionSettings,
    pub rendering: RenderSettings,
    pub era: EraRule,
    pub matching: MatchingConfig,
    pub output: OutputConfig,
    pub debug: DebugConfig,
    pub presets: Vec<CoordinatePreset>,
}

/// Where the tesseract backend lives and how crops are prepared for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionSettings {
    pub tesseract_path: PathBuf,
    /// Passed to the backend as `TESSDATA_PREFIX` when set.
    pub tessdata_dir: Option<PathBuf>,
    pub language: String,
    pub page_segmentation_mode: u8,
    pub contrast_factor: f32,
    pub binarize_threshold: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub pdftoppm_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub encodings: Vec<LookupEncoding>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub archive_name: String,
    /// Failure log stored inside the archive.
    pub failure_log_name: String,
    /// Report returned when no document could be renamed.
    pub failure_report_name: String,
    pub system_error_name: String,
    pub unsafe_char_placeholder: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub enabled: bool,
    pub dir: Option<PathBuf>,
    /// TrueType font for region labels; outlines only when unset.
    pub font_path: Option<PathBuf>,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            tesseract_path: PathBuf::from("tesseract"),
            tessdata_dir: None,
            language: "jpn".to_string(),
            page_segmentation_mode: 7,
            contrast_factor: 2.0,
            binarize_threshold: 190,
        }
    }
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            pdftoppm_path: PathBuf::from("pdftoppm"),
        }
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            encodings: LookupEncoding::DEFAULT_ORDER.to_vec(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            archive_name: "renamed_files.zip".to_string(),
            failure_log_name: "処理ログ.txt".to_string(),
            failure_report_name: "failure_log.txt".to_string(),
            system_error_name: "system_error.txt".to_string(),
            unsafe_char_placeholder: "_".to_string(),
        }
    }
}

fn preset(name: &str, dpi: u32, size: (u32, u32), reg: Region, expiry: Region) -> CoordinatePreset {
    let mut regions = BTreeMap::new();
    regions.insert(REG_NUMBER_FIELD.to_string(), reg);
    regions.insert(EXPIRY_DATE_FIELD.to_string(), expiry);
    CoordinatePreset {
        name: name.to_string(),
        dpi,
        size,
        regions,
    }
}

/// 內建的兩種車檢證版面
pub fn builtin_presets() -> Vec<CoordinatePreset> {
    vec![
        preset(
            OLD_CERTIFICATE_PRESET,
            300,
            (2480, 3509),
            Region::new(345, 305, 1500, 410),
            Region::new(1880, 530, 2300, 675),
        ),
        preset(
            NEW_CERTIFICATE_PRESET,
            600,
            (4960, 7018),
            Region::new(1320, 715, 3000, 895),
            Region::new(3800, 1110, 4700, 1300),
        ),
    ]
}

impl Default for RenamerConfig {
    fn default() -> Self {
        Self {
            default_preset: OLD_CERTIFICATE_PRESET.to_string(),
            recognition: RecognitionSettings::default(),
            rendering: RenderSettings::default(),
            era: EraRule::default(),
            matching: MatchingConfig::default(),
            output: OutputConfig::default(),
            debug: DebugConfig::default(),
            presets: builtin_presets(),
        }
    }
}

impl RenamerConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(RenamerError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| RenamerError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${TESSDATA_DIR})，未設定的保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| RenamerError::ConfigError {
            message: format!("env substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn find_preset(&self, name: &str) -> Option<&CoordinatePreset> {
        self.presets.iter().find(|p| p.name == name)
    }

    pub fn preprocess(&self) -> Preprocess {
        Preprocess {
            contrast_factor: self.recognition.contrast_factor,
            binarize_threshold: self.recognition.binarize_threshold,
        }
    }

    fn validate_presets(&self) -> Result<()> {
        validate_positive_number("presets", self.presets.len(), 1)?;

        let mut seen = HashSet::new();
        for (idx, preset) in self.presets.iter().enumerate() {
            let field = format!("presets[{}]", idx);
            validate_non_empty_string(&format!("{field}.name"), &preset.name)?;
            if !seen.insert(preset.name.as_str()) {
                return Err(RenamerError::InvalidConfigValueError {
                    field: format!("{field}.name"),
                    value: preset.name.clone(),
                    reason: "Preset names must be unique".to_string(),
                });
            }
            validate_range(&format!("{field}.dpi"), preset.dpi, 1, 2400)?;

            for required in [REG_NUMBER_FIELD, EXPIRY_DATE_FIELD] {
                if preset.region(required).is_none() {
                    return Err(RenamerError::MissingConfigError {
                        field: format!("{field}.regions.{required}"),
                    });
                }
            }

            for (name, region) in &preset.regions {
                if region.width() == 0 || region.height() == 0 {
                    return Err(RenamerError::InvalidConfigValueError {
                        field: format!("{field}.regions.{name}"),
                        value: region.to_string(),
                        reason: "Region must have x1 > x0 and y1 > y0".to_string(),
                    });
                }
            }
        }

        if self.find_preset(&self.default_preset).is_none() {
            return Err(RenamerError::InvalidConfigValueError {
                field: "default_preset".to_string(),
                value: self.default_preset.clone(),
                reason: "No preset with this name is defined".to_string(),
            });
        }

        Ok(())
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        self.validate_presets()?;

        validate_path(
            "recognition.tesseract_path",
            &self.recognition.tesseract_path.to_string_lossy(),
        )?;
        validate_non_empty_string("recognition.language", &self.recognition.language)?;
        validate_range(
            "recognition.page_segmentation_mode",
            self.recognition.page_segmentation_mode,
            0,
            13,
        )?;
        validate_range(
            "recognition.contrast_factor",
            self.recognition.contrast_factor,
            0.1,
            10.0,
        )?;
        validate_range(
            "recognition.binarize_threshold",
            self.recognition.binarize_threshold,
            1,
            254,
        )?;
        validate_path(
            "rendering.pdftoppm_path",
            &self.rendering.pdftoppm_path.to_string_lossy(),
        )?;

        validate_non_empty_string("era.name", &self.era.name)?;
        validate_positive_number("matching.encodings", self.matching.encodings.len(), 1)?;

        for (field, value) in [
            ("output.archive_name", &self.output.archive_name),
            ("output.failure_log_name", &self.output.failure_log_name),
            ("output.failure_report_name", &self.output.failure_report_name),
            ("output.system_error_name", &self.output.system_error_name),
        ] {
            validate_non_empty_string(field, value)?;
            validate_path(field, value)?;
        }

        if self.debug.enabled {
            validate_required_field("debug.dir", &self.debug.dir)?;
        }

        Ok(())
    }
}

impl Validate for RenamerConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
