use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenamerError {
    #[error("Text recognition backend unavailable: {message}")]
    RecognitionUnavailable { message: String },

    #[error("Invalid upload: {message}")]
    UploadInvalid { message: String },

    #[error("Text recognition failed: {message}")]
    RecognitionError { message: String },

    #[error("Page rendering failed: {message}")]
    RenderError { message: String },

    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Image processing error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Upload,
    Recognition,
    Storage,
    Processing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl RenamerError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => ErrorCategory::Configuration,
            Self::UploadInvalid { .. } | Self::CsvError(_) => ErrorCategory::Upload,
            Self::RecognitionUnavailable { .. }
            | Self::RecognitionError { .. }
            | Self::RenderError { .. } => ErrorCategory::Recognition,
            Self::IoError(_) | Self::ZipError(_) => ErrorCategory::Storage,
            Self::ImageError(_) | Self::SerializationError(_) | Self::ProcessingError { .. } => {
                ErrorCategory::Processing
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // 單一頁面的辨識錯誤只影響當前預設
            Self::RecognitionError { .. } | Self::RenderError { .. } => ErrorSeverity::Medium,
            Self::UploadInvalid { .. } | Self::CsvError(_) | Self::ProcessingError { .. } => {
                ErrorSeverity::High
            }
            Self::ImageError(_) | Self::SerializationError(_) => ErrorSeverity::High,
            Self::RecognitionUnavailable { .. } | Self::IoError(_) | Self::ZipError(_) => {
                ErrorSeverity::Critical
            }
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Configuration => {
                "Check the configuration file and command-line flags against the documented options"
            }
            ErrorCategory::Upload => {
                "Supply at least one document and a lookup file in UTF-8 or Shift_JIS encoding"
            }
            ErrorCategory::Recognition => {
                "Make sure tesseract (with jpn data) and pdftoppm are installed and the configured paths are correct"
            }
            ErrorCategory::Storage => "Check free disk space and write permissions on the output directory",
            ErrorCategory::Processing => "Re-run with --verbose and inspect the per-document log",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::RecognitionUnavailable { .. } => {
                "The text recognition engine is not available.".to_string()
            }
            Self::UploadInvalid { message } => format!("The submitted files are not usable: {message}"),
            Self::MissingConfigError { field } => format!("Required setting '{field}' is missing."),
            other => other.to_string(),
        }
    }

    pub fn upload_invalid(message: impl Into<String>) -> Self {
        Self::UploadInvalid {
            message: message.into(),
        }
    }

    pub fn recognition(message: impl Into<String>) -> Self {
        Self::RecognitionError {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RenamerError>;
