pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::{AnnotatedPageWriter, LocalStorage, PdftoppmRenderer, TesseractCli};
pub use config::RenamerConfig;
pub use core::{BatchEngine, RenamePipeline};
pub use utils::error::{RenamerError, Result};
