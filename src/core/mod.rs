pub mod archive;
pub mod batch;
pub mod correction;
pub mod engine;
pub mod extractor;
pub mod matching;
pub mod resolver;
pub mod validators;

pub use crate::domain::ports::{PageRenderer, Pipeline, Storage, TextRecognizer};
pub use crate::utils::error::Result;
pub use batch::RenamePipeline;
pub use engine::BatchEngine;
