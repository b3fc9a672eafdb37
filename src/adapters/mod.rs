// Adapters layer: concrete implementations of the domain ports (OCR backend, page rendering, storage, diagnostics).

pub mod debug_image;
pub mod renderer;
pub mod storage;
pub mod tesseract;

pub use debug_image::AnnotatedPageWriter;
pub use renderer::PdftoppmRenderer;
pub use storage::{LocalStorage, Workspace};
pub use tesseract::TesseractCli;
