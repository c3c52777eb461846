//! Ingestion error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("PDF parse error for {path}: {message}")]
    PdfParse { path: String, message: String },

    #[error("Page rasterizer unavailable: {0}")]
    RasterizerUnavailable(String),

    #[error("Failed to rasterize page: {0}")]
    Rasterize(String),

    #[error("OCR engine unavailable: {0}")]
    OcrUnavailable(String),

    #[error("OCR failed: {0}")]
    Ocr(String),

    #[error("Invalid file locator: {0}")]
    InvalidLocator(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractionError {
    /// Map a spawn failure for an external tool; a missing binary is
    /// reported as unavailable rather than as an IO error.
    pub(crate) fn from_spawn(
        tool: &str,
        error: std::io::Error,
        unavailable: fn(String) -> ExtractionError,
        failed: fn(String) -> ExtractionError,
    ) -> Self {
        if error.kind() == std::io::ErrorKind::NotFound {
            unavailable(format!("{} not found on PATH", tool))
        } else {
            failed(format!("{}: {}", tool, error))
        }
    }
}
