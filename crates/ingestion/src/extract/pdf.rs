//! Embedded-text extraction from PDF files using lopdf

use super::EmbeddedTextReader;
use crate::errors::ExtractionError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Reads the text layer of a PDF. Parsing runs on the blocking pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfReader;

#[async_trait]
impl EmbeddedTextReader for LopdfReader {
    async fn read_text(&self, path: &Path) -> Result<String, ExtractionError> {
        let path: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || extract_text_from_pdf(&path))
            .await
            .map_err(|e| ExtractionError::PdfParse {
                path: String::new(),
                message: format!("extraction task failed: {}", e),
            })?
    }
}

/// Concatenated text of every page; unreadable pages are skipped
pub fn extract_text_from_pdf(path: &Path) -> Result<String, ExtractionError> {
    let doc = lopdf::Document::load(path).map_err(|e| ExtractionError::PdfParse {
        path: path.display().to_string(),
        message: format!("Failed to load PDF: {}", e),
    })?;

    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    debug!(page_count = pages.len(), "Extracting embedded text from PDF");

    let mut text = String::new();
    for page in pages {
        match doc.extract_text(&[page]) {
            Ok(page_text) => {
                text.push_str(&page_text);
                text.push('\n');
            }
            Err(e) => {
                warn!(page, error = %e, "Failed to extract text from page, skipping");
            }
        }
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_garbage_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"definitely not a pdf").unwrap();

        let err = LopdfReader.read_text(&path).await.unwrap_err();
        assert!(matches!(err, ExtractionError::PdfParse { .. }));
    }
}
