//! External OCR tooling: `pdftoppm` renders, `tesseract` reads

use super::{OcrEngine, PageRasterizer};
use crate::errors::ExtractionError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

const PAGE_PREFIX: &str = "page";

/// Renders page 1 of a PDF to PNG with poppler's `pdftoppm`
#[derive(Debug, Clone)]
pub struct Pdftoppm {
    binary: String,
    dpi: u32,
}

impl Pdftoppm {
    pub fn new(binary: impl Into<String>, dpi: u32) -> Self {
        Self {
            binary: binary.into(),
            dpi,
        }
    }
}

#[async_trait]
impl PageRasterizer for Pdftoppm {
    async fn render_first_page(&self, pdf: &Path, out_dir: &Path) -> Result<PathBuf, ExtractionError> {
        let prefix = out_dir.join(PAGE_PREFIX);
        let output = Command::new(&self.binary)
            .arg("-png")
            .arg("-r")
            .arg(self.dpi.to_string())
            .args(["-f", "1", "-l", "1"])
            .arg(pdf)
            .arg(&prefix)
            .output()
            .await
            .map_err(|e| {
                ExtractionError::from_spawn(
                    &self.binary,
                    e,
                    ExtractionError::RasterizerUnavailable,
                    ExtractionError::Rasterize,
                )
            })?;

        if !output.status.success() {
            return Err(ExtractionError::Rasterize(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        find_page_image(out_dir).ok_or_else(|| {
            ExtractionError::Rasterize("pdftoppm produced no page image".to_string())
        })
    }
}

/// pdftoppm pads the page number to the width of the page count
pub(crate) fn find_page_image(out_dir: &Path) -> Option<PathBuf> {
    ["1", "01", "001", "0001"]
        .iter()
        .map(|n| out_dir.join(format!("{}-{}.png", PAGE_PREFIX, n)))
        .find(|p| p.exists())
}

/// Runs the `tesseract` CLI and reads the result from stdout
#[derive(Debug, Clone)]
pub struct Tesseract {
    binary: String,
    language: String,
}

impl Tesseract {
    pub fn new(binary: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            language: language.into(),
        }
    }
}

#[async_trait]
impl OcrEngine for Tesseract {
    async fn recognize(&self, image: &Path) -> Result<String, ExtractionError> {
        debug!(image = %image.display(), language = %self.language, "Running OCR");

        let output = Command::new(&self.binary)
            .arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .output()
            .await
            .map_err(|e| {
                ExtractionError::from_spawn(&self.binary, e, ExtractionError::OcrUnavailable, ExtractionError::Ocr)
            })?;

        if !output.status.success() {
            return Err(ExtractionError::Ocr(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_page_image_handles_padding() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_page_image(dir.path()).is_none());

        std::fs::write(dir.path().join("page-001.png"), b"png").unwrap();
        assert_eq!(find_page_image(dir.path()), Some(dir.path().join("page-001.png")));
    }

    #[tokio::test]
    async fn test_missing_binaries_are_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("scan.pdf");
        std::fs::write(&pdf, b"%PDF-1.4").unwrap();

        let err = Pdftoppm::new("recordflow-no-such-pdftoppm", 300)
            .render_first_page(&pdf, dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::RasterizerUnavailable(_)));

        let err = Tesseract::new("recordflow-no-such-tesseract", "eng")
            .recognize(&pdf)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::OcrUnavailable(_)));
    }
}
