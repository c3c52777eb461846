//! Text extraction with OCR fallback
//!
//! PDFs are read through their embedded text layer first. When that yields
//! too little text (or cannot be parsed) the first page is rasterized and
//! run through OCR. Raster images go straight to OCR and plain-text formats
//! are read as-is. Every result is normalized.

mod normalize;
mod ocr;
mod pdf;

pub use normalize::{normalize, usable_chars};
pub use ocr::{Pdftoppm, Tesseract};
pub use pdf::{extract_text_from_pdf, LopdfReader};

use crate::errors::ExtractionError;
use async_trait::async_trait;
use recordflow_common::config::IngestionConfig;
use recordflow_common::metrics;
use recordflow_common::storage::FileStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Reads the embedded text layer of a paginated document
#[async_trait]
pub trait EmbeddedTextReader: Send + Sync {
    async fn read_text(&self, path: &Path) -> Result<String, ExtractionError>;
}

/// Renders the first page of a PDF into `out_dir` and returns the image path
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    async fn render_first_page(&self, pdf: &Path, out_dir: &Path) -> Result<PathBuf, ExtractionError>;
}

#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, image: &Path) -> Result<String, ExtractionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMethod {
    Embedded,
    Ocr,
    PlainText,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::Embedded => "embedded",
            ExtractionMethod::Ocr => "ocr",
            ExtractionMethod::PlainText => "plain_text",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub text: String,
    pub method: ExtractionMethod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MediaKind {
    Pdf,
    Image,
    Text,
}

const IMAGE_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/jpg",
    "image/tiff",
    "image/bmp",
    "image/gif",
    "image/webp",
];

const TEXT_TYPES: &[&str] = &["text/plain", "text/markdown", "text/csv"];

fn classify(media_type: &str) -> Result<MediaKind, ExtractionError> {
    let essence = media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if essence == "application/pdf" {
        Ok(MediaKind::Pdf)
    } else if IMAGE_TYPES.contains(&essence.as_str()) {
        Ok(MediaKind::Image)
    } else if TEXT_TYPES.contains(&essence.as_str()) {
        Ok(MediaKind::Text)
    } else {
        Err(ExtractionError::UnsupportedMediaType(media_type.to_string()))
    }
}

pub struct TextExtractor {
    storage: FileStore,
    reader: Arc<dyn EmbeddedTextReader>,
    rasterizer: Arc<dyn PageRasterizer>,
    ocr: Arc<dyn OcrEngine>,
    min_text_chars: usize,
}

impl TextExtractor {
    pub fn new(
        storage: FileStore,
        reader: Arc<dyn EmbeddedTextReader>,
        rasterizer: Arc<dyn PageRasterizer>,
        ocr: Arc<dyn OcrEngine>,
        min_text_chars: usize,
    ) -> Self {
        Self {
            storage,
            reader,
            rasterizer,
            ocr,
            min_text_chars,
        }
    }

    /// lopdf + pdftoppm + tesseract, as configured
    pub fn from_config(config: &IngestionConfig, storage: FileStore) -> Self {
        Self::new(
            storage,
            Arc::new(LopdfReader),
            Arc::new(Pdftoppm::new(config.pdftoppm_bin.clone(), config.ocr_dpi)),
            Arc::new(Tesseract::new(config.tesseract_bin.clone(), config.ocr_language.clone())),
            config.min_text_chars,
        )
    }

    /// Extract normalized text from a stored file
    pub async fn extract(&self, file_locator: &str, media_type: &str) -> Result<String, ExtractionError> {
        self.extract_detailed(file_locator, media_type)
            .await
            .map(|e| e.text)
    }

    #[instrument(skip(self), fields(method))]
    pub async fn extract_detailed(
        &self,
        file_locator: &str,
        media_type: &str,
    ) -> Result<Extraction, ExtractionError> {
        let path = self
            .storage
            .resolve(file_locator)
            .map_err(|e| ExtractionError::InvalidLocator(e.to_string()))?;
        self.extract_path(&path, media_type).await
    }

    /// Extract from an arbitrary path
    pub async fn extract_path(&self, path: &Path, media_type: &str) -> Result<Extraction, ExtractionError> {
        let kind = classify(media_type)?;

        if let Err(e) = tokio::fs::metadata(path).await {
            return Err(match e.kind() {
                std::io::ErrorKind::NotFound => ExtractionError::FileNotFound(path.display().to_string()),
                _ => ExtractionError::Io(e),
            });
        }

        let result = match kind {
            MediaKind::Pdf => self.extract_pdf(path).await,
            MediaKind::Image => self.ocr_image(path).await.map(|text| Extraction {
                text,
                method: ExtractionMethod::Ocr,
            }),
            MediaKind::Text => {
                let bytes = tokio::fs::read(path).await?;
                Ok(Extraction {
                    text: normalize(&String::from_utf8_lossy(&bytes)),
                    method: ExtractionMethod::PlainText,
                })
            }
        };

        match &result {
            Ok(extraction) => {
                tracing::Span::current().record("method", extraction.method.as_str());
                metrics::record_extraction(extraction.method.as_str(), true);
                info!(
                    method = extraction.method.as_str(),
                    chars = extraction.text.chars().count(),
                    "Text extracted"
                );
            }
            Err(e) => {
                let attempted = match kind {
                    MediaKind::Text => ExtractionMethod::PlainText,
                    _ => ExtractionMethod::Ocr,
                };
                metrics::record_extraction(attempted.as_str(), false);
                warn!(error = %e, "Text extraction failed");
            }
        }

        result
    }

    async fn extract_pdf(&self, path: &Path) -> Result<Extraction, ExtractionError> {
        match self.reader.read_text(path).await {
            Ok(raw) => {
                let text = normalize(&raw);
                let chars = text.chars().count();
                if chars >= self.min_text_chars {
                    return Ok(Extraction {
                        text,
                        method: ExtractionMethod::Embedded,
                    });
                }
                debug!(chars, threshold = self.min_text_chars, "Embedded text too short, falling back to OCR");
            }
            Err(e) => {
                debug!(error = %e, "Embedded text unreadable, falling back to OCR");
            }
        }

        let scratch = tempfile::tempdir()?;
        let image = self.rasterizer.render_first_page(path, scratch.path()).await?;
        let text = self.ocr_image(&image).await?;

        Ok(Extraction {
            text,
            method: ExtractionMethod::Ocr,
        })
    }

    async fn ocr_image(&self, image: &Path) -> Result<String, ExtractionError> {
        let raw = self.ocr.recognize(image).await?;
        Ok(normalize(&raw))
    }
}

#[cfg(test)]
pub(crate) mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a fixed embedded-text result and counts calls
    pub struct StubReader {
        reply: std::result::Result<String, String>,
        pub calls: AtomicUsize,
    }

    impl StubReader {
        pub fn text(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn broken() -> Self {
            Self {
                reply: Err("xref table damaged".to_string()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddedTextReader for StubReader {
        async fn read_text(&self, path: &Path) -> Result<String, ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone().map_err(|message| ExtractionError::PdfParse {
                path: path.display().to_string(),
                message,
            })
        }
    }

    /// Writes a placeholder PNG into the scratch directory
    #[derive(Default)]
    pub struct StubRasterizer {
        pub unavailable: bool,
        pub calls: AtomicUsize,
    }

    #[async_trait]
    impl PageRasterizer for StubRasterizer {
        async fn render_first_page(&self, _pdf: &Path, out_dir: &Path) -> Result<PathBuf, ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.unavailable {
                return Err(ExtractionError::RasterizerUnavailable("pdftoppm not found on PATH".into()));
            }
            let image = out_dir.join("page-1.png");
            tokio::fs::write(&image, b"png").await?;
            Ok(image)
        }
    }

    pub struct StubOcr {
        text: String,
        pub calls: AtomicUsize,
    }

    impl StubOcr {
        pub fn new(text: &str) -> Self {
            Self {
                text: text.to_string(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl OcrEngine for StubOcr {
        async fn recognize(&self, image: &Path) -> Result<String, ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !image.exists() {
                return Err(ExtractionError::Ocr(format!("no image at {}", image.display())));
            }
            Ok(self.text.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mocks::*;
    use super::*;
    use std::sync::atomic::Ordering;

    const OCR_TEXT: &str = "  SCANNED   MEMO \n\n\n\n Budget request  ";

    struct Fixture {
        _dir: tempfile::TempDir,
        storage: FileStore,
        reader: Arc<StubReader>,
        rasterizer: Arc<StubRasterizer>,
        ocr: Arc<StubOcr>,
    }

    impl Fixture {
        fn new(reader: StubReader, rasterizer: StubRasterizer) -> Self {
            let dir = tempfile::tempdir().unwrap();
            Self {
                storage: FileStore::new(dir.path()),
                _dir: dir,
                reader: Arc::new(reader),
                rasterizer: Arc::new(rasterizer),
                ocr: Arc::new(StubOcr::new(OCR_TEXT)),
            }
        }

        fn extractor(&self) -> TextExtractor {
            TextExtractor::new(
                self.storage.clone(),
                self.reader.clone(),
                self.rasterizer.clone(),
                self.ocr.clone(),
                100,
            )
        }

        async fn store(&self, name: &str, bytes: &[u8]) -> String {
            self.storage.save(name, bytes).await.unwrap()
        }
    }

    #[tokio::test]
    async fn test_short_embedded_text_uses_ocr_once() {
        let fx = Fixture::new(StubReader::text("Page 1"), StubRasterizer::default());
        let locator = fx.store("scan.pdf", b"%PDF").await;

        let result = fx.extractor().extract_detailed(&locator, "application/pdf").await.unwrap();

        assert_eq!(result.method, ExtractionMethod::Ocr);
        assert_eq!(result.text, "SCANNED MEMO\n\nBudget request");
        assert_eq!(fx.reader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fx.rasterizer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fx.ocr.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_long_embedded_text_skips_ocr() {
        let body = "Department of Finance circular on procurement thresholds. ".repeat(5);
        let fx = Fixture::new(StubReader::text(&body), StubRasterizer::default());
        let locator = fx.store("circular.pdf", b"%PDF").await;

        let result = fx.extractor().extract_detailed(&locator, "application/pdf").await.unwrap();

        assert_eq!(result.method, ExtractionMethod::Embedded);
        assert_eq!(result.text, body.trim());
        assert_eq!(fx.ocr.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unparseable_pdf_falls_back_to_ocr() {
        let fx = Fixture::new(StubReader::broken(), StubRasterizer::default());
        let locator = fx.store("broken.pdf", b"%PDF").await;

        let text = fx.extractor().extract(&locator, "application/pdf").await.unwrap();
        assert!(text.starts_with("SCANNED MEMO"));
        assert_eq!(fx.ocr.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_images_go_straight_to_ocr() {
        let fx = Fixture::new(StubReader::text("unused"), StubRasterizer::default());
        let locator = fx.store("photo.JPG", b"jpeg").await;

        let result = fx.extractor().extract_detailed(&locator, "image/jpeg").await.unwrap();

        assert_eq!(result.method, ExtractionMethod::Ocr);
        assert_eq!(fx.reader.calls.load(Ordering::SeqCst), 0);
        assert_eq!(fx.rasterizer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(fx.ocr.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_plain_text_is_read_directly() {
        let fx = Fixture::new(StubReader::text("unused"), StubRasterizer::default());
        let locator = fx.store("note.txt", b"Line one\r\n\r\n\r\nLine\ttwo").await;

        let text = fx
            .extractor()
            .extract(&locator, "text/plain; charset=utf-8")
            .await
            .unwrap();
        assert_eq!(text, "Line one\n\nLine two");
        assert_eq!(fx.ocr.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unsupported_and_missing_files() {
        let fx = Fixture::new(StubReader::text("unused"), StubRasterizer::default());
        let locator = fx.store("sheet.xlsx", b"xlsx").await;

        let err = fx
            .extractor()
            .extract(&locator, "application/vnd.ms-excel")
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::UnsupportedMediaType(_)));

        let err = fx
            .extractor()
            .extract("2026/01/missing.pdf", "application/pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn test_missing_rasterizer_is_an_error() {
        let fx = Fixture::new(
            StubReader::text(""),
            StubRasterizer {
                unavailable: true,
                ..Default::default()
            },
        );
        let locator = fx.store("scan.pdf", b"%PDF").await;

        let err = fx.extractor().extract(&locator, "application/pdf").await.unwrap_err();
        assert!(matches!(err, ExtractionError::RasterizerUnavailable(_)));
        assert_eq!(fx.ocr.calls.load(Ordering::SeqCst), 0);
    }
}
