//! Local file storage for uploaded records
//!
//! Files land at `<root>/<yyyy>/<mm>/<uuid>.<ext>`; documents keep the
//! relative locator.

use crate::errors::{AppError, Result};
use chrono::{Datelike, Utc};
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `bytes` and return the relative locator
    pub async fn save(&self, original_filename: &str, bytes: &[u8]) -> Result<String> {
        let now = Utc::now();
        let extension = extension_of(original_filename);
        let locator = format!(
            "{:04}/{:02}/{}.{}",
            now.year(),
            now.month(),
            Uuid::new_v4(),
            extension
        );

        let path = self.root.join(&locator);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;

        debug!(locator = %locator, size = bytes.len(), "Stored upload");
        Ok(locator)
    }

    /// Absolute path for a locator. Locators that escape the root are refused.
    pub fn resolve(&self, locator: &str) -> Result<PathBuf> {
        let relative = Path::new(locator);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || locator.is_empty() {
            return Err(AppError::Storage {
                message: format!("Invalid file locator: {}", locator),
            });
        }
        Ok(self.root.join(relative))
    }

    pub async fn delete(&self, locator: &str) -> Result<()> {
        let path = self.resolve(locator)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 10 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_else(|| "bin".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_and_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        let locator = store.save("Budget Memo.PDF", b"%PDF-1.4").await.unwrap();
        assert!(locator.ends_with(".pdf"));

        let path = store.resolve(&locator).unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"%PDF-1.4");

        store.delete(&locator).await.unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_resolve_refuses_traversal() {
        let store = FileStore::new("/srv/uploads");
        assert!(store.resolve("../etc/passwd").is_err());
        assert!(store.resolve("/etc/passwd").is_err());
        assert!(store.resolve("2026/01/a.pdf").is_ok());
    }

    #[test]
    fn test_extension_fallback() {
        assert_eq!(extension_of("scan"), "bin");
        assert_eq!(extension_of("photo.JPG"), "jpg");
        assert_eq!(extension_of("weird.p$f"), "bin");
    }
}
