//! Configuration management for RecordFlow services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Uploaded file storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// Text extraction and pipeline tuning
    #[serde(default)]
    pub ingestion: IngestionConfig,

    /// LLM analysis provider
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Audit ledger gateway (optional)
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Email relay (optional)
    #[serde(default)]
    pub mail: MailConfig,

    /// In-app notification retention
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Maximum accepted upload size in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL (for writes)
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Apply pending SQL migrations at startup
    #[serde(default)]
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Root directory for uploaded files
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestionConfig {
    /// Embedded text shorter than this is treated as a scanned document
    #[serde(default = "default_min_text_chars")]
    pub min_text_chars: usize,

    /// Fewer non-whitespace characters than this means "nothing extracted"
    #[serde(default = "default_min_usable_chars")]
    pub min_usable_chars: usize,

    /// Length of the extracted-text excerpt kept on the document
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,

    /// Tesseract language pack
    #[serde(default = "default_ocr_language")]
    pub ocr_language: String,

    /// Raster resolution for the first-page render
    #[serde(default = "default_ocr_dpi")]
    pub ocr_dpi: u32,

    /// pdftoppm executable
    #[serde(default = "default_pdftoppm_bin")]
    pub pdftoppm_bin: String,

    /// tesseract executable
    #[serde(default = "default_tesseract_bin")]
    pub tesseract_bin: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisConfig {
    /// Provider: openai (any OpenAI-compatible endpoint) or disabled
    #[serde(default = "default_analysis_provider")]
    pub provider: String,

    /// API key for the provider
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Chat model to use
    #[serde(default = "default_analysis_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_analysis_timeout")]
    pub timeout_secs: u64,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Department suggested when classification is impossible
    #[serde(default = "default_department")]
    pub default_department: String,

    /// Characters of text sent for summarization
    #[serde(default = "default_analysis_excerpt")]
    pub analysis_excerpt_chars: usize,

    /// Characters of text sent for routing
    #[serde(default = "default_routing_excerpt")]
    pub routing_excerpt_chars: usize,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LedgerConfig {
    /// Ledger gateway base URL; unset disables ledger logging
    pub endpoint: Option<String>,

    /// Bearer token for the gateway
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_ledger_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MailConfig {
    /// HTTP mail relay URL; unset disables email delivery
    pub relay_url: Option<String>,

    /// Bearer token for the relay
    pub api_key: Option<String>,

    /// Sender address
    #[serde(default = "default_from_address")]
    pub from_address: String,

    /// Request timeout in seconds
    #[serde(default = "default_mail_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
    /// Days before a notification expires
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,

    /// Interval between expired-notification sweeps
    #[serde(default = "default_purge_interval")]
    pub purge_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// HS256 secret shared with the identity service
    pub jwt_secret: Option<String>,

    /// JWT expiration in seconds
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log filter (EnvFilter syntax)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for logs
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 30 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_max_upload_bytes() -> usize { 25 * 1024 * 1024 }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_storage_root() -> PathBuf { PathBuf::from("data/uploads") }
fn default_min_text_chars() -> usize { crate::DEFAULT_MIN_TEXT_CHARS }
fn default_min_usable_chars() -> usize { 20 }
fn default_excerpt_chars() -> usize { 2000 }
fn default_ocr_language() -> String { "eng".to_string() }
fn default_ocr_dpi() -> u32 { 300 }
fn default_pdftoppm_bin() -> String { "pdftoppm".to_string() }
fn default_tesseract_bin() -> String { "tesseract".to_string() }
fn default_analysis_provider() -> String { "openai".to_string() }
fn default_analysis_model() -> String { "gpt-4o-mini".to_string() }
fn default_analysis_timeout() -> u64 { 60 }
fn default_temperature() -> f32 { 0.2 }
fn default_department() -> String { crate::DEFAULT_FALLBACK_DEPARTMENT.to_string() }
fn default_analysis_excerpt() -> usize { 6000 }
fn default_routing_excerpt() -> usize { 3000 }
fn default_ledger_timeout() -> u64 { 15 }
fn default_from_address() -> String { "records@localhost".to_string() }
fn default_mail_timeout() -> u64 { 15 }
fn default_retention_days() -> i64 { 30 }
fn default_purge_interval() -> u64 { 3600 }
fn default_jwt_expiration() -> u64 { 3600 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "recordflow".to_string() }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?

            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Timeout for routes that write to the ledger and notify staff after
    /// committing. The ledger write makes up to three sequential calls and
    /// runs alongside the email fan-out, so the budget covers both on top of
    /// the regular request timeout.
    pub fn action_timeout(&self) -> Duration {
        let side_effects = (self.ledger.timeout_secs * 3).max(self.mail.timeout_secs);
        Duration::from_secs(self.server.request_timeout_secs + side_effects)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Get the read database URL (falls back to primary)
    pub fn read_database_url(&self) -> &str {
        self.database.read_url.as_deref().unwrap_or(&self.database.url)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { root: default_storage_root() }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            min_text_chars: default_min_text_chars(),
            min_usable_chars: default_min_usable_chars(),
            excerpt_chars: default_excerpt_chars(),
            ocr_language: default_ocr_language(),
            ocr_dpi: default_ocr_dpi(),
            pdftoppm_bin: default_pdftoppm_bin(),
            tesseract_bin: default_tesseract_bin(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            provider: default_analysis_provider(),
            api_key: None,
            api_base: None,
            model: default_analysis_model(),
            timeout_secs: default_analysis_timeout(),
            temperature: default_temperature(),
            default_department: default_department(),
            analysis_excerpt_chars: default_analysis_excerpt(),
            routing_excerpt_chars: default_routing_excerpt(),
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            relay_url: None,
            api_key: None,
            from_address: default_from_address(),
            timeout_secs: default_mail_timeout(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            purge_interval_secs: default_purge_interval(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_expiration_secs: default_jwt_expiration(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig {
                url: "postgres://localhost/recordflow".to_string(),
                read_url: None,
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
                run_migrations: false,
            },
            storage: StorageConfig::default(),
            ingestion: IngestionConfig::default(),
            analysis: AnalysisConfig::default(),
            ledger: LedgerConfig {
                endpoint: None,
                api_key: None,
                timeout_secs: default_ledger_timeout(),
            },
            mail: MailConfig::default(),
            notifications: NotificationConfig::default(),
            auth: AuthConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.ingestion.min_text_chars, 100);
        assert_eq!(config.analysis.default_department, "General Administration");
        assert!(config.ledger.endpoint.is_none());
    }

    #[test]
    fn test_action_timeout_covers_ledger_and_mail() {
        let mut config = AppConfig::default();
        config.server.request_timeout_secs = 30;
        config.ledger.timeout_secs = 15;
        config.mail.timeout_secs = 20;
        assert_eq!(config.action_timeout(), Duration::from_secs(75));

        config.mail.timeout_secs = 90;
        assert_eq!(config.action_timeout(), Duration::from_secs(120));
        assert!(config.action_timeout() > config.request_timeout());
    }

    #[test]
    fn test_read_database_fallback() {
        let config = AppConfig::default();
        assert_eq!(config.read_database_url(), "postgres://localhost/recordflow");
    }

    #[test]
    fn test_from_file_fills_section_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recordflow.toml");
        std::fs::write(
            &path,
            "[database]\nurl = \"postgres://db/records\"\n\n[analysis]\ndefault_department = \"Registry\"\n",
        )
        .unwrap();

        let config = AppConfig::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.database.url, "postgres://db/records");
        assert_eq!(config.analysis.default_department, "Registry");
        assert_eq!(config.analysis.routing_excerpt_chars, 3000);
        assert_eq!(config.notifications.retention_days, 30);
    }
}
