//! Configuration loading
//!
//! Bootstrap configuration comes from one TOML file. The file is located by
//! priority:
//! 1. Command-line argument (highest priority)
//! 2. `EVP_CONFIG` environment variable
//! 3. `<user config dir>/evp/config.toml`
//! 4. Compiled defaults (fallback)
//!
//! A file named explicitly (1 or 2) must exist and parse. A missing per-user
//! file only logs a warning. `EVP_API_BASE_URL` overrides the resolver base
//! URL after the file is read.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::query::LookupMode;
use crate::{Error, Result};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "EVP_CONFIG";

/// Environment variable overriding `resolver.base_url`
pub const BASE_URL_ENV_VAR: &str = "EVP_API_BASE_URL";

/// Full portal configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    pub resolver: ResolverConfig,
    pub lookup: LookupConfig,
    pub export: ExportConfig,
    pub logging: LoggingConfig,
}

/// Resolver backend connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Backend base URL
    ///
    /// Default: `http://0.0.0.0:8080`
    pub base_url: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    pub endpoints: EndpointConfig,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            base_url: "http://0.0.0.0:8080".to_string(),
            timeout_secs: 30,
            endpoints: EndpointConfig::default(),
        }
    }
}

impl ResolverConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Resolver endpoint paths, relative to the base URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Mobile-only lookup (GET); `{mobile}` is replaced with the number
    pub by_mobile: String,
    pub verify: String,
    pub search: String,
    pub qr_by_name_mobile: String,
    pub qr_by_confirmation: String,
    /// Artifact endpoint; `{id}` is replaced with the attendee id
    pub artifact: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            by_mobile: "/attendees/mobile/{mobile}".to_string(),
            verify: "/attendees/verify".to_string(),
            search: "/attendees/search".to_string(),
            qr_by_name_mobile: "/attendees/qrcode/by-name-mobile".to_string(),
            qr_by_confirmation: "/attendees/qrcode/by-confirmation".to_string(),
            artifact: "/attendees/{id}/qrcode".to_string(),
        }
    }
}

/// Where QR artifacts come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QrSource {
    /// Resolver supplies the rendered QR; no local encoding
    #[default]
    Resolver,
    /// QR encoded locally from the attendee record
    Local,
}

/// Field set of a locally encoded QR payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadSchema {
    /// `{id, name, mobile, email, organization}`
    #[default]
    Basic,
    /// `{id, confirmationNumber, name, mobile, role, district}`
    Event,
}

/// Lookup behaviour of this deployment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    pub mode: LookupMode,
    pub qr_source: QrSource,
    pub payload_schema: PayloadSchema,
}

/// Export pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Identifier of the ID card surface
    pub element_id: String,

    /// Wait before capturing a surface that was not mounted at export time
    pub settle_delay_ms: u64,

    /// Capture pixel density
    pub capture_scale: f32,

    /// Directory receiving exported files
    pub output_dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            element_id: "id-card-container".to_string(),
            settle_delay_ms: 200,
            capture_scale: 2.0,
            output_dir: PathBuf::from("."),
        }
    }
}

impl ExportConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl PortalConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(format!("Invalid config: {}", e)))
    }

    /// Read and parse a configuration file
    pub fn load_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Reject values the portal cannot run with
    pub fn validate(&self) -> Result<()> {
        let base = self.resolver.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(Error::Config(format!(
                "resolver.base_url must be an http(s) URL, got '{}'",
                base
            )));
        }
        if self.resolver.timeout_secs == 0 {
            return Err(Error::Config("resolver.timeout_secs must be > 0".to_string()));
        }
        if !self.resolver.endpoints.artifact.contains("{id}") {
            return Err(Error::Config(
                "resolver.endpoints.artifact must contain {id}".to_string(),
            ));
        }
        if !self.resolver.endpoints.by_mobile.contains("{mobile}") {
            return Err(Error::Config(
                "resolver.endpoints.by_mobile must contain {mobile}".to_string(),
            ));
        }
        if self.export.element_id.trim().is_empty() {
            return Err(Error::Config("export.element_id must not be empty".to_string()));
        }
        if !(self.export.capture_scale > 0.0 && self.export.capture_scale <= 8.0) {
            return Err(Error::Config(format!(
                "export.capture_scale must be in (0, 8], got {}",
                self.export.capture_scale
            )));
        }
        Ok(())
    }
}

/// Where the active configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    CommandLine(PathBuf),
    Environment(PathBuf),
    UserConfigDir(PathBuf),
    CompiledDefaults,
}

/// Locates and loads the portal configuration
pub struct ConfigResolver {
    cli_path: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new(cli_path: Option<PathBuf>) -> Self {
        Self { cli_path }
    }

    /// Pick the configuration source by priority
    pub fn source(&self) -> ConfigSource {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_path {
            return ConfigSource::CommandLine(path.clone());
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return ConfigSource::Environment(PathBuf::from(path));
            }
        }

        // Priority 3: per-user config file
        if let Some(path) = user_config_path() {
            if path.exists() {
                return ConfigSource::UserConfigDir(path);
            }
        }

        // Priority 4: compiled defaults
        ConfigSource::CompiledDefaults
    }

    /// Load, apply environment overrides and validate
    pub fn load(&self) -> Result<PortalConfig> {
        let source = self.source();
        let mut config = match &source {
            ConfigSource::CommandLine(path)
            | ConfigSource::Environment(path)
            | ConfigSource::UserConfigDir(path) => {
                info!("Loading configuration from {}", path.display());
                PortalConfig::load_file(path)?
            }
            ConfigSource::CompiledDefaults => {
                warn!("No configuration file found, using compiled defaults");
                PortalConfig::default()
            }
        };

        if let Ok(base_url) = std::env::var(BASE_URL_ENV_VAR) {
            if !base_url.trim().is_empty() {
                info!("Resolver base URL overridden by {}", BASE_URL_ENV_VAR);
                config.resolver.base_url = base_url.trim().to_string();
            }
        }

        config.validate()?;
        Ok(config)
    }
}

/// `<user config dir>/evp/config.toml`
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("evp").join("config.toml"))
}
