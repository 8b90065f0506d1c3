//! Application configuration for merchgen.
//!
//! User config lives at `~/.merchgen/merchgen.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MerchGenError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "merchgen.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".merchgen";

/// Local state database file name (lives next to the config file).
const DATABASE_FILE_NAME: &str = "merchgen.db";

/// Env var consulted when the caller does not say whether to upload.
const CLOUD_EXPORT_ENV: &str = "MERCHGEN_CLOUD_EXPORT";

// ---------------------------------------------------------------------------
// Config structs (matching merchgen.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote dataset sources.
    #[serde(default)]
    pub sources: SourcesSection,

    /// Image asset resolution.
    #[serde(default)]
    pub assets: AssetsSection,

    /// Artifact export and cloud delivery.
    #[serde(default)]
    pub export: ExportSection,

    /// Entity matching.
    #[serde(default)]
    pub matching: MatchingSection,

    /// Batch loop tuning.
    #[serde(default)]
    pub batch: BatchSection,

    /// Logical names of the document nodes the batch mutates.
    #[serde(default)]
    pub layers: LayersSection,
}

/// `[sources]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesSection {
    /// Published master registry mapping league names to dataset URLs.
    #[serde(default = "default_master_registry_url")]
    pub master_registry_url: String,

    /// HTTP timeout for dataset and asset fetches.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

impl Default for SourcesSection {
    fn default() -> Self {
        Self {
            master_registry_url: default_master_registry_url(),
            http_timeout_secs: default_http_timeout(),
        }
    }
}

fn default_master_registry_url() -> String {
    "https://docs.google.com/spreadsheets/d/e/2PACX-1vSbCy1pnMHPC-i_MU3x2U8ESVtSeDu7M8RrDbNxl0D-aT-TFlJJ9o7KDMyugap2vlQgTCF8y5FSwLT2/pub?output=csv".into()
}
fn default_http_timeout() -> u64 {
    30
}

/// `[assets]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetsSection {
    /// Root of the image CDN.
    #[serde(default = "default_cdn_base_url")]
    pub cdn_base_url: String,

    /// Placeholder image, relative to the base folder.
    #[serde(default = "default_placeholder_path")]
    pub placeholder_path: String,

    /// Where downloaded images are kept once placed, relative to the base
    /// folder. The session cache is discarded at run end.
    #[serde(default = "default_keep_dir")]
    pub keep_dir: String,
}

impl Default for AssetsSection {
    fn default() -> Self {
        Self {
            cdn_base_url: default_cdn_base_url(),
            placeholder_path: default_placeholder_path(),
            keep_dir: default_keep_dir(),
        }
    }
}

fn default_cdn_base_url() -> String {
    "https://pub-3c06366d547445298c77e04b7c3c77ad.r2.dev".into()
}
fn default_placeholder_path() -> String {
    "LOGOS/LeagueLogo.png".into()
}
fn default_keep_dir() -> String {
    "EXPORTS/ASSETS".into()
}

/// `[export]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSection {
    /// Upload endpoint. Empty disables uploads entirely.
    #[serde(default = "default_upload_url")]
    pub upload_url: String,

    /// Prefix for the public URL of an uploaded object when the endpoint
    /// does not return one.
    #[serde(default = "default_cdn_base_url")]
    pub public_base_url: String,

    /// Client identifier sent with every upload.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Default answer of the cloud-export toggle.
    #[serde(default)]
    pub cloud_enabled: bool,

    /// Export directory, relative to the base folder.
    #[serde(default = "default_output_dir_name")]
    pub output_dir_name: String,
}

impl Default for ExportSection {
    fn default() -> Self {
        Self {
            upload_url: default_upload_url(),
            public_base_url: default_cdn_base_url(),
            client_id: default_client_id(),
            cloud_enabled: false,
            output_dir_name: default_output_dir_name(),
        }
    }
}

fn default_upload_url() -> String {
    "https://license-server-five-red.vercel.app/api/upload".into()
}
fn default_client_id() -> String {
    concat!("merchgen/", env!("CARGO_PKG_VERSION")).into()
}
fn default_output_dir_name() -> String {
    "EXPORTS/MERCH".into()
}

/// `[matching]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingSection {
    /// Compare full names case-sensitively.
    #[serde(default = "default_true")]
    pub case_sensitive: bool,
}

impl Default for MatchingSection {
    fn default() -> Self {
        Self {
            case_sensitive: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// `[batch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSection {
    /// Pause around text mutations so the host can redraw.
    #[serde(default = "default_step_delay")]
    pub step_delay_ms: u64,
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            step_delay_ms: default_step_delay(),
        }
    }
}

fn default_step_delay() -> u64 {
    500
}

/// `[layers]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayersSection {
    /// Node receiving the entity logo.
    #[serde(default = "default_logo_layer")]
    pub logo: String,

    /// Text node receiving the uppercased entity name.
    #[serde(default = "default_team_name_layer")]
    pub team_name: String,
}

impl Default for LayersSection {
    fn default() -> Self {
        Self {
            logo: default_logo_layer(),
            team_name: default_team_name_layer(),
        }
    }
}

fn default_logo_layer() -> String {
    "LOGO".into()
}
fn default_team_name_layer() -> String {
    "TEAM NAME".into()
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime configuration for dataset ingestion.
#[derive(Debug, Clone)]
pub struct SheetsConfig {
    /// Master registry URL.
    pub master_registry_url: String,
    /// HTTP timeout in seconds.
    pub timeout_secs: u64,
}

impl From<&AppConfig> for SheetsConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            master_registry_url: config.sources.master_registry_url.clone(),
            timeout_secs: config.sources.http_timeout_secs,
        }
    }
}

/// Runtime configuration for asset resolution.
#[derive(Debug, Clone)]
pub struct AssetConfig {
    /// Root of the image CDN (no trailing slash needed).
    pub cdn_base_url: String,
    /// Placeholder image, relative to the base folder.
    pub placeholder_path: String,
    /// Durable home for downloaded images, relative to the base folder.
    pub keep_dir: String,
    /// HTTP timeout in seconds.
    pub timeout_secs: u64,
}

impl From<&AppConfig> for AssetConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            cdn_base_url: config.assets.cdn_base_url.clone(),
            placeholder_path: config.assets.placeholder_path.clone(),
            keep_dir: config.assets.keep_dir.clone(),
            timeout_secs: config.sources.http_timeout_secs,
        }
    }
}

/// Runtime configuration for cloud delivery.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Upload endpoint; `None` disables uploads.
    pub upload_url: Option<String>,
    /// Prefix for default public URLs.
    pub public_base_url: String,
    /// Client identifier header value.
    pub client_id: String,
    /// Default answer of the cloud-export toggle.
    pub cloud_enabled_default: bool,
    /// HTTP timeout in seconds.
    pub timeout_secs: u64,
}

impl DeliveryConfig {
    /// Query the cloud-export toggle.
    ///
    /// `MERCHGEN_CLOUD_EXPORT` (`1`/`true`/`yes`/`on` or `0`/`false`/`no`/`off`)
    /// wins over the configured default. Read at call time so a long-running
    /// process sees changes.
    pub fn cloud_toggle(&self) -> bool {
        match std::env::var(CLOUD_EXPORT_ENV) {
            Ok(val) => match val.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => self.cloud_enabled_default,
            },
            Err(_) => self.cloud_enabled_default,
        }
    }
}

impl From<&AppConfig> for DeliveryConfig {
    fn from(config: &AppConfig) -> Self {
        let upload_url = config.export.upload_url.trim();
        Self {
            upload_url: (!upload_url.is_empty()).then(|| upload_url.to_string()),
            public_base_url: config.export.public_base_url.clone(),
            client_id: config.export.client_id.clone(),
            cloud_enabled_default: config.export.cloud_enabled,
            timeout_secs: config.sources.http_timeout_secs,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.merchgen/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| MerchGenError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.merchgen/merchgen.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Get the path to the local state database (`~/.merchgen/merchgen.db`).
pub fn database_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(DATABASE_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| MerchGenError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        MerchGenError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| MerchGenError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| MerchGenError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| MerchGenError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("master_registry_url"));
        assert!(toml_str.contains("LeagueLogo.png"));
        assert!(toml_str.contains("TEAM NAME"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.batch.step_delay_ms, 500);
        assert!(parsed.matching.case_sensitive);
        assert_eq!(parsed.layers.logo, "LOGO");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[matching]
case_sensitive = false

[export]
upload_url = ""
cloud_enabled = true
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert!(!config.matching.case_sensitive);
        assert_eq!(config.assets.placeholder_path, "LOGOS/LeagueLogo.png");
        assert_eq!(config.assets.keep_dir, "EXPORTS/ASSETS");

        let delivery = DeliveryConfig::from(&config);
        assert!(delivery.upload_url.is_none());
        assert!(delivery.cloud_enabled_default);
        assert!(delivery.client_id.starts_with("merchgen/"));
    }

    #[test]
    fn runtime_configs_from_app_config() {
        let app = AppConfig::default();
        let sheets = SheetsConfig::from(&app);
        assert_eq!(sheets.timeout_secs, 30);
        let assets = AssetConfig::from(&app);
        assert!(assets.cdn_base_url.starts_with("https://"));
        let delivery = DeliveryConfig::from(&app);
        assert!(delivery.upload_url.is_some());
    }

    #[test]
    fn config_file_parse_error_is_reported() {
        let tmp = std::env::temp_dir().join(format!("merchgen-bad-{}.toml", uuid::Uuid::now_v7()));
        std::fs::write(&tmp, "[matching\ncase_sensitive = ").unwrap();
        let err = load_config_from(&tmp).unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
        let _ = std::fs::remove_file(&tmp);
    }
}
