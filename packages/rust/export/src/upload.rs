//! Best-effort upload of exported artifacts.

use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use merchgen_shared::{DeliveryConfig, MerchGenError, Result};

/// Upload request headers.
const HEADER_FILE_PATH: &str = "X-File-Path";
const HEADER_FILE_NAME: &str = "X-File-Name";
const HEADER_CLIENT_ID: &str = "X-Client-Id";

// ---------------------------------------------------------------------------
// RemoteKey
// ---------------------------------------------------------------------------

/// Object key `{template id}/{file name}`, each part percent-encoded.
///
/// `/` inside a part is always encoded, so distinct pairs never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteKey(String);

impl RemoteKey {
    pub fn new(template_id: &str, file_name: &str) -> Self {
        Self(format!(
            "{}/{}",
            urlencoding::encode(template_id),
            urlencoding::encode(file_name)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RemoteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// RemoteOutcome
// ---------------------------------------------------------------------------

/// What happened to the remote copy. Never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RemoteOutcome {
    Uploaded { url: String },
    Skipped { reason: String },
    Failed { reason: String },
}

impl RemoteOutcome {
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Uploaded { url } => Some(url),
            _ => None,
        }
    }

    /// Short status label for history records.
    pub fn status(&self) -> &'static str {
        match self {
            Self::Uploaded { .. } => "uploaded",
            Self::Skipped { .. } => "skipped",
            Self::Failed { .. } => "failed",
        }
    }

    fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    url: Option<String>,
}

// ---------------------------------------------------------------------------
// Deliverer
// ---------------------------------------------------------------------------

/// Posts artifacts to the configured upload endpoint.
pub struct Deliverer {
    client: Client,
    config: DeliveryConfig,
}

impl Deliverer {
    pub fn new(config: DeliveryConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.client_id.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MerchGenError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    /// Current answer of the cloud-export toggle.
    pub fn cloud_toggle(&self) -> bool {
        self.config.cloud_toggle()
    }

    /// Upload `local` under `key`. Failures are reported, never raised.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn upload(&self, local: &Path, key: &RemoteKey) -> RemoteOutcome {
        let Some(endpoint) = self.config.upload_url.as_deref() else {
            return RemoteOutcome::skipped("no upload endpoint configured");
        };

        let body = match tokio::fs::read(local).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %local.display(), error = %e, "could not read artifact for upload");
                return RemoteOutcome::failed(format!("read {}: {e}", local.display()));
            }
        };
        let file_name = local
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        debug!(endpoint, size = body.len(), "uploading artifact");
        let response = match self
            .client
            .post(endpoint)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(HEADER_FILE_PATH, key.as_str())
            .header(HEADER_FILE_NAME, file_name)
            .header(HEADER_CLIENT_ID, &self.config.client_id)
            .body(body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "upload request failed");
                return RemoteOutcome::failed(e.to_string());
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "upload rejected");
            return RemoteOutcome::failed(format!("HTTP {status}"));
        }

        // A success without a usable `url` still counts; fall back to the
        // public prefix.
        let returned = response
            .text()
            .await
            .ok()
            .and_then(|text| serde_json::from_str::<UploadResponse>(&text).ok())
            .and_then(|r| r.url)
            .filter(|u| !u.trim().is_empty());

        let url = returned.unwrap_or_else(|| self.default_url(key));
        info!(url = %url, "artifact uploaded");
        RemoteOutcome::Uploaded { url }
    }

    /// `{public_base_url}/{key}`.
    pub fn default_url(&self, key: &RemoteKey) -> String {
        format!(
            "{}/{}",
            self.config.public_base_url.trim_end_matches('/'),
            key
        )
    }
}
