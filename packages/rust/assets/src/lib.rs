//! Tiered asset resolution for merchgen.
//!
//! An [`AssetRequest`] is resolved by trying, in order and stopping at the
//! first success:
//! 1. the remote locator (served from the [`SessionCache`] when already fetched)
//! 2. a relative path under the base folder (never cached)
//! 3. the placeholder path under the base folder
//!
//! When every tier fails the caller gets [`Resolution::Unresolved`] and must
//! leave its target untouched.

mod cache;

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, instrument, warn};

use merchgen_shared::{AssetConfig, MerchGenError, Result};

pub use cache::{SessionCache, cache_file_name};

/// User-Agent string for asset requests.
const USER_AGENT: &str = concat!("merchgen/", env!("CARGO_PKG_VERSION"));

/// Maximum redirects followed for a remote asset.
const MAX_REDIRECTS: usize = 5;

// ---------------------------------------------------------------------------
// Request / outcome
// ---------------------------------------------------------------------------

/// A logical image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRequest {
    /// Preferred remote locator.
    pub remote_url: Option<String>,
    /// Fallback path relative to the base folder.
    pub local_path: Option<String>,
    /// Last-resort path relative to the base folder.
    pub placeholder_path: String,
}

impl AssetRequest {
    /// Request for an entity's logo: CDN first, then the mirrored local
    /// layout, then the league placeholder.
    pub fn team_logo(
        config: &AssetConfig,
        league: &str,
        classification: &str,
        division: &str,
        full_name: &str,
    ) -> Self {
        Self {
            remote_url: Some(cdn_logo_url(
                &config.cdn_base_url,
                league,
                classification,
                division,
                full_name,
            )),
            local_path: Some(local_logo_path(classification, division, full_name)),
            placeholder_path: config.placeholder_path.clone(),
        }
    }
}

/// Which tier satisfied a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Local copy of the remote asset in the session cache.
    Remote(PathBuf),
    Local(PathBuf),
    Placeholder(PathBuf),
    Unresolved,
}

impl Resolution {
    /// File to swap into the document, if any tier succeeded.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Remote(p) | Self::Local(p) | Self::Placeholder(p) => Some(p),
            Self::Unresolved => None,
        }
    }

    pub fn tier(&self) -> &'static str {
        match self {
            Self::Remote(_) => "remote",
            Self::Local(_) => "local",
            Self::Placeholder(_) => "placeholder",
            Self::Unresolved => "unresolved",
        }
    }
}

/// A resolution plus how many tiers were tried (at most 3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub resolution: Resolution,
    pub attempts: u8,
}

// ---------------------------------------------------------------------------
// AssetResolver
// ---------------------------------------------------------------------------

/// Resolves asset requests for one run.
///
/// Owns the run's [`SessionCache`]; call [`AssetResolver::close`] at run end.
/// Resolution takes `&mut self`: requests are handled one at a time.
pub struct AssetResolver {
    client: Client,
    base_folder: PathBuf,
    keep_dir: String,
    cache: SessionCache,
}

impl AssetResolver {
    pub fn new(config: &AssetConfig, base_folder: impl Into<PathBuf>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MerchGenError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_folder: base_folder.into(),
            keep_dir: config.keep_dir.clone(),
            cache: SessionCache::new(),
        })
    }

    pub fn base_folder(&self) -> &Path {
        &self.base_folder
    }

    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    /// Resolve `request`. Never fails: exhaustion yields
    /// [`Resolution::Unresolved`].
    #[instrument(skip_all, fields(remote = request.remote_url.as_deref().unwrap_or("-")))]
    pub async fn resolve(&mut self, request: &AssetRequest) -> Resolved {
        let mut attempts = 0u8;

        if let Some(url) = request.remote_url.as_deref().filter(|u| !u.is_empty()) {
            attempts += 1;
            if let Some(path) = self.cache.get(url) {
                debug!("asset served from session cache");
                return Resolved {
                    resolution: Resolution::Remote(path.to_path_buf()),
                    attempts,
                };
            }
            match self.fetch_remote(url).await {
                Ok(path) => {
                    return Resolved {
                        resolution: Resolution::Remote(path),
                        attempts,
                    };
                }
                Err(e) => debug!(error = %e, "remote tier failed"),
            }
        }

        if let Some(rel) = request.local_path.as_deref().filter(|p| !p.is_empty()) {
            attempts += 1;
            if let Some(path) = self.existing_file(rel).await {
                return Resolved {
                    resolution: Resolution::Local(path),
                    attempts,
                };
            }
            debug!(path = rel, "local tier failed");
        }

        attempts += 1;
        if let Some(path) = self.existing_file(&request.placeholder_path).await {
            return Resolved {
                resolution: Resolution::Placeholder(path),
                attempts,
            };
        }

        warn!(
            local = request.local_path.as_deref().unwrap_or("-"),
            placeholder = %request.placeholder_path,
            "asset unresolved"
        );
        Resolved {
            resolution: Resolution::Unresolved,
            attempts,
        }
    }

    /// A durable path for a resolved asset, safe to hand to the document.
    ///
    /// Remote hits live in the session cache, which [`AssetResolver::close`]
    /// deletes, so they are copied into the keep directory under the base
    /// folder first. Local and placeholder files are returned as they are.
    #[instrument(skip_all, fields(tier = resolution.tier()))]
    pub async fn keep(&self, resolution: &Resolution) -> Result<Option<PathBuf>> {
        let cached = match resolution {
            Resolution::Remote(p) => p,
            Resolution::Local(p) | Resolution::Placeholder(p) => return Ok(Some(p.clone())),
            Resolution::Unresolved => return Ok(None),
        };

        let dir = join_relative(&self.base_folder, &self.keep_dir)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| MerchGenError::io(&dir, e))?;

        let file_name = cached.file_name().ok_or_else(|| {
            MerchGenError::validation(format!("cached asset has no file name: {}", cached.display()))
        })?;
        let kept = dir.join(file_name);
        tokio::fs::copy(cached, &kept)
            .await
            .map_err(|e| MerchGenError::io(&kept, e))?;

        debug!(path = %kept.display(), "downloaded asset kept");
        Ok(Some(kept))
    }

    /// Discard the session cache and its directory.
    pub async fn close(self) {
        self.cache.close().await;
    }

    async fn fetch_remote(&mut self, url: &str) -> Result<PathBuf> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MerchGenError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MerchGenError::Network(format!("{url}: HTTP {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| MerchGenError::Network(format!("{url}: failed to read body: {e}")))?;
        if bytes.is_empty() {
            return Err(MerchGenError::Network(format!("{url}: empty body")));
        }

        self.cache.store(url, &bytes).await
    }

    async fn existing_file(&self, relative: &str) -> Option<PathBuf> {
        let path = match join_relative(&self.base_folder, relative) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "rejected asset path");
                return None;
            }
        };
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Some(path),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Locators
// ---------------------------------------------------------------------------

/// `{cdn}/{league}/LOGOS/TEAMS/{classification}/{division}/{full name}.png`,
/// each variable segment percent-encoded.
pub fn cdn_logo_url(
    cdn_base_url: &str,
    league: &str,
    classification: &str,
    division: &str,
    full_name: &str,
) -> String {
    format!(
        "{}/{}/LOGOS/TEAMS/{}/{}/{}.png",
        cdn_base_url.trim_end_matches('/'),
        urlencoding::encode(league),
        urlencoding::encode(classification),
        urlencoding::encode(division),
        urlencoding::encode(full_name),
    )
}

/// Local mirror of the CDN layout, relative to the base folder.
pub fn local_logo_path(classification: &str, division: &str, full_name: &str) -> String {
    format!("LOGOS/TEAMS/{classification}/{division}/{full_name}.png")
}

/// Join a `/`- or `\`-separated relative path onto `base`, rejecting `..`.
pub fn join_relative(base: &Path, relative: &str) -> Result<PathBuf> {
    let normalized = relative.replace('\\', "/");
    let mut path = base.to_path_buf();
    for segment in normalized.split('/').filter(|s| !s.is_empty() && *s != ".") {
        if segment == ".." {
            return Err(MerchGenError::validation(format!(
                "path escapes base folder: {relative}"
            )));
        }
        path.push(segment);
    }
    Ok(path)
}
