//! Run-scoped store for remotely fetched assets.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use merchgen_shared::{MerchGenError, Result};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use uuid::Uuid;

/// Fallback file name when a locator has no usable last segment.
const DEFAULT_FILE_NAME: &str = "image.png";

/// Hex digits of the locator hash kept in the file name.
const HASH_PREFIX_LEN: usize = 16;

/// Maps remote locators to local copies for the lifetime of one run.
///
/// Created empty at run start, filled on the first successful fetch of each
/// locator, and discarded by [`SessionCache::close`]. Entries are never
/// evicted in between.
#[derive(Debug)]
pub struct SessionCache {
    dir: PathBuf,
    entries: HashMap<String, PathBuf>,
}

impl SessionCache {
    /// New cache backed by a fresh directory under the system temp dir.
    /// The directory is created on the first store.
    pub fn new() -> Self {
        Self::in_dir(std::env::temp_dir().join(format!("merchgen-assets-{}", Uuid::now_v7())))
    }

    pub fn in_dir(dir: PathBuf) -> Self {
        Self {
            dir,
            entries: HashMap::new(),
        }
    }

    /// Backing directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn get(&self, locator: &str) -> Option<&Path> {
        self.entries.get(locator).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Persist fetched bytes for `locator` and remember the copy.
    pub async fn store(&mut self, locator: &str, bytes: &[u8]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| MerchGenError::io(&self.dir, e))?;

        let path = self.dir.join(cache_file_name(locator));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| MerchGenError::io(&path, e))?;

        debug!(locator, path = %path.display(), size = bytes.len(), "cached asset");
        self.entries.insert(locator.to_string(), path.clone());
        Ok(path)
    }

    /// Drop every entry and remove the backing directory.
    pub async fn close(self) {
        if !self.dir.exists() {
            return;
        }
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => debug!(dir = %self.dir.display(), entries = self.entries.len(), "asset cache discarded"),
            Err(e) => warn!(dir = %self.dir.display(), error = %e, "could not remove asset cache"),
        }
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new()
    }
}

/// `{sha256(locator)[..16]}_{sanitized last segment}`.
pub fn cache_file_name(locator: &str) -> String {
    let digest = Sha256::digest(locator.as_bytes());
    let hash: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("{}_{}", &hash[..HASH_PREFIX_LEN], safe_file_name(locator))
}

/// Last path segment of `locator`, decoded, restricted to `[A-Za-z0-9._-]`.
fn safe_file_name(locator: &str) -> String {
    let segment = url::Url::parse(locator)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
        })
        .unwrap_or_else(|| locator.rsplit('/').next().unwrap_or_default().to_string());

    let decoded = urlencoding::decode(&segment)
        .map(|s| s.into_owned())
        .unwrap_or(segment);

    let safe: String = decoded
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if safe.trim_matches(|c| c == '_' || c == '.').is_empty() {
        DEFAULT_FILE_NAME.to_string()
    } else {
        safe
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_file_name_shape() {
        let name = cache_file_name("https://cdn.test/MLB/LOGOS/TEAMS/AL/East/Boston%20Red%20Sox.png");
        let (hash, rest) = name.split_once('_').unwrap();
        assert_eq!(hash.len(), HASH_PREFIX_LEN);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(rest, "Boston_Red_Sox.png");
    }

    #[test]
    fn cache_file_name_is_stable_and_distinct() {
        let a = cache_file_name("https://cdn.test/a/logo.png");
        let b = cache_file_name("https://cdn.test/b/logo.png");
        assert_eq!(a, cache_file_name("https://cdn.test/a/logo.png"));
        assert_ne!(a, b);
    }

    #[test]
    fn empty_segment_uses_default_name() {
        assert!(cache_file_name("https://cdn.test/").ends_with(DEFAULT_FILE_NAME));
    }

    #[tokio::test]
    async fn store_then_close_removes_dir() {
        let mut cache = SessionCache::new();
        assert!(cache.is_empty());

        let path = cache.store("https://cdn.test/x.png", b"png").await.unwrap();
        assert!(path.starts_with(cache.dir()));
        assert_eq!(cache.get("https://cdn.test/x.png"), Some(path.as_path()));
        assert_eq!(cache.len(), 1);

        let dir = cache.dir().to_path_buf();
        cache.close().await;
        assert!(!dir.exists());
    }
}
