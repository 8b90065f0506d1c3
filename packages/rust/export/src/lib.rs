//! Local-then-cloud artifact delivery.
//!
//! The local write is authoritative: it is the only step whose failure is an
//! error. The upload that may follow is best effort and always reported as a
//! [`RemoteOutcome`].

mod upload;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use merchgen_document::DocumentSession;
use merchgen_shared::{MerchGenError, Result};

pub use upload::{Deliverer, RemoteKey, RemoteOutcome};

/// Outcome of one export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub local_path: PathBuf,
    pub remote: RemoteOutcome,
}

impl DeliveryReport {
    /// Public URL of the uploaded copy, if any.
    pub fn remote_url(&self) -> Option<&str> {
        self.remote.url()
    }
}

/// Write the document to `local_target`, then upload it when a key is given
/// and cloud delivery is on.
///
/// `cloud_enabled = None` asks the deliverer's runtime toggle. Without a
/// deliverer the upload is skipped.
#[instrument(skip_all, fields(target = %local_target.display()))]
pub async fn export_and_deliver(
    session: &DocumentSession,
    local_target: &Path,
    remote_key: Option<&RemoteKey>,
    cloud_enabled: Option<bool>,
    deliverer: Option<&Deliverer>,
) -> Result<DeliveryReport> {
    session.export_raster(local_target).await?;

    let size = tokio::fs::metadata(local_target)
        .await
        .map_err(|e| MerchGenError::io(local_target, e))?
        .len();
    if size == 0 {
        return Err(MerchGenError::document(format!(
            "export produced an empty file: {}",
            local_target.display()
        )));
    }
    debug!(size, "artifact written");

    let remote = match (remote_key, deliverer) {
        (None, _) => RemoteOutcome::Skipped {
            reason: "no remote key".into(),
        },
        (Some(_), None) => RemoteOutcome::Skipped {
            reason: "no upload endpoint configured".into(),
        },
        (Some(key), Some(deliverer)) => {
            if cloud_enabled.unwrap_or_else(|| deliverer.cloud_toggle()) {
                deliverer.upload(local_target, key).await
            } else {
                RemoteOutcome::Skipped {
                    reason: "cloud export disabled".into(),
                }
            }
        }
    };

    match &remote {
        RemoteOutcome::Uploaded { url } => info!(url = %url, "artifact delivered"),
        RemoteOutcome::Failed { reason } => {
            warn!(reason = %reason, "upload failed; local artifact kept")
        }
        RemoteOutcome::Skipped { reason } => debug!(reason = %reason, "upload skipped"),
    }

    Ok(DeliveryReport {
        local_path: local_target.to_path_buf(),
        remote,
    })
}

/// `{Full-Name-dashed}_{design}_{product}.{ext}`; empty parts are omitted.
pub fn artifact_file_name(full_name: &str, design_id: &str, product_id: &str, ext: &str) -> String {
    let dashed = full_name.split_whitespace().collect::<Vec<_>>().join("-");
    let stem = [dashed.as_str(), design_id.trim(), product_id.trim()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    let stem = if stem.is_empty() { "design" } else { stem.as_str() };
    format!("{stem}.{}", ext.trim_start_matches('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use merchgen_document::SceneDocument;
    use merchgen_shared::DeliveryConfig;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SCENE: &str = r#"{
        "name": "merch-front", "width": 100, "height": 100,
        "layers": [ { "name": "TEAM NAME", "kind": "text",
                      "text": { "contents": "RED SOX", "font_size": 10 } } ]
    }"#;

    struct TempDir(PathBuf);

    impl TempDir {
        fn new() -> Self {
            Self(std::env::temp_dir().join(format!("merchgen-export-{}", uuid::Uuid::now_v7())))
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    fn session() -> DocumentSession {
        DocumentSession::attached(SceneDocument::from_json(SCENE).unwrap())
    }

    fn deliverer(upload_url: Option<String>) -> Deliverer {
        Deliverer::new(DeliveryConfig {
            upload_url,
            public_base_url: "https://pub.cdn.test/".into(),
            client_id: "merchgen/test".into(),
            cloud_enabled_default: false,
            timeout_secs: 5,
        })
        .unwrap()
    }

    fn key() -> RemoteKey {
        RemoteKey::new("26-DivPrev", "Boston-Red-Sox_26-DivPrev.scene.json")
    }

    #[tokio::test]
    async fn upload_failure_keeps_local_artifact() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new();
        let target = dir.0.join("out.scene.json");
        let d = deliverer(Some(format!("{}/api/upload", server.uri())));

        let report = export_and_deliver(&session(), &target, Some(&key()), Some(true), Some(&d))
            .await
            .unwrap();

        assert_eq!(report.remote_url(), None);
        assert!(matches!(report.remote, RemoteOutcome::Failed { .. }));
        assert!(std::fs::metadata(&target).unwrap().len() > 0);
    }

    #[tokio::test]
    async fn upload_sends_headers_and_prefers_returned_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/upload"))
            .and(header("content-type", "application/octet-stream"))
            .and(header("x-file-path", key().as_str()))
            .and(header("x-file-name", "Boston-Red-Sox_26-DivPrev.scene.json"))
            .and(header("x-client-id", "merchgen/test"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "url": "https://cdn.test/returned" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new();
        let target = dir.0.join("Boston-Red-Sox_26-DivPrev.scene.json");
        let d = deliverer(Some(format!("{}/api/upload", server.uri())));

        let report = export_and_deliver(&session(), &target, Some(&key()), Some(true), Some(&d))
            .await
            .unwrap();
        assert_eq!(report.remote_url(), Some("https://cdn.test/returned"));
    }

    #[tokio::test]
    async fn success_without_url_uses_default() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let dir = TempDir::new();
        let target = dir.0.join("a.scene.json");
        let d = deliverer(Some(server.uri()));

        let report = export_and_deliver(&session(), &target, Some(&key()), Some(true), Some(&d))
            .await
            .unwrap();
        assert_eq!(
            report.remote_url(),
            Some("https://pub.cdn.test/26-DivPrev/Boston-Red-Sox_26-DivPrev.scene.json")
        );
    }

    #[tokio::test]
    async fn upload_skipped_when_disabled_or_unkeyed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = TempDir::new();
        let target = dir.0.join("a.scene.json");
        let d = deliverer(Some(server.uri()));

        let report = export_and_deliver(&session(), &target, Some(&key()), Some(false), Some(&d))
            .await
            .unwrap();
        assert!(matches!(report.remote, RemoteOutcome::Skipped { .. }));

        let report = export_and_deliver(&session(), &target, None, Some(true), Some(&d))
            .await
            .unwrap();
        assert!(matches!(report.remote, RemoteOutcome::Skipped { .. }));

        let report = export_and_deliver(&session(), &target, Some(&key()), Some(true), None)
            .await
            .unwrap();
        assert!(matches!(report.remote, RemoteOutcome::Skipped { .. }));

        let unconfigured = deliverer(None);
        let report =
            export_and_deliver(&session(), &target, Some(&key()), Some(true), Some(&unconfigured))
                .await
                .unwrap();
        assert!(matches!(report.remote, RemoteOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn local_failure_is_an_error() {
        let dir = TempDir::new();
        let target = dir.0.join("a.scene.json");
        let err = export_and_deliver(&DocumentSession::detached(), &target, None, None, None)
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(!target.exists());
    }

    #[test]
    fn artifact_file_names() {
        assert_eq!(
            artifact_file_name("Boston Red Sox", "26-DivPrev", "TEE", "png"),
            "Boston-Red-Sox_26-DivPrev_TEE.png"
        );
        assert_eq!(
            artifact_file_name("Boston  Red Sox", "", "", ".scene.json"),
            "Boston-Red-Sox.scene.json"
        );
        assert_eq!(artifact_file_name("", "", "", "png"), "design.png");
    }
}
