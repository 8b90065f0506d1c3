//! Single-writer access to the open document.

use std::path::Path;
use std::sync::LazyLock;

use merchgen_shared::{MerchGenError, Result};
use regex::Regex;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{Anchor, Bounds, Document, NodeId, Rgb};

/// Host-appended duplicate decoration: " copy", " Copy 2", ...
static COPY_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+copy(?:\s*\d+)?$").expect("copy suffix regex"));

/// Light-background text color used by [`DocumentSession::set_text_color`].
const DARK_TEXT: &str = "252525";

/// Remove a trailing " copy" / " copy N" decoration from a node name.
pub fn strip_copy_suffix(name: &str) -> String {
    COPY_SUFFIX.replace(name, "").into_owned()
}

/// Serializes every mutation against the one open document.
///
/// All operations take `&self` and acquire the session lock for their whole
/// duration, so callers may await them independently without interleaving
/// edits. A detached session fails every operation with
/// [`MerchGenError::PreconditionFailed`].
pub struct DocumentSession {
    doc: Mutex<Option<Box<dyn Document>>>,
}

impl DocumentSession {
    pub fn attached(doc: impl Document + 'static) -> Self {
        Self {
            doc: Mutex::new(Some(Box::new(doc))),
        }
    }

    /// A session with no open document.
    pub fn detached() -> Self {
        Self {
            doc: Mutex::new(None),
        }
    }

    pub async fn is_attached(&self) -> bool {
        self.doc.lock().await.is_some()
    }

    /// Run `f` against the document while holding the session lock.
    pub async fn with<T>(&self, f: impl FnOnce(&mut dyn Document) -> Result<T>) -> Result<T> {
        let mut guard = self.doc.lock().await;
        let doc = guard
            .as_deref_mut()
            .ok_or_else(|| MerchGenError::precondition("no document is open"))?;
        f(doc)
    }

    /// Release the document.
    pub fn into_inner(self) -> Option<Box<dyn Document>> {
        self.doc.into_inner()
    }

    // -----------------------------------------------------------------------
    // Pass-through primitives
    // -----------------------------------------------------------------------

    pub async fn name(&self) -> Result<String> {
        self.with(|d| Ok(d.name().to_string())).await
    }

    pub async fn find_child(&self, parent: Option<NodeId>, name: &str) -> Result<Option<NodeId>> {
        self.with(|d| Ok(d.find_child(parent, name))).await
    }

    pub async fn children(&self, parent: Option<NodeId>) -> Result<Vec<NodeId>> {
        self.with(|d| Ok(d.children(parent))).await
    }

    pub async fn node_name(&self, node: NodeId) -> Result<String> {
        self.with(|d| d.node_name(node)).await
    }

    pub async fn text(&self, node: NodeId) -> Result<String> {
        self.with(|d| d.text(node)).await
    }

    pub async fn set_text(&self, node: NodeId, contents: &str) -> Result<()> {
        self.with(|d| d.set_text(node, contents)).await
    }

    pub async fn font_size(&self, node: NodeId) -> Result<f64> {
        self.with(|d| d.font_size(node)).await
    }

    pub async fn set_font_size(&self, node: NodeId, size: f64) -> Result<()> {
        self.with(|d| d.set_font_size(node, size)).await
    }

    pub async fn bounds(&self, node: NodeId) -> Result<Bounds> {
        self.with(|d| d.bounds(node)).await
    }

    pub async fn translate(&self, node: NodeId, dx: f64, dy: f64) -> Result<()> {
        self.with(|d| d.translate(node, dx, dy)).await
    }

    pub async fn scale(&self, node: NodeId, percent: f64, anchor: Anchor) -> Result<()> {
        self.with(|d| d.scale(node, percent, anchor)).await
    }

    pub async fn replace_contents(&self, node: NodeId, file: &Path) -> Result<()> {
        self.with(|d| d.replace_contents(node, file)).await
    }

    pub async fn begin_edit_group(&self, name: &str) -> Result<()> {
        self.with(|d| {
            d.begin_edit_group(name);
            Ok(())
        })
        .await
    }

    pub async fn end_edit_group(&self) -> Result<()> {
        self.with(|d| {
            d.end_edit_group();
            Ok(())
        })
        .await
    }

    pub async fn raster_extension(&self) -> Result<String> {
        self.with(|d| Ok(d.raster_extension().to_string())).await
    }

    pub async fn export_raster(&self, path: &Path) -> Result<()> {
        self.with(|d| d.export_raster(path)).await
    }

    // -----------------------------------------------------------------------
    // Capability operations
    // -----------------------------------------------------------------------

    /// Fill a shape with a hex color.
    pub async fn fill_color(&self, node: NodeId, hex: &str) -> Result<()> {
        let color = Rgb::from_hex(hex);
        self.with(|d| d.fill_color(node, color)).await
    }

    pub async fn set_stroke_color(&self, node: NodeId, hex: &str) -> Result<()> {
        let color = Rgb::from_hex(hex);
        self.with(|d| d.stroke_color(node, color)).await
    }

    /// Pick a readable text color for `background_hex` and apply it.
    pub async fn set_text_color(&self, node: NodeId, background_hex: &str) -> Result<()> {
        let color = if Rgb::from_hex(background_hex) == Rgb::WHITE {
            Rgb::from_hex(DARK_TEXT)
        } else {
            Rgb::WHITE
        };
        self.with(|d| d.text_color(node, color)).await
    }

    /// Duplicate `node`, name the copy `new_name`, scrub host " copy"
    /// decorations from every descendant, then offset it by `(dx, dy)`.
    pub async fn duplicate(
        &self,
        node: NodeId,
        new_name: &str,
        dx: f64,
        dy: f64,
    ) -> Result<NodeId> {
        self.with(|d| {
            let dup = d.duplicate(node)?;
            let name = if new_name.trim().is_empty() {
                strip_copy_suffix(&d.node_name(dup)?)
            } else {
                new_name.to_string()
            };
            d.rename(dup, &name)?;
            scrub_descendants(d, dup)?;
            if dx != 0.0 || dy != 0.0 {
                d.translate(dup, dx, dy)?;
            }
            debug!(source = %node, duplicate = %dup, name = %name, "duplicated node");
            Ok(dup)
        })
        .await
    }
}

fn scrub_descendants(doc: &mut dyn Document, parent: NodeId) -> Result<()> {
    for child in doc.children(Some(parent)) {
        let current = doc.node_name(child)?;
        let clean = strip_copy_suffix(&current);
        if clean != current {
            doc.rename(child, &clean)?;
        }
        scrub_descendants(doc, child)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SceneDocument;
    use crate::scene::tests::FIXTURE;

    fn session() -> DocumentSession {
        DocumentSession::attached(SceneDocument::from_json(FIXTURE).expect("fixture"))
    }

    #[test]
    fn strips_copy_decorations() {
        assert_eq!(strip_copy_suffix("BADGE copy"), "BADGE");
        assert_eq!(strip_copy_suffix("BADGE Copy 2"), "BADGE");
        assert_eq!(strip_copy_suffix("BADGE copy12"), "BADGE");
        assert_eq!(strip_copy_suffix("BADGE"), "BADGE");
        assert_eq!(strip_copy_suffix("Photocopy"), "Photocopy");
        // Only the trailing decoration is removed.
        assert_eq!(strip_copy_suffix("copy BADGE copy"), "copy BADGE");
    }

    #[tokio::test]
    async fn detached_session_fails_with_precondition() {
        let session = DocumentSession::detached();
        assert!(!session.is_attached().await);
        let err = session.name().await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn duplicate_renames_and_scrubs_descendants() {
        let session = session();
        let bottom = session.find_child(None, "BOTTOM").await.unwrap().unwrap();
        let badge = session
            .find_child(Some(bottom), "BADGE")
            .await
            .unwrap()
            .unwrap();
        let before = session.bounds(badge).await.unwrap();

        let dup = session.duplicate(badge, "BADGE 2", 0.0, -120.0).await.unwrap();

        assert_eq!(session.node_name(dup).await.unwrap(), "BADGE 2");
        let inner = session.children(Some(dup)).await.unwrap();
        assert_eq!(session.node_name(inner[0]).await.unwrap(), "BADGE TEXT");
        assert_eq!(
            session.bounds(dup).await.unwrap(),
            before.translated(0.0, -120.0)
        );
        // Source stays where it was.
        assert_eq!(session.bounds(badge).await.unwrap(), before);
    }

    #[tokio::test]
    async fn duplicate_without_name_strips_suffix() {
        let session = session();
        let logo = session.find_child(None, "LOGO").await.unwrap().unwrap();
        let dup = session.duplicate(logo, "", 0.0, 0.0).await.unwrap();
        assert_eq!(session.node_name(dup).await.unwrap(), "LOGO");
    }

    #[tokio::test]
    async fn text_color_contrasts_with_background() {
        let session = session();
        let name = session.find_child(None, "TEAM NAME").await.unwrap().unwrap();
        let path = std::env::temp_dir().join(format!(
            "merchgen-session-{}.scene.json",
            uuid::Uuid::now_v7()
        ));

        session.set_text_color(name, "FFFFFF").await.unwrap();
        session.export_raster(&path).await.unwrap();
        let snapshot = SceneDocument::open(&path).unwrap();
        let node = snapshot.find_child(None, "TEAM NAME").unwrap();
        let style = snapshot.text_style(node).unwrap().unwrap();
        assert_eq!(style.color, Some(Rgb::from_hex(DARK_TEXT)));

        session.set_text_color(name, "bd3039").await.unwrap();
        session.export_raster(&path).await.unwrap();
        let snapshot = SceneDocument::open(&path).unwrap();
        let node = snapshot.find_child(None, "TEAM NAME").unwrap();
        let style = snapshot.text_style(node).unwrap().unwrap();
        assert_eq!(style.color, Some(Rgb::WHITE));

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn capability_colors_apply_hex() {
        let session = session();
        let bottom = session.find_child(None, "BOTTOM").await.unwrap().unwrap();
        let bar = session.find_child(Some(bottom), "BAR").await.unwrap().unwrap();
        session.fill_color(bar, "#BD3039").await.unwrap();
        session.set_stroke_color(bar, "0c2340").await.unwrap();

        let name = session.find_child(None, "TEAM NAME").await.unwrap().unwrap();
        assert!(session.fill_color(name, "ffffff").await.is_err());
    }
}
