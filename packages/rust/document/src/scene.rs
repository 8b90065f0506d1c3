//! In-memory layered document persisted as JSON.
//!
//! `SceneDocument` is the built-in host: it loads a layer tree from a scene
//! file, applies the same primitives a raster editor would, and exports a
//! render snapshot (the fully mutated scene) for an external rasterizer.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use merchgen_shared::{MerchGenError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Anchor, Bounds, Document, NodeId, NodeKind, Rgb};

/// Average glyph advance as a fraction of the font size. Used to estimate
/// text extents when contents or size change.
const GLYPH_WIDTH_RATIO: f64 = 0.6;

/// Suffix the host appends to duplicated nodes.
const COPY_SUFFIX: &str = " copy";

/// Snapshot file extension.
const SCENE_EXTENSION: &str = "scene.json";

// ---------------------------------------------------------------------------
// File format
// ---------------------------------------------------------------------------

/// On-disk scene: document header plus the layer tree, top layer first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneFile {
    pub name: String,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub layers: Vec<SceneLayer>,
    /// Edit groups committed so far (the host's undo history).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<String>,
}

/// One layer of a scene file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneLayer {
    pub name: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub bounds: Bounds,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<TextStyle>,
    /// Image file backing a placed layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<Rgb>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<Rgb>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SceneLayer>,
}

/// Text contents and character style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextStyle {
    pub contents: String,
    pub font_size: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Rgb>,
}

// ---------------------------------------------------------------------------
// SceneDocument
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    name: String,
    kind: NodeKind,
    bounds: Bounds,
    text: Option<TextStyle>,
    source: Option<PathBuf>,
    fill: Option<Rgb>,
    stroke: Option<Rgb>,
    children: Vec<NodeId>,
}

/// Arena-backed layer tree implementing [`Document`].
#[derive(Debug, Clone)]
pub struct SceneDocument {
    name: String,
    width: f64,
    height: f64,
    nodes: BTreeMap<NodeId, Node>,
    roots: Vec<NodeId>,
    next_id: u64,
    history: Vec<String>,
    open_group: Option<String>,
}

impl SceneDocument {
    /// Build from a parsed scene file.
    pub fn from_scene(scene: SceneFile) -> Self {
        let mut doc = Self {
            name: scene.name,
            width: scene.width,
            height: scene.height,
            nodes: BTreeMap::new(),
            roots: Vec::new(),
            next_id: 1,
            history: scene.history,
            open_group: None,
        };
        for layer in scene.layers {
            let id = doc.insert_layer(layer, None);
            doc.roots.push(id);
        }
        doc
    }

    /// Parse a scene from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        let scene: SceneFile = serde_json::from_str(json)
            .map_err(|e| MerchGenError::parse(format!("invalid scene file: {e}")))?;
        Ok(Self::from_scene(scene))
    }

    /// Load a scene file from disk.
    pub fn open(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| MerchGenError::io(path, e))?;
        Self::from_json(&json)
    }

    /// Current state as a scene file.
    pub fn to_scene(&self) -> SceneFile {
        SceneFile {
            name: self.name.clone(),
            width: self.width,
            height: self.height,
            layers: self.roots.iter().map(|id| self.to_layer(*id)).collect(),
            history: self.history.clone(),
        }
    }

    /// Save the current state as a scene file.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, &self.to_json()?)
    }

    /// Committed edit groups, oldest first.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Image currently backing a placed node.
    pub fn source(&self, node: NodeId) -> Result<Option<PathBuf>> {
        Ok(self.node(node)?.source.clone())
    }

    pub fn fill(&self, node: NodeId) -> Result<Option<Rgb>> {
        Ok(self.node(node)?.fill)
    }

    pub fn stroke(&self, node: NodeId) -> Result<Option<Rgb>> {
        Ok(self.node(node)?.stroke)
    }

    pub fn text_style(&self, node: NodeId) -> Result<Option<TextStyle>> {
        Ok(self.node(node)?.text.clone())
    }

    fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(&self.to_scene())
            .map_err(|e| MerchGenError::document(format!("failed to serialize scene: {e}")))
    }

    fn insert_layer(&mut self, layer: SceneLayer, parent: Option<NodeId>) -> NodeId {
        let id = self.alloc_id();
        let SceneLayer {
            name,
            kind,
            bounds,
            text,
            source,
            fill,
            stroke,
            children,
        } = layer;
        self.nodes.insert(
            id,
            Node {
                parent,
                name,
                kind,
                bounds,
                text,
                source,
                fill,
                stroke,
                children: Vec::new(),
            },
        );
        let child_ids: Vec<NodeId> = children
            .into_iter()
            .map(|child| self.insert_layer(child, Some(id)))
            .collect();
        if let Some(node) = self.nodes.get_mut(&id) {
            node.children = child_ids;
        }
        id
    }

    fn to_layer(&self, id: NodeId) -> SceneLayer {
        let Some(node) = self.nodes.get(&id) else {
            return SceneLayer {
                name: String::new(),
                kind: NodeKind::Group,
                bounds: Bounds::default(),
                text: None,
                source: None,
                fill: None,
                stroke: None,
                children: Vec::new(),
            };
        };
        SceneLayer {
            name: node.name.clone(),
            kind: node.kind,
            bounds: self.bounds(id).unwrap_or(node.bounds),
            text: node.text.clone(),
            source: node.source.clone(),
            fill: node.fill,
            stroke: node.stroke,
            children: node.children.iter().map(|c| self.to_layer(*c)).collect(),
        }
    }

    fn alloc_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(&id)
            .ok_or_else(|| MerchGenError::document(format!("no node {id}")))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| MerchGenError::document(format!("no node {id}")))
    }

    fn expect_kind(&mut self, id: NodeId, kind: NodeKind, op: &str) -> Result<&mut Node> {
        let node = self.node_mut(id)?;
        if node.kind != kind {
            return Err(MerchGenError::document(format!(
                "{op}: node {id} ({}) is {:?}, expected {kind:?}",
                node.name, node.kind
            )));
        }
        Ok(node)
    }

    /// `id` and every node below it.
    fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = vec![id];
        let mut i = 0;
        while i < out.len() {
            if let Some(node) = self.nodes.get(&out[i]) {
                out.extend(node.children.iter().copied());
            }
            i += 1;
        }
        out
    }

    fn copy_subtree(&mut self, id: NodeId, parent: Option<NodeId>) -> Result<NodeId> {
        let source = self.node(id)?.clone();
        let new_id = self.alloc_id();
        let mut copy = source.clone();
        copy.parent = parent;
        copy.name.push_str(COPY_SUFFIX);
        copy.children = Vec::new();
        self.nodes.insert(new_id, copy);

        let mut child_ids = Vec::with_capacity(source.children.len());
        for child in source.children {
            child_ids.push(self.copy_subtree(child, Some(new_id))?);
        }
        self.node_mut(new_id)?.children = child_ids;
        Ok(new_id)
    }

    fn refit_text(node: &mut Node) {
        if let Some(style) = &node.text {
            let chars = style.contents.chars().count() as f64;
            node.bounds.right = node.bounds.left + chars * style.font_size * GLYPH_WIDTH_RATIO;
            node.bounds.bottom = node.bounds.top + style.font_size;
        }
    }
}

impl Document for SceneDocument {
    fn name(&self) -> &str {
        &self.name
    }

    fn children(&self, parent: Option<NodeId>) -> Vec<NodeId> {
        match parent {
            None => self.roots.clone(),
            Some(id) => self
                .nodes
                .get(&id)
                .map(|n| n.children.clone())
                .unwrap_or_default(),
        }
    }

    fn node_name(&self, node: NodeId) -> Result<String> {
        Ok(self.node(node)?.name.clone())
    }

    fn node_kind(&self, node: NodeId) -> Result<NodeKind> {
        Ok(self.node(node)?.kind)
    }

    fn rename(&mut self, node: NodeId, name: &str) -> Result<()> {
        self.node_mut(node)?.name = name.to_string();
        Ok(())
    }

    fn text(&self, node: NodeId) -> Result<String> {
        self.node(node)?
            .text
            .as_ref()
            .map(|t| t.contents.clone())
            .ok_or_else(|| MerchGenError::document(format!("node {node} has no text")))
    }

    fn set_text(&mut self, node: NodeId, contents: &str) -> Result<()> {
        let n = self.expect_kind(node, NodeKind::Text, "set_text")?;
        let style = n.text.get_or_insert(TextStyle {
            contents: String::new(),
            font_size: 12.0,
            color: None,
        });
        style.contents = contents.to_string();
        Self::refit_text(n);
        Ok(())
    }

    fn font_size(&self, node: NodeId) -> Result<f64> {
        self.node(node)?
            .text
            .as_ref()
            .map(|t| t.font_size)
            .ok_or_else(|| MerchGenError::document(format!("node {node} has no text")))
    }

    fn set_font_size(&mut self, node: NodeId, size: f64) -> Result<()> {
        if !size.is_finite() || size <= 0.0 {
            return Err(MerchGenError::document(format!("invalid font size {size}")));
        }
        let n = self.expect_kind(node, NodeKind::Text, "set_font_size")?;
        let style = n.text.get_or_insert(TextStyle {
            contents: String::new(),
            font_size: size,
            color: None,
        });
        style.font_size = size;
        Self::refit_text(n);
        Ok(())
    }

    fn bounds(&self, node: NodeId) -> Result<Bounds> {
        let n = self.node(node)?;
        if n.kind != NodeKind::Group || n.children.is_empty() {
            return Ok(n.bounds);
        }
        let mut acc: Option<Bounds> = None;
        for child in &n.children {
            let b = self.bounds(*child)?;
            acc = Some(match acc {
                Some(a) => a.union(&b),
                None => b,
            });
        }
        Ok(acc.unwrap_or(n.bounds))
    }

    fn translate(&mut self, node: NodeId, dx: f64, dy: f64) -> Result<()> {
        // Round like the host does for pixel offsets.
        let (dx, dy) = (dx.round(), dy.round());
        for id in self.subtree(node) {
            let n = self.node_mut(id)?;
            n.bounds = n.bounds.translated(dx, dy);
        }
        Ok(())
    }

    fn scale(&mut self, node: NodeId, percent: f64, anchor: Anchor) -> Result<()> {
        if !percent.is_finite() || percent <= 0.0 {
            return Ok(());
        }
        let factor = percent / 100.0;
        let (ax, ay) = self.bounds(node)?.anchor_point(anchor);
        for id in self.subtree(node) {
            let n = self.node_mut(id)?;
            n.bounds = n.bounds.scaled_about(factor, ax, ay);
            if let Some(style) = n.text.as_mut() {
                style.font_size *= factor;
            }
        }
        Ok(())
    }

    fn replace_contents(&mut self, node: NodeId, file: &Path) -> Result<()> {
        if !file.is_file() {
            return Err(MerchGenError::document(format!(
                "replacement contents not found: {}",
                file.display()
            )));
        }
        let n = self.expect_kind(node, NodeKind::Placed, "replace_contents")?;
        n.source = Some(file.to_path_buf());
        debug!(node = %node, file = %file.display(), "replaced placed contents");
        Ok(())
    }

    fn fill_color(&mut self, node: NodeId, color: Rgb) -> Result<()> {
        self.expect_kind(node, NodeKind::Shape, "fill_color")?.fill = Some(color);
        Ok(())
    }

    fn stroke_color(&mut self, node: NodeId, color: Rgb) -> Result<()> {
        self.expect_kind(node, NodeKind::Shape, "stroke_color")?.stroke = Some(color);
        Ok(())
    }

    fn text_color(&mut self, node: NodeId, color: Rgb) -> Result<()> {
        let n = self.expect_kind(node, NodeKind::Text, "text_color")?;
        match n.text.as_mut() {
            Some(style) => style.color = Some(color),
            None => {
                n.text = Some(TextStyle {
                    contents: String::new(),
                    font_size: 12.0,
                    color: Some(color),
                })
            }
        }
        Ok(())
    }

    fn duplicate(&mut self, node: NodeId) -> Result<NodeId> {
        let parent = self.node(node)?.parent;
        let dup = self.copy_subtree(node, parent)?;

        let siblings = match parent {
            None => &mut self.roots,
            Some(p) => &mut self.node_mut(p)?.children,
        };
        let index = siblings.iter().position(|id| *id == node).unwrap_or(0);
        siblings.insert(index, dup);
        Ok(dup)
    }

    fn begin_edit_group(&mut self, name: &str) {
        self.open_group = Some(name.to_string());
    }

    fn end_edit_group(&mut self) {
        if let Some(name) = self.open_group.take() {
            self.history.push(name);
        }
    }

    fn raster_extension(&self) -> &str {
        SCENE_EXTENSION
    }

    fn export_raster(&self, path: &Path) -> Result<()> {
        write_atomic(path, &self.to_json()?)
    }
}

/// Write via a hidden temp file + rename so readers never see a partial file.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| MerchGenError::io(parent, e))?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| MerchGenError::validation(format!("not a file path: {}", path.display())))?;
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));
    std::fs::write(&tmp, bytes).map_err(|e| MerchGenError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| MerchGenError::io(path, e))?;
    Ok(())
}
