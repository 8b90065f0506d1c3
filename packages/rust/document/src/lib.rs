//! Host document boundary.
//!
//! The editing host (the application that owns the layered artwork) is an
//! external collaborator. This crate defines what merchgen needs from it:
//! - [`Document`]: host-native mutation primitives, one implementation per host
//! - [`SceneDocument`]: an in-memory layer tree persisted as JSON
//! - [`DocumentSession`]: the single writer every mutation goes through

mod scene;
mod session;

use std::path::Path;

use merchgen_shared::Result;
use serde::{Deserialize, Serialize};

pub use scene::{SceneDocument, SceneFile, SceneLayer, TextStyle};
pub use session::{DocumentSession, strip_copy_suffix};

// ---------------------------------------------------------------------------
// Node handles and geometry
// ---------------------------------------------------------------------------

/// Stable handle to a node. Survives content replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a node holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Container of other nodes.
    Group,
    /// Editable text.
    Text,
    /// Placed image whose contents can be swapped.
    Placed,
    /// Vector shape with fill and stroke.
    Shape,
}

/// Axis-aligned bounds in document pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Bounds {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.left + dx, self.top + dy, self.right + dx, self.bottom + dy)
    }

    /// Smallest bounds covering both.
    pub fn union(&self, other: &Bounds) -> Self {
        Self::new(
            self.left.min(other.left),
            self.top.min(other.top),
            self.right.max(other.right),
            self.bottom.max(other.bottom),
        )
    }

    /// Reference point for `anchor`.
    pub fn anchor_point(&self, anchor: Anchor) -> (f64, f64) {
        let cx = (self.left + self.right) / 2.0;
        let cy = (self.top + self.bottom) / 2.0;
        match anchor {
            Anchor::Top => (cx, self.top),
            Anchor::Center => (cx, cy),
            Anchor::Bottom => (cx, self.bottom),
            Anchor::TopLeft => (self.left, self.top),
            Anchor::TopRight => (self.right, self.top),
            Anchor::BottomLeft => (self.left, self.bottom),
            Anchor::BottomRight => (self.right, self.bottom),
        }
    }

    /// Scale by `factor` about the point `(ax, ay)`.
    pub fn scaled_about(&self, factor: f64, ax: f64, ay: f64) -> Self {
        Self::new(
            ax + (self.left - ax) * factor,
            ay + (self.top - ay) * factor,
            ax + (self.right - ax) * factor,
            ay + (self.bottom - ay) * factor,
        )
    }
}

/// Fixed point of a scale operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Anchor {
    #[default]
    Top,
    Center,
    Bottom,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// An sRGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb {
        r: 0xff,
        g: 0xff,
        b: 0xff,
    };

    /// Parse `"rrggbb"` (optional `#`). Missing or invalid pairs read as 0.
    pub fn from_hex(hex: &str) -> Self {
        let h = hex.trim().trim_start_matches('#');
        let pair = |i: usize| {
            h.get(i..i + 2)
                .and_then(|p| u8::from_str_radix(p, 16).ok())
                .unwrap_or(0)
        };
        Self {
            r: pair(0),
            g: pair(2),
            b: pair(4),
        }
    }

    /// Lowercase `"rrggbb"`.
    pub fn to_hex(&self) -> String {
        format!("{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

// ---------------------------------------------------------------------------
// Document trait
// ---------------------------------------------------------------------------

/// Host-native document primitives.
///
/// `parent = None` addresses the document's top level. Every method that
/// takes a [`NodeId`] fails with a document error for unknown nodes or a
/// node of the wrong kind.
pub trait Document: Send {
    /// Document title.
    fn name(&self) -> &str;

    /// Direct children of `parent`, top of the stack first.
    fn children(&self, parent: Option<NodeId>) -> Vec<NodeId>;

    fn node_name(&self, node: NodeId) -> Result<String>;

    fn node_kind(&self, node: NodeId) -> Result<NodeKind>;

    fn rename(&mut self, node: NodeId, name: &str) -> Result<()>;

    /// First direct child of `parent` named exactly `name`.
    fn find_child(&self, parent: Option<NodeId>, name: &str) -> Option<NodeId> {
        self.children(parent)
            .into_iter()
            .find(|id| self.node_name(*id).is_ok_and(|n| n == name))
    }

    fn text(&self, node: NodeId) -> Result<String>;

    fn set_text(&mut self, node: NodeId, contents: &str) -> Result<()>;

    fn font_size(&self, node: NodeId) -> Result<f64>;

    fn set_font_size(&mut self, node: NodeId, size: f64) -> Result<()>;

    /// Bounds without effects (strokes, shadows).
    fn bounds(&self, node: NodeId) -> Result<Bounds>;

    fn translate(&mut self, node: NodeId, dx: f64, dy: f64) -> Result<()>;

    /// Scale by `percent` (100 = unchanged) about `anchor`.
    fn scale(&mut self, node: NodeId, percent: f64, anchor: Anchor) -> Result<()>;

    /// Swap a placed node's contents for `file`. The node keeps its id, its
    /// name, and its position among its siblings.
    fn replace_contents(&mut self, node: NodeId, file: &Path) -> Result<()>;

    fn fill_color(&mut self, node: NodeId, color: Rgb) -> Result<()>;

    fn stroke_color(&mut self, node: NodeId, color: Rgb) -> Result<()>;

    fn text_color(&mut self, node: NodeId, color: Rgb) -> Result<()>;

    /// Duplicate a subtree directly above the source. The host decorates the
    /// copies' names with a " copy" suffix.
    fn duplicate(&mut self, node: NodeId) -> Result<NodeId>;

    /// Group subsequent edits into one undoable step.
    fn begin_edit_group(&mut self, name: &str);

    fn end_edit_group(&mut self);

    /// File extension of [`Document::export_raster`] output, without the dot.
    fn raster_extension(&self) -> &str;

    /// Write the flattened artifact to `path`.
    fn export_raster(&self, path: &Path) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_parsing() {
        assert_eq!(Rgb::from_hex("bd3039"), Rgb { r: 0xbd, g: 0x30, b: 0x39 });
        assert_eq!(Rgb::from_hex("#FFFFFF"), Rgb::WHITE);
        assert_eq!(Rgb::from_hex("ff"), Rgb { r: 0xff, g: 0, b: 0 });
        assert_eq!(Rgb::from_hex("zz00zz"), Rgb { r: 0, g: 0, b: 0 });
        assert_eq!(Rgb::from_hex("0c2340").to_hex(), "0c2340");
    }

    #[test]
    fn bounds_math() {
        let b = Bounds::new(0.0, 0.0, 100.0, 50.0);
        assert_eq!(b.width(), 100.0);
        assert_eq!(b.height(), 50.0);
        assert_eq!(b.translated(10.0, -5.0), Bounds::new(10.0, -5.0, 110.0, 45.0));

        let (ax, ay) = b.anchor_point(Anchor::Top);
        let scaled = b.scaled_about(0.5, ax, ay);
        assert_eq!(scaled, Bounds::new(25.0, 0.0, 75.0, 25.0));

        let u = b.union(&Bounds::new(-10.0, 20.0, 50.0, 80.0));
        assert_eq!(u, Bounds::new(-10.0, 0.0, 100.0, 80.0));
    }
}
