//! Design template registry.
//!
//! A template is a customization routine applied to the document after the
//! baseline edits for each entity. Templates are looked up by a validated
//! identifier in a registry populated once at startup.

mod designs;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use merchgen_document::{DocumentSession, NodeId};
use merchgen_shared::{MatchedEntity, MerchGenError, Result};

pub use designs::{ColorBlock, DivisionPreview};

/// Allowed identifier shape.
static TEMPLATE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("template id regex"));

// ---------------------------------------------------------------------------
// TemplateId
// ---------------------------------------------------------------------------

/// A template identifier known to be made of letters, digits, `-` and `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TemplateId(String);

impl TemplateId {
    /// Validate `raw`. Surrounding whitespace, path separators, `..` and any
    /// other character outside `[A-Za-z0-9_-]` are rejected.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw != raw.trim() || !TEMPLATE_ID.is_match(raw) {
            return Err(MerchGenError::validation(format!(
                "invalid template id {raw:?}"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TemplateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for TemplateId {
    type Err = MerchGenError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TemplateId {
    type Error = MerchGenError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<TemplateId> for String {
    fn from(id: TemplateId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// DesignContext
// ---------------------------------------------------------------------------

/// Per-entity attributes handed to a template. Built fresh for every entity.
#[derive(Debug, Clone)]
pub struct DesignContext {
    pub base_folder: PathBuf,
    pub league: String,
    pub abbreviation: String,
    pub city: String,
    pub name: String,
    pub full_name: String,
    pub classification: String,
    pub division: String,
    /// Primary color, 6-digit lowercase hex.
    pub color: String,
    /// The logo node.
    pub logo: NodeId,
    /// The team name text node.
    pub team_name: NodeId,
}

impl DesignContext {
    pub fn new(
        entity: &MatchedEntity,
        league: &str,
        base_folder: PathBuf,
        logo: NodeId,
        team_name: NodeId,
    ) -> Self {
        let record = &entity.record;
        Self {
            base_folder,
            league: league.to_string(),
            abbreviation: record.abbreviation.clone(),
            city: record.city.clone(),
            name: record.name.clone(),
            full_name: record.full_name.clone(),
            classification: record.classification.clone(),
            division: record.division.clone(),
            color: entity.color().to_string(),
            logo,
            team_name,
        }
    }

    /// Look up a top-level node the template needs, failing if absent.
    pub async fn require(&self, session: &DocumentSession, name: &str) -> Result<NodeId> {
        session
            .find_child(None, name)
            .await?
            .ok_or_else(|| MerchGenError::Template(format!("document has no {name:?} layer")))
    }
}

// ---------------------------------------------------------------------------
// DesignTemplate
// ---------------------------------------------------------------------------

/// A per-design customization routine.
///
/// Routines mutate the document through the session (including its
/// capability operations) and report nothing beyond success or failure.
#[async_trait]
pub trait DesignTemplate: Send + Sync {
    /// Identifier the routine is registered under.
    fn id(&self) -> &str;

    async fn customize(&self, session: &DocumentSession, ctx: &DesignContext) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Maps template identifiers to routines. Contents are fixed at construction.
pub struct TemplateRegistry {
    templates: HashMap<TemplateId, Box<dyn DesignTemplate>>,
}

impl TemplateRegistry {
    /// Registry of every built-in design.
    pub fn builtin() -> Self {
        Self::from_templates(vec![Box::new(DivisionPreview), Box::new(ColorBlock)])
    }

    /// Build from an explicit list. Routines whose id does not validate are
    /// dropped; a later duplicate replaces an earlier one.
    pub fn from_templates(list: Vec<Box<dyn DesignTemplate>>) -> Self {
        let mut templates = HashMap::with_capacity(list.len());
        for template in list {
            match TemplateId::parse(template.id()) {
                Ok(id) => {
                    templates.insert(id, template);
                }
                Err(e) => warn!(error = %e, "template not registered"),
            }
        }
        Self { templates }
    }

    /// Look up a routine. Invalid or unmapped identifiers yield `None` with a
    /// warning; the caller proceeds without customization.
    pub fn load(&self, raw_id: &str) -> Option<&dyn DesignTemplate> {
        let id = match TemplateId::parse(raw_id) {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "template unavailable");
                return None;
            }
        };
        match self.templates.get(&id) {
            Some(template) => {
                debug!(template = %id, "template loaded");
                Some(template.as_ref())
            }
            None => {
                warn!(template = %id, "no template registered under this id");
                None
            }
        }
    }

    /// Registered identifiers, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.templates.keys().map(TemplateId::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
