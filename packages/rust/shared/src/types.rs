//! Core domain types for merchgen batch runs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fallback for missing or unparseable colors.
pub const NEUTRAL_GRAY: &str = "4a4a4a";

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for batch run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Dataset records
// ---------------------------------------------------------------------------

/// One entity from the roster dataset. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Short identifier ("BOS").
    pub abbreviation: String,
    pub city: String,
    pub name: String,
    /// Either the dataset's explicit full name or `"{city} {name}"`.
    pub full_name: String,
    /// Conference or tier.
    pub classification: String,
    pub division: String,
    /// Normalized 6-digit lowercase hex, no `#`.
    pub colors: [String; 3],
}

impl EntityRecord {
    /// Primary color, falling back to [`NEUTRAL_GRAY`].
    pub fn primary_color(&self) -> &str {
        if self.colors[0].is_empty() {
            NEUTRAL_GRAY
        } else {
            &self.colors[0]
        }
    }
}

/// A row of the request dataset: a possibly-partial entity identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerchRequest {
    pub abbreviation: String,
    pub city: String,
    pub name: String,
}

impl MerchRequest {
    /// `"{city} {name}"`, trimmed so a missing city still yields a usable name.
    ///
    /// A request with an empty city therefore matches a roster record whose
    /// full name is the bare team name.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.city, self.name).trim().to_string()
    }
}

/// A request paired with exactly one roster entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedEntity {
    pub request: MerchRequest,
    pub record: EntityRecord,
}

impl MatchedEntity {
    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn full_name(&self) -> &str {
        &self.record.full_name
    }

    pub fn classification(&self) -> &str {
        &self.record.classification
    }

    pub fn division(&self) -> &str {
        &self.record.division
    }

    pub fn color(&self) -> &str {
        self.record.primary_color()
    }
}

/// Per-league merch settings read from fixed cells of the settings dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerchSettings {
    /// Template identifier (cell G3).
    pub design_id: String,
    /// Secondary product identifier (cell H3).
    pub product_id: String,
}

/// Dataset URLs for one league, as listed in the master registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeagueSources {
    /// Roster dataset (`TEAM INFO`).
    pub roster_url: String,
    /// Request dataset (`MERCH TEAMS`, defaults to the roster URL).
    pub requests_url: String,
    /// Settings dataset (`MERCH SETTINGS`), optional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings_url: Option<String>,
}

// ---------------------------------------------------------------------------
// BatchResult
// ---------------------------------------------------------------------------

/// Aggregate counters for one batch run, surfaced once at completion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub run_id: RunId,
    pub design_id: String,
    pub product_id: String,
    /// Entities that went through every step.
    pub processed: usize,
    /// Requests with no roster entity.
    pub missing: usize,
    /// Entities skipped because the document lacks a required node.
    pub skipped: usize,
    /// Entities abandoned because their template routine failed.
    pub failed: usize,
    /// Entities whose logo could not be resolved by any tier.
    pub assets_unresolved: usize,
    pub exported: usize,
    pub export_failed: usize,
    pub uploaded: usize,
    pub upload_failed: usize,
    /// Either dataset came back empty; nothing was attempted.
    pub no_data: bool,
    pub elapsed_ms: u64,
}

impl BatchResult {
    /// One-line summary for the status area.
    pub fn status_message(&self) -> String {
        if self.no_data {
            return "No merch/team data found.".to_string();
        }
        let mut msg = format!("Generated {} designs", self.processed);
        if self.missing > 0 {
            msg.push_str(&format!(" ({} unmatched)", self.missing));
        }
        msg.push('.');
        msg
    }
}

// ---------------------------------------------------------------------------
// Colors
// ---------------------------------------------------------------------------

/// Normalize a dataset color cell to 6 lowercase hex digits without `#`.
///
/// Three-digit shorthand is expanded. Anything else becomes [`NEUTRAL_GRAY`].
pub fn normalize_hex_color(raw: &str) -> String {
    let cleaned = raw.trim().trim_start_matches('#').trim().to_ascii_lowercase();
    if !cleaned.chars().all(|c| c.is_ascii_hexdigit()) {
        return NEUTRAL_GRAY.to_string();
    }
    match cleaned.len() {
        6 => cleaned,
        3 => cleaned.chars().flat_map(|c| [c, c]).collect(),
        _ => NEUTRAL_GRAY.to_string(),
    }
}
