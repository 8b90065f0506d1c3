//! Shared types, error model, and configuration for merchgen.
//!
//! This crate is the foundation depended on by all other merchgen crates.
//! It provides:
//! - [`MerchGenError`]: the unified error type
//! - Domain types ([`EntityRecord`], [`MerchRequest`], [`MatchedEntity`], [`BatchResult`])
//! - Configuration ([`AppConfig`], runtime configs, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, AssetConfig, AssetsSection, BatchSection, DeliveryConfig, ExportSection,
    LayersSection, MatchingSection, SheetsConfig, SourcesSection, config_dir, config_file_path,
    database_path, init_config, load_config, load_config_from,
};
pub use error::{MerchGenError, Result};
pub use types::{
    BatchResult, EntityRecord, LeagueSources, MatchedEntity, MerchRequest, MerchSettings,
    NEUTRAL_GRAY, RunId, normalize_hex_color,
};
