//! Batch orchestration for merchgen.
//!
//! Ties dataset ingestion, entity matching, asset resolution, template
//! customization and delivery into the `generate` workflow.

pub mod matching;
pub mod pipeline;

pub use matching::{MatchOptions, MatchOutcome, match_requests};
pub use pipeline::{
    BatchConfig, BatchDeps, BatchReport, EntityDelivery, EntityOutcome, ExportPlan,
    ProgressReporter, SilentProgress, generate_designs,
};
