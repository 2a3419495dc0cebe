//! CareForge: patient ETL merge pipeline with K-Means customer segmentation
//!
//! Feedback, treatment and doctor sources are normalized, joined into one
//! denormalized warehouse table, rolled up into per-patient behavioral profiles
//! and split into VIP / Non-VIP cohorts by 2-cluster K-Means. The labels are
//! merged back onto every warehouse row for export.

pub mod cli;
pub mod derive;
pub mod enrich;
pub mod error;
pub mod extract;
pub mod features;
pub mod join;
pub mod keys;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod records;
pub mod report;
pub mod warehouse;

// Re-export public items for easier access
pub use cli::Args;
pub use error::{IssueKind, PipelineError, RowIssue, Stage, StageFailure};
pub use features::{aggregate_profiles, latest_treatment_date, FeatureMatrix, StandardScaler};
pub use join::{join_sources, JoinKey};
pub use model::{segment_matrix, segment_profiles, Segmentation, SegmentationConfig};
pub use pipeline::{run_etl, run_pipeline, PipelineConfig};
pub use records::{
    ClusterAssignment, CustomerType, EnrichedRecord, PatientProfile, ProcessedRecord,
};
pub use report::RunReport;

/// Common result type used at the CLI edge
pub type Result<T> = anyhow::Result<T>;
