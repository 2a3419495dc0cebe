//! Error taxonomy: run-fatal pipeline errors and row-level issues

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::report::RunReport;

/// Errors that abort the whole run
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("I/O failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV failure on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("JSON failure on {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Data frame error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    #[error("Feature matrix error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Clustering failed: {0}")]
    Clustering(String),

    #[error(
        "Insufficient population for 2-way segmentation: {profiles} valid profile(s), {distinct} distinct"
    )]
    InsufficientPopulation { profiles: usize, distinct: usize },
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        PipelineError::Csv {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        PipelineError::Json {
            path: path.into(),
            source,
        }
    }
}

/// Pipeline stage, used to tag issues and fatal failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Extract,
    Normalize,
    Join,
    Derive,
    Warehouse,
    Aggregate,
    Segment,
    Enrich,
    Export,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Extract => "extract",
            Stage::Normalize => "normalize",
            Stage::Join => "join",
            Stage::Derive => "derive",
            Stage::Warehouse => "warehouse",
            Stage::Aggregate => "aggregate",
            Stage::Segment => "segment",
            Stage::Enrich => "enrich",
            Stage::Export => "export",
        };
        f.write_str(name)
    }
}

/// A fatal error together with the stage it happened in and the counts reached so far
#[derive(Error, Debug)]
#[error("{stage} stage failed: {error}")]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub error: PipelineError,
    pub report: RunReport,
}

/// Kinds of row-level problems; none of them abort the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IssueKind {
    MalformedIdentifier,
    JoinIntegrityWarning,
    MissingValue,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IssueKind::MalformedIdentifier => "MalformedIdentifier",
            IssueKind::JoinIntegrityWarning => "JoinIntegrityWarning",
            IssueKind::MissingValue => "MissingValue",
        };
        f.write_str(name)
    }
}

/// What happened to the row that raised an issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Disposition {
    /// Row was removed from further processing
    Quarantined,
    /// Row continues through the pipeline with a warning attached
    Flagged,
}

/// One row-level issue, kept with enough context to find the offending row
#[derive(Debug, Clone, Serialize)]
pub struct RowIssue {
    pub stage: Stage,
    pub kind: IssueKind,
    pub disposition: Disposition,
    /// Source or table the row came from
    pub source: String,
    /// 1-based row number within that source, when one applies
    pub row: Option<usize>,
    pub detail: String,
    /// Offending row rendered as text
    pub record: String,
}

impl RowIssue {
    pub fn quarantined(
        stage: Stage,
        kind: IssueKind,
        source: &str,
        row: Option<usize>,
        detail: impl Into<String>,
        record: impl Into<String>,
    ) -> Self {
        Self {
            stage,
            kind,
            disposition: Disposition::Quarantined,
            source: source.to_string(),
            row,
            detail: detail.into(),
            record: record.into(),
        }
    }

    pub fn flagged(
        stage: Stage,
        kind: IssueKind,
        source: &str,
        row: Option<usize>,
        detail: impl Into<String>,
        record: impl Into<String>,
    ) -> Self {
        Self {
            disposition: Disposition::Flagged,
            ..Self::quarantined(stage, kind, source, row, detail, record)
        }
    }

    /// Emit the issue as a structured warning
    pub fn log(&self) {
        tracing::warn!(
            stage = %self.stage,
            kind = %self.kind,
            disposition = ?self.disposition,
            source = %self.source,
            row = ?self.row,
            record = %self.record,
            "{}",
            self.detail
        );
    }
}

/// Error produced when an identifier cannot be canonicalized
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("{field} is missing")]
    Missing { field: &'static str },

    #[error("{field} {value:?} has no numeric portion")]
    NoDigits { field: &'static str, value: String },

    #[error("{field} {value:?} is not numeric after the prefix")]
    NotNumeric { field: &'static str, value: String },

    #[error("{field} {value:?} exceeds 4 digits")]
    OutOfRange { field: &'static str, value: String },
}
