//! Flat-file persistence for the warehouse table, the enriched export and the quarantine log
//!
//! Every write fully replaces its target file. Parent directories are created on demand.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use crate::error::{PipelineError, RowIssue};
use crate::records::{EnrichedRecord, ExportRow, ProcessedRecord};

const ISSUE_COLUMNS: [&str; 7] = [
    "stage",
    "kind",
    "disposition",
    "source",
    "row",
    "detail",
    "record",
];

fn create_writer(path: &Path, header: &[&str]) -> Result<csv::Writer<BufWriter<File>>, PipelineError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
    }
    let file = File::create(path).map_err(|e| PipelineError::io(path, e))?;

    // Header is written by hand so it exists even for zero rows
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(BufWriter::new(file));
    writer
        .write_record(header)
        .map_err(|e| PipelineError::csv(path, e))?;
    Ok(writer)
}

fn finish(mut writer: csv::Writer<BufWriter<File>>, path: &Path) -> Result<(), PipelineError> {
    writer.flush().map_err(|e| PipelineError::io(path, e))
}

/// Persist the processed record set as the canonical warehouse table
pub fn write_processed(path: &Path, records: &[ProcessedRecord]) -> Result<(), PipelineError> {
    let mut writer = create_writer(path, &ProcessedRecord::COLUMNS)?;
    for record in records {
        writer
            .serialize(record)
            .map_err(|e| PipelineError::csv(path, e))?;
    }
    finish(writer, path)
}

/// Read the warehouse table back
pub fn read_processed(path: &Path) -> Result<Vec<ProcessedRecord>, PipelineError> {
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(file);

    let mut records = Vec::new();
    for result in reader.deserialize() {
        records.push(result.map_err(|e| PipelineError::csv(path, e))?);
    }
    Ok(records)
}

/// Persist the enriched export
pub fn write_enriched(path: &Path, records: &[EnrichedRecord]) -> Result<(), PipelineError> {
    let mut writer = create_writer(path, &EnrichedRecord::COLUMNS)?;
    for record in records {
        writer
            .serialize(ExportRow::from(record))
            .map_err(|e| PipelineError::csv(path, e))?;
    }
    finish(writer, path)
}

/// Persist quarantined and flagged rows for review
pub fn write_issues(path: &Path, issues: &[RowIssue]) -> Result<(), PipelineError> {
    let mut writer = create_writer(path, &ISSUE_COLUMNS)?;
    for issue in issues {
        let row = issue.row.map(|r| r.to_string()).unwrap_or_default();
        writer
            .write_record([
                issue.stage.to_string().as_str(),
                issue.kind.to_string().as_str(),
                format!("{:?}", issue.disposition).as_str(),
                issue.source.as_str(),
                row.as_str(),
                issue.detail.as_str(),
                issue.record.as_str(),
            ])
            .map_err(|e| PipelineError::csv(path, e))?;
    }
    finish(writer, path)
}
