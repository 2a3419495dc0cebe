//! End-to-end run: extract, normalize, join, derive, load, segment, enrich, export
//!
//! Stages run sequentially over in-memory data. Row-level problems are collected
//! into the [`RunReport`]; the first fatal error stops the run and is returned as a
//! [`StageFailure`] carrying the report reached so far.

use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::derive::derive_fields;
use crate::enrich::merge_labels;
use crate::error::{IssueKind, PipelineError, RowIssue, Stage, StageFailure};
use crate::extract::{
    clean_doctors, clean_feedback, clean_patient_treatments, read_doctors, read_feedback,
    read_patient_treatments,
};
use crate::features::{aggregate_profiles, latest_treatment_date};
use crate::join::{join_sources, JoinKey};
use crate::features::FeatureMatrix;
use crate::model::{segment_matrix, SegmentationConfig};
use crate::records::{CustomerType, ProcessedRecord};
use crate::report::RunReport;
use crate::warehouse::{read_processed, write_enriched, write_issues, write_processed};

/// Silhouette is computed on at most this many patients
const SILHOUETTE_SAMPLE: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub feedback_path: PathBuf,
    pub patients_path: PathBuf,
    pub doctors_path: PathBuf,
    pub warehouse_path: PathBuf,
    pub export_path: PathBuf,
    /// Optional CSV of every quarantined or flagged row
    pub quarantine_path: Option<PathBuf>,
    pub join_key: JoinKey,
    pub segmentation: SegmentationConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            feedback_path: PathBuf::from("raw_data/patient_feedback.json"),
            patients_path: PathBuf::from("raw_data/patients_data_with_doctor.csv"),
            doctors_path: PathBuf::from("raw_data/doctors_info.csv"),
            warehouse_path: PathBuf::from("data_warehouse/processed_patient_feedback.csv"),
            export_path: PathBuf::from("reverse_etl/enriched_patient_feedback.csv"),
            quarantine_path: None,
            join_key: JoinKey::default(),
            segmentation: SegmentationConfig::default(),
        }
    }
}

/// Tags fatal errors with their stage and the partial report
struct Run<'a> {
    report: RunReport,
    quarantine_path: Option<&'a Path>,
}

impl<'a> Run<'a> {
    fn new(config: &'a PipelineConfig) -> Self {
        Self {
            report: RunReport::default(),
            quarantine_path: config.quarantine_path.as_deref(),
        }
    }

    /// Row issues gathered before a fatal error are still written out
    fn stage<T>(&mut self, stage: Stage, result: Result<T, PipelineError>) -> Result<T, StageFailure> {
        result.map_err(|error| {
            if let Some(path) = self.quarantine_path {
                if let Err(e) = write_issues(path, &self.report.issues) {
                    tracing::error!(path = %path.display(), error = %e, "issue log not written");
                }
            }
            self.fail(stage, error)
        })
    }

    fn fail(&mut self, stage: Stage, error: PipelineError) -> StageFailure {
        StageFailure {
            stage,
            error,
            report: std::mem::take(&mut self.report),
        }
    }

    fn write_issue_log(&mut self) -> Result<(), StageFailure> {
        let Some(path) = self.quarantine_path else {
            return Ok(());
        };
        if let Err(error) = write_issues(path, &self.report.issues) {
            return Err(self.fail(Stage::Export, error));
        }
        tracing::info!(
            issues = self.report.issues.len(),
            path = %path.display(),
            "issue log written"
        );
        Ok(())
    }
}

/// Run only the ETL half and persist the warehouse table
pub fn run_etl(config: &PipelineConfig) -> Result<(Vec<ProcessedRecord>, RunReport), StageFailure> {
    let mut run = Run::new(config);
    let processed = etl(config, &mut run)?;
    run.write_issue_log()?;
    Ok((processed, run.report))
}

fn etl(config: &PipelineConfig, run: &mut Run<'_>) -> Result<Vec<ProcessedRecord>, StageFailure> {
    let stage_start = Instant::now();
    let raw_feedback = run.stage(Stage::Extract, read_feedback(&config.feedback_path))?;
    let raw_treatments = run.stage(Stage::Extract, read_patient_treatments(&config.patients_path))?;
    let raw_doctors = run.stage(Stage::Extract, read_doctors(&config.doctors_path))?;
    run.report.feedback_rows = raw_feedback.len();
    run.report.treatment_rows = raw_treatments.len();
    run.report.doctor_rows = raw_doctors.len();
    tracing::info!(
        feedback = raw_feedback.len(),
        patient_treatment = raw_treatments.len(),
        doctor = raw_doctors.len(),
        elapsed_ms = stage_start.elapsed().as_millis() as u64,
        "raw data loaded"
    );

    let feedback = clean_feedback(raw_feedback);
    let treatments = clean_patient_treatments(raw_treatments);
    let doctors = clean_doctors(raw_doctors);
    run.report.extend_issues(feedback.issues);
    run.report.extend_issues(treatments.issues);
    run.report.extend_issues(doctors.issues);
    tracing::info!(
        feedback = feedback.records.len(),
        patient_treatment = treatments.records.len(),
        doctor = doctors.records.len(),
        quarantined = run.report.quarantined(),
        "identifiers normalized"
    );

    let joined = join_sources(
        &feedback.records,
        &treatments.records,
        &doctors.records,
        config.join_key,
    );
    run.report.joined_rows = joined.matched_rows;
    run.report.extend_issues(joined.issues);
    tracing::info!(
        join_key = %config.join_key,
        rows = joined.records.len(),
        unmatched_feedback = joined.unmatched_feedback,
        orphan_doctor_rows = joined.orphan_doctor_rows,
        "sources joined"
    );

    let (processed, derive_issues) = derive_fields(joined.records);
    run.report.processed_rows = processed.len();
    run.report.extend_issues(derive_issues);

    run.stage(
        Stage::Warehouse,
        write_processed(&config.warehouse_path, &processed),
    )?;
    tracing::info!(
        rows = processed.len(),
        path = %config.warehouse_path.display(),
        "warehouse table written"
    );

    Ok(processed)
}

/// Run the whole pipeline, including the segmentation and export half
pub fn run_pipeline(config: &PipelineConfig) -> Result<RunReport, StageFailure> {
    let mut run = Run::new(config);

    etl(config, &mut run)?;

    // Segmentation reads the persisted warehouse table, not the in-memory rows
    let processed = run.stage(Stage::Warehouse, read_processed(&config.warehouse_path))?;

    let reference_date = latest_treatment_date(&processed);
    let profiles = run.stage(
        Stage::Aggregate,
        aggregate_profiles(&processed, reference_date),
    )?;
    run.report.profiles = profiles.len();
    tracing::info!(
        patients = profiles.len(),
        reference_date = ?reference_date,
        "patient profiles aggregated"
    );

    let matrix = run.stage(Stage::Segment, FeatureMatrix::from_profiles(&profiles))?;

    // Recorded before the population check so a failed run still names them
    let excluded: Vec<RowIssue> = matrix
        .excluded
        .iter()
        .map(|patient_id| {
            RowIssue::flagged(
                Stage::Segment,
                IssueKind::MissingValue,
                "patient_profile",
                None,
                "profile has null avg_satisfaction, total_spent or recency_days; left unlabeled",
                format!("patient_id={}", patient_id),
            )
        })
        .collect();
    run.report.excluded_profiles = excluded.len();
    run.report.extend_issues(excluded);

    let segmentation = run.stage(
        Stage::Segment,
        segment_matrix(matrix, &config.segmentation),
    )?;

    let silhouette = segmentation
        .model
        .compute_silhouette_sample(&segmentation.matrix.features, SILHOUETTE_SAMPLE);
    run.report.segmented_profiles = segmentation.assignments.len();
    run.report.vip_patients = segmentation.count(CustomerType::Vip);
    run.report.non_vip_patients = segmentation.count(CustomerType::NonVip);
    run.report.inertia = Some(segmentation.model.inertia);
    run.report.silhouette = Some(silhouette);

    let sizes = segmentation.model.cluster_sizes();
    tracing::info!(
        vip = run.report.vip_patients,
        non_vip = run.report.non_vip_patients,
        vip_cluster = segmentation.model.vip_cluster,
        cluster_sizes = ?sizes,
        mean_spend = ?segmentation.model.mean_spend,
        inertia = segmentation.model.inertia,
        silhouette,
        "patients segmented"
    );

    let enriched = merge_labels(processed, &segmentation.assignments);
    run.report.enriched_rows = enriched.len();
    run.report.unlabeled_rows = enriched.iter().filter(|e| e.customer_type.is_none()).count();
    tracing::info!(
        rows = enriched.len(),
        unlabeled = run.report.unlabeled_rows,
        "labels merged back"
    );

    run.stage(Stage::Export, write_enriched(&config.export_path, &enriched))?;
    tracing::info!(
        rows = enriched.len(),
        path = %config.export_path.display(),
        "enriched export written"
    );

    run.write_issue_log()?;

    Ok(run.report)
}
