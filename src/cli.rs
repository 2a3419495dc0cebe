//! Command-line interface definitions and argument parsing

use clap::Parser;
use std::path::PathBuf;

use crate::join::JoinKey;
use crate::model::SegmentationConfig;
use crate::pipeline::PipelineConfig;

/// Merge patient, treatment, doctor and feedback records, then segment patients into VIP / Non-VIP
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Patient feedback JSON source
    #[arg(long, default_value = "raw_data/patient_feedback.json")]
    pub feedback: PathBuf,

    /// Patient/treatment CSV source
    #[arg(long, default_value = "raw_data/patients_data_with_doctor.csv")]
    pub patients: PathBuf,

    /// Doctor reference CSV source
    #[arg(long, default_value = "raw_data/doctors_info.csv")]
    pub doctors: PathBuf,

    /// Output path for the processed warehouse table
    #[arg(short, long, default_value = "data_warehouse/processed_patient_feedback.csv")]
    pub warehouse: PathBuf,

    /// Output path for the enriched export
    #[arg(short, long, default_value = "reverse_etl/enriched_patient_feedback.csv")]
    pub export: PathBuf,

    /// Write quarantined and flagged rows to this CSV
    #[arg(short, long)]
    pub quarantine: Option<PathBuf>,

    /// Feedback/treatment join key: "patient" (patient_id only) or "composite" (patient_id + treatment_id)
    #[arg(long, default_value = "patient")]
    pub join_key: JoinKey,

    /// Stop after writing the warehouse table
    #[arg(long)]
    pub etl_only: bool,

    /// Random seed for K-Means initialization
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Number of K-Means restarts
    #[arg(long, default_value = "10")]
    pub n_runs: usize,

    /// Maximum iterations for K-Means algorithm
    #[arg(long, default_value = "300")]
    pub max_iters: u64,

    /// Tolerance for K-Means convergence
    #[arg(long, default_value = "1e-4")]
    pub tolerance: f64,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

impl Args {
    /// Validate arguments and build the pipeline configuration
    pub fn to_config(&self) -> crate::Result<PipelineConfig> {
        if self.n_runs == 0 {
            anyhow::bail!("--n-runs must be at least 1");
        }
        if self.max_iters == 0 {
            anyhow::bail!("--max-iters must be at least 1");
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            anyhow::bail!("--tolerance must be a positive number, got {}", self.tolerance);
        }

        Ok(PipelineConfig {
            feedback_path: self.feedback.clone(),
            patients_path: self.patients.clone(),
            doctors_path: self.doctors.clone(),
            warehouse_path: self.warehouse.clone(),
            export_path: self.export.clone(),
            quarantine_path: self.quarantine.clone(),
            join_key: self.join_key,
            segmentation: SegmentationConfig {
                seed: self.seed,
                n_runs: self.n_runs,
                max_iters: self.max_iters,
                tolerance: self.tolerance,
            },
        })
    }
}
