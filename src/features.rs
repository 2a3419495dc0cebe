//! Patient-level feature aggregation using Polars, and feature standardization

use chrono::{Datelike, NaiveDate};
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;

use crate::error::PipelineError;
use crate::records::{PatientProfile, ProcessedRecord};

/// Feature names, in the column order used for clustering
pub const FEATURE_NAMES: [&str; 4] = [
    "avg_satisfaction",
    "total_spent",
    "num_treatments",
    "recency_days",
];

/// Latest treatment date across the whole run; the reference point for recency
pub fn latest_treatment_date(records: &[ProcessedRecord]) -> Option<NaiveDate> {
    records.iter().filter_map(|r| r.treatment_date).max()
}

/// Roll processed rows up to one profile per patient
///
/// # Arguments
/// * `records` - Warehouse rows for the current run
/// * `reference_date` - Run-wide latest treatment date, see [`latest_treatment_date`]
///
/// # Returns
/// * Profiles sorted by patient id
pub fn aggregate_profiles(
    records: &[ProcessedRecord],
    reference_date: Option<NaiveDate>,
) -> Result<Vec<PatientProfile>, PipelineError> {
    if records.is_empty() {
        return Ok(Vec::new());
    }

    let df = records_to_frame(records)?;

    let agg = df
        .lazy()
        .group_by([col("patient_id")])
        .agg([
            col("patient_feedback_score").mean().alias("avg_satisfaction"),
            col("total_cost").sum().alias("total_spent"),
            col("total_cost").is_not_null().sum().alias("priced_rows"),
            // Distinct reviewed treatments, not rows: the patient-key join repeats them
            col("feedback_treatment_id").n_unique().alias("num_treatments"),
            col("treatment_day").max().alias("last_visit_day"),
        ])
        .collect()?;

    let patient_ids = agg.column("patient_id")?.str()?;
    let avg_satisfaction = agg
        .column("avg_satisfaction")?
        .cast(&DataType::Float64)?;
    let total_spent = agg.column("total_spent")?.cast(&DataType::Float64)?;
    let priced_rows = agg.column("priced_rows")?.cast(&DataType::UInt32)?;
    let num_treatments = agg.column("num_treatments")?.cast(&DataType::UInt32)?;
    let last_visit_day = agg.column("last_visit_day")?.cast(&DataType::Int32)?;

    let mut profiles: Vec<PatientProfile> = patient_ids
        .into_iter()
        .zip(avg_satisfaction.f64()?.into_iter())
        .zip(total_spent.f64()?.into_iter())
        .zip(priced_rows.u32()?.into_iter())
        .zip(num_treatments.u32()?.into_iter())
        .zip(last_visit_day.i32()?.into_iter())
        .filter_map(|(((((id, avg), spent), priced), count), day)| {
            let last_visit = day.and_then(NaiveDate::from_num_days_from_ce_opt);
            // A sum over only null costs is missing, not zero
            let total_spent = if priced.unwrap_or(0) > 0 { spent } else { None };
            Some(PatientProfile {
                patient_id: id?.to_string(),
                avg_satisfaction: avg,
                total_spent,
                num_treatments: count.unwrap_or(0) as usize,
                last_visit,
                recency_days: recency_days(reference_date, last_visit),
            })
        })
        .collect();

    profiles.sort_by(|a, b| a.patient_id.cmp(&b.patient_id));

    tracing::debug!(
        patients = profiles.len(),
        reference_date = ?reference_date,
        "aggregated patient profiles"
    );

    Ok(profiles)
}

/// Days from a patient's last visit to the run reference date
pub fn recency_days(reference_date: Option<NaiveDate>, last_visit: Option<NaiveDate>) -> Option<i64> {
    Some((reference_date? - last_visit?).num_days())
}

fn records_to_frame(records: &[ProcessedRecord]) -> PolarsResult<DataFrame> {
    let patient_ids: Vec<String> = records.iter().map(|r| r.patient_id.clone()).collect();
    let treatment_ids: Vec<String> = records
        .iter()
        .map(|r| r.feedback_treatment_id.clone())
        .collect();
    let scores: Vec<Option<f64>> = records.iter().map(|r| r.patient_feedback_score).collect();
    let costs: Vec<Option<f64>> = records.iter().map(|r| r.total_cost).collect();
    let days: Vec<Option<i32>> = records
        .iter()
        .map(|r| r.treatment_date.map(|d| d.num_days_from_ce()))
        .collect();

    df![
        "patient_id" => patient_ids,
        "feedback_treatment_id" => treatment_ids,
        "patient_feedback_score" => scores,
        "total_cost" => costs,
        "treatment_day" => days,
    ]
}

/// Zero-mean, unit-variance scaling fitted on one run's population
#[derive(Debug, Clone)]
pub struct StandardScaler {
    pub mean: Array1<f64>,
    /// Population standard deviation; 1.0 where a feature is constant
    pub scale: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(data: &Array2<f64>) -> Self {
        let mean = data
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(data.ncols()));
        let scale = data
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > f64::EPSILON { s } else { 1.0 });
        Self { mean, scale }
    }

    pub fn transform(&self, data: &Array2<f64>) -> Array2<f64> {
        (data - &self.mean) / &self.scale
    }
}

/// Clustering input for the profiles that have every feature
#[derive(Debug)]
pub struct FeatureMatrix {
    /// Standardized features (n_patients, 4)
    pub features: Array2<f64>,
    /// Raw feature values before scaling
    pub raw_features: Array2<f64>,
    /// Patient ids, one per row
    pub patient_ids: Vec<String>,
    pub scaler: StandardScaler,
    /// Patients left out because a feature was null
    pub excluded: Vec<String>,
}

impl FeatureMatrix {
    /// Build and standardize the feature matrix, leaving out incomplete profiles
    pub fn from_profiles(profiles: &[PatientProfile]) -> Result<Self, PipelineError> {
        let mut patient_ids = Vec::with_capacity(profiles.len());
        let mut raw_data = Vec::with_capacity(profiles.len() * FEATURE_NAMES.len());
        let mut excluded = Vec::new();

        for profile in profiles {
            match profile.features() {
                Some(values) => {
                    patient_ids.push(profile.patient_id.clone());
                    raw_data.extend_from_slice(&values);
                }
                None => excluded.push(profile.patient_id.clone()),
            }
        }

        let raw_features = Array2::from_shape_vec((patient_ids.len(), FEATURE_NAMES.len()), raw_data)?;
        let scaler = StandardScaler::fit(&raw_features);
        let features = scaler.transform(&raw_features);

        Ok(Self {
            features,
            raw_features,
            patient_ids,
            scaler,
            excluded,
        })
    }

    /// Number of distinct standardized rows
    pub fn distinct_rows(&self) -> usize {
        let mut distinct: Vec<Vec<u64>> = self
            .features
            .outer_iter()
            .map(|row| row.iter().map(|v| v.to_bits()).collect())
            .collect();
        distinct.sort();
        distinct.dedup();
        distinct.len()
    }

    /// Raw `total_spent` column
    pub fn total_spent(&self) -> Array1<f64> {
        self.raw_features.column(1).to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processed_row(
        patient: &str,
        reviewed: &str,
        treatment: &str,
        score: Option<f64>,
        total: Option<f64>,
        date: Option<(i32, u32, u32)>,
    ) -> ProcessedRecord {
        ProcessedRecord {
            patient_id: patient.to_string(),
            feedback_treatment_id: reviewed.to_string(),
            review_date: None,
            patient_feedback_score: score,
            treatment_id: treatment.to_string(),
            doctor_id: None,
            treatment_date: date.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
            treatment_type: None,
            treatment_cost: None,
            room_cost: None,
            doctor_name: None,
            specialty: None,
            total_cost: total,
        }
    }

    #[test]
    fn test_num_treatments_counts_distinct_ids() {
        // Two feedback rows x two treatments for P1 after a patient-key join
        let records = vec![
            processed_row("P1", "T0001", "T0001", Some(4.0), Some(100.0), Some((2024, 1, 1))),
            processed_row("P1", "T0001", "T0002", Some(4.0), Some(200.0), Some((2024, 1, 5))),
            processed_row("P1", "T0002", "T0001", Some(2.0), Some(100.0), Some((2024, 1, 1))),
            processed_row("P1", "T0002", "T0002", Some(2.0), Some(200.0), Some((2024, 1, 5))),
            processed_row("P2", "T0003", "T0003", Some(5.0), Some(50.0), Some((2024, 1, 10))),
        ];

        let reference = latest_treatment_date(&records);
        let profiles = aggregate_profiles(&records, reference).unwrap();

        assert_eq!(profiles.len(), 2);
        let p1 = &profiles[0];
        assert_eq!(p1.patient_id, "P1");
        assert_eq!(p1.num_treatments, 2);
        assert_eq!(p1.total_spent, Some(600.0));
        assert_eq!(p1.avg_satisfaction, Some(3.0));
        assert_eq!(p1.last_visit, NaiveDate::from_ymd_opt(2024, 1, 5));
        assert_eq!(p1.recency_days, Some(5));

        let p2 = &profiles[1];
        assert_eq!(p2.num_treatments, 1);
        assert_eq!(p2.recency_days, Some(0));
    }

    #[test]
    fn test_recency_uses_run_reference_date() {
        let records = vec![
            processed_row("A", "T0001", "T0001", Some(3.0), Some(10.0), Some((2023, 12, 31))),
            processed_row("B", "T0002", "T0002", Some(3.0), Some(10.0), Some((2024, 1, 30))),
        ];

        let reference = latest_treatment_date(&records);
        assert_eq!(reference, NaiveDate::from_ymd_opt(2024, 1, 30));

        let profiles = aggregate_profiles(&records, reference).unwrap();
        assert_eq!(profiles[0].recency_days, Some(30));
        assert_eq!(profiles[1].recency_days, Some(0));
    }

    #[test]
    fn test_null_dates_give_null_recency() {
        let records = vec![
            processed_row("A", "T0001", "T0001", Some(3.0), Some(10.0), None),
            processed_row("B", "T0002", "T0002", None, None, Some((2024, 1, 30))),
        ];

        let profiles = aggregate_profiles(&records, latest_treatment_date(&records)).unwrap();

        assert_eq!(profiles[0].recency_days, None);
        assert_eq!(profiles[0].last_visit, None);
        assert_eq!(profiles[1].avg_satisfaction, None);
        assert_eq!(profiles[1].total_spent, None);
    }

    #[test]
    fn test_num_treatments_follows_reviewed_treatments() {
        // Feedback covers T1 and T2, treatments cover T1, T2 and T9
        let mut records = Vec::new();
        for reviewed in ["T0001", "T0002"] {
            for treated in ["T0001", "T0002", "T0009"] {
                records.push(processed_row("P1", reviewed, treated, Some(4.0), Some(10.0), Some((2024, 1, 1))));
            }
        }

        let profiles = aggregate_profiles(&records, latest_treatment_date(&records)).unwrap();

        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].num_treatments, 2);
        assert_eq!(profiles[0].total_spent, Some(60.0));
    }

    #[test]
    fn test_partly_priced_patient_sums_known_costs() {
        let records = vec![
            processed_row("A", "T0001", "T0001", Some(3.0), Some(10.0), Some((2024, 1, 1))),
            processed_row("A", "T0002", "T0002", Some(3.0), None, Some((2024, 1, 2))),
            processed_row("B", "T0003", "T0003", Some(3.0), None, Some((2024, 1, 3))),
        ];

        let profiles = aggregate_profiles(&records, latest_treatment_date(&records)).unwrap();

        assert_eq!(profiles[0].total_spent, Some(10.0));
        assert_eq!(profiles[1].total_spent, None);
        assert_eq!(profiles[1].features(), None);
    }

    #[test]
    fn test_empty_input() {
        assert!(aggregate_profiles(&[], None).unwrap().is_empty());
    }

    #[test]
    fn test_standard_scaler() {
        let data = Array2::from_shape_vec((3, 2), vec![1.0, 5.0, 2.0, 5.0, 3.0, 5.0]).unwrap();
        let scaler = StandardScaler::fit(&data);
        let scaled = scaler.transform(&data);

        assert!((scaled.column(0).sum()).abs() < 1e-12);
        let var = scaled.column(0).mapv(|v| v * v).sum() / 3.0;
        assert!((var - 1.0).abs() < 1e-12);
        // Constant feature is centered, not divided by zero
        assert!(scaled.column(1).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_feature_matrix_excludes_incomplete_profiles() {
        let profiles = vec![
            PatientProfile {
                patient_id: "A".to_string(),
                avg_satisfaction: Some(4.0),
                total_spent: Some(100.0),
                num_treatments: 1,
                last_visit: None,
                recency_days: Some(3),
            },
            PatientProfile {
                patient_id: "B".to_string(),
                avg_satisfaction: Some(2.0),
                total_spent: Some(900.0),
                num_treatments: 2,
                last_visit: None,
                recency_days: None,
            },
            PatientProfile {
                patient_id: "C".to_string(),
                avg_satisfaction: Some(3.0),
                total_spent: Some(500.0),
                num_treatments: 3,
                last_visit: None,
                recency_days: Some(0),
            },
        ];

        let matrix = FeatureMatrix::from_profiles(&profiles).unwrap();

        assert_eq!(matrix.patient_ids, vec!["A".to_string(), "C".to_string()]);
        assert_eq!(matrix.excluded, vec!["B".to_string()]);
        assert_eq!(matrix.features.shape(), &[2, 4]);
        assert_eq!(matrix.total_spent().to_vec(), vec![100.0, 500.0]);
        assert_eq!(matrix.distinct_rows(), 2);
    }
}
