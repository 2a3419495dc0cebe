//! Record types flowing through the pipeline, from cleaned source rows to enriched output

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Feedback row after key normalization
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackRecord {
    pub row: usize,
    pub patient_id: String,
    pub treatment_id: String,
    pub review_date: Option<NaiveDate>,
    pub patient_feedback_score: Option<f64>,
}

/// Treatment event after key normalization, one per source row
#[derive(Debug, Clone, PartialEq)]
pub struct PatientTreatmentRecord {
    pub row: usize,
    pub patient_id: String,
    pub treatment_id: String,
    pub doctor_id: Option<String>,
    pub treatment_date: Option<NaiveDate>,
    pub treatment_type: Option<String>,
    pub treatment_cost: Option<f64>,
    pub room_cost: Option<f64>,
}

/// Doctor reference row
#[derive(Debug, Clone, PartialEq)]
pub struct DoctorRecord {
    pub row: usize,
    pub doctor_id: String,
    pub doctor_name: Option<String>,
    pub specialty: Option<String>,
}

/// Output of the join engine, before derived fields are attached
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRecord {
    pub patient_id: String,
    pub feedback_treatment_id: String,
    pub review_date: Option<NaiveDate>,
    pub patient_feedback_score: Option<f64>,
    pub treatment_id: String,
    pub doctor_id: Option<String>,
    pub treatment_date: Option<NaiveDate>,
    pub treatment_type: Option<String>,
    pub treatment_cost: Option<f64>,
    pub room_cost: Option<f64>,
    pub doctor_name: Option<String>,
    pub specialty: Option<String>,
}

/// One row of the warehouse table
///
/// Field order here is the column order of the warehouse file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedRecord {
    pub patient_id: String,
    pub feedback_treatment_id: String,
    pub review_date: Option<NaiveDate>,
    pub patient_feedback_score: Option<f64>,
    pub treatment_id: String,
    pub doctor_id: Option<String>,
    pub treatment_date: Option<NaiveDate>,
    pub treatment_type: Option<String>,
    pub treatment_cost: Option<f64>,
    pub room_cost: Option<f64>,
    pub doctor_name: Option<String>,
    pub specialty: Option<String>,
    pub total_cost: Option<f64>,
}

impl ProcessedRecord {
    pub const COLUMNS: [&'static str; 13] = [
        "patient_id",
        "feedback_treatment_id",
        "review_date",
        "patient_feedback_score",
        "treatment_id",
        "doctor_id",
        "treatment_date",
        "treatment_type",
        "treatment_cost",
        "room_cost",
        "doctor_name",
        "specialty",
        "total_cost",
    ];
}

/// Behavioral summary for one patient
#[derive(Debug, Clone, PartialEq)]
pub struct PatientProfile {
    pub patient_id: String,
    pub avg_satisfaction: Option<f64>,
    /// Null when every joined row for the patient lacks a total_cost
    pub total_spent: Option<f64>,
    pub num_treatments: usize,
    pub last_visit: Option<NaiveDate>,
    /// Days between the run's latest treatment date and this patient's last visit
    pub recency_days: Option<i64>,
}

impl PatientProfile {
    /// Feature vector used for clustering, if every feature is present
    pub fn features(&self) -> Option<[f64; 4]> {
        Some([
            self.avg_satisfaction?,
            self.total_spent?,
            self.num_treatments as f64,
            self.recency_days? as f64,
        ])
    }
}

/// Canonical segment label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CustomerType {
    #[serde(rename = "VIP")]
    Vip,
    #[serde(rename = "Non-VIP")]
    NonVip,
}

impl CustomerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomerType::Vip => "VIP",
            CustomerType::NonVip => "Non-VIP",
        }
    }
}

impl fmt::Display for CustomerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterAssignment {
    pub patient_id: String,
    /// Raw cluster index, arbitrary per run
    pub cluster: usize,
    pub customer_type: CustomerType,
}

/// Warehouse row plus its segment label
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedRecord {
    pub record: ProcessedRecord,
    pub customer_type: Option<CustomerType>,
}

/// Flat view of an [`EnrichedRecord`] used when writing the export file
#[derive(Debug, Serialize)]
pub(crate) struct ExportRow<'a> {
    pub patient_id: &'a str,
    pub feedback_treatment_id: &'a str,
    pub review_date: Option<NaiveDate>,
    pub patient_feedback_score: Option<f64>,
    pub treatment_id: &'a str,
    pub doctor_id: Option<&'a str>,
    pub treatment_date: Option<NaiveDate>,
    pub treatment_type: Option<&'a str>,
    pub treatment_cost: Option<f64>,
    pub room_cost: Option<f64>,
    pub doctor_name: Option<&'a str>,
    pub specialty: Option<&'a str>,
    pub total_cost: Option<f64>,
    pub customer_type: Option<CustomerType>,
}

impl<'a> From<&'a EnrichedRecord> for ExportRow<'a> {
    fn from(enriched: &'a EnrichedRecord) -> Self {
        let r = &enriched.record;
        ExportRow {
            patient_id: &r.patient_id,
            feedback_treatment_id: &r.feedback_treatment_id,
            review_date: r.review_date,
            patient_feedback_score: r.patient_feedback_score,
            treatment_id: &r.treatment_id,
            doctor_id: r.doctor_id.as_deref(),
            treatment_date: r.treatment_date,
            treatment_type: r.treatment_type.as_deref(),
            treatment_cost: r.treatment_cost,
            room_cost: r.room_cost,
            doctor_name: r.doctor_name.as_deref(),
            specialty: r.specialty.as_deref(),
            total_cost: r.total_cost,
            customer_type: enriched.customer_type,
        }
    }
}

impl EnrichedRecord {
    pub const COLUMNS: [&'static str; 14] = [
        "patient_id",
        "feedback_treatment_id",
        "review_date",
        "patient_feedback_score",
        "treatment_id",
        "doctor_id",
        "treatment_date",
        "treatment_type",
        "treatment_cost",
        "room_cost",
        "doctor_name",
        "specialty",
        "total_cost",
        "customer_type",
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_features_require_all_values() {
        let mut profile = PatientProfile {
            patient_id: "P1".to_string(),
            avg_satisfaction: Some(4.0),
            total_spent: Some(1200.0),
            num_treatments: 2,
            last_visit: NaiveDate::from_ymd_opt(2024, 3, 1),
            recency_days: Some(5),
        };
        assert_eq!(profile.features(), Some([4.0, 1200.0, 2.0, 5.0]));

        profile.recency_days = None;
        assert_eq!(profile.features(), None);
    }

    #[test]
    fn test_customer_type_labels() {
        assert_eq!(CustomerType::Vip.to_string(), "VIP");
        assert_eq!(CustomerType::NonVip.as_str(), "Non-VIP");
    }
}
