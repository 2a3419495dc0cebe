//! Derived fields computed per joined row

use crate::error::{IssueKind, RowIssue, Stage};
use crate::records::{JoinedRecord, ProcessedRecord};

/// `treatment_cost + room_cost`, null when either side is null
pub fn total_cost(treatment_cost: Option<f64>, room_cost: Option<f64>) -> Option<f64> {
    Some(treatment_cost? + room_cost?)
}

/// Attach derived fields, flagging rows where an input was missing
pub fn derive_fields(joined: Vec<JoinedRecord>) -> (Vec<ProcessedRecord>, Vec<RowIssue>) {
    let mut issues = Vec::new();

    let records = joined
        .into_iter()
        .enumerate()
        .map(|(idx, j)| {
            let total = total_cost(j.treatment_cost, j.room_cost);
            if total.is_none() {
                issues.push(RowIssue::flagged(
                    Stage::Derive,
                    IssueKind::MissingValue,
                    "joined",
                    Some(idx + 1),
                    format!(
                        "total_cost is null: treatment_cost={:?} room_cost={:?}",
                        j.treatment_cost, j.room_cost
                    ),
                    format!("patient_id={} treatment_id={}", j.patient_id, j.treatment_id),
                ));
            }

            ProcessedRecord {
                patient_id: j.patient_id,
                feedback_treatment_id: j.feedback_treatment_id,
                review_date: j.review_date,
                patient_feedback_score: j.patient_feedback_score,
                treatment_id: j.treatment_id,
                doctor_id: j.doctor_id,
                treatment_date: j.treatment_date,
                treatment_type: j.treatment_type,
                treatment_cost: j.treatment_cost,
                room_cost: j.room_cost,
                doctor_name: j.doctor_name,
                specialty: j.specialty,
                total_cost: total,
            }
        })
        .collect();

    (records, issues)
}
