//! Source readers and per-row cleaning
//!
//! Readers only fail on unreadable or structurally broken files. Individual rows
//! that cannot be keyed are quarantined into the returned issue list instead.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use serde_json::Value;
use std::fs::File;
use std::path::Path;

use crate::error::{IssueKind, PipelineError, RowIssue, Stage};
use crate::keys::{normalize_doctor_id, normalize_patient_id, normalize_treatment_id};
use crate::records::{DoctorRecord, FeedbackRecord, PatientTreatmentRecord};

pub const FEEDBACK_SOURCE: &str = "feedback";
pub const TREATMENT_SOURCE: &str = "patient_treatment";
pub const DOCTOR_SOURCE: &str = "doctor";

/// Feedback entry as found in the JSON source
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawFeedback {
    pub patient_id: Value,
    pub treatment_id: Value,
    pub review_date: Value,
    pub patient_feedback_score: Value,
}

/// Treatment row as found in the CSV source
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawPatientTreatment {
    pub patient_id: Option<String>,
    pub treatment_id: Option<String>,
    pub doctor_id: Option<String>,
    pub treatment_date: Option<String>,
    pub treatment_type: Option<String>,
    pub treatment_cost: Option<String>,
    pub room_cost: Option<String>,
}

/// Doctor row as found in the CSV source
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawDoctor {
    pub doctor_id: Option<String>,
    pub doctor_name: Option<String>,
    pub specialty: Option<String>,
}

/// Cleaned rows from one source plus the issues raised while cleaning them
#[derive(Debug, Clone)]
pub struct Cleaned<T> {
    pub records: Vec<T>,
    pub issues: Vec<RowIssue>,
}

/// Read the feedback JSON array
pub fn read_feedback(path: &Path) -> Result<Vec<RawFeedback>, PipelineError> {
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    serde_json::from_reader(std::io::BufReader::new(file)).map_err(|e| PipelineError::json(path, e))
}

/// Read the patient/treatment CSV
pub fn read_patient_treatments(path: &Path) -> Result<Vec<RawPatientTreatment>, PipelineError> {
    read_csv(path)
}

/// Read the doctor reference CSV
pub fn read_doctors(path: &Path) -> Result<Vec<RawDoctor>, PipelineError> {
    read_csv(path)
}

fn read_csv<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>, PipelineError> {
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(file);

    let mut rows = Vec::new();
    for result in reader.deserialize() {
        rows.push(result.map_err(|e| PipelineError::csv(path, e))?);
    }
    Ok(rows)
}

/// Normalize feedback keys, quarantining rows whose ids cannot be parsed
pub fn clean_feedback(raw: Vec<RawFeedback>) -> Cleaned<FeedbackRecord> {
    let mut records = Vec::with_capacity(raw.len());
    let mut issues = Vec::new();

    for (idx, row) in raw.into_iter().enumerate() {
        let row_no = idx + 1;
        let patient_id = value_to_string(&row.patient_id);
        let treatment_id = value_to_string(&row.treatment_id);

        let keys = normalize_patient_id(patient_id.as_deref()).and_then(|p| {
            normalize_treatment_id(treatment_id.as_deref()).map(|t| (p, t))
        });

        match keys {
            Ok((patient_id, treatment_id)) => records.push(FeedbackRecord {
                row: row_no,
                patient_id,
                treatment_id,
                review_date: value_to_string(&row.review_date)
                    .as_deref()
                    .and_then(parse_date),
                patient_feedback_score: value_to_number(&row.patient_feedback_score),
            }),
            Err(e) => issues.push(RowIssue::quarantined(
                Stage::Normalize,
                IssueKind::MalformedIdentifier,
                FEEDBACK_SOURCE,
                Some(row_no),
                e.to_string(),
                format!("{:?}", row),
            )),
        }
    }

    Cleaned { records, issues }
}

/// Normalize treatment rows; unparseable dates and costs become null
pub fn clean_patient_treatments(raw: Vec<RawPatientTreatment>) -> Cleaned<PatientTreatmentRecord> {
    let mut records = Vec::with_capacity(raw.len());
    let mut issues = Vec::new();

    for (idx, row) in raw.into_iter().enumerate() {
        let row_no = idx + 1;
        let keys = normalize_patient_id(row.patient_id.as_deref()).and_then(|p| {
            normalize_treatment_id(row.treatment_id.as_deref()).map(|t| (p, t))
        });

        let (patient_id, treatment_id) = match keys {
            Ok(keys) => keys,
            Err(e) => {
                issues.push(RowIssue::quarantined(
                    Stage::Normalize,
                    IssueKind::MalformedIdentifier,
                    TREATMENT_SOURCE,
                    Some(row_no),
                    e.to_string(),
                    format!("{:?}", row),
                ));
                continue;
            }
        };

        let treatment_date = row.treatment_date.as_deref().and_then(parse_date);
        if treatment_date.is_none() {
            issues.push(RowIssue::flagged(
                Stage::Normalize,
                IssueKind::MissingValue,
                TREATMENT_SOURCE,
                Some(row_no),
                "treatment_date is missing or unparseable",
                format!("{:?}", row),
            ));
        }

        records.push(PatientTreatmentRecord {
            row: row_no,
            patient_id,
            treatment_id,
            doctor_id: normalize_doctor_id(row.doctor_id.as_deref()),
            treatment_date,
            treatment_type: non_blank(row.treatment_type),
            treatment_cost: row.treatment_cost.as_deref().and_then(parse_number),
            room_cost: row.room_cost.as_deref().and_then(parse_number),
        });
    }

    Cleaned { records, issues }
}

/// Clean doctor rows; rows without a doctor id cannot be joined and are quarantined
pub fn clean_doctors(raw: Vec<RawDoctor>) -> Cleaned<DoctorRecord> {
    let mut records = Vec::with_capacity(raw.len());
    let mut issues = Vec::new();

    for (idx, row) in raw.into_iter().enumerate() {
        let row_no = idx + 1;
        match normalize_doctor_id(row.doctor_id.as_deref()) {
            Some(doctor_id) => records.push(DoctorRecord {
                row: row_no,
                doctor_id,
                doctor_name: non_blank(row.doctor_name),
                specialty: non_blank(row.specialty),
            }),
            None => issues.push(RowIssue::quarantined(
                Stage::Normalize,
                IssueKind::MalformedIdentifier,
                DOCTOR_SOURCE,
                Some(row_no),
                "doctor_id is missing",
                format!("{:?}", row),
            )),
        }
    }

    Cleaned { records, issues }
}

/// Parse the date forms seen in the sources; anything else is null
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|dt| dt.date())
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Render a JSON scalar as text; integral numbers lose their fractional part
fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else {
                n.as_f64().map(|f| {
                    if f.fract() == 0.0 {
                        format!("{}", f as i64)
                    } else {
                        f.to_string()
                    }
                })
            }
        }
        _ => None,
    }
}

fn value_to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}
