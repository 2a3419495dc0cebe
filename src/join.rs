//! Join engine: feedback ⋈ treatments (inner), then ⋈ doctors (left)

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::error::{IssueKind, RowIssue, Stage};
use crate::extract::{DOCTOR_SOURCE, FEEDBACK_SOURCE, TREATMENT_SOURCE};
use crate::records::{DoctorRecord, FeedbackRecord, JoinedRecord, PatientTreatmentRecord};

/// Key used to match feedback rows with treatment rows
///
/// `PatientId` multiplies every feedback row of a patient with every treatment
/// row of that patient. `PatientAndTreatment` only pairs rows about the same
/// treatment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinKey {
    #[default]
    PatientId,
    PatientAndTreatment,
}

impl fmt::Display for JoinKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinKey::PatientId => f.write_str("patient"),
            JoinKey::PatientAndTreatment => f.write_str("composite"),
        }
    }
}

impl FromStr for JoinKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "patient" | "patient_id" => Ok(JoinKey::PatientId),
            "composite" | "patient_treatment" => Ok(JoinKey::PatientAndTreatment),
            other => Err(format!(
                "unknown join key '{}', expected 'patient' or 'composite'",
                other
            )),
        }
    }
}

impl JoinKey {
    fn key_of<'a>(&self, patient_id: &'a str, treatment_id: &'a str) -> (&'a str, Option<&'a str>) {
        match self {
            JoinKey::PatientId => (patient_id, None),
            JoinKey::PatientAndTreatment => (patient_id, Some(treatment_id)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct JoinOutcome {
    pub records: Vec<JoinedRecord>,
    pub issues: Vec<RowIssue>,
    /// Row count after the feedback ⋈ treatment step
    pub matched_rows: usize,
    /// Feedback rows dropped by the inner join
    pub unmatched_feedback: usize,
    /// Joined rows kept without doctor details
    pub orphan_doctor_rows: usize,
}

/// Run both joins in order
pub fn join_sources(
    feedback: &[FeedbackRecord],
    treatments: &[PatientTreatmentRecord],
    doctors: &[DoctorRecord],
    key: JoinKey,
) -> JoinOutcome {
    let mut outcome = JoinOutcome::default();

    let mut treatment_index: HashMap<(&str, Option<&str>), Vec<&PatientTreatmentRecord>> =
        HashMap::new();
    for t in treatments {
        treatment_index
            .entry(key.key_of(&t.patient_id, &t.treatment_id))
            .or_default()
            .push(t);
    }

    let doctor_index = index_doctors(doctors, &mut outcome.issues);

    let mut feedback_per_key: HashMap<(&str, Option<&str>), usize> = HashMap::new();
    for f in feedback {
        *feedback_per_key
            .entry(key.key_of(&f.patient_id, &f.treatment_id))
            .or_default() += 1;
    }
    report_fan_out(&feedback_per_key, &treatment_index, &mut outcome.issues);

    // Treatment rows already warned about, so fan-out does not repeat the warning
    let mut orphans_flagged: HashSet<usize> = HashSet::new();

    for f in feedback {
        let Some(matches) = treatment_index.get(&key.key_of(&f.patient_id, &f.treatment_id))
        else {
            outcome.unmatched_feedback += 1;
            outcome.issues.push(RowIssue::flagged(
                Stage::Join,
                IssueKind::JoinIntegrityWarning,
                FEEDBACK_SOURCE,
                Some(f.row),
                format!("no treatment rows match key ({})", key),
                format!("{:?}", f),
            ));
            continue;
        };

        for t in matches {
            outcome.matched_rows += 1;
            let doctor = t
                .doctor_id
                .as_deref()
                .and_then(|id| doctor_index.get(id).copied());

            if doctor.is_none() {
                outcome.orphan_doctor_rows += 1;
            }
            if doctor.is_none() && orphans_flagged.insert(t.row) {
                outcome.issues.push(RowIssue::flagged(
                    Stage::Join,
                    IssueKind::JoinIntegrityWarning,
                    TREATMENT_SOURCE,
                    Some(t.row),
                    format!("doctor_id {:?} has no doctor record", t.doctor_id),
                    format!("{:?}", t),
                ));
            }

            outcome.records.push(JoinedRecord {
                patient_id: f.patient_id.clone(),
                feedback_treatment_id: f.treatment_id.clone(),
                review_date: f.review_date,
                patient_feedback_score: f.patient_feedback_score,
                treatment_id: t.treatment_id.clone(),
                doctor_id: t.doctor_id.clone(),
                treatment_date: t.treatment_date,
                treatment_type: t.treatment_type.clone(),
                treatment_cost: t.treatment_cost,
                room_cost: t.room_cost,
                doctor_name: doctor.and_then(|d| d.doctor_name.clone()),
                specialty: doctor.and_then(|d| d.specialty.clone()),
            });
        }
    }

    tracing::debug!(
        key = %key,
        matched = outcome.matched_rows,
        unmatched_feedback = outcome.unmatched_feedback,
        orphan_doctor_rows = outcome.orphan_doctor_rows,
        "join complete"
    );

    outcome
}

/// First record per doctor id wins so the left join cannot add rows
fn index_doctors<'a>(
    doctors: &'a [DoctorRecord],
    issues: &mut Vec<RowIssue>,
) -> HashMap<&'a str, &'a DoctorRecord> {
    let mut index: HashMap<&str, &DoctorRecord> = HashMap::with_capacity(doctors.len());
    for d in doctors {
        if let Some(first) = index.get(d.doctor_id.as_str()) {
            issues.push(RowIssue::flagged(
                Stage::Join,
                IssueKind::JoinIntegrityWarning,
                DOCTOR_SOURCE,
                Some(d.row),
                format!(
                    "duplicate doctor_id {}; keeping row {}",
                    d.doctor_id, first.row
                ),
                format!("{:?}", d),
            ));
        } else {
            index.insert(d.doctor_id.as_str(), d);
        }
    }
    index
}

fn report_fan_out(
    feedback_per_key: &HashMap<(&str, Option<&str>), usize>,
    treatment_index: &HashMap<(&str, Option<&str>), Vec<&PatientTreatmentRecord>>,
    issues: &mut Vec<RowIssue>,
) {
    let mut fanned: Vec<_> = feedback_per_key
        .iter()
        .filter_map(|(key, &n_feedback)| {
            let n_treatments = treatment_index.get(key).map_or(0, Vec::len);
            (n_feedback > 1 && n_treatments > 1).then_some((*key, n_feedback, n_treatments))
        })
        .collect();
    fanned.sort();

    for ((patient_id, treatment_id), n_feedback, n_treatments) in fanned {
        issues.push(RowIssue::flagged(
            Stage::Join,
            IssueKind::JoinIntegrityWarning,
            FEEDBACK_SOURCE,
            None,
            format!(
                "fan-out: {} feedback x {} treatment rows = {} joined rows",
                n_feedback,
                n_treatments,
                n_feedback * n_treatments
            ),
            match treatment_id {
                Some(t) => format!("patient_id={} treatment_id={}", patient_id, t),
                None => format!("patient_id={}", patient_id),
            },
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feedback(row: usize, patient: &str, treatment: &str) -> FeedbackRecord {
        FeedbackRecord {
            row,
            patient_id: patient.to_string(),
            treatment_id: treatment.to_string(),
            review_date: None,
            patient_feedback_score: Some(4.0),
        }
    }

    fn treatment(row: usize, patient: &str, treatment: &str, doctor: Option<&str>) -> PatientTreatmentRecord {
        PatientTreatmentRecord {
            row,
            patient_id: patient.to_string(),
            treatment_id: treatment.to_string(),
            doctor_id: doctor.map(str::to_string),
            treatment_date: None,
            treatment_type: Some("Checkup".to_string()),
            treatment_cost: Some(100.0),
            room_cost: Some(10.0),
        }
    }

    fn doctor(row: usize, id: &str, name: &str) -> DoctorRecord {
        DoctorRecord {
            row,
            doctor_id: id.to_string(),
            doctor_name: Some(name.to_string()),
            specialty: Some("Cardiology".to_string()),
        }
    }

    #[test]
    fn test_fan_out_law_on_patient_key() {
        let fb = vec![
            feedback(1, "P1", "T0001"),
            feedback(2, "P1", "T0002"),
            feedback(3, "P2", "T0003"),
        ];
        let tr = vec![
            treatment(1, "P1", "T0001", Some("D1")),
            treatment(2, "P1", "T0002", Some("D1")),
            treatment(3, "P1", "T0009", Some("D1")),
            treatment(4, "P2", "T0003", Some("D1")),
        ];
        let docs = vec![doctor(1, "D1", "Dr. A")];

        let out = join_sources(&fb, &tr, &docs, JoinKey::PatientId);

        let p1_rows = out.records.iter().filter(|r| r.patient_id == "P1").count();
        assert_eq!(p1_rows, 2 * 3);
        assert_eq!(out.records.len(), 7);
        assert_eq!(out.matched_rows, 7);
        assert!(out
            .issues
            .iter()
            .any(|i| i.detail.starts_with("fan-out: 2 feedback x 3 treatment")));
    }

    #[test]
    fn test_composite_key_pairs_same_treatment_only() {
        let fb = vec![feedback(1, "P1", "T0001"), feedback(2, "P1", "T0002")];
        let tr = vec![
            treatment(1, "P1", "T0001", Some("D1")),
            treatment(2, "P1", "T0002", Some("D1")),
            treatment(3, "P1", "T0009", Some("D1")),
        ];

        let out = join_sources(&fb, &tr, &[doctor(1, "D1", "Dr. A")], JoinKey::PatientAndTreatment);

        assert_eq!(out.records.len(), 2);
        assert!(out
            .records
            .iter()
            .all(|r| r.treatment_id == r.feedback_treatment_id));
        assert!(out.issues.is_empty());
    }

    #[test]
    fn test_unmatched_feedback_is_dropped_and_flagged() {
        let fb = vec![feedback(1, "P1", "T0001"), feedback(2, "P9", "T0001")];
        let tr = vec![treatment(1, "P1", "T0001", Some("D1"))];

        let out = join_sources(&fb, &tr, &[doctor(1, "D1", "Dr. A")], JoinKey::PatientId);

        assert_eq!(out.records.len(), 1);
        assert_eq!(out.unmatched_feedback, 1);
        assert_eq!(out.issues.len(), 1);
        assert_eq!(out.issues[0].row, Some(2));
    }

    #[test]
    fn test_doctor_left_join_keeps_row_count() {
        let fb = vec![feedback(1, "P1", "T0001"), feedback(2, "P2", "T0002")];
        let tr = vec![
            treatment(1, "P1", "T0001", Some("D1")),
            treatment(2, "P2", "T0002", Some("D404")),
        ];
        let docs = vec![doctor(1, "D1", "Dr. A"), doctor(2, "D1", "Dr. Duplicate")];

        let out = join_sources(&fb, &tr, &docs, JoinKey::PatientId);

        assert_eq!(out.records.len(), out.matched_rows);
        assert_eq!(out.records[0].doctor_name.as_deref(), Some("Dr. A"));
        assert_eq!(out.records[1].doctor_name, None);
        assert_eq!(out.records[1].specialty, None);
        assert_eq!(out.orphan_doctor_rows, 1);
        assert!(out.issues.iter().any(|i| i.detail.contains("duplicate doctor_id D1")));
    }

    #[test]
    fn test_orphan_doctor_flagged_once_per_treatment_row() {
        let fb = vec![
            feedback(1, "P1", "T0001"),
            feedback(2, "P1", "T0002"),
            feedback(3, "P1", "T0003"),
        ];
        let tr = vec![
            treatment(1, "P1", "T0001", Some("D404")),
            treatment(2, "P1", "T0002", Some("D1")),
        ];

        let out = join_sources(&fb, &tr, &[doctor(1, "D1", "Dr. A")], JoinKey::PatientId);

        assert_eq!(out.records.len(), 6);
        assert_eq!(out.orphan_doctor_rows, 3);
        let orphan_issues: Vec<_> = out
            .issues
            .iter()
            .filter(|i| i.detail.contains("has no doctor record"))
            .collect();
        assert_eq!(orphan_issues.len(), 1);
        assert_eq!(orphan_issues[0].row, Some(1));
    }

    #[test]
    fn test_output_follows_feedback_order() {
        let fb = vec![feedback(1, "P2", "T0002"), feedback(2, "P1", "T0001")];
        let tr = vec![
            treatment(1, "P1", "T0001", None),
            treatment(2, "P2", "T0002", None),
        ];

        let out = join_sources(&fb, &tr, &[], JoinKey::PatientId);

        let order: Vec<&str> = out.records.iter().map(|r| r.patient_id.as_str()).collect();
        assert_eq!(order, vec!["P2", "P1"]);
    }

    #[test]
    fn test_join_key_parsing() {
        assert_eq!("patient".parse::<JoinKey>().unwrap(), JoinKey::PatientId);
        assert_eq!(
            "Composite".parse::<JoinKey>().unwrap(),
            JoinKey::PatientAndTreatment
        );
        assert!("treatment".parse::<JoinKey>().is_err());
    }
}
