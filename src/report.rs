//! Run summary: row counts, issues and label distribution

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Disposition, IssueKind, RowIssue};

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub feedback_rows: usize,
    pub treatment_rows: usize,
    pub doctor_rows: usize,
    /// Rows after the feedback ⋈ treatment step
    pub joined_rows: usize,
    pub processed_rows: usize,
    pub profiles: usize,
    pub segmented_profiles: usize,
    pub excluded_profiles: usize,
    pub vip_patients: usize,
    pub non_vip_patients: usize,
    pub unlabeled_rows: usize,
    pub enriched_rows: usize,
    pub inertia: Option<f64>,
    pub silhouette: Option<f64>,
    pub issues: Vec<RowIssue>,
}

impl RunReport {
    /// Record issues and log each one
    pub fn extend_issues(&mut self, issues: impl IntoIterator<Item = RowIssue>) {
        for issue in issues {
            issue.log();
            self.issues.push(issue);
        }
    }

    pub fn quarantined(&self) -> usize {
        self.count_disposition(Disposition::Quarantined)
    }

    pub fn flagged(&self) -> usize {
        self.count_disposition(Disposition::Flagged)
    }

    fn count_disposition(&self, disposition: Disposition) -> usize {
        self.issues
            .iter()
            .filter(|i| i.disposition == disposition)
            .count()
    }

    pub fn issues_by_kind(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for issue in &self.issues {
            *counts.entry(issue.kind.to_string()).or_insert(0) += 1;
        }
        counts
    }

    pub fn count_kind(&self, kind: IssueKind) -> usize {
        self.issues.iter().filter(|i| i.kind == kind).count()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Run Summary ===")?;
        writeln!(
            f,
            "Source rows: feedback={} patient_treatment={} doctor={}",
            self.feedback_rows, self.treatment_rows, self.doctor_rows
        )?;
        writeln!(
            f,
            "Rows processed: {} (joined {}), enriched: {}",
            self.processed_rows, self.joined_rows, self.enriched_rows
        )?;
        writeln!(
            f,
            "Rows quarantined: {}, flagged: {}",
            self.quarantined(),
            self.flagged()
        )?;
        for (kind, count) in self.issues_by_kind() {
            writeln!(f, "  {}: {}", kind, count)?;
        }
        writeln!(
            f,
            "Patient profiles: {} (segmented {}, excluded {})",
            self.profiles, self.segmented_profiles, self.excluded_profiles
        )?;
        writeln!(
            f,
            "Label distribution: VIP={} Non-VIP={} (unlabeled rows {})",
            self.vip_patients, self.non_vip_patients, self.unlabeled_rows
        )?;
        if let Some(inertia) = self.inertia {
            writeln!(f, "Within-cluster sum of squares: {:.2}", inertia)?;
        }
        if let Some(silhouette) = self.silhouette {
            writeln!(f, "Silhouette score (sample): {:.3}", silhouette)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Stage;

    #[test]
    fn test_counts_and_summary() {
        let mut report = RunReport {
            processed_rows: 10,
            vip_patients: 2,
            non_vip_patients: 3,
            ..RunReport::default()
        };
        report.extend_issues(vec![
            RowIssue::quarantined(
                Stage::Normalize,
                IssueKind::MalformedIdentifier,
                "feedback",
                Some(1),
                "bad",
                "{}",
            ),
            RowIssue::flagged(
                Stage::Derive,
                IssueKind::MissingValue,
                "joined",
                Some(4),
                "null",
                "{}",
            ),
            RowIssue::flagged(
                Stage::Derive,
                IssueKind::MissingValue,
                "joined",
                Some(5),
                "null",
                "{}",
            ),
        ]);

        assert_eq!(report.quarantined(), 1);
        assert_eq!(report.flagged(), 2);
        assert_eq!(report.count_kind(IssueKind::MissingValue), 2);

        let text = report.to_string();
        assert!(text.contains("Rows processed: 10"));
        assert!(text.contains("Rows quarantined: 1, flagged: 2"));
        assert!(text.contains("MissingValue: 2"));
        assert!(text.contains("VIP=2 Non-VIP=3"));
    }
}
