//! Merge segment labels back onto the warehouse rows

use std::collections::HashMap;

use crate::records::{ClusterAssignment, CustomerType, EnrichedRecord, ProcessedRecord};

/// Left join of processed rows with per-patient labels; row count is preserved
pub fn merge_labels(
    records: Vec<ProcessedRecord>,
    assignments: &[ClusterAssignment],
) -> Vec<EnrichedRecord> {
    let labels: HashMap<&str, CustomerType> = assignments
        .iter()
        .map(|a| (a.patient_id.as_str(), a.customer_type))
        .collect();

    records
        .into_iter()
        .map(|record| {
            let customer_type = labels.get(record.patient_id.as_str()).copied();
            EnrichedRecord {
                record,
                customer_type,
            }
        })
        .collect()
}
