//! Canonical forms for identifiers shared across sources

use crate::error::KeyError;

/// Trim a patient id; an empty value cannot key a warehouse row
pub fn normalize_patient_id(raw: Option<&str>) -> Result<String, KeyError> {
    match raw.map(str::trim) {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err(KeyError::Missing {
            field: "patient_id",
        }),
    }
}

/// Canonicalize a treatment id to `T` followed by exactly four digits
///
/// Accepts `T7`, `t07`, `T0007` or a bare `7`.
pub fn normalize_treatment_id(raw: Option<&str>) -> Result<String, KeyError> {
    const FIELD: &str = "treatment_id";

    let value = match raw.map(str::trim) {
        Some(v) if !v.is_empty() => v,
        _ => return Err(KeyError::Missing { field: FIELD }),
    };

    let digits = value
        .strip_prefix('T')
        .or_else(|| value.strip_prefix('t'))
        .unwrap_or(value);

    if digits.is_empty() {
        return Err(KeyError::NoDigits {
            field: FIELD,
            value: value.to_string(),
        });
    }
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(KeyError::NotNumeric {
            field: FIELD,
            value: value.to_string(),
        });
    }

    let number: u32 = digits.parse().map_err(|_| KeyError::OutOfRange {
        field: FIELD,
        value: value.to_string(),
    })?;
    if number > 9999 {
        return Err(KeyError::OutOfRange {
            field: FIELD,
            value: value.to_string(),
        });
    }

    Ok(format!("T{:04}", number))
}

/// Trim a doctor id, mapping blanks to `None`
pub fn normalize_doctor_id(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_treatment_id_forms() {
        assert_eq!(normalize_treatment_id(Some("T7")).unwrap(), "T0007");
        assert_eq!(normalize_treatment_id(Some("T0007")).unwrap(), "T0007");
        assert_eq!(normalize_treatment_id(Some("  t42 ")).unwrap(), "T0042");
        assert_eq!(normalize_treatment_id(Some("123")).unwrap(), "T0123");
        assert_eq!(normalize_treatment_id(Some("T9999")).unwrap(), "T9999");
    }

    #[test]
    fn test_treatment_id_idempotent_and_five_chars() {
        for raw in ["T1", "T01", "T001", "T0001", "T12", "T345", "T9999", "T0"] {
            let once = normalize_treatment_id(Some(raw)).unwrap();
            let twice = normalize_treatment_id(Some(&once)).unwrap();
            assert_eq!(once, twice);
            assert_eq!(once.len(), 5);
            assert!(once.starts_with('T'));
        }
    }

    #[test]
    fn test_malformed_treatment_ids() {
        assert!(matches!(
            normalize_treatment_id(Some("T")),
            Err(KeyError::NoDigits { .. })
        ));
        assert!(matches!(
            normalize_treatment_id(Some("TX1")),
            Err(KeyError::NotNumeric { .. })
        ));
        assert!(matches!(
            normalize_treatment_id(Some("T-5")),
            Err(KeyError::NotNumeric { .. })
        ));
        assert!(matches!(
            normalize_treatment_id(Some("T12345")),
            Err(KeyError::OutOfRange { .. })
        ));
        assert!(matches!(
            normalize_treatment_id(Some("   ")),
            Err(KeyError::Missing { .. })
        ));
        assert!(normalize_treatment_id(None).is_err());
    }

    #[test]
    fn test_patient_and_doctor_ids() {
        assert_eq!(normalize_patient_id(Some(" P001 ")).unwrap(), "P001");
        assert!(normalize_patient_id(Some("")).is_err());
        assert!(normalize_patient_id(None).is_err());

        assert_eq!(normalize_doctor_id(Some(" D1")), Some("D1".to_string()));
        assert_eq!(normalize_doctor_id(Some("  ")), None);
    }
}
