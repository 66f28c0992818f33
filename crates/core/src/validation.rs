//! Input validation utilities.
//!
//! Patient profiles are validated at the boundary, before any interaction computation runs.

use crate::constants::{MAX_PATIENT_AGE, MAX_PATIENT_WEIGHT_KG};
use crate::{EngineError, EngineResult};
use api_shared::PatientProfile;

/// A patient profile that has passed validation.
#[derive(Clone, Debug, PartialEq)]
pub struct Patient {
    pub age: u32,
    /// `None` when the weight was not recorded (sent as 0).
    pub weight_kg: Option<f64>,
    /// Trimmed, non-empty conditions in the order given (duplicates removed).
    pub conditions: Vec<String>,
    /// Trimmed, non-empty allergies in the order given (duplicates removed).
    pub allergies: Vec<String>,
}

/// Validates a caller-supplied profile.
///
/// # Errors
///
/// Returns `EngineError::InvalidProfile` if the age is negative or implausibly large, or the
/// weight is negative, non-finite or implausibly large.
pub fn validate_profile(profile: &PatientProfile) -> EngineResult<Patient> {
    if profile.age < 0 {
        return Err(EngineError::InvalidProfile(format!(
            "age must be non-negative (got {})",
            profile.age
        )));
    }
    if profile.age > MAX_PATIENT_AGE {
        return Err(EngineError::InvalidProfile(format!(
            "age exceeds maximum of {MAX_PATIENT_AGE} (got {})",
            profile.age
        )));
    }

    let weight = profile.weight_kg;
    if !weight.is_finite() || weight < 0.0 {
        return Err(EngineError::InvalidProfile(format!(
            "weight_kg must be a finite, non-negative number (got {weight})"
        )));
    }
    if weight > MAX_PATIENT_WEIGHT_KG {
        return Err(EngineError::InvalidProfile(format!(
            "weight_kg exceeds maximum of {MAX_PATIENT_WEIGHT_KG} (got {weight})"
        )));
    }

    let age = u32::try_from(profile.age)
        .map_err(|_| EngineError::InvalidProfile("age out of range".into()))?;

    Ok(Patient {
        age,
        weight_kg: (weight > 0.0).then_some(weight),
        conditions: clean_list(&profile.conditions),
        allergies: clean_list(&profile.allergies),
    })
}

fn clean_list(items: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let item = item.trim();
        if item.is_empty() || out.iter().any(|o| o.eq_ignore_ascii_case(item)) {
            continue;
        }
        out.push(item.to_owned());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(age: i64, weight_kg: f64) -> PatientProfile {
        PatientProfile {
            age,
            weight_kg,
            conditions: vec![" Diabetes ".into(), "".into(), "diabetes".into()],
            allergies: vec!["Penicillin".into()],
        }
    }

    #[test]
    fn rejects_negative_age() {
        let err = validate_profile(&profile(-1, 70.0)).expect_err("negative age");
        match err {
            EngineError::InvalidProfile(msg) => assert!(msg.contains("age"), "{msg}"),
            other => panic!("expected InvalidProfile, got {other:?}"),
        }
    }

    #[test]
    fn rejects_negative_or_nan_weight() {
        assert!(matches!(
            validate_profile(&profile(40, -2.0)),
            Err(EngineError::InvalidProfile(_))
        ));
        assert!(matches!(
            validate_profile(&profile(40, f64::NAN)),
            Err(EngineError::InvalidProfile(_))
        ));
    }

    #[test]
    fn zero_weight_means_not_recorded() {
        let patient = validate_profile(&profile(40, 0.0)).unwrap();
        assert_eq!(patient.weight_kg, None);
    }

    #[test]
    fn cleans_condition_lists() {
        let patient = validate_profile(&profile(40, 70.0)).unwrap();
        assert_eq!(patient.conditions, vec!["Diabetes".to_string()]);
        assert_eq!(patient.allergies, vec!["Penicillin".to_string()]);
        assert_eq!(patient.weight_kg, Some(70.0));
    }
}
