//! YAML wire/boundary support for rxcheck reference data.
//!
//! This crate provides **wire models** and **translation helpers** for the on-disk reference
//! files the engine loads at startup:
//! - `catalog.yaml`: canonical drug identities, synonyms, therapeutic classes, dose units
//! - `interactions.yaml`: drug-drug, drug-condition and drug-allergy rules
//! - `dosing.yaml`: age/weight banded dose ranges
//!
//! Responsibilities stop at structure: each parser rejects unknown keys, wrong types, invalid
//! identifiers and nonsensical numbers. Cross-record consistency (duplicate identities,
//! conflicting rules, references to unknown drugs) is enforced by the engine when it assembles
//! a snapshot.

pub mod catalog;
pub mod dosing;
pub mod interactions;

// Re-export facades
pub use catalog::CatalogFile;
pub use dosing::DosingFile;
pub use interactions::InteractionsFile;

// Re-export public domain-level types
pub use catalog::{CatalogData, DrugRecord, UnitConversion};
pub use dosing::{AgeBands, DoseRange, DosingData, DosingRule, LowWeightRule, PediatricRule};
pub use interactions::{AllergyRule, ConditionRule, DrugInteractionRule, InteractionData};

use serde::de::DeserializeOwned;

/// Errors returned by the `formulary` boundary crate.
#[derive(Debug, thiserror::Error)]
pub enum FormularyError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("translation error: {0}")]
    Translation(String),
}

/// Type alias for Results that can fail with a [`FormularyError`].
pub type FormularyResult<T> = Result<T, FormularyError>;

/// Deserialise a wire struct from YAML, reporting the path of the failing field.
///
/// `what` names the document in error messages (for example `catalog`).
fn from_yaml<T: DeserializeOwned>(yaml_text: &str, what: &str) -> FormularyResult<T> {
    let deserializer = serde_yaml::Deserializer::from_str(yaml_text);

    match serde_path_to_error::deserialize::<_, T>(deserializer) {
        Ok(parsed) => Ok(parsed),
        Err(err) => {
            let path = err.path().to_string();
            let source = err.into_inner();
            let path = if path.is_empty() || path == "." {
                "<root>"
            } else {
                path.as_str()
            };
            Err(FormularyError::Translation(format!(
                "{what} schema mismatch at {path}: {source}"
            )))
        }
    }
}

/// Parse a drug identifier, naming the field that carried it on failure.
fn drug_id(raw: &str, field: &str) -> FormularyResult<rx_types::DrugId> {
    rx_types::DrugId::parse(raw)
        .map_err(|e| FormularyError::InvalidInput(format!("{field}: invalid drug id '{raw}': {e}")))
}

/// Parse a non-empty text field, naming the field on failure.
fn text(raw: &str, field: &str) -> FormularyResult<rx_types::NonEmptyText> {
    rx_types::NonEmptyText::new(raw)
        .map_err(|e| FormularyError::InvalidInput(format!("{field}: {e}")))
}

/// Reject NaN, infinities and negative quantities.
fn non_negative(value: f64, field: &str) -> FormularyResult<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(FormularyError::InvalidInput(format!(
            "{field} must be a finite, non-negative number (got {value})"
        )))
    }
}

/// Reject multipliers that are not strictly positive and finite.
fn positive(value: f64, field: &str) -> FormularyResult<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(FormularyError::InvalidInput(format!(
            "{field} must be a finite, positive number (got {value})"
        )))
    }
}
