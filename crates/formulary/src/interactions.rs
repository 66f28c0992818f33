//! Interaction rule wire model.
//!
//! Three rule families share one file:
//!
//! ```yaml
//! drug_interactions:
//!   - drugs: [aspirin, warfarin]
//!     severity: high
//!     mechanism: Additive anticoagulant and antiplatelet effect
//!     recommendation: Avoid combination unless specifically indicated
//! condition_interactions:
//!   - drug: ibuprofen
//!     conditions: [chronic kidney disease, ckd]
//!     severity: high
//!     mechanism: NSAIDs reduce renal perfusion
//!     recommendation: Prefer paracetamol for analgesia
//! allergy_conflicts:
//!   - allergen: penicillin
//!     drugs: [amoxicillin]
//!     classes: [penicillin antibiotic]
//!     severity: high
//!     mechanism: Beta-lactam hypersensitivity
//!     recommendation: Use a non beta-lactam alternative
//! ```
//!
//! Pairs are stored as written; canonical ordering and duplicate detection happen in the
//! engine's rule store.

use crate::{drug_id, from_yaml, text, FormularyError, FormularyResult};
use rx_types::{DrugId, NonEmptyText, Severity};
use serde::Deserialize;

// ============================================================================
// Public domain-level types
// ============================================================================

/// Interaction between two drugs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DrugInteractionRule {
    pub drugs: (DrugId, DrugId),
    pub severity: Severity,
    pub mechanism: NonEmptyText,
    pub recommendation: NonEmptyText,
}

/// Interaction between a drug and a patient condition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConditionRule {
    pub drug: DrugId,
    /// Condition names this rule applies to (first entry is the display name).
    pub conditions: Vec<NonEmptyText>,
    pub severity: Severity,
    pub mechanism: NonEmptyText,
    pub recommendation: NonEmptyText,
}

/// Conflict between a documented allergy and drugs or therapeutic classes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllergyRule {
    pub allergen: NonEmptyText,
    /// Other spellings of the allergen as patients or clinicians record it.
    pub synonyms: Vec<NonEmptyText>,
    pub drugs: Vec<DrugId>,
    /// Therapeutic classes (matching catalog `class`) that cross-react.
    pub classes: Vec<NonEmptyText>,
    pub severity: Severity,
    pub mechanism: NonEmptyText,
    pub recommendation: NonEmptyText,
}

/// Parsed interactions file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InteractionData {
    pub drug_interactions: Vec<DrugInteractionRule>,
    pub condition_interactions: Vec<ConditionRule>,
    pub allergy_conflicts: Vec<AllergyRule>,
}

// ============================================================================
// Public InteractionsFile operations
// ============================================================================

/// Interaction rule file operations.
pub struct InteractionsFile;

impl InteractionsFile {
    /// File name inside a reference directory.
    pub const NAME: &'static str = "interactions.yaml";

    /// Parse interaction rules from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`FormularyError`] if:
    /// - the YAML does not match the rule schema (unknown keys, wrong types, unknown severity),
    /// - a drug interaction does not name exactly two drugs,
    /// - any drug id is invalid or any text field is blank,
    /// - a condition rule lists no conditions, or an allergy rule names neither drugs nor classes.
    pub fn parse(yaml_text: &str) -> FormularyResult<InteractionData> {
        let wire: InteractionsWire = from_yaml(yaml_text, "interactions")?;
        wire_to_domain(wire)
    }
}

// ============================================================================
// Wire types (internal)
// ============================================================================

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct InteractionsWire {
    #[serde(default)]
    drug_interactions: Vec<DrugInteractionWire>,
    #[serde(default)]
    condition_interactions: Vec<ConditionWire>,
    #[serde(default)]
    allergy_conflicts: Vec<AllergyWire>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DrugInteractionWire {
    drugs: Vec<String>,
    severity: Severity,
    mechanism: String,
    recommendation: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConditionWire {
    drug: String,
    conditions: Vec<String>,
    severity: Severity,
    mechanism: String,
    recommendation: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AllergyWire {
    allergen: String,
    #[serde(default)]
    synonyms: Vec<String>,
    #[serde(default)]
    drugs: Vec<String>,
    #[serde(default)]
    classes: Vec<String>,
    severity: Severity,
    mechanism: String,
    recommendation: String,
}

// ============================================================================
// Helper functions (internal)
// ============================================================================

fn wire_to_domain(wire: InteractionsWire) -> FormularyResult<InteractionData> {
    let drug_interactions = wire
        .drug_interactions
        .into_iter()
        .enumerate()
        .map(|(i, r)| {
            let field = format!("drug_interactions.{i}");
            let [a, b] = <[String; 2]>::try_from(r.drugs).map_err(|drugs| {
                FormularyError::InvalidInput(format!(
                    "{field}.drugs: expected exactly two drugs, got {}",
                    drugs.len()
                ))
            })?;

            Ok(DrugInteractionRule {
                drugs: (
                    drug_id(&a, &format!("{field}.drugs"))?,
                    drug_id(&b, &format!("{field}.drugs"))?,
                ),
                severity: r.severity,
                mechanism: text(&r.mechanism, &format!("{field}.mechanism"))?,
                recommendation: text(&r.recommendation, &format!("{field}.recommendation"))?,
            })
        })
        .collect::<FormularyResult<Vec<_>>>()?;

    let condition_interactions = wire
        .condition_interactions
        .into_iter()
        .enumerate()
        .map(|(i, r)| {
            let field = format!("condition_interactions.{i}");
            if r.conditions.is_empty() {
                return Err(FormularyError::InvalidInput(format!(
                    "{field}.conditions: at least one condition is required"
                )));
            }

            Ok(ConditionRule {
                drug: drug_id(&r.drug, &format!("{field}.drug"))?,
                conditions: texts(&r.conditions, &format!("{field}.conditions"))?,
                severity: r.severity,
                mechanism: text(&r.mechanism, &format!("{field}.mechanism"))?,
                recommendation: text(&r.recommendation, &format!("{field}.recommendation"))?,
            })
        })
        .collect::<FormularyResult<Vec<_>>>()?;

    let allergy_conflicts = wire
        .allergy_conflicts
        .into_iter()
        .enumerate()
        .map(|(i, r)| {
            let field = format!("allergy_conflicts.{i}");
            if r.drugs.is_empty() && r.classes.is_empty() {
                return Err(FormularyError::InvalidInput(format!(
                    "{field}: an allergy conflict must name drugs or classes"
                )));
            }

            Ok(AllergyRule {
                allergen: text(&r.allergen, &format!("{field}.allergen"))?,
                synonyms: texts(&r.synonyms, &format!("{field}.synonyms"))?,
                drugs: r
                    .drugs
                    .iter()
                    .map(|d| drug_id(d, &format!("{field}.drugs")))
                    .collect::<FormularyResult<Vec<_>>>()?,
                classes: texts(&r.classes, &format!("{field}.classes"))?,
                severity: r.severity,
                mechanism: text(&r.mechanism, &format!("{field}.mechanism"))?,
                recommendation: text(&r.recommendation, &format!("{field}.recommendation"))?,
            })
        })
        .collect::<FormularyResult<Vec<_>>>()?;

    Ok(InteractionData {
        drug_interactions,
        condition_interactions,
        allergy_conflicts,
    })
}

fn texts(raw: &[String], field: &str) -> FormularyResult<Vec<NonEmptyText>> {
    raw.iter().map(|s| text(s, field)).collect()
}
