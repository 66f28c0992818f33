//! Drug catalog wire model.
//!
//! The catalog names every drug the engine can recognise, together with the synonyms found in
//! clinical text (brand names, abbreviations such as "ASA"), the therapeutic class used when
//! suggesting substitutes, and the unit in which the drug's doses are expressed.
//!
//! ```yaml
//! units:
//!   mg: { base: mg, factor: 1 }
//!   g: { base: mg, factor: 1000 }
//! drugs:
//!   - id: aspirin
//!     name: Aspirin
//!     synonyms: [ASA, acetylsalicylic acid]
//!     class: antiplatelet
//!     dose_unit: mg
//! ```

use crate::{drug_id, from_yaml, positive, text, FormularyError, FormularyResult};
use rx_types::{DrugId, NonEmptyText};
use serde::Deserialize;
use std::collections::BTreeMap;

// ============================================================================
// Public domain-level types
// ============================================================================

/// Conversion of a dose unit into its base unit.
#[derive(Clone, Debug, PartialEq)]
pub struct UnitConversion {
    /// Base unit this unit converts to (for example `mg`).
    pub base: String,
    /// Multiplier from this unit into `base`.
    pub factor: f64,
}

/// One catalog entry.
#[derive(Clone, Debug, PartialEq)]
pub struct DrugRecord {
    pub id: DrugId,
    /// Canonical display name.
    pub name: NonEmptyText,
    pub synonyms: Vec<NonEmptyText>,
    /// Therapeutic class, when known.
    pub class: Option<NonEmptyText>,
    /// Unit (a key of the unit table) that dose rules for this drug are expressed in.
    pub dose_unit: String,
}

/// Parsed catalog file.
#[derive(Clone, Debug, PartialEq)]
pub struct CatalogData {
    /// Unit table keyed by lowercase unit token.
    pub units: BTreeMap<String, UnitConversion>,
    pub drugs: Vec<DrugRecord>,
}

// ============================================================================
// Public CatalogFile operations
// ============================================================================

/// Catalog file operations.
pub struct CatalogFile;

impl CatalogFile {
    /// File name inside a reference directory.
    pub const NAME: &'static str = "catalog.yaml";

    /// Parse a catalog from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`FormularyError`] if:
    /// - the YAML does not match the catalog schema (unknown keys, wrong types),
    /// - a drug id is not a lowercase slug or a name/synonym is blank,
    /// - a unit converts into a base that is not itself a base unit,
    /// - a drug's `dose_unit` is not in the unit table.
    pub fn parse(yaml_text: &str) -> FormularyResult<CatalogData> {
        let wire: CatalogWire = from_yaml(yaml_text, "catalog")?;
        wire_to_domain(wire)
    }
}

// ============================================================================
// Wire types (internal)
// ============================================================================

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogWire {
    #[serde(default)]
    units: BTreeMap<String, UnitWire>,
    drugs: Vec<DrugWire>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UnitWire {
    base: String,
    factor: f64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DrugWire {
    id: String,
    name: String,
    #[serde(default)]
    synonyms: Vec<String>,
    #[serde(default)]
    class: Option<String>,
    dose_unit: String,
}

// ============================================================================
// Helper functions (internal)
// ============================================================================

fn wire_to_domain(wire: CatalogWire) -> FormularyResult<CatalogData> {
    let mut units = BTreeMap::new();
    for (token, unit) in &wire.units {
        let token = token.trim().to_lowercase();
        let field = format!("units.{token}");
        if token.is_empty() {
            return Err(FormularyError::InvalidInput("units: blank unit token".into()));
        }
        let factor = positive(unit.factor, &format!("{field}.factor"))?;
        units.insert(
            token,
            UnitConversion {
                base: unit.base.trim().to_lowercase(),
                factor,
            },
        );
    }

    for (token, unit) in &units {
        match units.get(&unit.base) {
            Some(base) if base.base == unit.base => {}
            _ => {
                return Err(FormularyError::InvalidInput(format!(
                    "units.{token}: base '{}' is not a base unit",
                    unit.base
                )))
            }
        }
    }

    let drugs = wire
        .drugs
        .into_iter()
        .enumerate()
        .map(|(i, d)| {
            let field = format!("drugs.{i}");
            let dose_unit = d.dose_unit.trim().to_lowercase();
            if !units.contains_key(&dose_unit) {
                return Err(FormularyError::InvalidInput(format!(
                    "{field}.dose_unit: unknown unit '{dose_unit}'"
                )));
            }

            Ok(DrugRecord {
                id: drug_id(&d.id, &format!("{field}.id"))?,
                name: text(&d.name, &format!("{field}.name"))?,
                synonyms: d
                    .synonyms
                    .iter()
                    .map(|s| text(s, &format!("{field}.synonyms")))
                    .collect::<FormularyResult<Vec<_>>>()?,
                class: d
                    .class
                    .as_deref()
                    .map(|c| text(c, &format!("{field}.class")))
                    .transpose()?,
                dose_unit,
            })
        })
        .collect::<FormularyResult<Vec<_>>>()?;

    Ok(CatalogData { units, drugs })
}
