//! Dosing rule wire model.
//!
//! Quantities are expressed in the drug's catalog `dose_unit`. Age bands are shared by all
//! drugs; each drug entry may then narrow its range for pediatric, geriatric or low-weight
//! patients.
//!
//! ```yaml
//! age_bands:
//!   pediatric_max_age: 17
//!   geriatric_min_age: 65
//! drugs:
//!   - drug: paracetamol
//!     single_dose: { min: 500, max: 1000 }
//!     daily_max: 4000
//!     pediatric:
//!       per_kg: { min: 10, max: 15 }
//!     low_weight: { below_kg: 50, multiplier: 0.75 }
//! ```

use crate::{drug_id, from_yaml, non_negative, positive, FormularyError, FormularyResult};
use rx_types::DrugId;
use serde::Deserialize;

/// Age thresholds (in whole years) that split patients into bands.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AgeBands {
    /// Patients at or below this age are pediatric.
    pub pediatric_max_age: u32,
    /// Patients at or above this age are geriatric.
    pub geriatric_min_age: u32,
}

impl Default for AgeBands {
    fn default() -> Self {
        Self {
            pediatric_max_age: 17,
            geriatric_min_age: 65,
        }
    }
}

/// Inclusive dose range.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DoseRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PediatricRule {
    /// Per-kilogram range, applied when the patient's weight is recorded.
    pub per_kg: Option<DoseRange>,
    /// Fallback multiplier on the adult range.
    pub multiplier: f64,
    /// Drug should not be given to pediatric patients at all.
    pub avoid: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LowWeightRule {
    pub below_kg: f64,
    pub multiplier: f64,
}

/// Dose limits for one drug.
#[derive(Clone, Debug, PartialEq)]
pub struct DosingRule {
    pub drug: DrugId,
    pub single_dose: DoseRange,
    pub daily_max: Option<f64>,
    pub pediatric: Option<PediatricRule>,
    pub geriatric_multiplier: Option<f64>,
    pub low_weight: Option<LowWeightRule>,
}

/// Parsed dosing file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DosingData {
    pub age_bands: AgeBands,
    pub drugs: Vec<DosingRule>,
}

/// Dosing rule file operations.
pub struct DosingFile;

impl DosingFile {
    /// File name inside a reference directory.
    pub const NAME: &'static str = "dosing.yaml";

    /// Parse dosing rules from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`FormularyError`] if the YAML does not match the schema, a range has
    /// `min > max` or a negative bound, a multiplier is not positive, or the age bands overlap.
    pub fn parse(yaml_text: &str) -> FormularyResult<DosingData> {
        let wire: DosingWire = from_yaml(yaml_text, "dosing")?;
        wire_to_domain(wire)
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DosingWire {
    #[serde(default)]
    age_bands: Option<AgeBandsWire>,
    #[serde(default)]
    drugs: Vec<DosingRuleWire>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AgeBandsWire {
    pediatric_max_age: u32,
    geriatric_min_age: u32,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RangeWire {
    min: f64,
    max: f64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PediatricWire {
    #[serde(default)]
    per_kg: Option<RangeWire>,
    #[serde(default)]
    multiplier: Option<f64>,
    #[serde(default)]
    avoid: bool,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LowWeightWire {
    below_kg: f64,
    multiplier: f64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DosingRuleWire {
    drug: String,
    single_dose: RangeWire,
    #[serde(default)]
    daily_max: Option<f64>,
    #[serde(default)]
    pediatric: Option<PediatricWire>,
    #[serde(default)]
    geriatric_multiplier: Option<f64>,
    #[serde(default)]
    low_weight: Option<LowWeightWire>,
}

fn wire_to_domain(wire: DosingWire) -> FormularyResult<DosingData> {
    let age_bands = match wire.age_bands {
        Some(b) => {
            if b.pediatric_max_age >= b.geriatric_min_age {
                return Err(FormularyError::InvalidInput(format!(
                    "age_bands: pediatric_max_age ({}) must be below geriatric_min_age ({})",
                    b.pediatric_max_age, b.geriatric_min_age
                )));
            }
            AgeBands {
                pediatric_max_age: b.pediatric_max_age,
                geriatric_min_age: b.geriatric_min_age,
            }
        }
        None => AgeBands::default(),
    };

    let drugs = wire
        .drugs
        .into_iter()
        .enumerate()
        .map(|(i, r)| rule_to_domain(r, &format!("drugs.{i}")))
        .collect::<FormularyResult<Vec<_>>>()?;

    Ok(DosingData { age_bands, drugs })
}

fn rule_to_domain(r: DosingRuleWire, field: &str) -> FormularyResult<DosingRule> {
    let pediatric = r
        .pediatric
        .map(|p| -> FormularyResult<PediatricRule> {
            Ok(PediatricRule {
                per_kg: p
                    .per_kg
                    .map(|range| range_to_domain(range, &format!("{field}.pediatric.per_kg")))
                    .transpose()?,
                multiplier: match p.multiplier {
                    Some(m) => positive(m, &format!("{field}.pediatric.multiplier"))?,
                    None => 1.0,
                },
                avoid: p.avoid,
            })
        })
        .transpose()?;

    let low_weight = r
        .low_weight
        .map(|lw| -> FormularyResult<LowWeightRule> {
            Ok(LowWeightRule {
                below_kg: positive(lw.below_kg, &format!("{field}.low_weight.below_kg"))?,
                multiplier: positive(lw.multiplier, &format!("{field}.low_weight.multiplier"))?,
            })
        })
        .transpose()?;

    Ok(DosingRule {
        drug: drug_id(&r.drug, &format!("{field}.drug"))?,
        single_dose: range_to_domain(r.single_dose, &format!("{field}.single_dose"))?,
        daily_max: r
            .daily_max
            .map(|m| positive(m, &format!("{field}.daily_max")))
            .transpose()?,
        pediatric,
        geriatric_multiplier: r
            .geriatric_multiplier
            .map(|m| positive(m, &format!("{field}.geriatric_multiplier")))
            .transpose()?,
        low_weight,
    })
}

fn range_to_domain(range: RangeWire, field: &str) -> FormularyResult<DoseRange> {
    let min = non_negative(range.min, &format!("{field}.min"))?;
    let max = non_negative(range.max, &format!("{field}.max"))?;
    if min > max {
        return Err(FormularyError::InvalidInput(format!(
            "{field}: min ({min}) exceeds max ({max})"
        )));
    }
    Ok(DoseRange { min, max })
}
