//! Age- and weight-banded dose checks.
//!
//! Every resolved drug with a dosing rule and a normalised dose is compared against the range
//! recommended for the patient's band. All quantities are in the drug's catalog dose unit.

use crate::catalog::Catalog;
use crate::validation::Patient;
use crate::{EngineError, EngineResult};
use api_shared::{AgeBand, DosageWarning, DosageWarningKind, ResolvedDrug};
use formulary::{AgeBands, DoseRange, DosingData, DosingRule};
use regex::Regex;
use rx_types::DrugId;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static EVERY_HOURS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:every\s+(\d+)\s+hours?|q(\d+)h)$").expect("valid regex")
});

// Guards comparisons against representation error from unit conversion.
const EPSILON: f64 = 1e-9;

/// Dosing rules keyed by drug, validated against the catalog.
#[derive(Clone, Debug)]
pub struct DosingTable {
    bands: AgeBands,
    rules: BTreeMap<DrugId, DosingRule>,
}

impl DosingTable {
    /// # Errors
    ///
    /// Returns `EngineError::ReferenceLoad` for unknown drugs or a drug listed twice.
    pub fn build(data: DosingData, catalog: &Catalog) -> EngineResult<Self> {
        let mut rules = BTreeMap::new();
        for (i, rule) in data.drugs.into_iter().enumerate() {
            if !catalog.contains(&rule.drug) {
                return Err(EngineError::ReferenceLoad(format!(
                    "dosing drugs.{i}: drug '{}' is not in the catalog",
                    rule.drug
                )));
            }
            if rules.contains_key(&rule.drug) {
                return Err(EngineError::ReferenceLoad(format!(
                    "dosing drugs.{i}: duplicate rule for '{}'",
                    rule.drug
                )));
            }
            rules.insert(rule.drug.clone(), rule);
        }

        Ok(Self {
            bands: data.age_bands,
            rules,
        })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rule(&self, id: &DrugId) -> Option<&DosingRule> {
        self.rules.get(id)
    }

    pub fn band_for(&self, age: u32) -> AgeBand {
        if age <= self.bands.pediatric_max_age {
            AgeBand::Pediatric
        } else if age >= self.bands.geriatric_min_age {
            AgeBand::Geriatric
        } else {
            AgeBand::Adult
        }
    }
}

/// Recommended limits for one drug and patient.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Recommendation {
    pub band: AgeBand,
    pub single: DoseRange,
    pub daily_max: Option<f64>,
    pub avoid: bool,
}

/// Compute the recommended range for `rule` given the patient's band and weight.
pub fn recommend(rule: &DosingRule, band: AgeBand, weight_kg: Option<f64>) -> Recommendation {
    let adult = rule.single_dose;
    let mut min = adult.min;
    let mut max = adult.max;
    let mut avoid = false;

    match band {
        AgeBand::Pediatric => {
            if let Some(ped) = &rule.pediatric {
                avoid = ped.avoid;
                match (ped.per_kg, weight_kg) {
                    (Some(per_kg), Some(w)) => {
                        min = per_kg.min * w;
                        max = (per_kg.max * w).min(adult.max);
                    }
                    _ => {
                        min *= ped.multiplier;
                        max *= ped.multiplier;
                    }
                }
            }
        }
        AgeBand::Geriatric => max *= rule.geriatric_multiplier.unwrap_or(1.0),
        AgeBand::Adult => {}
    }

    // Pediatric ranges are already weight-aware.
    if band != AgeBand::Pediatric {
        if let (Some(lw), Some(w)) = (&rule.low_weight, weight_kg) {
            if w < lw.below_kg {
                max *= lw.multiplier;
            }
        }
    }

    min = min.min(max);

    let scale = if adult.max > 0.0 { max / adult.max } else { 1.0 };
    Recommendation {
        band,
        single: DoseRange {
            min: round3(min),
            max: round3(max),
        },
        daily_max: rule.daily_max.map(|d| round3(d * scale)),
        avoid,
    }
}

/// Doses per day implied by a frequency phrase, when it is recognised.
pub fn daily_multiplier(frequency: &str) -> Option<f64> {
    let f = frequency.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    let fixed = match f.trim_end_matches('.') {
        "once daily" | "once a day" | "once per day" | "daily" | "od" | "o.d" | "qd" | "q.d"
        | "nightly" | "at bedtime" | "every morning" | "every night" | "every evening"
        | "every day" => Some(1.0),
        "twice daily" | "twice a day" | "twice per day" | "bid" | "b.i.d" | "bd" | "b.d" => {
            Some(2.0)
        }
        "three times daily" | "three times a day" | "three times per day" | "tid" | "t.i.d"
        | "tds" => Some(3.0),
        "four times daily" | "four times a day" | "four times per day" | "qid" | "q.i.d"
        | "qds" => Some(4.0),
        "every other day" => Some(0.5),
        "weekly" | "once weekly" | "once a week" => Some(1.0 / 7.0),
        _ => None,
    };
    if fixed.is_some() {
        return fixed;
    }

    let caps = EVERY_HOURS_RE.captures(&f)?;
    let hours: f64 = caps.get(1).or_else(|| caps.get(2))?.as_str().parse().ok()?;
    (hours > 0.0).then(|| 24.0 / hours)
}

/// Compare each resolved drug's dose against its recommended range.
///
/// Drugs without a rule, or whose dose could not be normalised, produce no warnings.
pub fn assess(
    drugs: &[ResolvedDrug],
    patient: &Patient,
    table: &DosingTable,
) -> Vec<DosageWarning> {
    let band = table.band_for(patient.age);
    let mut warnings = Vec::new();

    for drug in drugs {
        let Some(rule) = table.rule(&drug.drug_id) else {
            continue;
        };
        let rec = recommend(rule, band, patient.weight_kg);
        let unit = drug.dose_unit.clone().unwrap_or_default();
        let warn = |kind, given: Option<f64>, min, max, message: String| DosageWarning {
            occurrence: drug.index,
            drug_id: drug.drug_id.clone(),
            drug_name: drug.canonical_name.clone(),
            kind,
            band,
            given,
            recommended_min: min,
            recommended_max: max,
            unit: unit.clone(),
            message,
        };

        if rec.avoid {
            warnings.push(warn(
                DosageWarningKind::AvoidInBand,
                drug.dose_quantity.map(round3),
                None,
                None,
                format!(
                    "{} should be avoided in {} patients",
                    drug.canonical_name,
                    band_label(band)
                ),
            ));
            continue;
        }

        let Some(dose) = drug.dose_quantity else {
            continue;
        };

        if dose + EPSILON < rec.single.min {
            warnings.push(warn(
                DosageWarningKind::BelowRange,
                Some(round3(dose)),
                Some(rec.single.min),
                Some(rec.single.max),
                format!(
                    "{} {} {unit} is below the recommended minimum of {} {unit} for a {} patient",
                    drug.canonical_name,
                    round3(dose),
                    rec.single.min,
                    band_label(band)
                ),
            ));
        } else if dose > rec.single.max + EPSILON {
            warnings.push(warn(
                DosageWarningKind::AboveRange,
                Some(round3(dose)),
                Some(rec.single.min),
                Some(rec.single.max),
                format!(
                    "{} {} {unit} is above the recommended maximum of {} {unit} for a {} patient",
                    drug.canonical_name,
                    round3(dose),
                    rec.single.max,
                    band_label(band)
                ),
            ));
        }

        let per_day = drug
            .mention
            .frequency
            .as_deref()
            .and_then(daily_multiplier);
        if let (Some(limit), Some(per_day)) = (rec.daily_max, per_day) {
            let total = round3(dose * per_day);
            if total > limit + EPSILON {
                warnings.push(warn(
                    DosageWarningKind::DailyMaximumExceeded,
                    Some(total),
                    None,
                    Some(limit),
                    format!(
                        "{} {total} {unit}/day exceeds the daily maximum of {limit} {unit} for a {} patient",
                        drug.canonical_name,
                        band_label(band)
                    ),
                ));
            }
        }
    }

    warnings
}

fn band_label(band: AgeBand) -> &'static str {
    match band {
        AgeBand::Pediatric => "pediatric",
        AgeBand::Adult => "adult",
        AgeBand::Geriatric => "geriatric",
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
