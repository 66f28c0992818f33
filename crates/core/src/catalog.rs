//! Drug catalog: canonical identities, name resolution and dose normalisation.
//!
//! Resolution trims, lowercases and collapses whitespace, then falls back through the canonical
//! name (or id), known synonyms, and finally a bounded Levenshtein match. The catalog is
//! immutable once built and lives inside a reference snapshot.

use crate::constants::MIN_FUZZY_QUERY_LEN;
use crate::{EngineError, EngineResult};
use api_shared::MatchKind;
use formulary::{CatalogData, DrugRecord, UnitConversion};
use regex::Regex;
use rx_types::DrugId;
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

static DOSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+(?:\.\d+)?)\s*([A-Za-zµμ%]+)$").expect("valid regex")
});

/// Lowercase, trim and collapse internal whitespace.
pub fn normalise_name(input: &str) -> String {
    input
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Successful catalog lookup.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CatalogMatch<'a> {
    pub record: &'a DrugRecord,
    pub kind: MatchKind,
    /// Edit distance for fuzzy matches, 0 otherwise.
    pub distance: u32,
}

/// Parsed dosage string, before unit conversion.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedDose {
    pub quantity: f64,
    /// Lowercase unit token as written.
    pub unit: String,
}

impl ParsedDose {
    /// Compact lowercase rendering (`325mg`, `0.5g`).
    pub fn compact(&self) -> String {
        format!("{}{}", self.quantity, self.unit)
    }
}

/// Parse a dosage like `325mg`, `0.5 g` or `100 MCG`.
pub fn parse_dose(input: &str) -> Option<ParsedDose> {
    let caps = DOSE_RE.captures(input.trim())?;
    let quantity = caps.get(1)?.as_str().parse::<f64>().ok()?;
    let unit = caps.get(2)?.as_str().to_lowercase().replace('μ', "µ");
    Some(ParsedDose { quantity, unit })
}

#[derive(Clone, Debug)]
pub struct Catalog {
    drugs: BTreeMap<DrugId, DrugRecord>,
    /// Normalised canonical names and ids.
    names: HashMap<String, DrugId>,
    synonyms: HashMap<String, DrugId>,
    units: BTreeMap<String, UnitConversion>,
}

impl Catalog {
    /// Build a catalog, rejecting duplicate ids and names claimed by two drugs.
    pub fn build(data: CatalogData) -> EngineResult<Self> {
        let mut drugs = BTreeMap::new();
        let mut names: HashMap<String, DrugId> = HashMap::new();
        let mut synonyms: HashMap<String, DrugId> = HashMap::new();

        for record in data.drugs {
            let id = record.id.clone();
            if drugs.contains_key(&id) {
                return Err(EngineError::ReferenceLoad(format!(
                    "catalog: duplicate drug id '{id}'"
                )));
            }

            for name in [normalise_name(record.name.as_str()), id.as_str().to_owned()] {
                claim(&mut names, name, &id)?;
            }
            for synonym in &record.synonyms {
                claim(&mut synonyms, normalise_name(synonym.as_str()), &id)?;
            }

            drugs.insert(id, record);
        }

        for (synonym, owner) in &synonyms {
            if let Some(other) = names.get(synonym) {
                if other != owner {
                    return Err(EngineError::ReferenceLoad(format!(
                        "catalog: name '{synonym}' is claimed by both '{other}' and '{owner}'"
                    )));
                }
            }
        }

        Ok(Self {
            drugs,
            names,
            synonyms,
            units: data.units,
        })
    }

    pub fn len(&self) -> usize {
        self.drugs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drugs.is_empty()
    }

    pub fn get(&self, id: &DrugId) -> Option<&DrugRecord> {
        self.drugs.get(id)
    }

    pub fn contains(&self, id: &DrugId) -> bool {
        self.drugs.contains_key(id)
    }

    /// All drugs in id order.
    pub fn drugs(&self) -> impl Iterator<Item = &DrugRecord> {
        self.drugs.values()
    }

    /// Exact (canonical name, id or synonym) lookup, with no fuzzy fallback.
    pub fn resolve_exact(&self, name: &str) -> Option<CatalogMatch<'_>> {
        let key = normalise_name(name);
        if key.is_empty() {
            return None;
        }

        if let Some(record) = self.names.get(&key).and_then(|id| self.drugs.get(id)) {
            return Some(CatalogMatch {
                record,
                kind: MatchKind::Exact,
                distance: 0,
            });
        }

        self.synonyms
            .get(&key)
            .and_then(|id| self.drugs.get(id))
            .map(|record| CatalogMatch {
                record,
                kind: MatchKind::Synonym,
                distance: 0,
            })
    }

    /// Resolve a name: exact, then synonym, then fuzzy within `max_distance`.
    pub fn resolve(&self, name: &str, max_distance: u32) -> Option<CatalogMatch<'_>> {
        if let Some(found) = self.resolve_exact(name) {
            return Some(found);
        }
        self.resolve_fuzzy(&normalise_name(name), max_distance)
    }

    fn resolve_fuzzy(&self, query: &str, max_distance: u32) -> Option<CatalogMatch<'_>> {
        if max_distance == 0 || query.chars().count() < MIN_FUZZY_QUERY_LEN {
            return None;
        }

        let mut best: Option<(u32, usize, String, &DrugRecord)> = None;

        for record in self.drugs.values() {
            let canonical = normalise_name(record.name.as_str());
            let candidates = std::iter::once(canonical.clone())
                .chain(record.synonyms.iter().map(|s| normalise_name(s.as_str())));

            let distance = candidates
                .filter(|c| c.chars().count() >= MIN_FUZZY_QUERY_LEN)
                .map(|c| u32::try_from(strsim::levenshtein(query, &c)).unwrap_or(u32::MAX))
                .min();

            let Some(distance) = distance.filter(|d| *d <= max_distance) else {
                continue;
            };

            let key = (distance, canonical.chars().count(), canonical);
            let better = match &best {
                None => true,
                Some((d, len, name, _)) => key < (*d, *len, name.clone()),
            };
            if better {
                best = Some((key.0, key.1, key.2, record));
            }
        }

        best.map(|(distance, _, _, record)| CatalogMatch {
            record,
            kind: MatchKind::Fuzzy,
            distance,
        })
    }

    /// Drugs sharing `id`'s therapeutic class, excluding `id` itself, in id order.
    pub fn same_class(&self, id: &DrugId) -> Vec<&DrugRecord> {
        let Some(class) = self.drugs.get(id).and_then(|r| r.class.as_ref()) else {
            return Vec::new();
        };
        let class = normalise_name(class.as_str());

        self.drugs
            .values()
            .filter(|r| &r.id != id)
            .filter(|r| {
                r.class
                    .as_ref()
                    .is_some_and(|c| normalise_name(c.as_str()) == class)
            })
            .collect()
    }

    /// Whether `token` is a unit in the unit table.
    pub fn is_unit(&self, token: &str) -> bool {
        self.units.contains_key(&token.to_lowercase())
    }

    /// Convert a dosage string into the drug's catalog dose unit.
    ///
    /// Returns `None` when the dosage cannot be parsed, the unit is unknown, or the unit does
    /// not share a base with the drug's dose unit.
    pub fn normalise_dose(&self, record: &DrugRecord, dosage: &str) -> Option<f64> {
        let parsed = parse_dose(dosage)?;
        let from = self.units.get(&parsed.unit)?;
        let to = self.units.get(&record.dose_unit)?;
        if from.base != to.base {
            return None;
        }
        Some(parsed.quantity * from.factor / to.factor)
    }
}

fn claim(map: &mut HashMap<String, DrugId>, key: String, id: &DrugId) -> EngineResult<()> {
    match map.get(&key) {
        Some(owner) if owner != id => Err(EngineError::ReferenceLoad(format!(
            "catalog: name '{key}' is claimed by both '{owner}' and '{id}'"
        ))),
        Some(_) => Ok(()),
        None => {
            map.insert(key, id.clone());
            Ok(())
        }
    }
}
