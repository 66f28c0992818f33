//! Interaction rule store.
//!
//! Drug-drug rules are keyed by unordered pair, stored with the lexicographically smaller id
//! first so that `lookup(a, b) == lookup(b, a)`. Conflicting duplicates are configuration errors
//! raised while the store is built; identical duplicates collapse to the first entry.

use crate::catalog::{normalise_name, Catalog};
use crate::{EngineError, EngineResult};
use formulary::InteractionData;
use rx_types::{DrugId, Severity};
use std::collections::{BTreeMap, BTreeSet};

/// Interaction between two drugs, with `drug_a < drug_b`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InteractionRecord {
    pub drug_a: DrugId,
    pub drug_b: DrugId,
    pub severity: Severity,
    pub mechanism: String,
    pub recommendation: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConditionRecord {
    pub drug: DrugId,
    /// Normalised condition names.
    pub conditions: Vec<String>,
    pub severity: Severity,
    pub mechanism: String,
    pub recommendation: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllergyRecord {
    pub allergen: String,
    /// Normalised allergen name and synonyms.
    pub names: BTreeSet<String>,
    pub drugs: BTreeSet<DrugId>,
    /// Normalised therapeutic classes.
    pub classes: BTreeSet<String>,
    pub severity: Severity,
    pub mechanism: String,
    pub recommendation: String,
}

impl AllergyRecord {
    fn applies_to(&self, drug: &DrugId, class: Option<&str>) -> bool {
        self.drugs.contains(drug) || class.is_some_and(|c| self.classes.contains(c))
    }
}

#[derive(Clone, Debug, Default)]
pub struct RuleStore {
    pairs: BTreeMap<(DrugId, DrugId), InteractionRecord>,
    conditions: BTreeMap<DrugId, Vec<ConditionRecord>>,
    allergies: Vec<AllergyRecord>,
}

impl RuleStore {
    /// Build the store, validating every rule against the catalog.
    ///
    /// # Errors
    ///
    /// - `EngineError::ReferenceLoad` for self pairs and references to drugs absent from the
    ///   catalog.
    /// - `EngineError::AmbiguousRule` when the same pair (or drug/condition) is listed twice
    ///   with different severities.
    pub fn build(data: InteractionData, catalog: &Catalog) -> EngineResult<Self> {
        let known = |id: &DrugId, field: &str| -> EngineResult<()> {
            if catalog.contains(id) {
                Ok(())
            } else {
                Err(EngineError::ReferenceLoad(format!(
                    "{field}: drug '{id}' is not in the catalog"
                )))
            }
        };

        let mut pairs: BTreeMap<(DrugId, DrugId), InteractionRecord> = BTreeMap::new();
        for (i, rule) in data.drug_interactions.into_iter().enumerate() {
            let field = format!("drug_interactions.{i}");
            let (a, b) = rule.drugs;
            known(&a, &field)?;
            known(&b, &field)?;
            if a == b {
                return Err(EngineError::ReferenceLoad(format!(
                    "{field}: drug '{a}' cannot interact with itself"
                )));
            }

            let key = canonical_pair(a, b);
            if let Some(existing) = pairs.get(&key) {
                if existing.severity != rule.severity {
                    return Err(EngineError::AmbiguousRule {
                        subject: format!("{}+{}", key.0, key.1),
                        first: existing.severity,
                        second: rule.severity,
                    });
                }
                tracing::warn!(
                    "duplicate interaction rule {}+{} collapsed to first entry",
                    key.0,
                    key.1
                );
                continue;
            }

            pairs.insert(
                key.clone(),
                InteractionRecord {
                    drug_a: key.0,
                    drug_b: key.1,
                    severity: rule.severity,
                    mechanism: rule.mechanism.as_str().to_owned(),
                    recommendation: rule.recommendation.as_str().to_owned(),
                },
            );
        }

        let mut seen: BTreeMap<(DrugId, String), Severity> = BTreeMap::new();
        let mut conditions: BTreeMap<DrugId, Vec<ConditionRecord>> = BTreeMap::new();
        for (i, rule) in data.condition_interactions.into_iter().enumerate() {
            let field = format!("condition_interactions.{i}");
            known(&rule.drug, &field)?;

            let mut names = Vec::new();
            for condition in &rule.conditions {
                let name = normalise_name(condition.as_str());
                let key = (rule.drug.clone(), name.clone());
                match seen.get(&key) {
                    Some(first) if *first != rule.severity => {
                        return Err(EngineError::AmbiguousRule {
                            subject: format!("{}+{}", rule.drug, name),
                            first: *first,
                            second: rule.severity,
                        });
                    }
                    Some(_) => {
                        tracing::warn!(
                            "duplicate condition rule {}+{} collapsed to first entry",
                            rule.drug,
                            name
                        );
                    }
                    None => {
                        seen.insert(key, rule.severity);
                        names.push(name);
                    }
                }
            }
            if names.is_empty() {
                continue;
            }

            conditions
                .entry(rule.drug.clone())
                .or_default()
                .push(ConditionRecord {
                    drug: rule.drug,
                    conditions: names,
                    severity: rule.severity,
                    mechanism: rule.mechanism.as_str().to_owned(),
                    recommendation: rule.recommendation.as_str().to_owned(),
                });
        }

        let mut allergies = Vec::new();
        for (i, rule) in data.allergy_conflicts.into_iter().enumerate() {
            let field = format!("allergy_conflicts.{i}");
            for drug in &rule.drugs {
                known(drug, &field)?;
            }

            let names = std::iter::once(&rule.allergen)
                .chain(rule.synonyms.iter())
                .map(|n| normalise_name(n.as_str()))
                .collect();

            allergies.push(AllergyRecord {
                allergen: rule.allergen.as_str().to_owned(),
                names,
                drugs: rule.drugs.into_iter().collect(),
                classes: rule
                    .classes
                    .iter()
                    .map(|c| normalise_name(c.as_str()))
                    .collect(),
                severity: rule.severity,
                mechanism: rule.mechanism.as_str().to_owned(),
                recommendation: rule.recommendation.as_str().to_owned(),
            });
        }

        Ok(Self {
            pairs,
            conditions,
            allergies,
        })
    }

    /// Symmetric pair lookup. A drug never interacts with itself.
    pub fn lookup(&self, a: &DrugId, b: &DrugId) -> Option<&InteractionRecord> {
        if a == b {
            return None;
        }
        let key = if a < b {
            (a.clone(), b.clone())
        } else {
            (b.clone(), a.clone())
        };
        self.pairs.get(&key)
    }

    /// Condition rules for `drug` matching any of `conditions`.
    ///
    /// Returns each matching rule with the patient condition (as given) that triggered it. A
    /// condition matches when it equals a rule condition or contains it as whole words, so
    /// "type 2 diabetes" matches a rule on "diabetes".
    pub fn condition_interactions<'a, 'c>(
        &'a self,
        drug: &DrugId,
        conditions: &'c [String],
    ) -> Vec<(&'a ConditionRecord, &'c str)> {
        let Some(rules) = self.conditions.get(drug) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        for condition in conditions {
            let normalised = normalise_name(condition);
            for rule in rules {
                if rule
                    .conditions
                    .iter()
                    .any(|c| contains_phrase(&normalised, c))
                {
                    out.push((rule, condition.as_str()));
                }
            }
        }
        out
    }

    /// Allergy conflicts for `drug` (of therapeutic `class`) against `allergies`.
    ///
    /// Returns each matching rule with the patient allergy (as given) that triggered it.
    pub fn allergy_conflicts<'a, 'c>(
        &'a self,
        drug: &DrugId,
        class: Option<&str>,
        allergies: &'c [String],
    ) -> Vec<(&'a AllergyRecord, &'c str)> {
        let class = class.map(normalise_name);

        let mut out = Vec::new();
        for allergy in allergies {
            let normalised = normalise_name(allergy);
            for rule in &self.allergies {
                if rule.names.contains(&normalised) && rule.applies_to(drug, class.as_deref()) {
                    out.push((rule, allergy.as_str()));
                }
            }
        }
        out
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    pub fn condition_count(&self) -> usize {
        self.conditions.values().map(Vec::len).sum()
    }

    pub fn allergy_count(&self) -> usize {
        self.allergies.len()
    }

    /// Every stored pair record, in canonical order.
    pub fn pairs(&self) -> impl Iterator<Item = &InteractionRecord> {
        self.pairs.values()
    }
}

fn canonical_pair(a: DrugId, b: DrugId) -> (DrugId, DrugId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Whether `needle`'s words appear contiguously in `haystack`.
fn contains_phrase(haystack: &str, needle: &str) -> bool {
    let hay: Vec<&str> = haystack.split_whitespace().collect();
    let needle: Vec<&str> = needle.split_whitespace().collect();
    if needle.is_empty() || needle.len() > hay.len() {
        return false;
    }
    hay.windows(needle.len()).any(|w| w == needle.as_slice())
}
