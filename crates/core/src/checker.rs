//! Interaction checker.
//!
//! Occurrences are grouped by drug id so the rule store is queried once per distinct pair (and
//! once per distinct drug for patient checks); results are then fanned out to every occurrence.
//! Two occurrences of the same drug never produce a drug-drug finding.

use crate::catalog::Catalog;
use crate::rules::RuleStore;
use crate::validation::Patient;
use api_shared::{FindingKind, InteractionFinding, ResolvedDrug};
use rx_types::{DrugId, Severity};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

const DIRECT_ALLERGY_MECHANISM: &str = "Patient has a documented allergy to this drug";
const DIRECT_ALLERGY_RECOMMENDATION: &str =
    "Do not administer; select an agent the patient is not allergic to";

/// Compute all pairwise and patient-conditioned findings, sorted and deduplicated.
///
/// Without a patient profile the condition and allergy checks are skipped. Several rules
/// hitting the same drug occurrence and patient attribute yield one finding (see
/// [`merge_duplicates`]).
pub fn check(
    drugs: &[ResolvedDrug],
    patient: Option<&Patient>,
    catalog: &Catalog,
    rules: &RuleStore,
) -> Vec<InteractionFinding> {
    let mut groups: BTreeMap<&DrugId, Vec<&ResolvedDrug>> = BTreeMap::new();
    for drug in drugs {
        groups.entry(&drug.drug_id).or_default().push(drug);
    }
    let ids: Vec<&DrugId> = groups.keys().copied().collect();

    let mut findings = Vec::new();

    for (i, a) in ids.iter().enumerate() {
        for b in &ids[i + 1..] {
            let Some(record) = rules.lookup(a, b) else {
                continue;
            };
            for occ_a in &groups[*a] {
                for occ_b in &groups[*b] {
                    findings.push(InteractionFinding {
                        kind: FindingKind::DrugDrug,
                        severity: record.severity,
                        drug_id_a: record.drug_a.clone(),
                        drug_id_b: Some(record.drug_b.clone()),
                        drug_a: occ_a.mention.name.clone(),
                        drug_b: Some(occ_b.mention.name.clone()),
                        subject: None,
                        occurrences: vec![occ_a.index, occ_b.index],
                        mechanism: record.mechanism.clone(),
                        recommendation: record.recommendation.clone(),
                    });
                }
            }
        }
    }

    if let Some(patient) = patient {
        for (id, occurrences) in &groups {
            for conflict in patient_conflicts(id, patient, catalog, rules) {
                for occ in occurrences {
                    findings.push(InteractionFinding {
                        kind: conflict.kind,
                        severity: conflict.severity,
                        drug_id_a: (*id).clone(),
                        drug_id_b: None,
                        drug_a: occ.mention.name.clone(),
                        drug_b: None,
                        subject: Some(conflict.subject.clone()),
                        occurrences: vec![occ.index],
                        mechanism: conflict.mechanism.clone(),
                        recommendation: conflict.recommendation.clone(),
                    });
                }
            }
        }
    }

    let mut findings = merge_duplicates(findings);
    sort_findings(&mut findings);
    findings
}

type FindingKey = (FindingKind, DrugId, Option<DrugId>, Option<String>, Vec<usize>);

/// Collapse findings that share kind, drug ids, subject and occurrences.
///
/// The highest severity wins. Rules of equal severity are kept together: their distinct
/// mechanisms and recommendations are joined with `"; "` in rule order.
fn merge_duplicates(findings: Vec<InteractionFinding>) -> Vec<InteractionFinding> {
    let mut merged: BTreeMap<FindingKey, InteractionFinding> = BTreeMap::new();

    for finding in findings {
        let key = (
            finding.kind,
            finding.drug_id_a.clone(),
            finding.drug_id_b.clone(),
            finding.subject.clone(),
            finding.occurrences.clone(),
        );
        match merged.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(finding);
            }
            Entry::Occupied(mut slot) => {
                let kept = slot.get_mut();
                if finding.severity > kept.severity {
                    *kept = finding;
                } else if finding.severity == kept.severity {
                    append_distinct(&mut kept.mechanism, &finding.mechanism);
                    append_distinct(&mut kept.recommendation, &finding.recommendation);
                }
            }
        }
    }

    merged.into_values().collect()
}

fn append_distinct(into: &mut String, text: &str) {
    if !into.split("; ").any(|part| part == text) {
        into.push_str("; ");
        into.push_str(text);
    }
}

/// A drug-vs-patient conflict, before it is fanned out to occurrences.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct PatientConflict {
    pub kind: FindingKind,
    pub severity: Severity,
    pub subject: String,
    pub mechanism: String,
    pub recommendation: String,
}

/// Condition and allergy conflicts between one drug and the patient profile.
pub(crate) fn patient_conflicts(
    id: &DrugId,
    patient: &Patient,
    catalog: &Catalog,
    rules: &RuleStore,
) -> Vec<PatientConflict> {
    let mut out = Vec::new();

    for (rule, condition) in rules.condition_interactions(id, &patient.conditions) {
        out.push(PatientConflict {
            kind: FindingKind::DrugCondition,
            severity: rule.severity,
            subject: condition.to_owned(),
            mechanism: rule.mechanism.clone(),
            recommendation: rule.recommendation.clone(),
        });
    }

    let class = catalog
        .get(id)
        .and_then(|r| r.class.as_ref())
        .map(|c| c.as_str());
    for (rule, allergy) in rules.allergy_conflicts(id, class, &patient.allergies) {
        out.push(PatientConflict {
            kind: FindingKind::DrugAllergy,
            severity: rule.severity,
            subject: allergy.to_owned(),
            mechanism: rule.mechanism.clone(),
            recommendation: rule.recommendation.clone(),
        });
    }

    for allergy in &patient.allergies {
        let direct = catalog
            .resolve_exact(allergy)
            .is_some_and(|m| &m.record.id == id);
        if direct {
            out.push(PatientConflict {
                kind: FindingKind::DrugAllergy,
                severity: Severity::High,
                subject: allergy.clone(),
                mechanism: DIRECT_ALLERGY_MECHANISM.into(),
                recommendation: DIRECT_ALLERGY_RECOMMENDATION.into(),
            });
        }
    }

    out
}

/// Severity desc, then drug ids, kind, subject and occurrences.
fn sort_findings(findings: &mut [InteractionFinding]) {
    findings.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.drug_id_a.cmp(&b.drug_id_a))
            .then_with(|| a.drug_id_b.cmp(&b.drug_id_b))
            .then_with(|| a.kind.cmp(&b.kind))
            .then_with(|| a.subject.cmp(&b.subject))
            .then_with(|| a.occurrences.cmp(&b.occurrences))
    });
}
