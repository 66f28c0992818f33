//! Comprehensive analysis.
//!
//! Runs the checker, the dosage assessment and the alternatives search against one reference
//! snapshot. Each step reports into its own section; a step that cannot run (today only the
//! dosage step, when no dosing rules are loaded) marks its section degraded with a reason and
//! leaves the other sections untouched.

use crate::catalog::Catalog;
use crate::checker::{self, patient_conflicts};
use crate::dosage;
use crate::rules::RuleStore;
use crate::snapshot::ReferenceSnapshot;
use crate::validation::Patient;
use api_shared::{
    AlternativeDrug, AlternativeReason, AlternativeSuggestion, AlternativesSection, DosageSection,
    FindingKind, FindingsSection, InteractionFinding, ResolvedDrug, SectionStatus,
};
use rx_types::{DrugId, Severity};
use std::collections::{BTreeMap, BTreeSet};

/// The three computed sections of an analysis report.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisSections {
    pub findings: FindingsSection,
    pub dosage_warnings: DosageSection,
    pub alternatives: AlternativesSection,
}

impl AnalysisSections {
    /// `(section name, reason)` for every degraded section.
    pub fn degraded(&self) -> Vec<(&'static str, &str)> {
        [
            ("findings", self.findings.status, &self.findings.reason),
            ("dosage_warnings", self.dosage_warnings.status, &self.dosage_warnings.reason),
            ("alternatives", self.alternatives.status, &self.alternatives.reason),
        ]
        .into_iter()
        .filter(|(_, status, _)| *status == SectionStatus::Degraded)
        .map(|(name, _, reason)| (name, reason.as_deref().unwrap_or("unavailable")))
        .collect()
    }
}

pub fn analyze(
    drugs: &[ResolvedDrug],
    patient: &Patient,
    snapshot: &ReferenceSnapshot,
) -> AnalysisSections {
    let catalog = snapshot.catalog();
    let rules = snapshot.rules();

    let findings = checker::check(drugs, Some(patient), catalog, rules);
    let alternatives = suggest_alternatives(drugs, &findings, patient, catalog, rules);

    let dosage_warnings = match snapshot.dosing() {
        Some(table) => DosageSection {
            items: dosage::assess(drugs, patient, table),
            ..Default::default()
        },
        None => DosageSection {
            status: SectionStatus::Degraded,
            reason: Some("no dosing rules are loaded".into()),
            items: Vec::new(),
        },
    };

    AnalysisSections {
        findings: FindingsSection {
            items: findings,
            ..Default::default()
        },
        dosage_warnings,
        alternatives: AlternativesSection {
            items: alternatives,
            ..Default::default()
        },
    }
}

/// Same-class substitutes for every drug implicated in a high-severity or allergy finding.
///
/// A candidate is offered only if it is not already listed, has no interaction rule with the
/// other listed drugs, and has no condition or allergy conflict with the patient.
pub fn suggest_alternatives(
    drugs: &[ResolvedDrug],
    findings: &[InteractionFinding],
    patient: &Patient,
    catalog: &Catalog,
    rules: &RuleStore,
) -> Vec<AlternativeSuggestion> {
    let mut implicated: BTreeMap<&DrugId, BTreeSet<AlternativeReason>> = BTreeMap::new();
    for finding in findings {
        let reason = if finding.kind == FindingKind::DrugAllergy {
            AlternativeReason::AllergyConflict
        } else if finding.severity == Severity::High {
            AlternativeReason::HighSeverityInteraction
        } else {
            continue;
        };
        implicated.entry(&finding.drug_id_a).or_default().insert(reason);
        if let Some(b) = &finding.drug_id_b {
            implicated.entry(b).or_default().insert(reason);
        }
    }

    let current: BTreeSet<&DrugId> = drugs.iter().map(|d| &d.drug_id).collect();

    implicated
        .into_iter()
        .filter_map(|(id, reasons)| {
            let record = catalog.get(id)?;
            let alternatives = catalog
                .same_class(id)
                .into_iter()
                .filter(|candidate| !current.contains(&candidate.id))
                .filter(|candidate| {
                    current
                        .iter()
                        .filter(|other| **other != id)
                        .all(|other| rules.lookup(&candidate.id, other).is_none())
                })
                .filter(|candidate| {
                    patient_conflicts(&candidate.id, patient, catalog, rules).is_empty()
                })
                .map(|candidate| AlternativeDrug {
                    drug_id: candidate.id.clone(),
                    name: candidate.name.as_str().to_owned(),
                    class: candidate.class.as_ref().map(|c| c.as_str().to_owned()),
                })
                .collect();

            Some(AlternativeSuggestion {
                drug_id: id.clone(),
                drug_name: record.name.as_str().to_owned(),
                reasons: reasons.into_iter().collect(),
                alternatives,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::ReferenceSources;
    use crate::test_support::{patient, reference_snapshot, reference_sources, resolved, resolved_with};

    fn alternative_ids(section: &AlternativesSection, drug: &str) -> Vec<String> {
        section
            .items
            .iter()
            .find(|s| s.drug_id.as_str() == drug)
            .unwrap_or_else(|| panic!("no suggestion for {drug}"))
            .alternatives
            .iter()
            .map(|a| a.drug_id.as_str().to_owned())
            .collect()
    }

    #[test]
    fn statin_alternative_skips_interacting_candidates() {
        let snapshot = reference_snapshot();
        let catalog = snapshot.catalog();
        let drugs = vec![
            resolved(catalog, 0, "Simvastatin", Some("40mg")),
            resolved(catalog, 1, "Clarithromycin", Some("500mg")),
        ];

        let sections = analyze(&drugs, &patient(50, 80.0, &[], &[]), &snapshot);
        assert!(sections.degraded().is_empty());

        // Atorvastatin also interacts with clarithromycin.
        assert_eq!(alternative_ids(&sections.alternatives, "simvastatin"), vec!["pravastatin"]);
        // Erythromycin interacts with simvastatin.
        assert_eq!(
            alternative_ids(&sections.alternatives, "clarithromycin"),
            vec!["azithromycin"]
        );
    }

    #[test]
    fn allergy_conflict_with_no_safe_substitute_reports_empty_list() {
        let snapshot = reference_snapshot();
        let catalog = snapshot.catalog();
        let drugs = vec![resolved(catalog, 0, "Amoxicillin", Some("500mg"))];

        let sections = analyze(&drugs, &patient(30, 70.0, &[], &["penicillin"]), &snapshot);
        let suggestion = &sections.alternatives.items[0];
        assert_eq!(suggestion.drug_id.as_str(), "amoxicillin");
        assert_eq!(suggestion.reasons, vec![AlternativeReason::AllergyConflict]);
        // Ampicillin is the same class and equally affected by the allergy.
        assert!(suggestion.alternatives.is_empty());
    }

    #[test]
    fn medium_findings_do_not_trigger_alternatives() {
        let snapshot = reference_snapshot();
        let catalog = snapshot.catalog();
        let drugs = vec![
            resolved(catalog, 0, "Lisinopril", Some("10mg")),
            resolved(catalog, 1, "Spironolactone", Some("25mg")),
        ];

        let sections = analyze(&drugs, &patient(50, 80.0, &[], &[]), &snapshot);
        assert_eq!(sections.findings.items.len(), 1);
        assert!(sections.alternatives.items.is_empty());
    }

    #[test]
    fn missing_dosing_rules_degrade_only_the_dosage_section() {
        let sources = ReferenceSources {
            dosing: None,
            ..reference_sources()
        };
        let snapshot = ReferenceSnapshot::build(&sources, 1).unwrap();
        let catalog = snapshot.catalog();
        let drugs = vec![
            resolved(catalog, 0, "Aspirin", Some("325mg")),
            resolved(catalog, 1, "Warfarin", Some("5mg")),
        ];

        let sections = analyze(&drugs, &patient(70, 60.0, &[], &[]), &snapshot);
        assert_eq!(sections.dosage_warnings.status, SectionStatus::Degraded);
        assert!(sections.dosage_warnings.reason.is_some());
        assert_eq!(sections.findings.status, SectionStatus::Ok);
        assert_eq!(sections.findings.items[0].severity, Severity::High);
        assert_eq!(sections.alternatives.status, SectionStatus::Ok);
        assert_eq!(sections.degraded(), vec![("dosage_warnings", "no dosing rules are loaded")]);
    }

    #[test]
    fn dosage_section_uses_patient_band() {
        let snapshot = reference_snapshot();
        let drugs = vec![resolved_with(snapshot.catalog(), 0, "Paracetamol", "1g", "four times daily")];

        let sections = analyze(&drugs, &patient(80, 70.0, &[], &[]), &snapshot);
        let kinds: Vec<_> = sections.dosage_warnings.items.iter().map(|w| w.kind).collect();
        assert_eq!(
            kinds,
            vec![
                api_shared::DosageWarningKind::AboveRange,
                api_shared::DosageWarningKind::DailyMaximumExceeded
            ]
        );
    }
}
