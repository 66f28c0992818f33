//! Boundary service.
//!
//! `DrugSafetyService` is what transports call. It validates requests, bounds and deduplicates
//! the drug list, resolves mentions against the catalog and turns per-item problems into
//! diagnostics, then hands resolved drugs to the engine. Every operation takes one snapshot from
//! the reference store at its start and uses it throughout.

use crate::analyzer;
use crate::catalog::Catalog;
use crate::checker;
use crate::extractor;
use crate::snapshot::{ReferenceSnapshot, ReferenceStore};
use crate::validation::validate_profile;
use crate::{CoreConfig, EngineResult};
use api_shared::{
    AnalysisReport, CheckInteractionsReq, CheckInteractionsRes, ComprehensiveAnalysisReq,
    Diagnostic, DiagnosticCode, DrugIdentity, DrugInput, ExtractDrugsRes, MatchKind,
    ReferenceInfoRes, ResolveRes, ResolvedDrug, UnresolvedMention,
};
use rx_types::DrugId;
use std::collections::HashSet;
use std::sync::Arc;

/// Drugs bound to catalog identities, plus everything that could not be.
#[derive(Debug, Default)]
struct Prepared {
    resolved: Vec<ResolvedDrug>,
    unresolved: Vec<UnresolvedMention>,
    diagnostics: Vec<Diagnostic>,
}

/// Drug safety operations over the shared reference store.
#[derive(Clone, Debug)]
pub struct DrugSafetyService {
    cfg: Arc<CoreConfig>,
    store: Arc<ReferenceStore>,
}

impl DrugSafetyService {
    /// Load reference data from the configured directory.
    ///
    /// # Errors
    ///
    /// Returns an `EngineError` if the reference directory is unsafe or its contents fail to
    /// load (including `AmbiguousRule` for conflicting rules).
    pub fn new(cfg: Arc<CoreConfig>) -> EngineResult<Self> {
        let store = ReferenceStore::open(cfg.reference_dir().to_path_buf())?;
        Ok(Self::with_store(cfg, Arc::new(store)))
    }

    pub fn with_store(cfg: Arc<CoreConfig>, store: Arc<ReferenceStore>) -> Self {
        Self { cfg, store }
    }

    pub fn store(&self) -> &Arc<ReferenceStore> {
        &self.store
    }

    /// Extract drug mentions from free text and resolve them.
    ///
    /// Never fails: unrecognised mentions are returned with an `UNKNOWN_DRUG` diagnostic.
    pub fn extract_drugs(&self, text: &str) -> ExtractDrugsRes {
        let snapshot = self.store.current();
        let mentions = extractor::extract(snapshot.catalog(), text);
        let inputs: Vec<DrugInput> = mentions.into_iter().map(DrugInput::from).collect();
        let prepared = self.prepare(&snapshot, &inputs);

        let mut drugs: Vec<_> = prepared
            .resolved
            .iter()
            .map(|r| (r.index, r.mention.clone()))
            .chain(prepared.unresolved.iter().map(|u| (u.index, u.mention.clone())))
            .collect();
        drugs.sort_by_key(|(index, _)| *index);

        ExtractDrugsRes {
            drugs: drugs.into_iter().map(|(_, m)| m).collect(),
            resolved_drugs: prepared.resolved,
            diagnostics: prepared.diagnostics,
            reference_version: snapshot.version(),
        }
    }

    /// Pairwise and (when a profile is supplied) patient-conditioned interaction check.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidProfile` if the patient profile fails validation. No
    /// interaction computation runs in that case.
    pub fn check_interactions(
        &self,
        req: &CheckInteractionsReq,
    ) -> EngineResult<CheckInteractionsRes> {
        let patient = req.patient.as_ref().map(validate_profile).transpose()?;

        let snapshot = self.store.current();
        let prepared = self.prepare(&snapshot, &req.drugs);
        let interactions = checker::check(
            &prepared.resolved,
            patient.as_ref(),
            snapshot.catalog(),
            snapshot.rules(),
        );

        Ok(CheckInteractionsRes {
            interactions,
            resolved_drugs: prepared.resolved,
            unresolved_mentions: prepared.unresolved,
            diagnostics: prepared.diagnostics,
            reference_version: snapshot.version(),
        })
    }

    /// Full report: findings, dosage warnings and alternatives.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidProfile` if the patient profile fails validation. A section
    /// that cannot be computed is reported as degraded instead of failing the request.
    pub fn comprehensive_analysis(
        &self,
        req: &ComprehensiveAnalysisReq,
    ) -> EngineResult<AnalysisReport> {
        let patient = validate_profile(&req.patient)?;

        let snapshot = self.store.current();
        let mut prepared = self.prepare(&snapshot, &req.drugs);
        let sections = analyzer::analyze(&prepared.resolved, &patient, &snapshot);

        for (section, reason) in sections.degraded() {
            prepared.diagnostics.push(Diagnostic {
                code: DiagnosticCode::DegradedSection,
                message: format!("{section}: {reason}"),
                mention_index: None,
            });
        }

        Ok(AnalysisReport {
            resolved_drugs: prepared.resolved,
            unresolved_mentions: prepared.unresolved,
            findings: sections.findings,
            dosage_warnings: sections.dosage_warnings,
            alternatives: sections.alternatives,
            diagnostics: prepared.diagnostics,
            reference_version: snapshot.version(),
            reference_fingerprint: snapshot.fingerprint().to_owned(),
        })
    }

    /// Resolve a single name against the catalog.
    pub fn resolve(&self, name: &str) -> ResolveRes {
        let snapshot = self.store.current();
        let identity = snapshot
            .catalog()
            .resolve(name, self.cfg.fuzzy_max_distance())
            .map(|found| DrugIdentity {
                drug_id: found.record.id.clone(),
                name: found.record.name.as_str().to_owned(),
                class: found.record.class.as_ref().map(|c| c.as_str().to_owned()),
                match_kind: found.kind,
                match_distance: found.distance,
            });

        ResolveRes {
            query: name.to_owned(),
            identity,
        }
    }

    pub fn reference_info(&self) -> ReferenceInfoRes {
        reference_info(&self.store.current())
    }

    /// Re-read the reference directory and publish a new snapshot.
    ///
    /// # Errors
    ///
    /// Returns the load error; the previous snapshot keeps serving requests.
    pub fn reload_reference(&self) -> EngineResult<ReferenceInfoRes> {
        let snapshot = self.store.reload()?;
        Ok(reference_info(&snapshot))
    }

    /// Deduplicate, bound and resolve the submitted drugs.
    fn prepare(&self, snapshot: &ReferenceSnapshot, inputs: &[DrugInput]) -> Prepared {
        let mut seen = HashSet::new();
        let mut unique: Vec<&DrugInput> = inputs.iter().filter(|i| seen.insert(*i)).collect();

        let mut prepared = Prepared::default();

        let limit = self.cfg.max_drugs_per_request();
        if unique.len() > limit {
            prepared.diagnostics.push(Diagnostic {
                code: DiagnosticCode::TooManyDrugs,
                message: format!(
                    "{} drugs submitted; only the first {limit} were checked",
                    unique.len()
                ),
                mention_index: None,
            });
            unique.truncate(limit);
        }

        let catalog = snapshot.catalog();
        for (index, input) in unique.into_iter().enumerate() {
            let mention = input.mention();
            let Some((record, match_kind, match_distance)) = self.bind(catalog, input) else {
                tracing::debug!("unresolved drug mention '{}'", mention.name);
                prepared.diagnostics.push(Diagnostic {
                    code: DiagnosticCode::UnknownDrug,
                    message: format!("'{}' is not a recognised drug", mention.name),
                    mention_index: Some(index),
                });
                prepared.unresolved.push(UnresolvedMention {
                    index,
                    mention,
                    code: DiagnosticCode::UnknownDrug,
                });
                continue;
            };

            let dose_quantity = match mention.dosage.as_deref() {
                Some(dosage) => {
                    let quantity = catalog.normalise_dose(record, dosage);
                    if quantity.is_none() {
                        prepared.diagnostics.push(Diagnostic {
                            code: DiagnosticCode::DoseNotNormalised,
                            message: format!(
                                "dosage '{dosage}' for {} could not be converted to {}",
                                record.name.as_str(),
                                record.dose_unit
                            ),
                            mention_index: Some(index),
                        });
                    }
                    quantity
                }
                None => None,
            };

            prepared.resolved.push(ResolvedDrug {
                index,
                drug_id: record.id.clone(),
                canonical_name: record.name.as_str().to_owned(),
                match_kind,
                match_distance,
                dose_quantity,
                dose_unit: Some(record.dose_unit.clone()),
                mention,
            });
        }

        prepared
    }

    /// A known `drug_id` is trusted; otherwise the name is resolved.
    fn bind<'c>(
        &self,
        catalog: &'c Catalog,
        input: &DrugInput,
    ) -> Option<(&'c formulary::DrugRecord, MatchKind, u32)> {
        let by_id = input
            .drug_id
            .as_deref()
            .and_then(|id| DrugId::parse(id).ok())
            .and_then(|id| catalog.get(&id));
        if let Some(record) = by_id {
            return Some((record, MatchKind::Identifier, 0));
        }

        catalog
            .resolve(&input.name, self.cfg.fuzzy_max_distance())
            .map(|found| (found.record, found.kind, found.distance))
    }
}

fn reference_info(snapshot: &ReferenceSnapshot) -> ReferenceInfoRes {
    ReferenceInfoRes {
        version: snapshot.version(),
        fingerprint: snapshot.fingerprint().to_owned(),
        loaded_at: snapshot.loaded_at().to_rfc3339(),
        drugs: snapshot.catalog().len(),
        drug_interactions: snapshot.rules().pair_count(),
        condition_interactions: snapshot.rules().condition_count(),
        allergy_conflicts: snapshot.rules().allergy_count(),
        dosing_rules: snapshot.dosing().map(|d| d.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{reference_snapshot, write_reference_dir};
    use crate::EngineError;
    use api_shared::{PatientProfile, SectionStatus};
    use rx_types::{Route, Severity};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn service() -> DrugSafetyService {
        let cfg = Arc::new(CoreConfig::with_reference_dir(PathBuf::from("unused")));
        let store = ReferenceStore::from_snapshot(PathBuf::from("unused"), reference_snapshot());
        DrugSafetyService::with_store(cfg, Arc::new(store))
    }

    fn input(name: &str, dosage: Option<&str>) -> DrugInput {
        DrugInput {
            name: name.into(),
            dosage: dosage.map(Into::into),
            frequency: None,
            route: Route::Oral,
            drug_id: None,
        }
    }

    fn profile(age: i64, weight_kg: f64) -> PatientProfile {
        PatientProfile {
            age,
            weight_kg,
            conditions: vec![],
            allergies: vec![],
        }
    }

    #[test]
    fn extract_resolves_and_flags_unknown_mentions() {
        let res = service().extract_drugs("Aspirin 325mg twice daily. Started Zorblex 20mg at bedtime");
        let names: Vec<_> = res.drugs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Aspirin", "Zorblex"]);
        assert_eq!(res.resolved_drugs.len(), 1);
        assert_eq!(res.resolved_drugs[0].dose_quantity, Some(325.0));
        assert_eq!(res.diagnostics.len(), 1);
        assert_eq!(res.diagnostics[0].code, DiagnosticCode::UnknownDrug);
        assert_eq!(res.diagnostics[0].mention_index, Some(1));
        assert_eq!(res.reference_version, 1);
    }

    #[test]
    fn extract_from_empty_text_is_empty() {
        let res = service().extract_drugs("");
        assert!(res.drugs.is_empty());
        assert!(res.diagnostics.is_empty());
    }

    #[test]
    fn check_reports_high_aspirin_warfarin_finding() {
        let req = CheckInteractionsReq {
            drugs: vec![input("Aspirin", Some("325mg")), input("warfrin", Some("5mg"))],
            patient: None,
        };
        let res = service().check_interactions(&req).unwrap();
        assert_eq!(res.interactions.len(), 1);
        assert_eq!(res.interactions[0].severity, Severity::High);
        assert_eq!(res.resolved_drugs[1].match_kind, MatchKind::Fuzzy);
        assert!(res.unresolved_mentions.is_empty());
    }

    #[test]
    fn duplicates_are_dropped_and_list_is_bounded() {
        let cfg = Arc::new(CoreConfig::new(PathBuf::from("unused"), 2, 2).unwrap());
        let store = ReferenceStore::from_snapshot(PathBuf::from("unused"), reference_snapshot());
        let service = DrugSafetyService::with_store(cfg, Arc::new(store));

        let req = CheckInteractionsReq {
            drugs: vec![
                input("Aspirin", Some("75mg")),
                input("Aspirin", Some("75mg")),
                input("Warfarin", Some("5mg")),
                input("Metformin", Some("500mg")),
            ],
            patient: None,
        };
        let res = service.check_interactions(&req).unwrap();
        let names: Vec<_> = res.resolved_drugs.iter().map(|d| d.mention.name.as_str()).collect();
        assert_eq!(names, vec!["Aspirin", "Warfarin"]);
        assert_eq!(res.diagnostics[0].code, DiagnosticCode::TooManyDrugs);
    }

    #[test]
    fn known_drug_id_is_trusted_over_name() {
        let mut drug = input("the blue pill", None);
        drug.drug_id = Some("warfarin".into());
        let req = CheckInteractionsReq {
            drugs: vec![drug, input("Aspirin", None)],
            patient: None,
        };
        let res = service().check_interactions(&req).unwrap();
        assert_eq!(res.resolved_drugs[0].match_kind, MatchKind::Identifier);
        assert_eq!(res.resolved_drugs[0].drug_id.as_str(), "warfarin");
        assert_eq!(res.interactions.len(), 1);
    }

    #[test]
    fn unconvertible_dose_is_diagnosed() {
        let req = CheckInteractionsReq {
            drugs: vec![input("Aspirin", Some("2 tablets"))],
            patient: None,
        };
        let res = service().check_interactions(&req).unwrap();
        assert_eq!(res.resolved_drugs[0].dose_quantity, None);
        assert_eq!(res.diagnostics[0].code, DiagnosticCode::DoseNotNormalised);
    }

    #[test]
    fn negative_age_is_rejected_before_checking() {
        let service = service();
        let req = ComprehensiveAnalysisReq {
            drugs: vec![input("Aspirin", Some("325mg"))],
            patient: profile(-1, 70.0),
        };
        let err = service.comprehensive_analysis(&req).expect_err("invalid profile");
        assert!(matches!(err, EngineError::InvalidProfile(_)));
        assert_eq!(err.code(), DiagnosticCode::InvalidProfile);

        let req = CheckInteractionsReq {
            drugs: vec![input("Aspirin", Some("325mg"))],
            patient: Some(profile(-1, 70.0)),
        };
        assert!(matches!(
            service.check_interactions(&req),
            Err(EngineError::InvalidProfile(_))
        ));
    }

    #[test]
    fn analysis_is_byte_identical_across_runs() {
        let service = service();
        let req = ComprehensiveAnalysisReq {
            drugs: vec![
                input("Aspirin", Some("325mg")),
                input("Warfarin", Some("5mg")),
                input("Ibuprofen", Some("800mg")),
                input("Zorblex", Some("20mg")),
            ],
            patient: PatientProfile {
                age: 72,
                weight_kg: 60.0,
                conditions: vec!["Chronic kidney disease".into()],
                allergies: vec!["penicillin".into()],
            },
        };

        let first = serde_json::to_string(&service.comprehensive_analysis(&req).unwrap()).unwrap();
        let second = serde_json::to_string(&service.comprehensive_analysis(&req).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn analysis_populates_every_section() {
        let req = ComprehensiveAnalysisReq {
            drugs: vec![input("Aspirin", Some("325mg")), input("Warfarin", Some("15mg"))],
            patient: profile(45, 80.0),
        };
        let report = service().comprehensive_analysis(&req).unwrap();
        assert_eq!(report.findings.status, SectionStatus::Ok);
        assert_eq!(report.findings.items[0].severity, Severity::High);
        assert_eq!(report.dosage_warnings.items.len(), 1);
        assert_eq!(report.dosage_warnings.items[0].drug_id.as_str(), "warfarin");
        assert_eq!(report.alternatives.items.len(), 2);
        assert_eq!(report.reference_fingerprint.len(), 64);
        assert!(report.diagnostics.is_empty());
    }

    #[test]
    fn resolve_reports_match_kind() {
        let service = service();
        let res = service.resolve("ASA");
        let identity = res.identity.unwrap();
        assert_eq!(identity.drug_id.as_str(), "aspirin");
        assert_eq!(identity.match_kind, MatchKind::Synonym);
        assert!(service.resolve("nothing like it").identity.is_none());
    }

    #[test]
    fn reload_reference_bumps_version() {
        let temp = TempDir::new().unwrap();
        write_reference_dir(temp.path());
        let cfg = Arc::new(CoreConfig::with_reference_dir(temp.path().to_path_buf()));
        let service = DrugSafetyService::new(cfg).unwrap();

        assert_eq!(service.reference_info().version, 1);
        let info = service.reload_reference().unwrap();
        assert_eq!(info.version, 2);
        assert_eq!(info.dosing_rules, Some(13));
        assert_eq!(service.reference_info().version, 2);
    }
}
