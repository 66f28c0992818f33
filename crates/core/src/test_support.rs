//! Shared fixtures for unit tests, built from the bundled reference data.

use crate::catalog::Catalog;
use crate::constants::DEFAULT_FUZZY_MAX_DISTANCE;
use crate::dosage::DosingTable;
use crate::rules::RuleStore;
use crate::snapshot::{ReferenceSnapshot, ReferenceSources};
use crate::validation::Patient;
use api_shared::{DrugMention, ResolvedDrug};
use formulary::{CatalogFile, DosingFile, InteractionsFile};
use rx_types::Route;
use std::path::Path;

pub(crate) const CATALOG_YAML: &str = include_str!("../reference/catalog.yaml");
pub(crate) const INTERACTIONS_YAML: &str = include_str!("../reference/interactions.yaml");
pub(crate) const DOSING_YAML: &str = include_str!("../reference/dosing.yaml");

pub(crate) fn reference_catalog() -> Catalog {
    Catalog::build(CatalogFile::parse(CATALOG_YAML).unwrap()).unwrap()
}

pub(crate) fn reference_rules() -> RuleStore {
    RuleStore::build(
        InteractionsFile::parse(INTERACTIONS_YAML).unwrap(),
        &reference_catalog(),
    )
    .unwrap()
}

pub(crate) fn reference_dosing() -> DosingTable {
    DosingTable::build(DosingFile::parse(DOSING_YAML).unwrap(), &reference_catalog()).unwrap()
}

pub(crate) fn reference_sources() -> ReferenceSources {
    ReferenceSources {
        catalog: CATALOG_YAML.into(),
        interactions: INTERACTIONS_YAML.into(),
        dosing: Some(DOSING_YAML.into()),
    }
}

pub(crate) fn reference_snapshot() -> ReferenceSnapshot {
    ReferenceSnapshot::build(&reference_sources(), 1).unwrap()
}

/// Write the bundled reference files into `dir`.
pub(crate) fn write_reference_dir(dir: &Path) {
    std::fs::write(dir.join(CatalogFile::NAME), CATALOG_YAML).unwrap();
    std::fs::write(dir.join(InteractionsFile::NAME), INTERACTIONS_YAML).unwrap();
    std::fs::write(dir.join(DosingFile::NAME), DOSING_YAML).unwrap();
}

pub(crate) fn resolved(
    catalog: &Catalog,
    index: usize,
    name: &str,
    dosage: Option<&str>,
) -> ResolvedDrug {
    resolve_mention(
        catalog,
        index,
        DrugMention {
            name: name.into(),
            dosage: dosage.map(Into::into),
            frequency: None,
            route: Route::Oral,
        },
    )
}

pub(crate) fn resolved_with(
    catalog: &Catalog,
    index: usize,
    name: &str,
    dosage: &str,
    frequency: &str,
) -> ResolvedDrug {
    resolve_mention(
        catalog,
        index,
        DrugMention {
            name: name.into(),
            dosage: Some(dosage.into()),
            frequency: Some(frequency.into()),
            route: Route::Oral,
        },
    )
}

fn resolve_mention(catalog: &Catalog, index: usize, mention: DrugMention) -> ResolvedDrug {
    let found = catalog
        .resolve(&mention.name, DEFAULT_FUZZY_MAX_DISTANCE)
        .unwrap_or_else(|| panic!("'{}' is not in the reference catalog", mention.name));
    let dose_quantity = mention
        .dosage
        .as_deref()
        .and_then(|d| catalog.normalise_dose(found.record, d));

    ResolvedDrug {
        index,
        drug_id: found.record.id.clone(),
        canonical_name: found.record.name.as_str().to_owned(),
        match_kind: found.kind,
        match_distance: found.distance,
        dose_quantity,
        dose_unit: Some(found.record.dose_unit.clone()),
        mention,
    }
}

pub(crate) fn patient(age: u32, weight_kg: f64, conditions: &[&str], allergies: &[&str]) -> Patient {
    Patient {
        age,
        weight_kg: (weight_kg > 0.0).then_some(weight_kg),
        conditions: conditions.iter().map(|c| c.to_string()).collect(),
        allergies: allergies.iter().map(|a| a.to_string()).collect(),
    }
}
