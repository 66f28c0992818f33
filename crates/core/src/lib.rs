//! # rxcheck core
//!
//! Drug interaction detection engine.
//!
//! This crate contains the pure engine and the reference data it runs on:
//! - Drug catalog with exact, synonym and fuzzy name resolution
//! - Entity extraction of drug mentions from clinical free text
//! - Interaction rule store (drug-drug, drug-condition, drug-allergy)
//! - Interaction checker, dosage assessment and comprehensive analysis
//! - Immutable reference snapshots with copy-on-write reload
//!
//! **No transport concerns**: HTTP servers, authentication and command line handling belong in
//! `api-rest`, `api-shared` and `cli`.

pub mod analyzer;
pub mod catalog;
pub mod checker;
pub mod config;
pub mod constants;
pub mod dosage;
pub mod error;
pub mod extractor;
pub mod rules;
pub mod service;
pub mod snapshot;
pub mod validation;

#[cfg(test)]
mod test_support;

pub use catalog::Catalog;
pub use config::{
    fuzzy_max_distance_from_env_value, max_drugs_from_env_value, resolve_reference_dir,
    validate_reference_dir_safe, CoreConfig,
};
pub use error::{EngineError, EngineResult};
pub use rules::RuleStore;
pub use service::DrugSafetyService;
pub use snapshot::{ReferenceSnapshot, ReferenceSources, ReferenceStore};
pub use validation::{validate_profile, Patient};
