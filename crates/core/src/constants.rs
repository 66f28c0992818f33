//! Constants used throughout the rxcheck core crate.

/// Default reference data directory, relative to the workspace root.
pub const DEFAULT_REFERENCE_DIR: &str = "crates/core/reference";

/// Default maximum Levenshtein distance accepted by fuzzy name matching.
pub const DEFAULT_FUZZY_MAX_DISTANCE: u32 = 2;

/// Upper bound on a configured fuzzy distance.
pub const MAX_FUZZY_MAX_DISTANCE: u32 = 5;

/// Queries (and candidate names) shorter than this never match fuzzily.
pub const MIN_FUZZY_QUERY_LEN: usize = 4;

/// Default cap on distinct drug mentions per request.
pub const DEFAULT_MAX_DRUGS_PER_REQUEST: usize = 50;

/// Upper bound on a configured per-request drug cap.
pub const MAX_MAX_DRUGS_PER_REQUEST: usize = 1_000;

/// Longest catalog phrase (in words) the extractor tries to match.
pub const MAX_NAME_WORDS: usize = 3;

/// Oldest plausible patient age in years.
pub const MAX_PATIENT_AGE: i64 = 150;

/// Heaviest plausible patient weight in kilograms.
pub const MAX_PATIENT_WEIGHT_KG: f64 = 700.0;
