//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. The intent is to avoid reading process-wide environment variables
//! during request handling, which can lead to inconsistent behaviour in multi-threaded runtimes
//! and test harnesses.

use crate::constants::{
    DEFAULT_FUZZY_MAX_DISTANCE, DEFAULT_MAX_DRUGS_PER_REQUEST, DEFAULT_REFERENCE_DIR,
    MAX_FUZZY_MAX_DISTANCE, MAX_MAX_DRUGS_PER_REQUEST,
};
use crate::{EngineError, EngineResult};
use formulary::{CatalogFile, DosingFile, InteractionsFile};
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    reference_dir: PathBuf,
    fuzzy_max_distance: u32,
    max_drugs_per_request: usize,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidInput` if the fuzzy distance or the per-request drug cap is
    /// out of range.
    pub fn new(
        reference_dir: PathBuf,
        fuzzy_max_distance: u32,
        max_drugs_per_request: usize,
    ) -> EngineResult<Self> {
        if fuzzy_max_distance > MAX_FUZZY_MAX_DISTANCE {
            return Err(EngineError::InvalidInput(format!(
                "fuzzy_max_distance must be at most {MAX_FUZZY_MAX_DISTANCE}"
            )));
        }

        if max_drugs_per_request == 0 || max_drugs_per_request > MAX_MAX_DRUGS_PER_REQUEST {
            return Err(EngineError::InvalidInput(format!(
                "max_drugs_per_request must be between 1 and {MAX_MAX_DRUGS_PER_REQUEST}"
            )));
        }

        Ok(Self {
            reference_dir,
            fuzzy_max_distance,
            max_drugs_per_request,
        })
    }

    /// Configuration with default limits for the given reference directory.
    pub fn with_reference_dir(reference_dir: PathBuf) -> Self {
        Self {
            reference_dir,
            fuzzy_max_distance: DEFAULT_FUZZY_MAX_DISTANCE,
            max_drugs_per_request: DEFAULT_MAX_DRUGS_PER_REQUEST,
        }
    }

    pub fn reference_dir(&self) -> &Path {
        &self.reference_dir
    }

    pub fn fuzzy_max_distance(&self) -> u32 {
        self.fuzzy_max_distance
    }

    pub fn max_drugs_per_request(&self) -> usize {
        self.max_drugs_per_request
    }
}

fn looks_like_reference_dir(path: &Path) -> bool {
    path.join(CatalogFile::NAME).is_file() && path.join(InteractionsFile::NAME).is_file()
}

/// Resolve the reference data directory without reading environment variables.
///
/// If `override_dir` is provided, it must be a directory containing `catalog.yaml` and
/// `interactions.yaml`. Otherwise this searches for `crates/core/reference/` relative to the
/// current working directory and then walks up from `CARGO_MANIFEST_DIR`.
pub fn resolve_reference_dir(override_dir: Option<PathBuf>) -> EngineResult<PathBuf> {
    if let Some(reference_dir) = override_dir {
        if reference_dir.is_dir() && looks_like_reference_dir(&reference_dir) {
            return Ok(reference_dir);
        }
        return Err(EngineError::InvalidInput(format!(
            "RXCHECK_REFERENCE_DIR override is not a valid reference directory (must contain {} and {})",
            CatalogFile::NAME,
            InteractionsFile::NAME
        )));
    }

    let cwd_relative = PathBuf::from(DEFAULT_REFERENCE_DIR);
    if cwd_relative.is_dir() && looks_like_reference_dir(&cwd_relative) {
        return Ok(cwd_relative);
    }

    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    for ancestor in manifest_dir.ancestors() {
        let candidate = ancestor.join(DEFAULT_REFERENCE_DIR);
        if candidate.is_dir() && looks_like_reference_dir(&candidate) {
            return Ok(candidate);
        }
    }

    Err(EngineError::InvalidInput(
        "could not locate reference/ directory with catalog.yaml and interactions.yaml".into(),
    ))
}

/// Validate that the resolved reference directory is safe to load.
///
/// Only the known reference files are read, but the whole directory is checked so that a
/// misconfigured override (for example `/`) is rejected at startup rather than on first reload.
pub fn validate_reference_dir_safe(reference_dir: &Path) -> EngineResult<()> {
    const MAX_FILES: usize = 64;
    const MAX_TOTAL_BYTES: u64 = 16 * 1024 * 1024; // 16 MiB

    if !looks_like_reference_dir(reference_dir) {
        return Err(EngineError::InvalidInput(format!(
            "reference directory must contain {} and {}",
            CatalogFile::NAME,
            InteractionsFile::NAME
        )));
    }

    let mut files = 0usize;
    let mut bytes = 0u64;

    for entry in std::fs::read_dir(reference_dir).map_err(EngineError::FileRead)? {
        let entry = entry.map_err(EngineError::FileRead)?;
        let entry_path = entry.path();
        let metadata = std::fs::symlink_metadata(&entry_path).map_err(EngineError::FileRead)?;
        let file_type = metadata.file_type();

        if file_type.is_symlink() {
            return Err(EngineError::InvalidInput(
                "reference directory must not contain symlinks".into(),
            ));
        }

        if file_type.is_dir() {
            continue;
        }

        if !file_type.is_file() {
            return Err(EngineError::InvalidInput(
                "reference directory contains unsupported file types (devices, fifos, sockets)"
                    .into(),
            ));
        }

        files = files.saturating_add(1);
        bytes = bytes.saturating_add(metadata.len());
        if files > MAX_FILES || bytes > MAX_TOTAL_BYTES {
            return Err(EngineError::InvalidInput(
                "reference directory exceeds maximum file count or total size".into(),
            ));
        }
    }

    let dosing = reference_dir.join(DosingFile::NAME);
    if dosing.exists() && !dosing.is_file() {
        return Err(EngineError::InvalidInput(format!(
            "{} must be a regular file",
            DosingFile::NAME
        )));
    }

    Ok(())
}

/// Parse the fuzzy match distance from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns the default distance.
pub fn fuzzy_max_distance_from_env_value(value: Option<String>) -> EngineResult<u32> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    let parsed = value
        .map(|v| {
            v.parse::<u32>().map_err(|_| {
                EngineError::InvalidInput(format!(
                    "RXCHECK_FUZZY_MAX_DISTANCE must be a non-negative integer (got '{v}')"
                ))
            })
        })
        .transpose()?;

    Ok(parsed.unwrap_or(DEFAULT_FUZZY_MAX_DISTANCE))
}

/// Parse the per-request drug cap from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns the default cap.
pub fn max_drugs_from_env_value(value: Option<String>) -> EngineResult<usize> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    let parsed = value
        .map(|v| {
            v.parse::<usize>().map_err(|_| {
                EngineError::InvalidInput(format!(
                    "RXCHECK_MAX_DRUGS must be a positive integer (got '{v}')"
                ))
            })
        })
        .transpose()?;

    Ok(parsed.unwrap_or(DEFAULT_MAX_DRUGS_PER_REQUEST))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_minimal_reference(dir: &Path) {
        std::fs::write(dir.join(CatalogFile::NAME), "drugs: []\n").unwrap();
        std::fs::write(dir.join(InteractionsFile::NAME), "{}\n").unwrap();
    }

    #[test]
    fn new_rejects_out_of_range_limits() {
        let dir = PathBuf::from("reference");
        assert!(CoreConfig::new(dir.clone(), MAX_FUZZY_MAX_DISTANCE + 1, 10).is_err());
        assert!(CoreConfig::new(dir.clone(), 2, 0).is_err());
        assert!(CoreConfig::new(dir, 2, 10).is_ok());
    }

    #[test]
    fn resolve_prefers_valid_override() {
        let temp = TempDir::new().unwrap();
        write_minimal_reference(temp.path());

        let resolved = resolve_reference_dir(Some(temp.path().to_path_buf())).unwrap();
        assert_eq!(resolved, temp.path());
    }

    #[test]
    fn resolve_rejects_override_without_files() {
        let temp = TempDir::new().unwrap();
        let err = resolve_reference_dir(Some(temp.path().to_path_buf()))
            .expect_err("empty dir should be rejected");
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[test]
    fn resolve_finds_bundled_reference() {
        let resolved = resolve_reference_dir(None).expect("bundled reference data");
        assert!(resolved.join(CatalogFile::NAME).is_file());
    }

    #[cfg(unix)]
    #[test]
    fn validate_rejects_symlinks() {
        let temp = TempDir::new().unwrap();
        write_minimal_reference(temp.path());
        std::os::unix::fs::symlink(
            temp.path().join(CatalogFile::NAME),
            temp.path().join("linked.yaml"),
        )
        .unwrap();

        let err = validate_reference_dir_safe(temp.path()).expect_err("symlink should fail");
        match err {
            EngineError::InvalidInput(msg) => assert!(msg.contains("symlinks"), "{msg}"),
            other => panic!("expected InvalidInput, got {other:?}"),
        }
    }

    #[test]
    fn validate_accepts_minimal_reference() {
        let temp = TempDir::new().unwrap();
        write_minimal_reference(temp.path());
        validate_reference_dir_safe(temp.path()).expect("minimal reference is valid");
    }

    #[test]
    fn env_value_parsers_default_and_validate() {
        assert_eq!(fuzzy_max_distance_from_env_value(None).unwrap(), 2);
        assert_eq!(fuzzy_max_distance_from_env_value(Some(" ".into())).unwrap(), 2);
        assert_eq!(fuzzy_max_distance_from_env_value(Some("1".into())).unwrap(), 1);
        assert!(fuzzy_max_distance_from_env_value(Some("two".into())).is_err());

        assert_eq!(max_drugs_from_env_value(None).unwrap(), 50);
        assert_eq!(max_drugs_from_env_value(Some("20".into())).unwrap(), 20);
        assert!(max_drugs_from_env_value(Some("-3".into())).is_err());
    }
}
