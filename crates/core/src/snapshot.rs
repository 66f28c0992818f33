//! Reference snapshots and the store that swaps them.
//!
//! A snapshot bundles the catalog, rule store and optional dosing table built from one read of
//! the reference directory. Snapshots are immutable. `ReferenceStore` holds the current one
//! behind an `RwLock<Arc<_>>`; the lock is only held to clone or replace the pointer, so a
//! request that grabbed a snapshot keeps seeing it even if a reload completes mid-request.

use crate::catalog::Catalog;
use crate::config::validate_reference_dir_safe;
use crate::dosage::DosingTable;
use crate::rules::RuleStore;
use crate::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use formulary::{CatalogFile, DosingFile, InteractionsFile};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

/// Raw contents of a reference directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReferenceSources {
    pub catalog: String,
    pub interactions: String,
    /// `None` when the directory has no dosing file.
    pub dosing: Option<String>,
}

impl ReferenceSources {
    /// Read the reference files from `dir`.
    pub fn read_dir(dir: &Path) -> EngineResult<Self> {
        let read = |name: &str| std::fs::read_to_string(dir.join(name)).map_err(EngineError::FileRead);

        let dosing_path = dir.join(DosingFile::NAME);
        let dosing = if dosing_path.is_file() {
            Some(read(DosingFile::NAME)?)
        } else {
            None
        };

        Ok(Self {
            catalog: read(CatalogFile::NAME)?,
            interactions: read(InteractionsFile::NAME)?,
            dosing,
        })
    }

    /// SHA-256 over the three files, hex encoded.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (name, body) in [
            (CatalogFile::NAME, Some(self.catalog.as_str())),
            (InteractionsFile::NAME, Some(self.interactions.as_str())),
            (DosingFile::NAME, self.dosing.as_deref()),
        ] {
            hasher.update(name.as_bytes());
            hasher.update([0u8]);
            if let Some(body) = body {
                hasher.update((body.len() as u64).to_be_bytes());
                hasher.update(body.as_bytes());
            }
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }
}

/// One consistent, immutable view of the reference data.
#[derive(Debug)]
pub struct ReferenceSnapshot {
    catalog: Catalog,
    rules: RuleStore,
    dosing: Option<DosingTable>,
    version: u64,
    fingerprint: String,
    loaded_at: DateTime<Utc>,
}

impl ReferenceSnapshot {
    /// Parse and cross-validate `sources` into a snapshot.
    ///
    /// # Errors
    ///
    /// Returns an `EngineError` if any file fails to parse, or the rules or dosing table
    /// reference unknown drugs or conflict with each other.
    pub fn build(sources: &ReferenceSources, version: u64) -> EngineResult<Self> {
        let catalog = Catalog::build(CatalogFile::parse(&sources.catalog)?)?;
        let rules = RuleStore::build(InteractionsFile::parse(&sources.interactions)?, &catalog)?;
        let dosing = sources
            .dosing
            .as_deref()
            .map(|yaml| -> EngineResult<DosingTable> {
                DosingTable::build(DosingFile::parse(yaml)?, &catalog)
            })
            .transpose()?;

        Ok(Self {
            catalog,
            rules,
            dosing,
            version,
            fingerprint: sources.fingerprint(),
            loaded_at: Utc::now(),
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn rules(&self) -> &RuleStore {
        &self.rules
    }

    pub fn dosing(&self) -> Option<&DosingTable> {
        self.dosing.as_ref()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

/// Process-wide holder of the current reference snapshot.
#[derive(Debug)]
pub struct ReferenceStore {
    reference_dir: PathBuf,
    current: RwLock<Arc<ReferenceSnapshot>>,
    // Serialises reloads so versions are published in order.
    reload_lock: Mutex<()>,
}

impl ReferenceStore {
    /// Validate `reference_dir`, load it, and publish the result as version 1.
    pub fn open(reference_dir: PathBuf) -> EngineResult<Self> {
        validate_reference_dir_safe(&reference_dir)?;
        let sources = ReferenceSources::read_dir(&reference_dir)?;
        let snapshot = ReferenceSnapshot::build(&sources, 1)?;

        tracing::info!(
            "reference data v{} loaded from {} ({} drugs, {} pair rules, fingerprint {})",
            snapshot.version(),
            reference_dir.display(),
            snapshot.catalog().len(),
            snapshot.rules().pair_count(),
            snapshot.fingerprint()
        );
        if snapshot.dosing().is_none() {
            tracing::warn!(
                "no {} in {}; dosage checks will be degraded",
                DosingFile::NAME,
                reference_dir.display()
            );
        }

        Ok(Self::from_snapshot(reference_dir, snapshot))
    }

    /// Wrap an already built snapshot. Reloads read from `reference_dir`.
    pub fn from_snapshot(reference_dir: PathBuf, snapshot: ReferenceSnapshot) -> Self {
        Self {
            reference_dir,
            current: RwLock::new(Arc::new(snapshot)),
            reload_lock: Mutex::new(()),
        }
    }

    pub fn reference_dir(&self) -> &Path {
        &self.reference_dir
    }

    /// The snapshot serving new requests.
    pub fn current(&self) -> Arc<ReferenceSnapshot> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Re-read the reference directory and publish a new snapshot.
    ///
    /// The new snapshot is fully built before it is swapped in. On failure the previous
    /// snapshot stays current and the error is returned.
    pub fn reload(&self) -> EngineResult<Arc<ReferenceSnapshot>> {
        let _serial = self.reload_lock.lock().unwrap_or_else(|e| e.into_inner());
        let next_version = self.current().version() + 1;

        let built = validate_reference_dir_safe(&self.reference_dir)
            .and_then(|()| ReferenceSources::read_dir(&self.reference_dir))
            .and_then(|sources| ReferenceSnapshot::build(&sources, next_version));

        let snapshot = match built {
            Ok(snapshot) => Arc::new(snapshot),
            Err(e) => {
                tracing::warn!("reference reload failed, keeping current snapshot: {e}");
                return Err(e);
            }
        };

        {
            let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
            *guard = Arc::clone(&snapshot);
        }

        tracing::info!(
            "reference data v{} published (fingerprint {})",
            snapshot.version(),
            snapshot.fingerprint()
        );
        Ok(snapshot)
    }
}
