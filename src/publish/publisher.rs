use crate::error::PublishError;
use crate::index::{IndexKind, StagedArtifacts};
use crate::publish::storage::DurableStorage;
use crate::unit::UnitKey;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{error, warn};

/// Per-artifact outcome of publishing one unit
#[derive(Debug)]
pub struct PublishReport {
    pub unit: UnitKey,
    pub published: Vec<(IndexKind, PathBuf)>,
    pub failures: Vec<PublishError>,
}

impl PublishReport {
    /// All five artifacts reached durable storage
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Moves staged artifacts into durable storage and clears local residue
pub struct Publisher<S> {
    storage: S,
    base_path: PathBuf,
    language: String,
}

impl<S: DurableStorage> Publisher<S> {
    pub fn new(storage: S, base_path: &Path, language: &str) -> Self {
        Self {
            storage,
            base_path: base_path.to_path_buf(),
            language: language.to_string(),
        }
    }

    pub fn durable_path(&self, unit: &UnitKey, kind: IndexKind) -> PathBuf {
        unit.durable_path(&self.base_path, &self.language, kind)
    }

    /// Publish all five artifacts of a unit.
    ///
    /// Moves are independent: a failed artifact is reported and the others
    /// still go through. Already moved artifacts are not rolled back. Local
    /// residue (the staging directory and `workdir`) is removed afterwards
    /// in every case.
    pub fn publish(&self, staged: StagedArtifacts, workdir: Option<&Path>) -> PublishReport {
        let unit = staged.unit().clone();

        let outcomes: Vec<(IndexKind, Result<PathBuf, PublishError>)> = IndexKind::ALL
            .par_iter()
            .map(|&kind| {
                let local = staged.path(kind);
                let durable = self.durable_path(&unit, kind);
                let result = self
                    .storage
                    .move_local_file_to(&local, &durable)
                    .map(|()| durable.clone())
                    .map_err(|source| PublishError::Move {
                        kind,
                        durable,
                        source,
                    });
                (kind, result)
            })
            .collect();

        let mut published = Vec::new();
        let mut failures = Vec::new();
        for (kind, result) in outcomes {
            match result {
                Ok(path) => published.push((kind, path)),
                Err(e) => {
                    error!(unit = %unit, kind = %kind, error = %e, "Failed to publish artifact");
                    failures.push(e);
                }
            }
        }

        self.remove_residue(&unit, std::iter::once(staged.dir()).chain(workdir));

        PublishReport {
            unit,
            published,
            failures,
        }
    }

    /// Best-effort removal of a unit's local working directories
    pub fn remove_residue<'p>(&self, unit: &UnitKey, paths: impl IntoIterator<Item = &'p Path>) {
        for path in paths {
            if let Err(e) = self.storage.recursive_delete(path) {
                warn!(unit = %unit, path = %path.display(), error = %e, "Failed to remove local residue");
            }
        }
    }
}
