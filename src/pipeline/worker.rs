//! Worker loop
//!
//! A worker drives its partition one unit at a time:
//!
//! ```text
//! PENDING ─► ADMITTED ─► WRITTEN ─► PUBLISHED ─► RELEASED
//!    │           │
//!    ▼           ▼
//! SKIPPED     FAILED
//! ```
//!
//! Every transition is logged at `debug`. The admission reservation taken on
//! entry to ADMITTED is released exactly once, whether the unit ends RELEASED
//! or FAILED. Skipped units, including those whose key is not a valid path
//! component, never reserve.

use crate::admission::AdmissionController;
use crate::error::{PipelineError, UnitKeyError, WriterError};
use crate::index::UnitIndexWriter;
use crate::pipeline::stats::PipelineStats;
use crate::publish::{DurableStorage, PublishReport, Publisher};
use crate::unit::{RepositoryUnit, UnitKey};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Lifecycle state of a unit inside a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Pending,
    Admitted,
    Written,
    Published,
    Released,
    Skipped,
    Failed,
}

impl UnitState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UnitState::Released | UnitState::Skipped | UnitState::Failed)
    }
}

/// How a unit left the worker
#[derive(Debug)]
pub enum UnitOutcome {
    /// Over the per-unit file cap; nothing reserved, nothing produced
    Skipped { unit: UnitKey, files: usize },

    /// Owner or repository name unusable in paths; nothing reserved or touched
    Rejected { unit: UnitKey, reason: UnitKeyError },

    /// Writing failed; staging discarded, reservation released
    Failed {
        unit: UnitKey,
        files: usize,
        waited: Duration,
        error: WriterError,
    },

    /// Written, published (possibly partially) and released
    Done {
        unit: UnitKey,
        records: usize,
        waited: Duration,
        report: PublishReport,
    },
}

impl UnitOutcome {
    pub fn unit(&self) -> &UnitKey {
        match self {
            UnitOutcome::Skipped { unit, .. }
            | UnitOutcome::Rejected { unit, .. }
            | UnitOutcome::Failed { unit, .. }
            | UnitOutcome::Done { unit, .. } => unit,
        }
    }

    /// Terminal state the unit reached
    pub fn state(&self) -> UnitState {
        match self {
            UnitOutcome::Skipped { .. } | UnitOutcome::Rejected { .. } => UnitState::Skipped,
            UnitOutcome::Failed { .. } => UnitState::Failed,
            UnitOutcome::Done { .. } => UnitState::Released,
        }
    }
}

/// One worker loop over a partition of units
pub struct Worker<'a, S> {
    id: usize,
    admission: &'a AdmissionController,
    writer: &'a UnitIndexWriter,
    publisher: &'a Publisher<S>,
    max_files_per_unit: usize,
}

impl<'a, S: DurableStorage> Worker<'a, S> {
    pub fn new(
        id: usize,
        admission: &'a AdmissionController,
        writer: &'a UnitIndexWriter,
        publisher: &'a Publisher<S>,
        max_files_per_unit: usize,
    ) -> Self {
        Self {
            id,
            admission,
            writer,
            publisher,
            max_files_per_unit,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Process every unit of the partition in order.
    ///
    /// Only an admission violation stops the loop; unit-level failures are
    /// recorded and the loop moves on.
    pub fn run<I, F>(&self, units: I, on_outcome: F) -> Result<PipelineStats, PipelineError>
    where
        I: IntoIterator<Item = RepositoryUnit>,
        F: Fn(&UnitOutcome),
    {
        let mut stats = PipelineStats::default();

        for unit in units {
            let outcome = self.process(unit)?;
            stats.record(&outcome);
            on_outcome(&outcome);
        }

        info!(
            worker = self.id,
            done = stats.units_done,
            skipped = stats.units_skipped,
            failed = stats.units_failed,
            "Worker finished partition"
        );
        Ok(stats)
    }

    /// Drive a single unit through its lifecycle
    pub fn process(&self, mut unit: RepositoryUnit) -> Result<UnitOutcome, PipelineError> {
        let key = unit.key();
        let files = unit.file_count();
        self.enter(&key, UnitState::Pending);

        if let Err(reason) = key.validate() {
            warn!(worker = self.id, unit = %key, error = %reason, "Rejecting unit with unusable key");
            self.enter(&key, UnitState::Skipped);
            return Ok(UnitOutcome::Rejected { unit: key, reason });
        }

        if files > self.max_files_per_unit {
            info!(
                worker = self.id,
                unit = %key,
                files,
                cap = self.max_files_per_unit,
                "Skipping unit over file cap"
            );
            self.enter(&key, UnitState::Skipped);
            return Ok(UnitOutcome::Skipped { unit: key, files });
        }

        info!(worker = self.id, unit = %key, files, "Processing unit");

        let reservation = self.admission.admit(files as u64, &key);
        let waited = reservation.waited();
        self.enter(&key, UnitState::Admitted);
        let workdir = unit.workdir.take();

        let outcome = match self.writer.write(unit) {
            Ok(staged) => {
                self.enter(&key, UnitState::Written);
                let records = staged.records();
                let report = self.publisher.publish(staged, workdir.as_deref());
                self.enter(&key, UnitState::Published);
                if !report.is_complete() {
                    warn!(
                        worker = self.id,
                        unit = %key,
                        failed = report.failures.len(),
                        "Unit published with missing artifacts"
                    );
                }
                UnitOutcome::Done {
                    unit: key.clone(),
                    records,
                    waited,
                    report,
                }
            }
            Err(e) => {
                error!(worker = self.id, unit = %key, error = %e, "Failed to write unit");
                self.publisher.remove_residue(&key, workdir.as_deref());
                UnitOutcome::Failed {
                    unit: key.clone(),
                    files,
                    waited,
                    error: e,
                }
            }
        };

        reservation.release()?;
        self.enter(&key, outcome.state());

        if let UnitOutcome::Done { records, report, .. } = &outcome {
            info!(
                worker = self.id,
                unit = %key,
                records,
                published = report.published.len(),
                waited_ms = waited.as_millis() as u64,
                "Unit done"
            );
        }

        Ok(outcome)
    }

    fn enter(&self, key: &UnitKey, state: UnitState) {
        debug!(worker = self.id, unit = %key, state = ?state, "Unit state");
    }
}
