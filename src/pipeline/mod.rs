//! Concurrent pipeline over a stream of units
//!
//! ```text
//!                  ┌─► worker 0 ─┐
//! units ─► feeder ─┼─► worker 1 ─┼─► admission ─► writer ─► publisher
//!   (round robin)  └─► worker N ─┘   (shared)
//! ```
//!
//! Unit `i` of the stream belongs to partition `i % N`, so no two workers
//! ever see the same unit. Each partition is fed through a rendezvous-sized
//! channel, keeping at most one queued unit per worker in memory. The
//! admission counter is the only state the workers share.

pub mod stats;
pub mod worker;

pub use stats::PipelineStats;
pub use worker::{UnitOutcome, UnitState, Worker};

use crate::admission::AdmissionController;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::index::UnitIndexWriter;
use crate::publish::{DurableStorage, Publisher};
use crate::unit::RepositoryUnit;
use std::sync::mpsc;
use std::thread;
use tracing::{debug, error, info};

/// Queued units per worker partition
const PARTITION_BUFFER: usize = 1;

/// The admission controller, writer and publisher shared by all workers
pub struct Pipeline<S> {
    config: PipelineConfig,
    admission: AdmissionController,
    writer: UnitIndexWriter,
    publisher: Publisher<S>,
}

impl<S: DurableStorage> Pipeline<S> {
    pub fn new(config: PipelineConfig, storage: S) -> Self {
        let admission = AdmissionController::new(config.admission.clone());
        let writer = UnitIndexWriter::new(&config.staging_root, &config.language);
        let publisher = Publisher::new(storage, &config.base_path, &config.language);

        Self {
            config,
            admission,
            writer,
            publisher,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    pub fn publisher(&self) -> &Publisher<S> {
        &self.publisher
    }

    /// Run all units to completion
    pub fn run<I>(&self, units: I) -> Result<PipelineStats, PipelineError>
    where
        I: IntoIterator<Item = RepositoryUnit>,
    {
        self.run_with(units, |_| {})
    }

    /// Run all units, calling `on_outcome` from the worker threads as each
    /// unit finishes.
    pub fn run_with<I, F>(&self, units: I, on_outcome: F) -> Result<PipelineStats, PipelineError>
    where
        I: IntoIterator<Item = RepositoryUnit>,
        F: Fn(&UnitOutcome) + Sync,
    {
        let workers = self.config.effective_workers();
        info!(
            workers,
            ceiling = self.config.admission.ceiling,
            low_water_mark = self.config.admission.low_water_mark,
            "Starting pipeline"
        );

        let on_outcome = &on_outcome;

        thread::scope(|scope| {
            let mut senders = Vec::with_capacity(workers);
            let mut handles = Vec::with_capacity(workers);

            for id in 0..workers {
                let (tx, rx) = mpsc::sync_channel::<RepositoryUnit>(PARTITION_BUFFER);
                let worker = Worker::new(
                    id,
                    &self.admission,
                    &self.writer,
                    &self.publisher,
                    self.config.max_files_per_unit,
                );

                let handle = thread::Builder::new()
                    .name(format!("repodex-worker-{}", id))
                    .spawn_scoped(scope, move || worker.run(rx, on_outcome))
                    .map_err(PipelineError::Spawn)?;

                senders.push(tx);
                handles.push(handle);
            }

            for (index, unit) in units.into_iter().enumerate() {
                let partition = index % workers;
                if senders[partition].send(unit).is_err() {
                    // The worker stopped on a fatal error; stop feeding everyone.
                    error!(worker = partition, "Worker exited early, stopping unit feed");
                    break;
                }
            }
            drop(senders);

            let mut total = PipelineStats::default();
            let mut first_error = None;

            for (id, handle) in handles.into_iter().enumerate() {
                match handle.join() {
                    Ok(Ok(stats)) => total.merge(&stats),
                    Ok(Err(e)) => {
                        error!(worker = id, error = %e, "Worker failed");
                        first_error.get_or_insert(e);
                    }
                    Err(_) => {
                        first_error.get_or_insert(PipelineError::WorkerPanicked(id));
                    }
                }
            }

            if let Some(e) = first_error {
                return Err(e);
            }

            debug!(aggregate = self.admission.aggregate(), "All workers joined");
            info!(
                done = total.units_done,
                skipped = total.units_skipped,
                rejected = total.units_rejected,
                failed = total.units_failed,
                "Pipeline finished"
            );
            Ok(total)
        })
    }
}
