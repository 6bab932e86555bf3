//! Admission control over the shared in-flight file budget
//!
//! Every worker reserves its unit's file count before staging anything and
//! releases it once the unit is published or has failed. The gate only
//! engages once the aggregate is above the low-water mark, so a cold system
//! admits even oversized units straight away.
//!
//! Waiting is a poll with a fixed backoff rather than a wake-up: admission
//! events are rare next to the backoff interval, and each failed poll is
//! logged with the aggregate so stalled workers are visible.

use crate::error::AdmissionError;
use crate::unit::UnitKey;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Thresholds for the admission gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Hard ceiling on the aggregate once the gate is engaged
    #[serde(default = "default_ceiling")]
    pub ceiling: u64,

    /// The gate only engages while the aggregate is above this mark
    #[serde(default = "default_low_water_mark")]
    pub low_water_mark: u64,

    /// Sleep between admission checks, in milliseconds
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_ceiling() -> u64 {
    25_000
}

fn default_low_water_mark() -> u64 {
    1_000
}

fn default_backoff_ms() -> u64 {
    10_000
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            ceiling: default_ceiling(),
            low_water_mark: default_low_water_mark(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl AdmissionConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// Shared counter of files reserved by in-flight units
#[derive(Debug)]
pub struct AdmissionController {
    config: AdmissionConfig,
    aggregate: AtomicU64,
}

impl AdmissionController {
    pub fn new(config: AdmissionConfig) -> Self {
        Self {
            config,
            aggregate: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Current aggregate of reserved files
    pub fn aggregate(&self) -> u64 {
        self.aggregate.load(Ordering::SeqCst)
    }

    /// Whether admitting `requested` on top of `aggregate` must wait
    fn must_wait(&self, aggregate: u64, requested: u64) -> bool {
        aggregate.saturating_add(requested) > self.config.ceiling
            && aggregate > self.config.low_water_mark
    }

    /// Check and add in one atomic step. Returns false if the gate is closed.
    pub fn try_reserve(&self, requested: u64) -> bool {
        self.aggregate
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                if self.must_wait(current, requested) {
                    None
                } else {
                    Some(current + requested)
                }
            })
            .is_ok()
    }

    /// Block until `requested` files can be admitted, then reserve them.
    ///
    /// Returns how long the caller waited.
    pub fn reserve(&self, requested: u64, unit: &UnitKey) -> Duration {
        let start = Instant::now();

        while !self.try_reserve(requested) {
            info!(
                unit = %unit,
                requested,
                aggregate = self.aggregate(),
                ceiling = self.config.ceiling,
                "Admission blocked, waiting for in-flight files to drain"
            );
            thread::sleep(self.config.backoff());
        }

        let waited = start.elapsed();
        debug!(unit = %unit, requested, aggregate = self.aggregate(), "Admitted");
        waited
    }

    /// Return `released` files to the budget.
    ///
    /// Fails without touching the counter if that would take it below zero.
    pub fn release(&self, released: u64) -> Result<(), AdmissionError> {
        self.aggregate
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                current.checked_sub(released)
            })
            .map(|_| ())
            .map_err(|aggregate| {
                error!(released, aggregate, "Admission release exceeds reserved files");
                AdmissionError::Violation {
                    requested: released,
                    aggregate,
                }
            })
    }

    /// Reserve `requested` files and hand back a guard that releases them
    pub fn admit(&self, requested: u64, unit: &UnitKey) -> Reservation<'_> {
        let waited = self.reserve(requested, unit);
        Reservation {
            controller: self,
            files: requested,
            waited,
            released: false,
        }
    }
}

/// A held admission reservation.
///
/// Released exactly once: explicitly through [`Reservation::release`], or on
/// drop for any path that never got there.
#[derive(Debug)]
pub struct Reservation<'a> {
    controller: &'a AdmissionController,
    files: u64,
    waited: Duration,
    released: bool,
}

impl Reservation<'_> {
    pub fn files(&self) -> u64 {
        self.files
    }

    /// Time spent blocked before admission
    pub fn waited(&self) -> Duration {
        self.waited
    }

    pub fn release(mut self) -> Result<(), AdmissionError> {
        self.released = true;
        self.controller.release(self.files)
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            // Violation is already logged by the controller
            let _ = self.controller.release(self.files);
        }
    }
}
