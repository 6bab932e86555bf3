use crate::pipeline::worker::UnitOutcome;
use serde::Serialize;
use std::time::Duration;

/// Counters for a pipeline run, merged across workers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub units_done: usize,
    pub units_skipped: usize,
    /// Units whose owner or repository name is unusable in paths
    pub units_rejected: usize,
    pub units_failed: usize,
    /// Units whose publish left at least one artifact behind
    pub units_partially_published: usize,
    pub files_written: usize,
    pub artifacts_published: usize,
    pub publish_failures: usize,
    #[serde(skip)]
    pub admission_wait: Duration,
}

impl PipelineStats {
    pub fn units_seen(&self) -> usize {
        self.units_done + self.units_skipped + self.units_rejected + self.units_failed
    }

    pub fn record(&mut self, outcome: &UnitOutcome) {
        match outcome {
            UnitOutcome::Skipped { .. } => self.units_skipped += 1,
            UnitOutcome::Rejected { .. } => self.units_rejected += 1,
            UnitOutcome::Failed { waited, .. } => {
                self.units_failed += 1;
                self.admission_wait += *waited;
            }
            UnitOutcome::Done {
                records,
                waited,
                report,
                ..
            } => {
                self.units_done += 1;
                self.files_written += records;
                self.artifacts_published += report.published.len();
                self.publish_failures += report.failures.len();
                if !report.is_complete() {
                    self.units_partially_published += 1;
                }
                self.admission_wait += *waited;
            }
        }
    }

    pub fn merge(&mut self, other: &PipelineStats) {
        self.units_done += other.units_done;
        self.units_skipped += other.units_skipped;
        self.units_rejected += other.units_rejected;
        self.units_failed += other.units_failed;
        self.units_partially_published += other.units_partially_published;
        self.files_written += other.files_written;
        self.artifacts_published += other.artifacts_published;
        self.publish_failures += other.publish_failures;
        self.admission_wait += other.admission_wait;
    }

    /// Display run statistics
    pub fn print_summary(&self) {
        println!("Pipeline Statistics");
        println!("===================");
        println!();
        println!("Units seen:          {}", self.units_seen());
        println!("Units published:     {}", self.units_done);
        println!("Units skipped:       {}", self.units_skipped);
        if self.units_rejected > 0 {
            println!("Units rejected:      {}", self.units_rejected);
        }
        println!("Units failed:        {}", self.units_failed);
        if self.units_partially_published > 0 {
            println!("  partially published: {}", self.units_partially_published);
        }
        println!();
        println!("Files written:       {}", self.files_written);
        println!("Artifacts published: {}", self.artifacts_published);
        println!("Publish failures:    {}", self.publish_failures);
        println!("Admission wait:      {}", format_duration(self.admission_wait));
    }
}

/// Format a duration for humans
fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}
