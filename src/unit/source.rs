//! Unit sources
//!
//! Upstream collaborators hand units over as an iterator of already
//! filtered, fully populated [`RepositoryUnit`] values. The JSON-lines
//! source below is the on-disk form of that hand-off: one unit per line.

use crate::unit::types::RepositoryUnit;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{error, warn};

/// Reads one [`RepositoryUnit`] per line of JSON.
///
/// Blank lines are ignored. Lines that fail to parse are logged and skipped
/// since validating units is the supplier's job. A read error ends the stream.
pub struct JsonLinesSource<R> {
    reader: R,
    line_number: usize,
    buf: String,
}

impl JsonLinesSource<BufReader<File>> {
    /// Open a JSON-lines file of units
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open unit file {}", path.display()))?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_number: 0,
            buf: String::new(),
        }
    }
}

impl<R: BufRead> Iterator for JsonLinesSource<R> {
    type Item = RepositoryUnit;

    fn next(&mut self) -> Option<RepositoryUnit> {
        loop {
            self.buf.clear();
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => {
                    error!(line = self.line_number + 1, error = %e, "Failed to read unit stream");
                    return None;
                }
            }
            self.line_number += 1;

            let line = self.buf.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<RepositoryUnit>(line) {
                Ok(unit) => return Some(unit),
                Err(e) => {
                    warn!(line = self.line_number, error = %e, "Skipping malformed unit");
                }
            }
        }
    }
}
