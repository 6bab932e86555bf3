//! Error types for the indexing stage
//!
//! Only [`AdmissionError`] ever stops a worker. Writer and publish failures
//! are scoped to one unit or one artifact and end up as outcomes.

use crate::index::types::IndexKind;
use crate::unit::UnitKey;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A unit identity that cannot be used as a path component
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitKeyError {
    #[error("{field} is empty")]
    Empty { field: &'static str },

    #[error("{field} {value:?} is a relative path component")]
    RelativeComponent { field: &'static str, value: String },

    #[error("{field} {value:?} contains reserved character {ch:?}")]
    ReservedChar {
        field: &'static str,
        value: String,
        ch: char,
    },
}

#[derive(Debug, Error)]
pub enum AdmissionError {
    /// A release would have driven the aggregate below zero
    #[error("admission counter violation: releasing {requested} with aggregate {aggregate}")]
    Violation { requested: u64, aggregate: u64 },
}

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("failed to create {kind} staging artifact for {unit} at {}", path.display())]
    Stage {
        unit: UnitKey,
        kind: IndexKind,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to append record {index} to {kind} artifact for {unit}")]
    Append {
        unit: UnitKey,
        kind: IndexKind,
        index: usize,
        #[source]
        source: io::Error,
    },

    #[error("failed to flush {kind} artifact for {unit}")]
    Flush {
        unit: UnitKey,
        kind: IndexKind,
        #[source]
        source: io::Error,
    },
}

impl WriterError {
    pub fn kind(&self) -> IndexKind {
        match self {
            WriterError::Stage { kind, .. }
            | WriterError::Append { kind, .. }
            | WriterError::Flush { kind, .. } => *kind,
        }
    }
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to move {kind} artifact to {}", durable.display())]
    Move {
        kind: IndexKind,
        durable: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error("worker thread {0} panicked")]
    WorkerPanicked(usize),

    #[error("failed to spawn worker thread")]
    Spawn(#[source] io::Error),
}
