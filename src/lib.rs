//! # repodex - repository unit indexing stage
//!
//! repodex takes a stream of repository units (one repository's files plus
//! the facts extracted from them) and publishes five index artifacts per
//! unit to durable storage, while keeping many concurrent workers inside a
//! shared budget of in-flight files.
//!
//! ## Architecture
//!
//! - [`unit`] - Unit and file record model, JSON-lines unit source
//! - [`admission`] - Shared in-flight file budget with a two-threshold gate
//! - [`index`] - Per-unit writer fanning records into five staging streams
//! - [`publish`] - Atomic placement into durable storage, residue cleanup
//! - [`pipeline`] - Worker loops over disjoint partitions of the unit stream
//! - [`config`] - JSON configuration with defaults
//!
//! ## Quick Start
//!
//! ```no_run
//! use repodex::config::PipelineConfig;
//! use repodex::pipeline::Pipeline;
//! use repodex::publish::LocalFsStorage;
//! use repodex::unit::JsonLinesSource;
//! use std::path::Path;
//!
//! let config = PipelineConfig::load_default()?;
//! let pipeline = Pipeline::new(config, LocalFsStorage::new());
//! let stats = pipeline.run(JsonLinesSource::open(Path::new("units.jsonl"))?)?;
//! stats.print_summary();
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Artifacts
//!
//! For unit `owner/repo` each kind lands at
//! `{base}/{language}/{kind}/owner~repo`, one JSON line per file:
//!
//! | kind | line |
//! |------|------|
//! | `tokens` | envelope around the searchable references |
//! | `meta` | envelope around the file metadata |
//! | `sources` | envelope around owner, repo, location and content |
//! | `comments` | envelope around the documentation comments |
//! | `typesinfo` | the type facts as-is |

pub mod admission;
pub mod config;
pub mod error;
pub mod index;
pub mod logging;
pub mod pipeline;
pub mod publish;
pub mod unit;
pub mod utils;
