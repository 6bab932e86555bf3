//! Publishing staged artifacts to durable storage
//!
//! Durable objects live at `{base}/{language}/{kind}/{owner}~{repo}` and are
//! placed by rename so readers only ever see complete files. Publishing the
//! same unit again replaces the previous objects.

pub mod publisher;
pub mod storage;

pub use publisher::{PublishReport, Publisher};
pub use storage::{DurableStorage, LocalFsStorage};
