pub mod types;
pub mod writer;

pub use types::*;
pub use writer::{StagedArtifacts, UnitIndexWriter, append_records};
