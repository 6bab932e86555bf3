pub mod source;
pub mod types;

pub use source::JsonLinesSource;
pub use types::*;
