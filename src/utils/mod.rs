//! Utility functions shared by the CLI.
//!
//! - [`progress`] - Progress display that compiles away without the
//!   `progress` feature

pub mod progress;

pub use progress::unit_progress;
