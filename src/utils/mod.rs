//! Utility functions module
//!
//! Output formatting shared by the CLI commands.

pub mod format;

pub use format::*;
