//! CLI command implementations
//!
//! Each subcommand has its own module with a `run` function.

pub mod check;
pub mod reset;
pub mod status;
pub mod sync;
pub mod version;
