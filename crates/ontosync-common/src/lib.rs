//! ontosync Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types and utilities for the ontosync workspace.
//!
//! # Overview
//!
//! - **Types**: the replicated data model (codes, ontologies), the remote
//!   manifest and the version records exchanged with the backend
//! - **Logging**: `tracing` subscriber setup shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use ontosync_common::types::StoredVersion;
//!
//! let stored = StoredVersion::new("1.2-stable", "abc123");
//! assert_eq!(stored.channel(), "stable");
//! ```

pub mod logging;
pub mod types;

// Re-export commonly used types
pub use types::{BackendStatus, Code, CodeId, Manifest, ManifestEntry, Ontology, StoredVersion};
