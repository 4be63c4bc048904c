//! Common types used across ontosync

use serde::{Deserialize, Serialize};

/// Identifier of a [`Code`], unique within the local store.
pub type CodeId = i64;

/// Separator between a backend version and its release channel
/// (`"1.3-beta"` is version `1.3` on channel `beta`).
pub const CHANNEL_SEPARATOR: char = '-';

// ============================================================================
// Replicated Data Model
// ============================================================================

/// A single coded reference-data entry.
///
/// Codes are only created by the sync engine and never mutated in place; a
/// full clear of the coded-data store is the only way they disappear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Code {
    /// Identifier, unique across all ontologies
    pub id: CodeId,

    /// Name of the owning ontology
    pub ontology_id: String,

    /// Ancestor identifiers from the root down to this code (inclusive)
    pub path: Vec<CodeId>,

    /// The code string itself (e.g. "E11.9" or "008")
    pub code: String,

    /// Free-text description
    #[serde(default)]
    pub description: Option<String>,
}

impl Code {
    /// Whether this code sits at the top of its ontology's hierarchy.
    pub fn is_root(&self) -> bool {
        self.path.len() == 1
    }
}

/// Aggregate summarizing one ingested shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ontology {
    /// Ontology name, equal to the `ontology_id` of its codes
    pub name: String,

    /// Root code identifiers in stream order
    pub root_code_ids: Vec<CodeId>,
}

// ============================================================================
// Remote Manifest
// ============================================================================

/// Index of the remote shards, fetched fresh on every sync attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub files: Vec<ManifestEntry>,
}

impl Manifest {
    /// Sum of the declared code counts over all shards.
    pub fn total_codes(&self) -> u64 {
        self.files.iter().map(|entry| entry.num_codes).sum()
    }
}

/// One shard of the remote dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Number of codes the shard is expected to contain
    pub num_codes: u64,

    /// File name relative to the assets base URL
    pub name: String,

    /// Ontology all codes in the shard belong to
    pub ontology_id: String,
}

// ============================================================================
// Versions
// ============================================================================

/// Version pair recorded after the last successful startup check.
///
/// Serialized with the short field names used by the local cache record
/// (`{"b": ..., "f": ...}`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredVersion {
    /// Backend version string, possibly carrying a channel suffix
    #[serde(rename = "b", default)]
    pub backend: String,

    /// Build identifier of the client that performed the check
    #[serde(rename = "f", default)]
    pub client: String,
}

impl StoredVersion {
    pub fn new(backend: impl Into<String>, client: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            client: client.into(),
        }
    }

    /// Both components are present.
    pub fn is_complete(&self) -> bool {
        !self.backend.is_empty() && !self.client.is_empty()
    }

    /// Release channel of the backend version.
    pub fn channel(&self) -> &str {
        channel_of(&self.backend)
    }
}

/// Substring after the first [`CHANNEL_SEPARATOR`], or `""` when there is none.
pub fn channel_of(version: &str) -> &str {
    version
        .split_once(CHANNEL_SEPARATOR)
        .map_or("", |(_, channel)| channel)
}

/// Body of the backend status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendStatus {
    pub status: String,
    #[serde(default)]
    pub version: String,
}

impl BackendStatus {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}
