//! Remote access
//!
//! Authenticated HTTP client for the manifest, shard and status endpoints.

pub mod client;
pub mod endpoints;

pub use client::{ApiClient, ByteStream, NoToken, StaticToken, TokenProvider};
