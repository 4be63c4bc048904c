//! Shared fixtures for the integration tests

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use flate2::write::GzEncoder;
use flate2::Compression;
use ontosync_client::api::{ApiClient, StaticToken};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

pub const TOKEN: &str = "test-token";

pub const HEADER: &str = "ontology_id,id,path,code,description";

/// Client authorized with [`TOKEN`].
pub fn api_client() -> ApiClient {
    ApiClient::new(Arc::new(StaticToken::new(TOKEN)), Duration::from_secs(10))
        .expect("Failed to build client")
}

pub fn gzip(content: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

/// CSV body with one line per `(id, path, code, description)`.
pub fn shard_csv(ontology_id: &str, rows: &[(i64, &str, &str, &str)]) -> String {
    let mut csv = format!("{}\n", HEADER);
    for (id, path, code, description) in rows {
        csv.push_str(&format!(
            "{},{},\"{}\",{},\"{}\"\n",
            ontology_id,
            id,
            path,
            code,
            description.replace('"', "\"\"")
        ));
    }
    csv
}

pub async fn mount_manifest(server: &MockServer, files: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/manifest.json"))
        .and(header("authorization", format!("Bearer {}", TOKEN).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "files": files })))
        .mount(server)
        .await;
}

/// Serve a gzipped shard; `expected_hits` is verified when the server drops.
pub async fn mount_shard(server: &MockServer, name: &str, csv: &str, expected_hits: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/{}", name)))
        .and(header("authorization", format!("Bearer {}", TOKEN).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(gzip(csv)))
        .expect(expected_hits)
        .mount(server)
        .await;
}

pub async fn mount_status(server: &MockServer, status: &str, version: &str) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "status": status, "version": version })),
        )
        .mount(server)
        .await;
}
