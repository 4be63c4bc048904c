//! End-to-end tests for the shard sync
//!
//! Manifest and shards are served by wiremock; the replica lives in an
//! in-memory SQLite store.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{api_client, gzip, mount_manifest, mount_shard, shard_csv};
use futures::StreamExt;
use ontosync_client::api::ByteStream;
use ontosync_client::store::LocalStore;
use ontosync_client::sync::{ProgressReporter, ShardPipeline};
use ontosync_client::{ShardWriteMode, SyncEngine, SyncError, SyncOutcome};
use ontosync_common::{Code, ManifestEntry};
use serde_json::json;
use std::sync::{Arc, Mutex};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

fn atc_csv() -> String {
    shard_csv(
        "ATC",
        &[
            (1, "[1]", "A", "Alimentary tract and metabolism"),
            (2, "[1,2]", "A01", "Stomatological preparations"),
            (3, "[3]", "B", "Blood, \"blood forming\" organs"),
            (4, "[3,4]", "B01", "Antithrombotic agents"),
        ],
    )
}

fn icd_csv() -> String {
    shard_csv(
        "ICD-9",
        &[
            (10, "[10]", "001-009", "Intestinal infectious diseases"),
            (11, "[10,11]", "008", "Intestinal infections\ndue to other organisms"),
            (12, "[10,11,12]", "008.0", "Escherichia coli"),
        ],
    )
}

fn manifest() -> serde_json::Value {
    json!([
        {"num_codes": 4, "name": "atc.csv.gz", "ontology_id": "ATC"},
        {"num_codes": 3, "name": "icd9.csv.gz", "ontology_id": "ICD-9"}
    ])
}

fn engine(server: &MockServer, store: &LocalStore) -> SyncEngine {
    SyncEngine::new(api_client(), store.clone(), server.uri())
}

fn recorder() -> (Arc<Mutex<Vec<u8>>>, impl Fn(u8) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |p| sink.lock().unwrap().push(p))
}

#[tokio::test]
async fn test_sync_populates_store() {
    let server = MockServer::start().await;
    mount_manifest(&server, manifest()).await;
    mount_shard(&server, "atc.csv.gz", &atc_csv(), 1).await;
    mount_shard(&server, "icd9.csv.gz", &icd_csv(), 1).await;

    let store = LocalStore::in_memory().await.unwrap();
    let outcome = engine(&server, &store).run().await.unwrap();

    let SyncOutcome::Synced { shards } = &outcome else {
        panic!("expected a sync, got {:?}", outcome);
    };
    assert_eq!(shards.len(), 2);
    assert!(shards.iter().all(|s| s.succeeded() && s.ontology_written));
    assert_eq!(outcome.codes_written(), 7);

    assert_eq!(store.count_codes("ATC").await.unwrap(), 4);
    assert_eq!(store.count_codes("ICD-9").await.unwrap(), 3);

    let atc = store.get_ontology("ATC").await.unwrap().unwrap();
    assert_eq!(atc.root_code_ids, vec![1, 3]);
    let icd = store.get_ontology("ICD-9").await.unwrap().unwrap();
    assert_eq!(icd.root_code_ids, vec![10]);
}

#[tokio::test]
async fn test_code_strings_keep_leading_zeros() {
    let server = MockServer::start().await;
    mount_manifest(&server, manifest()).await;
    mount_shard(&server, "atc.csv.gz", &atc_csv(), 1).await;
    mount_shard(&server, "icd9.csv.gz", &icd_csv(), 1).await;

    let store = LocalStore::in_memory().await.unwrap();
    engine(&server, &store).run().await.unwrap();

    let codes = store.codes_for_ontology("ICD-9").await.unwrap();
    assert_eq!(
        codes[1],
        Code {
            id: 11,
            ontology_id: "ICD-9".to_string(),
            path: vec![10, 11],
            code: "008".to_string(),
            description: Some("Intestinal infections\ndue to other organisms".to_string()),
        }
    );
    assert_eq!(codes[2].code, "008.0");

    let atc = store.codes_for_ontology("ATC").await.unwrap();
    assert_eq!(atc[2].description.as_deref(), Some("Blood, \"blood forming\" organs"));
}

#[tokio::test]
async fn test_second_run_downloads_nothing() {
    let server = MockServer::start().await;
    mount_manifest(&server, manifest()).await;
    // one download each, from the first run only
    mount_shard(&server, "atc.csv.gz", &atc_csv(), 1).await;
    mount_shard(&server, "icd9.csv.gz", &icd_csv(), 1).await;

    let store = LocalStore::in_memory().await.unwrap();
    engine(&server, &store).run().await.unwrap();

    let (seen, callback) = recorder();
    let outcome = engine(&server, &store).with_progress(callback).run().await.unwrap();

    assert_eq!(outcome, SyncOutcome::UpToDate { shards: 2 });
    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(store.total_codes().await.unwrap(), 7);
}

#[tokio::test]
async fn test_progress_is_monotonic_and_complete() {
    let server = MockServer::start().await;
    mount_manifest(&server, manifest()).await;
    mount_shard(&server, "atc.csv.gz", &atc_csv(), 1).await;
    mount_shard(&server, "icd9.csv.gz", &icd_csv(), 1).await;

    let store = LocalStore::in_memory().await.unwrap();
    let (seen, callback) = recorder();
    engine(&server, &store).with_progress(callback).run().await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.first(), Some(&0));
    assert_eq!(seen.last(), Some(&100));
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress went backwards: {:?}", seen);
}

#[tokio::test]
async fn test_stale_rows_are_replaced() {
    let server = MockServer::start().await;
    mount_manifest(&server, manifest()).await;
    mount_shard(&server, "atc.csv.gz", &atc_csv(), 1).await;
    mount_shard(&server, "icd9.csv.gz", &icd_csv(), 1).await;

    let store = LocalStore::in_memory().await.unwrap();
    store
        .bulk_put_codes(&[Code {
            id: 999,
            ontology_id: "ATC".to_string(),
            path: vec![999],
            code: "Z".to_string(),
            description: None,
        }])
        .await
        .unwrap();

    engine(&server, &store).run().await.unwrap();

    let ids: Vec<i64> = store
        .codes_for_ontology("ATC")
        .await
        .unwrap()
        .iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_count_mismatch_raises_db_sync_error() {
    let server = MockServer::start().await;
    mount_manifest(
        &server,
        json!([{"num_codes": 5, "name": "atc.csv.gz", "ontology_id": "ATC"}]),
    )
    .await;
    mount_shard(&server, "atc.csv.gz", &atc_csv(), 1).await;

    let store = LocalStore::in_memory().await.unwrap();
    let (seen, callback) = recorder();
    let err = engine(&server, &store).with_progress(callback).run().await.unwrap_err();

    assert!(err.is_db_mismatch());
    assert!(err.to_string().contains("SYNC_DB_MISMATCH"));
    assert_ne!(seen.lock().unwrap().last(), Some(&100));

    // streaming mode leaves the rows it already wrote
    assert_eq!(store.count_codes("ATC").await.unwrap(), 4);
    assert!(store.get_ontology("ATC").await.unwrap().is_some());
}

#[tokio::test]
async fn test_verified_first_skips_writes_for_mismatched_shard() {
    let server = MockServer::start().await;
    mount_manifest(
        &server,
        json!([
            {"num_codes": 5, "name": "atc.csv.gz", "ontology_id": "ATC"},
            {"num_codes": 3, "name": "icd9.csv.gz", "ontology_id": "ICD-9"}
        ]),
    )
    .await;
    mount_shard(&server, "atc.csv.gz", &atc_csv(), 1).await;
    mount_shard(&server, "icd9.csv.gz", &icd_csv(), 1).await;

    let store = LocalStore::in_memory().await.unwrap();
    let err = engine(&server, &store)
        .with_write_mode(ShardWriteMode::VerifiedFirst)
        .run()
        .await
        .unwrap_err();

    assert!(err.is_db_mismatch());
    assert_eq!(store.count_codes("ATC").await.unwrap(), 0);
    assert!(store.get_ontology("ATC").await.unwrap().is_none());
    assert_eq!(store.count_codes("ICD-9").await.unwrap(), 3);
    assert!(store.get_ontology("ICD-9").await.unwrap().is_some());
}

#[tokio::test]
async fn test_empty_shard_uses_manifest_name() {
    let server = MockServer::start().await;
    mount_manifest(
        &server,
        json!([{"num_codes": 0, "name": "empty.csv.gz", "ontology_id": "EMPTY"}]),
    )
    .await;
    mount_shard(&server, "empty.csv.gz", &format!("{}\n", common::HEADER), 0).await;

    // zero expected and zero stored already match
    let store = LocalStore::in_memory().await.unwrap();
    let outcome = engine(&server, &store).run().await.unwrap();
    assert_eq!(outcome, SyncOutcome::UpToDate { shards: 1 });
}

#[tokio::test]
async fn test_trailing_row_without_newline_is_counted() {
    let server = MockServer::start().await;
    mount_manifest(
        &server,
        json!([{"num_codes": 2, "name": "atc.csv.gz", "ontology_id": "ATC"}]),
    )
    .await;
    let csv = format!(
        "{}\nATC,1,[1],A,Alimentary\nATC,2,\"[1,2]\",A01,Stomatological",
        common::HEADER
    );
    mount_shard(&server, "atc.csv.gz", &csv, 1).await;

    let store = LocalStore::in_memory().await.unwrap();
    engine(&server, &store).run().await.unwrap();

    let codes = store.codes_for_ontology("ATC").await.unwrap();
    assert_eq!(codes.len(), 2);
    assert_eq!(codes[1].path, vec![1, 2]);
    assert_eq!(codes[1].description.as_deref(), Some("Stomatological"));
}

#[tokio::test]
async fn test_manifest_server_error_is_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/manifest.json"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let store = LocalStore::in_memory().await.unwrap();
    let err = engine(&server, &store).run().await.unwrap_err();
    assert!(matches!(err, SyncError::Network { .. }));
}

#[tokio::test]
async fn test_malformed_manifest_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/manifest.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"files\": 12}"))
        .mount(&server)
        .await;

    let store = LocalStore::in_memory().await.unwrap();
    let err = engine(&server, &store).run().await.unwrap_err();
    assert!(matches!(err, SyncError::Parse { .. }));
}

#[tokio::test]
async fn test_corrupt_shard_aborts_sync() {
    let server = MockServer::start().await;
    mount_manifest(
        &server,
        json!([{"num_codes": 4, "name": "atc.csv.gz", "ontology_id": "ATC"}]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/atc.csv.gz"))
        .respond_with(ResponseTemplate::new(200).set_body_string(atc_csv()))
        .mount(&server)
        .await;

    let store = LocalStore::in_memory().await.unwrap();
    let err = engine(&server, &store).run().await.unwrap_err();

    assert!(matches!(err, SyncError::Parse { .. }));
    assert_eq!(store.count_codes("ATC").await.unwrap(), 0);
}

#[tokio::test]
async fn test_missing_shard_is_network_error() {
    let server = MockServer::start().await;
    mount_manifest(
        &server,
        json!([{"num_codes": 1, "name": "gone.csv.gz", "ontology_id": "GONE"}]),
    )
    .await;

    let store = LocalStore::in_memory().await.unwrap();
    let err = engine(&server, &store).run().await.unwrap_err();
    assert!(matches!(err, SyncError::Network { .. }));
}

#[tokio::test]
async fn test_check_reports_drift_without_downloading() {
    let server = MockServer::start().await;
    mount_manifest(&server, manifest()).await;
    mount_shard(&server, "atc.csv.gz", &atc_csv(), 0).await;
    mount_shard(&server, "icd9.csv.gz", &icd_csv(), 0).await;

    let store = LocalStore::in_memory().await.unwrap();
    let report = engine(&server, &store).check().await.unwrap();

    assert!(!report.is_in_sync());
    assert_eq!(report.drifted().count(), 2);
}

/// Gzipped `csv` delivered in `size`-byte transfer chunks.
fn chunked_body(csv: &str, size: usize) -> ByteStream {
    let chunks: Vec<_> = gzip(csv).chunks(size).map(|chunk| Ok(chunk.to_vec())).collect();
    futures::stream::iter(chunks).boxed()
}

async fn run_chunked(store: &LocalStore, mode: ShardWriteMode, csv: &str, expected: u64) -> u64 {
    let api = api_client();
    let progress = ProgressReporter::new(expected, None);
    let pipeline = ShardPipeline {
        api: &api,
        store,
        base_url: "http://unused",
        token: common::TOKEN,
        mode,
        progress: &progress,
    };
    let entry = ManifestEntry {
        num_codes: expected,
        name: "icd.csv.gz".to_string(),
        ontology_id: "ICD".to_string(),
    };

    let outcome = pipeline.run_body(&entry, chunked_body(csv, 7)).await.unwrap();
    assert!(outcome.succeeded(), "{:?}", outcome);
    assert!(outcome.ontology_written);
    outcome.persisted
}

#[tokio::test]
async fn test_pipeline_with_small_transfer_chunks() {
    // numeric-looking descriptions first, text later
    let csv = shard_csv(
        "ICD",
        &[
            (1, "[1]", "001", "100"),
            (2, "[1,2]", "002", "200"),
            (3, "[3]", "003", "Cholera"),
            (4, "[3,4]", "004", "Typhoid, \"enteric\" fever"),
        ],
    );

    for mode in [ShardWriteMode::Streaming, ShardWriteMode::VerifiedFirst] {
        let store = LocalStore::in_memory().await.unwrap();
        assert_eq!(run_chunked(&store, mode, &csv, 4).await, 4);

        let codes = store.codes_for_ontology("ICD").await.unwrap();
        let described: Vec<_> = codes.iter().map(|c| c.description.as_deref().unwrap()).collect();
        assert_eq!(described, vec!["100", "200", "Cholera", "Typhoid, \"enteric\" fever"]);
        assert_eq!(codes[0].code, "001");
        assert_eq!(codes[3].path, vec![3, 4]);

        let ontology = store.get_ontology("ICD").await.unwrap().unwrap();
        assert_eq!(ontology.root_code_ids, vec![1, 3]);
    }
}
