//! Per-shard pipeline
//!
//! One producer pulls the shard body, gunzips and decodes it, and hands every
//! text chunk to two consumers over unbounded channels: the counter
//! (shallow parse) and the processor (deep parse and persistence). All three
//! are joined on the calling task.

use crate::api::{ApiClient, ByteStream};
use crate::error::{Result, SyncError};
use crate::store::LocalStore;
use crate::sync::csv_stream::{CsvStreamParser, ParseDepth, Rows};
use crate::sync::decode::{GzipChunkDecoder, Utf8ChunkDecoder};
use crate::sync::ontology::{codes_from_rows, OntologyBuilder};
use crate::sync::progress::ProgressReporter;
use crate::sync::ShardWriteMode;
use futures::StreamExt;
use ontosync_common::{Code, ManifestEntry};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument, warn};

/// What the producer hands to each consumer.
#[derive(Debug, Clone)]
enum Feed {
    Text(String),
    /// The producer failed; its error is reported by the pipeline
    Aborted,
}

type FeedSender = mpsc::UnboundedSender<Feed>;
type FeedReceiver = mpsc::UnboundedReceiver<Feed>;

/// Result of one shard pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardOutcome {
    pub ontology_id: String,
    /// Count declared by the manifest
    pub expected: u64,
    /// Rows seen by the counting branch
    pub counted: u64,
    /// Rows written to the store
    pub persisted: u64,
    /// Whether the ontology aggregate was written
    pub ontology_written: bool,
}

impl ShardOutcome {
    pub fn succeeded(&self) -> bool {
        self.counted == self.expected
    }
}

#[derive(Debug)]
struct Processed {
    persisted: u64,
    ontology_written: bool,
}

/// Everything a shard pipeline shares with its siblings.
#[derive(Clone, Copy)]
pub struct ShardPipeline<'a> {
    pub api: &'a ApiClient,
    pub store: &'a LocalStore,
    pub base_url: &'a str,
    pub token: &'a str,
    pub mode: ShardWriteMode,
    pub progress: &'a ProgressReporter,
}

impl ShardPipeline<'_> {
    /// Download, verify and persist one shard.
    #[instrument(skip_all, fields(shard = %entry.name, ontology = %entry.ontology_id, expected = entry.num_codes))]
    pub async fn run(&self, entry: &ManifestEntry) -> Result<ShardOutcome> {
        let body = self.api.fetch_shard(self.base_url, entry, self.token).await?;
        self.run_body(entry, body).await
    }

    /// Verify and persist an already opened shard body.
    pub async fn run_body(&self, entry: &ManifestEntry, body: ByteStream) -> Result<ShardOutcome> {
        let (count_tx, count_rx) = mpsc::unbounded_channel();
        let (process_tx, process_rx) = mpsc::unbounded_channel();
        let (verdict_tx, verdict_rx) = oneshot::channel();

        let (produced, counted, processed) = futures::join!(
            produce(body, [count_tx, process_tx]),
            count(count_rx, entry.num_codes, verdict_tx),
            self.process(entry, process_rx, verdict_rx),
        );

        produced?;
        let processed = processed?;
        let counted = counted?;

        let (Some(counted), Some(processed)) = (counted, processed) else {
            return Err(SyncError::parse(
                format!("shard {}", entry.name),
                "stream ended before all consumers finished",
            ));
        };

        let outcome = ShardOutcome {
            ontology_id: entry.ontology_id.clone(),
            expected: entry.num_codes,
            counted,
            persisted: processed.persisted,
            ontology_written: processed.ontology_written,
        };

        if outcome.succeeded() {
            info!(codes = outcome.persisted, "Shard synced");
        } else {
            warn!(
                counted = outcome.counted,
                persisted = outcome.persisted,
                "Shard row count does not match the manifest"
            );
        }

        Ok(outcome)
    }

    /// Deep-parse the stream and persist it according to the write mode.
    async fn process(
        &self,
        entry: &ManifestEntry,
        mut feed: FeedReceiver,
        verdict: oneshot::Receiver<bool>,
    ) -> Result<Option<Processed>> {
        let mut parser = CsvStreamParser::new(ParseDepth::Deep);
        let mut builder = OntologyBuilder::new();
        let mut held: Vec<Vec<Code>> = Vec::new();
        let mut persisted = 0;

        while let Some(item) = feed.recv().await {
            let text = match item {
                Feed::Text(text) => text,
                Feed::Aborted => return Ok(None),
            };
            let codes = typed_codes(parser.push(&text)?)?;
            persisted += self.accept(codes, &mut builder, &mut held).await?;
        }

        let codes = typed_codes(parser.finish()?)?;
        persisted += self.accept(codes, &mut builder, &mut held).await?;

        if self.mode == ShardWriteMode::VerifiedFirst {
            // a dropped sender means the counter failed
            if !verdict.await.unwrap_or(false) {
                debug!(held = held.len(), "Count not confirmed, skipping writes");
                return Ok(Some(Processed {
                    persisted: 0,
                    ontology_written: false,
                }));
            }
            for batch in held {
                persisted += self.persist(&batch).await?;
            }
        }

        let ontology = builder.finish(&entry.ontology_id);
        debug!(roots = ontology.root_code_ids.len(), "Writing ontology");
        self.store.put_ontology(&ontology).await?;

        Ok(Some(Processed {
            persisted,
            ontology_written: true,
        }))
    }

    /// Feed one parsed batch to the builder, then write or hold it.
    async fn accept(
        &self,
        codes: Vec<Code>,
        builder: &mut OntologyBuilder,
        held: &mut Vec<Vec<Code>>,
    ) -> Result<u64> {
        if codes.is_empty() {
            return Ok(0);
        }
        builder.observe(&codes);

        match self.mode {
            ShardWriteMode::Streaming => self.persist(&codes).await,
            ShardWriteMode::VerifiedFirst => {
                held.push(codes);
                Ok(0)
            },
        }
    }

    async fn persist(&self, codes: &[Code]) -> Result<u64> {
        self.store.bulk_put_codes(codes).await?;
        let written = codes.len() as u64;
        self.progress.record(written);
        Ok(written)
    }
}

/// Fetch, gunzip and decode the body, copying each text chunk to every output.
async fn produce(body: ByteStream, outputs: [FeedSender; 2]) -> Result<()> {
    let result = decode_into(body, &outputs).await;
    if result.is_err() {
        for output in &outputs {
            let _ = output.send(Feed::Aborted);
        }
    }
    result
}

fn typed_codes(rows: Rows) -> Result<Vec<Code>> {
    let rows = rows
        .into_typed()
        .ok_or_else(|| SyncError::parse("shard rows", "processor received untyped rows"))?;
    codes_from_rows(&rows)
}

async fn decode_into(mut body: ByteStream, outputs: &[FeedSender]) -> Result<()> {
    let mut gzip = GzipChunkDecoder::new();
    let mut utf8 = Utf8ChunkDecoder::new();

    while let Some(chunk) = body.next().await {
        let bytes = gzip.push(&chunk?)?;
        broadcast(outputs, utf8.push(&bytes));

        if outputs.iter().all(FeedSender::is_closed) {
            debug!("Both consumers stopped, abandoning download");
            return Ok(());
        }
    }

    let tail = gzip.finish()?;
    let mut text = utf8.push(&tail);
    text.push_str(&utf8.finish());
    broadcast(outputs, text);

    Ok(())
}

fn broadcast(outputs: &[FeedSender], text: String) {
    if text.is_empty() {
        return;
    }
    for output in outputs {
        // a consumer that already failed has dropped its receiver
        let _ = output.send(Feed::Text(text.clone()));
    }
}

/// Shallow-parse the stream and count its records.
async fn count(
    mut feed: FeedReceiver,
    expected: u64,
    verdict: oneshot::Sender<bool>,
) -> Result<Option<u64>> {
    let mut parser = CsvStreamParser::new(ParseDepth::Shallow);
    let mut counted = 0u64;

    while let Some(item) = feed.recv().await {
        match item {
            Feed::Text(text) => counted += parser.push(&text)?.len() as u64,
            Feed::Aborted => return Ok(None),
        }
    }
    counted += parser.finish()?.len() as u64;

    let _ = verdict.send(counted == expected);
    Ok(Some(counted))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn text_feed(chunks: &[&str]) -> FeedReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        for chunk in chunks {
            tx.send(Feed::Text(chunk.to_string())).unwrap();
        }
        rx
    }

    #[tokio::test]
    async fn test_count_matches_and_sends_verdict() {
        let feed = text_feed(&["id,code\n1,A\n2,", "B\n3,C"]);
        let (tx, rx) = oneshot::channel();

        let counted = count(feed, 3, tx).await.unwrap();
        assert_eq!(counted, Some(3));
        assert!(rx.await.unwrap());
    }

    #[tokio::test]
    async fn test_count_mismatch_verdict() {
        let feed = text_feed(&["id,code\n1,A\n"]);
        let (tx, rx) = oneshot::channel();

        assert_eq!(count(feed, 2, tx).await.unwrap(), Some(1));
        assert!(!rx.await.unwrap());
    }

    #[tokio::test]
    async fn test_count_stops_on_abort() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(Feed::Text("id,code\n1,A\n".to_string())).unwrap();
        tx.send(Feed::Aborted).unwrap();
        let (verdict_tx, verdict_rx) = oneshot::channel();

        assert_eq!(count(rx, 1, verdict_tx).await.unwrap(), None);
        assert!(verdict_rx.await.is_err());
    }

    #[tokio::test]
    async fn test_produce_aborts_consumers_on_bad_gzip() {
        let body: ByteStream = futures::stream::iter(vec![Ok(b"plain text, not gzip".to_vec())]).boxed();
        let (a_tx, mut a_rx) = mpsc::unbounded_channel();
        let (b_tx, mut b_rx) = mpsc::unbounded_channel();

        let result = produce(body, [a_tx, b_tx]).await;
        assert!(matches!(result, Err(SyncError::Parse { .. })));
        assert!(matches!(a_rx.recv().await, Some(Feed::Aborted)));
        assert!(matches!(b_rx.recv().await, Some(Feed::Aborted)));
    }
}
