// Ingestion pipeline — drives the event source batch by batch, fans each
// candidate out to every algorithm filter, and persists matches exactly once.
//
// Failure isolation rules: a failing algorithm filter is a non-match for
// that post only; a failing per-post upsert does not abort its siblings.
// Whole-store failures (batched delete, cursor persistence) propagate and
// stop the run — a dead store is not something to paper over.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::algos::AlgoRegistry;
use crate::db::models::CandidatePost;
use crate::db::Database;
use crate::firehose::classifier::{classify_commit, ClassifiedOps};
use crate::firehose::events::{EventBatch, RepoEvent};
use crate::firehose::source::EventSource;

/// Scan-state key holding the last fully-processed batch cursor.
pub const CURSOR_KEY: &str = "firehose_cursor";

/// How many candidates from one batch are tagged concurrently.
const FILTER_CONCURRENCY: usize = 16;

/// Content-addressed post key: lowercase hex of the first 12 bytes of
/// SHA-256(uri). Deterministic across runs and restarts, which is what makes
/// redelivered events converge on upsert instead of duplicating.
pub fn stable_id(uri: &str) -> String {
    let digest = Sha256::digest(uri.as_bytes());
    digest[..12].iter().map(|b| format!("{b:02x}")).collect()
}

pub struct IngestionPipeline {
    db: Arc<dyn Database>,
    registry: Arc<AlgoRegistry>,
}

impl IngestionPipeline {
    pub fn new(db: Arc<dyn Database>, registry: Arc<AlgoRegistry>) -> Self {
        Self { db, registry }
    }

    /// Consume the source until it ends, resuming from the stored cursor.
    ///
    /// The next batch is not requested until the current one is fully
    /// processed and its cursor persisted — back-pressure keeps cross-batch
    /// ordering intact.
    pub async fn run(&self, source: &mut dyn EventSource) -> Result<()> {
        let mut cursor = self.db.get_scan_state(CURSOR_KEY).await?;
        if let Some(c) = &cursor {
            info!(cursor = c, "Resuming from stored cursor");
        }

        while let Some(batch) = source.next_batch(cursor.as_deref()).await? {
            self.process_batch(&batch).await?;
            if batch.cursor.is_some() {
                cursor = batch.cursor;
            }
        }
        Ok(())
    }

    /// Process one batch to completion: deletions first, then concurrent
    /// tag fan-out and independent upserts, then cursor persistence.
    pub async fn process_batch(&self, batch: &EventBatch) -> Result<()> {
        // No post is evaluated against a half-initialized algorithm.
        self.registry.ready().await;

        let indexed_at = Utc::now().timestamp_millis();
        let mut ops = ClassifiedOps::default();
        for event in &batch.events {
            if let RepoEvent::Commit(commit) = event {
                let classified = classify_commit(commit, indexed_at);
                ops.deleted_uris.extend(classified.deleted_uris);
                ops.candidates.extend(classified.candidates);
            }
        }

        // Deletions for a batch are applied before its creations.
        if !ops.deleted_uris.is_empty() {
            let deleted = self.db.delete_posts_by_uri(&ops.deleted_uris).await?;
            debug!(requested = ops.deleted_uris.len(), deleted, "Applied deletions");
        }

        // Tag candidates concurrently; posts no algorithm claims drop out
        // silently.
        let tagged: Vec<Option<CandidatePost>> =
            stream::iter(ops.candidates.into_iter().map(|post| self.tag_post(post)))
                .buffer_unordered(FILTER_CONCURRENCY)
                .collect()
                .await;

        // Each upsert stands alone — one failure must not abort siblings.
        let mut stored = 0;
        for post in tagged.into_iter().flatten() {
            match self.db.upsert_post(&post).await {
                Ok(()) => stored += 1,
                Err(e) => warn!(uri = post.uri, error = %e, "Failed to store post, skipping"),
            }
        }
        if stored > 0 {
            debug!(stored, "Stored tagged posts");
        }

        // The cursor is persisted only after the whole batch landed, so a
        // crash replays the batch instead of losing it.
        if let Some(cursor) = &batch.cursor {
            self.db.set_scan_state(CURSOR_KEY, cursor).await?;
        }

        Ok(())
    }

    /// Run every registered filter over one candidate. Returns the post with
    /// its id and matching tags filled in, or None when nothing matched.
    async fn tag_post(&self, mut post: CandidatePost) -> Option<CandidatePost> {
        let checks = self.registry.managers().iter().map(|manager| {
            let post = &post;
            async move {
                match manager.filter_post(post).await {
                    Ok(true) => Some(manager.name().to_string()),
                    Ok(false) => None,
                    Err(e) => {
                        // An algorithm that throws is a non-match for this
                        // post; the others still get their verdict.
                        warn!(algo = manager.name(), uri = post.uri, error = %e,
                              "Filter failed, treating as non-match");
                        None
                    }
                }
            }
        });

        let algo_tags: Vec<String> = join_all(checks).await.into_iter().flatten().collect();
        if algo_tags.is_empty() {
            return None;
        }

        post.id = stable_id(&post.uri);
        post.algo_tags = algo_tags;
        Some(post)
    }
}
