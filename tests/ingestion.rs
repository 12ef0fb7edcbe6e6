// Ingestion pipeline tests — end-to-end over an in-memory store and an
// in-memory event source. No network: the metrics client is a stub that
// always fails, which the hot path never touches anyway.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use rusqlite::Connection;

use cinder::algos::discourse::DiscourseManager;
use cinder::algos::ratiod::RatiodManager;
use cinder::algos::{AlgoManager, AlgoRegistry};
use cinder::bluesky::{MetricsClient, PostMetrics};
use cinder::db::models::CandidatePost;
use cinder::db::schema::create_tables;
use cinder::db::{Database, SqliteDatabase};
use cinder::firehose::events::{
    CommitEvent, EventBatch, OpAction, PostRecord, ReplyRef, RepoEvent, RepoOp, StrongRef,
    POST_COLLECTION,
};
use cinder::firehose::ingest::{stable_id, CURSOR_KEY};
use cinder::firehose::{EventSource, IngestionPipeline};

struct FailingMetrics;

#[async_trait]
impl MetricsClient for FailingMetrics {
    async fn fetch_post_metrics(&self, uri: &str) -> Result<PostMetrics> {
        anyhow::bail!("no network in tests: {uri}")
    }
}

/// Finite in-memory event source that records the cursors it was asked for.
struct MemorySource {
    batches: VecDeque<EventBatch>,
    seen_cursors: Vec<Option<String>>,
}

impl MemorySource {
    fn new(batches: Vec<EventBatch>) -> Self {
        Self {
            batches: batches.into(),
            seen_cursors: Vec::new(),
        }
    }
}

#[async_trait]
impl EventSource for MemorySource {
    async fn next_batch(&mut self, cursor: Option<&str>) -> Result<Option<EventBatch>> {
        self.seen_cursors.push(cursor.map(String::from));
        Ok(self.batches.pop_front())
    }
}

fn test_db() -> Arc<dyn Database> {
    let conn = Connection::open_in_memory().unwrap();
    create_tables(&conn).unwrap();
    Arc::new(SqliteDatabase::new(conn))
}

fn test_registry(db: &Arc<dyn Database>) -> Arc<AlgoRegistry> {
    let metrics: Arc<dyn MetricsClient> = Arc::new(FailingMetrics);
    let managers: Vec<Arc<dyn AlgoManager>> = vec![
        Arc::new(RatiodManager::new(
            db.clone(),
            metrics,
            Duration::from_secs(600),
            Duration::from_secs(24 * 3600),
            5,
        )),
        Arc::new(DiscourseManager::new(
            db.clone(),
            Duration::from_secs(900),
            Duration::from_secs(24 * 3600),
        )),
    ];
    Arc::new(AlgoRegistry::new(managers))
}

async fn started_pipeline(db: &Arc<dyn Database>) -> IngestionPipeline {
    let registry = test_registry(db);
    registry.start_all().await.unwrap();
    IngestionPipeline::new(db.clone(), registry)
}

/// A reply into someone else's thread — matches the ratiod filter.
fn foreign_reply(uri: &str, langs: Option<Vec<&str>>) -> RepoOp {
    RepoOp {
        action: OpAction::Create,
        collection: POST_COLLECTION.to_string(),
        uri: uri.to_string(),
        cid: Some(format!("cid-{uri}")),
        author: "did:plc:replier".to_string(),
        record: Some(PostRecord {
            text: "strong disagree".to_string(),
            langs: langs.map(|l| l.into_iter().map(String::from).collect()),
            reply: Some(ReplyRef {
                parent: StrongRef {
                    uri: "at://did:plc:op/app.bsky.feed.post/parent".to_string(),
                },
                root: StrongRef {
                    uri: "at://did:plc:op/app.bsky.feed.post/root".to_string(),
                },
            }),
            embed: None,
            tags: None,
        }),
    }
}

fn delete_op(uri: &str) -> RepoOp {
    RepoOp {
        action: OpAction::Delete,
        collection: POST_COLLECTION.to_string(),
        uri: uri.to_string(),
        cid: None,
        author: "did:plc:replier".to_string(),
        record: None,
    }
}

fn batch(cursor: &str, ops: Vec<RepoOp>) -> EventBatch {
    EventBatch {
        cursor: Some(cursor.to_string()),
        events: vec![RepoEvent::Commit(CommitEvent { ops })],
    }
}

#[tokio::test]
async fn replaying_a_batch_yields_identical_state() {
    let db = test_db();
    let pipeline = started_pipeline(&db).await;

    let b = batch("10", vec![foreign_reply("at://did:plc:replier/app.bsky.feed.post/1", Some(vec!["en"]))]);
    pipeline.process_batch(&b).await.unwrap();
    pipeline.process_batch(&b).await.unwrap();

    // One row, not two — the content-addressed id deduplicates redelivery
    assert_eq!(db.count_posts_for_tag("ratiod").await.unwrap(), 1);
    let id = stable_id("at://did:plc:replier/app.bsky.feed.post/1");
    let stored = db.get_post_by_id(&id).await.unwrap().unwrap();
    assert_eq!(stored.algo_tags, vec!["ratiod".to_string()]);
    assert_eq!(stored.text, "strong disagree");
}

#[tokio::test]
async fn language_filter_is_strict_single_english() {
    let db = test_db();
    let pipeline = started_pipeline(&db).await;

    let b = batch(
        "10",
        vec![
            foreign_reply("at://x/app.bsky.feed.post/none", None),
            foreign_reply("at://x/app.bsky.feed.post/empty", Some(vec![])),
            foreign_reply("at://x/app.bsky.feed.post/two", Some(vec!["en", "pt"])),
            foreign_reply("at://x/app.bsky.feed.post/ja", Some(vec!["ja"])),
            foreign_reply("at://x/app.bsky.feed.post/en", Some(vec!["en"])),
        ],
    );
    pipeline.process_batch(&b).await.unwrap();

    assert_eq!(db.count_posts_for_tag("ratiod").await.unwrap(), 1);
    let survivor = db
        .get_post_by_id(&stable_id("at://x/app.bsky.feed.post/en"))
        .await
        .unwrap();
    assert!(survivor.is_some());
}

#[tokio::test]
async fn posts_matching_no_algorithm_are_dropped() {
    let db = test_db();
    let pipeline = started_pipeline(&db).await;

    // Not a reply, no discourse tag: no manager claims it
    let mut op = foreign_reply("at://x/app.bsky.feed.post/plain", Some(vec!["en"]));
    if let Some(record) = op.record.as_mut() {
        record.reply = None;
    }
    pipeline.process_batch(&batch("10", vec![op])).await.unwrap();

    let id = stable_id("at://x/app.bsky.feed.post/plain");
    assert!(db.get_post_by_id(&id).await.unwrap().is_none());
    assert_eq!(db.count_posts_for_tag("ratiod").await.unwrap(), 0);
    assert_eq!(db.count_posts_for_tag("discourse").await.unwrap(), 0);
}

#[tokio::test]
async fn deletions_remove_previously_stored_posts() {
    let db = test_db();
    let pipeline = started_pipeline(&db).await;

    let uri = "at://did:plc:replier/app.bsky.feed.post/1";
    pipeline
        .process_batch(&batch("10", vec![foreign_reply(uri, Some(vec!["en"]))]))
        .await
        .unwrap();
    assert_eq!(db.count_posts_for_tag("ratiod").await.unwrap(), 1);

    pipeline
        .process_batch(&batch("11", vec![delete_op(uri)]))
        .await
        .unwrap();
    assert_eq!(db.count_posts_for_tag("ratiod").await.unwrap(), 0);
}

#[tokio::test]
async fn deletions_apply_before_creations_within_a_batch() {
    let db = test_db();
    let pipeline = started_pipeline(&db).await;

    let uri = "at://did:plc:replier/app.bsky.feed.post/1";
    // Delete and re-create in the same batch: the creation must survive
    let b = batch("10", vec![delete_op(uri), foreign_reply(uri, Some(vec!["en"]))]);
    pipeline.process_batch(&b).await.unwrap();

    assert!(db.get_post_by_id(&stable_id(uri)).await.unwrap().is_some());
}

#[tokio::test]
async fn cursor_is_persisted_and_resumed() {
    let db = test_db();

    {
        let pipeline = started_pipeline(&db).await;
        let mut source = MemorySource::new(vec![
            batch("10", vec![foreign_reply("at://x/app.bsky.feed.post/1", Some(vec!["en"]))]),
            batch("20", vec![foreign_reply("at://x/app.bsky.feed.post/2", Some(vec!["en"]))]),
        ]);
        pipeline.run(&mut source).await.unwrap();
        // First request has no cursor; later requests carry the last batch's
        assert_eq!(source.seen_cursors[0], None);
        assert_eq!(source.seen_cursors[1].as_deref(), Some("10"));
    }
    assert_eq!(
        db.get_scan_state(CURSOR_KEY).await.unwrap().as_deref(),
        Some("20")
    );

    // A fresh pipeline instance resumes from the stored cursor
    let pipeline = started_pipeline(&db).await;
    let mut source = MemorySource::new(vec![]);
    pipeline.run(&mut source).await.unwrap();
    assert_eq!(source.seen_cursors[0].as_deref(), Some("20"));
}

/// An algorithm whose filter always throws — must be a non-match only.
struct BrokenAlgo;

#[async_trait]
impl AlgoManager for BrokenAlgo {
    fn name(&self) -> &'static str {
        "broken"
    }
    async fn filter_post(&self, _post: &CandidatePost) -> Result<bool> {
        anyhow::bail!("filter exploded")
    }
    async fn periodic_task(&self) -> Result<()> {
        Ok(())
    }
    fn interval(&self) -> Duration {
        Duration::from_secs(600)
    }
}

#[tokio::test]
async fn failing_filter_does_not_block_other_algorithms() {
    let db = test_db();
    let metrics: Arc<dyn MetricsClient> = Arc::new(FailingMetrics);
    let managers: Vec<Arc<dyn AlgoManager>> = vec![
        Arc::new(BrokenAlgo),
        Arc::new(RatiodManager::new(
            db.clone(),
            metrics,
            Duration::from_secs(600),
            Duration::from_secs(24 * 3600),
            5,
        )),
    ];
    let registry = Arc::new(AlgoRegistry::new(managers));
    registry.start_all().await.unwrap();
    let pipeline = IngestionPipeline::new(db.clone(), registry);

    let uri = "at://did:plc:replier/app.bsky.feed.post/1";
    pipeline
        .process_batch(&batch("10", vec![foreign_reply(uri, Some(vec!["en"]))]))
        .await
        .unwrap();

    let stored = db.get_post_by_id(&stable_id(uri)).await.unwrap().unwrap();
    // Tagged by ratiod despite the broken sibling
    assert_eq!(stored.algo_tags, vec!["ratiod".to_string()]);
}
