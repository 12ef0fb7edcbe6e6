// Database trait — backend-agnostic async interface for all DB operations.
//
// The ingestion pipeline and the algorithm managers only see this trait, so
// the concrete store (rusqlite behind a Mutex) can be swapped for a native
// async backend without touching callers. All mutation is upsert-by-key or
// delete-by-key, both idempotent — interleaved pipeline and periodic-task
// writes need no coordination beyond per-statement atomicity.

use anyhow::Result;
use async_trait::async_trait;

use super::models::{CandidatePost, ScoredAggregate};

#[async_trait]
pub trait Database: Send + Sync {
    // --- Lifecycle ---

    /// Count the number of user-created tables in the database.
    async fn table_count(&self) -> Result<i64>;

    // --- Scan state ---

    /// Get a scan state value by key (e.g., "firehose_cursor").
    async fn get_scan_state(&self, key: &str) -> Result<Option<String>>;

    /// Set a scan state value (upsert).
    async fn set_scan_state(&self, key: &str, value: &str) -> Result<()>;

    // --- Posts ---

    /// Insert or fully replace a tagged post, keyed by its stable id.
    async fn upsert_post(&self, post: &CandidatePost) -> Result<()>;

    /// Delete posts by uri. Returns how many rows were removed.
    async fn delete_posts_by_uri(&self, uris: &[String]) -> Result<usize>;

    /// Get a post by its content-addressed id.
    async fn get_post_by_id(&self, id: &str) -> Result<Option<CandidatePost>>;

    /// Latest posts carrying a given algorithm tag, newest first, resuming
    /// strictly after an optional (indexed_at, cid) cursor.
    async fn get_posts_for_tag(
        &self,
        tag: &str,
        limit: u32,
        cursor: Option<(i64, String)>,
    ) -> Result<Vec<CandidatePost>>;

    /// Count posts currently carrying a given algorithm tag.
    async fn count_posts_for_tag(&self, tag: &str) -> Result<i64>;

    /// Remove an algorithm's tag from posts indexed before the cutoff;
    /// posts left with no tags are deleted. Returns posts touched.
    async fn remove_tag_from_old_posts(&self, tag: &str, cutoff_millis: i64) -> Result<usize>;

    // --- Aggregate collections ---

    /// Group tagged posts by canonical target and upsert groups meeting the
    /// threshold into the named collection. Returns groups written.
    async fn aggregate_posts_by_target(
        &self,
        tag: &str,
        threshold: u32,
        collection: &str,
        limit: u32,
    ) -> Result<usize>;

    /// All rows in a named aggregate collection, highest weight first.
    async fn get_collection(&self, collection: &str) -> Result<Vec<ScoredAggregate>>;

    /// Insert or fully replace an aggregate record in a named collection.
    async fn upsert_aggregate(&self, collection: &str, record: &ScoredAggregate) -> Result<()>;
}
