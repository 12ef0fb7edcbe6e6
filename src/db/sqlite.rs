// SqliteDatabase — rusqlite backend implementing the Database trait.
//
// The Connection is wrapped in tokio::sync::Mutex so the trait's futures stay
// Send (a std MutexGuard would poison that bound). Trait methods lock the
// mutex, do synchronous rusqlite work, and return without awaiting while the
// lock is held.

use anyhow::Result;
use async_trait::async_trait;
use rusqlite::Connection;
use tokio::sync::Mutex;

use super::models::{CandidatePost, ScoredAggregate};
use super::traits::Database;

pub struct SqliteDatabase {
    conn: Mutex<Connection>,
}

impl SqliteDatabase {
    /// Wrap an already-opened rusqlite Connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    async fn table_count(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::schema::table_count(&conn)
    }

    async fn get_scan_state(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().await;
        super::queries::get_scan_state(&conn, key)
    }

    async fn set_scan_state(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        super::queries::set_scan_state(&conn, key, value)
    }

    async fn upsert_post(&self, post: &CandidatePost) -> Result<()> {
        let conn = self.conn.lock().await;
        super::queries::upsert_post(&conn, post)
    }

    async fn delete_posts_by_uri(&self, uris: &[String]) -> Result<usize> {
        let conn = self.conn.lock().await;
        super::queries::delete_posts_by_uri(&conn, uris)
    }

    async fn get_post_by_id(&self, id: &str) -> Result<Option<CandidatePost>> {
        let conn = self.conn.lock().await;
        super::queries::get_post_by_id(&conn, id)
    }

    async fn get_posts_for_tag(
        &self,
        tag: &str,
        limit: u32,
        cursor: Option<(i64, String)>,
    ) -> Result<Vec<CandidatePost>> {
        let conn = self.conn.lock().await;
        let cursor = cursor.as_ref().map(|(millis, cid)| (*millis, cid.as_str()));
        super::queries::get_posts_for_tag(&conn, tag, limit, cursor)
    }

    async fn count_posts_for_tag(&self, tag: &str) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::queries::count_posts_for_tag(&conn, tag)
    }

    async fn remove_tag_from_old_posts(&self, tag: &str, cutoff_millis: i64) -> Result<usize> {
        let conn = self.conn.lock().await;
        super::queries::remove_tag_from_old_posts(&conn, tag, cutoff_millis)
    }

    async fn aggregate_posts_by_target(
        &self,
        tag: &str,
        threshold: u32,
        collection: &str,
        limit: u32,
    ) -> Result<usize> {
        let conn = self.conn.lock().await;
        super::queries::aggregate_posts_by_target(&conn, tag, threshold, collection, limit)
    }

    async fn get_collection(&self, collection: &str) -> Result<Vec<ScoredAggregate>> {
        let conn = self.conn.lock().await;
        super::queries::get_collection(&conn, collection)
    }

    async fn upsert_aggregate(&self, collection: &str, record: &ScoredAggregate) -> Result<()> {
        let conn = self.conn.lock().await;
        super::queries::upsert_aggregate(&conn, collection, record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::create_tables;

    fn test_db() -> SqliteDatabase {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        SqliteDatabase::new(conn)
    }

    #[tokio::test]
    async fn test_trait_scan_state_roundtrip() {
        let db = test_db();
        assert_eq!(db.get_scan_state("firehose_cursor").await.unwrap(), None);
        db.set_scan_state("firehose_cursor", "abc123").await.unwrap();
        assert_eq!(
            db.get_scan_state("firehose_cursor").await.unwrap(),
            Some("abc123".to_string())
        );
    }

    #[tokio::test]
    async fn test_trait_table_count() {
        let db = test_db();
        assert_eq!(db.table_count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_trait_aggregate_upsert_roundtrip() {
        let db = test_db();
        let record = ScoredAggregate {
            id: "at://did:plc:t/app.bsky.feed.post/1".to_string(),
            indexed_at: 1_700_000_000_000,
            likes: 5,
            replies: 20,
            reposts: 1,
            quotes: 0,
            quoted_post_uri: None,
            sort_weight: 20.0,
        };
        db.upsert_aggregate("ratiod_posts", &record).await.unwrap();
        let rows = db.get_collection("ratiod_posts").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].replies, 20);
        assert!((rows[0].sort_weight - 20.0).abs() < f64::EPSILON);
    }
}
