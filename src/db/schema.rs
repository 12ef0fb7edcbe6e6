// Database schema — table creation.
//
// A `schema_version` table tracks which schema revisions have been applied,
// so future migrations can be gated on version checks.

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Create all tables if they don't exist yet.
///
/// This is idempotent — safe to call on every startup.
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- Tracks schema version for future migrations
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Tagged candidate posts, keyed by the content-addressed id
        -- (digest of uri) so re-ingestion overwrites instead of duplicating
        CREATE TABLE IF NOT EXISTS posts (
            id TEXT PRIMARY KEY,               -- hex digest of uri
            uri TEXT NOT NULL,
            cid TEXT NOT NULL,
            author TEXT NOT NULL,
            text TEXT NOT NULL,
            reply_parent TEXT,
            reply_root TEXT,
            embed_record_uri TEXT,             -- quoted/linked record, if any
            embed_external_uri TEXT,           -- external link card, if any
            tags TEXT NOT NULL,                -- JSON array of author tags
            algo_tags TEXT NOT NULL,           -- JSON array of matching algorithm names
            indexed_at INTEGER NOT NULL        -- epoch millis, set at ingestion
        );

        -- Per-algorithm aggregate collections, holding refreshed engagement
        -- counts for posts that crossed the grouping threshold
        CREATE TABLE IF NOT EXISTS algo_aggregates (
            collection TEXT NOT NULL,          -- e.g. 'ratiod_posts'
            id TEXT NOT NULL,                  -- canonical target post URI
            indexed_at INTEGER NOT NULL,
            likes INTEGER NOT NULL DEFAULT 0,
            replies INTEGER NOT NULL DEFAULT 0,
            reposts INTEGER NOT NULL DEFAULT 0,
            quotes INTEGER NOT NULL DEFAULT 0,
            quoted_post_uri TEXT,
            sort_weight REAL NOT NULL DEFAULT 0,
            PRIMARY KEY (collection, id)
        );

        -- Scan state — tracks the firehose resumption cursor and
        -- per-algorithm bookkeeping
        CREATE TABLE IF NOT EXISTS scan_state (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Index for feed queries: latest posts for a tag, newest first
        CREATE INDEX IF NOT EXISTS idx_posts_indexed_at
            ON posts(indexed_at DESC);

        -- Index for deletion events, which arrive keyed by uri
        CREATE INDEX IF NOT EXISTS idx_posts_uri
            ON posts(uri);
        ",
    )
    .context("Failed to create database tables")?;

    // Record initial schema version if not already set
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [1],
    )?;

    Ok(())
}

/// Count the number of tables in the database (useful for init confirmation).
pub fn table_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_tables_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        // Running create_tables twice should not error
        create_tables(&conn).unwrap();
        create_tables(&conn).unwrap();
    }

    #[test]
    fn test_table_count() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        let count = table_count(&conn).unwrap();
        // schema_version, posts, algo_aggregates, scan_state = 4 tables
        assert_eq!(count, 4i64);
    }
}
