// Database queries — CRUD operations for all tables.
//
// Every database interaction goes through this module. This keeps SQL
// contained in one place and gives the rest of the app clean Rust interfaces.
//
// Tag arrays are stored as JSON text; tag membership tests use a LIKE match
// on the quoted tag name, which is exact because tag names never contain
// quotes.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::models::{CandidatePost, EmbedRef, ScoredAggregate};

/// LIKE pattern matching a JSON-encoded tag array containing `tag`.
fn tag_pattern(tag: &str) -> String {
    format!("%\"{tag}\"%")
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<CandidatePost> {
    let embed_record_uri: Option<String> = row.get(7)?;
    let embed_external_uri: Option<String> = row.get(8)?;
    let embed = if embed_record_uri.is_some() || embed_external_uri.is_some() {
        Some(EmbedRef {
            record_uri: embed_record_uri,
            external_uri: embed_external_uri,
        })
    } else {
        None
    };

    let tags_json: String = row.get(9)?;
    let algo_tags_json: String = row.get(10)?;

    Ok(CandidatePost {
        id: row.get(0)?,
        uri: row.get(1)?,
        cid: row.get(2)?,
        author: row.get(3)?,
        text: row.get(4)?,
        reply_parent: row.get(5)?,
        reply_root: row.get(6)?,
        embed,
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        algo_tags: serde_json::from_str(&algo_tags_json).unwrap_or_default(),
        indexed_at: row.get(11)?,
    })
}

const POST_COLUMNS: &str = "id, uri, cid, author, text, reply_parent, reply_root, \
     embed_record_uri, embed_external_uri, tags, algo_tags, indexed_at";

// --- Scan state ---

/// Get a scan state value by key (e.g., "firehose_cursor").
pub fn get_scan_state(conn: &Connection, key: &str) -> Result<Option<String>> {
    let mut stmt = conn.prepare("SELECT value FROM scan_state WHERE key = ?1")?;
    let result = stmt.query_row(params![key], |row| row.get(0)).optional()?;
    Ok(result)
}

/// Set a scan state value (upsert).
pub fn set_scan_state(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO scan_state (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
        params![key, value],
    )?;
    Ok(())
}

// --- Posts ---

/// Insert or fully replace a tagged post, keyed by its content-addressed id.
///
/// The record is overwritten whole rather than merged — replaying a batch
/// after a restart converges to the same stored state.
pub fn upsert_post(conn: &Connection, post: &CandidatePost) -> Result<()> {
    let tags_json = serde_json::to_string(&post.tags)?;
    let algo_tags_json = serde_json::to_string(&post.algo_tags)?;
    let (embed_record_uri, embed_external_uri) = match &post.embed {
        Some(e) => (e.record_uri.as_deref(), e.external_uri.as_deref()),
        None => (None, None),
    };
    conn.execute(
        "INSERT INTO posts (id, uri, cid, author, text, reply_parent, reply_root,
                            embed_record_uri, embed_external_uri, tags, algo_tags, indexed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
         ON CONFLICT(id) DO UPDATE SET
            uri = ?2, cid = ?3, author = ?4, text = ?5,
            reply_parent = ?6, reply_root = ?7,
            embed_record_uri = ?8, embed_external_uri = ?9,
            tags = ?10, algo_tags = ?11, indexed_at = ?12",
        params![
            post.id,
            post.uri,
            post.cid,
            post.author,
            post.text,
            post.reply_parent,
            post.reply_root,
            embed_record_uri,
            embed_external_uri,
            tags_json,
            algo_tags_json,
            post.indexed_at,
        ],
    )
    .context("Failed to upsert post")?;
    Ok(())
}

/// Delete posts by uri. Returns how many rows were removed.
pub fn delete_posts_by_uri(conn: &Connection, uris: &[String]) -> Result<usize> {
    let mut deleted = 0;
    for uri in uris {
        deleted += conn.execute("DELETE FROM posts WHERE uri = ?1", params![uri])?;
    }
    Ok(deleted)
}

/// Get a post by its content-addressed id.
pub fn get_post_by_id(conn: &Connection, id: &str) -> Result<Option<CandidatePost>> {
    let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let result = stmt.query_row(params![id], post_from_row).optional()?;
    Ok(result)
}

/// Latest posts carrying a given algorithm tag, newest first.
///
/// `cursor` is the (indexed_at, cid) of the last record a previous page
/// returned; rows at or after that point are excluded.
pub fn get_posts_for_tag(
    conn: &Connection,
    tag: &str,
    limit: u32,
    cursor: Option<(i64, &str)>,
) -> Result<Vec<CandidatePost>> {
    let pattern = tag_pattern(tag);
    let sql = format!(
        "SELECT {POST_COLUMNS} FROM posts
         WHERE algo_tags LIKE ?1
           AND (indexed_at < ?2 OR (indexed_at = ?2 AND cid < ?3))
         ORDER BY indexed_at DESC, cid DESC
         LIMIT ?4"
    );
    let (cursor_millis, cursor_cid) = match cursor {
        Some((millis, cid)) => (millis, cid.to_string()),
        // No cursor: a sentinel above every (indexed_at, cid) admits all rows
        // through the same query path.
        None => (i64::MAX, String::from("\u{10ffff}")),
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![pattern, cursor_millis, cursor_cid, limit],
        post_from_row,
    )?;

    let mut posts = Vec::new();
    for row in rows {
        posts.push(row?);
    }
    Ok(posts)
}

/// Count posts currently carrying a given algorithm tag.
pub fn count_posts_for_tag(conn: &Connection, tag: &str) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM posts WHERE algo_tags LIKE ?1",
        params![tag_pattern(tag)],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Remove an algorithm's tag from posts indexed before `cutoff_millis`, so
/// stale candidates stop being reconsidered. Posts whose tag set becomes
/// empty are deleted — a stored post always carries at least one tag.
///
/// Returns how many posts were touched.
pub fn remove_tag_from_old_posts(conn: &Connection, tag: &str, cutoff_millis: i64) -> Result<usize> {
    let mut stmt = conn.prepare(
        "SELECT id, algo_tags FROM posts WHERE indexed_at < ?1 AND algo_tags LIKE ?2",
    )?;
    let rows = stmt.query_map(params![cutoff_millis, tag_pattern(tag)], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut stale: Vec<(String, Vec<String>)> = Vec::new();
    for row in rows {
        let (id, tags_json) = row?;
        let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();
        stale.push((id, tags));
    }

    let mut touched = 0;
    for (id, mut tags) in stale {
        tags.retain(|t| t != tag);
        if tags.is_empty() {
            conn.execute("DELETE FROM posts WHERE id = ?1", params![id])?;
        } else {
            conn.execute(
                "UPDATE posts SET algo_tags = ?1 WHERE id = ?2",
                params![serde_json::to_string(&tags)?, id],
            )?;
        }
        touched += 1;
    }
    Ok(touched)
}

// --- Aggregate collections ---

/// Group posts carrying `tag` by their canonical target (embedded record if
/// present, else reply parent), and upsert every group meeting `threshold`
/// into the named aggregate collection, keyed by target URI.
///
/// Existing counts and weights are preserved — only `indexed_at` refreshes.
/// The re-score pass owns the counters. Returns the number of groups written.
pub fn aggregate_posts_by_target(
    conn: &Connection,
    tag: &str,
    threshold: u32,
    collection: &str,
    limit: u32,
) -> Result<usize> {
    let written = conn.execute(
        "INSERT INTO algo_aggregates
            (collection, id, indexed_at, likes, replies, reposts, quotes,
             quoted_post_uri, sort_weight)
         SELECT ?1, target, max_indexed_at, 0, 0, 0, 0, NULL, 0.0 FROM (
            SELECT COALESCE(embed_record_uri, reply_parent) AS target,
                   MAX(indexed_at) AS max_indexed_at,
                   COUNT(*) AS cnt
            FROM posts
            WHERE algo_tags LIKE ?2
              AND COALESCE(embed_record_uri, reply_parent) IS NOT NULL
            GROUP BY target
            HAVING cnt >= ?3
            ORDER BY cnt DESC
            LIMIT ?4
         )
         WHERE true
         ON CONFLICT(collection, id) DO UPDATE SET
            indexed_at = excluded.indexed_at",
        params![collection, tag_pattern(tag), threshold, limit],
    )
    .context("Failed to aggregate posts into collection")?;
    Ok(written)
}

fn aggregate_from_row(row: &Row<'_>) -> rusqlite::Result<ScoredAggregate> {
    Ok(ScoredAggregate {
        id: row.get(0)?,
        indexed_at: row.get(1)?,
        likes: row.get(2)?,
        replies: row.get(3)?,
        reposts: row.get(4)?,
        quotes: row.get(5)?,
        quoted_post_uri: row.get(6)?,
        sort_weight: row.get(7)?,
    })
}

/// All rows in a named aggregate collection, highest weight first.
pub fn get_collection(conn: &Connection, collection: &str) -> Result<Vec<ScoredAggregate>> {
    let mut stmt = conn.prepare(
        "SELECT id, indexed_at, likes, replies, reposts, quotes,
                quoted_post_uri, sort_weight
         FROM algo_aggregates
         WHERE collection = ?1
         ORDER BY sort_weight DESC, indexed_at DESC",
    )?;
    let rows = stmt.query_map(params![collection], aggregate_from_row)?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }
    Ok(records)
}

/// Insert or fully replace an aggregate record in a named collection.
pub fn upsert_aggregate(
    conn: &Connection,
    collection: &str,
    record: &ScoredAggregate,
) -> Result<()> {
    conn.execute(
        "INSERT INTO algo_aggregates
            (collection, id, indexed_at, likes, replies, reposts, quotes,
             quoted_post_uri, sort_weight)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(collection, id) DO UPDATE SET
            indexed_at = ?3, likes = ?4, replies = ?5, reposts = ?6,
            quotes = ?7, quoted_post_uri = ?8, sort_weight = ?9",
        params![
            collection,
            record.id,
            record.indexed_at,
            record.likes,
            record.replies,
            record.reposts,
            record.quotes,
            record.quoted_post_uri,
            record.sort_weight,
        ],
    )
    .context("Failed to upsert aggregate record")?;
    Ok(())
}
