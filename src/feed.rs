// Feed skeleton — the read contract the serving layer consumes.
//
// The cursor format is exactly "<epochMillisOfIndexedAt>::<cid>" of the last
// returned record. The serving layer round-trips it opaquely, so the shape
// is load-bearing for interoperability and must not change.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::algos::AlgoManager;
use crate::db::Database;

/// Query parameters for one feed page.
#[derive(Debug, Clone, Default)]
pub struct FeedParams {
    pub limit: u32,
    pub cursor: Option<String>,
}

/// One served feed entry — just the post URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    pub post: String,
}

/// A page of feed items plus the cursor to resume after it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSkeleton {
    pub cursor: Option<String>,
    pub feed: Vec<FeedItem>,
}

/// Format a pagination cursor from the last returned record.
pub fn format_cursor(indexed_at: i64, cid: &str) -> String {
    format!("{indexed_at}::{cid}")
}

/// Parse a pagination cursor back into (indexed_at, cid).
pub fn parse_cursor(cursor: &str) -> Result<(i64, String)> {
    let (millis, cid) = cursor
        .split_once("::")
        .with_context(|| format!("Malformed cursor: {cursor}"))?;
    let millis: i64 = millis
        .parse()
        .with_context(|| format!("Malformed cursor timestamp: {cursor}"))?;
    Ok((millis, cid.to_string()))
}

/// Build one page of a feed: the latest posts carrying the manager's tag,
/// mapped through the manager's item projection, newest first.
pub async fn feed_skeleton(
    db: &Arc<dyn Database>,
    manager: &Arc<dyn AlgoManager>,
    params: &FeedParams,
) -> Result<FeedSkeleton> {
    let cursor = match &params.cursor {
        Some(raw) => Some(parse_cursor(raw)?),
        None => None,
    };

    let rows = db
        .get_posts_for_tag(manager.name(), params.limit, cursor)
        .await?;

    let feed = rows
        .iter()
        .filter_map(|post| manager.feed_item(post))
        .collect();

    let cursor = rows
        .last()
        .map(|last| format_cursor(last.indexed_at, &last.cid));

    Ok(FeedSkeleton { cursor, feed })
}
