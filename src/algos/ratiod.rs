// Ratiod — surfaces posts getting "ratioed": reply volume far outrunning
// positive engagement.
//
// The hot filter admits replies into other people's threads. The periodic
// task prunes stale candidates, aggregates tagged replies by the post they
// point at, and re-scores every aggregate from live engagement metrics.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use super::AlgoManager;
use crate::bluesky::{MetricsClient, PostMetrics};
use crate::db::models::{CandidatePost, ScoredAggregate};
use crate::db::Database;
use crate::feed::{FeedItem, FeedParams};

pub const SHORTNAME: &str = "ratiod";

/// Aggregate collection holding the re-scored candidate set.
pub const AGGREGATE_COLLECTION: &str = "ratiod_posts";

/// At most this many target posts are tracked per aggregation pass.
const AGGREGATE_LIMIT: u32 = 100;

/// Concurrent in-flight metrics fetches during re-scoring.
const FETCH_CONCURRENCY: usize = 8;

pub struct RatiodManager {
    db: Arc<dyn Database>,
    metrics: Arc<dyn MetricsClient>,
    interval: Duration,
    /// Posts older than this stop being reconsidered as candidates.
    retention: Duration,
    /// Minimum replies pointing at a target before it becomes a candidate.
    threshold: u32,
}

impl RatiodManager {
    pub fn new(
        db: Arc<dyn Database>,
        metrics: Arc<dyn MetricsClient>,
        interval: Duration,
        retention: Duration,
        threshold: u32,
    ) -> Self {
        Self {
            db,
            metrics,
            interval,
            retention,
            threshold,
        }
    }

    /// Refresh one candidate from a fetch outcome.
    ///
    /// A failed fetch zeroes the stored counts and weight; the candidate
    /// stays in the collection and gets another chance next interval.
    fn refreshed_record(
        candidate: &ScoredAggregate,
        outcome: Result<PostMetrics>,
    ) -> (ScoredAggregate, bool) {
        match outcome {
            Ok(metrics) => {
                let likes = metrics.likes;
                let replies = metrics.replies;
                let reposts = metrics.reposts;
                // No independent quote count is obtainable from the live
                // response; fixed to 0.
                let quotes = 0;
                let record = ScoredAggregate {
                    id: candidate.id.clone(),
                    indexed_at: candidate.indexed_at,
                    likes,
                    replies,
                    reposts,
                    quotes,
                    quoted_post_uri: detect_quoted_post(metrics.embed_target.as_deref()),
                    sort_weight: ratiod_weight(&metrics.text, replies, quotes, likes, reposts),
                };
                (record, true)
            }
            Err(e) => {
                warn!(uri = candidate.id, error = %e, "Cannot retrieve post, zeroing");
                (
                    ScoredAggregate::zeroed(candidate.id.clone(), candidate.indexed_at),
                    false,
                )
            }
        }
    }
}

#[async_trait]
impl AlgoManager for RatiodManager {
    fn name(&self) -> &'static str {
        SHORTNAME
    }

    /// A post qualifies only if it is a reply into someone else's thread —
    /// the thread root's author must differ from the replying author.
    async fn filter_post(&self, post: &CandidatePost) -> Result<bool> {
        Ok(is_foreign_reply(post))
    }

    async fn periodic_task(&self) -> Result<()> {
        let now = Utc::now().timestamp_millis();

        // 1. Stop reconsidering stale candidates.
        let cutoff = now - self.retention.as_millis() as i64;
        let pruned = self.db.remove_tag_from_old_posts(SHORTNAME, cutoff).await?;
        if pruned > 0 {
            info!(pruned, "{SHORTNAME}: pruned stale tags");
        }

        // 2. Refresh the candidate set from currently-tagged replies.
        self.db
            .aggregate_posts_by_target(SHORTNAME, self.threshold, AGGREGATE_COLLECTION, AGGREGATE_LIMIT)
            .await?;

        // 3. Re-score every candidate from live metrics. Fetches overlap;
        //    writes are sequential. One candidate failing never aborts the
        //    rest of the run.
        let candidates = self.db.get_collection(AGGREGATE_COLLECTION).await?;
        info!("{SHORTNAME}: {} posts updating...", candidates.len());

        let outcomes: Vec<(ScoredAggregate, Result<PostMetrics>)> =
            stream::iter(candidates.iter().cloned().map(|candidate| async move {
                let outcome = self.metrics.fetch_post_metrics(&candidate.id).await;
                (candidate, outcome)
            }))
            .buffer_unordered(FETCH_CONCURRENCY)
            .collect()
            .await;

        let mut refreshed = 0;
        for (candidate, outcome) in outcomes {
            let (record, from_server) = Self::refreshed_record(&candidate, outcome);
            if from_server {
                refreshed += 1;
            }
            if let Err(e) = self.db.upsert_aggregate(AGGREGATE_COLLECTION, &record).await {
                warn!(uri = record.id, error = %e, "Failed to store aggregate, skipping");
            }
        }

        info!(
            "{SHORTNAME}: {} candidates ({} refreshed from server)",
            candidates.len(),
            refreshed
        );
        Ok(())
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn cache_age(&self, _params: &FeedParams) -> u64 {
        60
    }

    /// The feed serves the post being ratioed, not the tagged reply: the
    /// quoted/linked record if present, else the reply parent. Rows with
    /// neither are skipped.
    fn feed_item(&self, post: &CandidatePost) -> Option<FeedItem> {
        post.canonical_target().map(|uri| FeedItem {
            post: uri.to_string(),
        })
    }
}

/// True when the post replies into a thread rooted by a different author.
/// Self-replies and self-threads never enter the candidate set.
pub fn is_foreign_reply(post: &CandidatePost) -> bool {
    match post.reply_root.as_deref() {
        // at://<did>/<collection>/<rkey> — segment 2 is the author DID
        Some(root) => root.split('/').nth(2) != Some(post.author.as_str()),
        None => false,
    }
}

/// Literal cues marking posts designed to invite replies — those would look
/// "ratiod" by volume alone and are disqualified outright.
const BAIT_CUES: [&str; 4] = ["reply with", "respond with", "?", "q&a"];

/// The classification heuristic: is this post genuinely ratioed?
pub fn ratiod_algorithm(text: &str, replies: u32, quotes: u32, likes: u32, reposts: u32) -> bool {
    let lowered = text.to_lowercase();
    if BAIT_CUES.iter().any(|cue| lowered.contains(cue)) {
        return false;
    }

    let controversial = (replies + quotes) as f64;
    let positive = (likes + reposts) as f64;
    let is_controversial = controversial > 10.0;
    let repost_threshold = reposts as f64 * 10.0;
    let is_ratiod = controversial > positive * 0.85 && controversial > repost_threshold;
    is_controversial && is_ratiod
}

/// Sort weight for a qualifying post, else 0.
///
/// The formula is reproduced with its literal operator precedence — the
/// division binds to `quotes` alone, not the whole numerator. When
/// `likes + reposts` is 0 the division is undefined; any non-finite result
/// is clamped to 0 before storage.
pub fn ratiod_weight(text: &str, replies: u32, quotes: u32, likes: u32, reposts: u32) -> f64 {
    if !ratiod_algorithm(text, replies, quotes, likes, reposts) {
        return 0.0;
    }
    let weight =
        replies as f64 + quotes as f64 / ((likes as f64 + reposts as f64) * 0.85);
    if weight.is_finite() {
        weight
    } else {
        0.0
    }
}

/// A live embed target counts as a quoted post only when its URI carries
/// both the host marker and a post-path marker.
fn detect_quoted_post(embed_target: Option<&str>) -> Option<String> {
    let uri = embed_target?;
    let lowered = uri.to_lowercase();
    if lowered.contains("bsky.app") && lowered.contains("/post/") {
        Some(uri.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(author: &str, reply_root: Option<&str>) -> CandidatePost {
        CandidatePost {
            id: String::new(),
            uri: "at://did:plc:replier/app.bsky.feed.post/1".to_string(),
            cid: "bafy".to_string(),
            author: author.to_string(),
            text: String::new(),
            reply_parent: reply_root.map(String::from),
            reply_root: reply_root.map(String::from),
            embed: None,
            tags: vec![],
            algo_tags: vec![],
            indexed_at: 0,
        }
    }

    #[test]
    fn test_foreign_reply_qualifies() {
        let post = reply(
            "did:plc:replier",
            Some("at://did:plc:other/app.bsky.feed.post/root"),
        );
        assert!(is_foreign_reply(&post));
    }

    #[test]
    fn test_self_reply_excluded() {
        let post = reply(
            "did:plc:replier",
            Some("at://did:plc:replier/app.bsky.feed.post/root"),
        );
        assert!(!is_foreign_reply(&post));
    }

    #[test]
    fn test_non_reply_excluded() {
        let post = reply("did:plc:replier", None);
        assert!(!is_foreign_reply(&post));
    }

    #[test]
    fn test_worked_example_qualifies() {
        // controversial = 25 > 10; 25 > (5+1)*0.85 = 5.1; 25 > 1*10 = 10
        assert!(ratiod_algorithm("great point", 20, 0, 5, 1));
        let weight = ratiod_weight("great point", 20, 0, 5, 1);
        // 20 + 0 / (6 * 0.85) = 20
        assert!((weight - 20.0).abs() < 1e-9, "got {weight}");
    }

    #[test]
    fn test_bait_text_disqualifies() {
        // "?" alone is a cue, as are the literal phrases
        assert!(!ratiod_algorithm("reply with your take?", 20, 0, 5, 1));
        assert!((ratiod_weight("reply with your take?", 20, 0, 5, 1) - 0.0).abs() < 1e-9);
        assert!(!ratiod_algorithm("thoughts?", 20, 0, 5, 1));
        assert!(!ratiod_algorithm("Q&A tonight", 20, 0, 5, 1));
        assert!(!ratiod_algorithm("RESPOND WITH one word", 20, 0, 5, 1));
    }

    #[test]
    fn test_low_volume_not_controversial() {
        // controversial = 8 fails the > 10 gate
        assert!(!ratiod_algorithm("great point", 8, 0, 1, 0));
    }

    #[test]
    fn test_popular_post_not_ratiod() {
        // 20 replies vs 100 likes: 20 < 100 * 0.85
        assert!(!ratiod_algorithm("great point", 20, 0, 100, 0));
    }

    #[test]
    fn test_high_reposts_block_ratio() {
        // controversial = 25, reposts = 3 → 25 < 30 fails the repost gate
        assert!(!ratiod_algorithm("great point", 25, 0, 5, 3));
    }

    #[test]
    fn test_weight_precedence_is_literal() {
        // 20 + 4 / ((10 + 2) * 0.85) = 20 + 4/10.2 ≈ 20.392, not
        // (20 + 4) / 10.2 ≈ 2.35 — the division binds to quotes alone.
        let weight = ratiod_weight("great point", 20, 4, 10, 2);
        assert!((weight - (20.0 + 4.0 / 10.2)).abs() < 1e-9, "got {weight}");
    }

    #[test]
    fn test_weight_zero_positive_is_clamped() {
        // likes + reposts = 0 makes the divisor 0; quotes/0 is non-finite
        // and the stored weight clamps to 0.
        let weight = ratiod_weight("great point", 20, 5, 0, 0);
        assert!((weight - 0.0).abs() < 1e-9, "got {weight}");
        // quotes = 0 gives 0/0 (NaN) — same clamp.
        let weight = ratiod_weight("great point", 20, 0, 0, 0);
        assert!((weight - 0.0).abs() < 1e-9, "got {weight}");
    }

    #[test]
    fn test_detect_quoted_post() {
        assert_eq!(
            detect_quoted_post(Some("https://bsky.app/profile/a/post/xyz")),
            Some("https://bsky.app/profile/a/post/xyz".to_string())
        );
        // Host marker without post path
        assert_eq!(detect_quoted_post(Some("https://bsky.app/profile/a")), None);
        // Post path on another host
        assert_eq!(detect_quoted_post(Some("https://example.com/post/xyz")), None);
        assert_eq!(detect_quoted_post(None), None);
    }
}
