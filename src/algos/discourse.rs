// Discourse — a topic feed of posts explicitly tagged into the discussion.
//
// The hot filter matches author-supplied tags or the hashtag in the text;
// maintenance is tag-retention pruning only, no network.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use super::AlgoManager;
use crate::db::models::CandidatePost;
use crate::db::Database;
use crate::feed::FeedParams;

pub const SHORTNAME: &str = "discourse";

pub struct DiscourseManager {
    db: Arc<dyn Database>,
    interval: Duration,
    retention: Duration,
}

impl DiscourseManager {
    pub fn new(db: Arc<dyn Database>, interval: Duration, retention: Duration) -> Self {
        Self {
            db,
            interval,
            retention,
        }
    }
}

#[async_trait]
impl AlgoManager for DiscourseManager {
    fn name(&self) -> &'static str {
        SHORTNAME
    }

    async fn filter_post(&self, post: &CandidatePost) -> Result<bool> {
        Ok(matches_discourse(post))
    }

    /// No scoring pass — just stop carrying posts past the retention window.
    async fn periodic_task(&self) -> Result<()> {
        let cutoff = Utc::now().timestamp_millis() - self.retention.as_millis() as i64;
        let pruned = self.db.remove_tag_from_old_posts(SHORTNAME, cutoff).await?;
        info!("{SHORTNAME}: {pruned} stale tags pruned");
        Ok(())
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    /// The feed is stable between maintenance runs; let readers cache longer.
    fn cache_age(&self, _params: &FeedParams) -> u64 {
        600
    }
}

/// Tagged into the feed by the author: a "discourse" tag on the record, or
/// the hashtag anywhere in the text (case-insensitive).
pub fn matches_discourse(post: &CandidatePost) -> bool {
    post.tags.iter().any(|t| t.eq_ignore_ascii_case(SHORTNAME))
        || post.text.to_lowercase().contains("#discourse")
}
