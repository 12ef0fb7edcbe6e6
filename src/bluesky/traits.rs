// Metrics client trait — the swap-ready abstraction over the remote service.
//
// The periodic re-score path depends only on this trait, so tests substitute
// an in-memory double and the production BskyClient stays out of the loop.

use anyhow::Result;
use async_trait::async_trait;

/// Live engagement counts and content for a single post.
///
/// Missing fields on the wire default to 0 / None here — a post with no
/// like count is a post with zero likes.
#[derive(Debug, Clone, Default)]
pub struct PostMetrics {
    pub likes: u32,
    pub replies: u32,
    pub reposts: u32,
    pub text: String,
    /// URI of the record this post embeds (quote target), if any.
    pub embed_target: Option<String>,
}

/// Trait for fetching live post metrics. Implementations must be async
/// because the real provider is an HTTP API.
///
/// A failed fetch (not found, transient error, timeout) is an `Err` — the
/// caller treats it as absent data for that one post and moves on; it is
/// never fatal to a maintenance run.
#[async_trait]
pub trait MetricsClient: Send + Sync {
    /// Fetch current metrics for the post at `uri`.
    async fn fetch_post_metrics(&self, uri: &str) -> Result<PostMetrics>;
}
