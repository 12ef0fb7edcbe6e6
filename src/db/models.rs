// Data models — Rust structs that map to database rows.
//
// These are the types that flow through the application. They're separate
// from the database queries so other modules can use them without depending
// on rusqlite directly.

use serde::{Deserialize, Serialize};

/// A normalized post that passed classification and matched at least one
/// algorithm. The `id` is a content-addressed key derived from `uri`, so
/// re-ingesting the same post overwrites rather than duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidatePost {
    /// Hex digest of the first 12 bytes of SHA-256(uri) — 24 hex chars.
    pub id: String,
    pub uri: String,
    pub cid: String,
    pub author: String,
    pub text: String,
    pub reply_parent: Option<String>,
    pub reply_root: Option<String>,
    pub embed: Option<EmbedRef>,
    /// Author-supplied tags from the post record.
    pub tags: Vec<String>,
    /// Names of the algorithms that matched this post. A post is only
    /// persisted when this is non-empty.
    pub algo_tags: Vec<String>,
    /// Ingestion timestamp in epoch milliseconds, set by the pipeline.
    pub indexed_at: i64,
}

impl CandidatePost {
    /// The canonical target this post points at: a quoted/linked post if
    /// present, else the immediate reply parent. Posts with neither have
    /// no target and are excluded from aggregation.
    pub fn canonical_target(&self) -> Option<&str> {
        self.embed
            .as_ref()
            .and_then(|e| e.record_uri.as_deref())
            .or(self.reply_parent.as_deref())
    }
}

/// A structured embed reference on a post — a quoted/linked record and/or
/// an external link card.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbedRef {
    /// URI of a quoted or linked record, if any.
    pub record_uri: Option<String>,
    /// URL of an external link card, if any.
    pub external_uri: Option<String>,
}

/// A per-algorithm aggregate row holding refreshed engagement counts and the
/// computed sort weight. Keyed by the canonical target post URI; lives in a
/// named collection (e.g. "ratiod_posts").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredAggregate {
    /// Canonical target post URI.
    pub id: String,
    pub indexed_at: i64,
    pub likes: u32,
    pub replies: u32,
    pub reposts: u32,
    pub quotes: u32,
    /// Set only when the live embed target looks like a post link.
    pub quoted_post_uri: Option<String>,
    /// 0.0 when the post is judged not to qualify.
    pub sort_weight: f64,
}

impl ScoredAggregate {
    /// An aggregate with all counts and the weight zeroed — what gets stored
    /// when the live metrics fetch for a candidate fails.
    pub fn zeroed(id: String, indexed_at: i64) -> Self {
        Self {
            id,
            indexed_at,
            likes: 0,
            replies: 0,
            reposts: 0,
            quotes: 0,
            quoted_post_uri: None,
            sort_weight: 0.0,
        }
    }
}
