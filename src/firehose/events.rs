// Event model — the shape of repository change events the pipeline consumes.
//
// The upstream transport is a black box; whatever adapter feeds the pipeline
// deserializes into these types. A batch carries a resumption cursor that is
// persisted after processing, so a restarted pipeline resumes where it left
// off and redelivery around the resume point is absorbed by idempotent
// upserts.

use serde::{Deserialize, Serialize};

/// Record collection NSID for posts — the only collection the pipeline tags.
pub const POST_COLLECTION: &str = "app.bsky.feed.post";

/// One batch of events from the source, with the cursor to resume after it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventBatch {
    pub cursor: Option<String>,
    #[serde(default)]
    pub events: Vec<RepoEvent>,
}

/// A single repository event. Only commits carry operations; anything else
/// (identity changes, account status, ...) is ignored by classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RepoEvent {
    Commit(CommitEvent),
    #[serde(other)]
    Other,
}

/// A batch of creations/deletions applied atomically upstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommitEvent {
    #[serde(default)]
    pub ops: Vec<RepoOp>,
}

/// A single create/delete of a repository record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoOp {
    pub action: OpAction,
    /// Record collection NSID, e.g. "app.bsky.feed.post".
    pub collection: String,
    pub uri: String,
    #[serde(default)]
    pub cid: Option<String>,
    /// DID of the repository owner (the posting account).
    pub author: String,
    /// Present for creations of post records.
    #[serde(default)]
    pub record: Option<PostRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpAction {
    Create,
    Delete,
}

/// The author-written content of a post record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostRecord {
    #[serde(default)]
    pub text: String,
    /// Declared languages; the classifier admits exactly ["en"].
    #[serde(default)]
    pub langs: Option<Vec<String>>,
    #[serde(default)]
    pub reply: Option<ReplyRef>,
    #[serde(default)]
    pub embed: Option<RecordEmbed>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// Thread references on a reply post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyRef {
    pub parent: StrongRef,
    pub root: StrongRef,
}

/// A reference to another record by uri.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrongRef {
    pub uri: String,
}

/// Embed block on a post record — a quoted record and/or external link.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordEmbed {
    #[serde(default)]
    pub record: Option<StrongRef>,
    #[serde(default)]
    pub external: Option<ExternalRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalRef {
    pub uri: String,
}
