// Post classification — pure transformation from raw commit ops to
// candidate posts and deletions. No I/O, no side effects.
//
// The language filter is strict single-language: a post qualifies only when
// its declared language set is exactly ["en"]. Zero, multiple, or non-English
// tags all exclude — this is not a "contains English" check.

use crate::db::models::{CandidatePost, EmbedRef};
use crate::firehose::events::{CommitEvent, OpAction, PostRecord, RepoOp, POST_COLLECTION};

/// The outcome of classifying one commit: post uris to delete, and
/// normalized candidates to run through the algorithm filters.
///
/// Candidates come out with `id` and `algo_tags` empty — the pipeline fills
/// both after the filter fan-out.
#[derive(Debug, Default)]
pub struct ClassifiedOps {
    pub deleted_uris: Vec<String>,
    pub candidates: Vec<CandidatePost>,
}

/// Split a commit's ops into deletions and candidate posts.
///
/// `indexed_at` is the ingestion timestamp stamped onto every candidate —
/// the caller supplies it once per batch.
pub fn classify_commit(commit: &CommitEvent, indexed_at: i64) -> ClassifiedOps {
    let mut out = ClassifiedOps::default();

    for op in &commit.ops {
        if op.collection != POST_COLLECTION {
            continue;
        }
        match op.action {
            OpAction::Delete => out.deleted_uris.push(op.uri.clone()),
            OpAction::Create => {
                let Some(record) = &op.record else { continue };
                if !is_english_only(record) {
                    continue;
                }
                out.candidates.push(to_candidate(op, record, indexed_at));
            }
        }
    }

    out
}

/// True when the declared language set is exactly ["en"].
fn is_english_only(record: &PostRecord) -> bool {
    matches!(record.langs.as_deref(), Some([lang]) if lang == "en")
}

fn to_candidate(op: &RepoOp, record: &PostRecord, indexed_at: i64) -> CandidatePost {
    let embed = record.embed.as_ref().map(|e| EmbedRef {
        record_uri: e.record.as_ref().map(|r| r.uri.clone()),
        external_uri: e.external.as_ref().map(|x| x.uri.clone()),
    });

    CandidatePost {
        id: String::new(),
        uri: op.uri.clone(),
        cid: op.cid.clone().unwrap_or_default(),
        author: op.author.clone(),
        text: record.text.clone(),
        reply_parent: record.reply.as_ref().map(|r| r.parent.uri.clone()),
        reply_root: record.reply.as_ref().map(|r| r.root.uri.clone()),
        embed,
        tags: record.tags.clone().unwrap_or_default(),
        algo_tags: Vec::new(),
        indexed_at,
    }
}
