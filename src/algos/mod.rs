// Algorithm managers — pluggable ranking strategies.
//
// Each algorithm implements AlgoManager: a fast filter on the hot ingestion
// path and a slow periodic maintenance job on the cold path. New algorithms
// are added by registering an implementation — the pipeline and scheduler
// never change.

pub mod discourse;
pub mod ratiod;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::watch;
use tracing::info;

use crate::db::models::CandidatePost;
use crate::feed::{FeedItem, FeedParams};

/// A pluggable ranking strategy.
#[async_trait]
pub trait AlgoManager: Send + Sync {
    /// Stable short identifier — used as the tag value and store partition
    /// key. Max 15 chars.
    fn name(&self) -> &'static str;

    /// Fast, side-effect-free predicate deciding whether a candidate belongs
    /// to this feed. Runs on the hot path for every post across every
    /// registered algorithm — no network, no heavy store calls.
    async fn filter_post(&self, post: &CandidatePost) -> Result<bool>;

    /// Periodic maintenance: prune stale tags, recompute scores. May read
    /// and write the store and call the remote metrics service freely.
    async fn periodic_task(&self) -> Result<()>;

    /// One-time setup at process start. Idempotent.
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    /// How often `periodic_task` fires.
    fn interval(&self) -> Duration;

    /// How long downstream read responses for this algorithm may be cached,
    /// in seconds. A policy value for the serving layer, not behavior here.
    fn cache_age(&self, _params: &FeedParams) -> u64 {
        60
    }

    /// Map a stored post to the item the feed serves for it. Algorithms that
    /// rank a target rather than the tagged post itself override this;
    /// returning None skips the row.
    fn feed_item(&self, post: &CandidatePost) -> Option<FeedItem> {
        Some(FeedItem {
            post: post.uri.clone(),
        })
    }
}

/// The process-wide set of registered algorithms, built once at startup and
/// passed by reference into the pipeline, the scheduler, and the feed
/// builder. No implicit global lookup.
pub struct AlgoRegistry {
    managers: Vec<Arc<dyn AlgoManager>>,
    started_tx: watch::Sender<bool>,
    started_rx: watch::Receiver<bool>,
}

impl AlgoRegistry {
    pub fn new(managers: Vec<Arc<dyn AlgoManager>>) -> Self {
        let (started_tx, started_rx) = watch::channel(false);
        Self {
            managers,
            started_tx,
            started_rx,
        }
    }

    pub fn managers(&self) -> &[Arc<dyn AlgoManager>] {
        &self.managers
    }

    /// Look up a manager by its stable name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn AlgoManager>> {
        self.managers.iter().find(|m| m.name() == name)
    }

    /// Run every manager's one-time setup, then mark the registry ready.
    ///
    /// Any setup failure is fatal — the pipeline must never evaluate a post
    /// against a half-initialized algorithm.
    pub async fn start_all(&self) -> Result<()> {
        for manager in &self.managers {
            manager.start().await?;
            info!(algo = manager.name(), "Started");
        }
        // Receivers hold clones, so send only fails when nothing will ever
        // await ready() — ignore.
        let _ = self.started_tx.send(true);
        Ok(())
    }

    /// Resolve once `start_all` has completed. The ingestion pipeline awaits
    /// this before running any filter.
    pub async fn ready(&self) {
        let mut rx = self.started_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullAlgo;

    #[async_trait]
    impl AlgoManager for NullAlgo {
        fn name(&self) -> &'static str {
            "null"
        }
        async fn filter_post(&self, _post: &CandidatePost) -> Result<bool> {
            Ok(false)
        }
        async fn periodic_task(&self) -> Result<()> {
            Ok(())
        }
        fn interval(&self) -> Duration {
            Duration::from_secs(60)
        }
    }

    #[tokio::test]
    async fn test_ready_resolves_after_start_all() {
        let registry = Arc::new(AlgoRegistry::new(vec![Arc::new(NullAlgo)]));

        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry.ready().await;
            })
        };
        // ready() must still be pending before start_all
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        registry.start_all().await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("ready() should resolve once start_all completes")
            .unwrap();
    }

    #[tokio::test]
    async fn test_lookup_by_name() {
        let registry = AlgoRegistry::new(vec![Arc::new(NullAlgo)]);
        assert!(registry.get("null").is_some());
        assert!(registry.get("missing").is_none());
    }
}
