// AT Protocol client — XRPC over HTTP with app-password session auth.
//
// A thin reqwest wrapper with generic XRPC GET/POST helpers and hand-rolled
// serde types for the handful of fields we consume. `login` performs
// com.atproto.server.createSession and keeps the access JWT for subsequent
// calls; a failed login is a startup-fatal error for the daemon.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use super::traits::{MetricsClient, PostMetrics};

/// Default service endpoint for session auth and feed reads.
pub const DEFAULT_SERVICE_URL: &str = "https://bsky.social";

/// Authenticated HTTP client for AT Protocol XRPC endpoints.
pub struct BskyClient {
    client: reqwest::Client,
    base_url: String,
    /// Access JWT from createSession; None until login succeeds.
    access_jwt: RwLock<Option<String>>,
}

impl BskyClient {
    /// Create a new client pointing at the given service base URL.
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("cinder/0.1 (feed-generation)")
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_jwt: RwLock::new(None),
        })
    }

    /// Create a session with the given handle and app password.
    ///
    /// Must succeed before the daemon starts consuming events — a failed
    /// login is fatal, not retried.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<()> {
        let url = format!("{}/xrpc/com.atproto.server.createSession", self.base_url);
        let body = CreateSessionRequest {
            identifier,
            password,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("createSession request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            anyhow::bail!("createSession returned {status} for {identifier}");
        }

        let session: CreateSessionResponse = response
            .json()
            .await
            .context("Failed to deserialize createSession response")?;

        debug!(did = session.did, "Session created");
        *self.access_jwt.write().await = Some(session.access_jwt);
        Ok(())
    }

    /// Make a GET request to an XRPC endpoint and deserialize the response.
    ///
    /// `nsid` is the XRPC method name (e.g. "app.bsky.feed.getPosts").
    /// `params` are query string key-value pairs.
    pub async fn xrpc_get<T: DeserializeOwned>(
        &self,
        nsid: &str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        let url = format!("{}/xrpc/{}", self.base_url, nsid);

        debug!(nsid = nsid, "XRPC GET request");

        let mut request = self.client.get(&url).query(params);
        if let Some(jwt) = self.access_jwt.read().await.as_deref() {
            request = request.bearer_auth(jwt);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("XRPC request failed: {nsid}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("XRPC {nsid} returned {status}: {body}");
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to deserialize {nsid} response"))
    }
}

#[async_trait]
impl MetricsClient for BskyClient {
    async fn fetch_post_metrics(&self, uri: &str) -> Result<PostMetrics> {
        let output: GetPostsResponse = self
            .xrpc_get("app.bsky.feed.getPosts", &[("uris", uri)])
            .await
            .with_context(|| format!("Failed to fetch metrics for {uri}"))?;

        let view = output
            .posts
            .into_iter()
            .next()
            .with_context(|| format!("Post not found: {uri}"))?;

        Ok(PostMetrics {
            likes: view.like_count.unwrap_or(0),
            replies: view.reply_count.unwrap_or(0),
            reposts: view.repost_count.unwrap_or(0),
            text: view.record.and_then(|r| r.text).unwrap_or_default(),
            embed_target: view.embed.and_then(|e| e.record).and_then(|r| r.uri),
        })
    }
}

// -- Serde types for com.atproto.server.createSession --

#[derive(Serialize)]
struct CreateSessionRequest<'a> {
    identifier: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct CreateSessionResponse {
    did: String,
    #[serde(rename = "accessJwt")]
    access_jwt: String,
}

// -- Serde types for app.bsky.feed.getPosts --
//
// Only the fields the re-score path consumes; everything else in the post
// view is ignored during deserialization.

#[derive(Debug, Deserialize)]
struct GetPostsResponse {
    posts: Vec<PostView>,
}

#[derive(Debug, Deserialize)]
struct PostView {
    #[serde(rename = "likeCount")]
    like_count: Option<u32>,
    #[serde(rename = "replyCount")]
    reply_count: Option<u32>,
    #[serde(rename = "repostCount")]
    repost_count: Option<u32>,
    record: Option<PostViewRecord>,
    embed: Option<PostViewEmbed>,
}

#[derive(Debug, Deserialize)]
struct PostViewRecord {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostViewEmbed {
    record: Option<EmbeddedRecord>,
}

#[derive(Debug, Deserialize)]
struct EmbeddedRecord {
    uri: Option<String>,
}
