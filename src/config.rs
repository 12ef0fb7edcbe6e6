use std::env;
use std::time::Duration;

use anyhow::Result;

/// Central configuration loaded from environment variables.
///
/// All secrets come from env vars (never hardcoded). The .env file
/// is loaded automatically at startup via dotenvy.
pub struct Config {
    /// Account used for the remote metrics session.
    pub bluesky_handle: String,
    pub bluesky_app_password: String,
    /// Service endpoint for session auth and feed reads
    /// (defaults to https://bsky.social).
    pub service_url: String,
    /// Relay endpoint the event source polls for batches.
    pub relay_url: String,
    pub db_path: String,
    /// How often the ratiod maintenance job fires.
    pub ratiod_interval: Duration,
    /// How often the discourse maintenance job fires.
    pub discourse_interval: Duration,
    /// Posts older than this lose their algorithm tags.
    pub retention: Duration,
    /// Minimum replies pointing at a target before it becomes a candidate.
    pub ratiod_threshold: u32,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Only db_path and the tuning values have defaults — credentials and
    /// the relay URL are required for `run` and checked by the validators.
    pub fn load() -> Result<Self> {
        Ok(Self {
            bluesky_handle: env::var("BLUESKY_HANDLE").unwrap_or_default(),
            bluesky_app_password: env::var("BLUESKY_APP_PASSWORD").unwrap_or_default(),
            service_url: env::var("CINDER_SERVICE_URL")
                .unwrap_or_else(|_| crate::bluesky::client::DEFAULT_SERVICE_URL.to_string()),
            relay_url: env::var("CINDER_RELAY_URL").unwrap_or_default(),
            db_path: env::var("CINDER_DB_PATH").unwrap_or_else(|_| "./cinder.db".to_string()),
            ratiod_interval: duration_secs("CINDER_RATIOD_INTERVAL_SECS", 600)?,
            discourse_interval: duration_secs("CINDER_DISCOURSE_INTERVAL_SECS", 900)?,
            retention: Duration::from_secs(parse_or("CINDER_RETENTION_HOURS", 24u64)? * 3600),
            ratiod_threshold: parse_or("CINDER_RATIOD_THRESHOLD", 5)?,
        })
    }

    /// Check that the remote session credentials are configured.
    /// Call this before `run` — a missing credential is startup-fatal.
    pub fn require_credentials(&self) -> Result<()> {
        if self.bluesky_handle.is_empty() {
            anyhow::bail!(
                "BLUESKY_HANDLE not set. Add it to your .env file.\n\
                 See .env.example for the required variables."
            );
        }
        if self.bluesky_app_password.is_empty() {
            anyhow::bail!(
                "BLUESKY_APP_PASSWORD not set. The metrics session requires it.\n\
                 Add it to your .env file. See .env.example for details."
            );
        }
        Ok(())
    }

    /// Check that the event-source relay is configured.
    pub fn require_relay(&self) -> Result<()> {
        if self.relay_url.is_empty() {
            anyhow::bail!(
                "CINDER_RELAY_URL not set. The ingestion pipeline needs an\n\
                 event source to consume. Add it to your .env file."
            );
        }
        Ok(())
    }
}

fn duration_secs(var: &str, default_secs: u64) -> Result<Duration> {
    Ok(Duration::from_secs(parse_or(var, default_secs)?))
}

fn parse_or<T: std::str::FromStr>(var: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(var) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {var}: {e}")),
        Err(_) => Ok(default),
    }
}
