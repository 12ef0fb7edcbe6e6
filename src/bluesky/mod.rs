// Bluesky remote service layer — session auth and live post metrics.

pub mod client;
pub mod traits;

pub use client::BskyClient;
pub use traits::{MetricsClient, PostMetrics};
