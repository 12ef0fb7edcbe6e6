// Cinder: feed-generation ingestion and ranking pipeline for Bluesky.
//
// This is the library root. Each module corresponds to a major subsystem
// of the pipeline.

pub mod algos;
pub mod bluesky;
pub mod config;
pub mod db;
pub mod feed;
pub mod firehose;
pub mod scheduler;
