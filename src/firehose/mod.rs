// Firehose layer — event model, classification, and the ingestion pipeline.

pub mod classifier;
pub mod events;
pub mod ingest;
pub mod source;

pub use ingest::{stable_id, IngestionPipeline};
pub use source::EventSource;
