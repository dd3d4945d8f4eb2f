pub mod config;
pub mod domain;
pub mod observability;
pub mod pipeline;
pub mod sinks;
pub mod sources;
pub mod transform;

pub use pipeline::{IngestError, IngestSummary, Pipeline, SinkVariant};
