use async_trait::async_trait;
use thiserror::Error;

pub mod ilp;
pub mod records_api;

pub use ilp::{build_demand_points, DemandPoint, IlpEncode, IlpTcpSink};
pub use records_api::{build_measure_records, Dimension, MeasureRecord, RecordApiSink};

#[derive(Debug, Error)]
#[error("{0}")]
pub struct SinkError(pub String);

/// Outcome of one bulk-write call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Accepted,
    /// The destination accepted the call but rejected some records in it.
    PartiallyRejected { rejected: usize },
}

#[async_trait]
pub trait Sink<R: Send + Sync>: Send + Sync {
    async fn write_batch(&self, batch: &[R]) -> Result<BatchOutcome, SinkError>;
}

/// Structured result of the write stage.
///
/// Write problems are absorbed per batch and never retried; this report is how
/// they reach the caller instead of vanishing into the logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub write_calls: usize,
    pub batches_ok: usize,
    pub batches_failed: usize,
    pub records_submitted: usize,
    pub records_rejected: usize,
}

/// Splits an ordered record sequence into contiguous chunks of at most the
/// batch size and submits one write call per chunk, in order.
pub struct BatchedWriter {
    batch_size: usize,
}

impl BatchedWriter {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub async fn write_all<R, S>(&self, sink: &S, records: &[R]) -> WriteReport
    where
        R: Send + Sync,
        S: Sink<R> + ?Sized,
    {
        let mut report = WriteReport::default();

        for (batch_no, chunk) in records.chunks(self.batch_size).enumerate() {
            report.write_calls += 1;
            report.records_submitted += chunk.len();

            match sink.write_batch(chunk).await {
                Ok(BatchOutcome::Accepted) => {
                    report.batches_ok += 1;
                    tracing::info!(batch = batch_no + 1, records = chunk.len(), "batch written");
                }
                Ok(BatchOutcome::PartiallyRejected { rejected }) => {
                    report.batches_ok += 1;
                    report.records_rejected += rejected;
                    tracing::warn!(
                        batch = batch_no + 1,
                        rejected,
                        "destination rejected some records, continuing"
                    );
                }
                Err(e) => {
                    report.batches_failed += 1;
                    tracing::error!(batch = batch_no + 1, error = %e, "batch write failed, continuing");
                }
            }
        }

        report
    }
}
