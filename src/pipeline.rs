use serde_json::Value;
use thiserror::Error;

use crate::sinks::{
    build_demand_points, build_measure_records, BatchedWriter, DemandPoint, IlpTcpSink,
    RecordApiSink, WriteReport,
};
use crate::sources::{parse_demand_csv, FetchError, ObjectStore};
use crate::transform::{impute, ImputeStrategy};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("missing measure column '{0}'")]
    MissingField(&'static str),
}

/// Destination variant for one deployment.
pub enum SinkVariant {
    /// Managed destination: one dimensioned record per (row, measure).
    Records(RecordApiSink),
    /// Self-hosted destination: one multi-field point per row.
    Ilp(IlpTcpSink<DemandPoint>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    pub status_code: u16,
    pub message: String,
    pub units_prepared: usize,
    pub report: WriteReport,
}

pub struct Pipeline<F> {
    store: F,
    object_key: String,
    strategy: ImputeStrategy,
    batch_size: usize,
    sink: SinkVariant,
}

impl<F: ObjectStore> Pipeline<F> {
    pub fn new(
        store: F,
        object_key: impl Into<String>,
        strategy: ImputeStrategy,
        batch_size: usize,
        sink: SinkVariant,
    ) -> Self {
        Self {
            store,
            object_key: object_key.into(),
            strategy,
            batch_size,
            sink,
        }
    }

    /// Fetch → parse → impute → build → write, strictly in sequence.
    ///
    /// Everything before the write stage is fatal and aborts the run; write
    /// problems are absorbed per batch and surface in the report.
    pub async fn run(&self) -> Result<IngestSummary, IngestError> {
        let bytes = self.store.get_object(&self.object_key).await?;

        let mut table = parse_demand_csv(&bytes)?;
        tracing::info!(rows = table.rows.len(), "CSV loaded");

        impute(&mut table, self.strategy);

        let writer = BatchedWriter::new(self.batch_size);
        let (units, report, destination) = match &self.sink {
            SinkVariant::Records(sink) => {
                let records = build_measure_records(&table)?;
                tracing::info!(records = records.len(), "prepared measure records");
                let report = writer.write_all(sink, &records).await;
                (records.len(), report, "records api")
            }
            SinkVariant::Ilp(sink) => {
                let points = build_demand_points(&table)?;
                tracing::info!(points = points.len(), "prepared demand points");
                let report = writer.write_all(sink, &points).await;
                (points.len(), report, "ilp")
            }
        };

        Ok(IngestSummary {
            status_code: 200,
            message: format!(
                "ingested {units} write units to {destination} ({} batches ok, {} failed, {} records rejected)",
                report.batches_ok, report.batches_failed, report.records_rejected
            ),
            units_prepared: units,
            report,
        })
    }

    /// Invocation wrapper: the event/context pair is opaque and unused by the
    /// pipeline itself.
    pub async fn handle(&self, _event: Value, _context: Value) -> Result<IngestSummary, IngestError> {
        self.run().await
    }
}
