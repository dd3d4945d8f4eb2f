use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::DemandTable;
use crate::pipeline::IngestError;
use crate::sinks::{BatchOutcome, Sink, SinkError};
use crate::transform::settlement_timestamp;

pub const REGION_DIMENSION: &str = "region";
pub const REGION_VALUE: &str = "UK";
pub const NATIONAL_DEMAND_MEASURE: &str = "national_demand";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

/// One dimensioned measure record in the managed destination's bulk-write
/// shape: a single measure per record, value carried as a string, time as
/// epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MeasureRecord {
    pub dimensions: Vec<Dimension>,
    pub measure_name: String,
    pub measure_value: String,
    pub measure_value_type: String,
    pub time: String,
}

/// Project a cleaned table into one national-demand record per row.
///
/// A table whose CSV never carried the ND column fails the whole build,
/// even when it holds no rows.
pub fn build_measure_records(table: &DemandTable) -> Result<Vec<MeasureRecord>, IngestError> {
    if !table.columns.nd {
        return Err(IngestError::MissingField("ND"));
    }

    let mut records = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        let nd = row.nd.ok_or(IngestError::MissingField("ND"))?;
        let ts = settlement_timestamp(row.settlement_date, row.settlement_period)?;
        let millis = ts.unix_timestamp_nanos() / 1_000_000;

        records.push(MeasureRecord {
            dimensions: vec![Dimension {
                name: REGION_DIMENSION.to_string(),
                value: REGION_VALUE.to_string(),
            }],
            measure_name: NATIONAL_DEMAND_MEASURE.to_string(),
            measure_value: nd.to_string(),
            measure_value_type: "DOUBLE".to_string(),
            time: millis.to_string(),
        });
    }
    Ok(records)
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct WriteRequest<'a> {
    database_name: &'a str,
    table_name: &'a str,
    records: &'a [MeasureRecord],
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct WriteResponse {
    rejected_records: Vec<RejectedRecord>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RejectedRecord {
    record_index: usize,
    reason: Option<String>,
}

/// Bulk-write sink for the managed destination's records API.
pub struct RecordApiSink {
    client: reqwest::Client,
    write_url: String,
    token: String,
    database: String,
    table: String,
}

impl RecordApiSink {
    pub fn new(endpoint: &str, token: String, database: String, table: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            write_url: format!("{}/v1/write", endpoint.trim_end_matches('/')),
            token,
            database,
            table,
        }
    }
}

#[async_trait]
impl Sink<MeasureRecord> for RecordApiSink {
    async fn write_batch(&self, batch: &[MeasureRecord]) -> Result<BatchOutcome, SinkError> {
        let request = WriteRequest {
            database_name: &self.database,
            table_name: &self.table,
            records: batch,
        };

        let response = self
            .client
            .post(&self.write_url)
            .header("x-api-token", &self.token)
            .json(&request)
            .send()
            .await
            .map_err(|e| SinkError(format!("records api request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SinkError(format!("records api response read failed: {e}")))?;

        if !status.is_success() {
            return Err(SinkError(format!("records api returned {status}: {body}")));
        }

        // A success body may still carry per-record rejections (out-of-order
        // or duplicate timestamps); those are partial, not fatal.
        if let Ok(parsed) = serde_json::from_str::<WriteResponse>(&body) {
            if !parsed.rejected_records.is_empty() {
                if let Some(first) = parsed.rejected_records.first() {
                    tracing::warn!(
                        index = first.record_index,
                        reason = first.reason.as_deref().unwrap_or("unspecified"),
                        "first rejected record"
                    );
                }
                return Ok(BatchOutcome::PartiallyRejected {
                    rejected: parsed.rejected_records.len(),
                });
            }
        }

        Ok(BatchOutcome::Accepted)
    }
}
