use std::marker::PhantomData;
use std::net::SocketAddr;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::domain::DemandTable;
use crate::pipeline::IngestError;
use crate::sinks::{BatchOutcome, Sink, SinkError};
use crate::transform::settlement_timestamp;

pub const ILP_MEASUREMENT: &str = "grid_demand";
pub const SOURCE_REGION_TAG: &str = "source_region";
pub const SOURCE_REGION_VALUE: &str = "UK";

/// Escape measurement/tag keys/tag values/field keys for ILP.
///
/// ILP requires escaping commas, spaces and equals with a backslash.
fn ilp_escape_ident(s: &str, out: &mut String) {
    for ch in s.chars() {
        match ch {
            ',' | ' ' | '=' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
}

fn push_tag(out: &mut String, key: &str, value: &str) {
    out.push(',');
    ilp_escape_ident(key, out);
    out.push('=');
    ilp_escape_ident(value, out);
}

fn push_field_f64(out: &mut String, first: &mut bool, key: &str, value: f64) {
    if *first {
        *first = false;
    } else {
        out.push(',');
    }

    ilp_escape_ident(key, out);
    out.push('=');
    out.push_str(&value.to_string());
}

fn ts_to_unix_nanos(ts: OffsetDateTime) -> i128 {
    ts.unix_timestamp_nanos()
}

pub trait IlpEncode {
    fn write_ilp_line(&self, out: &mut String);
}

/// One multi-field write unit: all configured measures co-located under a
/// single tag and a single timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct DemandPoint {
    pub ts: OffsetDateTime,
    pub national_demand: f64,
    pub system_demand: f64,
    pub viking_flow: f64,
}

impl IlpEncode for DemandPoint {
    fn write_ilp_line(&self, out: &mut String) {
        out.push_str(ILP_MEASUREMENT);
        push_tag(out, SOURCE_REGION_TAG, SOURCE_REGION_VALUE);

        out.push(' ');
        let mut first = true;
        push_field_f64(out, &mut first, "national_demand", self.national_demand);
        push_field_f64(out, &mut first, "system_demand", self.system_demand);
        push_field_f64(out, &mut first, "viking_flow", self.viking_flow);

        // timestamp (nanos)
        out.push(' ');
        out.push_str(&ts_to_unix_nanos(self.ts).to_string());
    }
}

/// Project a cleaned table into one point per row.
///
/// A measure the CSV never carried fails the whole build, not just the row,
/// even when the table holds no rows.
pub fn build_demand_points(table: &DemandTable) -> Result<Vec<DemandPoint>, IngestError> {
    if !table.columns.nd {
        return Err(IngestError::MissingField("ND"));
    }
    if !table.columns.tsd {
        return Err(IngestError::MissingField("TSD"));
    }
    if !table.columns.viking_flow {
        return Err(IngestError::MissingField("VIKING_FLOW"));
    }

    let mut points = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        points.push(DemandPoint {
            ts: settlement_timestamp(row.settlement_date, row.settlement_period)?,
            national_demand: row.nd.ok_or(IngestError::MissingField("ND"))?,
            system_demand: row.tsd.ok_or(IngestError::MissingField("TSD"))?,
            viking_flow: row.viking_flow.ok_or(IngestError::MissingField("VIKING_FLOW"))?,
        });
    }
    Ok(points)
}

/// Line-protocol sink for the self-hosted destination.
///
/// Connects lazily on the first batch and keeps the connection for the rest of
/// the run; a failed write drops it so the next batch dials again.
pub struct IlpTcpSink<T> {
    addr: SocketAddr,
    conn: Mutex<Option<TcpStream>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> IlpTcpSink<T> {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            conn: Mutex::new(None),
            _marker: PhantomData,
        }
    }

    fn encode_batch(batch: &[T]) -> Vec<u8>
    where
        T: IlpEncode,
    {
        // Heuristic capacity: ~96 bytes per line.
        let mut s = String::with_capacity(batch.len().saturating_mul(96));
        for unit in batch {
            unit.write_ilp_line(&mut s);
            s.push('\n');
        }
        s.into_bytes()
    }
}

#[async_trait]
impl<T> Sink<T> for IlpTcpSink<T>
where
    T: IlpEncode + Send + Sync,
{
    async fn write_batch(&self, batch: &[T]) -> Result<BatchOutcome, SinkError> {
        if batch.is_empty() {
            return Ok(BatchOutcome::Accepted);
        }

        let payload = Self::encode_batch(batch);

        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            let stream = TcpStream::connect(self.addr)
                .await
                .map_err(|e| SinkError(format!("failed to connect to ILP endpoint: {e}")))?;
            let _ = stream.set_nodelay(true);
            *guard = Some(stream);
        }
        let Some(stream) = guard.as_mut() else {
            return Err(SinkError("ilp connection unavailable".to_string()));
        };

        if let Err(e) = stream.write_all(&payload).await {
            *guard = None;
            return Err(SinkError(format!("ilp write failed: {e}")));
        }
        if let Err(e) = stream.flush().await {
            *guard = None;
            return Err(SinkError(format!("ilp flush failed: {e}")));
        }

        Ok(BatchOutcome::Accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DemandReading, DemandTable, MeasureColumns};
    use time::macros::{date, datetime};

    #[test]
    fn ilp_escape_ident_escapes_commas_spaces_and_equals() {
        let mut out = String::new();
        ilp_escape_ident("a b,c=d", &mut out);
        assert_eq!(out, "a\\ b\\,c\\=d");
    }

    #[test]
    fn point_line_carries_the_table_name_and_all_three_fields() {
        let point = DemandPoint {
            ts: datetime!(2025-01-01 00:00:00 UTC),
            national_demand: 21036.0,
            system_demand: 26215.0,
            viking_flow: 803.5,
        };

        let mut line = String::new();
        point.write_ilp_line(&mut line);

        assert!(line.starts_with("grid_demand,source_region=UK "));
        assert!(line.contains(" national_demand=21036"));
        assert!(line.contains(",system_demand=26215"));
        assert!(line.contains(",viking_flow=803.5"));

        // Timestamp should be nanos.
        let ts_nanos = ts_to_unix_nanos(point.ts).to_string();
        assert!(line.ends_with(&ts_nanos));
    }

    fn three_row_table() -> DemandTable {
        let row = |period, nd, tsd, viking| DemandReading {
            settlement_date: date!(2025 - 01 - 01),
            settlement_period: period,
            nd: Some(nd),
            tsd: Some(tsd),
            viking_flow: Some(viking),
        };

        DemandTable {
            columns: MeasureColumns { nd: true, tsd: true, viking_flow: true },
            rows: vec![
                row(1, 21036.0, 26215.0, 800.0),
                row(2, 21222.0, 26063.0, 810.0),
                row(3, 21385.0, 25734.0, 790.0),
            ],
        }
    }

    #[test]
    fn builds_one_point_per_row() {
        let points = build_demand_points(&three_row_table()).unwrap();

        assert_eq!(points.len(), 3);
        assert_eq!(points[0].ts, datetime!(2025-01-01 00:00:00 UTC));
        assert_eq!(points[1].ts, datetime!(2025-01-01 00:30:00 UTC));
        assert_eq!(points[2].ts, datetime!(2025-01-01 01:00:00 UTC));
        assert_eq!(points[2].national_demand, 21385.0);
    }

    #[test]
    fn a_measure_the_csv_never_carried_fails_the_build() {
        let mut table = three_row_table();
        table.columns.viking_flow = false;
        for row in &mut table.rows {
            row.viking_flow = None;
        }

        let err = build_demand_points(&table).unwrap_err();
        assert!(matches!(err, IngestError::MissingField("VIKING_FLOW")));
    }

    #[test]
    fn a_missing_measure_column_fails_even_with_zero_rows() {
        let table = DemandTable {
            columns: MeasureColumns { nd: true, tsd: true, viking_flow: false },
            rows: vec![],
        };

        let err = build_demand_points(&table).unwrap_err();
        assert!(matches!(err, IngestError::MissingField("VIKING_FLOW")));
    }
}
