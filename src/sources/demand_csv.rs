use csv::StringRecord;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::Date;

use crate::domain::{DemandReading, DemandTable, MeasureColumns};
use crate::pipeline::IngestError;
use crate::transform::parse_settlement_period;

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Parse a demand extract into the typed table.
///
/// Expected header columns (by name):
/// - SETTLEMENT_DATE (ISO date, required)
/// - SETTLEMENT_PERIOD (integer, required)
/// - ND, TSD, VIKING_FLOW (numeric, whichever the variant carries)
///
/// Blank or unparsable measure cells become missing markers for the imputer;
/// a malformed date, a non-numeric period, or structurally broken CSV is
/// fatal.
pub fn parse_demand_csv(bytes: &[u8]) -> Result<DemandTable, IngestError> {
    let mut rdr = csv::Reader::from_reader(bytes);
    let headers = rdr
        .headers()
        .map_err(|e| IngestError::Parse(format!("failed to read CSV header: {e}")))?
        .clone();

    let position = |name: &str| headers.iter().position(|h| h == name);

    let date_idx = position("SETTLEMENT_DATE")
        .ok_or_else(|| IngestError::Parse("missing column 'SETTLEMENT_DATE' in CSV header".into()))?;
    let period_idx = position("SETTLEMENT_PERIOD")
        .ok_or_else(|| IngestError::Parse("missing column 'SETTLEMENT_PERIOD' in CSV header".into()))?;

    let nd_idx = position("ND");
    let tsd_idx = position("TSD");
    let viking_idx = position("VIKING_FLOW");

    let columns = MeasureColumns {
        nd: nd_idx.is_some(),
        tsd: tsd_idx.is_some(),
        viking_flow: viking_idx.is_some(),
    };

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record =
            result.map_err(|e| IngestError::Parse(format!("failed to read CSV record: {e}")))?;

        let date_cell = field(&record, date_idx)?;
        let settlement_date = Date::parse(date_cell.trim(), DATE_FORMAT)
            .map_err(|e| IngestError::Parse(format!("invalid settlement date '{date_cell}': {e}")))?;
        let settlement_period = parse_settlement_period(field(&record, period_idx)?)?;

        rows.push(DemandReading {
            settlement_date,
            settlement_period,
            nd: measure_cell(&record, nd_idx),
            tsd: measure_cell(&record, tsd_idx),
            viking_flow: measure_cell(&record, viking_idx),
        });
    }

    Ok(DemandTable { columns, rows })
}

fn field<'r>(record: &'r StringRecord, idx: usize) -> Result<&'r str, IngestError> {
    record
        .get(idx)
        .ok_or_else(|| IngestError::Parse(format!("CSV record is missing field {idx}")))
}

fn measure_cell(record: &StringRecord, idx: Option<usize>) -> Option<f64> {
    let cell = record.get(idx?)?.trim();
    if cell.is_empty() {
        None
    } else {
        cell.parse().ok()
    }
}
