use time::Date;

/// One raw settlement-period row as read from the demand CSV.
///
/// Measure cells are `None` when the CSV held a blank or unparsable value;
/// imputation replaces them before anything downstream reads the row.
#[derive(Debug, Clone, PartialEq)]
pub struct DemandReading {
    pub settlement_date: Date,
    pub settlement_period: i64,
    pub nd: Option<f64>,
    pub tsd: Option<f64>,
    pub viking_flow: Option<f64>,
}

/// Which measure columns the CSV header actually carried.
///
/// A column absent from the header is distinct from a column full of missing
/// cells: imputation only touches columns that exist, and the builders fail
/// with a missing-field error when a measure they need was never present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeasureColumns {
    pub nd: bool,
    pub tsd: bool,
    pub viking_flow: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DemandTable {
    pub columns: MeasureColumns,
    pub rows: Vec<DemandReading>,
}
