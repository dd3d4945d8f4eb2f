use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};

use crate::domain::{DemandReading, DemandTable};
use crate::pipeline::IngestError;

/// Map a settlement period to its half-hour-of-day clock time.
///
/// Periods 1..=48 map bijectively onto the half-hour boundaries `00:00:00`
/// through `23:30:00`. The range is deliberately not validated: out-of-range
/// periods still yield a well-formed `HH:MM:00` string, just not a meaningful
/// one.
pub fn settlement_period_to_time(period: i64) -> String {
    let hour = (period - 1).div_euclid(2);
    let minute = if period % 2 == 0 { 30 } else { 0 };
    format!("{hour:02}:{minute:02}:00")
}

/// Settlement periods arrive as CSV text; anything non-numeric is a caller
/// error, not a missing value.
pub fn parse_settlement_period(cell: &str) -> Result<i64, IngestError> {
    cell.trim().parse().map_err(|_| {
        IngestError::InvalidArgument(format!("settlement period must be an integer, got '{cell}'"))
    })
}

/// Combine a settlement date with the period's clock time into a UTC instant.
///
/// Unlike the string mapper, this cannot pass garbage through: period 49 would
/// need hour 24, which no clock has. Periods outside 1..=48 are rejected here.
pub fn settlement_timestamp(date: Date, period: i64) -> Result<OffsetDateTime, IngestError> {
    if !(1..=48).contains(&period) {
        return Err(IngestError::InvalidArgument(format!(
            "settlement period {period} outside 1..=48 has no clock time"
        )));
    }

    let hour = ((period - 1) / 2) as u8;
    let minute = if period % 2 == 0 { 30 } else { 0 };
    let time = Time::from_hms(hour, minute, 0)
        .map_err(|e| IngestError::InvalidArgument(e.to_string()))?;

    Ok(PrimitiveDateTime::new(date, time).assume_utc())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImputeStrategy {
    /// Every missing cell becomes 0.
    ZeroFill,
    /// Every missing cell becomes the mean of its column's original
    /// non-missing values.
    MeanFill,
}

/// Fill missing cells in every measure column the CSV actually carried.
///
/// Means are computed per column from the original data, before any
/// replacement. A column with no values at all falls back to 0.
pub fn impute(table: &mut DemandTable, strategy: ImputeStrategy) {
    if table.columns.nd {
        fill_column(&mut table.rows, strategy, |r| r.nd, |r, v| r.nd = Some(v));
    }
    if table.columns.tsd {
        fill_column(&mut table.rows, strategy, |r| r.tsd, |r, v| r.tsd = Some(v));
    }
    if table.columns.viking_flow {
        fill_column(
            &mut table.rows,
            strategy,
            |r| r.viking_flow,
            |r, v| r.viking_flow = Some(v),
        );
    }
}

fn fill_column(
    rows: &mut [DemandReading],
    strategy: ImputeStrategy,
    get: fn(&DemandReading) -> Option<f64>,
    set: fn(&mut DemandReading, f64),
) {
    let fill = match strategy {
        ImputeStrategy::ZeroFill => 0.0,
        ImputeStrategy::MeanFill => {
            let present: Vec<f64> = rows.iter().filter_map(get).collect();
            if present.is_empty() {
                0.0
            } else {
                present.iter().sum::<f64>() / present.len() as f64
            }
        }
    };

    for row in rows {
        if get(row).is_none() {
            set(row, fill);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MeasureColumns;
    use time::macros::{date, datetime};

    fn reading(period: i64, nd: Option<f64>, tsd: Option<f64>) -> DemandReading {
        DemandReading {
            settlement_date: date!(2025 - 01 - 01),
            settlement_period: period,
            nd,
            tsd,
            viking_flow: None,
        }
    }

    #[test]
    fn period_maps_to_half_hour_boundaries() {
        assert_eq!(settlement_period_to_time(1), "00:00:00");
        assert_eq!(settlement_period_to_time(2), "00:30:00");
        assert_eq!(settlement_period_to_time(48), "23:30:00");
    }

    #[test]
    fn periods_1_to_48_map_bijectively_onto_the_day() {
        let times: Vec<String> = (1..=48).map(settlement_period_to_time).collect();

        let unique: std::collections::HashSet<&String> = times.iter().collect();
        assert_eq!(unique.len(), 48);

        for t in &times {
            let hour: u8 = t[0..2].parse().unwrap();
            let minute = &t[3..5];
            assert!(hour <= 23);
            assert!(minute == "00" || minute == "30");
            assert!(t.ends_with(":00"));
        }
    }

    #[test]
    fn non_numeric_period_is_an_invalid_argument() {
        let err = parse_settlement_period("a").unwrap_err();
        assert!(matches!(err, IngestError::InvalidArgument(_)));
        assert_eq!(parse_settlement_period(" 7 ").unwrap(), 7);
    }

    #[test]
    fn timestamp_combines_date_and_clock_time_in_utc() {
        let ts = settlement_timestamp(date!(2025 - 01 - 01), 3).unwrap();
        assert_eq!(ts, datetime!(2025-01-01 01:00:00 UTC));

        let ts = settlement_timestamp(date!(2025 - 06 - 15), 48).unwrap();
        assert_eq!(ts, datetime!(2025-06-15 23:30:00 UTC));
    }

    #[test]
    fn timestamp_rejects_out_of_range_periods() {
        assert!(settlement_timestamp(date!(2025 - 01 - 01), 0).is_err());
        assert!(settlement_timestamp(date!(2025 - 01 - 01), 49).is_err());
    }

    #[test]
    fn zero_fill_replaces_every_missing_cell_with_zero() {
        let mut table = DemandTable {
            columns: MeasureColumns { nd: true, tsd: true, viking_flow: false },
            rows: vec![
                reading(1, None, Some(10.0)),
                reading(2, Some(5.0), None),
                reading(3, Some(7.0), Some(20.0)),
            ],
        };

        impute(&mut table, ImputeStrategy::ZeroFill);

        assert_eq!(table.rows[0].nd, Some(0.0));
        assert_eq!(table.rows[1].tsd, Some(0.0));
        assert_eq!(table.rows[1].nd, Some(5.0));
        assert!(table.rows.iter().all(|r| r.nd.is_some() && r.tsd.is_some()));
    }

    #[test]
    fn mean_fill_uses_the_original_column_mean() {
        let mut table = DemandTable {
            columns: MeasureColumns { nd: true, tsd: true, viking_flow: false },
            rows: vec![
                reading(1, Some(1.0), None),
                reading(2, None, Some(10.0)),
                reading(3, Some(3.0), Some(20.0)),
            ],
        };

        impute(&mut table, ImputeStrategy::MeanFill);

        // nd mean over {1, 3}, tsd mean over {10, 20}; each computed before
        // any replacement, independently per column.
        assert!((table.rows[1].nd.unwrap() - 2.0).abs() < 1e-9);
        assert!((table.rows[0].tsd.unwrap() - 15.0).abs() < 1e-9);
    }

    #[test]
    fn mean_fill_of_an_entirely_missing_column_falls_back_to_zero() {
        let mut table = DemandTable {
            columns: MeasureColumns { nd: true, tsd: false, viking_flow: false },
            rows: vec![reading(1, None, None), reading(2, None, None)],
        };

        impute(&mut table, ImputeStrategy::MeanFill);

        assert_eq!(table.rows[0].nd, Some(0.0));
        assert_eq!(table.rows[1].nd, Some(0.0));
        // tsd column absent from the header, so it stays untouched.
        assert_eq!(table.rows[0].tsd, None);
    }
}
