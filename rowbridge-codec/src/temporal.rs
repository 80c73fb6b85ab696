//! Date and time conversions between the row-store epoch (2000-01-01) and
//! the Unix epoch used by Arrow.
//!
//! Both sides reserve sentinels for +/- infinity. Row-store dates use
//! `i32::MIN`/`i32::MAX`, timestamps `i64::MIN`/`i64::MAX`; the columnar side
//! uses `+/-i32::MAX` and `+/-i64::MAX`.

use arrow::datatypes::IntervalMonthDayNano;
use rowbridge_result::{Error, Result};
use rowbridge_types::{PG_EPOCH_OFFSET_DAYS, PG_EPOCH_OFFSET_MICROS};

pub const PG_DATE_NOBEGIN: i32 = i32::MIN;
pub const PG_DATE_NOEND: i32 = i32::MAX;
pub const PG_DT_NOBEGIN: i64 = i64::MIN;
pub const PG_DT_NOEND: i64 = i64::MAX;

pub const COLUMNAR_DATE_NEG_INF: i32 = -i32::MAX;
pub const COLUMNAR_DATE_POS_INF: i32 = i32::MAX;
pub const COLUMNAR_TS_NEG_INF: i64 = -i64::MAX;
pub const COLUMNAR_TS_POS_INF: i64 = i64::MAX;

/// First valid row-store date (4713-11-24 BC), in days since 2000-01-01.
pub const PG_DATE_MIN: i32 = -2_451_545;
/// One past the last valid row-store date.
pub const PG_DATE_END: i32 = 2_145_031_949;
/// First valid row-store timestamp, in microseconds since 2000-01-01.
pub const PG_TIMESTAMP_MIN: i64 = -211_813_488_000_000_000;
/// One past the last valid row-store timestamp.
pub const PG_TIMESTAMP_END: i64 = 9_223_371_331_200_000_000;

/// Row-store date to Arrow `Date32`.
pub fn date_to_columnar(days: i32) -> Result<i32> {
    match days {
        PG_DATE_NOBEGIN => Ok(COLUMNAR_DATE_NEG_INF),
        PG_DATE_NOEND => Ok(COLUMNAR_DATE_POS_INF),
        d => d
            .checked_add(PG_EPOCH_OFFSET_DAYS)
            .ok_or_else(|| Error::overflow(format_args!("date {d} out of range"))),
    }
}

/// Arrow `Date32` to row-store date.
pub fn date_from_columnar(days: i32) -> Result<i32> {
    match days {
        COLUMNAR_DATE_POS_INF => Ok(PG_DATE_NOEND),
        COLUMNAR_DATE_NEG_INF => Ok(PG_DATE_NOBEGIN),
        d => match d.checked_sub(PG_EPOCH_OFFSET_DAYS) {
            Some(pg) if (PG_DATE_MIN..PG_DATE_END).contains(&pg) => Ok(pg),
            _ => Err(Error::overflow(format_args!("date {d} out of range"))),
        },
    }
}

/// Row-store timestamp to Arrow microsecond timestamp.
pub fn timestamp_to_columnar(micros: i64) -> Result<i64> {
    match micros {
        PG_DT_NOBEGIN => Ok(COLUMNAR_TS_NEG_INF),
        PG_DT_NOEND => Ok(COLUMNAR_TS_POS_INF),
        t => t
            .checked_add(PG_EPOCH_OFFSET_MICROS)
            .ok_or_else(|| Error::overflow(format_args!("timestamp {t} out of range"))),
    }
}

/// Arrow microsecond timestamp to row-store timestamp.
pub fn timestamp_from_columnar(micros: i64) -> Result<i64> {
    match micros {
        COLUMNAR_TS_POS_INF => Ok(PG_DT_NOEND),
        COLUMNAR_TS_NEG_INF => Ok(PG_DT_NOBEGIN),
        t => match t.checked_sub(PG_EPOCH_OFFSET_MICROS) {
            Some(pg) if (PG_TIMESTAMP_MIN..PG_TIMESTAMP_END).contains(&pg) => Ok(pg),
            _ => Err(Error::overflow(format_args!("timestamp {t} out of range"))),
        },
    }
}

/// Row-store interval bytes (`i64` micros, `i32` days, `i32` months).
pub fn interval_to_columnar(bytes: &[u8]) -> Result<IntervalMonthDayNano> {
    let b: &[u8; 16] = bytes
        .try_into()
        .map_err(|_| Error::corrupt(format_args!("interval has {} bytes", bytes.len())))?;
    let micros = i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]);
    let days = i32::from_le_bytes([b[8], b[9], b[10], b[11]]);
    let months = i32::from_le_bytes([b[12], b[13], b[14], b[15]]);
    let nanos = micros
        .checked_mul(1_000)
        .ok_or_else(|| Error::overflow(format_args!("interval of {micros}us out of range")))?;
    Ok(IntervalMonthDayNano::new(months, days, nanos))
}

/// Arrow interval to row-store interval bytes; sub-microsecond precision is truncated.
pub fn interval_from_columnar(v: IntervalMonthDayNano) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[0..8].copy_from_slice(&(v.nanoseconds / 1_000).to_le_bytes());
    out[8..12].copy_from_slice(&v.days.to_le_bytes());
    out[12..16].copy_from_slice(&v.months.to_le_bytes());
    out
}
