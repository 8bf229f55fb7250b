use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use hex::encode;
use tiberius::numeric::Numeric;
use tiberius::time::{Date, DateTime, DateTime2, DateTimeOffset, SmallDateTime, Time};
use tiberius::ColumnData;

use crate::common::schema::{ColumnList, SqlValue};

const PREVIEW_MAX_CHARS: usize = 40;

/// Renders `Name=value` pairs for a row, used when logging a failed batch.
pub fn format_row_preview(columns: &ColumnList, row: &[SqlValue]) -> String {
    columns
        .names()
        .iter()
        .zip(row)
        .map(|(name, value)| format!("{}={}", name, format_column_value(value.data())))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn format_column_value(item: &ColumnData<'_>) -> String {
    match item {
        ColumnData::Binary(val) => val
            .as_ref()
            .map(|bytes| truncate(format!("0x{}", encode(bytes))))
            .unwrap_or_else(null),
        ColumnData::Bit(val) => format_number_value(val.as_ref()),
        ColumnData::U8(val) => format_number_value(val.as_ref()),
        ColumnData::I16(val) => format_number_value(val.as_ref()),
        ColumnData::I32(val) => format_number_value(val.as_ref()),
        ColumnData::I64(val) => format_number_value(val.as_ref()),
        ColumnData::F32(val) => format_number_value(val.as_ref()),
        ColumnData::F64(val) => format_number_value(val.as_ref()),
        ColumnData::Guid(val) => format_string_value(val.as_ref()),
        ColumnData::Numeric(val) => format_numeric_value(val.as_ref()),
        ColumnData::String(val) => format_string_value(val.as_ref()),
        ColumnData::Xml(val) => {
            format_string_value(val.as_ref().map(|xml| AsRef::<str>::as_ref(&**xml)))
        }
        ColumnData::Time(val) => val.as_ref().map(format_time).unwrap_or_else(null),
        ColumnData::Date(val) => val.as_ref().map(format_date).unwrap_or_else(null),
        ColumnData::SmallDateTime(val) => {
            val.as_ref().map(format_small_datetime).unwrap_or_else(null)
        }
        ColumnData::DateTime(val) => val.as_ref().map(format_datetime).unwrap_or_else(null),
        ColumnData::DateTime2(val) => val.as_ref().map(format_datetime2).unwrap_or_else(null),
        ColumnData::DateTimeOffset(val) => {
            val.as_ref().map(format_datetime_offset).unwrap_or_else(null)
        }
    }
}

fn null() -> String {
    "NULL".to_string()
}

fn truncate(value: String) -> String {
    if value.chars().count() > PREVIEW_MAX_CHARS {
        let head: String = value.chars().take(PREVIEW_MAX_CHARS).collect();
        format!("{}...", head)
    } else {
        value
    }
}

fn format_numeric_value(value: Option<&Numeric>) -> String {
    value.map(|numeric| numeric.to_string()).unwrap_or_else(null)
}

fn format_string_value<T: ToString>(value: Option<T>) -> String {
    value
        .map(|v| format!("'{}'", truncate(v.to_string())))
        .unwrap_or_else(null)
}

fn format_number_value<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(null)
}

fn format_time(time: &Time) -> String {
    time_of_day(time.increments(), time.scale())
        .map(|t| t.format("'%H:%M:%S%.f'").to_string())
        .unwrap_or_else(|| "<invalid time>".to_string())
}

fn format_date(date: &Date) -> String {
    from_days(date.days() as i64, 1)
        .map(|d| d.format("'%Y-%m-%d'").to_string())
        .unwrap_or_else(|| "<invalid date>".to_string())
}

fn format_datetime(dt: &DateTime) -> String {
    from_days(dt.days() as i64, 1900)
        .zip(from_sec_fragments(dt.seconds_fragments() as i64))
        .map(|(date, time)| format_naive(NaiveDateTime::new(date, time)))
        .unwrap_or_else(|| "<invalid datetime>".to_string())
}

fn format_small_datetime(dt: &SmallDateTime) -> String {
    from_days(dt.days() as i64, 1900)
        .zip(NaiveTime::from_num_seconds_from_midnight_opt(
            dt.seconds_fragments() as u32 * 60,
            0,
        ))
        .map(|(date, time)| format_naive(NaiveDateTime::new(date, time)))
        .unwrap_or_else(|| "<invalid smalldatetime>".to_string())
}

fn format_datetime2(dt: &DateTime2) -> String {
    from_days(dt.date().days() as i64, 1)
        .zip(time_of_day(dt.time().increments(), dt.time().scale()))
        .map(|(date, time)| format_naive(NaiveDateTime::new(date, time)))
        .unwrap_or_else(|| "<invalid datetime2>".to_string())
}

fn format_datetime_offset(dto: &DateTimeOffset) -> String {
    let utc = format_datetime2(&dto.datetime2());
    let offset = dto.offset();
    format!(
        "{} UTC{}{:02}:{:02}",
        utc,
        if offset < 0 { '-' } else { '+' },
        offset.abs() / 60,
        offset.abs() % 60
    )
}

fn format_naive(datetime: NaiveDateTime) -> String {
    datetime.format("'%Y-%m-%d %H:%M:%S%.f'").to_string()
}

fn time_of_day(increments: u64, scale: u8) -> Option<NaiveTime> {
    let nanos = increments.checked_mul(10u64.pow(9u32.saturating_sub(scale as u32)))?;
    NaiveTime::from_num_seconds_from_midnight_opt(
        (nanos / 1_000_000_000) as u32,
        (nanos % 1_000_000_000) as u32,
    )
}

fn from_days(days: i64, base_year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(base_year, 1, 1)?.checked_add_signed(Duration::days(days))
}

/// Legacy `datetime` stores time as 1/300 second ticks.
fn from_sec_fragments(seconds_fragments: i64) -> Option<NaiveTime> {
    let milliseconds = seconds_fragments * 1000 / 300;
    NaiveTime::from_num_seconds_from_midnight_opt(
        (milliseconds / 1000) as u32,
        ((milliseconds % 1000) * 1_000_000) as u32,
    )
}
