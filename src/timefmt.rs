// src/timefmt.rs
//
// Wall-clock formatting helpers for the presentation layer. Times render
// in the displayed location's UTC offset when the provider reported one,
// otherwise in process-local time.

use chrono::{DateTime, FixedOffset, Local, Utc};

use crate::config::{DateFormat, TimeFormat};

fn fmt_in_zone(dt: DateTime<Utc>, offset: Option<FixedOffset>, pattern: &str) -> String {
    match offset {
        Some(off) => dt.with_timezone(&off).format(pattern).to_string(),
        None => dt.with_timezone(&Local).format(pattern).to_string(),
    }
}

/// "3:07 PM" or "15:07".
pub fn format_time(dt: DateTime<Utc>, format: TimeFormat, offset: Option<FixedOffset>) -> String {
    let pattern = match format {
        TimeFormat::Hour12 => "%-I:%M %p",
        TimeFormat::Hour24 => "%H:%M",
    };
    fmt_in_zone(dt, offset, pattern)
}

/// Render a date in one of the enumerated settings patterns.
pub fn format_date(dt: DateTime<Utc>, format: DateFormat, offset: Option<FixedOffset>) -> String {
    let pattern = match format {
        DateFormat::MonthDayYear => "%b %d, %Y",
        DateFormat::NumericMdy => "%m/%d/%Y",
        DateFormat::NumericDmy => "%d/%m/%Y",
        DateFormat::Iso => "%Y-%m-%d",
    };
    fmt_in_zone(dt, offset, pattern)
}
