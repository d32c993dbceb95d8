//! Parsers for the string values of table properties

use std::time::Duration;

const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 60 * SECONDS_PER_MINUTE;
const SECONDS_PER_DAY: u64 = 24 * SECONDS_PER_HOUR;
const SECONDS_PER_WEEK: u64 = 7 * SECONDS_PER_DAY;

pub(crate) fn parse_bool(value: &str) -> Result<bool, String> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(format!("'{value}' is not a boolean")),
    }
}

pub(crate) fn parse_pos_int(value: &str) -> Result<u64, String> {
    match parse_int(value)? {
        n if n > 0 => Ok(n as u64),
        _ => Err(format!("'{value}' is not a positive integer")),
    }
}

/// Parse an interval such as `interval 30 days` into a [`Duration`]
pub(crate) fn parse_interval(value: &str) -> Result<Duration, String> {
    let not_an_interval = || format!("'{value}' is not an interval");

    let mut it = value.split_whitespace();
    if it.next() != Some("interval") {
        return Err(not_an_interval());
    }
    let number = parse_int(it.next().ok_or_else(not_an_interval)?)?;
    if number < 0 {
        return Err(format!("interval '{value}' cannot be negative"));
    }
    let number = number as u64;

    let duration = match it.next().ok_or_else(not_an_interval)? {
        "nanosecond" | "nanoseconds" => Duration::from_nanos(number),
        "microsecond" | "microseconds" => Duration::from_micros(number),
        "millisecond" | "milliseconds" => Duration::from_millis(number),
        "second" | "seconds" => Duration::from_secs(number),
        "minute" | "minutes" => Duration::from_secs(number * SECONDS_PER_MINUTE),
        "hour" | "hours" => Duration::from_secs(number * SECONDS_PER_HOUR),
        "day" | "days" => Duration::from_secs(number * SECONDS_PER_DAY),
        "week" | "weeks" => Duration::from_secs(number * SECONDS_PER_WEEK),
        unit => {
            return Err(format!("Unknown unit '{unit}'"));
        }
    };

    Ok(duration)
}

fn parse_int(value: &str) -> Result<i64, String> {
    value
        .parse()
        .map_err(|e| format!("Cannot parse '{value}' as integer: {e}"))
}
