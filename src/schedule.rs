use chrono::{DateTime, Utc};
use cron::Schedule;
use itertools::Itertools;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScheduleError {
    #[error("'{expression}' has {actual} fields, expected {expected}")]
    FieldCount {
        expression: String,
        expected: &'static str,
        actual: usize,
    },
    #[error("'{expression}' is not a valid cron expression: {reason}")]
    Rejected { expression: String, reason: String },
}

/// Parse a standard 5-field Unix cron expression (minute, hour, day of month, month, day of
/// week).
///
/// The `cron` crate expects a leading seconds field and a trailing year field, so the
/// expression fires at second `0` of every matching minute of any year. Days of the week are
/// numbered from `0` (Sunday) to `6` (Saturday).
pub fn parse_minutely(expression: &str) -> Result<Schedule, ScheduleError> {
    let fields = expression.split_whitespace().collect_vec();
    if fields.len() != 5 {
        return Err(ScheduleError::FieldCount {
            expression: expression.to_owned(),
            expected: "5",
            actual: fields.len(),
        });
    }

    parse(expression, &format!("0 {} *", normalize(&fields)))
}

/// Parse a refresh schedule, either a 5-field Unix cron expression or a 6-field one whose
/// first field is the second.
pub fn parse_refresh(expression: &str) -> Result<Schedule, ScheduleError> {
    let fields = expression.split_whitespace().collect_vec();
    match fields.len() {
        5 => parse_minutely(expression),
        6 => parse(expression, &normalize(&fields)),
        actual => Err(ScheduleError::FieldCount {
            expression: expression.to_owned(),
            expected: "5 or 6",
            actual,
        }),
    }
}

/// The first time strictly after `after` at which the schedule fires.
#[inline]
pub fn next_after(schedule: &Schedule, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule.after(after).next()
}

/// Rewrite the trailing day-of-week field from Unix numbering (`0` is Sunday) to the `cron`
/// crate numbering (`1` is Sunday).
fn normalize(fields: &[&str]) -> String {
    match fields.split_last() {
        Some((day_of_week, rest)) => rest
            .iter()
            .copied()
            .map(str::to_owned)
            .chain(std::iter::once(shift_days(day_of_week)))
            .join(" "),
        None => String::new(),
    }
}

fn shift_days(field: &str) -> String {
    field
        .split(',')
        .map(|item| match item.split_once('/') {
            Some((range, step)) => format!("{}/{step}", shift_range(range)),
            None => shift_range(item),
        })
        .join(",")
}

fn shift_range(range: &str) -> String {
    range
        .split('-')
        .map(|day| match day.parse::<u8>().ok().and_then(|day| day.checked_add(1)) {
            Some(day) => day.to_string(),
            None => day.to_owned(),
        })
        .join("-")
}

fn parse(expression: &str, normalized: &str) -> Result<Schedule, ScheduleError> {
    Schedule::from_str(normalized).map_err(|error| ScheduleError::Rejected {
        expression: expression.to_owned(),
        reason: error.to_string(),
    })
}
