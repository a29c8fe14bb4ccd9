//! Date and time-of-day parsing with format fallback chains, plus the
//! calendar and time-of-day features derived from a parsed timestamp.
//!
//! Each column is parsed in two tiers. The first tier walks an ordered list
//! of strict formats and adopts the first one that parses more than the
//! acceptance ratio of non-empty cells. Cells that format cannot read stay
//! null. When no format reaches the bar, every cell is parsed on its own by
//! a permissive parser instead. Times get a final pass that pulls an
//! `HH:MM` pair out of whatever text surrounds it.

use std::sync::LazyLock;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};
use log::debug;
use regex::Regex;
use serde::Serialize;

use crate::numeric::ConversionReport;

/// Date formats in trial order. Day-first variants come before month-first
/// ones because the fleet's spreadsheets are produced with a Spanish locale.
const DATE_FORMATS: &[&str] = &[
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%Y-%m-%d",
    "%d/%m/%y",
    "%d-%m-%y",
    "%d.%m.%Y",
    "%Y/%m/%d",
    "%m/%d/%Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
];

const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M", "%I:%M:%S %p", "%I:%M %p", "%H.%M"];

static DATE_PARTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,4})\s*[-/.]\s*(\d{1,2})\s*[-/.]\s*(\d{1,4})").expect("valid date regex")
});

static CLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})\s*[:hH.]\s*(\d{2})").expect("valid clock regex"));

/// Date cell, with the time of day when the cell carried one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedDate {
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateStrategy {
    Format(&'static str),
    Permissive,
}

#[derive(Debug, Clone)]
pub struct DateColumn {
    pub values: Vec<Option<ParsedDate>>,
    pub strategy: DateStrategy,
    pub report: ConversionReport,
}

#[derive(Debug, Clone)]
pub struct TimeColumn {
    pub values: Vec<Option<NaiveTime>>,
    pub strategy: DateStrategy,
    pub report: ConversionReport,
}

fn parse_with_format(value: &str, format: &str) -> Option<ParsedDate> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
        return Some(ParsedDate {
            date: dt.date(),
            time: Some(dt.time()),
        });
    }
    NaiveDate::parse_from_str(value, format)
        .ok()
        .map(|date| ParsedDate { date, time: None })
}

fn date_formats() -> impl Iterator<Item = &'static str> {
    DATETIME_FORMATS.iter().chain(DATE_FORMATS.iter()).copied()
}

/// Picks the first strategy in `candidates` that clears `accept_ratio`.
fn select_format<T, F>(
    values: &[&str],
    candidates: impl Iterator<Item = &'static str>,
    accept_ratio: f64,
    parse: F,
) -> Option<(&'static str, Vec<Option<T>>)>
where
    F: Fn(&str, &str) -> Option<T>,
{
    let non_empty = values.iter().filter(|v| !v.is_empty()).count();
    if non_empty == 0 {
        return None;
    }
    for format in candidates {
        let parsed = values
            .iter()
            .map(|v| if v.is_empty() { None } else { parse(v, format) })
            .collect::<Vec<_>>();
        let hits = parsed.iter().filter(|p| p.is_some()).count();
        if hits as f64 / non_empty as f64 > accept_ratio {
            return Some((format, parsed));
        }
    }
    None
}

pub fn parse_date_column(column: &str, values: &[&str], accept_ratio: f64) -> DateColumn {
    let (strategy, parsed) =
        match select_format(values, date_formats(), accept_ratio, parse_with_format) {
            Some((format, parsed)) => (DateStrategy::Format(format), parsed),
            None => (
                DateStrategy::Permissive,
                values.iter().map(|v| parse_date_permissive(v)).collect(),
            ),
        };
    debug!("Column '{column}' parsed with {strategy:?}");
    let report = ConversionReport::tally(column, values, &parsed);
    DateColumn {
        values: parsed,
        strategy,
        report,
    }
}

pub fn parse_time_column(column: &str, values: &[&str], accept_ratio: f64) -> TimeColumn {
    let (strategy, parsed) = match select_format(
        values,
        TIME_FORMATS.iter().copied(),
        accept_ratio,
        |value, format| parse_time_strict(value, format),
    ) {
        Some((format, parsed)) => (DateStrategy::Format(format), parsed),
        None => (
            DateStrategy::Permissive,
            values
                .iter()
                .map(|v| parse_time_permissive(v).or_else(|| extract_clock(v)))
                .collect(),
        ),
    };
    debug!("Column '{column}' parsed with {strategy:?}");
    let report = ConversionReport::tally(column, values, &parsed);
    TimeColumn {
        values: parsed,
        strategy,
        report,
    }
}

fn parse_time_strict(value: &str, format: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(&value.to_ascii_uppercase(), format).ok()
}

/// Parses one cell without committing to a column-wide format.
pub fn parse_date_permissive(value: &str) -> Option<ParsedDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Some(parsed) = date_formats().find_map(|format| parse_with_format(value, format)) {
        return Some(parsed);
    }
    if let Some(parsed) = parse_spreadsheet_serial(value) {
        return Some(parsed);
    }
    let caps = DATE_PARTS.captures(value)?;
    let first = &caps[1];
    let second: u32 = caps[2].parse().ok()?;
    let third = &caps[3];
    let date = if first.len() == 4 {
        NaiveDate::from_ymd_opt(first.parse().ok()?, second, third.parse().ok()?)
    } else {
        let year: i32 = third.parse().ok()?;
        let year = if third.len() <= 2 { 2000 + year } else { year };
        NaiveDate::from_ymd_opt(year, second, first.parse().ok()?)
    }?;
    let time = value
        .get(caps.get(0)?.end()..)
        .and_then(extract_clock);
    Some(ParsedDate { date, time })
}

/// Spreadsheet day serials (days since 1899-12-30), fraction = time of day.
fn parse_spreadsheet_serial(value: &str) -> Option<ParsedDate> {
    let serial: f64 = value.parse().ok()?;
    if !(1.0..=2_958_465.0).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let date = epoch.checked_add_signed(Duration::days(serial.trunc() as i64))?;
    let fraction = serial.fract();
    let time = (fraction > 0.0).then(|| day_fraction_to_time(fraction)).flatten();
    Some(ParsedDate { date, time })
}

fn day_fraction_to_time(fraction: f64) -> Option<NaiveTime> {
    let seconds = (fraction * 86_400.0).round() as u32;
    NaiveTime::from_num_seconds_from_midnight_opt(seconds.min(86_399), 0)
}

pub fn parse_time_permissive(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    // Spreadsheet day fractions, checked before `%H.%M` can claim "0.5".
    if let Ok(fraction) = value.parse::<f64>()
        && (0.0..1.0).contains(&fraction)
    {
        return day_fraction_to_time(fraction);
    }
    if let Some(time) = TIME_FORMATS
        .iter()
        .find_map(|format| parse_time_strict(value, format))
    {
        return Some(time);
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|dt| dt.time())
}

/// Last-resort `HH:MM` extraction from free text such as `"aprox 14:35 hrs"`.
pub fn extract_clock(value: &str) -> Option<NaiveTime> {
    CLOCK.captures_iter(value).find_map(|caps| {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps[2].parse().ok()?;
        NaiveTime::from_hms_opt(hour, minute, 0)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimePeriod {
    Night,
    Morning,
    Afternoon,
    Evening,
}

impl TimePeriod {
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            0..=5 => TimePeriod::Night,
            6..=11 => TimePeriod::Morning,
            12..=17 => TimePeriod::Afternoon,
            _ => TimePeriod::Evening,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimePeriod::Night => "night",
            TimePeriod::Morning => "morning",
            TimePeriod::Afternoon => "afternoon",
            TimePeriod::Evening => "evening",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarFields {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub iso_week: u32,
    pub quarter: u32,
    pub weekday: &'static str,
    pub is_weekend: bool,
}

impl CalendarFields {
    pub fn from_date(date: NaiveDate) -> Self {
        let weekday = date.weekday();
        Self {
            year: date.year(),
            month: date.month(),
            day: date.day(),
            iso_week: date.iso_week().week(),
            quarter: (date.month() - 1) / 3 + 1,
            weekday: weekday_name(weekday),
            is_weekend: matches!(weekday, Weekday::Sat | Weekday::Sun),
        }
    }
}

fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeOfDay {
    pub period: TimePeriod,
    pub is_peak_hour: bool,
}

impl TimeOfDay {
    pub fn from_time(time: NaiveTime, peak_hours: &[u32]) -> Self {
        let hour = time.hour();
        Self {
            period: TimePeriod::from_hour(hour),
            is_peak_hour: peak_hours.contains(&hour),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn majority_format_wins_and_stragglers_stay_null() {
        let values = ["03/01/2024", "04/01/2024", "2024-01-05", ""];
        let column = parse_date_column("date", &values, 0.5);
        assert_eq!(column.strategy, DateStrategy::Format("%d/%m/%Y"));
        assert_eq!(column.values[0].unwrap().date, date(2024, 1, 3));
        assert_eq!(column.values[2], None);
        assert_eq!(column.values[3], None);
        assert_eq!(column.report.non_empty, 3);
        assert_eq!(column.report.converted, 2);
    }

    #[test]
    fn mixed_column_falls_back_to_permissive_parsing() {
        let values = ["03/01/2024", "2024-01-05", "45300", "5 / 1 / 24"];
        let column = parse_date_column("date", &values, 0.5);
        assert_eq!(column.strategy, DateStrategy::Permissive);
        assert_eq!(column.values[1].unwrap().date, date(2024, 1, 5));
        assert_eq!(column.values[2].unwrap().date, date(2024, 1, 9));
        assert_eq!(column.values[3].unwrap().date, date(2024, 1, 5));
    }

    #[test]
    fn datetime_cells_keep_their_time() {
        let values = ["2024-02-01 13:45:00", "2024-02-02 07:00:00"];
        let column = parse_date_column("date", &values, 0.5);
        let first = column.values[0].unwrap();
        assert_eq!(first.time, NaiveTime::from_hms_opt(13, 45, 0));
    }

    #[test]
    fn time_column_uses_clock_extraction_as_last_resort() {
        let values = ["aprox 14:35 hrs", "sin hora", "0.5", "8h15"];
        let column = parse_time_column("time", &values, 0.5);
        assert_eq!(column.strategy, DateStrategy::Permissive);
        assert_eq!(column.values[0], NaiveTime::from_hms_opt(14, 35, 0));
        assert_eq!(column.values[1], None);
        assert_eq!(column.values[2], NaiveTime::from_hms_opt(12, 0, 0));
        assert_eq!(column.values[3], NaiveTime::from_hms_opt(8, 15, 0));
    }

    #[test]
    fn twelve_hour_times_parse() {
        let values = ["07:30 pm", "11:00 AM"];
        let column = parse_time_column("time", &values, 0.5);
        assert_eq!(column.values[0], NaiveTime::from_hms_opt(19, 30, 0));
    }

    #[test]
    fn calendar_fields_follow_iso_rules() {
        let fields = CalendarFields::from_date(date(2024, 12, 29));
        assert_eq!(fields.quarter, 4);
        assert_eq!(fields.iso_week, 52);
        assert_eq!(fields.weekday, "Sunday");
        assert!(fields.is_weekend);
    }

    #[test]
    fn time_periods_cover_the_day() {
        assert_eq!(TimePeriod::from_hour(3), TimePeriod::Night);
        assert_eq!(TimePeriod::from_hour(6), TimePeriod::Morning);
        assert_eq!(TimePeriod::from_hour(12), TimePeriod::Afternoon);
        assert_eq!(TimePeriod::from_hour(23), TimePeriod::Evening);
        let peak = TimeOfDay::from_time(NaiveTime::from_hms_opt(7, 10, 0).unwrap(), &[7]);
        assert!(peak.is_peak_hour);
    }
}
