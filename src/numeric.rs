//! Numeric coercion for locale-formatted spreadsheet cells.
//!
//! A column is first parsed as plain numbers. When too many non-empty cells
//! fail, the whole column is re-parsed with separator cleanup: the separator
//! that appears last is the decimal mark and every other `.`/`,` is a
//! thousands separator. Cells that still fail become null.

use log::debug;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionReport {
    pub column: String,
    pub non_empty: usize,
    pub converted: usize,
    pub locale_cleanup: bool,
}

impl ConversionReport {
    pub fn tally<T>(column: &str, raw: &[&str], parsed: &[Option<T>]) -> Self {
        let non_empty = raw.iter().filter(|v| !v.trim().is_empty()).count();
        let converted = parsed.iter().filter(|p| p.is_some()).count();
        Self {
            column: column.to_string(),
            non_empty,
            converted,
            locale_cleanup: false,
        }
    }

    /// Share of non-empty cells converted, as a percentage. An empty column
    /// counts as fully converted.
    pub fn converted_pct(&self) -> f64 {
        if self.non_empty == 0 {
            100.0
        } else {
            self.converted as f64 / self.non_empty as f64 * 100.0
        }
    }
}

#[derive(Debug, Clone)]
pub struct NumericColumn {
    pub values: Vec<Option<f64>>,
    pub report: ConversionReport,
}

/// Plain parse: optional surrounding whitespace, no separators beyond a
/// single `.` decimal point.
pub fn parse_plain(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parses `1.234,56`, `1,234.56`, `1 234,5`, `12,5`, `$ 1.200` and the like.
pub fn parse_localized(value: &str) -> Option<f64> {
    let mut body = String::with_capacity(value.len());
    for ch in value.trim().chars() {
        match ch {
            '0'..='9' | '.' | ',' | '-' | '+' => body.push(ch),
            ' ' | '\u{a0}' | '\'' | '_' | '$' | '€' => {}
            _ => return None,
        }
    }
    if body.is_empty() {
        return None;
    }
    let last_dot = body.rfind('.');
    let last_comma = body.rfind(',');
    let normalized = match (last_dot, last_comma) {
        (Some(dot), Some(comma)) if comma > dot => body.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => body.replace(',', ""),
        (None, Some(_)) if body.matches(',').count() > 1 => body.replace(',', ""),
        (None, Some(_)) => body.replace(',', "."),
        (Some(_), None) if body.matches('.').count() > 1 => body.replace('.', ""),
        _ => body,
    };
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Coerces a raw text column, falling back to locale cleanup when more than
/// `failure_ratio` of non-empty cells fail the plain parse.
pub fn coerce_column(column: &str, raw: &[&str], failure_ratio: f64) -> NumericColumn {
    let plain = raw.iter().map(|v| parse_plain(v)).collect::<Vec<_>>();
    let mut report = ConversionReport::tally(column, raw, &plain);
    let failed = report.non_empty - report.converted;
    if report.non_empty == 0 || (failed as f64 / report.non_empty as f64) <= failure_ratio {
        return NumericColumn {
            values: plain,
            report,
        };
    }
    debug!(
        "Column '{column}' failed plain parsing for {failed}/{} value(s); retrying with locale cleanup",
        report.non_empty
    );
    let localized = raw.iter().map(|v| parse_localized(v)).collect::<Vec<_>>();
    report.converted = localized.iter().filter(|v| v.is_some()).count();
    report.locale_cleanup = true;
    NumericColumn {
        values: localized,
        report,
    }
}

/// Quantities cannot be negative: negative cells become null.
pub fn reject_negative(column: &mut NumericColumn) -> usize {
    let mut rejected = 0;
    for value in column.values.iter_mut() {
        if matches!(value, Some(v) if *v < 0.0) {
            *value = None;
            rejected += 1;
        }
    }
    column.report.converted -= rejected;
    rejected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn localized_parsing_uses_last_separator_as_decimal() {
        assert_eq!(parse_localized("1.234,56"), Some(1234.56));
        assert_eq!(parse_localized("1,234.56"), Some(1234.56));
        assert_eq!(parse_localized("12,5"), Some(12.5));
        assert_eq!(parse_localized("1.234.567"), Some(1_234_567.0));
        assert_eq!(parse_localized("1,234,567"), Some(1_234_567.0));
        assert_eq!(parse_localized("$ 1 200,75"), Some(1200.75));
        assert_eq!(parse_localized("n/a"), None);
    }

    #[test]
    fn clean_column_keeps_plain_values() {
        let raw = ["120.5", "98", "", "abc", "45", "60"];
        let column = coerce_column("liters", &raw, 0.30);
        assert!(!column.report.locale_cleanup);
        assert_eq!(
            column.values,
            vec![Some(120.5), Some(98.0), None, None, Some(45.0), Some(60.0)]
        );
        assert_eq!(column.report.non_empty, 5);
        assert_eq!(column.report.converted, 4);
    }

    #[test]
    fn comma_decimal_column_triggers_cleanup() {
        let raw = ["120,5", "1.098,25", "87", "x"];
        let column = coerce_column("liters", &raw, 0.30);
        assert!(column.report.locale_cleanup);
        assert_eq!(
            column.values,
            vec![Some(120.5), Some(1098.25), Some(87.0), None]
        );
        assert_eq!(column.report.converted_pct(), 75.0);
    }

    #[test]
    fn negative_quantities_become_null() {
        let raw = ["-5", "10"];
        let mut column = coerce_column("liters", &raw, 0.30);
        assert_eq!(reject_negative(&mut column), 1);
        assert_eq!(column.values, vec![None, Some(10.0)]);
        assert_eq!(column.report.converted, 1);
    }
}
