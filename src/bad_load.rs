//! Detection of fuel loads that are data-entry errors rather than real
//! dispensing events.
//!
//! Four signals are evaluated in order and a record keeps the first one that
//! fires:
//!
//! 1. the load-type column names a mass/bad load,
//! 2. the positionally last column carries such a note (operators annotate
//!    voided loads there whatever its header says),
//! 3. any free-text column that mentions "carga masiva" somewhere is scanned
//!    row by row for that phrase,
//! 4. the liters value sits above `Q3 + k·IQR` of the whole column.

use std::{collections::BTreeMap, fmt, sync::LazyLock};

use log::info;
use regex::Regex;
use serde::Serialize;

use crate::{
    config::PipelineConfig,
    error::{Diagnostics, Stage},
    record::FuelLoad,
    schema::{CanonicalColumn, ColumnMap, RawTable},
    stats::ValueStats,
};

static BAD_LOAD_TERMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:cargas?\s*masivas?|masivas?|cargas?\s*malas?|malas?\s*cargas?|bad\s*loads?|mass\s*loads?)\b",
    )
    .expect("valid bad-load regex")
});

static MASS_LOAD_PHRASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bcarga\s+masiva\b").expect("valid mass-load regex"));

const MASS_LOAD_MARKER: &str = "carga masiva";

/// Headers written by this crate; a re-uploaded export must not have its
/// flag columns mistaken for the operator note column.
const DERIVED_FLAG_HEADERS: &[&str] = &[
    "is_bad_load",
    "bad_load_signal",
    "is_overconsumption",
    "is_extreme_outlier",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BadLoadSignal {
    TypeField,
    LastColumn,
    MassLoadNote,
    Statistical,
}

impl BadLoadSignal {
    pub fn as_str(self) -> &'static str {
        match self {
            BadLoadSignal::TypeField => "type_field",
            BadLoadSignal::LastColumn => "last_column",
            BadLoadSignal::MassLoadNote => "mass_load_note",
            BadLoadSignal::Statistical => "statistical",
        }
    }
}

impl fmt::Display for BadLoadSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BadLoadReport {
    pub count: usize,
    pub pct: f64,
    pub by_signal: BTreeMap<BadLoadSignal, usize>,
    pub iqr_threshold: Option<f64>,
}

pub fn mentions_bad_load(text: &str) -> bool {
    BAD_LOAD_TERMS.is_match(text)
}

fn flag(record: &mut FuelLoad, signal: BadLoadSignal) {
    if !record.is_bad_load {
        record.is_bad_load = true;
        record.bad_load_signal = Some(signal);
    }
}

fn note_column(table: &RawTable) -> Option<usize> {
    table
        .headers
        .iter()
        .rposition(|h| !DERIVED_FLAG_HEADERS.iter().any(|d| h.eq_ignore_ascii_case(d)))
}

fn is_free_text(columns: &ColumnMap, idx: usize) -> bool {
    ![
        CanonicalColumn::Liters,
        CanonicalColumn::Odometer,
        CanonicalColumn::Date,
        CanonicalColumn::Time,
    ]
    .iter()
    .any(|c| columns.get(*c) == Some(idx))
}

/// Flags bad loads on `records`, which are aligned one-to-one with
/// `table.rows`.
pub fn detect(
    table: &RawTable,
    columns: &ColumnMap,
    records: &mut [FuelLoad],
    config: &PipelineConfig,
    diagnostics: &mut Diagnostics,
) -> BadLoadReport {
    if let Some(type_idx) = columns.get(CanonicalColumn::LoadType) {
        for (row, record) in records.iter_mut().enumerate() {
            if table.cell(row, type_idx).is_some_and(mentions_bad_load) {
                flag(record, BadLoadSignal::TypeField);
            }
        }
    }

    if let Some(note_idx) = note_column(table) {
        for (row, record) in records.iter_mut().enumerate() {
            if table.cell(row, note_idx).is_some_and(mentions_bad_load) {
                flag(record, BadLoadSignal::LastColumn);
            }
        }
    }

    for idx in (0..table.width()).filter(|idx| is_free_text(columns, *idx)) {
        let marked = table
            .column(idx)
            .any(|cell| cell.to_lowercase().contains(MASS_LOAD_MARKER));
        if !marked {
            continue;
        }
        for (row, record) in records.iter_mut().enumerate() {
            if table
                .cell(row, idx)
                .is_some_and(|cell| MASS_LOAD_PHRASE.is_match(cell))
            {
                flag(record, BadLoadSignal::MassLoadNote);
            }
        }
    }

    let iqr_threshold = statistical_threshold(records, config, diagnostics);
    if let Some(threshold) = iqr_threshold {
        for record in records.iter_mut() {
            if record.liters.is_some_and(|l| l > threshold) {
                flag(record, BadLoadSignal::Statistical);
            }
        }
    }

    let mut by_signal = BTreeMap::new();
    for signal in records.iter().filter_map(|r| r.bad_load_signal) {
        *by_signal.entry(signal).or_insert(0) += 1;
    }
    let count = records.iter().filter(|r| r.is_bad_load).count();
    let pct = if records.is_empty() {
        0.0
    } else {
        count as f64 / records.len() as f64 * 100.0
    };
    info!("Flagged {count} bad load(s) ({pct:.2}%)");
    BadLoadReport {
        count,
        pct,
        by_signal,
        iqr_threshold,
    }
}

fn statistical_threshold(
    records: &[FuelLoad],
    config: &PipelineConfig,
    diagnostics: &mut Diagnostics,
) -> Option<f64> {
    let stats = ValueStats::from_values(records.iter().filter_map(|r| r.liters));
    let Some((q1, q3)) = stats.quartiles() else {
        diagnostics.skip(Stage::StatisticalBadLoad, "no liters values");
        return None;
    };
    let iqr = q3 - q1;
    if iqr <= 0.0 {
        diagnostics.skip(
            Stage::StatisticalBadLoad,
            "liters interquartile range is zero",
        );
        return None;
    }
    Some(q3 + config.bad_load_iqr_multiplier * iqr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Diagnostics;

    fn table(headers: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    fn records_for(table: &RawTable, liters_idx: usize) -> Vec<FuelLoad> {
        table
            .rows
            .iter()
            .map(|row| FuelLoad {
                liters: row[liters_idx].parse().ok(),
                ..FuelLoad::default()
            })
            .collect()
    }

    #[test]
    fn terminology_variants_match() {
        for text in ["Carga Masiva", "CARGAS MASIVAS", "mala carga", "bad load", "masiva"] {
            assert!(mentions_bad_load(text), "{text}");
        }
        assert!(!mentions_bad_load("carga normal"));
        assert!(!mentions_bad_load("masivamente"));
    }

    #[test]
    fn first_signal_is_kept_and_union_is_flagged() {
        let raw = table(
            &["load_type", "liters", "Observaciones", "nota final"],
            &[
                &["mala carga", "100", "", ""],
                &["normal", "110", "", "carga masiva"],
                &["normal", "105", "Carga masiva turno noche", ""],
                &["normal", "95", "", ""],
                &["normal", "100", "", ""],
                &["normal", "900", "", ""],
            ],
        );
        let mut columns_table = raw.clone();
        let mut diagnostics = Diagnostics::default();
        let columns = crate::schema::reconcile_columns(&mut columns_table, &mut diagnostics);
        let mut records = records_for(&raw, 1);
        let report = detect(
            &raw,
            &columns,
            &mut records,
            &PipelineConfig::default(),
            &mut diagnostics,
        );
        let signals = records.iter().map(|r| r.bad_load_signal).collect::<Vec<_>>();
        assert_eq!(
            signals,
            vec![
                Some(BadLoadSignal::TypeField),
                Some(BadLoadSignal::LastColumn),
                Some(BadLoadSignal::MassLoadNote),
                None,
                None,
                Some(BadLoadSignal::Statistical),
            ]
        );
        assert_eq!(report.count, 4);
        assert_eq!(report.by_signal[&BadLoadSignal::Statistical], 1);
    }

    #[test]
    fn derived_flag_columns_are_not_the_note_column() {
        let raw = table(&["liters", "nota", "is_bad_load"], &[&["10", "masiva", "false"]]);
        assert_eq!(note_column(&raw), Some(1));
    }

    #[test]
    fn zero_iqr_skips_statistical_signal() {
        let raw = table(
            &["liters", "x"],
            &[&["10", ""], &["10", ""], &["10", ""], &["10", ""], &["100", ""]],
        );
        let mut records = records_for(&raw, 0);
        let mut diagnostics = Diagnostics::default();
        let report = detect(
            &raw,
            &ColumnMap::default(),
            &mut records,
            &PipelineConfig::default(),
            &mut diagnostics,
        );
        assert_eq!(report.count, 0);
        assert!(diagnostics.skipped(Stage::StatisticalBadLoad));
    }
}
