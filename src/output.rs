//! Writers for the enriched table: flat CSV, JSON, and a terminal preview.
//!
//! The CSV layout is fixed. Columns belonging to a derivation that did not
//! run are left out instead of being written as empty columns.

use std::{io::Write as _, path::Path};

use anyhow::{Context, Result};

use crate::{
    error::Stage,
    io_utils,
    record::{EnrichedTable, FuelLoad},
    table::TextTable,
};

type Extract = fn(&FuelLoad) -> String;

pub struct OutputColumn {
    pub name: &'static str,
    /// Derivation the column depends on, if any.
    pub stage: Option<Stage>,
    extract: Extract,
}

impl OutputColumn {
    pub fn value(&self, record: &FuelLoad) -> String {
        (self.extract)(record)
    }
}

fn number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn count(value: Option<usize>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn flag(value: Option<bool>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

const fn base(name: &'static str, extract: Extract) -> OutputColumn {
    OutputColumn {
        name,
        stage: None,
        extract,
    }
}

const fn derived(name: &'static str, stage: Stage, extract: Extract) -> OutputColumn {
    OutputColumn {
        name,
        stage: Some(stage),
        extract,
    }
}

pub const COLUMNS: &[OutputColumn] = &[
    base("source_row", |r| (r.source_row + 1).to_string()),
    base("date", |r| {
        r.date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default()
    }),
    base("time", |r| {
        r.time.map(|t| t.format("%H:%M:%S").to_string()).unwrap_or_default()
    }),
    base("timestamp", |r| {
        r.timestamp
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default()
    }),
    base("vehicle_id", |r| text(&r.vehicle_id)),
    base("terminal", |r| text(&r.terminal)),
    base("liters", |r| number(r.liters)),
    base("odometer", |r| number(r.odometer)),
    base("plate", |r| text(&r.plate)),
    base("model", |r| r.model.clone()),
    base("raw_model", |r| text(&r.raw_model)),
    base("driver", |r| text(&r.driver)),
    base("clerk", |r| text(&r.clerk)),
    base("supervisor", |r| text(&r.supervisor)),
    base("load_type", |r| text(&r.load_type)),
    derived("year", Stage::Calendar, |r| {
        r.calendar.as_ref().map(|c| c.year.to_string()).unwrap_or_default()
    }),
    derived("month", Stage::Calendar, |r| {
        r.calendar.as_ref().map(|c| c.month.to_string()).unwrap_or_default()
    }),
    derived("day", Stage::Calendar, |r| {
        r.calendar.as_ref().map(|c| c.day.to_string()).unwrap_or_default()
    }),
    derived("iso_week", Stage::Calendar, |r| {
        r.calendar.as_ref().map(|c| c.iso_week.to_string()).unwrap_or_default()
    }),
    derived("quarter", Stage::Calendar, |r| {
        r.calendar.as_ref().map(|c| c.quarter.to_string()).unwrap_or_default()
    }),
    derived("weekday", Stage::Calendar, |r| {
        r.calendar
            .as_ref()
            .map(|c| c.weekday.to_string())
            .unwrap_or_default()
    }),
    derived("is_weekend", Stage::Calendar, |r| flag(r.is_weekend())),
    derived("time_period", Stage::TimeOfDay, |r| {
        r.time_of_day
            .map(|t| t.period.as_str().to_string())
            .unwrap_or_default()
    }),
    derived("is_peak_hour", Stage::TimeOfDay, |r| flag(r.is_peak_hour())),
    base("is_bad_load", |r| r.is_bad_load.to_string()),
    base("bad_load_signal", |r| {
        r.bad_load_signal
            .map(|s| s.as_str().to_string())
            .unwrap_or_default()
    }),
    derived("is_overconsumption", Stage::Overconsumption, |r| {
        r.is_overconsumption.to_string()
    }),
    derived("z_score_vs_model", Stage::Overconsumption, |r| {
        number(r.z_score_vs_model)
    }),
    derived("overconsumption_threshold", Stage::Overconsumption, |r| {
        number(r.overconsumption_threshold)
    }),
    derived("is_extreme_outlier", Stage::OutlierPass, |r| {
        r.is_extreme_outlier.to_string()
    }),
    derived("fill_percentage", Stage::FillPercentage, |r| {
        number(r.fill_percentage)
    }),
    derived("distance_since_last_load", Stage::Efficiency, |r| {
        number(r.distance_since_last_load)
    }),
    derived("plausible_distance", Stage::Efficiency, |r| {
        number(r.plausible_distance)
    }),
    derived("efficiency_km_per_liter", Stage::Efficiency, |r| {
        number(r.efficiency_km_per_liter)
    }),
    derived("model_efficiency_baseline", Stage::Efficiency, |r| {
        number(r.model_efficiency_baseline)
    }),
    derived("efficiency_deviation_pct", Stage::Efficiency, |r| {
        number(r.efficiency_deviation_pct)
    }),
    derived("efficiency_category", Stage::Efficiency, |r| {
        r.efficiency_category
            .map(|c| c.as_str().to_string())
            .unwrap_or_default()
    }),
    base("terminal_load_count", |r| count(r.terminal_load_count)),
    base("terminal_total_liters", |r| number(r.terminal_total_liters)),
    base("terminal_avg_liters", |r| number(r.terminal_avg_liters)),
    base("terminal_volume_rank", |r| count(r.terminal_volume_rank)),
    base("driver_overconsumption_rate", |r| {
        number(r.driver_overconsumption_rate)
    }),
    base("clerk_bad_load_rate", |r| number(r.clerk_bad_load_rate)),
];

const PREVIEW_COLUMNS: &[&str] = &[
    "date",
    "time",
    "vehicle_id",
    "terminal",
    "model",
    "liters",
    "is_bad_load",
    "is_overconsumption",
    "efficiency_km_per_liter",
    "efficiency_category",
];

/// Columns written for this table, in output order.
pub fn active_columns(table: &EnrichedTable) -> Vec<&'static OutputColumn> {
    COLUMNS
        .iter()
        .filter(|column| column.stage.is_none_or(|stage| table.ran(stage)))
        .collect()
}

pub fn write_csv(table: &EnrichedTable, output: Option<&Path>) -> Result<()> {
    let columns = active_columns(table);
    let mut writer = io_utils::open_csv_writer(output)?;
    writer
        .write_record(columns.iter().map(|c| c.name))
        .context("Writing CSV header")?;
    for record in &table.records {
        writer
            .write_record(columns.iter().map(|c| c.value(record)))
            .with_context(|| format!("Writing row {}", record.source_row + 1))?;
    }
    writer.flush().context("Flushing CSV output")?;
    Ok(())
}

pub fn write_json(table: &EnrichedTable, output: Option<&Path>) -> Result<()> {
    let mut writer = io_utils::open_output(output)?;
    serde_json::to_writer_pretty(&mut writer, table).context("Serializing enriched table")?;
    writeln!(writer).context("Writing JSON output")?;
    writer.flush().context("Flushing JSON output")?;
    Ok(())
}

/// The first `limit` records as a compact terminal table.
pub fn preview(table: &EnrichedTable, limit: usize) -> TextTable {
    let columns = active_columns(table)
        .into_iter()
        .filter(|c| PREVIEW_COLUMNS.contains(&c.name))
        .collect::<Vec<_>>();
    let mut text = TextTable::new(&columns.iter().map(|c| c.name).collect::<Vec<_>>());
    for record in table.records.iter().take(limit) {
        text.push_row(columns.iter().map(|c| c.value(record)).collect());
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::Diagnostic, record::Summary};

    fn table(diagnostics: Vec<Diagnostic>) -> EnrichedTable {
        EnrichedTable {
            records: vec![FuelLoad {
                vehicle_id: Some("101".to_string()),
                liters: Some(120.5),
                model: "VOLVO".to_string(),
                ..FuelLoad::default()
            }],
            summary: Summary::default(),
            rollups: Default::default(),
            diagnostics,
        }
    }

    #[test]
    fn skipped_stages_drop_their_columns() {
        let skipped = table(vec![Diagnostic::StageSkipped {
            stage: Stage::Efficiency,
            reason: "no odometer column".to_string(),
        }]);
        let names = active_columns(&skipped)
            .iter()
            .map(|c| c.name)
            .collect::<Vec<_>>();
        assert!(!names.contains(&"efficiency_km_per_liter"));
        assert!(names.contains(&"is_overconsumption"));
        assert_eq!(active_columns(&table(Vec::new())).len(), COLUMNS.len());
    }

    #[test]
    fn csv_output_round_trips_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        write_csv(&table(Vec::new()), Some(&path)).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        let mut lines = written.lines();
        assert!(lines.next().unwrap().starts_with("source_row,date,time"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("1,,,,101,,120.5,"));
    }

    #[test]
    fn preview_limits_rows() {
        let preview = preview(&table(Vec::new()), 0);
        assert!(preview.is_empty());
    }
}
