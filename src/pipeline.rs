//! The enrichment pipeline: raw blob in, [`EnrichedTable`] out.
//!
//! Stages run strictly downstream. Only an unreadable input aborts the run;
//! every other problem degrades the affected derivation to nulls and is
//! recorded as a diagnostic on the result.

use std::{fs, path::Path, time::Instant};

use chrono::NaiveTime;
use log::{debug, info};

use crate::{
    bad_load,
    config::PipelineConfig,
    efficiency,
    enrichment,
    error::{Diagnostic, Diagnostics, PipelineError, Stage},
    model::{self, canonical_model, normalize_text},
    numeric::{self, ConversionReport, NumericColumn},
    overconsumption,
    record::{EnrichedTable, FuelLoad, Summary},
    schema::{self, CanonicalColumn, ColumnMap, RawTable},
    temporal::{self, CalendarFields, DateColumn, TimeColumn, TimeOfDay},
};

/// Runs the full pipeline over an uploaded file's bytes. `extension` is the
/// declared file extension, with or without the leading dot.
pub fn enrich(
    bytes: &[u8],
    extension: &str,
    config: &PipelineConfig,
) -> Result<EnrichedTable, PipelineError> {
    config
        .validate()
        .map_err(|err| PipelineError::Config(format!("{err:#}")))?;
    let started = Instant::now();

    let mut table = schema::read_table(bytes, Some(extension), config.header_row)?;
    let mut diagnostics = Diagnostics::default();
    let columns = schema::reconcile_columns(&mut table, &mut diagnostics);
    let mut typed = TypedColumns::parse(&table, &columns, config);
    for report in &typed.conversions {
        if report.converted_pct() < config.numeric_usable_ratio * 100.0 {
            diagnostics.push(Diagnostic::ConversionDegradation {
                column: report.column.clone(),
                converted_pct: report.converted_pct(),
            });
        }
    }

    let mut records = build_records(&table, &columns, &mut typed, config);
    if records.iter().all(|r| r.calendar.is_none()) {
        diagnostics.skip(Stage::Calendar, "no parseable dates");
    }
    if records.iter().all(|r| r.time_of_day.is_none()) {
        diagnostics.skip(Stage::TimeOfDay, "no parseable times of day");
    }

    let bad_loads = bad_load::detect(&table, &columns, &mut records, config, &mut diagnostics);

    let mut overconsumption = overconsumption::OverconsumptionReport::default();
    if columns.contains(CanonicalColumn::Liters) {
        overconsumption = overconsumption::detect(&mut records, config);
        overconsumption::mark_extreme_outliers(
            &mut records,
            config,
            &mut overconsumption,
            &mut diagnostics,
        );
        model::assign_fill_percentage(&mut records, config, &mut diagnostics);
    } else {
        diagnostics.skip(Stage::Overconsumption, "no liters column");
        diagnostics.skip(Stage::OutlierPass, "no liters column");
        diagnostics.skip(Stage::FillPercentage, "no liters column");
    }

    let mut efficiency_values = 0;
    match efficiency_blocker(&columns, &records) {
        Some(reason) => diagnostics.skip(Stage::Efficiency, reason),
        None => efficiency_values = efficiency::compute(&mut records, config).efficiency_values,
    }

    let rollups = enrichment::attach_rollups(&mut records);

    let summary = Summary {
        rows: records.len(),
        conversions: typed.conversions,
        bad_loads: bad_loads.count,
        bad_load_pct: bad_loads.pct,
        overconsumption: overconsumption.flagged,
        extreme_outliers: overconsumption.extreme_outliers,
        efficiency_values,
        elapsed: started.elapsed(),
    };
    info!(
        "Enriched {} row(s) in {} ms with {} diagnostic(s)",
        summary.rows,
        summary.elapsed.as_millis(),
        diagnostics.len()
    );
    Ok(EnrichedTable {
        records,
        summary,
        rollups,
        diagnostics: diagnostics.into_vec(),
    })
}

/// Reads `path` and runs [`enrich`] with the path's extension as the hint.
pub fn enrich_path(path: &Path, config: &PipelineConfig) -> Result<EnrichedTable, PipelineError> {
    let bytes = fs::read(path).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();
    enrich(&bytes, extension, config)
}

fn efficiency_blocker(columns: &ColumnMap, records: &[FuelLoad]) -> Option<&'static str> {
    if !columns.contains(CanonicalColumn::Odometer) {
        Some("no odometer column")
    } else if !columns.contains(CanonicalColumn::VehicleId) {
        Some("no vehicle id column")
    } else if !columns.contains(CanonicalColumn::Liters) {
        Some("no liters column")
    } else if records.iter().all(|r| r.timestamp.is_none()) {
        Some("no parseable timestamps to order loads")
    } else {
        None
    }
}

/// Typed versions of the columns that need parsing, aligned with the rows.
struct TypedColumns {
    dates: Option<DateColumn>,
    times: Option<TimeColumn>,
    liters: Option<NumericColumn>,
    odometer: Option<NumericColumn>,
    conversions: Vec<ConversionReport>,
}

impl TypedColumns {
    fn parse(table: &RawTable, columns: &ColumnMap, config: &PipelineConfig) -> Self {
        let raw = |column: CanonicalColumn| {
            columns
                .get(column)
                .map(|idx| table.column(idx).collect::<Vec<_>>())
        };
        let dates = raw(CanonicalColumn::Date).map(|values| {
            temporal::parse_date_column(
                CanonicalColumn::Date.name(),
                &values,
                config.temporal_accept_ratio,
            )
        });
        let times = raw(CanonicalColumn::Time).map(|values| {
            temporal::parse_time_column(
                CanonicalColumn::Time.name(),
                &values,
                config.temporal_accept_ratio,
            )
        });
        let liters = raw(CanonicalColumn::Liters).map(|values| {
            let mut column = numeric::coerce_column(
                CanonicalColumn::Liters.name(),
                &values,
                config.numeric_failure_ratio,
            );
            let rejected = numeric::reject_negative(&mut column);
            if rejected > 0 {
                debug!("Nulled {rejected} negative liters value(s)");
            }
            column
        });
        let odometer = raw(CanonicalColumn::Odometer).map(|values| {
            numeric::coerce_column(
                CanonicalColumn::Odometer.name(),
                &values,
                config.numeric_failure_ratio,
            )
        });

        let conversions = [
            dates.as_ref().map(|c| c.report.clone()),
            times.as_ref().map(|c| c.report.clone()),
            liters.as_ref().map(|c| c.report.clone()),
            odometer.as_ref().map(|c| c.report.clone()),
        ]
        .into_iter()
        .flatten()
        .collect();

        Self {
            dates,
            times,
            liters,
            odometer,
            conversions,
        }
    }
}

fn build_records(
    table: &RawTable,
    columns: &ColumnMap,
    typed: &mut TypedColumns,
    config: &PipelineConfig,
) -> Vec<FuelLoad> {
    let text = |row: usize, column: CanonicalColumn| {
        columns
            .get(column)
            .and_then(|idx| table.cell(row, idx))
            .and_then(normalize_text)
    };
    let numeric = |column: &Option<NumericColumn>, row: usize| {
        column.as_ref().and_then(|c| c.values.get(row).copied().flatten())
    };

    (0..table.len())
        .map(|row| {
            let parsed_date = typed
                .dates
                .as_ref()
                .and_then(|c| c.values.get(row).copied().flatten());
            let time = typed
                .times
                .as_ref()
                .and_then(|c| c.values.get(row).copied().flatten())
                .or_else(|| parsed_date.and_then(|d| d.time));
            let date = parsed_date.map(|d| d.date);
            let raw_model = columns
                .get(CanonicalColumn::Model)
                .and_then(|idx| table.cell(row, idx))
                .map(str::to_string);
            FuelLoad {
                source_row: row,
                date,
                time,
                timestamp: date.map(|d| d.and_time(time.unwrap_or(NaiveTime::MIN))),
                vehicle_id: text(row, CanonicalColumn::VehicleId),
                terminal: text(row, CanonicalColumn::Terminal),
                liters: numeric(&typed.liters, row),
                odometer: numeric(&typed.odometer, row),
                plate: text(row, CanonicalColumn::Plate),
                model: canonical_model(raw_model.as_deref(), &config.model_groups),
                raw_model,
                driver: text(row, CanonicalColumn::Driver),
                clerk: text(row, CanonicalColumn::Clerk),
                supervisor: text(row, CanonicalColumn::Supervisor),
                load_type: text(row, CanonicalColumn::LoadType),
                calendar: date.map(CalendarFields::from_date),
                time_of_day: time.map(|t| TimeOfDay::from_time(t, &config.peak_hours)),
                ..FuelLoad::default()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLEET: &str = "\
REPORTE DE CARGAS,,,,,,
Enero 2024,,,,,,
Fecha,Hora,Terminal,N° Interno,Litros,Odómetro,Modelo
01/01/2024,06:30,Norte,101,120,1000,Volvo B7R
02/01/2024,18:10,Norte,101,110,1300,Volvo B7R
03/01/2024,12:00,Sur,202,-5,500,mb o500
04/01/2024,23:45,Sur,202,abc,800,mb o500
";

    #[test]
    fn enriches_a_small_fleet_file() {
        let table = enrich(FLEET.as_bytes(), "csv", &PipelineConfig::default()).unwrap();
        assert_eq!(table.len(), 4);
        let first = &table.records[0];
        assert_eq!(first.vehicle_id.as_deref(), Some("101"));
        assert_eq!(first.terminal.as_deref(), Some("NORTE"));
        assert_eq!(first.model, "VOLVO");
        assert_eq!(table.records[2].model, "MERCEDES BENZ");
        assert_eq!(table.records[2].liters, None);
        assert_eq!(table.records[3].liters, None);
        assert_eq!(table.records[1].distance_since_last_load, Some(300.0));
        assert_eq!(first.is_peak_hour(), Some(true));
        assert_eq!(table.summary.rows, 4);
        assert!(table.summary.conversion("liters").is_some());
    }

    #[test]
    fn missing_time_column_falls_back_to_midnight() {
        let csv = "Cargas\nFebrero\nFecha;Interno;Litros\n05/02/2024;7;50\n06/02/2024;7;55\n";
        let table = enrich(csv.as_bytes(), ".txt", &PipelineConfig::default()).unwrap();
        let record = &table.records[0];
        assert_eq!(record.time, None);
        assert_eq!(
            record.timestamp.map(|t| t.time()),
            Some(NaiveTime::MIN)
        );
        assert!(record.time_of_day.is_none());
        assert!(!table.ran(Stage::TimeOfDay));
        assert!(!table.ran(Stage::Efficiency));
        assert!(table.ran(Stage::Calendar));
    }

    #[test]
    fn unknown_extension_is_a_format_error() {
        let err = enrich(FLEET.as_bytes(), "pdf", &PipelineConfig::default()).unwrap_err();
        assert!(err.is_format());
    }

    #[test]
    fn header_without_rows_is_a_format_error() {
        let csv = "a,b\nc,d\nFecha,Litros\n";
        let err = enrich(csv.as_bytes(), "csv", &PipelineConfig::default()).unwrap_err();
        assert!(err.is_format());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = PipelineConfig {
            distance_min_km: 2000.0,
            ..PipelineConfig::default()
        };
        let err = enrich(FLEET.as_bytes(), "csv", &config).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
