#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};
use tempfile::{TempDir, tempdir};

/// Header row of the fleet export, as produced by the depot spreadsheets.
pub const FLEET_HEADER: &[&str] = &[
    "Fecha",
    "Hora",
    "Terminal",
    "N° Interno",
    "Patente",
    "Modelo",
    "Litros",
    "Odómetro",
    "Conductor",
    "Planillero",
    "Tipo Carga",
    "Observaciones",
];

/// One fuel load in the column order of [`FLEET_HEADER`].
#[derive(Debug, Clone)]
pub struct LoadRow {
    pub date: String,
    pub time: String,
    pub terminal: String,
    pub vehicle: String,
    pub plate: String,
    pub model: String,
    pub liters: String,
    pub odometer: String,
    pub driver: String,
    pub clerk: String,
    pub load_type: String,
    pub note: String,
}

impl LoadRow {
    pub fn new(date: &str, vehicle: &str, liters: &str, odometer: &str) -> Self {
        Self {
            date: date.to_string(),
            time: "08:15".to_string(),
            terminal: "Norte".to_string(),
            vehicle: vehicle.to_string(),
            plate: format!("AB{vehicle}"),
            model: "Volvo B7R".to_string(),
            liters: liters.to_string(),
            odometer: odometer.to_string(),
            driver: "Perez".to_string(),
            clerk: "Gomez".to_string(),
            load_type: "Normal".to_string(),
            note: String::new(),
        }
    }

    pub fn cells(&self) -> Vec<&str> {
        [
            &self.date,
            &self.time,
            &self.terminal,
            &self.vehicle,
            &self.plate,
            &self.model,
            &self.liters,
            &self.odometer,
            &self.driver,
            &self.clerk,
            &self.load_type,
            &self.note,
        ]
        .into_iter()
        .map(String::as_str)
        .collect()
    }
}

/// Renders a fleet export with the two title rows above the header.
pub fn fleet_text(rows: &[LoadRow], delimiter: char) -> String {
    let sep = delimiter.to_string();
    let mut text = String::new();
    text.push_str("REPORTE DE CARGAS DE COMBUSTIBLE\n");
    text.push_str("Periodo: marzo 2024\n");
    text.push_str(&FLEET_HEADER.join(&sep));
    text.push('\n');
    for row in rows {
        text.push_str(&row.cells().join(&sep));
        text.push('\n');
    }
    text
}

/// A vehicle's loads on consecutive days, `step_km` apart, `liters` each.
pub fn vehicle_loads(vehicle: &str, model: &str, loads: usize, step_km: f64, liters: f64) -> Vec<LoadRow> {
    (0..loads)
        .map(|idx| {
            let mut row = LoadRow::new(
                &format!("{:02}/03/2024", idx + 1),
                vehicle,
                &liters.to_string(),
                &(10_000.0 + step_km * idx as f64).to_string(),
            );
            row.model = model.to_string();
            row
        })
        .collect()
}

/// Cell of a generated workbook; dates fall in March 2024.
#[derive(Debug, Clone, Copy)]
pub enum XlsxCell {
    Text(&'static str),
    Number(f64),
    Date(u8),
    Time(u16, u8),
    DateTime(u8, u16, u8),
}

/// Builds an xlsx workbook whose first sheet holds `rows` from row 0.
/// An empty row is left blank.
pub fn fleet_workbook(rows: &[Vec<XlsxCell>]) -> Vec<u8> {
    let date_format = Format::new().set_num_format("dd/mm/yyyy");
    let time_format = Format::new().set_num_format("hh:mm");
    let datetime_format = Format::new().set_num_format("dd/mm/yyyy hh:mm");
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (row_idx, row) in rows.iter().enumerate() {
        let row_num = row_idx as u32;
        for (col_idx, cell) in row.iter().enumerate() {
            let col_num = col_idx as u16;
            match *cell {
                XlsxCell::Text(text) => {
                    sheet.write_string(row_num, col_num, text).expect("write text");
                }
                XlsxCell::Number(value) => {
                    sheet.write_number(row_num, col_num, value).expect("write number");
                }
                XlsxCell::Date(day) => {
                    let date = ExcelDateTime::from_ymd(2024, 3, day).expect("valid date");
                    sheet
                        .write_datetime_with_format(row_num, col_num, &date, &date_format)
                        .expect("write date");
                }
                XlsxCell::Time(hour, minute) => {
                    let time = ExcelDateTime::from_hms(hour, minute, 0).expect("valid time");
                    sheet
                        .write_datetime_with_format(row_num, col_num, &time, &time_format)
                        .expect("write time");
                }
                XlsxCell::DateTime(day, hour, minute) => {
                    let datetime = ExcelDateTime::from_ymd(2024, 3, day)
                        .and_then(|d| d.and_hms(hour, minute, 0))
                        .expect("valid datetime");
                    sheet
                        .write_datetime_with_format(row_num, col_num, &datetime, &datetime_format)
                        .expect("write datetime");
                }
            }
        }
    }
    workbook.save_to_buffer().expect("serialize workbook")
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        self.write_bytes(name, contents.as_bytes())
    }

    /// Writes raw bytes, for fixtures in legacy encodings.
    pub fn write_bytes(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents).expect("write temp file contents");
        path
    }
}
