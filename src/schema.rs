//! Schema normalization: turns an uploaded blob into a header-aligned
//! [`RawTable`] and maps its columns onto the canonical fuel-load schema.
//!
//! ## Responsibilities
//!
//! - Format dispatch on the extension hint (`.csv`/`.txt` vs `.xlsx`/`.xls`)
//! - Encoding × delimiter search for delimited text, first candidate whose
//!   header row splits into more than one column wins
//! - Skipping the title rows above the configured header row
//! - Column reconciliation: exact canonical names first, then a
//!   case- and accent-insensitive substring search over the remaining headers

use std::{
    collections::{BTreeMap, HashSet},
    fmt,
    io::Cursor,
};

use calamine::{Data, DataType, Range, Reader, open_workbook_auto_from_rs};
use chrono::{Datelike, NaiveTime};
use log::{debug, info};
use serde::Serialize;

use crate::{
    error::{Diagnostic, Diagnostics, PipelineError},
    io_utils,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalColumn {
    Date,
    Time,
    Terminal,
    VehicleId,
    Liters,
    Odometer,
    Plate,
    Model,
    Driver,
    Clerk,
    Supervisor,
    LoadType,
}

impl CanonicalColumn {
    pub const ALL: [CanonicalColumn; 12] = [
        CanonicalColumn::Date,
        CanonicalColumn::Time,
        CanonicalColumn::Terminal,
        CanonicalColumn::VehicleId,
        CanonicalColumn::Liters,
        CanonicalColumn::Odometer,
        CanonicalColumn::Plate,
        CanonicalColumn::Model,
        CanonicalColumn::Driver,
        CanonicalColumn::Clerk,
        CanonicalColumn::Supervisor,
        CanonicalColumn::LoadType,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CanonicalColumn::Date => "date",
            CanonicalColumn::Time => "time",
            CanonicalColumn::Terminal => "terminal",
            CanonicalColumn::VehicleId => "vehicle_id",
            CanonicalColumn::Liters => "liters",
            CanonicalColumn::Odometer => "odometer",
            CanonicalColumn::Plate => "plate",
            CanonicalColumn::Model => "model",
            CanonicalColumn::Driver => "driver",
            CanonicalColumn::Clerk => "clerk",
            CanonicalColumn::Supervisor => "supervisor",
            CanonicalColumn::LoadType => "load_type",
        }
    }

    /// Folded substrings searched for when the canonical name is absent.
    /// More specific aliases come first.
    fn aliases(self) -> &'static [&'static str] {
        match self {
            CanonicalColumn::Date => &["fecha", "date"],
            CanonicalColumn::Time => &["hora", "time"],
            CanonicalColumn::Terminal => &["terminal", "deposito", "depot"],
            CanonicalColumn::VehicleId => &[
                "numero interno",
                "n interno",
                "no interno",
                "nro interno",
                "interno",
                "vehicle",
                "vehiculo",
                "bus",
            ],
            CanonicalColumn::Liters => &["litros", "liters", "litres", "lts", "cantidad"],
            CanonicalColumn::Odometer => &["odometro", "odometer", "kilometraje", "km"],
            CanonicalColumn::Plate => &["patente", "placa", "plate"],
            CanonicalColumn::Model => &["modelo", "model", "marca"],
            CanonicalColumn::Driver => &["conductor", "chofer", "driver"],
            CanonicalColumn::Clerk => &["planillero", "despachador", "clerk", "operador"],
            CanonicalColumn::Supervisor => &["supervisor", "jefe"],
            CanonicalColumn::LoadType => &["tipo", "type"],
        }
    }

    /// Columns the enrichment meaningfully depends on; absence is reported.
    pub fn is_expected(self) -> bool {
        matches!(
            self,
            CanonicalColumn::Date
                | CanonicalColumn::Time
                | CanonicalColumn::Terminal
                | CanonicalColumn::VehicleId
                | CanonicalColumn::Liters
        )
    }
}

impl fmt::Display for CanonicalColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Text cells under a single header row. Every row has exactly
/// `headers.len()` cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Builds a table from records, taking `header_row` as the header and
    /// discarding everything above it. Ragged rows are padded, fully blank
    /// rows dropped, and unnamed or surplus columns named `column_{n}`.
    pub fn from_records(mut records: Vec<Vec<String>>, header_row: usize) -> Option<Self> {
        if records.len() <= header_row {
            return None;
        }
        let body = records.split_off(header_row + 1);
        let header_record = records.pop()?;
        let width = body
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(header_record.len()))
            .max()
            .unwrap_or(0);
        let headers = (0..width)
            .map(|idx| {
                header_record
                    .get(idx)
                    .map(|h| h.trim())
                    .filter(|h| !h.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("column_{}", idx + 1))
            })
            .collect::<Vec<_>>();
        let rows = body
            .into_iter()
            .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
            .map(|mut row| {
                row.resize(width, String::new());
                row.iter_mut().for_each(|cell| *cell = cell.trim().to_string());
                row
            })
            .collect();
        Some(Self { headers, rows })
    }

    pub fn width(&self) -> usize {
        self.headers.len()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|header| header.eq_ignore_ascii_case(name))
    }

    pub fn column(&self, idx: usize) -> impl Iterator<Item = &str> + '_ {
        self.rows
            .iter()
            .map(move |row| row.get(idx).map(String::as_str).unwrap_or(""))
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }
}

/// Canonical column → position in the reconciled [`RawTable`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    positions: BTreeMap<CanonicalColumn, usize>,
}

impl ColumnMap {
    pub fn get(&self, column: CanonicalColumn) -> Option<usize> {
        self.positions.get(&column).copied()
    }

    pub fn contains(&self, column: CanonicalColumn) -> bool {
        self.positions.contains_key(&column)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Delimited,
    Spreadsheet,
}

impl SourceFormat {
    pub fn from_extension(extension: Option<&str>) -> Option<Self> {
        let ext = extension?.trim().trim_start_matches('.').to_ascii_lowercase();
        match ext.as_str() {
            "csv" | "txt" => Some(SourceFormat::Delimited),
            "xlsx" | "xls" | "xlsm" => Some(SourceFormat::Spreadsheet),
            _ => None,
        }
    }
}

/// Parses the blob into a [`RawTable`] or fails with a format error.
pub fn read_table(
    bytes: &[u8],
    extension: Option<&str>,
    header_row: usize,
) -> Result<RawTable, PipelineError> {
    let format = SourceFormat::from_extension(extension).ok_or_else(|| {
        PipelineError::format(format!(
            "unsupported file extension '{}'",
            extension.unwrap_or("")
        ))
    })?;
    let table = match format {
        SourceFormat::Delimited => read_delimited(bytes, header_row)?,
        SourceFormat::Spreadsheet => read_spreadsheet(bytes, header_row)?,
    };
    if table.is_empty() {
        return Err(PipelineError::format("no data rows below the header"));
    }
    info!(
        "Read {} row(s) across {} column(s)",
        table.len(),
        table.width()
    );
    Ok(table)
}

fn read_delimited(bytes: &[u8], header_row: usize) -> Result<RawTable, PipelineError> {
    for encoding in io_utils::candidate_encodings() {
        let Ok(text) = io_utils::decode_bytes(bytes, encoding) else {
            debug!("Encoding {} rejected", encoding.name());
            continue;
        };
        let text = io_utils::strip_utf8_bom(&text);
        for &delimiter in io_utils::DELIMITERS {
            let Ok(records) = io_utils::read_records(text, delimiter) else {
                continue;
            };
            // The header decides the split; decimal commas in data rows must
            // not make the comma candidate look multi-column.
            if records.get(header_row).is_none_or(|header| header.len() <= 1) {
                continue;
            }
            if let Some(table) = RawTable::from_records(records, header_row) {
                debug!(
                    "Parsed delimited input as {} with delimiter '{}'",
                    encoding.name(),
                    io_utils::printable_delimiter(delimiter)
                );
                return Ok(table);
            }
        }
    }
    Err(PipelineError::format(
        "no encoding/delimiter combination produced more than one column",
    ))
}

fn read_spreadsheet(bytes: &[u8], header_row: usize) -> Result<RawTable, PipelineError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|err| PipelineError::format(format!("unreadable workbook: {err}")))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| PipelineError::format("workbook has no worksheets"))?
        .map_err(|err| PipelineError::format(format!("unreadable worksheet: {err}")))?;

    // The range starts at the first used cell; blank leading rows and
    // columns still count towards the header offset.
    let (first_row, first_column) = range.start().unwrap_or((0, 0));
    let clock_columns = columns_with_clock(&range);
    let mut records = vec![Vec::new(); first_row as usize];
    records.extend(range.rows().map(|row| {
        std::iter::repeat_n(String::new(), first_column as usize)
            .chain(
                row.iter()
                    .enumerate()
                    .map(|(idx, cell)| render_cell(cell, clock_columns.contains(&idx))),
            )
            .collect::<Vec<_>>()
    }));
    let table = RawTable::from_records(records, header_row)
        .ok_or_else(|| PipelineError::format("worksheet has no header row"))?;
    if table.width() <= 1 {
        return Err(PipelineError::format("worksheet has a single column"));
    }
    Ok(table)
}

/// Columns holding at least one date cell with a time of day other than
/// midnight. Date cells elsewhere render without a clock.
fn columns_with_clock(range: &Range<Data>) -> HashSet<usize> {
    range
        .rows()
        .flat_map(|row| row.iter().enumerate())
        .filter(|(_, cell)| matches!(cell, Data::DateTime(_)))
        .filter_map(|(idx, cell)| {
            let dt = cell.as_datetime()?;
            (dt.year() >= 1900 && dt.time() != NaiveTime::MIN).then_some(idx)
        })
        .collect()
}

/// Renders a spreadsheet cell the way the text parsers expect it.
fn render_cell(cell: &Data, with_clock: bool) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{f:.0}"),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::DateTime(_) => match cell.as_datetime() {
            // Time-only cells sit on the spreadsheet epoch day.
            Some(dt) if dt.year() < 1900 => dt.format("%H:%M:%S").to_string(),
            Some(dt) if with_clock => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            Some(dt) => dt.format("%Y-%m-%d").to_string(),
            None => cell.to_string(),
        },
        other => other.to_string(),
    }
}

/// Folds a header for matching: lowercase, accents removed, punctuation
/// collapsed to single spaces.
pub fn fold_header(value: &str) -> String {
    let mut folded = String::with_capacity(value.len());
    let mut pending_space = false;
    for ch in value.chars().flat_map(char::to_lowercase) {
        let mapped = match ch {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            c if c.is_alphanumeric() => c,
            _ => {
                pending_space = !folded.is_empty();
                continue;
            }
        };
        if pending_space {
            folded.push(' ');
            pending_space = false;
        }
        folded.push(mapped);
    }
    folded
}

/// Renames headers onto canonical names and returns where each canonical
/// column lives. Headers already claimed by another canonical column are
/// never renamed twice.
pub fn reconcile_columns(table: &mut RawTable, diagnostics: &mut Diagnostics) -> ColumnMap {
    let mut map = ColumnMap::default();
    for column in CanonicalColumn::ALL {
        if let Some(idx) = table.column_index(column.name()) {
            map.positions.insert(column, idx);
        }
    }
    for column in CanonicalColumn::ALL {
        if map.contains(column) {
            continue;
        }
        let claimed = map.positions.values().copied().collect::<Vec<_>>();
        let found = column.aliases().iter().find_map(|alias| {
            table.headers.iter().enumerate().find_map(|(idx, header)| {
                let folded = fold_header(header);
                (!claimed.contains(&idx) && contains_alias(&folded, alias)).then_some(idx)
            })
        });
        match found {
            Some(idx) => {
                debug!(
                    "Renaming column '{}' to '{}'",
                    table.headers[idx],
                    column.name()
                );
                table.headers[idx] = column.name().to_string();
                map.positions.insert(column, idx);
            }
            None if column.is_expected() => {
                diagnostics.push(Diagnostic::MissingColumn { column });
            }
            None => debug!("Optional column '{}' not present", column.name()),
        }
    }
    info!(
        "Reconciled {} of {} canonical column(s)",
        map.len(),
        CanonicalColumn::ALL.len()
    );
    map
}

/// Short aliases (`km`, `bus`) must match a whole word so that e.g.
/// `kilometraje` or `autobuses` do not claim the wrong column by accident.
fn contains_alias(folded: &str, alias: &str) -> bool {
    if alias.len() <= 3 {
        folded.split(' ').any(|word| word == alias)
    } else {
        folded.contains(alias)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn from_records_skips_title_rows_and_pads() {
        let table = RawTable::from_records(
            records(&[
                &["REPORTE"],
                &["Enero", ""],
                &["Fecha", "Litros", ""],
                &["01/01/2024", "120", "", "nota"],
                &["", "", ""],
            ]),
            2,
        )
        .unwrap();
        assert_eq!(
            table.headers,
            vec!["Fecha", "Litros", "column_3", "column_4"]
        );
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0][3], "nota");
    }

    #[test]
    fn fold_header_strips_accents_and_punctuation() {
        assert_eq!(fold_header("Odómetro (Km)"), "odometro km");
        assert_eq!(fold_header("N° Interno"), "n interno");
        assert_eq!(fold_header("  LITROS  "), "litros");
    }

    #[test]
    fn reconcile_renames_by_substring_and_reports_missing() {
        let mut table = RawTable {
            headers: vec![
                "Fecha Carga".to_string(),
                "N° Interno".to_string(),
                "Litros Cargados".to_string(),
                "Odómetro".to_string(),
            ],
            rows: vec![vec![String::new(); 4]],
        };
        let mut diagnostics = Diagnostics::default();
        let map = reconcile_columns(&mut table, &mut diagnostics);
        assert_eq!(map.get(CanonicalColumn::Date), Some(0));
        assert_eq!(map.get(CanonicalColumn::VehicleId), Some(1));
        assert_eq!(map.get(CanonicalColumn::Liters), Some(2));
        assert_eq!(map.get(CanonicalColumn::Odometer), Some(3));
        assert_eq!(table.headers[2], "liters");
        let missing = diagnostics
            .iter()
            .filter_map(|d| match d {
                Diagnostic::MissingColumn { column } => Some(*column),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(
            missing,
            vec![CanonicalColumn::Time, CanonicalColumn::Terminal]
        );
    }

    #[test]
    fn short_aliases_need_whole_words() {
        assert!(contains_alias("km inicial", "km"));
        assert!(!contains_alias("kilometraje", "km"));
        assert!(contains_alias("kilometraje", "kilometraje"));
    }

    #[test]
    fn unknown_extension_is_a_format_error() {
        let err = read_table(b"a,b\n1,2\n", Some("pdf"), 0).unwrap_err();
        assert!(err.is_format());
    }
}
