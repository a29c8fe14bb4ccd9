//! I/O helpers: byte decoding, CSV reader/writer construction, and the
//! encoding and delimiter candidates tried when sniffing delimited text.
//!
//! `encoding_rs` follows the WHATWG label table, where `latin1` and
//! `iso-8859-1` both resolve to windows-1252. The candidate list keeps the
//! labels operators know and de-duplicates on the resolved encoding.

use std::{
    fs::File,
    io::{BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use encoding_rs::Encoding;

pub const ENCODING_LABELS: &[&str] = &["utf-8", "latin1", "iso-8859-1"];
pub const DELIMITERS: &[u8] = &[b',', b';', b'\t'];

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

/// Resolved encodings in trial order, without duplicates.
pub fn candidate_encodings() -> Vec<&'static Encoding> {
    let mut encodings: Vec<&'static Encoding> = Vec::with_capacity(ENCODING_LABELS.len());
    for label in ENCODING_LABELS {
        if let Some(encoding) = Encoding::for_label(label.as_bytes())
            && !encodings.contains(&encoding)
        {
            encodings.push(encoding);
        }
    }
    encodings
}

/// Decodes the whole blob, failing on malformed input instead of
/// substituting replacement characters.
pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(false)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

/// Reads every record of already-decoded text, keeping ragged rows.
pub fn read_records(text: &str, delimiter: u8) -> Result<Vec<Vec<String>>> {
    let mut reader = open_csv_reader(text.as_bytes(), delimiter);
    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Reading row {}", idx + 1))?;
        rows.push(record.iter().map(|field| field.to_string()).collect());
    }
    Ok(rows)
}

pub fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(p) if !is_dash(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
        )),
        _ => Box::new(std::io::stdout()),
    })
}

pub fn open_csv_writer(path: Option<&Path>) -> Result<csv::Writer<Box<dyn Write>>> {
    let mut builder = csv::WriterBuilder::new();
    builder.delimiter(b',').double_quote(true);
    Ok(builder.from_writer(open_output(path)?))
}

pub fn strip_utf8_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}

pub fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        other => (other as char).to_string(),
    }
}
