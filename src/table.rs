use std::borrow::Cow;
use std::fmt::Write as _;

/// Plain-text table for terminal output. Numeric cells are right-aligned,
/// everything else left-aligned.
#[derive(Debug, Clone, Default)]
pub struct TextTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TextTable {
    pub fn new<S: AsRef<str>>(headers: &[S]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.as_ref().to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn render(&self) -> String {
        let mut widths = self.headers.iter().map(|h| display_width(h)).collect::<Vec<_>>();
        for row in &self.rows {
            for (idx, cell) in row.iter().enumerate().take(widths.len()) {
                widths[idx] = widths[idx].max(display_width(cell));
            }
        }
        let numeric = (0..widths.len())
            .map(|idx| {
                self.rows
                    .iter()
                    .filter_map(|row| row.get(idx))
                    .filter(|cell| !cell.is_empty())
                    .all(|cell| is_numeric(cell))
                    && self.rows.iter().any(|row| row.get(idx).is_some_and(|c| !c.is_empty()))
            })
            .collect::<Vec<_>>();

        let mut output = String::new();
        let _ = writeln!(output, "{}", format_row(&self.headers, &widths, &[]));
        let separator = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
        let _ = writeln!(output, "{}", format_row(&separator, &widths, &[]));
        for row in &self.rows {
            let _ = writeln!(output, "{}", format_row(row, &widths, &numeric));
        }
        output
    }

    pub fn print(&self) {
        print!("{}", self.render());
    }
}

fn is_numeric(value: &str) -> bool {
    value.trim_end_matches('%').parse::<f64>().is_ok()
}

fn format_row(values: &[String], widths: &[usize], right_align: &[bool]) -> String {
    let mut cells = Vec::with_capacity(widths.len());
    for (idx, width) in widths.iter().enumerate() {
        let value = values.get(idx).map(String::as_str).unwrap_or("");
        let sanitized = sanitize_cell(value);
        let padding = " ".repeat(width.saturating_sub(display_width(&sanitized)));
        if right_align.get(idx).copied().unwrap_or(false) {
            cells.push(format!("{padding}{sanitized}"));
        } else {
            cells.push(format!("{sanitized}{padding}"));
        }
    }
    cells.join("  ").trim_end().to_string()
}

fn display_width(value: &str) -> usize {
    value.chars().count()
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}
