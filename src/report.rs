//! Text rendering of the summary counters, diagnostics and rollups.

use std::fmt::Write as _;

use itertools::Itertools;

use crate::{
    record::EnrichedTable,
    stats::{format_number, format_optional},
    table::TextTable,
};

fn section(output: &mut String, title: &str, table: &TextTable) {
    let _ = writeln!(output, "{title}");
    if table.is_empty() {
        let _ = writeln!(output, "(none)");
    } else {
        output.push_str(&table.render());
    }
    output.push('\n');
}

fn pct(value: f64) -> String {
    format!("{value:.2}%")
}

pub fn render_summary(table: &EnrichedTable, top: usize) -> String {
    let summary = &table.summary;
    let mut output = String::new();

    let mut counters = TextTable::new(&["metric", "value"]);
    for (metric, value) in [
        ("rows", summary.rows.to_string()),
        ("bad loads", summary.bad_loads.to_string()),
        ("bad load share", pct(summary.bad_load_pct)),
        ("overconsumption", summary.overconsumption.to_string()),
        ("extreme outliers", summary.extreme_outliers.to_string()),
        ("efficiency values", summary.efficiency_values.to_string()),
        ("elapsed ms", summary.elapsed.as_millis().to_string()),
    ] {
        counters.push_row(vec![metric.to_string(), value]);
    }
    section(&mut output, "Summary", &counters);

    let mut conversions = TextTable::new(&["column", "non_empty", "converted", "converted_pct", "cleanup"]);
    for report in &summary.conversions {
        conversions.push_row(vec![
            report.column.clone(),
            report.non_empty.to_string(),
            report.converted.to_string(),
            pct(report.converted_pct()),
            if report.locale_cleanup { "yes" } else { "no" }.to_string(),
        ]);
    }
    section(&mut output, "Conversions", &conversions);

    let mut diagnostics = TextTable::new(&["diagnostic"]);
    for diagnostic in &table.diagnostics {
        diagnostics.push_row(vec![diagnostic.to_string()]);
    }
    section(&mut output, "Diagnostics", &diagnostics);

    let mut terminals = TextTable::new(&["rank", "terminal", "loads", "total_liters", "avg_liters"]);
    for terminal in table.rollups.terminals.iter().take(top) {
        terminals.push_row(vec![
            terminal.volume_rank.to_string(),
            terminal.terminal.clone(),
            terminal.loads.to_string(),
            format_number(terminal.total_liters),
            format_optional(terminal.avg_liters),
        ]);
    }
    section(&mut output, "Terminals by volume", &terminals);

    let mut drivers = TextTable::new(&["driver", "loads", "overconsumption", "rate"]);
    for driver in table
        .rollups
        .drivers
        .iter()
        .sorted_by(|a, b| {
            b.overconsumption_rate
                .total_cmp(&a.overconsumption_rate)
                .then_with(|| b.loads.cmp(&a.loads))
                .then_with(|| a.driver.cmp(&b.driver))
        })
        .take(top)
    {
        drivers.push_row(vec![
            driver.driver.clone(),
            driver.loads.to_string(),
            driver.overconsumption_loads.to_string(),
            pct(driver.overconsumption_rate),
        ]);
    }
    section(&mut output, "Drivers by overconsumption rate", &drivers);

    let mut clerks = TextTable::new(&["clerk", "loads", "bad_loads", "rate"]);
    for clerk in table
        .rollups
        .clerks
        .iter()
        .sorted_by(|a, b| {
            b.bad_load_rate
                .total_cmp(&a.bad_load_rate)
                .then_with(|| b.loads.cmp(&a.loads))
                .then_with(|| a.clerk.cmp(&b.clerk))
        })
        .take(top)
    {
        clerks.push_row(vec![
            clerk.clerk.clone(),
            clerk.loads.to_string(),
            clerk.bad_loads.to_string(),
            pct(clerk.bad_load_rate),
        ]);
    }
    section(&mut output, "Clerks by bad-load rate", &clerks);

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        enrichment::{Rollups, TerminalRollup},
        error::{Diagnostic, Stage},
        record::Summary,
    };

    #[test]
    fn summary_lists_sections_and_top_terminals() {
        let table = EnrichedTable {
            records: Vec::new(),
            summary: Summary {
                rows: 3,
                bad_loads: 1,
                bad_load_pct: 100.0 / 3.0,
                ..Summary::default()
            },
            rollups: Rollups {
                terminals: vec![
                    TerminalRollup {
                        terminal: "SUR".to_string(),
                        loads: 2,
                        total_liters: 300.0,
                        avg_liters: Some(150.0),
                        volume_rank: 1,
                    },
                    TerminalRollup {
                        terminal: "NORTE".to_string(),
                        loads: 1,
                        total_liters: 100.0,
                        avg_liters: Some(100.0),
                        volume_rank: 2,
                    },
                ],
                ..Rollups::default()
            },
            diagnostics: vec![Diagnostic::StageSkipped {
                stage: Stage::Efficiency,
                reason: "no odometer column".to_string(),
            }],
        };
        let rendered = render_summary(&table, 1);
        assert!(rendered.contains("33.33%"));
        assert!(rendered.contains("Skipped efficiency: no odometer column"));
        assert!(rendered.contains("SUR"));
        assert!(!rendered.contains("NORTE"));
        assert!(rendered.contains("Clerks by bad-load rate\n(none)"));
    }
}
