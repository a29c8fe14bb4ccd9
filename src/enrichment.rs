//! Group rollups joined back onto each record for reporting.
//!
//! Nothing here filters or flags; records without the grouping key simply
//! get no rollup values.

use std::collections::BTreeMap;

use log::info;
use serde::Serialize;

use crate::record::FuelLoad;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TerminalRollup {
    pub terminal: String,
    pub loads: usize,
    pub total_liters: f64,
    pub avg_liters: Option<f64>,
    /// 1 is the terminal dispensing the most liters.
    pub volume_rank: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverRollup {
    pub driver: String,
    pub loads: usize,
    pub overconsumption_loads: usize,
    /// Percentage of the driver's loads flagged as overconsumption.
    pub overconsumption_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClerkRollup {
    pub clerk: String,
    pub loads: usize,
    pub bad_loads: usize,
    /// Percentage of the clerk's loads flagged as bad loads.
    pub bad_load_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Rollups {
    pub terminals: Vec<TerminalRollup>,
    pub drivers: Vec<DriverRollup>,
    pub clerks: Vec<ClerkRollup>,
}

#[derive(Default)]
struct Tally {
    loads: usize,
    hits: usize,
    liters: f64,
    liters_count: usize,
}

fn tally_by<K, H>(records: &[FuelLoad], key: K, hit: H) -> BTreeMap<String, Tally>
where
    K: Fn(&FuelLoad) -> Option<&String>,
    H: Fn(&FuelLoad) -> bool,
{
    let mut tallies: BTreeMap<String, Tally> = BTreeMap::new();
    for record in records {
        let Some(name) = key(record) else {
            continue;
        };
        let tally = tallies.entry(name.clone()).or_default();
        tally.loads += 1;
        if hit(record) {
            tally.hits += 1;
        }
        if let Some(liters) = record.liters {
            tally.liters += liters;
            tally.liters_count += 1;
        }
    }
    tallies
}

fn rate(hits: usize, loads: usize) -> f64 {
    if loads == 0 {
        0.0
    } else {
        hits as f64 / loads as f64 * 100.0
    }
}

/// Builds the rollup tables and copies each group's values onto its records.
pub fn attach_rollups(records: &mut [FuelLoad]) -> Rollups {
    let mut terminals = tally_by(records, |r| r.terminal.as_ref(), |_| false)
        .into_iter()
        .map(|(terminal, tally)| TerminalRollup {
            terminal,
            loads: tally.loads,
            total_liters: tally.liters,
            avg_liters: (tally.liters_count > 0).then(|| tally.liters / tally.liters_count as f64),
            volume_rank: 0,
        })
        .collect::<Vec<_>>();
    terminals.sort_by(|a, b| {
        b.total_liters
            .total_cmp(&a.total_liters)
            .then_with(|| a.terminal.cmp(&b.terminal))
    });
    for (idx, terminal) in terminals.iter_mut().enumerate() {
        terminal.volume_rank = idx + 1;
    }

    let drivers = tally_by(records, |r| r.driver.as_ref(), |r| r.is_overconsumption)
        .into_iter()
        .map(|(driver, tally)| DriverRollup {
            driver,
            loads: tally.loads,
            overconsumption_loads: tally.hits,
            overconsumption_rate: rate(tally.hits, tally.loads),
        })
        .collect::<Vec<_>>();

    let clerks = tally_by(records, |r| r.clerk.as_ref(), |r| r.is_bad_load)
        .into_iter()
        .map(|(clerk, tally)| ClerkRollup {
            clerk,
            loads: tally.loads,
            bad_loads: tally.hits,
            bad_load_rate: rate(tally.hits, tally.loads),
        })
        .collect::<Vec<_>>();

    let terminal_index = terminals
        .iter()
        .map(|t| (t.terminal.as_str(), t))
        .collect::<BTreeMap<_, _>>();
    let driver_index = drivers
        .iter()
        .map(|d| (d.driver.as_str(), d.overconsumption_rate))
        .collect::<BTreeMap<_, _>>();
    let clerk_index = clerks
        .iter()
        .map(|c| (c.clerk.as_str(), c.bad_load_rate))
        .collect::<BTreeMap<_, _>>();

    for record in records.iter_mut() {
        if let Some(terminal) = record
            .terminal
            .as_deref()
            .and_then(|t| terminal_index.get(t))
        {
            record.terminal_load_count = Some(terminal.loads);
            record.terminal_total_liters = Some(terminal.total_liters);
            record.terminal_avg_liters = terminal.avg_liters;
            record.terminal_volume_rank = Some(terminal.volume_rank);
        }
        record.driver_overconsumption_rate = record
            .driver
            .as_deref()
            .and_then(|d| driver_index.get(d).copied());
        record.clerk_bad_load_rate = record
            .clerk
            .as_deref()
            .and_then(|c| clerk_index.get(c).copied());
    }

    info!(
        "Rolled up {} terminal(s), {} driver(s), {} clerk(s)",
        terminals.len(),
        drivers.len(),
        clerks.len()
    );
    Rollups {
        terminals,
        drivers,
        clerks,
    }
}
