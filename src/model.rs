//! Vehicle model canonicalization and tank-fill estimation.

use std::collections::BTreeMap;

use log::info;

use crate::{
    config::{ModelGroup, PipelineConfig},
    error::{Diagnostics, Stage},
    record::FuelLoad,
    stats::ValueStats,
};

pub const NO_MODEL: &str = "NO MODEL";

/// Uppercases, trims and collapses internal whitespace.
pub fn normalize_text(value: &str) -> Option<String> {
    let collapsed = value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase();
    (!collapsed.is_empty()).then_some(collapsed)
}

fn keyword_matches(collapsed: &str, tokens: &[&str], keyword: &str) -> bool {
    let keyword = keyword.to_uppercase();
    if keyword.contains(' ') {
        collapsed.replace('-', " ").contains(&keyword)
    } else if keyword.len() <= 3 {
        tokens.iter().any(|token| *token == keyword)
    } else {
        collapsed.contains(&keyword)
    }
}

/// Maps a free-text model onto the taxonomy. The first group with a
/// matching keyword wins; unmatched text passes through normalized.
pub fn canonical_model(raw: Option<&str>, groups: &[ModelGroup]) -> String {
    let Some(collapsed) = raw.and_then(normalize_text) else {
        return NO_MODEL.to_string();
    };
    let tokens = collapsed
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>();
    groups
        .iter()
        .find(|group| {
            group
                .keywords
                .iter()
                .any(|keyword| keyword_matches(&collapsed, &tokens, keyword))
        })
        .map(|group| group.canonical.clone())
        .unwrap_or(collapsed)
}

/// Estimates tank capacity per model and sets `fill_percentage`.
///
/// Configured capacities win. Otherwise the capacity is a high percentile of
/// the model's trusted loads, or of the whole fleet when the model has too
/// few loads to say.
pub fn assign_fill_percentage(
    records: &mut [FuelLoad],
    config: &PipelineConfig,
    diagnostics: &mut Diagnostics,
) {
    let mut by_model: BTreeMap<&str, ValueStats> = BTreeMap::new();
    let mut fleet = ValueStats::new();
    for record in records.iter() {
        if let Some(liters) = record.trusted_liters() {
            by_model.entry(record.model.as_str()).or_default().add(liters);
            fleet.add(liters);
        }
    }
    let Some(fleet_capacity) = fleet
        .percentile(config.tank_capacity_percentile)
        .filter(|c| *c > 0.0)
    else {
        diagnostics.skip(Stage::FillPercentage, "no trusted liters to size tanks");
        return;
    };
    let capacities = by_model
        .iter()
        .map(|(model, stats)| {
            let estimated = if stats.count() >= config.min_group_size {
                stats
                    .percentile(config.tank_capacity_percentile)
                    .filter(|c| *c > 0.0)
                    .unwrap_or(fleet_capacity)
            } else {
                fleet_capacity
            };
            let capacity = config
                .tank_capacities
                .get(*model)
                .copied()
                .unwrap_or(estimated);
            (model.to_string(), capacity)
        })
        .collect::<BTreeMap<_, _>>();

    let mut assigned = 0usize;
    for record in records.iter_mut() {
        let Some(liters) = record.liters else {
            continue;
        };
        let capacity = capacities
            .get(&record.model)
            .copied()
            .or_else(|| config.tank_capacities.get(&record.model).copied())
            .unwrap_or(fleet_capacity);
        record.fill_percentage = Some(liters / capacity * 100.0);
        assigned += 1;
    }
    info!(
        "Estimated fill percentage for {assigned} load(s) across {} model(s)",
        capacities.len()
    );
}
