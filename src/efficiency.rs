//! Fuel economy from consecutive odometer readings of the same vehicle.
//!
//! Rejected readings and ratios are nulled on the record, never dropped:
//! the load itself stays in the table, only the derived metric goes away.

use std::collections::BTreeMap;

use itertools::Itertools;
use log::info;
use serde::Serialize;

use crate::{config::PipelineConfig, record::FuelLoad, stats::ValueStats};

/// Efficiency relative to the model baseline, worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum EfficiencyCategory {
    Low,
    Regular,
    Normal,
    Good,
    Excellent,
}

impl EfficiencyCategory {
    /// Buckets a deviation percentage. Low and Excellent exclude the ±15%
    /// edges; the inner buckets include their upper edge.
    pub fn from_deviation(deviation_pct: f64) -> Self {
        if deviation_pct < -15.0 {
            EfficiencyCategory::Low
        } else if deviation_pct <= -5.0 {
            EfficiencyCategory::Regular
        } else if deviation_pct <= 5.0 {
            EfficiencyCategory::Normal
        } else if deviation_pct <= 15.0 {
            EfficiencyCategory::Good
        } else {
            EfficiencyCategory::Excellent
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EfficiencyCategory::Low => "Low",
            EfficiencyCategory::Regular => "Regular",
            EfficiencyCategory::Normal => "Normal",
            EfficiencyCategory::Good => "Good",
            EfficiencyCategory::Excellent => "Excellent",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EfficiencyReport {
    pub distances: usize,
    pub implausible_distances: usize,
    pub efficiency_values: usize,
    pub rejected_ratios: usize,
    pub band: Option<(f64, f64)>,
    pub baselines: BTreeMap<String, f64>,
}

/// Derives distances, km/L, the model baselines and categories in place.
pub fn compute(records: &mut [FuelLoad], config: &PipelineConfig) -> EfficiencyReport {
    let mut report = EfficiencyReport::default();
    assign_distances(records, config, &mut report);

    let mut ratios = ValueStats::new();
    for record in records.iter_mut() {
        record.efficiency_km_per_liter = match (record.plausible_distance, record.liters) {
            (Some(distance), Some(liters)) if liters > 0.0 => Some(distance / liters),
            _ => None,
        };
        if let Some(ratio) = record.efficiency_km_per_liter {
            ratios.add(ratio);
        }
    }

    let (lower, upper) = ratio_band(&ratios, config);
    report.band = Some((lower, upper));
    for record in records.iter_mut() {
        if record
            .efficiency_km_per_liter
            .is_some_and(|ratio| ratio < lower || ratio > upper)
        {
            record.efficiency_km_per_liter = None;
            report.rejected_ratios += 1;
        }
    }

    let baselines = records
        .iter()
        .filter_map(|r| r.efficiency_km_per_liter.map(|e| (r.model.clone(), e)))
        .into_group_map()
        .into_iter()
        .filter_map(|(model, values)| {
            ValueStats::from_values(values).mean().map(|mean| (model, mean))
        })
        .collect::<BTreeMap<_, _>>();

    for record in records.iter_mut() {
        let Some(efficiency) = record.efficiency_km_per_liter else {
            continue;
        };
        report.efficiency_values += 1;
        let Some(baseline) = baselines.get(&record.model).copied().filter(|b| *b > 0.0) else {
            continue;
        };
        let deviation = (efficiency - baseline) / baseline * 100.0;
        record.model_efficiency_baseline = Some(baseline);
        record.efficiency_deviation_pct = Some(deviation);
        record.efficiency_category = Some(EfficiencyCategory::from_deviation(deviation));
    }
    report.baselines = baselines;

    info!(
        "Kept {} efficiency value(s); {} implausible distance(s), {} ratio(s) outside [{lower:.2}, {upper:.2}] km/L",
        report.efficiency_values, report.implausible_distances, report.rejected_ratios
    );
    report
}

/// Walks each vehicle's loads in timestamp order and sets the raw odometer
/// delta plus its plausibility-filtered copy.
fn assign_distances(records: &mut [FuelLoad], config: &PipelineConfig, report: &mut EfficiencyReport) {
    let order = records
        .iter()
        .enumerate()
        .filter_map(|(idx, r)| Some((r.vehicle_id.clone()?, r.timestamp?, r.source_row, idx)))
        .sorted()
        .collect::<Vec<_>>();

    let mut previous: Option<(&str, Option<f64>)> = None;
    for (vehicle, _, _, idx) in &order {
        let prior_odometer = match previous {
            Some((prev_vehicle, odometer)) if prev_vehicle == vehicle.as_str() => odometer,
            _ => None,
        };
        let record = &mut records[*idx];
        let distance = match (record.odometer, prior_odometer) {
            (Some(current), Some(prior)) => Some(current - prior),
            _ => None,
        };
        record.distance_since_last_load = distance;
        record.plausible_distance =
            distance.filter(|d| *d > config.distance_min_km && *d <= config.distance_max_km);
        if distance.is_some() {
            report.distances += 1;
            if record.plausible_distance.is_none() {
                report.implausible_distances += 1;
            }
        }
        previous = Some((vehicle.as_str(), record.odometer));
    }
}

/// Percentile band widened by the configured multiplier of its spread and
/// clamped to the absolute floor and ceiling.
fn ratio_band(ratios: &ValueStats, config: &PipelineConfig) -> (f64, f64) {
    let (Some(low), Some(high)) = (
        ratios.percentile(config.efficiency_low_percentile),
        ratios.percentile(config.efficiency_high_percentile),
    ) else {
        return (config.efficiency_floor, config.efficiency_ceiling);
    };
    if ratios.count() < 2 {
        return (config.efficiency_floor, config.efficiency_ceiling);
    }
    let spread = high - low;
    let lower = (low - config.efficiency_band_multiplier * spread).max(config.efficiency_floor);
    let upper = (high + config.efficiency_band_multiplier * spread).min(config.efficiency_ceiling);
    (lower, upper)
}
