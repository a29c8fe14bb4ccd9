//! Per-model overconsumption thresholds and the extreme-outlier pass.
//!
//! Thresholds are computed per canonical model because tank sizes differ
//! structurally between models; models with too few trusted loads borrow
//! the fleet-wide statistics. Bad loads never contribute to a threshold and
//! are never flagged as overconsumption.

use std::collections::BTreeMap;

use log::{debug, info};
use serde::Serialize;

use crate::{
    config::PipelineConfig,
    error::{Diagnostic, Diagnostics},
    outlier::IsolationForest,
    record::FuelLoad,
    stats::ValueStats,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GroupThreshold {
    pub mean: f64,
    pub std_dev: Option<f64>,
    pub threshold: Option<f64>,
    pub trusted_loads: usize,
    /// True when the group borrowed fleet-wide statistics. Its records then
    /// also get their z-score against the fleet mean and deviation.
    pub global_fallback: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OverconsumptionReport {
    pub flagged: usize,
    pub extreme_outliers: usize,
    pub groups: BTreeMap<String, GroupThreshold>,
    pub outlier_groups_fitted: usize,
}

fn threshold_from(stats: &ValueStats, sigma: f64, global_fallback: bool) -> Option<GroupThreshold> {
    let mean = stats.mean()?;
    let std_dev = stats.std_dev();
    Some(GroupThreshold {
        mean,
        std_dev,
        threshold: std_dev.map(|sd| mean + sigma * sd),
        trusted_loads: stats.count(),
        global_fallback,
    })
}

/// Computes each model's threshold and flags records above it.
pub fn detect(records: &mut [FuelLoad], config: &PipelineConfig) -> OverconsumptionReport {
    let mut by_model: BTreeMap<String, ValueStats> = BTreeMap::new();
    let mut fleet = ValueStats::new();
    for record in records.iter() {
        let stats = by_model.entry(record.model.clone()).or_default();
        if let Some(liters) = record.trusted_liters() {
            stats.add(liters);
            fleet.add(liters);
        }
    }
    let global = threshold_from(&fleet, config.overconsumption_sigma, true);

    let groups = by_model
        .iter()
        .filter_map(|(model, stats)| {
            let threshold = if stats.count() >= config.min_group_size {
                threshold_from(stats, config.overconsumption_sigma, false)
            } else {
                global
            };
            threshold.map(|t| (model.clone(), t))
        })
        .collect::<BTreeMap<_, _>>();

    let mut flagged = 0usize;
    for record in records.iter_mut() {
        let (Some(liters), Some(group)) = (record.liters, groups.get(&record.model)) else {
            continue;
        };
        record.z_score_vs_model = group
            .std_dev
            .filter(|sd| *sd > 0.0)
            .map(|sd| (liters - group.mean) / sd);
        record.overconsumption_threshold = group.threshold;
        if !record.is_bad_load && group.threshold.is_some_and(|t| liters > t) {
            record.is_overconsumption = true;
            flagged += 1;
        }
    }
    info!(
        "Flagged {flagged} overconsumption load(s) across {} model group(s)",
        groups.len()
    );
    OverconsumptionReport {
        flagged,
        groups,
        ..OverconsumptionReport::default()
    }
}

/// Runs the isolation forest per model group with enough liters values.
/// A group the model cannot be fitted on is reported and skipped.
pub fn mark_extreme_outliers(
    records: &mut [FuelLoad],
    config: &PipelineConfig,
    report: &mut OverconsumptionReport,
    diagnostics: &mut Diagnostics,
) {
    let forest = IsolationForest {
        contamination: config.outlier_contamination,
        trees: config.outlier_trees,
        sample_size: config.outlier_sample_size,
        seed: config.outlier_seed,
        min_samples: config.outlier_min_samples,
    };
    let mut members: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (idx, record) in records.iter().enumerate() {
        if record.liters.is_some() {
            members.entry(record.model.clone()).or_default().push(idx);
        }
    }

    for (model, indices) in members {
        if indices.len() < config.outlier_min_samples {
            debug!(
                "Group '{model}' has {} liters value(s); outlier pass skipped",
                indices.len()
            );
            continue;
        }
        let values = indices
            .iter()
            .filter_map(|idx| records[*idx].liters)
            .collect::<Vec<_>>();
        match forest.fit_predict(&values) {
            Ok(flags) => {
                report.outlier_groups_fitted += 1;
                for (idx, is_outlier) in indices.iter().zip(flags) {
                    if is_outlier {
                        records[*idx].is_extreme_outlier = true;
                        report.extreme_outliers += 1;
                    }
                }
            }
            Err(err) => diagnostics.push(Diagnostic::GroupModelFitFailure {
                group: model,
                reason: err.to_string(),
            }),
        }
    }
    info!(
        "Marked {} extreme outlier(s) in {} fitted group(s)",
        report.extreme_outliers, report.outlier_groups_fitted
    );
}
