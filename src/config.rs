//! Tunable thresholds for the enrichment pipeline.
//!
//! Defaults reproduce the fixed constants fleet analysts have been working
//! with; a YAML file can override any subset of them.

use std::{collections::BTreeMap, fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

/// A manufacturer bucket of the model taxonomy. The first group whose
/// keyword occurs in a model string wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelGroup {
    pub canonical: String,
    pub keywords: Vec<String>,
}

impl ModelGroup {
    fn new(canonical: &str, keywords: &[&str]) -> Self {
        Self {
            canonical: canonical.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

pub fn default_model_groups() -> Vec<ModelGroup> {
    vec![
        ModelGroup::new("MERCEDES BENZ", &["MERCEDES", "BENZ", "MB"]),
        ModelGroup::new("VOLVO", &["VOLVO"]),
        ModelGroup::new("SCANIA", &["SCANIA"]),
        ModelGroup::new("KING LONG", &["KING LONG", "KINGLONG"]),
        ModelGroup::new("YUTONG", &["YUTONG"]),
        ModelGroup::new("BYD", &["BYD"]),
        ModelGroup::new("FOTON", &["FOTON"]),
        ModelGroup::new("HIGER", &["HIGER"]),
        ModelGroup::new("ZHONGTONG", &["ZHONGTONG"]),
        ModelGroup::new("AGRALE", &["AGRALE"]),
        ModelGroup::new("IVECO", &["IVECO"]),
        ModelGroup::new("VOLKSWAGEN", &["VOLKSWAGEN", "VW"]),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Zero-based row holding the real header; rows above it are titles.
    pub header_row: usize,
    /// Share of failed direct parses that triggers locale-aware cleanup.
    pub numeric_failure_ratio: f64,
    /// Below this converted share a numeric column is reported as degraded.
    pub numeric_usable_ratio: f64,
    /// A date/time format is accepted once it parses more than this share.
    pub temporal_accept_ratio: f64,
    pub bad_load_iqr_multiplier: f64,
    pub overconsumption_sigma: f64,
    pub min_group_size: usize,
    pub outlier_min_samples: usize,
    pub outlier_contamination: f64,
    pub outlier_trees: usize,
    pub outlier_sample_size: usize,
    pub outlier_seed: u64,
    pub distance_min_km: f64,
    pub distance_max_km: f64,
    pub efficiency_floor: f64,
    pub efficiency_ceiling: f64,
    pub efficiency_low_percentile: f64,
    pub efficiency_high_percentile: f64,
    pub efficiency_band_multiplier: f64,
    pub peak_hours: Vec<u32>,
    pub tank_capacity_percentile: f64,
    /// Known tank sizes in liters, keyed by canonical model.
    pub tank_capacities: BTreeMap<String, f64>,
    pub model_groups: Vec<ModelGroup>,
    pub cache_ttl_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            header_row: 2,
            numeric_failure_ratio: 0.30,
            numeric_usable_ratio: 0.50,
            temporal_accept_ratio: 0.50,
            bad_load_iqr_multiplier: 3.0,
            overconsumption_sigma: 2.0,
            min_group_size: 5,
            outlier_min_samples: 10,
            outlier_contamination: 0.05,
            outlier_trees: 100,
            outlier_sample_size: 256,
            outlier_seed: 42,
            distance_min_km: 5.0,
            distance_max_km: 1200.0,
            efficiency_floor: 0.5,
            efficiency_ceiling: 20.0,
            efficiency_low_percentile: 10.0,
            efficiency_high_percentile: 90.0,
            efficiency_band_multiplier: 1.5,
            peak_hours: vec![6, 7, 8, 17, 18, 19],
            tank_capacity_percentile: 95.0,
            tank_capacities: BTreeMap::new(),
            model_groups: default_model_groups(),
            cache_ttl_secs: 900,
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config {path:?}"))?;
        let config: PipelineConfig = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing config {path:?}"))?;
        config
            .validate()
            .with_context(|| format!("Validating config {path:?}"))?;
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(text).context("Parsing config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Serializing config")
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.numeric_failure_ratio > 0.0 && self.numeric_failure_ratio < 1.0,
            "numeric_failure_ratio must be in (0, 1)"
        );
        ensure!(
            (0.0..1.0).contains(&self.temporal_accept_ratio),
            "temporal_accept_ratio must be in [0, 1)"
        );
        ensure!(
            self.bad_load_iqr_multiplier > 0.0,
            "bad_load_iqr_multiplier must be positive"
        );
        ensure!(
            self.overconsumption_sigma > 0.0,
            "overconsumption_sigma must be positive"
        );
        ensure!(self.min_group_size >= 2, "min_group_size must be at least 2");
        ensure!(
            self.outlier_contamination > 0.0 && self.outlier_contamination <= 0.5,
            "outlier_contamination must be in (0, 0.5]"
        );
        ensure!(self.outlier_trees > 0, "outlier_trees must be positive");
        ensure!(
            self.outlier_sample_size >= 2,
            "outlier_sample_size must be at least 2"
        );
        ensure!(
            self.distance_min_km >= 0.0 && self.distance_min_km < self.distance_max_km,
            "distance_min_km ({}) must be below distance_max_km ({})",
            self.distance_min_km,
            self.distance_max_km
        );
        ensure!(
            self.efficiency_floor > 0.0 && self.efficiency_floor < self.efficiency_ceiling,
            "efficiency_floor ({}) must be below efficiency_ceiling ({})",
            self.efficiency_floor,
            self.efficiency_ceiling
        );
        ensure!(
            self.efficiency_low_percentile < self.efficiency_high_percentile
                && self.efficiency_low_percentile >= 0.0
                && self.efficiency_high_percentile <= 100.0,
            "efficiency percentiles must satisfy 0 <= low < high <= 100"
        );
        ensure!(
            self.peak_hours.iter().all(|h| *h < 24),
            "peak_hours must be between 0 and 23"
        );
        ensure!(
            self.tank_capacity_percentile > 0.0 && self.tank_capacity_percentile <= 100.0,
            "tank_capacity_percentile must be in (0, 100]"
        );
        ensure!(
            self.tank_capacities.values().all(|c| *c > 0.0),
            "tank_capacities must be positive"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        PipelineConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_yaml_keeps_remaining_defaults() {
        let config = PipelineConfig::from_yaml("overconsumption_sigma: 3.0\nheader_row: 0\n").unwrap();
        assert_eq!(config.overconsumption_sigma, 3.0);
        assert_eq!(config.header_row, 0);
        assert_eq!(config.distance_max_km, 1200.0);
        assert_eq!(config.model_groups, default_model_groups());
    }

    #[test]
    fn inverted_distance_band_is_rejected() {
        let err = PipelineConfig::from_yaml("distance_min_km: 2000\n").unwrap_err();
        assert!(err.to_string().contains("distance_min_km"));
    }

    #[test]
    fn yaml_round_trip_preserves_taxonomy() {
        let config = PipelineConfig::default();
        let text = config.to_yaml().unwrap();
        let parsed = PipelineConfig::from_yaml(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
