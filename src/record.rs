//! The canonical fuel-load record and the enriched table handed to
//! reporting code.
//!
//! Every derived value that may be unavailable is an `Option`: a missing
//! input column, an unparseable cell, or a value rejected by a plausibility
//! filter all surface as `None`, never as a zero.

use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::{
    bad_load::BadLoadSignal,
    efficiency::EfficiencyCategory,
    enrichment::Rollups,
    error::{Diagnostic, Stage},
    numeric::ConversionReport,
    temporal::{CalendarFields, TimeOfDay},
};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FuelLoad {
    /// Zero-based position among the data rows of the source file.
    pub source_row: usize,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub timestamp: Option<NaiveDateTime>,
    pub vehicle_id: Option<String>,
    pub terminal: Option<String>,
    pub liters: Option<f64>,
    pub odometer: Option<f64>,
    pub plate: Option<String>,
    pub model: String,
    pub raw_model: Option<String>,
    pub driver: Option<String>,
    pub clerk: Option<String>,
    pub supervisor: Option<String>,
    pub load_type: Option<String>,

    pub calendar: Option<CalendarFields>,
    pub time_of_day: Option<TimeOfDay>,

    pub is_bad_load: bool,
    pub bad_load_signal: Option<BadLoadSignal>,
    pub is_overconsumption: bool,
    pub is_extreme_outlier: bool,
    pub z_score_vs_model: Option<f64>,
    pub overconsumption_threshold: Option<f64>,
    pub fill_percentage: Option<f64>,

    pub distance_since_last_load: Option<f64>,
    pub plausible_distance: Option<f64>,
    pub efficiency_km_per_liter: Option<f64>,
    pub model_efficiency_baseline: Option<f64>,
    pub efficiency_deviation_pct: Option<f64>,
    pub efficiency_category: Option<EfficiencyCategory>,

    pub terminal_load_count: Option<usize>,
    pub terminal_total_liters: Option<f64>,
    pub terminal_avg_liters: Option<f64>,
    pub terminal_volume_rank: Option<usize>,
    pub driver_overconsumption_rate: Option<f64>,
    pub clerk_bad_load_rate: Option<f64>,
}

impl FuelLoad {
    pub fn is_weekend(&self) -> Option<bool> {
        self.calendar.as_ref().map(|c| c.is_weekend)
    }

    pub fn is_peak_hour(&self) -> Option<bool> {
        self.time_of_day.map(|t| t.is_peak_hour)
    }

    /// Liters usable for statistics: present and not a data-entry error.
    pub fn trusted_liters(&self) -> Option<f64> {
        if self.is_bad_load { None } else { self.liters }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub rows: usize,
    pub conversions: Vec<ConversionReport>,
    pub bad_loads: usize,
    pub bad_load_pct: f64,
    pub overconsumption: usize,
    pub extreme_outliers: usize,
    pub efficiency_values: usize,
    #[serde(with = "millis")]
    pub elapsed: Duration,
}

mod millis {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(value.as_millis() as u64)
    }
}

impl Summary {
    pub fn conversion(&self, column: &str) -> Option<&ConversionReport> {
        self.conversions.iter().find(|c| c.column == column)
    }
}

/// Result of one pipeline run. Built once, then only read.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedTable {
    pub records: Vec<FuelLoad>,
    pub summary: Summary,
    pub rollups: Rollups,
    pub diagnostics: Vec<Diagnostic>,
}

impl EnrichedTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether a derivation ran; skipped stages leave their fields null.
    pub fn ran(&self, stage: Stage) -> bool {
        !self
            .diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::StageSkipped { stage: s, .. } if *s == stage))
    }
}
