//! Error and diagnostic types for the enrichment pipeline.
//!
//! Only [`PipelineError`] aborts a run. Everything else the pipeline can run
//! into on messy field data is recorded as a [`Diagnostic`] on the result and
//! the affected derivation degrades to nulls.

use std::{fmt, path::PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::schema::CanonicalColumn;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The blob could not be turned into a non-empty table.
    #[error("Unreadable fuel-load file: {0}")]
    Format(String),
    #[error("Reading {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid pipeline configuration: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn format(message: impl Into<String>) -> Self {
        PipelineError::Format(message.into())
    }

    pub fn is_format(&self) -> bool {
        matches!(self, PipelineError::Format(_))
    }
}

/// Derivations that can be skipped when their inputs are missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Calendar,
    TimeOfDay,
    StatisticalBadLoad,
    Overconsumption,
    OutlierPass,
    FillPercentage,
    Efficiency,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Calendar => "calendar fields",
            Stage::TimeOfDay => "time-of-day fields",
            Stage::StatisticalBadLoad => "statistical bad-load check",
            Stage::Overconsumption => "overconsumption detection",
            Stage::OutlierPass => "extreme outlier pass",
            Stage::FillPercentage => "fill percentage",
            Stage::Efficiency => "efficiency",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    #[error("Expected column '{column}' not found in input")]
    MissingColumn { column: CanonicalColumn },
    #[error("Column '{column}' converted only {converted_pct:.1}% of non-empty values")]
    ConversionDegradation { column: String, converted_pct: f64 },
    #[error("Outlier model could not be fitted for group '{group}': {reason}")]
    GroupModelFitFailure { group: String, reason: String },
    #[error("Skipped {stage}: {reason}")]
    StageSkipped { stage: Stage, reason: String },
}

/// Collects diagnostics in the order they are raised.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn push(&mut self, diagnostic: Diagnostic) {
        log::warn!("{diagnostic}");
        self.entries.push(diagnostic);
    }

    pub fn skip(&mut self, stage: Stage, reason: impl Into<String>) {
        self.push(Diagnostic::StageSkipped {
            stage,
            reason: reason.into(),
        });
    }

    pub fn skipped(&self, stage: Stage) -> bool {
        self.entries
            .iter()
            .any(|d| matches!(d, Diagnostic::StageSkipped { stage: s, .. } if *s == stage))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skipped_stage_is_tracked() {
        let mut diagnostics = Diagnostics::default();
        diagnostics.skip(Stage::Efficiency, "no odometer column");
        assert!(diagnostics.skipped(Stage::Efficiency));
        assert!(!diagnostics.skipped(Stage::Calendar));
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn diagnostics_render_readable_messages() {
        let diagnostic = Diagnostic::ConversionDegradation {
            column: "liters".to_string(),
            converted_pct: 42.0,
        };
        assert_eq!(
            diagnostic.to_string(),
            "Column 'liters' converted only 42.0% of non-empty values"
        );
    }
}
