use std::fs;
use std::path::Path;

use seir_core::{Algorithm, ErrorInfo, SamplingControl, SeirError};
use serde::{Deserialize, Serialize};

use crate::hash::stable_hash_string;
use crate::merge::{SampleSet, ToleranceState};

/// How a fit ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FitStatus {
    /// Every planned batch or generation completed.
    Completed,
    /// A cancellation request was honoured between rounds.
    Cancelled,
}

/// Outcome of [`crate::SpatialSeirModel::fit`], serialisable as a run record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    /// Algorithm used after generation zero.
    pub algorithm: Algorithm,
    /// Requested sample size.
    pub target_samples: usize,
    /// Parameter column labels.
    pub column_names: Vec<String>,
    /// Accepted samples at termination.
    pub samples: SampleSet,
    /// Final importance weights (SMC only).
    pub weights: Option<Vec<f64>>,
    /// Tolerance bounds at termination.
    pub tolerance: ToleranceState,
    /// Dispatch rounds executed.
    pub batches: usize,
    /// Batches (basic ABC) or generations (SMC, generation zero included)
    /// that completed.
    pub generations: usize,
    /// Planned number of batches or generations.
    pub planned_generations: usize,
    /// SMC rounds that did not complete a generation.
    pub stalled_rounds: usize,
    /// Termination status.
    pub status: FitStatus,
    /// Seed the fit was configured with.
    pub random_seed: u64,
    /// SHA-256 of the canonical JSON sampling control.
    pub config_hash: String,
}

/// Hash identifying a sampling configuration.
pub fn config_hash(control: &SamplingControl) -> Result<String, SeirError> {
    stable_hash_string(control)
}

impl FitReport {
    /// Writes the report as pretty JSON, creating parent directories.
    pub fn write_json(&self, path: &Path) -> Result<(), SeirError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                SeirError::Serde(
                    ErrorInfo::new("report-mkdir", err.to_string())
                        .with_context("path", parent.display()),
                )
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|err| {
            SeirError::Serde(
                ErrorInfo::new("report-serialize", err.to_string())
                    .with_context("path", path.display()),
            )
        })?;
        fs::write(path, json).map_err(|err| {
            SeirError::Serde(
                ErrorInfo::new("report-write", err.to_string())
                    .with_context("path", path.display()),
            )
        })
    }

    /// Loads a report written by [`FitReport::write_json`].
    pub fn load(path: &Path) -> Result<Self, SeirError> {
        let contents = fs::read_to_string(path).map_err(|err| {
            SeirError::Serde(
                ErrorInfo::new("report-read", err.to_string())
                    .with_context("path", path.display()),
            )
        })?;
        serde_json::from_str(&contents).map_err(|err| {
            SeirError::Serde(
                ErrorInfo::new("report-parse", err.to_string())
                    .with_context("path", path.display()),
            )
        })
    }
}

/// Serde adapters writing non-finite distances as `null` and reading `null`
/// back as positive infinity.
pub mod lenient_f64 {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serializes one value.
    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        value.is_finite().then_some(*value).serialize(serializer)
    }

    /// Deserializes one value.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
    }

    /// Adapters for a vector of values.
    pub mod vec {
        use serde::{Deserialize, Deserializer, Serialize, Serializer};

        /// Serializes a vector.
        pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
            values
                .iter()
                .map(|v| v.is_finite().then_some(*v))
                .collect::<Vec<_>>()
                .serialize(serializer)
        }

        /// Deserializes a vector.
        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Vec<f64>, D::Error> {
            let values = Vec::<Option<f64>>::deserialize(deserializer)?;
            Ok(values
                .into_iter()
                .map(|v| v.unwrap_or(f64::INFINITY))
                .collect())
        }
    }
}
