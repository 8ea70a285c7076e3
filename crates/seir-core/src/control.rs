//! Sampling configuration consumed by the fitting loop.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::components::ComponentKind;
use crate::errors::{ErrorInfo, SeirError};

/// Fitting algorithm selected for batches after generation zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    /// Plain ABC rejection: every batch is drawn from the prior.
    BasicAbc,
    /// Modified Beaumont et al. (2009) ABC-SMC with shrinking tolerance.
    Beaumont2009,
}

impl Algorithm {
    /// Maps the legacy integer selectors onto an algorithm.
    ///
    /// `1` selects basic ABC, `2` selects the SMC scheme. Every other value is
    /// rejected before sampling begins.
    pub fn from_code(code: u32) -> Result<Self, SeirError> {
        match code {
            1 => Ok(Algorithm::BasicAbc),
            2 => Ok(Algorithm::Beaumont2009),
            other => Err(SeirError::Config(
                ErrorInfo::new("unsupported-algorithm", "unknown algorithm selector")
                    .with_context("code", other)
                    .with_hint("use 1 (basic ABC) or 2 (Beaumont 2009 SMC)"),
            )),
        }
    }

    /// Short label used in logs and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::BasicAbc => "basic-abc",
            Algorithm::Beaumont2009 => "beaumont2009",
        }
    }
}

/// YAML-configurable parameters governing a fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingControl {
    /// Integration width handed to the simulation kernel.
    #[serde(default = "default_simulation_width")]
    pub simulation_width: usize,
    /// Base seed for the control stream and every worker stream.
    #[serde(default = "default_random_seed")]
    pub random_seed: u64,
    /// Number of simulation workers spawned per dispatch.
    #[serde(default = "default_cpu_cores")]
    pub cpu_cores: usize,
    /// Algorithm used after generation zero.
    #[serde(default = "default_algorithm")]
    pub algorithm: Algorithm,
    /// Number of candidate parameter vectors simulated per round.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Number of SMC generations, generation zero included.
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    /// Maximum consecutive incomplete SMC rounds before the fit aborts.
    #[serde(default = "default_max_batches")]
    pub max_batches: usize,
    /// Tolerance multiplier applied after each completed SMC generation.
    #[serde(default = "default_shrinkage")]
    pub shrinkage: f64,
    /// Target acceptance fraction for basic ABC.
    #[serde(default = "default_accept_fraction")]
    pub accept_fraction: f64,
}

fn default_simulation_width() -> usize {
    7
}

fn default_random_seed() -> u64 {
    123_124
}

fn default_cpu_cores() -> usize {
    2
}

fn default_algorithm() -> Algorithm {
    Algorithm::BasicAbc
}

fn default_batch_size() -> usize {
    10_000
}

fn default_epochs() -> usize {
    1
}

fn default_max_batches() -> usize {
    100
}

fn default_shrinkage() -> f64 {
    0.9
}

fn default_accept_fraction() -> f64 {
    0.5
}

impl Default for SamplingControl {
    fn default() -> Self {
        Self {
            simulation_width: default_simulation_width(),
            random_seed: default_random_seed(),
            cpu_cores: default_cpu_cores(),
            algorithm: default_algorithm(),
            batch_size: default_batch_size(),
            epochs: default_epochs(),
            max_batches: default_max_batches(),
            shrinkage: default_shrinkage(),
            accept_fraction: default_accept_fraction(),
        }
    }
}

impl SamplingControl {
    /// Component tag for wiring diagnostics.
    pub fn kind(&self) -> ComponentKind {
        ComponentKind::SamplingControl
    }

    /// Parses and validates a YAML document.
    pub fn from_yaml_str(contents: &str) -> Result<Self, SeirError> {
        let control: SamplingControl = serde_yaml::from_str(contents).map_err(|err| {
            SeirError::Serde(ErrorInfo::new("control-parse", err.to_string()))
        })?;
        control.validate()?;
        Ok(control)
    }

    /// Loads and validates a YAML file.
    pub fn load(path: &Path) -> Result<Self, SeirError> {
        let contents = fs::read_to_string(path).map_err(|err| {
            SeirError::Serde(
                ErrorInfo::new("control-read", err.to_string())
                    .with_context("path", path.display()),
            )
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Checks value ranges. Cross-component checks live in
    /// [`crate::ModelComponents::new`].
    pub fn validate(&self) -> Result<(), SeirError> {
        let fail = |field: &str, value: String, hint: &str| -> Result<(), SeirError> {
            Err(SeirError::Config(
                ErrorInfo::new("control-range", "sampling control value out of range")
                    .with_context("field", field)
                    .with_context("value", value)
                    .with_hint(hint),
            ))
        };
        if self.cpu_cores == 0 {
            return fail("cpu_cores", self.cpu_cores.to_string(), "at least one worker");
        }
        if self.simulation_width == 0 {
            return fail(
                "simulation_width",
                self.simulation_width.to_string(),
                "must be positive",
            );
        }
        if self.batch_size == 0 {
            return fail("batch_size", self.batch_size.to_string(), "must be positive");
        }
        if self.epochs == 0 {
            return fail("epochs", self.epochs.to_string(), "must be positive");
        }
        if self.max_batches == 0 {
            return fail("max_batches", self.max_batches.to_string(), "must be positive");
        }
        if !(self.shrinkage > 0.0 && self.shrinkage < 1.0) {
            return fail("shrinkage", self.shrinkage.to_string(), "must lie in (0, 1)");
        }
        if !(self.accept_fraction > 0.0 && self.accept_fraction <= 1.0) {
            return fail(
                "accept_fraction",
                self.accept_fraction.to_string(),
                "must lie in (0, 1]",
            );
        }
        Ok(())
    }
}
