//! Passive model components: observations, covariates, distances, priors and
//! initial compartment sizes.
//!
//! Every constructor validates the component on its own. Consistency between
//! components is checked once, in [`crate::ModelComponents::new`].

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, SeirError};

/// Tag identifying each component when reporting wiring problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentKind {
    /// Observation model.
    Data,
    /// Exposure covariates and beta priors.
    Exposure,
    /// Reinfection covariates and priors.
    Reinfection,
    /// Distance-matrix collection and spatial prior.
    Distance,
    /// Latent and infectious period priors.
    TransitionPriors,
    /// Initial compartment sizes.
    InitialValues,
    /// Sampling configuration.
    SamplingControl,
}

impl ComponentKind {
    /// Stable label used in error context.
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Data => "data",
            ComponentKind::Exposure => "exposure",
            ComponentKind::Reinfection => "reinfection",
            ComponentKind::Distance => "distance",
            ComponentKind::TransitionPriors => "transition-priors",
            ComponentKind::InitialValues => "initial-values",
            ComponentKind::SamplingControl => "sampling-control",
        }
    }
}

fn invalid(kind: ComponentKind, code: &str, message: &str) -> SeirError {
    SeirError::Config(ErrorInfo::new(code, message).with_context("component", kind.as_str()))
}

/// Compartment the observations are compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compartment {
    /// Susceptible counts.
    S,
    /// Exposed counts.
    E,
    /// Infectious counts.
    I,
    /// Removed counts.
    R,
    /// New exposures per step.
    SStar,
    /// New infections per step.
    EStar,
    /// New removals per step.
    IStar,
    /// New re-susceptibles per step.
    RStar,
}

/// Observed counts with a missingness mask.
#[derive(Debug, Clone, PartialEq)]
pub struct DataModel {
    /// Observations, `timepoints x locations`.
    pub y: DMatrix<i64>,
    /// `true` where the observation is missing.
    pub na_mask: DMatrix<bool>,
    /// Overdispersion parameter of the observation process.
    pub phi: f64,
    /// Compartment the observations describe.
    pub compartment: Compartment,
}

impl DataModel {
    /// Builds a data model; `na_mask` defaults to "nothing missing".
    pub fn new(
        y: DMatrix<i64>,
        na_mask: Option<DMatrix<bool>>,
        compartment: Compartment,
        phi: f64,
    ) -> Result<Self, SeirError> {
        if y.nrows() == 0 || y.ncols() == 0 {
            return Err(invalid(ComponentKind::Data, "empty-data", "observation matrix is empty"));
        }
        let na_mask = na_mask.unwrap_or_else(|| DMatrix::from_element(y.nrows(), y.ncols(), false));
        if na_mask.shape() != y.shape() {
            return Err(invalid(
                ComponentKind::Data,
                "mask-shape",
                "missingness mask and observations differ in shape",
            ));
        }
        if !(phi.is_finite() && phi >= 0.0) {
            return Err(invalid(ComponentKind::Data, "invalid-phi", "phi must be finite and >= 0"));
        }
        Ok(Self {
            y,
            na_mask,
            phi,
            compartment,
        })
    }

    /// Number of locations (columns of `y`).
    pub fn locations(&self) -> usize {
        self.y.ncols()
    }

    /// Number of time points (rows of `y`).
    pub fn timepoints(&self) -> usize {
        self.y.nrows()
    }

    /// Component tag.
    pub fn kind(&self) -> ComponentKind {
        ComponentKind::Data
    }
}

/// Exposure-process covariates with independent normal priors on each beta.
#[derive(Debug, Clone, PartialEq)]
pub struct ExposureModel {
    /// Design matrix stacked by location, `(locations * timepoints) x n_beta`.
    pub x: DMatrix<f64>,
    /// Per-timepoint exposure offset.
    pub offset: Vec<f64>,
    /// Prior means, one per column of `x`.
    pub beta_prior_mean: Vec<f64>,
    /// Prior precisions, one per column of `x`.
    pub beta_prior_precision: Vec<f64>,
    /// Number of locations the design covers.
    pub locations: usize,
    /// Number of time points the design covers.
    pub timepoints: usize,
}

impl ExposureModel {
    /// Builds an exposure model. The offset defaults to ones.
    pub fn new(
        x: DMatrix<f64>,
        locations: usize,
        timepoints: usize,
        beta_prior_mean: Vec<f64>,
        beta_prior_precision: Vec<f64>,
        offset: Option<Vec<f64>>,
    ) -> Result<Self, SeirError> {
        let kind = ComponentKind::Exposure;
        if x.ncols() == 0 {
            return Err(invalid(kind, "empty-design", "exposure design has no columns"));
        }
        if x.nrows() != locations * timepoints {
            return Err(SeirError::Config(
                ErrorInfo::new("design-rows", "exposure design rows must equal locations * timepoints")
                    .with_context("component", kind.as_str())
                    .with_context("rows", x.nrows())
                    .with_context("locations", locations)
                    .with_context("timepoints", timepoints),
            ));
        }
        if beta_prior_mean.len() != x.ncols() || beta_prior_precision.len() != x.ncols() {
            return Err(invalid(kind, "prior-length", "one prior mean and precision per covariate"));
        }
        if beta_prior_precision.iter().any(|p| !(p.is_finite() && *p > 0.0)) {
            return Err(invalid(kind, "prior-precision", "precisions must be finite and positive"));
        }
        let offset = offset.unwrap_or_else(|| vec![1.0; timepoints]);
        if offset.len() != timepoints {
            return Err(invalid(kind, "offset-length", "one offset per time point"));
        }
        Ok(Self {
            x,
            offset,
            beta_prior_mean,
            beta_prior_precision,
            locations,
            timepoints,
        })
    }

    /// Number of exposure coefficients.
    pub fn n_beta(&self) -> usize {
        self.x.ncols()
    }

    /// Component tag.
    pub fn kind(&self) -> ComponentKind {
        ComponentKind::Exposure
    }
}

/// How removed individuals return to the susceptible pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReinfectionMode {
    /// Reinfection probabilities are estimated from covariates.
    Estimated,
    /// Reinfection probabilities are fixed by the covariates.
    Fixed,
    /// No reinfection (SEIR).
    Disabled,
}

/// Reinfection covariates with normal priors.
#[derive(Debug, Clone, PartialEq)]
pub struct ReinfectionModel {
    /// Reinfection mode.
    pub mode: ReinfectionMode,
    /// Covariates, `timepoints x n_beta_rs`.
    pub x_rs: DMatrix<f64>,
    /// Prior means.
    pub beta_prior_mean: Vec<f64>,
    /// Prior precisions. A non-positive first entry switches estimation off.
    pub beta_prior_precision: Vec<f64>,
}

impl ReinfectionModel {
    /// Builds a reinfection model with covariates.
    pub fn new(
        mode: ReinfectionMode,
        x_rs: DMatrix<f64>,
        beta_prior_mean: Vec<f64>,
        beta_prior_precision: Vec<f64>,
    ) -> Result<Self, SeirError> {
        let kind = ComponentKind::Reinfection;
        if mode != ReinfectionMode::Disabled {
            if beta_prior_mean.len() != x_rs.ncols() || beta_prior_precision.len() != x_rs.ncols() {
                return Err(invalid(kind, "prior-length", "one prior mean and precision per covariate"));
            }
            if beta_prior_precision.iter().any(|p| !p.is_finite() || *p < 0.0) {
                return Err(invalid(kind, "prior-precision", "precisions must be finite and >= 0"));
            }
        }
        Ok(Self {
            mode,
            x_rs,
            beta_prior_mean,
            beta_prior_precision,
        })
    }

    /// SEIR model without reinfection.
    pub fn disabled() -> Self {
        Self {
            mode: ReinfectionMode::Disabled,
            x_rs: DMatrix::zeros(0, 0),
            beta_prior_mean: Vec::new(),
            beta_prior_precision: Vec::new(),
        }
    }

    /// Whether reinfection coefficients are part of the parameter vector.
    pub fn is_estimated(&self) -> bool {
        self.mode != ReinfectionMode::Disabled
            && self.beta_prior_precision.first().is_some_and(|p| *p > 0.0)
    }

    /// Component tag.
    pub fn kind(&self) -> ComponentKind {
        ComponentKind::Reinfection
    }
}

/// Collection of square distance matrices sharing one location count.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceModel {
    /// Distance matrices, each `locations x locations`.
    pub matrices: Vec<DMatrix<f64>>,
    /// Spatial weight prior parameters `(shape, rate)`.
    pub spatial_prior: (f64, f64),
}

impl Default for DistanceModel {
    fn default() -> Self {
        Self::new()
    }
}

impl DistanceModel {
    /// Empty collection with a flat `(1, 1)` spatial prior.
    pub fn new() -> Self {
        Self {
            matrices: Vec::new(),
            spatial_prior: (1.0, 1.0),
        }
    }

    /// Sets the spatial weight prior parameters.
    pub fn set_prior_parameters(&mut self, shape: f64, rate: f64) -> Result<(), SeirError> {
        if !(shape.is_finite() && rate.is_finite() && shape > 0.0 && rate > 0.0) {
            return Err(invalid(
                ComponentKind::Distance,
                "spatial-prior",
                "spatial prior parameters must be finite and positive",
            ));
        }
        self.spatial_prior = (shape, rate);
        Ok(())
    }

    /// Appends a distance matrix.
    pub fn add_matrix(&mut self, matrix: DMatrix<f64>) -> Result<(), SeirError> {
        if matrix.nrows() != matrix.ncols() {
            return Err(invalid(ComponentKind::Distance, "not-square", "distance matrix must be square"));
        }
        if let Some(locations) = self.locations() {
            if matrix.nrows() != locations {
                return Err(SeirError::Config(
                    ErrorInfo::new(
                        "distance-dimension",
                        "dimension does not match previously added distance matrix",
                    )
                    .with_context("component", ComponentKind::Distance.as_str())
                    .with_context("expected", locations)
                    .with_context("found", matrix.nrows()),
                ));
            }
        }
        self.matrices.push(matrix);
        Ok(())
    }

    /// Location count, `None` until a matrix has been added.
    pub fn locations(&self) -> Option<usize> {
        self.matrices.first().map(|m| m.nrows())
    }

    /// Component tag.
    pub fn kind(&self) -> ComponentKind {
        ComponentKind::Distance
    }
}

/// Gamma prior parameterised by shape and rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GammaPrior {
    /// Shape parameter.
    pub shape: f64,
    /// Rate parameter (inverse scale).
    pub rate: f64,
}

impl GammaPrior {
    /// Builds a validated gamma prior.
    pub fn new(shape: f64, rate: f64) -> Result<Self, SeirError> {
        if !(shape.is_finite() && rate.is_finite() && shape > 0.0 && rate > 0.0) {
            return Err(SeirError::Config(
                ErrorInfo::new("gamma-prior", "gamma prior parameters must be finite and positive")
                    .with_context("component", ComponentKind::TransitionPriors.as_str())
                    .with_context("shape", shape)
                    .with_context("rate", rate),
            ));
        }
        Ok(Self { shape, rate })
    }
}

/// Priors on the E to I and I to R transition rates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransitionPriors {
    /// Prior on `gamma_ei`.
    pub gamma_ei: GammaPrior,
    /// Prior on `gamma_ir`.
    pub gamma_ir: GammaPrior,
}

impl TransitionPriors {
    /// Builds the transition priors.
    pub fn new(gamma_ei: GammaPrior, gamma_ir: GammaPrior) -> Self {
        Self { gamma_ei, gamma_ir }
    }

    /// Component tag.
    pub fn kind(&self) -> ComponentKind {
        ComponentKind::TransitionPriors
    }
}

/// Initial compartment sizes per location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialValues {
    /// Susceptible.
    pub s0: Vec<i64>,
    /// Exposed.
    pub e0: Vec<i64>,
    /// Infectious.
    pub i0: Vec<i64>,
    /// Removed.
    pub r0: Vec<i64>,
}

impl InitialValues {
    /// Builds the container; all vectors share one length and are non-negative.
    pub fn new(s0: Vec<i64>, e0: Vec<i64>, i0: Vec<i64>, r0: Vec<i64>) -> Result<Self, SeirError> {
        let kind = ComponentKind::InitialValues;
        let n = s0.len();
        if n == 0 || e0.len() != n || i0.len() != n || r0.len() != n {
            return Err(invalid(kind, "initial-length", "compartment vectors must share a non-zero length"));
        }
        if [&s0, &e0, &i0, &r0].iter().any(|v| v.iter().any(|c| *c < 0)) {
            return Err(invalid(kind, "initial-negative", "compartment sizes must be non-negative"));
        }
        Ok(Self { s0, e0, i0, r0 })
    }

    /// Number of locations.
    pub fn locations(&self) -> usize {
        self.s0.len()
    }

    /// Component tag.
    pub fn kind(&self) -> ComponentKind {
        ComponentKind::InitialValues
    }
}
