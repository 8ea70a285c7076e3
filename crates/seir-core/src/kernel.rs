//! Boundary with the per-candidate simulation kernel.

use nalgebra::DMatrix;

use crate::errors::{ErrorInfo, SeirError};
use crate::layout::ParameterLayout;
use crate::model::ModelComponents;
use crate::rng::RngHandle;

/// What a dispatch asks the kernel to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Scalar discrepancy used by the sampling loop.
    Distance,
    /// Scalar discrepancy for caller-supplied rows (`evaluate`).
    DistanceDebug,
    /// Full trajectory record (`simulate_detailed`).
    Trajectory,
}

impl RequestKind {
    /// Short label used in error context.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Distance => "distance",
            RequestKind::DistanceDebug => "distance-debug",
            RequestKind::Trajectory => "trajectory",
        }
    }
}

/// One simulation job as seen by the kernel.
#[derive(Debug, Clone, Copy)]
pub struct SimulationRequest<'a> {
    /// Requested output.
    pub kind: RequestKind,
    /// Originating batch row.
    pub index: usize,
    /// Parameter row laid out per `layout`.
    pub params: &'a [f64],
    /// Block structure of `params`.
    pub layout: &'a ParameterLayout,
    /// Read-only model configuration.
    pub model: &'a ModelComponents,
    /// Integration width from the sampling control.
    pub simulation_width: usize,
}

/// Compartment trajectories and per-step rates of one simulated epidemic.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    /// Susceptible counts, `timepoints x locations`.
    pub s: DMatrix<i64>,
    /// Exposed counts.
    pub e: DMatrix<i64>,
    /// Infectious counts.
    pub i: DMatrix<i64>,
    /// Removed counts.
    pub r: DMatrix<i64>,
    /// New exposures.
    pub s_star: DMatrix<i64>,
    /// New infections.
    pub e_star: DMatrix<i64>,
    /// New removals.
    pub i_star: DMatrix<i64>,
    /// New re-susceptibles.
    pub r_star: DMatrix<i64>,
    /// Exposure probabilities.
    pub p_se: DMatrix<f64>,
    /// E to I probabilities.
    pub p_ei: DMatrix<f64>,
    /// I to R probabilities.
    pub p_ir: DMatrix<f64>,
    /// Spatial weights used.
    pub rho: DMatrix<f64>,
    /// Exposure coefficients used.
    pub beta: DMatrix<f64>,
    /// Exposure design used.
    pub x: DMatrix<f64>,
    /// Discrepancy against the observations.
    pub result: f64,
}

/// Kernel response.
#[derive(Debug, Clone, PartialEq)]
pub enum SimulationOutput {
    /// Scalar discrepancy.
    Distance(f64),
    /// Full trajectory.
    Trajectory(Box<Trajectory>),
}

impl SimulationOutput {
    /// Enforces the kernel contract: the variant must match the request and
    /// distances must be non-negative numbers.
    pub fn check(self, kind: RequestKind, index: usize) -> Result<Self, SeirError> {
        let violation = |message: &str| {
            ErrorInfo::new("kernel-contract", message)
                .with_context("row", index)
                .with_context("request", kind.as_str())
        };
        match (&self, kind) {
            (SimulationOutput::Distance(d), RequestKind::Distance | RequestKind::DistanceDebug) => {
                if d.is_nan() || *d < 0.0 {
                    return Err(SeirError::Kernel(
                        violation("kernel returned a negative or NaN distance")
                            .with_context("value", d),
                    ));
                }
            }
            (SimulationOutput::Trajectory(_), RequestKind::Trajectory) => {}
            _ => {
                return Err(SeirError::Kernel(violation(
                    "kernel output does not match the request kind",
                )))
            }
        }
        Ok(self)
    }
}

/// Maps one parameter row to a discrepancy or trajectory.
///
/// Implementations are shared by reference across worker threads and must
/// not hold mutable state; all randomness comes from the worker-owned `rng`.
pub trait SimulationKernel: Send + Sync {
    /// Simulates one candidate.
    fn simulate(
        &self,
        request: &SimulationRequest<'_>,
        rng: &mut RngHandle,
    ) -> Result<SimulationOutput, SeirError>;
}
