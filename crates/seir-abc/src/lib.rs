#![deny(missing_docs)]

//! Approximate Bayesian computation for the spatial SEIR model: prior
//! sampling, a scatter-gather simulation pool, top-N and tolerance-gated
//! merging, SMC perturbation with importance reweighting, and the fitting
//! loop that ties them together.

/// Fitting loop, cancellation and stall tracking.
pub mod controller;
/// Control-stream seed derivation.
pub mod determinism;
/// Canonical JSON hashing.
pub mod hash;
/// Sample sets, tolerance state and the two merge strategies.
pub mod merge;
/// SMC bandwidth, weighted resampling and jittered proposals.
pub mod perturb;
/// Worker pool dispatching rows to the simulation kernel.
pub mod pool;
/// Prior draws and prior density.
pub mod prior;
/// Serialisable fit report.
pub mod report;
/// Importance reweighting between SMC generations.
pub mod reweight;

pub use controller::{CancellationToken, SpatialSeirModel, StallCounter};
pub use merge::{combine_basic, ParameterBatch, ParameterRow, SampleSet, SmcAccumulator, ToleranceState};
pub use pool::WorkerPool;
pub use prior::PriorSampler;
pub use report::{config_hash, FitReport, FitStatus};
pub use reweight::reweight;
