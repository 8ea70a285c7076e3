#![deny(missing_docs)]
//! Shared building blocks of the spatial SEIR fitting engine: structured
//! errors, deterministic seeding, validated model components, the parameter
//! layout and the simulation-kernel boundary.

pub mod components;
pub mod control;
pub mod errors;
pub mod kernel;
pub mod layout;
pub mod model;
pub mod rng;

pub use components::{
    Compartment, ComponentKind, DataModel, DistanceModel, ExposureModel, GammaPrior,
    InitialValues, ReinfectionMode, ReinfectionModel, TransitionPriors,
};
pub use control::{Algorithm, SamplingControl};
pub use errors::{ErrorInfo, SeirError};
pub use kernel::{RequestKind, SimulationKernel, SimulationOutput, SimulationRequest, Trajectory};
pub use layout::ParameterLayout;
pub use model::ModelComponents;
pub use rng::{derive_substream_seed, worker_seed, RngHandle};
