//! Validated bundle of model components shared read-only with every worker.

use crate::components::{
    ComponentKind, DataModel, DistanceModel, ExposureModel, InitialValues, ReinfectionModel,
    ReinfectionMode, TransitionPriors,
};
use crate::control::SamplingControl;
use crate::errors::{ErrorInfo, SeirError};

/// Every collaborator the fitting engine consumes, checked for mutual
/// consistency once at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelComponents {
    /// Observation model.
    pub data: DataModel,
    /// Exposure covariates and beta priors.
    pub exposure: ExposureModel,
    /// Reinfection covariates and priors.
    pub reinfection: ReinfectionModel,
    /// Distance matrices and spatial prior.
    pub distance: DistanceModel,
    /// Transition rate priors.
    pub transition: TransitionPriors,
    /// Initial compartment sizes.
    pub initial: InitialValues,
    /// Sampling configuration.
    pub control: SamplingControl,
}

fn mismatch(
    left: ComponentKind,
    right: ComponentKind,
    dimension: &str,
    left_value: usize,
    right_value: usize,
) -> SeirError {
    SeirError::Config(
        ErrorInfo::new(
            "dimension-mismatch",
            format!(
                "{} and {} imply different {dimension}",
                left.as_str(),
                right.as_str()
            ),
        )
        .with_context("dimension", dimension)
        .with_context(left.as_str(), left_value)
        .with_context(right.as_str(), right_value),
    )
}

impl ModelComponents {
    /// Bundles the components after a single cross-component validation pass.
    pub fn new(
        data: DataModel,
        exposure: ExposureModel,
        reinfection: ReinfectionModel,
        distance: DistanceModel,
        transition: TransitionPriors,
        initial: InitialValues,
        control: SamplingControl,
    ) -> Result<Self, SeirError> {
        control.validate()?;

        if data.locations() != exposure.locations {
            return Err(mismatch(
                data.kind(),
                exposure.kind(),
                "locations",
                data.locations(),
                exposure.locations,
            ));
        }
        if data.timepoints() != exposure.timepoints {
            return Err(mismatch(
                data.kind(),
                exposure.kind(),
                "timepoints",
                data.timepoints(),
                exposure.timepoints,
            ));
        }
        match distance.locations() {
            Some(locations) if locations != data.locations() => {
                return Err(mismatch(
                    data.kind(),
                    distance.kind(),
                    "locations",
                    data.locations(),
                    locations,
                ));
            }
            None if data.locations() > 1 => {
                return Err(SeirError::Config(
                    ErrorInfo::new(
                        "missing-distance",
                        "spatial models need at least one distance matrix",
                    )
                    .with_context("locations", data.locations())
                    .with_hint("add a locations x locations matrix to the distance model"),
                ));
            }
            _ => {}
        }
        if data.locations() != initial.locations() {
            return Err(mismatch(
                data.kind(),
                initial.kind(),
                "locations",
                data.locations(),
                initial.locations(),
            ));
        }
        if reinfection.mode != ReinfectionMode::Disabled
            && reinfection.x_rs.nrows() != data.timepoints()
        {
            return Err(mismatch(
                data.kind(),
                reinfection.kind(),
                "timepoints",
                data.timepoints(),
                reinfection.x_rs.nrows(),
            ));
        }

        Ok(Self {
            data,
            exposure,
            reinfection,
            distance,
            transition,
            initial,
            control,
        })
    }

    /// Whether the spatial weight block is active.
    pub fn has_spatial(&self) -> bool {
        self.data.locations() > 1
    }
}
