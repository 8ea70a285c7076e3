#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use nalgebra::DMatrix;
use rand::Rng;
use seir_abc::CancellationToken;
use seir_core::{
    Algorithm, Compartment, DataModel, DistanceModel, ErrorInfo, ExposureModel, GammaPrior,
    InitialValues, ModelComponents, ReinfectionModel, RequestKind, RngHandle, SamplingControl,
    SeirError, SimulationKernel, SimulationOutput, SimulationRequest, Trajectory,
    TransitionPriors,
};

pub const LOCATIONS: usize = 2;
pub const TIMEPOINTS: usize = 4;
pub const TRUE_BETA: f64 = 0.5;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn control(algorithm: Algorithm, batch_size: usize) -> SamplingControl {
    SamplingControl {
        random_seed: 2024,
        cpu_cores: 2,
        algorithm,
        batch_size,
        epochs: 3,
        max_batches: 20,
        shrinkage: 0.9,
        accept_fraction: 0.5,
        ..SamplingControl::default()
    }
}

/// Two locations, one exposure covariate, one distance matrix.
pub fn components(control: SamplingControl) -> ModelComponents {
    let data = DataModel::new(
        DMatrix::from_element(TIMEPOINTS, LOCATIONS, 3),
        None,
        Compartment::IStar,
        1.0,
    )
    .unwrap();
    let exposure = ExposureModel::new(
        DMatrix::from_element(LOCATIONS * TIMEPOINTS, 1, 1.0),
        LOCATIONS,
        TIMEPOINTS,
        vec![TRUE_BETA],
        vec![2.0],
        None,
    )
    .unwrap();
    let mut distance = DistanceModel::new();
    distance
        .add_matrix(DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 1.0, 0.0]))
        .unwrap();
    let transition = TransitionPriors::new(
        GammaPrior::new(2.0, 4.0).unwrap(),
        GammaPrior::new(2.0, 4.0).unwrap(),
    );
    let initial = InitialValues::new(vec![100; LOCATIONS], vec![0; LOCATIONS], vec![2; LOCATIONS], vec![0; LOCATIONS])
        .unwrap();
    ModelComponents::new(
        data,
        exposure,
        ReinfectionModel::disabled(),
        distance,
        transition,
        initial,
        control,
    )
    .unwrap()
}

fn trajectory(request: &SimulationRequest<'_>, result: f64) -> Trajectory {
    let counts = DMatrix::from_element(TIMEPOINTS, LOCATIONS, 1_i64);
    let rates = DMatrix::from_element(TIMEPOINTS, LOCATIONS, 0.1);
    let layout = request.layout;
    Trajectory {
        s: counts.clone(),
        e: counts.clone(),
        i: counts.clone(),
        r: counts.clone(),
        s_star: counts.clone(),
        e_star: counts.clone(),
        i_star: counts.clone(),
        r_star: counts,
        p_se: rates.clone(),
        p_ei: rates.clone(),
        p_ir: rates,
        rho: DMatrix::from_column_slice(layout.n_rho, 1, &request.params[layout.rho_range()]),
        beta: DMatrix::from_column_slice(layout.n_beta, 1, &request.params[layout.beta_range()]),
        x: request.model.exposure.x.clone(),
        result,
    }
}

/// Distance to `TRUE_BETA` with optional uniform noise.
pub struct ToyKernel {
    pub noise: f64,
}

impl SimulationKernel for ToyKernel {
    fn simulate(
        &self,
        request: &SimulationRequest<'_>,
        rng: &mut RngHandle,
    ) -> Result<SimulationOutput, SeirError> {
        let jitter: f64 = rng.gen();
        let distance = (request.params[0] - TRUE_BETA).abs() + self.noise * jitter;
        Ok(match request.kind {
            RequestKind::Trajectory => {
                SimulationOutput::Trajectory(Box::new(trajectory(request, distance)))
            }
            RequestKind::Distance | RequestKind::DistanceDebug => {
                SimulationOutput::Distance(distance)
            }
        })
    }
}

/// Returns the same distance for every row.
pub struct ConstantKernel(pub f64);

impl SimulationKernel for ConstantKernel {
    fn simulate(
        &self,
        _request: &SimulationRequest<'_>,
        _rng: &mut RngHandle,
    ) -> Result<SimulationOutput, SeirError> {
        Ok(SimulationOutput::Distance(self.0))
    }
}

/// Panics on one row.
pub struct PanickingKernel {
    pub row: usize,
}

impl SimulationKernel for PanickingKernel {
    fn simulate(
        &self,
        request: &SimulationRequest<'_>,
        _rng: &mut RngHandle,
    ) -> Result<SimulationOutput, SeirError> {
        if request.index == self.row {
            panic!("simulated crash on row {}", self.row);
        }
        Ok(SimulationOutput::Distance(1.0))
    }
}

/// Reports an error on one row.
pub struct FailingKernel {
    pub row: usize,
}

impl SimulationKernel for FailingKernel {
    fn simulate(
        &self,
        request: &SimulationRequest<'_>,
        _rng: &mut RngHandle,
    ) -> Result<SimulationOutput, SeirError> {
        if request.index == self.row {
            return Err(SeirError::Kernel(ErrorInfo::new("integration-failed", "step diverged")));
        }
        Ok(SimulationOutput::Distance(1.0))
    }
}

/// Requests cancellation once `after_rows` rows have been simulated.
pub struct CancellingKernel {
    pub token: Arc<OnceLock<CancellationToken>>,
    pub after_rows: usize,
    pub seen: AtomicUsize,
}

impl SimulationKernel for CancellingKernel {
    fn simulate(
        &self,
        request: &SimulationRequest<'_>,
        _rng: &mut RngHandle,
    ) -> Result<SimulationOutput, SeirError> {
        if self.seen.fetch_add(1, Ordering::SeqCst) + 1 == self.after_rows {
            if let Some(token) = self.token.get() {
                token.cancel();
            }
        }
        Ok(SimulationOutput::Distance((request.params[0] - TRUE_BETA).abs()))
    }
}
