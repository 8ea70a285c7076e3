use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, log, Level};
use seir_core::{
    Algorithm, ErrorInfo, ModelComponents, ParameterLayout, RequestKind, SeirError,
    SimulationKernel, SimulationOutput, Trajectory,
};

use crate::determinism::control_rng;
use crate::merge::{combine_basic, ParameterBatch, SampleSet, SmcAccumulator, ToleranceState};
use crate::perturb::{bandwidth, perturb_batch};
use crate::pool::{distances, WorkerPool};
use crate::prior::PriorSampler;
use crate::report::{config_hash, FitReport, FitStatus};
use crate::reweight::reweight;

/// Cloneable handle used to request that a running fit stop.
///
/// The request is honoured at the start of the next round, never during a
/// dispatch, and is consumed by the fit that honours it.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Fresh token with no pending request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether a request is pending.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn take(&self) -> bool {
        self.flag.swap(false, Ordering::SeqCst)
    }
}

/// Consecutive SMC rounds that failed to complete a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StallCounter {
    limit: usize,
    consecutive: usize,
    total: usize,
}

impl StallCounter {
    /// Counter that aborts once `limit` consecutive stalls are recorded.
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            consecutive: 0,
            total: 0,
        }
    }

    /// Records a stalled round; reaching the limit is fatal.
    pub fn record(&mut self) -> Result<usize, SeirError> {
        self.consecutive += 1;
        self.total += 1;
        if self.consecutive >= self.limit {
            return Err(SeirError::Sampling(
                ErrorInfo::new(
                    "smc-stalled",
                    "generation did not reach the target sample size under the current tolerance",
                )
                .with_context("stalled_rounds", self.consecutive)
                .with_context("max_batches", self.limit)
                .with_hint("raise max_batches or batch_size, or use a milder shrinkage"),
            ));
        }
        Ok(self.consecutive)
    }

    /// Clears the consecutive count after a completed generation.
    pub fn reset(&mut self) {
        self.consecutive = 0;
    }

    /// Current run of consecutive stalls.
    pub fn consecutive(&self) -> usize {
        self.consecutive
    }

    /// Stalls recorded over the whole fit.
    pub fn total(&self) -> usize {
        self.total
    }
}

/// Spatial SEIR model fitted by ABC rejection or ABC-SMC.
///
/// Owns the validated components, the parameter layout, the prior and the
/// simulation kernel. Every dispatch spawns a fresh worker pool.
pub struct SpatialSeirModel<K> {
    components: ModelComponents,
    layout: ParameterLayout,
    prior: PriorSampler,
    kernel: K,
    call_counter: u64,
    cancel: CancellationToken,
}

impl<K: SimulationKernel> SpatialSeirModel<K> {
    /// Wires a kernel to validated components.
    pub fn new(components: ModelComponents, kernel: K) -> Result<Self, SeirError> {
        let layout = ParameterLayout::from_components(&components);
        let prior = PriorSampler::new(&components, layout)?;
        Ok(Self {
            components,
            layout,
            prior,
            kernel,
            call_counter: 0,
            cancel: CancellationToken::new(),
        })
    }

    /// Model components.
    pub fn components(&self) -> &ModelComponents {
        &self.components
    }

    /// Parameter layout.
    pub fn layout(&self) -> &ParameterLayout {
        &self.layout
    }

    /// Prior sampler and density.
    pub fn prior(&self) -> &PriorSampler {
        &self.prior
    }

    /// Token that cancels a running fit between rounds.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn dispatch(
        &mut self,
        batch: &[Vec<f64>],
        kind: RequestKind,
    ) -> Result<Vec<SimulationOutput>, SeirError> {
        self.call_counter += 1;
        WorkerPool::new(&self.kernel, &self.components, &self.layout).dispatch(
            batch,
            kind,
            self.call_counter,
        )
    }

    fn check_rows(&self, params: &[Vec<f64>]) -> Result<(), SeirError> {
        params
            .iter()
            .enumerate()
            .try_for_each(|(index, row)| self.layout.check_row(row, index))
    }

    /// One discrepancy per row, without acceptance logic.
    pub fn evaluate(&mut self, params: &[Vec<f64>]) -> Result<Vec<f64>, SeirError> {
        self.check_rows(params)?;
        let outputs = self.dispatch(params, RequestKind::DistanceDebug)?;
        distances(outputs)
    }

    /// Full trajectories for each row.
    pub fn simulate_detailed(&mut self, params: &[Vec<f64>]) -> Result<Vec<Trajectory>, SeirError> {
        self.check_rows(params)?;
        self.dispatch(params, RequestKind::Trajectory)?
            .into_iter()
            .enumerate()
            .map(|(index, output)| match output {
                SimulationOutput::Trajectory(trajectory) => Ok(*trajectory),
                SimulationOutput::Distance(_) => Err(SeirError::Kernel(
                    ErrorInfo::new("kernel-contract", "expected a trajectory")
                        .with_context("row", index),
                )),
            })
            .collect()
    }

    /// Draws `n` accepted samples.
    ///
    /// Generation zero always samples the prior. Basic ABC then keeps drawing
    /// prior batches and merging the top `n`; ABC-SMC perturbs the weighted
    /// particles and accumulates rows under a shrinking tolerance.
    pub fn fit(&mut self, n: usize, verbose: bool) -> Result<FitReport, SeirError> {
        let control = self.components.control.clone();
        if n == 0 {
            return Err(SeirError::config("empty-sample", "target sample size must be positive"));
        }
        if control.batch_size < n {
            return Err(SeirError::Config(
                ErrorInfo::new(
                    "batch-too-small",
                    "simulation batch size must be at least the target sample size",
                )
                .with_context("batch_size", control.batch_size)
                .with_context("samples", n),
            ));
        }
        let config_hash = config_hash(&control)?;
        let smc = control.algorithm == Algorithm::Beaumont2009;
        let planned = if smc {
            control.epochs
        } else {
            ((n as f64 / control.accept_fraction) / control.batch_size as f64).ceil() as usize
        };
        let level = if verbose { Level::Info } else { Level::Debug };

        let mut rng = control_rng(control.random_seed);
        let mut samples = SampleSet::unfilled(n, self.layout.len());
        let mut weights = vec![1.0 / n as f64; n];
        let mut tau = vec![0.0; self.layout.len()];
        let mut tolerance = ToleranceState::default();
        let mut accumulator = SmcAccumulator::new(n);
        let mut stalls = StallCounter::new(control.max_batches);
        let mut completed = 0;
        let mut rounds = 0;
        let mut status = FitStatus::Completed;

        info!(
            "fitting {n} samples with {} ({planned} planned, batch size {}, {} workers)",
            control.algorithm.as_str(),
            control.batch_size,
            control.cpu_cores
        );

        while completed < planned {
            if self.cancel.take() {
                info!("fit cancelled after {rounds} rounds");
                status = FitStatus::Cancelled;
                break;
            }

            let smc_round = smc && completed > 0;
            let batch: ParameterBatch = if smc_round {
                perturb_batch(
                    &samples,
                    &weights,
                    &tau,
                    &self.prior,
                    &mut rng,
                    control.batch_size,
                )?
            } else {
                self.prior.draw_batch(&mut rng, control.batch_size)
            };
            let outputs = self.dispatch(&batch, RequestKind::Distance)?;
            let incoming = SampleSet::new(distances(outputs)?, batch)?;
            rounds += 1;

            if !smc_round {
                samples = combine_basic(&samples, &incoming, &mut tolerance);
                completed += 1;
                if smc {
                    tau = bandwidth(&samples, tolerance.update_fraction);
                }
                log!(
                    level,
                    "completed batch {completed} of {planned}: upd {:.4}, eps [{}, {}]",
                    tolerance.update_fraction,
                    tolerance.min_eps,
                    tolerance.max_eps
                );
                continue;
            }

            match accumulator.absorb(&incoming, &mut tolerance, control.shrinkage) {
                Some(generation) => {
                    weights = reweight(&generation, &samples, &weights, &tau, &self.prior);
                    samples = generation;
                    tau = bandwidth(&samples, tolerance.update_fraction);
                    stalls.reset();
                    completed += 1;
                    log!(
                        level,
                        "completed batch {completed} of {planned}: upd {:.4}, eps [{}, {}] < {}",
                        tolerance.update_fraction,
                        tolerance.min_eps,
                        tolerance.max_eps,
                        tolerance.current_eps / control.shrinkage
                    );
                }
                None => {
                    let stalled = stalls.record()?;
                    log!(
                        level,
                        "incomplete batch {stalled} of max {}: accepted {} of {n}",
                        control.max_batches,
                        accumulator.len()
                    );
                }
            }
        }

        debug!("fit finished after {rounds} rounds with status {status:?}");
        Ok(FitReport {
            algorithm: control.algorithm,
            target_samples: n,
            column_names: self.layout.column_names(),
            samples,
            weights: smc.then_some(weights),
            tolerance,
            batches: rounds,
            generations: completed,
            planned_generations: planned,
            stalled_rounds: stalls.total(),
            status,
            random_seed: control.random_seed,
            config_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stall_counter_aborts_at_limit_and_resets() {
        let mut stalls = StallCounter::new(3);
        assert_eq!(stalls.record().unwrap(), 1);
        assert_eq!(stalls.record().unwrap(), 2);
        stalls.reset();
        assert_eq!(stalls.consecutive(), 0);
        assert_eq!(stalls.record().unwrap(), 1);
        assert_eq!(stalls.record().unwrap(), 2);
        let err = stalls.record().unwrap_err();
        assert_eq!(err.info().code, "smc-stalled");
        assert_eq!(stalls.total(), 5);
    }

    #[test]
    fn cancellation_is_consumed_once() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
        assert!(token.take());
        assert!(!clone.is_cancelled());
    }
}
