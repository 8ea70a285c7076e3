use log::warn;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use seir_core::{ErrorInfo, RngHandle, SeirError};

use crate::merge::{ParameterBatch, SampleSet};
use crate::prior::PriorSampler;

/// Lower bound applied to the update fraction when scaling the bandwidth.
pub const MIN_UPDATE_FRACTION: f64 = 0.01;
/// Smallest bandwidth handed to the perturbation kernel.
pub const MIN_BANDWIDTH: f64 = 1e-12;
/// Redraws allowed per row before an unsupported proposal becomes fatal.
pub const MAX_PROPOSAL_ATTEMPTS: usize = 10_000;
/// Tolerated gap between the total weight and one before a warning.
pub const WEIGHT_DRIFT_TOLERANCE: f64 = 1e-6;

fn sample_sd(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (ss / (n - 1) as f64).sqrt()
}

/// Per-column perturbation bandwidth
/// `max(update_fraction, 0.01) * sd(column)`, floored at [`MIN_BANDWIDTH`].
pub fn bandwidth(samples: &SampleSet, update_fraction: f64) -> Vec<f64> {
    let width = samples.params.first().map_or(0, Vec::len);
    let scale = update_fraction.max(MIN_UPDATE_FRACTION);
    (0..width)
        .map(|k| (scale * sample_sd(&samples.column(k))).max(MIN_BANDWIDTH))
        .collect()
}

/// Running sums of `weights`, with the final entry pinned to one.
///
/// Logs a warning when the weights drift from one by more than
/// [`WEIGHT_DRIFT_TOLERANCE`].
pub fn cumulative_weights(weights: &[f64]) -> Vec<f64> {
    let mut cumulative: Vec<f64> = weights
        .iter()
        .scan(0.0, |total, w| {
            *total += w;
            Some(*total)
        })
        .collect();
    if let Some(last) = cumulative.last_mut() {
        if (*last - 1.0).abs() > WEIGHT_DRIFT_TOLERANCE {
            warn!("importance weights sum to {last}, renormalising");
        }
        *last = 1.0;
    }
    cumulative
}

/// Draws `batch_size` proposals by weighted resampling of `samples` plus
/// Gaussian jitter of bandwidth `tau`.
///
/// A proposal outside the prior's support is redrawn around the same parent.
pub fn perturb_batch(
    samples: &SampleSet,
    weights: &[f64],
    tau: &[f64],
    prior: &PriorSampler,
    rng: &mut RngHandle,
    batch_size: usize,
) -> Result<ParameterBatch, SeirError> {
    if samples.is_empty() || weights.len() != samples.len() {
        return Err(SeirError::Sampling(
            ErrorInfo::new("resample-shape", "weights do not match the sample set")
                .with_context("samples", samples.len())
                .with_context("weights", weights.len()),
        ));
    }
    let kernels = tau
        .iter()
        .enumerate()
        .map(|(k, t)| {
            Normal::new(0.0, *t).map_err(|err| {
                SeirError::Sampling(
                    ErrorInfo::new("bandwidth", err.to_string())
                        .with_context("column", k)
                        .with_context("tau", t),
                )
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let cumulative = cumulative_weights(weights);
    let last = samples.len() - 1;

    let mut batch = Vec::with_capacity(batch_size);
    for row in 0..batch_size {
        let u: f64 = rng.gen();
        let parent = &samples.params[cumulative.partition_point(|c| *c <= u).min(last)];

        let mut attempts = 0;
        let proposal = loop {
            if attempts == MAX_PROPOSAL_ATTEMPTS {
                return Err(SeirError::Sampling(
                    ErrorInfo::new("proposal-exhausted", "no proposal inside the prior support")
                        .with_context("row", row)
                        .with_context("attempts", attempts)
                        .with_hint("widen the priors or check the accepted particles"),
                ));
            }
            attempts += 1;
            let candidate: Vec<f64> = parent
                .iter()
                .zip(&kernels)
                .map(|(value, kernel)| value + kernel.sample(rng))
                .collect();
            if prior.is_supported(&candidate) {
                break candidate;
            }
        };
        batch.push(proposal);
    }
    Ok(batch)
}
