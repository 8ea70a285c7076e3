use log::warn;
use rayon::prelude::*;

use crate::merge::SampleSet;
use crate::prior::PriorSampler;

fn log_sum_exp(terms: impl Iterator<Item = f64> + Clone) -> f64 {
    let max = terms.clone().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + terms.map(|t| (t - max).exp()).sum::<f64>().ln()
}

/// Normalises log weights to sum to one, falling back to uniform weights
/// when none is finite.
pub fn normalise_log_weights(log_weights: &[f64]) -> Vec<f64> {
    let n = log_weights.len();
    let max = log_weights
        .iter()
        .copied()
        .filter(|w| w.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    let raw: Vec<f64> = log_weights
        .iter()
        .map(|w| if w.is_finite() { (w - max).exp() } else { 0.0 })
        .collect();
    let total: f64 = raw.iter().sum();
    if !(total.is_finite() && total > 0.0) {
        warn!("all {n} importance weights are degenerate, using uniform weights");
        return vec![1.0 / n as f64; n];
    }
    raw.into_iter().map(|w| w / total).collect()
}

/// Importance weights of `current` against the mixture kernel centred on the
/// weighted `previous` generation.
///
/// For particle `i` the kernel denominator is
/// `sum_j w_j * prod_k exp(((x_ik - y_jk / 2) / tau_k)^2) * prod_k 1 / tau_k`
/// and the new weight is `prior(x_i) / denominator_i`, normalised over all
/// particles. Everything is evaluated in log space.
pub fn reweight(
    current: &SampleSet,
    previous: &SampleSet,
    weights: &[f64],
    tau: &[f64],
    prior: &PriorSampler,
) -> Vec<f64> {
    let log_tau_norm: f64 = -tau.iter().map(|t| t.ln()).sum::<f64>();
    let log_previous: Vec<f64> = weights.iter().map(|w| w.ln()).collect();

    let log_weights: Vec<f64> = current
        .params
        .par_iter()
        .map(|x| {
            let terms = previous.params.iter().zip(&log_previous).map(|(y, log_w)| {
                if *log_w == f64::NEG_INFINITY {
                    return f64::NEG_INFINITY;
                }
                let exponent: f64 = x
                    .iter()
                    .zip(y)
                    .zip(tau)
                    .map(|((xk, yk), tk)| ((xk - yk / 2.0) / tk).powi(2))
                    .sum();
                log_w + exponent
            });
            let log_denominator = log_sum_exp(terms) + log_tau_norm;
            prior.log_density(x) - log_denominator
        })
        .collect();

    normalise_log_weights(&log_weights)
}
