use log::warn;
use rand::Rng;
use rand_distr::{Distribution, Gamma as GammaSampler, StandardNormal};
use seir_core::{ErrorInfo, GammaPrior, ModelComponents, ParameterLayout, RngHandle, SeirError};
use statrs::distribution::{Beta, Continuous, Gamma, Normal};

use crate::merge::ParameterBatch;

/// Attempts per row at drawing spatial weights whose sum stays at or below one.
pub const RHO_ATTEMPTS: usize = 100;

#[derive(Debug, Clone)]
struct CoefficientPrior {
    mean: f64,
    precision: f64,
    density: Normal,
}

impl CoefficientPrior {
    fn new(block: &str, index: usize, mean: f64, precision: f64) -> Result<Self, SeirError> {
        let density = Normal::new(mean, 1.0 / precision).map_err(|err| {
            SeirError::Config(
                ErrorInfo::new("coefficient-prior", err.to_string())
                    .with_context("block", block)
                    .with_context("index", index)
                    .with_context("precision", precision),
            )
        })?;
        Ok(Self {
            mean,
            precision,
            density,
        })
    }

    fn draw(&self, rng: &mut RngHandle) -> f64 {
        let z: f64 = rng.sample(StandardNormal);
        self.mean + z / self.precision
    }
}

#[derive(Debug, Clone)]
struct RatePrior {
    sampler: GammaSampler<f64>,
    density: Gamma,
}

impl RatePrior {
    fn new(label: &str, shape: f64, rate: f64) -> Result<Self, SeirError> {
        let invalid = |message: String| {
            SeirError::Config(
                ErrorInfo::new("rate-prior", message)
                    .with_context("prior", label)
                    .with_context("shape", shape)
                    .with_context("rate", rate),
            )
        };
        let sampler = GammaSampler::new(shape, 1.0 / rate).map_err(|err| invalid(err.to_string()))?;
        let density = Gamma::new(shape, rate).map_err(|err| invalid(err.to_string()))?;
        Ok(Self { sampler, density })
    }

    fn from_prior(label: &str, prior: &GammaPrior) -> Result<Self, SeirError> {
        Self::new(label, prior.shape, prior.rate)
    }

    fn ln_density(&self, x: f64) -> f64 {
        if x < 0.0 {
            return f64::NEG_INFINITY;
        }
        self.density.ln_pdf(x)
    }
}

#[derive(Debug, Clone)]
struct SpatialPrior {
    sampler: GammaSampler<f64>,
    density: Beta,
}

impl SpatialPrior {
    fn ln_density(&self, x: f64) -> f64 {
        if !(0.0..=1.0).contains(&x) {
            return f64::NEG_INFINITY;
        }
        self.density.ln_pdf(x)
    }
}

/// Draws candidate parameter rows from the configured priors and evaluates
/// the joint prior density of a row.
#[derive(Debug, Clone)]
pub struct PriorSampler {
    layout: ParameterLayout,
    beta: Vec<CoefficientPrior>,
    beta_rs: Vec<CoefficientPrior>,
    rho: Option<SpatialPrior>,
    gamma_ei: RatePrior,
    gamma_ir: RatePrior,
}

impl PriorSampler {
    /// Builds the per-block distributions once for a validated model.
    pub fn new(components: &ModelComponents, layout: ParameterLayout) -> Result<Self, SeirError> {
        let exposure = &components.exposure;
        let beta = exposure
            .beta_prior_mean
            .iter()
            .zip(&exposure.beta_prior_precision)
            .enumerate()
            .map(|(i, (mean, precision))| CoefficientPrior::new("beta", i, *mean, *precision))
            .collect::<Result<Vec<_>, _>>()?;

        let reinfection = &components.reinfection;
        let beta_rs = reinfection
            .beta_prior_mean
            .iter()
            .zip(&reinfection.beta_prior_precision)
            .take(layout.n_beta_rs)
            .enumerate()
            .map(|(i, (mean, precision))| CoefficientPrior::new("beta_rs", i, *mean, *precision))
            .collect::<Result<Vec<_>, _>>()?;
        if beta_rs.len() != layout.n_beta_rs || beta.len() != layout.n_beta {
            return Err(SeirError::Config(
                ErrorInfo::new("prior-length", "coefficient priors do not cover the layout")
                    .with_context("n_beta", layout.n_beta)
                    .with_context("n_beta_rs", layout.n_beta_rs),
            ));
        }

        let rho = if layout.n_rho > 0 {
            let (shape, rate) = components.distance.spatial_prior;
            let invalid = |err: String| {
                SeirError::Config(
                    ErrorInfo::new("spatial-prior", err)
                        .with_context("shape", shape)
                        .with_context("rate", rate),
                )
            };
            Some(SpatialPrior {
                sampler: GammaSampler::new(shape, 1.0 / rate)
                    .map_err(|err| invalid(err.to_string()))?,
                density: Beta::new(shape, rate).map_err(|err| invalid(err.to_string()))?,
            })
        } else {
            None
        };

        Ok(Self {
            layout,
            beta,
            beta_rs,
            rho,
            gamma_ei: RatePrior::from_prior("gamma_ei", &components.transition.gamma_ei)?,
            gamma_ir: RatePrior::from_prior("gamma_ir", &components.transition.gamma_ir)?,
        })
    }

    /// Layout of the rows this sampler produces.
    pub fn layout(&self) -> &ParameterLayout {
        &self.layout
    }

    /// Draws `batch_size` rows from the prior.
    ///
    /// Draw order is fixed for reproducibility: per row the exposure betas
    /// and both transition rates, then the reinfection betas of every row,
    /// then the spatial weights of every row.
    pub fn draw_batch(&self, rng: &mut RngHandle, batch_size: usize) -> ParameterBatch {
        let layout = &self.layout;
        let mut batch = vec![vec![0.0; layout.len()]; batch_size];

        for row in batch.iter_mut() {
            for (column, prior) in layout.beta_range().zip(&self.beta) {
                row[column] = prior.draw(rng);
            }
            row[layout.gamma_ei_index()] = self.gamma_ei.sampler.sample(rng);
            row[layout.gamma_ir_index()] = self.gamma_ir.sampler.sample(rng);
        }

        if !self.beta_rs.is_empty() {
            for row in batch.iter_mut() {
                for (column, prior) in layout.beta_rs_range().zip(&self.beta_rs) {
                    row[column] = prior.draw(rng);
                }
            }
        }

        if let Some(rho) = &self.rho {
            for (index, row) in batch.iter_mut().enumerate() {
                let mut total = f64::INFINITY;
                let mut attempts = 0;
                while total > 1.0 && attempts < RHO_ATTEMPTS {
                    total = 0.0;
                    for column in layout.rho_range() {
                        row[column] = rho.sampler.sample(rng);
                        total += row[column];
                    }
                    attempts += 1;
                }
                if total > 1.0 {
                    warn!(
                        "no valid spatial weights for row {index} after {RHO_ATTEMPTS} attempts (sum {total:.4})"
                    );
                }
            }
        }

        batch
    }

    /// Log of the unnormalised joint prior density.
    ///
    /// Rows of the wrong length, spatial weights summing above one and values
    /// outside a block's support all map to negative infinity.
    pub fn log_density(&self, row: &[f64]) -> f64 {
        let layout = &self.layout;
        if row.len() != layout.len() {
            return f64::NEG_INFINITY;
        }

        let mut total = 0.0;
        for (x, prior) in row[layout.beta_range()].iter().zip(&self.beta) {
            total += prior.density.ln_pdf(*x);
        }
        for (x, prior) in row[layout.beta_rs_range()].iter().zip(&self.beta_rs) {
            total += prior.density.ln_pdf(*x);
        }
        if let Some(rho) = &self.rho {
            let mut constraint = 0.0;
            for x in &row[layout.rho_range()] {
                constraint += x;
                total += rho.ln_density(*x);
            }
            if constraint > 1.0 {
                return f64::NEG_INFINITY;
            }
        }
        total += self.gamma_ei.ln_density(row[layout.gamma_ei_index()]);
        total += self.gamma_ir.ln_density(row[layout.gamma_ir_index()]);

        if total.is_nan() {
            f64::NEG_INFINITY
        } else {
            total
        }
    }

    /// Whether `row` lies inside the support of the prior.
    pub fn is_supported(&self, row: &[f64]) -> bool {
        self.log_density(row) > f64::NEG_INFINITY
    }

    /// Unnormalised joint prior density; zero marks an impossible row.
    ///
    /// Supported rows deep in the tail are clamped to `f64::MIN_POSITIVE`
    /// rather than underflowing to zero.
    pub fn density(&self, row: &[f64]) -> f64 {
        let log_density = self.log_density(row);
        if log_density == f64::NEG_INFINITY {
            0.0
        } else {
            log_density.exp().max(f64::MIN_POSITIVE)
        }
    }
}
