//! Typed descriptor of the flat parameter vector.
//!
//! Rows are laid out as `[beta, beta_rs, rho, gamma_ei, gamma_ir]`. The
//! descriptor is computed once per model and passed to every reader and
//! writer of a row.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, SeirError};
use crate::model::ModelComponents;

/// Block sizes of a parameter row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParameterLayout {
    /// Exposure coefficients.
    pub n_beta: usize,
    /// Reinfection coefficients, zero unless reinfection is estimated.
    pub n_beta_rs: usize,
    /// Spatial weights, zero unless the data covers more than one location.
    pub n_rho: usize,
}

impl ParameterLayout {
    /// Builds a layout from explicit block sizes.
    pub fn new(n_beta: usize, n_beta_rs: usize, n_rho: usize) -> Self {
        Self {
            n_beta,
            n_beta_rs,
            n_rho,
        }
    }

    /// Derives the layout from validated components.
    pub fn from_components(components: &ModelComponents) -> Self {
        let n_beta_rs = if components.reinfection.is_estimated() {
            components.reinfection.x_rs.ncols()
        } else {
            0
        };
        let n_rho = if components.has_spatial() {
            components.distance.matrices.len()
        } else {
            0
        };
        Self::new(components.exposure.n_beta(), n_beta_rs, n_rho)
    }

    /// Exposure coefficient columns.
    pub fn beta_range(&self) -> Range<usize> {
        0..self.n_beta
    }

    /// Reinfection coefficient columns.
    pub fn beta_rs_range(&self) -> Range<usize> {
        self.n_beta..self.n_beta + self.n_beta_rs
    }

    /// Spatial weight columns.
    pub fn rho_range(&self) -> Range<usize> {
        let start = self.n_beta + self.n_beta_rs;
        start..start + self.n_rho
    }

    /// Column of the E to I rate.
    pub fn gamma_ei_index(&self) -> usize {
        self.n_beta + self.n_beta_rs + self.n_rho
    }

    /// Column of the I to R rate.
    pub fn gamma_ir_index(&self) -> usize {
        self.gamma_ei_index() + 1
    }

    /// Total row length.
    pub fn len(&self) -> usize {
        self.gamma_ir_index() + 1
    }

    /// Always `false`; a row holds at least the two transition rates.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Column labels in row order.
    pub fn column_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.len());
        names.extend(self.beta_range().map(|i| format!("beta_{i}")));
        names.extend((0..self.n_beta_rs).map(|i| format!("beta_rs_{i}")));
        names.extend((0..self.n_rho).map(|i| format!("rho_{i}")));
        names.push("gamma_ei".to_string());
        names.push("gamma_ir".to_string());
        names
    }

    /// Rejects a row whose length does not match the layout.
    pub fn check_row(&self, row: &[f64], index: usize) -> Result<(), SeirError> {
        if row.len() != self.len() {
            return Err(SeirError::Config(
                ErrorInfo::new("row-length", "parameter row does not match the layout")
                    .with_context("row", index)
                    .with_context("expected", self.len())
                    .with_context("found", row.len()),
            ));
        }
        Ok(())
    }
}
