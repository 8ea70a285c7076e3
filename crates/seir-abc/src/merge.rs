use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use seir_core::{ErrorInfo, SeirError};

use crate::report::lenient_f64;

/// One candidate parameter vector.
pub type ParameterRow = Vec<f64>;

/// Candidate rows simulated in one dispatch round.
pub type ParameterBatch = Vec<ParameterRow>;

/// Index-aligned distances and parameter rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSet {
    /// Distance of each row; sorted ascending after a basic merge.
    #[serde(with = "lenient_f64::vec")]
    pub results: Vec<f64>,
    /// Parameter rows.
    pub params: Vec<ParameterRow>,
}

impl SampleSet {
    /// Pairs distances with rows, rejecting misaligned inputs.
    pub fn new(results: Vec<f64>, params: Vec<ParameterRow>) -> Result<Self, SeirError> {
        if results.len() != params.len() {
            return Err(SeirError::Config(
                ErrorInfo::new("sample-alignment", "results and params differ in length")
                    .with_context("results", results.len())
                    .with_context("params", params.len()),
            ));
        }
        Ok(Self { results, params })
    }

    /// Placeholder set of `size` rows at infinite distance, replaced by the
    /// first merge.
    pub fn unfilled(size: usize, width: usize) -> Self {
        Self {
            results: vec![f64::INFINITY; size],
            params: vec![vec![0.0; width]; size],
        }
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether the set holds no samples.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Values of parameter column `k` across all rows.
    pub fn column(&self, k: usize) -> Vec<f64> {
        self.params.iter().map(|row| row[k]).collect()
    }
}

/// Acceptance bounds tracked for the life of a fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToleranceState {
    /// Acceptance threshold for SMC rounds.
    #[serde(with = "lenient_f64")]
    pub current_eps: f64,
    /// Smallest accepted distance.
    #[serde(with = "lenient_f64")]
    pub min_eps: f64,
    /// Largest accepted distance.
    #[serde(with = "lenient_f64")]
    pub max_eps: f64,
    /// Share of the last basic merge taken from the incoming batch.
    pub update_fraction: f64,
}

impl Default for ToleranceState {
    fn default() -> Self {
        Self {
            current_eps: f64::INFINITY,
            min_eps: 0.0,
            max_eps: 0.0,
            update_fraction: 0.0,
        }
    }
}

fn sort_order(values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|a, b| values[*a].total_cmp(&values[*b]));
    order
}

/// Top-N merge of the accepted set with a freshly simulated batch.
///
/// Walks the ascending orders of both inputs and fills exactly
/// `current.len()` slots. On equal heads the incoming element is taken.
/// Updates the tolerance bounds and the update fraction.
pub fn combine_basic(
    current: &SampleSet,
    incoming: &SampleSet,
    tolerance: &mut ToleranceState,
) -> SampleSet {
    let size = current.len();
    let current_order = sort_order(&current.results);
    let incoming_order = sort_order(&incoming.results);
    let mut current_heads = current_order.iter().peekable();
    let mut incoming_heads = incoming_order.iter().peekable();

    let mut results = Vec::with_capacity(size);
    let mut params = Vec::with_capacity(size);
    let mut taken_incoming = 0usize;

    while results.len() < size {
        let take_incoming = match (current_heads.peek(), incoming_heads.peek()) {
            (Some(&&c), Some(&&i)) => {
                incoming.results[i].total_cmp(&current.results[c]) != Ordering::Greater
            }
            (None, Some(_)) => true,
            (_, None) => false,
        };
        let (source, index) = if take_incoming {
            taken_incoming += 1;
            (incoming, incoming_heads.next())
        } else {
            (current, current_heads.next())
        };
        let Some(&index) = index else { break };
        results.push(source.results[index]);
        params.push(source.params[index].clone());
    }

    if let (Some(first), Some(last)) = (results.first(), results.last()) {
        tolerance.min_eps = *first;
        tolerance.max_eps = *last;
        tolerance.current_eps = *last;
    }
    tolerance.update_fraction = if size == 0 {
        0.0
    } else {
        taken_incoming as f64 / size as f64
    };

    SampleSet { results, params }
}

/// Rows accepted so far in the SMC generation under construction.
///
/// The accumulator persists across rounds until it reaches the target size.
#[derive(Debug, Clone, PartialEq)]
pub struct SmcAccumulator {
    target: usize,
    results: Vec<f64>,
    params: Vec<ParameterRow>,
}

impl SmcAccumulator {
    /// Empty accumulator for a generation of `target` particles.
    pub fn new(target: usize) -> Self {
        Self {
            target,
            results: Vec::with_capacity(target),
            params: Vec::with_capacity(target),
        }
    }

    /// Rows accepted so far.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether no row has been accepted yet.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Scans `incoming` in batch order, keeping rows strictly below the
    /// current tolerance until the generation is full.
    ///
    /// Returns the completed generation, after shrinking the tolerance, or
    /// `None` when the batch did not fill it.
    pub fn absorb(
        &mut self,
        incoming: &SampleSet,
        tolerance: &mut ToleranceState,
        shrinkage: f64,
    ) -> Option<SampleSet> {
        for (result, row) in incoming.results.iter().zip(&incoming.params) {
            if self.results.len() >= self.target {
                break;
            }
            if *result < tolerance.current_eps {
                self.results.push(*result);
                self.params.push(row.clone());
            }
        }

        if self.results.len() < self.target {
            return None;
        }

        let results = std::mem::take(&mut self.results);
        let params = std::mem::take(&mut self.params);
        tolerance.min_eps = results.iter().copied().fold(f64::INFINITY, f64::min);
        tolerance.max_eps = results.iter().copied().fold(0.0, f64::max);
        tolerance.current_eps *= shrinkage;
        Some(SampleSet { results, params })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(results: &[f64]) -> SampleSet {
        SampleSet {
            results: results.to_vec(),
            params: results.iter().map(|r| vec![*r]).collect(),
        }
    }

    #[test]
    fn ties_prefer_incoming() {
        let mut tolerance = ToleranceState::default();
        let merged = combine_basic(&set(&[1.0, 2.0]), &set(&[1.0, 5.0]), &mut tolerance);
        assert_eq!(merged.results, vec![1.0, 1.0]);
        assert_eq!(tolerance.update_fraction, 0.5);
    }

    #[test]
    fn short_incoming_batch_falls_back_to_current() {
        let mut tolerance = ToleranceState::default();
        let merged = combine_basic(&set(&[2.0, 3.0, 4.0]), &set(&[0.1]), &mut tolerance);
        assert_eq!(merged.results, vec![0.1, 2.0, 3.0]);
        assert_eq!(merged.params[0], vec![0.1]);
    }

    #[test]
    fn accumulator_persists_until_full() {
        let mut tolerance = ToleranceState {
            current_eps: 1.0,
            ..ToleranceState::default()
        };
        let mut acc = SmcAccumulator::new(3);
        assert!(acc.absorb(&set(&[0.5, 2.0, 0.7]), &mut tolerance, 0.5).is_none());
        assert_eq!(acc.len(), 2);
        let done = acc.absorb(&set(&[1.0, 0.2, 0.1]), &mut tolerance, 0.5).unwrap();
        assert_eq!(done.results, vec![0.5, 0.7, 0.2]);
        assert_eq!(tolerance.current_eps, 0.5);
        assert_eq!(tolerance.min_eps, 0.2);
        assert_eq!(tolerance.max_eps, 0.7);
        assert!(acc.is_empty());
    }
}
