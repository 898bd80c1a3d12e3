//! Weighted random selection over a static set of entries.

use kobra_core::{CoreError, CoreResult};
use rand::Rng;

/// Cumulative-weight distribution built once and sampled many times.
///
/// Entry `i` is picked with probability `weight_i / total`.
#[derive(Debug, Clone)]
pub struct WeightedSelector {
    cumulative: Vec<u64>,
    total: u64,
}

impl WeightedSelector {
    /// Builds the distribution.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidRegistry` for an empty set or a zero weight.
    pub fn new<I>(weights: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = u32>,
    {
        let mut cumulative = Vec::new();
        let mut total = 0u64;

        for (index, weight) in weights.into_iter().enumerate() {
            if weight == 0 {
                return Err(CoreError::invalid_registry(format!(
                    "entry {index} has zero weight"
                )));
            }
            total += u64::from(weight);
            cumulative.push(total);
        }

        if cumulative.is_empty() {
            return Err(CoreError::invalid_registry("no entries to select from"));
        }

        Ok(Self { cumulative, total })
    }

    /// Draws an index.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let roll = rng.gen_range(0..self.total);
        self.cumulative.partition_point(|&bound| bound <= roll)
    }

    /// Expected selection probability of entry `index`.
    pub fn probability(&self, index: usize) -> f64 {
        let upper = self.cumulative[index];
        let lower = if index == 0 { 0 } else { self.cumulative[index - 1] };
        (upper - lower) as f64 / self.total as f64
    }

    pub fn total_weight(&self) -> u64 {
        self.total
    }

    pub fn len(&self) -> usize {
        self.cumulative.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cumulative.is_empty()
    }
}
