//! Sampling adapter between engine logits and token selection
//!
//! Each generation step builds a full-vocabulary candidate view from the
//! engine's raw logits, applies the configured policy, and returns one token
//! id. Selection randomness is a pure function of (seed, position): the draw
//! for position p is always the same value, so a run restored from a
//! checkpoint replays the identical stream without any sampler-side mutable
//! state to save.

use serde::{Deserialize, Serialize};

use crate::error::{ReanudarError, Result};

/// One vocabulary entry in a sampling step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// Token id, equal to the vocabulary index it was built from
    pub id: u32,
    /// Raw logit reported by the engine
    pub logit: f32,
    /// Probability, zero until a policy normalizes the set
    pub prob: f32,
}

/// Full-vocabulary candidate view for one sampling step
///
/// Built fresh from the logits every step and consumed immediately; never
/// persisted. Construction preserves vocabulary order, which doubles as the
/// stable tie-break for equal logits.
#[derive(Debug, Clone)]
pub struct CandidateSet {
    /// Candidates, one per vocabulary entry
    data: Vec<Candidate>,
    /// Whether a policy has reordered the candidates
    sorted: bool,
}

impl CandidateSet {
    /// Build one candidate per vocabulary entry from raw logits
    #[must_use]
    pub fn from_logits(logits: &[f32]) -> Self {
        let data = logits
            .iter()
            .enumerate()
            .map(|(i, &logit)| Candidate {
                id: i as u32,
                logit,
                prob: 0.0,
            })
            .collect();
        Self {
            data,
            sorted: false,
        }
    }

    /// Number of candidates
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the set has no candidates
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Candidates in their current order
    #[must_use]
    pub fn candidates(&self) -> &[Candidate] {
        &self.data
    }

    /// Whether a policy has reordered the candidates
    #[must_use]
    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    /// Highest-logit candidate id, earliest entry winning ties
    ///
    /// On an unsorted set the earliest entry is the lowest id, so ties
    /// resolve in vocabulary order.
    #[must_use]
    pub fn argmax(&self) -> Option<u32> {
        let mut best = *self.data.first()?;
        for &c in &self.data[1..] {
            if c.logit > best.logit {
                best = c;
            }
        }
        Some(best.id)
    }

    /// Divide all logits by `temperature`
    ///
    /// Non-positive temperatures leave the set untouched; that range is the
    /// greedy path and never reaches the distribution machinery.
    pub fn apply_temperature(&mut self, temperature: f32) {
        if temperature <= 0.0 {
            return;
        }
        let inv = 1.0 / temperature;
        for c in &mut self.data {
            c.logit *= inv;
        }
    }

    /// Sort candidates by logit, highest first
    ///
    /// The sort is stable, so equal logits keep vocabulary order.
    pub fn sort_by_logit(&mut self) {
        self.data
            .sort_by(|a, b| b.logit.partial_cmp(&a.logit).unwrap_or(std::cmp::Ordering::Equal));
        self.sorted = true;
    }

    /// Keep only the first `k` candidates (no-op when `k` is 0 or covers the set)
    pub fn truncate(&mut self, k: usize) {
        if k > 0 && k < self.data.len() {
            self.data.truncate(k);
        }
    }

    /// Fill probabilities with a max-subtracted softmax over the logits
    pub fn softmax(&mut self) {
        let max_logit = self
            .data
            .iter()
            .map(|c| c.logit)
            .fold(f32::NEG_INFINITY, f32::max);
        let mut sum = 0.0;
        for c in &mut self.data {
            c.prob = (c.logit - max_logit).exp();
            sum += c.prob;
        }
        if sum > 0.0 {
            for c in &mut self.data {
                c.prob /= sum;
            }
        }
    }

    /// Draw a candidate id from the filled probabilities
    ///
    /// `rng_value` must be in `[0, 1)`. Falls back to the last candidate if
    /// rounding leaves the cumulative sum short of 1.
    #[must_use]
    pub fn sample(&self, rng_value: f32) -> u32 {
        let mut cumulative = 0.0;
        for c in &self.data {
            cumulative += c.prob;
            if rng_value < cumulative {
                return c.id;
            }
        }
        self.data.last().map_or(0, |c| c.id)
    }
}

/// Token selection policy
///
/// Temperature 0 and top-k 1 both degenerate to greedy argmax. The seed
/// feeds the per-position draw stream; it is configuration, not state, and
/// must match between a checkpoint and the run restored from it.
///
/// # Example
///
/// ```
/// use reanudar::SamplerConfig;
///
/// let greedy = SamplerConfig::greedy();
/// let sampled = SamplerConfig::top_k(40, 0.8).with_seed(7);
/// assert!(greedy.is_greedy());
/// assert!(!sampled.is_greedy());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Sampling temperature; 0.0 selects greedily
    pub temperature: f32,
    /// Keep only the k highest logits before sampling; 0 keeps all
    pub top_k: usize,
    /// Seed for the per-position draw stream
    pub seed: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self::greedy()
    }
}

impl SamplerConfig {
    /// Deterministic argmax selection
    #[must_use]
    pub fn greedy() -> Self {
        Self {
            temperature: 0.0,
            top_k: 0,
            seed: 42,
        }
    }

    /// Temperature sampling over the full vocabulary
    #[must_use]
    pub fn temperature(temperature: f32) -> Self {
        Self {
            temperature,
            top_k: 0,
            seed: 42,
        }
    }

    /// Top-k sampling at the given temperature
    #[must_use]
    pub fn top_k(top_k: usize, temperature: f32) -> Self {
        Self {
            temperature,
            top_k,
            seed: 42,
        }
    }

    /// Set the draw-stream seed
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Whether this policy ignores the draw stream entirely
    #[must_use]
    pub fn is_greedy(&self) -> bool {
        self.temperature <= 0.0 || self.top_k == 1
    }

    /// Select the next token for the step at `position`
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the candidate set is empty.
    pub fn select(&self, candidates: &mut CandidateSet, position: usize) -> Result<u32> {
        let argmax = candidates.argmax().ok_or_else(|| {
            ReanudarError::InvalidConfiguration(
                "cannot select from an empty candidate set".to_string(),
            )
        })?;

        if self.is_greedy() {
            return Ok(argmax);
        }

        candidates.apply_temperature(self.temperature);
        if self.top_k > 0 && self.top_k < candidates.len() {
            candidates.sort_by_logit();
            candidates.truncate(self.top_k);
        }
        candidates.softmax();

        let rng_value = position_draw(self.seed, position as u64);
        Ok(candidates.sample(rng_value))
    }
}

/// Deterministic draw in `[0, 1)` for a generation position
///
/// SplitMix-style bit mixing over the (seed, position) pair. The same pair
/// always yields the same value, which is what makes a restored run replay
/// its draw stream exactly.
#[must_use]
pub fn position_draw(seed: u64, position: u64) -> f32 {
    let mut z = seed ^ position.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;
    #[allow(clippy::cast_precision_loss)]
    let value = (z >> 33) as f32 / (1u64 << 31) as f32;
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // ========================================================================
    // Candidate construction
    // ========================================================================

    #[test]
    fn test_from_logits_ids_match_index() {
        let set = CandidateSet::from_logits(&[0.5, -1.0, 2.0]);
        assert_eq!(set.len(), 3);
        assert!(!set.is_sorted());
        for (i, c) in set.candidates().iter().enumerate() {
            assert_eq!(c.id, i as u32);
            assert!((c.prob - 0.0).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn test_from_logits_preserves_values() {
        let logits = [1.5, -0.25, 0.0];
        let set = CandidateSet::from_logits(&logits);
        for (c, &logit) in set.candidates().iter().zip(logits.iter()) {
            assert!((c.logit - logit).abs() < 1e-6);
        }
    }

    // ========================================================================
    // Greedy selection
    // ========================================================================

    #[test]
    fn test_greedy_picks_max_logit() {
        let mut set = CandidateSet::from_logits(&[0.1, 3.0, 0.2]);
        let token = SamplerConfig::greedy().select(&mut set, 0).unwrap();
        assert_eq!(token, 1);
    }

    #[test]
    fn test_greedy_tie_breaks_to_lowest_id() {
        let mut set = CandidateSet::from_logits(&[1.0, 2.0, 2.0, 2.0]);
        let token = SamplerConfig::greedy().select(&mut set, 5).unwrap();
        assert_eq!(token, 1);
    }

    #[test]
    fn test_zero_temperature_is_greedy() {
        assert!(SamplerConfig::temperature(0.0).is_greedy());
    }

    #[test]
    fn test_top_k_one_is_greedy() {
        let config = SamplerConfig::top_k(1, 0.9);
        assert!(config.is_greedy());

        let mut set = CandidateSet::from_logits(&[0.0, 5.0, 1.0]);
        assert_eq!(config.select(&mut set, 3).unwrap(), 1);
    }

    #[test]
    fn test_select_errors_on_empty_set() {
        let mut set = CandidateSet::from_logits(&[]);
        let result = SamplerConfig::greedy().select(&mut set, 0);
        assert!(matches!(
            result,
            Err(ReanudarError::InvalidConfiguration(_))
        ));
    }

    // ========================================================================
    // Distribution machinery
    // ========================================================================

    #[test]
    fn test_softmax_sums_to_one() {
        let mut set = CandidateSet::from_logits(&[1.0, 2.0, 3.0, 4.0]);
        set.softmax();
        let sum: f32 = set.candidates().iter().map(|c| c.prob).sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_sort_sets_flag_and_orders_descending() {
        let mut set = CandidateSet::from_logits(&[0.5, 2.0, 1.0]);
        set.sort_by_logit();
        assert!(set.is_sorted());
        let ids: Vec<u32> = set.candidates().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2, 0]);
    }

    #[test]
    fn test_truncate_zero_keeps_all() {
        let mut set = CandidateSet::from_logits(&[0.1, 0.2, 0.3]);
        set.truncate(0);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_top_k_selection_stays_in_top_candidates() {
        // Token 7 and 2 carry almost all the mass after top-k truncation
        let mut logits = vec![0.0f32; 10];
        logits[7] = 8.0;
        logits[2] = 7.5;
        let mut set = CandidateSet::from_logits(&logits);
        let token = SamplerConfig::top_k(2, 1.0).select(&mut set, 11).unwrap();
        assert!(token == 7 || token == 2);
    }

    // ========================================================================
    // Draw stream
    // ========================================================================

    #[test]
    fn test_position_draw_is_pure() {
        let a = position_draw(42, 19);
        let b = position_draw(42, 19);
        assert!((a - b).abs() < f32::EPSILON);
    }

    #[test]
    fn test_position_draw_varies_with_position() {
        let a = position_draw(42, 0);
        let b = position_draw(42, 1);
        assert!((a - b).abs() > f32::EPSILON);
    }

    #[test]
    fn test_select_deterministic_for_same_position() {
        let logits: Vec<f32> = (0..50).map(|i| (i as f32 * 0.37).sin()).collect();
        let config = SamplerConfig::temperature(0.9).with_seed(42);

        let mut first = CandidateSet::from_logits(&logits);
        let mut second = CandidateSet::from_logits(&logits);
        let a = config.select(&mut first, 23).unwrap();
        let b = config.select(&mut second, 23).unwrap();
        assert_eq!(a, b);
    }

    proptest! {
        #[test]
        fn prop_draw_in_unit_interval(seed in any::<u64>(), position in any::<u64>()) {
            let value = position_draw(seed, position);
            prop_assert!((0.0..1.0).contains(&value));
        }

        #[test]
        fn prop_selected_token_in_vocab(
            logits in proptest::collection::vec(-10.0f32..10.0, 1..128),
            temperature in 0.0f32..2.0,
            top_k in 0usize..16,
            position in 0usize..4096,
        ) {
            let config = SamplerConfig {
                temperature,
                top_k,
                seed: 42,
            };
            let mut set = CandidateSet::from_logits(&logits);
            let token = config.select(&mut set, position).unwrap();
            prop_assert!((token as usize) < logits.len());
        }
    }
}
