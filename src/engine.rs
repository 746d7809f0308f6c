//! Engine handle contract
//!
//! [`TokenEngine`] is the boundary between this crate and a concrete
//! token-generation engine: evaluate tokens, read logits, and move the
//! complete mutable state in and out as an opaque byte buffer. The snapshot
//! codec and the continuation harness are written against this trait only.
//!
//! Creation and destruction stay concrete: engines are built from an
//! [`EngineConfig`] by their own constructors and torn down by `Drop`. The
//! harness takes a factory closure so the checkpoint producer and consumer
//! are created identically.

use serde::{Deserialize, Serialize};

use crate::error::{ReanudarError, Result};

/// Configuration shared by a snapshot producer and its consumer
///
/// Seed and context length are configuration, not state: a snapshot captured
/// under one configuration only restores into an engine created with the
/// same values. Changing the context length changes the required state size,
/// which is how drift gets caught at restore time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of cache positions the engine can fill
    pub context_length: usize,
    /// Vocabulary size
    pub vocab_size: usize,
    /// Hidden dimension of the token mixing layers
    pub hidden_dim: usize,
    /// Number of attention layers
    pub num_layers: usize,
    /// Seed for procedural weight derivation
    pub seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            context_length: 512,
            vocab_size: 256,
            hidden_dim: 48,
            num_layers: 2,
            seed: 42,
        }
    }
}

impl EngineConfig {
    /// Set the context length
    #[must_use]
    pub fn with_context_length(mut self, context_length: usize) -> Self {
        self.context_length = context_length;
        self
    }

    /// Set the weight-derivation seed
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Reject configurations no engine can be built from
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if any dimension is zero.
    pub fn validate(&self) -> Result<()> {
        if self.context_length == 0 {
            return Err(ReanudarError::InvalidConfiguration(
                "context_length must be > 0".to_string(),
            ));
        }
        if self.vocab_size == 0 {
            return Err(ReanudarError::InvalidConfiguration(
                "vocab_size must be > 0".to_string(),
            ));
        }
        if self.hidden_dim == 0 {
            return Err(ReanudarError::InvalidConfiguration(
                "hidden_dim must be > 0".to_string(),
            ));
        }
        if self.num_layers == 0 {
            return Err(ReanudarError::InvalidConfiguration(
                "num_layers must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Contract for engines whose complete mutable state can move as bytes
///
/// Implementations must make the state bytes exhaustive: cache contents,
/// internal position bookkeeping, the current logits, and any pseudo-random
/// generator state the engine itself consumes. Anything left out diverges
/// silently after a restore instead of failing loudly.
pub trait TokenEngine {
    /// Number of cache positions the engine can fill
    fn context_length(&self) -> usize;

    /// Vocabulary size; also the length of the logits slice
    fn vocab_size(&self) -> usize;

    /// Exact byte length that capture and restore operate on
    ///
    /// A pure function of the engine's configuration, never of how many
    /// tokens have been generated. Two engines built from the same
    /// configuration report the same value for their whole lifetime.
    fn state_size(&self) -> usize;

    /// Serialize all mutable state into `buf`
    ///
    /// # Errors
    ///
    /// Returns `SizeMismatch` when `buf` is not exactly `state_size` bytes.
    fn capture_state(&self, buf: &mut [u8]) -> Result<()>;

    /// Overwrite all mutable state from `buf`
    ///
    /// On success the engine behaves as a deterministic function of the
    /// restored bytes plus future inputs. On error nothing is applied.
    ///
    /// # Errors
    ///
    /// Returns `SizeMismatch` when `buf` is not exactly `state_size` bytes,
    /// or `InvalidConfiguration` when the bytes are inconsistent with the
    /// engine's geometry.
    fn restore_state(&mut self, buf: &[u8]) -> Result<()>;

    /// Evaluate `tokens` starting at cache position `position`
    ///
    /// `position` is the count of cache cells filled before this call; the
    /// caller advances it by `tokens.len()` afterwards.
    ///
    /// # Errors
    ///
    /// Returns `Evaluate` when the position disagrees with the engine's own
    /// cursor, the context window is exhausted, or a token id is outside
    /// the vocabulary.
    fn evaluate(&mut self, tokens: &[u32], position: usize) -> Result<()>;

    /// Logits produced by the most recent evaluate (or carried by a restore)
    fn logits(&self) -> &[f32];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_context() {
        let config = EngineConfig::default().with_context_length(0);
        assert!(matches!(
            config.validate(),
            Err(ReanudarError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_vocab() {
        let config = EngineConfig {
            vocab_size: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder_chains() {
        let config = EngineConfig::default()
            .with_context_length(128)
            .with_seed(7);
        assert_eq!(config.context_length, 128);
        assert_eq!(config.seed, 7);
        assert_eq!(config.vocab_size, EngineConfig::default().vocab_size);
    }

    #[test]
    fn test_config_serde_round_trip() {
        let config = EngineConfig::default().with_seed(99);
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
