//! Engine state snapshots
//!
//! [`EngineState`] captures the complete mutable state of an engine into an
//! opaque byte buffer, restores it into a freshly created engine, and moves
//! it through durable storage. The buffer length is always exactly the
//! engine's required state size; every transfer is size-checked before any
//! byte is applied, so configuration drift fails loudly instead of
//! corrupting continuation.
//!
//! The persisted file format is self-describing: an 8-byte little-endian
//! length header followed by the raw payload. The header is validated
//! against the consuming engine's required size, never trusted.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use crate::engine::TokenEngine;
use crate::error::{ReanudarError, Result};

/// Opaque snapshot of an engine's complete mutable state
///
/// Immutable once captured: the only channel between the engine that
/// produced it and the engine that consumes it is this value, passed by
/// copy. Two engines never alias a cache through it.
///
/// # Example
///
/// ```
/// use reanudar::{EngineConfig, EngineState, MixerEngine, TokenEngine};
///
/// let config = EngineConfig::default();
/// let mut source = MixerEngine::new(config).unwrap();
/// source.evaluate(&[10, 20, 30], 0).unwrap();
///
/// let snapshot = EngineState::capture(&source).unwrap();
/// let mut target = MixerEngine::new(config).unwrap();
/// snapshot.restore_into(&mut target).unwrap();
///
/// assert_eq!(target.logits(), source.logits());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineState {
    /// Raw state bytes, exactly the producing engine's required size
    bytes: Vec<u8>,
}

impl EngineState {
    /// Capture the engine's complete mutable state
    ///
    /// Allocates exactly the engine's required size and has the engine
    /// serialize into it. The engine is not perturbed.
    ///
    /// # Errors
    ///
    /// Propagates the engine's capture failure.
    pub fn capture<E: TokenEngine>(engine: &E) -> Result<Self> {
        let mut bytes = vec![0u8; engine.state_size()];
        engine.capture_state(&mut bytes)?;
        Ok(Self { bytes })
    }

    /// Restore this snapshot into a compatibly configured engine
    ///
    /// # Errors
    ///
    /// Returns `SizeMismatch` when the snapshot length does not equal the
    /// target engine's required size; nothing is applied in that case.
    pub fn restore_into<E: TokenEngine>(&self, engine: &mut E) -> Result<()> {
        let expected = engine.state_size();
        if self.bytes.len() != expected {
            return Err(ReanudarError::SizeMismatch {
                expected,
                actual: self.bytes.len(),
            });
        }
        engine.restore_state(&self.bytes)
    }

    /// Wrap raw bytes as a snapshot
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Snapshot length in bytes
    #[must_use]
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Raw snapshot bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Write the snapshot to `path` with a length header
    ///
    /// The write lands atomically: a temp file next to the target takes the
    /// header and payload, is synced, then renamed over `path`. A failed
    /// write leaves no partial file behind.
    ///
    /// # Errors
    ///
    /// Returns `IoError` when any filesystem step fails.
    pub fn persist<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let tmp_path = path.with_extension("tmp");

        let mut tmp_file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)
            .map_err(|e| ReanudarError::IoError {
                message: format!("failed to open {}: {e}", tmp_path.display()),
            })?;

        let header = (self.bytes.len() as u64).to_le_bytes();
        let written = tmp_file
            .write_all(&header)
            .and_then(|()| tmp_file.write_all(&self.bytes))
            .and_then(|()| tmp_file.sync_all());
        if let Err(e) = written {
            drop(tmp_file);
            let _ = fs::remove_file(&tmp_path);
            return Err(ReanudarError::IoError {
                message: format!("failed to write {}: {e}", tmp_path.display()),
            });
        }
        drop(tmp_file);

        if let Err(e) = fs::rename(&tmp_path, path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(ReanudarError::IoError {
                message: format!("failed to move state into place at {}: {e}", path.display()),
            });
        }
        Ok(())
    }

    /// Read a snapshot from `path`, validating it against `expected_size`
    ///
    /// The header is checked before the payload is read, so a file written
    /// under a different configuration is rejected without touching its
    /// payload. Missing payload bytes are a hard failure, never zero-padded.
    ///
    /// # Errors
    ///
    /// Returns `SizeMismatch` when the header disagrees with
    /// `expected_size`, or `IoError` when the file cannot be opened or the
    /// payload read comes up short.
    pub fn load<P: AsRef<Path>>(path: P, expected_size: usize) -> Result<Self> {
        let path = path.as_ref();
        let mut file = fs::File::open(path).map_err(|e| ReanudarError::IoError {
            message: format!("failed to open {}: {e}", path.display()),
        })?;

        let mut header = [0u8; 8];
        file.read_exact(&mut header)
            .map_err(|e| ReanudarError::IoError {
                message: format!("failed to read state header from {}: {e}", path.display()),
            })?;

        let declared = u64::from_le_bytes(header);
        if declared != expected_size as u64 {
            return Err(ReanudarError::SizeMismatch {
                expected: expected_size,
                actual: declared as usize,
            });
        }

        let mut bytes = vec![0u8; expected_size];
        file.read_exact(&mut bytes)
            .map_err(|e| ReanudarError::IoError {
                message: format!("short read of state payload from {}: {e}", path.display()),
            })?;

        Ok(Self { bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use crate::mixer::MixerEngine;
    use proptest::prelude::*;

    fn test_config() -> EngineConfig {
        EngineConfig {
            context_length: 16,
            vocab_size: 32,
            hidden_dim: 8,
            num_layers: 2,
            seed: 42,
        }
    }

    // ========================================================================
    // Capture / restore
    // ========================================================================

    #[test]
    fn test_capture_matches_required_size() {
        let engine = MixerEngine::new(test_config()).unwrap();
        let state = EngineState::capture(&engine).unwrap();
        assert_eq!(state.size(), engine.state_size());
    }

    #[test]
    fn test_restore_rejects_context_length_drift() {
        let mut source = MixerEngine::new(test_config()).unwrap();
        source.evaluate(&[1, 2], 0).unwrap();
        let state = EngineState::capture(&source).unwrap();

        let other_config = test_config().with_context_length(8);
        let mut target = MixerEngine::new(other_config).unwrap();
        let result = state.restore_into(&mut target);

        match result {
            Err(ReanudarError::SizeMismatch { expected, actual }) => {
                assert_eq!(expected, target.state_size());
                assert_eq!(actual, state.size());
            },
            other => panic!("Expected SizeMismatch, got {other:?}"),
        }
        // Nothing was applied; the target still evaluates from scratch
        assert_eq!(target.position(), 0);
        target.evaluate(&[1], 0).unwrap();
    }

    #[test]
    fn test_round_trip_on_same_engine_is_a_no_op() {
        let mut engine = MixerEngine::new(test_config()).unwrap();
        engine.evaluate(&[4, 8, 12], 0).unwrap();
        let mut untouched = engine.clone();

        let state = EngineState::capture(&engine).unwrap();
        state.restore_into(&mut engine).unwrap();

        engine.evaluate(&[2], 3).unwrap();
        untouched.evaluate(&[2], 3).unwrap();
        assert_eq!(engine.logits(), untouched.logits());
        assert_eq!(engine.position(), untouched.position());
    }

    // ========================================================================
    // Persist / load
    // ========================================================================

    #[test]
    fn test_persist_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.bin");

        let mut engine = MixerEngine::new(test_config()).unwrap();
        engine.evaluate(&[9, 10], 0).unwrap();
        let state = EngineState::capture(&engine).unwrap();

        state.persist(&path).unwrap();
        let loaded = EngineState::load(&path, engine.state_size()).unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_persist_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.bin");

        let state = EngineState::from_bytes(vec![1, 2, 3, 4]);
        state.persist(&path).unwrap();

        assert!(path.exists());
        assert!(!dir.path().join("state.tmp").exists());
    }

    #[test]
    fn test_load_rejects_header_disagreement() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.bin");

        let state = EngineState::from_bytes(vec![0u8; 64]);
        state.persist(&path).unwrap();

        let result = EngineState::load(&path, 128);
        assert!(matches!(
            result,
            Err(ReanudarError::SizeMismatch {
                expected: 128,
                actual: 64,
            })
        ));
    }

    #[test]
    fn test_load_rejects_short_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.bin");

        // Header declares 64 bytes but only 32 follow
        let mut contents = (64u64).to_le_bytes().to_vec();
        contents.extend_from_slice(&[0u8; 32]);
        fs::write(&path, &contents).unwrap();

        let result = EngineState::load(&path, 64);
        assert!(matches!(result, Err(ReanudarError::IoError { .. })));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.bin");
        let result = EngineState::load(&path, 64);
        assert!(matches!(result, Err(ReanudarError::IoError { .. })));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_persist_load_preserves_bytes(
            payload in proptest::collection::vec(any::<u8>(), 0..4096),
        ) {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("state.bin");

            let state = EngineState::from_bytes(payload);
            state.persist(&path).unwrap();
            let loaded = EngineState::load(&path, state.size()).unwrap();
            prop_assert_eq!(loaded.as_bytes(), state.as_bytes());
        }

        #[test]
        fn prop_load_rejects_any_other_size(
            payload in proptest::collection::vec(any::<u8>(), 1..512),
            other in 0usize..4096,
        ) {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("state.bin");

            let state = EngineState::from_bytes(payload);
            prop_assume!(other != state.size());
            state.persist(&path).unwrap();

            let result = EngineState::load(&path, other);
            prop_assert!(
                matches!(result, Err(ReanudarError::SizeMismatch { .. })),
                "expected SizeMismatch, got {:?}",
                result
            );
        }
    }
}
