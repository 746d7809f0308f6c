//! # Reanudar
//!
//! Checkpoint and restore for autoregressive token generation.
//!
//! Reanudar (Spanish: "to resume") captures the complete mutable runtime
//! state of a token-generation engine into an opaque binary blob and
//! restores it into a freshly created engine, so that continuing from the
//! restored state is indistinguishable from never having stopped. The
//! continuation harness proves it the hard way: serialize, destroy the live
//! engine, recreate, reload, and require the two continuations to match
//! token for token.
//!
//! ## Example
//!
//! ```rust
//! use reanudar::{EngineConfig, EngineState, MixerEngine, TokenEngine};
//!
//! let config = EngineConfig::default();
//! let mut engine = MixerEngine::new(config).unwrap();
//! engine.evaluate(&[84, 104, 101], 0).unwrap();
//!
//! // Snapshot, then resume in a completely fresh engine
//! let snapshot = EngineState::capture(&engine).unwrap();
//! let mut resumed = MixerEngine::new(config).unwrap();
//! snapshot.restore_into(&mut resumed).unwrap();
//!
//! assert_eq!(resumed.position(), engine.position());
//! assert_eq!(resumed.logits(), engine.logits());
//! ```
//!
//! ## Architecture
//!
//! - [`engine`] - The [`TokenEngine`] contract and shared [`EngineConfig`]
//! - [`state`] - [`EngineState`]: capture, restore, persist, load
//! - [`history`] - Zero-filled recent-token window with value-copy snapshots
//! - [`sampler`] - Full-vocabulary candidates and position-keyed selection
//! - [`harness`] - The continuation proof and plain generation loops
//! - [`mixer`] - A deterministic reference engine with seed-derived weights
//! - [`tokenizer`] - Byte-level prompt encoding
//!
//! ## Consistency contract
//!
//! A snapshot spans process boundaries and engine lifetimes. Everything the
//! generation path depends on is either inside the blob (cache contents,
//! engine cursor, current logits) or part of the checkpoint triple the
//! harness copies alongside it (token history, position counter). Sampling
//! randomness is keyed on (seed, position), so it needs no saved state at
//! all. Errors are fatal and immediate; nothing is retried or padded.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
// Clippy allows (MUST come after deny/warn to override them)
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)] // usize -> f32 in sampling math is fine
#![allow(clippy::cast_possible_truncation)] // vocab indices fit in u32
#![allow(clippy::must_use_candidate)] // Not all methods need #[must_use]
#![allow(clippy::missing_panics_doc)] // Allow missing Panics doc sections
#![allow(clippy::float_cmp)] // Allow float comparisons in tests
#![allow(clippy::uninlined_format_args)] // Prefer explicit format args

pub mod engine;
pub mod error;
pub mod harness;
pub mod history;
pub mod mixer;
pub mod sampler;
pub mod state;
pub mod tokenizer;

pub use engine::{EngineConfig, TokenEngine};
pub use error::{ReanudarError, Result};
pub use harness::{
    generate_steps, next_token, prove_continuation, run_generation, ContinuationReport,
    HarnessConfig,
};
pub use history::TokenHistory;
pub use mixer::MixerEngine;
pub use sampler::{position_draw, Candidate, CandidateSet, SamplerConfig};
pub use state::EngineState;
pub use tokenizer::{ByteTokenizer, BYTE_VOCAB_SIZE};
