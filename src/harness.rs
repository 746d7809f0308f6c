//! Continuation proof harness
//!
//! Drives the full checkpoint/restore protocol: evaluate a prompt, capture
//! a checkpoint, generate a continuation, then rebuild a second engine from
//! the persisted state and generate again. The two continuations must match
//! token for token; any divergence means mutable state escaped the
//! snapshot, and the report says so rather than papering over it.
//!
//! The checkpoint is the triple (engine state, token history copy, position
//! counter copy). Engine state travels through the snapshot codec; the
//! other two are plain value copies owned here.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::TokenEngine;
use crate::error::Result;
use crate::history::TokenHistory;
use crate::sampler::{CandidateSet, SamplerConfig};
use crate::state::EngineState;
use crate::tokenizer::ByteTokenizer;

/// Configuration for a harness run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Prompt evaluated before the checkpoint
    pub prompt: String,
    /// Tokens to generate after the checkpoint
    pub n_predict: usize,
    /// Recent-token window length
    pub history_window: usize,
    /// Selection policy
    pub sampler: SamplerConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            prompt: "The quick brown fox".to_string(),
            n_predict: 16,
            history_window: 64,
            sampler: SamplerConfig::greedy(),
        }
    }
}

/// Outcome of a continuation proof
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinuationReport {
    /// Number of prompt tokens evaluated before the checkpoint
    pub prompt_tokens: usize,
    /// Position counter at the checkpoint
    pub checkpoint_position: usize,
    /// State blob size in bytes
    pub state_size: usize,
    /// Tokens generated by the first engine after the checkpoint
    pub first_run: Vec<u32>,
    /// Tokens generated by the restored engine
    pub second_run: Vec<u32>,
    /// Decoded text of the first continuation
    pub first_text: String,
    /// Decoded text of the second continuation
    pub second_text: String,
    /// Whether the two continuations matched token for token
    pub identical: bool,
}

/// Generate one token
///
/// Builds the full-vocabulary candidate view from the current logits,
/// selects under the policy, records the token in the history, and advances
/// the engine past it.
///
/// # Errors
///
/// Propagates selection and evaluation failures; on error the position
/// counter is left at the failed step.
pub fn next_token<E: TokenEngine>(
    engine: &mut E,
    history: &mut TokenHistory,
    position: &mut usize,
    sampler: &SamplerConfig,
) -> Result<u32> {
    let mut candidates = CandidateSet::from_logits(engine.logits());
    let token = sampler.select(&mut candidates, *position)?;
    history.append(token);
    engine.evaluate(&[token], *position)?;
    *position += 1;
    Ok(token)
}

/// Run `n_predict` generation steps, returning the tokens in order
///
/// # Errors
///
/// Stops at the first failing step and propagates it.
pub fn generate_steps<E: TokenEngine>(
    engine: &mut E,
    history: &mut TokenHistory,
    position: &mut usize,
    sampler: &SamplerConfig,
    n_predict: usize,
) -> Result<Vec<u32>> {
    let mut tokens = Vec::with_capacity(n_predict);
    for _ in 0..n_predict {
        tokens.push(next_token(engine, history, position, sampler)?);
    }
    Ok(tokens)
}

/// Straight generation without a checkpoint
///
/// Evaluates the prompt at position 0 and generates `n_predict` tokens,
/// returning only the generated ids.
///
/// # Errors
///
/// Returns `Tokenize` for an empty prompt and propagates engine failures.
pub fn run_generation<E: TokenEngine>(engine: &mut E, config: &HarnessConfig) -> Result<Vec<u32>> {
    let prompt_tokens = ByteTokenizer.encode(&config.prompt)?;

    let mut history = TokenHistory::new(config.history_window);
    let mut position = 0;
    engine.evaluate(&prompt_tokens, position)?;
    history.extend(&prompt_tokens);
    position += prompt_tokens.len();

    generate_steps(
        engine,
        &mut history,
        &mut position,
        &config.sampler,
        config.n_predict,
    )
}

/// Prove that generation resumes bit-identically from a saved state
///
/// Protocol: create the first engine, evaluate the prompt, checkpoint,
/// generate the first continuation, destroy the engine, persist the
/// checkpoint state to `state_path`, create a second engine from the same
/// factory, load and restore the state, rewind history and position to the
/// checkpoint copies, and generate the second continuation.
///
/// The report's `identical` flag is the verdict; both continuations are
/// returned so a divergence can be inspected.
///
/// # Errors
///
/// Returns `Tokenize` for an empty prompt, `SizeMismatch` when the
/// persisted state disagrees with the second engine's configuration,
/// `IoError` for persistence failures, and `Evaluate` when either engine
/// fails to advance. A failure in the second run does not invalidate the
/// first run's output, but it does abort the proof.
pub fn prove_continuation<E, F, P>(
    factory: F,
    config: &HarnessConfig,
    state_path: P,
) -> Result<ContinuationReport>
where
    E: TokenEngine,
    F: Fn() -> Result<E>,
    P: AsRef<Path>,
{
    let state_path = state_path.as_ref();
    let tokenizer = ByteTokenizer;

    let mut first = factory()?;
    let prompt_tokens = tokenizer.encode(&config.prompt)?;

    let mut history = TokenHistory::new(config.history_window);
    let mut position = 0;
    first.evaluate(&prompt_tokens, position)?;
    history.extend(&prompt_tokens);
    position += prompt_tokens.len();
    debug!(prompt_tokens = prompt_tokens.len(), "prompt evaluated");

    let checkpoint = EngineState::capture(&first)?;
    let saved_history = history.snapshot();
    let saved_position = position;
    debug!(
        state_size = checkpoint.size(),
        position = saved_position,
        "checkpoint captured"
    );

    let first_run = generate_steps(
        &mut first,
        &mut history,
        &mut position,
        &config.sampler,
        config.n_predict,
    )?;
    debug!(tokens = first_run.len(), "first continuation complete");
    drop(first);

    checkpoint.persist(state_path)?;
    debug!(path = %state_path.display(), "state persisted");

    let mut second = factory()?;
    let loaded = EngineState::load(state_path, second.state_size())?;
    loaded.restore_into(&mut second)?;
    history.restore(&saved_history);
    position = saved_position;
    debug!(position, "state restored");

    let second_run = generate_steps(
        &mut second,
        &mut history,
        &mut position,
        &config.sampler,
        config.n_predict,
    )?;
    debug!(tokens = second_run.len(), "second continuation complete");

    let identical = first_run == second_run;
    Ok(ContinuationReport {
        prompt_tokens: prompt_tokens.len(),
        checkpoint_position: saved_position,
        state_size: checkpoint.size(),
        first_text: tokenizer.decode(&first_run),
        second_text: tokenizer.decode(&second_run),
        first_run,
        second_run,
        identical,
    })
}
