//! Deterministic reference engine
//!
//! [`MixerEngine`] is a small self-contained attention engine whose weights
//! derive procedurally from the configuration seed: the same configuration
//! always yields the same weights and an exactly reproducible forward pass.
//! It exists to exercise the capture/restore contract end to end without
//! loading model files.
//!
//! The mutable state is exactly what a snapshot carries: per-layer K/V
//! caches, the filled-cell cursor, and the current logits. Weights are
//! recreated from configuration and never serialized.
//!
//! ## Forward pass
//!
//! ```text
//! Token ID → Embedding → [attend over cached K/V, residual, renorm] × N → Logits
//! ```

use crate::engine::{EngineConfig, TokenEngine};
use crate::error::{ReanudarError, Result};

/// Byte length of the cursor field at the head of the state blob
const CURSOR_BYTES: usize = 8;

/// Spread of seeded weight values around zero
const WEIGHT_SCALE: f32 = 0.08;

/// Epsilon for the post-attention renormalization
const NORM_EPS: f32 = 1e-5;

/// Single-head attention engine with seed-derived weights
///
/// # Example
///
/// ```
/// use reanudar::{EngineConfig, MixerEngine, TokenEngine};
///
/// let mut engine = MixerEngine::new(EngineConfig::default()).unwrap();
/// engine.evaluate(&[84, 104, 101], 0).unwrap();
///
/// assert_eq!(engine.position(), 3);
/// assert_eq!(engine.logits().len(), 256);
/// ```
#[derive(Debug, Clone)]
pub struct MixerEngine {
    /// Configuration the engine was created from
    config: EngineConfig,
    /// Token embedding, row-major `[vocab_size, hidden_dim]`
    embedding: Vec<f32>,
    /// Per-layer query projections, row-major `[hidden_dim, hidden_dim]`
    wq: Vec<Vec<f32>>,
    /// Per-layer key projections
    wk: Vec<Vec<f32>>,
    /// Per-layer value projections
    wv: Vec<Vec<f32>>,
    /// Output head, row-major `[vocab_size, hidden_dim]`
    lm_head: Vec<f32>,
    /// Key cache per layer, `[context_length * hidden_dim]`
    k_cache: Vec<Vec<f32>>,
    /// Value cache per layer, `[context_length * hidden_dim]`
    v_cache: Vec<Vec<f32>>,
    /// Cache cells filled so far
    cursor: usize,
    /// Logits after the most recently evaluated token
    logits: Vec<f32>,
}

impl MixerEngine {
    /// Create an engine with weights derived from `config.seed`
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if any dimension is zero.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let dim = config.hidden_dim;
        let embedding = seeded_weights(config.seed, 0, config.vocab_size * dim);

        let mut wq = Vec::with_capacity(config.num_layers);
        let mut wk = Vec::with_capacity(config.num_layers);
        let mut wv = Vec::with_capacity(config.num_layers);
        for layer in 0..config.num_layers {
            let base = 3 * layer as u64;
            wq.push(seeded_weights(config.seed, base + 1, dim * dim));
            wk.push(seeded_weights(config.seed, base + 2, dim * dim));
            wv.push(seeded_weights(config.seed, base + 3, dim * dim));
        }

        let head_tag = 3 * config.num_layers as u64 + 1;
        let lm_head = seeded_weights(config.seed, head_tag, config.vocab_size * dim);

        let k_cache = vec![vec![0.0; config.context_length * dim]; config.num_layers];
        let v_cache = vec![vec![0.0; config.context_length * dim]; config.num_layers];

        Ok(Self {
            config,
            embedding,
            wq,
            wk,
            wv,
            lm_head,
            k_cache,
            v_cache,
            cursor: 0,
            logits: vec![0.0; config.vocab_size],
        })
    }

    /// Configuration the engine was created from
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Cache cells filled so far
    #[must_use]
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Run one token through the mixing layers and refresh the logits
    ///
    /// Attends over the cache rows filled before this position, then stores
    /// this position's K/V at `self.cursor`. The caller advances the cursor.
    fn forward_one(&mut self, token: usize) {
        let dim = self.config.hidden_dim;
        let mut x = self.embedding[token * dim..(token + 1) * dim].to_vec();

        for layer in 0..self.config.num_layers {
            let q = matvec(&self.wq[layer], &x, dim, dim);
            let k = matvec(&self.wk[layer], &x, dim, dim);
            let v = matvec(&self.wv[layer], &x, dim, dim);

            let filled = self.cursor * dim;
            let attn = attend(
                &q,
                &self.k_cache[layer][..filled],
                &self.v_cache[layer][..filled],
                &k,
                &v,
            );

            self.k_cache[layer][filled..filled + dim].copy_from_slice(&k);
            self.v_cache[layer][filled..filled + dim].copy_from_slice(&v);

            for (xi, ai) in x.iter_mut().zip(attn.iter()) {
                *xi += ai;
            }
            renorm(&mut x);
        }

        self.logits = matvec(&self.lm_head, &x, self.config.vocab_size, dim);
    }
}

impl TokenEngine for MixerEngine {
    fn context_length(&self) -> usize {
        self.config.context_length
    }

    fn vocab_size(&self) -> usize {
        self.config.vocab_size
    }

    fn state_size(&self) -> usize {
        let cache_values =
            self.config.num_layers * 2 * self.config.context_length * self.config.hidden_dim;
        CURSOR_BYTES + (self.config.vocab_size + cache_values) * 4
    }

    fn capture_state(&self, buf: &mut [u8]) -> Result<()> {
        let expected = self.state_size();
        if buf.len() != expected {
            return Err(ReanudarError::SizeMismatch {
                expected,
                actual: buf.len(),
            });
        }

        let mut offset = 0;
        write_u64(buf, &mut offset, self.cursor as u64);
        write_f32s(buf, &mut offset, &self.logits);
        for layer in 0..self.config.num_layers {
            write_f32s(buf, &mut offset, &self.k_cache[layer]);
            write_f32s(buf, &mut offset, &self.v_cache[layer]);
        }
        Ok(())
    }

    fn restore_state(&mut self, buf: &[u8]) -> Result<()> {
        let expected = self.state_size();
        if buf.len() != expected {
            return Err(ReanudarError::SizeMismatch {
                expected,
                actual: buf.len(),
            });
        }

        let mut offset = 0;
        let cursor = read_u64(buf, &mut offset) as usize;
        // Same byte length can come from a different cache geometry, so the
        // cursor is checked before anything is overwritten
        if cursor > self.config.context_length {
            return Err(ReanudarError::InvalidConfiguration(format!(
                "restored cursor {cursor} exceeds context length {}",
                self.config.context_length
            )));
        }

        self.cursor = cursor;
        read_f32s(buf, &mut offset, &mut self.logits);
        for layer in 0..self.config.num_layers {
            read_f32s(buf, &mut offset, &mut self.k_cache[layer]);
            read_f32s(buf, &mut offset, &mut self.v_cache[layer]);
        }
        Ok(())
    }

    fn evaluate(&mut self, tokens: &[u32], position: usize) -> Result<()> {
        if tokens.is_empty() {
            return Err(ReanudarError::Evaluate {
                position,
                reason: "no tokens to evaluate".to_string(),
            });
        }
        if position != self.cursor {
            return Err(ReanudarError::Evaluate {
                position,
                reason: format!("engine cursor is at {}", self.cursor),
            });
        }
        if self.cursor + tokens.len() > self.config.context_length {
            return Err(ReanudarError::Evaluate {
                position,
                reason: format!(
                    "context window exhausted ({} cells, {} requested)",
                    self.config.context_length,
                    self.cursor + tokens.len()
                ),
            });
        }
        for &token in tokens {
            if token as usize >= self.config.vocab_size {
                return Err(ReanudarError::Evaluate {
                    position,
                    reason: format!(
                        "token id {token} outside vocabulary of {}",
                        self.config.vocab_size
                    ),
                });
            }
        }

        for &token in tokens {
            self.forward_one(token as usize);
            self.cursor += 1;
        }
        Ok(())
    }

    fn logits(&self) -> &[f32] {
        &self.logits
    }
}

/// Derive a weight tensor from (seed, tag)
///
/// LCG stream mapped to values centered on zero. Distinct tags give each
/// tensor an independent stream under the same seed.
fn seeded_weights(seed: u64, tag: u64, len: usize) -> Vec<f32> {
    let mut state = seed ^ tag.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1);
            #[allow(clippy::cast_precision_loss)]
            let unit = (state >> 33) as f32 / (1u64 << 31) as f32;
            (unit - 0.5) * WEIGHT_SCALE
        })
        .collect()
}

/// Dot product of two equal-length vectors
fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// `y[r] = dot(w[r], x)` over a row-major `[rows, cols]` matrix
fn matvec(w: &[f32], x: &[f32], rows: usize, cols: usize) -> Vec<f32> {
    (0..rows)
        .map(|r| dot(&w[r * cols..(r + 1) * cols], x))
        .collect()
}

/// Softmax in place with max subtraction
fn softmax_in_place(values: &mut [f32]) {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    if sum > 0.0 {
        for v in values.iter_mut() {
            *v /= sum;
        }
    }
}

/// Scaled dot-product attention over cached rows plus the current position
///
/// `k_cache`/`v_cache` hold the filled rows `[cache_len * dim]`; the current
/// position's K/V are passed separately and weighted last.
fn attend(
    q: &[f32],
    k_cache: &[f32],
    v_cache: &[f32],
    current_k: &[f32],
    current_v: &[f32],
) -> Vec<f32> {
    let dim = q.len();
    let cache_len = if dim > 0 { k_cache.len() / dim } else { 0 };
    #[allow(clippy::cast_precision_loss)]
    let scale = 1.0 / (dim as f32).sqrt();

    let mut scores = Vec::with_capacity(cache_len + 1);
    for pos in 0..cache_len {
        let k_row = &k_cache[pos * dim..(pos + 1) * dim];
        scores.push(dot(q, k_row) * scale);
    }
    scores.push(dot(q, current_k) * scale);

    softmax_in_place(&mut scores);

    let mut output = vec![0.0; dim];
    for (pos, &weight) in scores.iter().enumerate().take(cache_len) {
        let v_row = &v_cache[pos * dim..(pos + 1) * dim];
        for (o, &v) in output.iter_mut().zip(v_row.iter()) {
            *o += weight * v;
        }
    }
    let current_weight = scores[cache_len];
    for (o, &v) in output.iter_mut().zip(current_v.iter()) {
        *o += current_weight * v;
    }
    output
}

/// RMS-normalize in place
fn renorm(x: &mut [f32]) {
    #[allow(clippy::cast_precision_loss)]
    let mean_sq: f32 = x.iter().map(|v| v * v).sum::<f32>() / x.len() as f32;
    let inv = 1.0 / (mean_sq + NORM_EPS).sqrt();
    for v in x.iter_mut() {
        *v *= inv;
    }
}

/// Write a little-endian u64 at `offset`, advancing it
fn write_u64(buf: &mut [u8], offset: &mut usize, value: u64) {
    buf[*offset..*offset + 8].copy_from_slice(&value.to_le_bytes());
    *offset += 8;
}

/// Read a little-endian u64 at `offset`, advancing it
fn read_u64(buf: &[u8], offset: &mut usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[*offset..*offset + 8]);
    *offset += 8;
    u64::from_le_bytes(bytes)
}

/// Write f32 values as little-endian at `offset`, advancing it
fn write_f32s(buf: &mut [u8], offset: &mut usize, values: &[f32]) {
    for &value in values {
        buf[*offset..*offset + 4].copy_from_slice(&value.to_le_bytes());
        *offset += 4;
    }
}

/// Read f32 values as little-endian at `offset`, advancing it
fn read_f32s(buf: &[u8], offset: &mut usize, values: &mut [f32]) {
    for value in values.iter_mut() {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&buf[*offset..*offset + 4]);
        *value = f32::from_le_bytes(bytes);
        *offset += 4;
    }
}
