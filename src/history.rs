//! Recent-token history window
//!
//! Tracks every token the engine has evaluated, seeded with a zero-filled
//! window so repetition-aware policies start from a full lookback horizon.
//! The window length bounds only the initial fill: appends grow the history
//! without truncation, and `recent` slices the tail on demand.
//!
//! Snapshots are value copies. A captured history and the live one share
//! nothing, which is what lets a continuation proof rewind to a checkpoint
//! while the first run keeps appending.

/// Ordered history of evaluated tokens with a configurable lookback window
///
/// # Example
///
/// ```
/// use reanudar::TokenHistory;
///
/// let mut history = TokenHistory::new(4);
/// assert_eq!(history.as_slice(), &[0, 0, 0, 0]);
///
/// history.append(17);
/// let saved = history.snapshot();
/// history.append(99);
///
/// assert_eq!(saved.len(), 5);
/// assert_eq!(history.len(), 6);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHistory {
    /// Evaluated tokens, oldest first, preceded by the zero fill
    tokens: Vec<u32>,
    /// Lookback window length used for the initial zero fill
    window: usize,
}

impl TokenHistory {
    /// Create a history zero-filled to the window length
    ///
    /// The zero fill encodes "nothing seen yet" across the whole lookback
    /// horizon, so position 0 already has a full window behind it.
    #[must_use]
    pub fn new(window: usize) -> Self {
        Self {
            tokens: vec![0; window],
            window,
        }
    }

    /// Record one evaluated token
    pub fn append(&mut self, token: u32) {
        self.tokens.push(token);
    }

    /// Record a run of evaluated tokens in order
    pub fn extend(&mut self, tokens: &[u32]) {
        self.tokens.extend_from_slice(tokens);
    }

    /// Take a value copy of the current history
    ///
    /// The copy is fully independent: later appends to the live history
    /// never show up in it.
    #[must_use]
    pub fn snapshot(&self) -> Self {
        self.clone()
    }

    /// Replace the current contents with a previously taken snapshot
    pub fn restore(&mut self, saved: &Self) {
        self.tokens.clone_from(&saved.tokens);
        self.window = saved.window;
    }

    /// All recorded tokens, zero fill included, oldest first
    #[must_use]
    pub fn as_slice(&self) -> &[u32] {
        &self.tokens
    }

    /// The most recent `n` tokens (fewer if the history is shorter)
    #[must_use]
    pub fn recent(&self, n: usize) -> &[u32] {
        let start = self.tokens.len().saturating_sub(n);
        &self.tokens[start..]
    }

    /// Total recorded length, zero fill included
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether nothing has been recorded (only possible with a zero window)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Window length this history was created with
    #[must_use]
    pub fn window(&self) -> usize {
        self.window
    }
}
