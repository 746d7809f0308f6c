//! Byte-level prompt tokenizer
//!
//! Prompts map to token ids through their UTF-8 bytes, one id per byte.
//! That keeps vocabulary handling self-contained: ids stay below 256, which
//! the default engine vocabulary covers exactly, and decoding is a lossy
//! UTF-8 reassembly good enough for showing generated continuations.

use crate::error::{ReanudarError, Result};

/// Token ids one byte-value wide
pub const BYTE_VOCAB_SIZE: usize = 256;

/// Stateless byte-level tokenizer
///
/// # Example
///
/// ```
/// use reanudar::ByteTokenizer;
///
/// let tokenizer = ByteTokenizer;
/// let tokens = tokenizer.encode("fox").unwrap();
/// assert_eq!(tokens, vec![102, 111, 120]);
/// assert_eq!(tokenizer.decode(&tokens), "fox");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteTokenizer;

impl ByteTokenizer {
    /// Encode text to token ids, one per UTF-8 byte
    ///
    /// # Errors
    ///
    /// Returns `Tokenize` when the text produces no tokens. Generation
    /// cannot start from an empty evaluation, so this is fatal.
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        if text.is_empty() {
            return Err(ReanudarError::Tokenize(
                "prompt produced no tokens".to_string(),
            ));
        }
        Ok(text.bytes().map(u32::from).collect())
    }

    /// Decode token ids back to text
    ///
    /// Ids above 255 are truncated to their low byte and invalid UTF-8
    /// sequences decode lossily.
    #[must_use]
    pub fn decode(&self, tokens: &[u32]) -> String {
        let bytes: Vec<u8> = tokens.iter().map(|&t| (t & 0xFF) as u8).collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_maps_bytes() {
        let tokens = ByteTokenizer.encode("The quick brown fox").unwrap();
        assert_eq!(tokens.len(), 19);
        assert_eq!(tokens[0], u32::from(b'T'));
        assert!(tokens.iter().all(|&t| (t as usize) < BYTE_VOCAB_SIZE));
    }

    #[test]
    fn test_encode_empty_prompt_fails() {
        let result = ByteTokenizer.encode("");
        assert!(matches!(result, Err(ReanudarError::Tokenize(_))));
    }

    #[test]
    fn test_decode_round_trips_ascii() {
        let tokenizer = ByteTokenizer;
        let text = "The quick brown fox";
        let tokens = tokenizer.encode(text).unwrap();
        assert_eq!(tokenizer.decode(&tokens), text);
    }

    #[test]
    fn test_encode_multibyte_expands() {
        // Two-byte UTF-8 sequence becomes two tokens
        let tokens = ByteTokenizer.encode("é").unwrap();
        assert_eq!(tokens.len(), 2);
    }

    #[test]
    fn test_decode_is_lossy_on_invalid_sequences() {
        // A lone continuation byte cannot decode cleanly
        let text = ByteTokenizer.decode(&[0x80]);
        assert_eq!(text, "\u{FFFD}");
    }

    proptest! {
        #[test]
        fn prop_utf8_round_trips(text in "[ -~]{1,64}") {
            let tokenizer = ByteTokenizer;
            let tokens = tokenizer.encode(&text).unwrap();
            prop_assert_eq!(tokenizer.decode(&tokens), text);
        }
    }
}
