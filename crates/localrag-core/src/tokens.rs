use std::path::Path;

use crate::error::{Error, Result};

/// Counts tokens the way the embedding model will see them.
pub enum TokenCounter {
    Tokenizer(Box<tokenizers::Tokenizer>),
    /// words / 0.75; a word with several non-ASCII characters (unspaced CJK
    /// text) counts one token per such character instead
    Approximate,
}

impl TokenCounter {
    pub fn from_file(path: &Path) -> Result<Self> {
        let tokenizer = tokenizers::Tokenizer::from_file(path)
            .map_err(|e| Error::InvalidConfig(format!("tokenizer {}: {e}", path.display())))?;
        Ok(Self::Tokenizer(Box::new(tokenizer)))
    }

    pub fn from_settings(tokenizer_file: Option<&Path>) -> Result<Self> {
        match tokenizer_file {
            Some(path) => Self::from_file(path),
            None => Ok(Self::Approximate),
        }
    }

    pub fn count(&self, text: &str) -> usize {
        match self {
            Self::Tokenizer(tokenizer) => match tokenizer.encode(text, false) {
                Ok(encoding) => encoding.get_ids().len(),
                Err(_) => approximate(text),
            },
            Self::Approximate => approximate(text),
        }
    }
}

impl TokenCounter {
    /// Cut `text` into pieces of at most `max_tokens` tokens without regard
    /// for words. Uses the tokenizer's offsets when one is loaded and falls
    /// back to growing pieces one character at a time.
    pub fn split_to_budget(&self, text: &str, max_tokens: usize) -> Vec<String> {
        let max_tokens = max_tokens.max(1);
        if let Self::Tokenizer(tokenizer) = self {
            if let Ok(encoding) = tokenizer.encode(text, false) {
                let mut pieces = Vec::new();
                for window in encoding.get_offsets().chunks(max_tokens) {
                    let (Some(first), Some(last)) = (window.first(), window.last()) else { continue };
                    let Some(piece) = text.get(first.0..last.1) else { return self.split_chars(text, max_tokens) };
                    let piece = piece.trim();
                    if piece.is_empty() {
                        continue;
                    }
                    if self.count(piece) <= max_tokens {
                        pieces.push(piece.to_string());
                    } else {
                        pieces.extend(self.split_chars(piece, max_tokens));
                    }
                }
                if !pieces.is_empty() {
                    return pieces;
                }
            }
        }
        self.split_chars(text, max_tokens)
    }

    fn split_chars(&self, text: &str, max_tokens: usize) -> Vec<String> {
        let mut pieces = Vec::new();
        let mut buf = String::new();
        for c in text.chars() {
            buf.push(c);
            if buf.chars().count() > 1 && self.count(&buf) > max_tokens {
                buf.pop();
                pieces.push(std::mem::take(&mut buf));
                buf.push(c);
            }
        }
        if !buf.trim().is_empty() {
            pieces.push(buf);
        }
        pieces.retain(|p| !p.trim().is_empty());
        pieces
    }
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tokenizer(_) => f.write_str("TokenCounter::Tokenizer"),
            Self::Approximate => f.write_str("TokenCounter::Approximate"),
        }
    }
}

fn approximate(text: &str) -> usize {
    let mut words = 0usize;
    let mut wide = 0usize;
    for word in text.split_whitespace() {
        match word.chars().filter(|c| !c.is_ascii()).count() {
            0 | 1 => words += 1,
            n => wide += n,
        }
    }
    (words as f32 / 0.75).ceil() as usize + wide
}
