//! Tokenizers splitting document bytes into word and separator tokens.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::constants::DEFAULT_TOKENIZER;
use crate::error::{BlotdexError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Word,
    Other,
    EndOfData,
}

/// A token borrowed from the document bytes. `pos` is absolute, i.e. it
/// includes the offset the document was tokenized at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub tag: Tag,
    pub lit: &'a [u8],
    pub pos: u32,
}

impl Token<'_> {
    #[must_use]
    pub fn end(&self) -> u32 {
        self.pos.saturating_add(self.lit.len() as u32)
    }
}

pub trait Tokenizer: Send + Sync {
    /// Appends the tokens of `data` to `dst`, in document order, ending with
    /// an [`Tag::EndOfData`] marker. Data that is not valid UTF-8 yields no
    /// tokens.
    fn tokenize<'a>(&self, data: &'a [u8], offset: u32, dst: &mut Vec<Token<'a>>);
}

/// Runs of letters and digits are words; every other run is a separator.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleWords;

impl Tokenizer for SimpleWords {
    fn tokenize<'a>(&self, data: &'a [u8], offset: u32, dst: &mut Vec<Token<'a>>) {
        let Ok(text) = std::str::from_utf8(data) else {
            return;
        };
        let mut start = 0;
        let mut in_word = None;
        for (i, ch) in text.char_indices() {
            let word = ch.is_alphanumeric();
            if let Some(prev) = in_word {
                if prev != word {
                    dst.push(token(data, start, i, offset, prev));
                    start = i;
                }
            }
            in_word = Some(word);
        }
        if let Some(prev) = in_word {
            dst.push(token(data, start, data.len(), offset, prev));
        }
        dst.push(end_of_data(data, offset));
    }
}

/// Unicode word boundaries (UAX #29); segments holding any alphanumeric
/// character are words.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnicodeWords;

impl Tokenizer for UnicodeWords {
    fn tokenize<'a>(&self, data: &'a [u8], offset: u32, dst: &mut Vec<Token<'a>>) {
        let Ok(text) = std::str::from_utf8(data) else {
            return;
        };
        for (start, segment) in text.split_word_bound_indices() {
            let word = segment.chars().any(char::is_alphanumeric);
            dst.push(token(data, start, start + segment.len(), offset, word));
        }
        dst.push(end_of_data(data, offset));
    }
}

fn token(data: &[u8], start: usize, end: usize, offset: u32, word: bool) -> Token<'_> {
    Token {
        tag: if word { Tag::Word } else { Tag::Other },
        lit: &data[start..end],
        pos: offset.saturating_add(start as u32),
    }
}

fn end_of_data(data: &[u8], offset: u32) -> Token<'_> {
    Token {
        tag: Tag::EndOfData,
        lit: &data[data.len()..],
        pos: offset.saturating_add(data.len() as u32),
    }
}

/// Tokenizer selection persisted in the index config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub name: String,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_TOKENIZER.to_string(),
        }
    }
}

impl TokenConfig {
    pub fn build(&self) -> Result<Arc<dyn Tokenizer>> {
        match self.name.as_str() {
            "words.simple" => Ok(Arc::new(SimpleWords)),
            "words.unicode" => Ok(Arc::new(UnicodeWords)),
            other => Err(BlotdexError::InvalidConfig {
                reason: format!("unrecognized tokenizer '{other}'"),
            }),
        }
    }
}

/// Collects only the word tokens of `data`.
#[must_use]
pub fn words<'a>(tokenizer: &dyn Tokenizer, data: &'a [u8], offset: u32) -> Vec<Token<'a>> {
    let mut tokens = Vec::new();
    tokenizer.tokenize(data, offset, &mut tokens);
    tokens.retain(|tok| tok.tag == Tag::Word);
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lits<'a>(tokens: &[Token<'a>]) -> Vec<(&'a str, Tag, u32)> {
        tokens
            .iter()
            .map(|t| (std::str::from_utf8(t.lit).unwrap(), t.tag, t.pos))
            .collect()
    }

    #[test]
    fn simple_words_alternate_with_separators() {
        let mut tokens = Vec::new();
        SimpleWords.tokenize(b"We need, 10 tokens.", 100, &mut tokens);
        assert_eq!(
            lits(&tokens),
            vec![
                ("We", Tag::Word, 100),
                (" ", Tag::Other, 102),
                ("need", Tag::Word, 103),
                (", ", Tag::Other, 107),
                ("10", Tag::Word, 109),
                (" ", Tag::Other, 111),
                ("tokens", Tag::Word, 112),
                (".", Tag::Other, 118),
                ("", Tag::EndOfData, 119),
            ]
        );
    }

    #[test]
    fn invalid_utf8_yields_nothing() {
        let mut tokens = Vec::new();
        SimpleWords.tokenize(&[0xff, 0xfe, b'a'], 0, &mut tokens);
        assert!(tokens.is_empty());
        UnicodeWords.tokenize(&[0xff, 0xfe, b'a'], 0, &mut tokens);
        assert!(tokens.is_empty());
    }

    #[test]
    fn unicode_words_keep_contractions_together() {
        let got = words(&UnicodeWords, "can't stop, café".as_bytes(), 0);
        let got: Vec<&str> = got
            .iter()
            .map(|t| std::str::from_utf8(t.lit).unwrap())
            .collect();
        assert_eq!(got, vec!["can't", "stop", "café"]);
    }

    #[test]
    fn unknown_tokenizer_is_a_config_error() {
        let cfg = TokenConfig {
            name: "go.tokens".into(),
        };
        assert!(matches!(
            cfg.build(),
            Err(BlotdexError::InvalidConfig { .. })
        ));
        assert!(TokenConfig::default().build().is_ok());
    }
}
