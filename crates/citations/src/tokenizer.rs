//! Reporter-aware tokenizer
//!
//! Splits text on every known reporter spelling, keeping each match as one
//! atomic token, and whitespace-splits the text in between. Offsets are kept
//! so citations can be mapped back to the text they came from.

use crate::reference::ReferenceData;
use crate::text::Span;
use regex_lite::Regex;

/// One token of opinion text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub text: &'a str,
    pub span: Span,
    /// Token is a known reporter spelling
    pub is_reporter: bool,
}

/// Tokenizer built once from the reporter tables
#[derive(Debug, Clone)]
pub struct Tokenizer {
    pattern: Option<Regex>,
}

impl Tokenizer {
    pub fn new(reference: &ReferenceData) -> Result<Self, regex_lite::Error> {
        Self::from_strings(reference.reporter_strings())
    }

    /// Build from an explicit list of reporter spellings
    pub fn from_strings<'s, I>(strings: I) -> Result<Self, regex_lite::Error>
    where
        I: IntoIterator<Item = &'s str>,
    {
        let mut strings: Vec<&str> = strings.into_iter().filter(|s| !s.is_empty()).collect();
        // Longest first so "F. Supp. 2d" wins over "F. Supp." and "F."
        strings.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        strings.dedup();

        if strings.is_empty() {
            return Ok(Self { pattern: None });
        }

        let alternation = strings
            .iter()
            .map(|s| regex_lite::escape(s))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = Regex::new(&format!("(?:{alternation})"))?;

        Ok(Self {
            pattern: Some(pattern),
        })
    }

    pub fn tokenize<'a>(&self, text: &'a str) -> Vec<Token<'a>> {
        let mut tokens = Vec::new();
        let mut cursor = 0;

        if let Some(pattern) = &self.pattern {
            let mut search_from = 0;
            while let Some(m) = pattern.find_at(text, search_from) {
                if !is_left_boundary(text, m.start()) || !is_right_boundary(text, m.end()) {
                    search_from = next_char_boundary(text, m.start());
                    continue;
                }

                push_words(text, cursor, m.start(), &mut tokens);
                tokens.push(Token {
                    text: m.as_str(),
                    span: Span::new(m.start(), m.end()),
                    is_reporter: true,
                });
                cursor = m.end();
                search_from = m.end();
            }
        }

        push_words(text, cursor, text.len(), &mut tokens);
        tokens
    }
}

fn is_left_boundary(text: &str, at: usize) -> bool {
    match text[..at].chars().next_back() {
        None => true,
        Some(c) => c.is_whitespace() || matches!(c, '(' | '[' | '"' | '\''),
    }
}

fn is_right_boundary(text: &str, at: usize) -> bool {
    match text[at..].chars().next() {
        None => true,
        Some(c) => c.is_whitespace() || matches!(c, ',' | ';' | ':' | ')' | ']'),
    }
}

fn next_char_boundary(text: &str, at: usize) -> usize {
    text[at..]
        .chars()
        .next()
        .map_or(text.len(), |c| at + c.len_utf8())
}

/// Whitespace-split `text[from..to]`, keeping absolute offsets
fn push_words<'a>(text: &'a str, from: usize, to: usize, tokens: &mut Vec<Token<'a>>) {
    let mut word_start: Option<usize> = None;
    for (offset, c) in text[from..to].char_indices() {
        let at = from + offset;
        if c.is_whitespace() {
            if let Some(start) = word_start.take() {
                tokens.push(word(text, start, at));
            }
        } else if word_start.is_none() {
            word_start = Some(at);
        }
    }
    if let Some(start) = word_start {
        tokens.push(word(text, start, to));
    }
}

fn word(text: &str, start: usize, end: usize) -> Token<'_> {
    Token {
        text: &text[start..end],
        span: Span::new(start, end),
        is_reporter: false,
    }
}
