//! Opinion text preparation
//!
//! Reduces an opinion to the text the tokenizer sees while remembering where
//! every visible byte came from, so annotations can be placed back into the
//! original source.

use serde::{Deserialize, Serialize};

/// Half-open byte range into a text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Smallest span covering both
    pub fn cover(&self, other: &Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Whether the source carries markup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Plain,
    Markup,
}

/// Cleaned text plus the mapping back into its source
#[derive(Debug, Clone)]
pub struct SourceText {
    /// Text handed to the tokenizer
    pub text: String,
    /// Source this text was derived from
    pub source: String,
    pub kind: SourceKind,
    /// Source offset of each visible byte (markup only)
    starts: Vec<usize>,
    /// Source offset just past each visible byte (markup only)
    ends: Vec<usize>,
}

impl SourceText {
    /// Plain text keeps its byte offsets; underscore filler becomes spaces.
    pub fn plain(source: &str) -> Self {
        Self {
            text: blank_filler(source),
            source: source.to_string(),
            kind: SourceKind::Plain,
            starts: Vec::new(),
            ends: Vec::new(),
        }
    }

    /// Reduce markup to its visible text.
    pub fn markup(source: &str) -> Self {
        let visible = VisibleText::extract(source);
        Self {
            text: blank_filler(&visible.text),
            source: source.to_string(),
            kind: SourceKind::Markup,
            starts: visible.starts,
            ends: visible.ends,
        }
    }

    /// Map a span of `text` back to a span of `source`
    pub fn source_span(&self, span: Span) -> Option<Span> {
        match self.kind {
            SourceKind::Plain => (span.end <= self.source.len()).then_some(span),
            SourceKind::Markup => {
                if span.is_empty() || span.end > self.starts.len() {
                    return None;
                }
                Some(Span::new(self.starts[span.start], self.ends[span.end - 1]))
            }
        }
    }

    pub fn slice(&self, span: Span) -> &str {
        self.text.get(span.start..span.end).unwrap_or("")
    }
}

/// Collapse all whitespace runs to single spaces
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Replace runs of two or more underscores with spaces of equal byte length
fn blank_filler(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'_' {
            let run = bytes[i..].iter().take_while(|&&b| b == b'_').count();
            let fill = if run >= 2 { ' ' } else { '_' };
            out.extend(std::iter::repeat(fill).take(run));
            i += run;
        } else {
            let ch_len = text[i..].chars().next().map_or(1, char::len_utf8);
            out.push_str(&text[i..i + ch_len]);
            i += ch_len;
        }
    }
    out
}

const BLOCK_TAGS: &[&str] = &[
    "p", "br", "div", "li", "ul", "ol", "tr", "td", "th", "table", "blockquote", "pre", "h1",
    "h2", "h3", "h4", "h5", "h6", "hr", "center",
];

const SKIPPED_TAGS: &[&str] = &["script", "style", "head", "title"];

struct VisibleText {
    text: String,
    starts: Vec<usize>,
    ends: Vec<usize>,
}

impl VisibleText {
    fn extract(source: &str) -> Self {
        let mut out = Self {
            text: String::with_capacity(source.len()),
            starts: Vec::with_capacity(source.len()),
            ends: Vec::with_capacity(source.len()),
        };

        let mut i = 0;
        while i < source.len() {
            let rest = &source[i..];
            if rest.starts_with("<!--") {
                i += rest.find("-->").map_or(rest.len(), |p| p + 3);
                continue;
            }
            if rest.starts_with('<') {
                let Some(close) = rest.find('>') else {
                    out.push_str("<", i, i + 1);
                    i += 1;
                    continue;
                };
                let tag = tag_name(&rest[1..close]);
                let tag_end = i + close + 1;

                if !rest[1..].starts_with('/') && SKIPPED_TAGS.contains(&tag.as_str()) {
                    let closing = format!("</{tag}");
                    let lower = source[tag_end..].to_ascii_lowercase();
                    i = match lower.find(&closing) {
                        Some(p) => {
                            let after = tag_end + p;
                            after + source[after..].find('>').map_or(source.len() - after, |q| q + 1)
                        }
                        None => source.len(),
                    };
                    continue;
                }

                if BLOCK_TAGS.contains(&tag.as_str()) {
                    out.push_str(" ", i, tag_end);
                }
                i = tag_end;
                continue;
            }
            if rest.starts_with('&') {
                if let Some((decoded, len)) = decode_entity(rest) {
                    let mut buf = [0u8; 4];
                    out.push_str(decoded.encode_utf8(&mut buf), i, i + len);
                    i += len;
                    continue;
                }
            }

            let ch_len = rest.chars().next().map_or(1, char::len_utf8);
            for k in 0..ch_len {
                out.starts.push(i + k);
                out.ends.push(i + k + 1);
            }
            out.text.push_str(&rest[..ch_len]);
            i += ch_len;
        }

        out
    }

    /// Every byte of `s` maps to the whole source range it replaced
    fn push_str(&mut self, s: &str, source_start: usize, source_end: usize) {
        for _ in 0..s.len() {
            self.starts.push(source_start);
            self.ends.push(source_end);
        }
        self.text.push_str(s);
    }
}

fn tag_name(inner: &str) -> String {
    inner
        .trim_start_matches('/')
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

fn decode_entity(rest: &str) -> Option<(char, usize)> {
    let semi = rest.bytes().take(12).position(|b| b == b';')?;
    let name = &rest[1..semi];
    let ch = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" | "#39" => '\'',
        "nbsp" => ' ',
        "sect" => '§',
        "para" => '¶',
        "mdash" => '—',
        "ndash" => '–',
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()?
            } else if let Some(dec) = name.strip_prefix('#') {
                dec.parse::<u32>().ok()?
            } else {
                return None;
            };
            char::from_u32(code)?
        }
    };
    Some((ch, semi + 1))
}
