//! Citation value objects
//!
//! Citations are never stored directly; they live for one pipeline run.
//! [`CitationKey`] is the reporter/volume/page identity used for graph
//! de-duplication and for matching against stored citation strings, and is
//! kept apart from the structural equality of [`FullCitation`].

use crate::reference::EditionRef;
use crate::text::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Page cited inside the cited opinion, with its location in the text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinCite {
    pub page: u32,
    pub span: Span,
}

/// Reporter + volume + page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullCitation {
    pub volume: u32,
    /// Canonical edition once disambiguated, the spelling found before that
    pub reporter: String,
    /// Spelling as it appeared in the text
    pub reporter_found: String,
    pub page: u32,
    pub year: Option<i32>,
    pub court: Option<String>,
    /// Verbatim text between the page and the parenthetical
    pub extra: Option<String>,
    pub pin_cite: Option<PinCite>,
    pub plaintiff: Option<String>,
    pub defendant: Option<String>,
    /// Volume through page
    pub span: Span,
    /// Index of the reporter token
    pub token_index: usize,
    pub edition: Option<EditionRef>,
}

impl FullCitation {
    pub fn key(&self) -> CitationKey {
        CitationKey {
            volume: self.volume,
            reporter: self.reporter.clone(),
            page: self.page,
        }
    }

    /// "410 U.S. 113"
    pub fn base_citation(&self) -> String {
        self.key().to_string()
    }
}

/// "Adarand, 515 U.S., at 241"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortCitation {
    pub volume: u32,
    pub reporter: String,
    pub reporter_found: String,
    pub page: u32,
    pub antecedent_guess: Option<String>,
    pub span: Span,
    pub token_index: usize,
    pub edition: Option<EditionRef>,
}

/// "Adarand, supra, at 240"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupraCitation {
    pub antecedent_guess: String,
    pub volume: Option<u32>,
    pub page: Option<u32>,
    pub span: Span,
    pub token_index: usize,
}

/// "Id., at 5" or "Ibid."
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdCitation {
    pub page: Option<u32>,
    /// Only linked when a page follows the id token
    pub has_page: bool,
    pub span: Span,
    pub token_index: usize,
}

/// Statute or regulation marker ("§"); only kept so an id citation after it
/// does not resolve to an earlier case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonOpinionCitation {
    pub span: Span,
    pub token_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Citation {
    Full(FullCitation),
    Short(ShortCitation),
    Supra(SupraCitation),
    Id(IdCitation),
    NonOpinion(NonOpinionCitation),
}

impl Citation {
    pub fn span(&self) -> Span {
        match self {
            Citation::Full(c) => c.span,
            Citation::Short(c) => c.span,
            Citation::Supra(c) => c.span,
            Citation::Id(c) => c.span,
            Citation::NonOpinion(c) => c.span,
        }
    }

    pub fn token_index(&self) -> usize {
        match self {
            Citation::Full(c) => c.token_index,
            Citation::Short(c) => c.token_index,
            Citation::Supra(c) => c.token_index,
            Citation::Id(c) => c.token_index,
            Citation::NonOpinion(c) => c.token_index,
        }
    }

    pub fn as_full(&self) -> Option<&FullCitation> {
        match self {
            Citation::Full(c) => Some(c),
            _ => None,
        }
    }

    /// Pin-cite page, when one was found
    pub fn pin_page(&self) -> Option<u32> {
        match self {
            Citation::Full(c) => c.pin_cite.map(|p| p.page),
            Citation::Short(c) => Some(c.page),
            Citation::Supra(c) => c.page,
            Citation::Id(c) => c.page,
            Citation::NonOpinion(_) => None,
        }
    }
}

/// Fuzzy identity: only volume, reporter and page take part
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CitationKey {
    pub volume: u32,
    pub reporter: String,
    pub page: u32,
}

impl CitationKey {
    pub fn new(volume: u32, reporter: impl Into<String>, page: u32) -> Self {
        Self {
            volume,
            reporter: reporter.into(),
            page,
        }
    }

    /// Parse a stored "volume reporter page" string
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let (volume, rest) = s.split_once(' ')?;
        let (reporter, page) = rest.rsplit_once(' ')?;
        let reporter = reporter.trim();
        if reporter.is_empty() {
            return None;
        }
        Some(Self {
            volume: volume.parse().ok()?,
            reporter: reporter.to_string(),
            page: page.parse().ok()?,
        })
    }
}

impl fmt::Display for CitationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.volume, self.reporter, self.page)
    }
}
