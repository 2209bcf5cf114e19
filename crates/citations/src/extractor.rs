//! Citation extraction
//!
//! Walks the token stream looking for reporter, "supra", "id." and "§"
//! tokens and builds citations from the words around them. Windows that do
//! not parse are dropped without error; most reporter tokens in running text
//! are not citations.

use crate::citation::{
    Citation, FullCitation, IdCitation, NonOpinionCitation, PinCite, ShortCitation, SupraCitation,
};
use crate::disambiguator::Disambiguator;
use crate::reference::{ReferenceData, ReferenceDataError};
use crate::text::Span;
use crate::tokenizer::{Token, Tokenizer};
use chrono::{Datelike, Utc};
use citator_common::config::CitationsConfig;
use std::sync::Arc;
use tracing::trace;

const ID_TOKENS: &[&str] = &["id.", "id.,", "ibid."];

/// Words that may sit between an id token and its page
const ID_PAGE_LITERALS: &[&str] = &["at", "p.", "p", "pp.", "@", "pg", "pg.", "¶", "¶¶"];

/// Interchangeable extraction strategy
pub trait CitationExtractor: Send + Sync {
    fn extract(&self, text: &str) -> Extraction;
}

/// Result of extracting one text
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Citations in document order, reporters disambiguated
    pub citations: Vec<Citation>,
    /// Full citations dropped because their reporter stayed ambiguous
    pub ambiguous: Vec<FullCitation>,
}

impl Extraction {
    pub fn full_citations(&self) -> impl Iterator<Item = &FullCitation> {
        self.citations.iter().filter_map(Citation::as_full)
    }
}

/// Scan windows and heuristics
#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub forward_seek: usize,
    pub backward_seek: usize,
    pub stop_tokens: Vec<String>,
    pub min_year: i32,
    pub max_year: i32,
    pub high_court_id: String,
}

impl ScanSettings {
    pub fn from_config(config: &CitationsConfig) -> Self {
        Self {
            forward_seek: config.forward_seek,
            backward_seek: config.backward_seek,
            stop_tokens: config.stop_tokens.iter().map(|t| t.to_lowercase()).collect(),
            min_year: config.min_year,
            max_year: Utc::now().year() + 1,
            high_court_id: config.high_court_id.clone(),
        }
    }
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self::from_config(&CitationsConfig::default())
    }
}

/// Extractor driven by the reporter tokenizer
#[derive(Debug, Clone)]
pub struct TokenExtractor {
    reference: Arc<ReferenceData>,
    tokenizer: Tokenizer,
    disambiguator: Disambiguator,
    settings: ScanSettings,
}

impl TokenExtractor {
    pub fn new(
        reference: Arc<ReferenceData>,
        settings: ScanSettings,
    ) -> Result<Self, ReferenceDataError> {
        let tokenizer = Tokenizer::new(&reference)?;
        let disambiguator = Disambiguator::new(reference.clone());
        Ok(Self {
            reference,
            tokenizer,
            disambiguator,
            settings,
        })
    }

    pub fn reference(&self) -> &Arc<ReferenceData> {
        &self.reference
    }

    fn full_citation(&self, words: &[Token<'_>], ri: usize) -> Option<FullCitation> {
        if ri == 0 || ri + 1 >= words.len() {
            return None;
        }
        let volume = parse_number(words[ri - 1].text)?;
        let page = parse_number(words[ri + 1].text)?;

        let mut citation = FullCitation {
            volume,
            reporter: words[ri].text.to_string(),
            reporter_found: words[ri].text.to_string(),
            page,
            year: None,
            court: None,
            extra: None,
            pin_cite: None,
            plaintiff: None,
            defendant: None,
            span: trimmed(&words[ri - 1]).cover(&trimmed(&words[ri + 1])),
            token_index: ri,
            edition: None,
        };
        self.add_post_citation(&mut citation, words);
        self.add_defendant(&mut citation, words);
        Some(citation)
    }

    /// Year, court and pin cite from the text after the page:
    /// "123 F.2d 345, 347 (4th Cir. 1990)"
    fn add_post_citation(&self, citation: &mut FullCitation, words: &[Token<'_>]) {
        let ri = citation.token_index;
        let limit = (ri + self.settings.forward_seek).min(words.len());

        for start in (ri + 2)..limit {
            if !words[start].text.starts_with('(') {
                continue;
            }

            let end_limit = (start + self.settings.forward_seek).min(words.len());
            if let Some(end) = (start..end_limit).find(|&end| words[end].text.contains(')')) {
                // The closing paren is sometimes split from the year
                let year_token = if words[end].text.starts_with(')') && end > start {
                    words[end - 1].text
                } else {
                    words[end].text
                };
                citation.year = self.year(year_token);
                citation.court = self.court(&join(&words[start..=end]), citation.year);
            }

            if start > ri + 2 {
                let between = &words[ri + 2..start];
                citation.extra = Some(join(between));
                citation.pin_cite = pin_cite(between);
            }
            break;
        }

        // "515 U.S. 200, 240." with no parenthetical
        if citation.pin_cite.is_none() && words[ri + 1].text.ends_with(',') {
            if let Some(next) = words.get(ri + 2) {
                citation.pin_cite = pin_cite(std::slice::from_ref(next));
            }
        }
    }

    /// Scan back from the volume to a stop token for the party names
    fn add_defendant(&self, citation: &mut FullCitation, words: &[Token<'_>]) {
        let ri = citation.token_index;
        let lower = ri.saturating_sub(self.settings.backward_seek);

        let mut start_index = None;
        for index in (lower + 1..ri).rev() {
            let word = words[index].text;
            if word == "," {
                continue;
            }
            if self.is_stop_token(word) {
                if word == "v." {
                    citation.plaintiff = Some(trim_commas(words[index - 1].text));
                }
                start_index = Some(index + 1);
                break;
            }
            if word.ends_with(';') {
                // String citation
                break;
            }
        }

        if let Some(start) = start_index {
            if start < ri - 1 {
                let defendant = trim_commas(&join(&words[start..ri - 1]));
                if !defendant.is_empty() {
                    citation.defendant = Some(defendant);
                }
            }
        }
    }

    /// "Adarand, 515 U.S., at 241"
    fn short_citation(&self, words: &[Token<'_>], ri: usize) -> Option<ShortCitation> {
        if ri <= 2 {
            return None;
        }
        let volume = parse_number(words[ri - 1].text)?;

        // A comma may sit between the reporter and "at"
        let (page_index, page) = [ri + 2, ri + 3]
            .into_iter()
            .filter(|&i| i < words.len())
            .find_map(|i| parse_number(words[i].text).map(|page| (i, page)))?;

        let antecedent_guess = match words[ri - 2].text {
            "," => format!("{},", words[ri - 3].text),
            other => other.to_string(),
        };

        Some(ShortCitation {
            volume,
            reporter: words[ri].text.to_string(),
            reporter_found: words[ri].text.to_string(),
            page,
            antecedent_guess: Some(antecedent_guess),
            span: trimmed(&words[ri - 1]).cover(&trimmed(&words[page_index])),
            token_index: ri,
            edition: None,
        })
    }

    fn is_stop_token(&self, word: &str) -> bool {
        let cleaned = strip_punct(word).to_lowercase();
        self.settings.stop_tokens.iter().any(|t| *t == cleaned)
    }

    fn year(&self, token: &str) -> Option<i32> {
        let cleaned = strip_punct(token);
        let digits = if !cleaned.is_empty() && cleaned.bytes().all(|b| b.is_ascii_digit()) {
            cleaned.as_str()
        } else if cleaned.len() >= 4 && cleaned.as_bytes()[..4].iter().all(u8::is_ascii_digit) {
            &cleaned[..4]
        } else {
            return None;
        };
        if digits.len() != 4 {
            return None;
        }
        let year: i32 = digits.parse().ok()?;
        (self.settings.min_year..=self.settings.max_year)
            .contains(&year)
            .then_some(year)
    }

    /// "(2d Cir. 1990)" -> "ca2"
    fn court(&self, paren: &str, year: Option<i32>) -> Option<String> {
        let court_text = match year {
            Some(year) => paren.find(&year.to_string()).map_or(paren, |i| &paren[..i]),
            None => paren,
        };
        self.reference
            .court_by_prefix(&strip_punct(court_text))
            .map(|court| court.id.clone())
    }

    fn finish(&self, candidates: Vec<Citation>) -> Extraction {
        let mut extraction = Extraction::default();

        for candidate in candidates {
            match candidate {
                Citation::Full(mut full) => {
                    match self.disambiguator.disambiguate(&full.reporter_found, full.year) {
                        Some(edition) => {
                            full.reporter = edition.edition.clone();
                            if full.court.is_none()
                                && self
                                    .reference
                                    .reporter(&edition)
                                    .is_some_and(|r| r.is_high_court())
                            {
                                full.court = Some(self.settings.high_court_id.clone());
                            }
                            full.edition = Some(edition);
                            extraction.citations.push(Citation::Full(full));
                        }
                        None => {
                            trace!(citation = %full.base_citation(), "Reporter is ambiguous");
                            extraction.ambiguous.push(full);
                        }
                    }
                }
                Citation::Short(mut short) => {
                    match self.disambiguator.disambiguate(&short.reporter_found, None) {
                        Some(edition) => {
                            short.reporter = edition.edition.clone();
                            short.edition = Some(edition);
                            extraction.citations.push(Citation::Short(short));
                        }
                        None => trace!(reporter = %short.reporter_found, "Dropping short form"),
                    }
                }
                other => extraction.citations.push(other),
            }
        }

        extraction
    }
}

impl CitationExtractor for TokenExtractor {
    fn extract(&self, text: &str) -> Extraction {
        let words = self.tokenizer.tokenize(text);
        let mut candidates = Vec::new();

        // The last token can never start a citation
        for i in 0..words.len().saturating_sub(1) {
            let token = &words[i];
            let lower = token.text.to_lowercase();

            let candidate = if token.is_reporter {
                match self.full_citation(&words, i) {
                    Some(full) => Some(Citation::Full(full)),
                    None => self.short_citation(&words, i).map(Citation::Short),
                }
            } else if ID_TOKENS.contains(&lower.as_str()) {
                Some(Citation::Id(id_citation(&words, i)))
            } else if strip_punct(&lower) == "supra" {
                supra_citation(&words, i).map(Citation::Supra)
            } else if token.text.contains('§') {
                Some(Citation::NonOpinion(NonOpinionCitation {
                    span: token.span,
                    token_index: i,
                }))
            } else {
                None
            };

            if let Some(citation) = candidate {
                candidates.push(citation);
            }
        }

        self.finish(candidates)
    }
}

/// "Adarand, supra, at 240" or "Adarand, 515 supra, at 240"
fn supra_citation(words: &[Token<'_>], i: usize) -> Option<SupraCitation> {
    if i <= 1 {
        return None;
    }

    let page = words.get(i + 2).and_then(|t| parse_number(t.text));

    let previous = words[i - 1].text;
    let mut volume = None;
    let (antecedent_guess, antecedent_index) =
        if !previous.is_empty() && previous.bytes().all(|b| b.is_ascii_digit()) {
            volume = previous.parse().ok();
            (words[i - 2].text.to_string(), i - 2)
        } else if previous == "," {
            (format!("{},", words[i - 2].text), i - 2)
        } else {
            (previous.to_string(), i - 1)
        };

    let end = match page {
        Some(_) => trimmed(&words[i + 2]).end,
        None => trimmed(&words[i]).end,
    };

    Some(SupraCitation {
        antecedent_guess,
        volume,
        page,
        span: Span::new(words[antecedent_index].span.start, end),
        token_index: i,
    })
}

/// "Id." followed by an optional run of page tokens
fn id_citation(words: &[Token<'_>], i: usize) -> IdCitation {
    let is_page_candidate =
        |t: &Token<'_>| ID_PAGE_LITERALS.contains(&t.text) || leading_number(t.text).is_some();

    let has_page = words.get(i + 1).is_some_and(is_page_candidate);
    let mut end = i + 1;
    if has_page {
        end = i + 2;
        while words.get(end).is_some_and(is_page_candidate) {
            end += 1;
        }
    }

    let after = &words[i + 1..end];
    let page = after.iter().find_map(|t| leading_number(t.text));
    let span = match after.last() {
        Some(last) => words[i].span.cover(&trimmed(last)),
        None => words[i].span,
    };

    IdCitation {
        page,
        has_page,
        span,
        token_index: i,
    }
}

/// First page number among the words after a citation
fn pin_cite(words: &[Token<'_>]) -> Option<PinCite> {
    words.iter().find_map(|token| {
        let page = leading_number(token.text)?;
        Some(PinCite {
            page,
            span: trimmed(token),
        })
    })
}

/// Integer token, ignoring surrounding punctuation
fn parse_number(token: &str) -> Option<u32> {
    let cleaned = strip_punct(token);
    if cleaned.is_empty() || !cleaned.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    cleaned.parse().ok()
}

/// Leading page of a token like "241", "347-348" or "12." ("23rd" is not a page)
fn leading_number(token: &str) -> Option<u32> {
    let cleaned = strip_punct(token);
    let digits: String = cleaned.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    match cleaned[digits.len()..].chars().next() {
        None | Some('-') | Some('–') => digits.parse().ok(),
        _ => None,
    }
}

/// Drop quotes, brackets and sentence punctuation around a token
pub(crate) fn strip_punct(token: &str) -> String {
    let mut s = token.trim();
    if let Some(rest) = s.strip_prefix(['"', '\'']) {
        s = rest;
    }

    let mut cleaned = s.replace("``", "").replace("...", "").replace("--", "");
    cleaned.retain(|c| {
        !matches!(
            c,
            ',' | ';' | ':' | '@' | '#' | '$' | '%' | '&' | '?' | '!' | '(' | ')' | '[' | ']' | '{'
                | '}' | '<' | '>' | '"'
        )
    });

    let mut cleaned = cleaned.trim().to_string();
    if cleaned.ends_with('.') && !cleaned.ends_with("..") {
        cleaned.pop();
    }
    while cleaned.ends_with('\'') {
        cleaned.pop();
    }
    cleaned.trim().to_string()
}

fn trim_commas(s: &str) -> String {
    s.trim().trim_end_matches(',').trim().to_string()
}

fn join(words: &[Token<'_>]) -> String {
    words.iter().map(|t| t.text).collect::<Vec<_>>().join(" ")
}

/// Token span without leading or trailing punctuation
fn trimmed(token: &Token<'_>) -> Span {
    let text = token.text;
    let lead = text.len() - text.trim_start_matches(|c: char| !c.is_alphanumeric()).len();
    let keep = text.trim_end_matches(|c: char| !c.is_alphanumeric()).len();
    if keep <= lead {
        return token.span;
    }
    Span::new(token.span.start + lead, token.span.start + keep)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> TokenExtractor {
        let reference = Arc::new(ReferenceData::bundled().unwrap());
        TokenExtractor::new(reference, ScanSettings::default()).unwrap()
    }

    fn only_full(extraction: &Extraction) -> &FullCitation {
        let full: Vec<_> = extraction.full_citations().collect();
        assert_eq!(full.len(), 1, "{:?}", extraction.citations);
        full[0]
    }

    #[test]
    fn test_supreme_court_citation() {
        let extraction = extractor().extract("410 U.S. 113 (1973)");
        let citation = only_full(&extraction);
        assert_eq!(citation.volume, 410);
        assert_eq!(citation.reporter, "U.S.");
        assert_eq!(citation.page, 113);
        assert_eq!(citation.year, Some(1973));
        assert_eq!(citation.court.as_deref(), Some("scotus"));
        assert_eq!(citation.edition.as_ref().unwrap().edition, "U.S.");
    }

    #[test]
    fn test_ambiguous_reporter_dropped() {
        let extraction = extractor().extract("2 How. 202");
        assert!(extraction.citations.is_empty());
        assert_eq!(extraction.ambiguous.len(), 1);
        assert_eq!(extraction.ambiguous[0].base_citation(), "2 How. 202");
    }

    #[test]
    fn test_reporter_at_edges_never_cites() {
        let e = extractor();
        let first = e.extract("U.S. 113 was cited");
        assert!(first.citations.is_empty() && first.ambiguous.is_empty());
        let last = e.extract("see volume 410 U.S.");
        assert!(last.citations.is_empty() && last.ambiguous.is_empty());
    }

    #[test]
    fn test_parties_court_and_pin_cite() {
        let text = "See Smith v. Jones, 123 F.2d 456, 458 (2d Cir. 1990).";
        let extraction = extractor().extract(text);
        let citation = only_full(&extraction);
        assert_eq!(citation.reporter, "F.2d");
        assert_eq!(citation.year, Some(1990));
        assert_eq!(citation.court.as_deref(), Some("ca2"));
        assert_eq!(citation.plaintiff.as_deref(), Some("Smith"));
        assert_eq!(citation.defendant.as_deref(), Some("Jones"));
        assert_eq!(citation.extra.as_deref(), Some("458"));

        let pin = citation.pin_cite.unwrap();
        assert_eq!(pin.page, 458);
        assert_eq!(&text[pin.span.start..pin.span.end], "458");
        assert_eq!(&text[citation.span.start..citation.span.end], "123 F.2d 456");
    }

    #[test]
    fn test_implausible_year_rejected() {
        let extraction = extractor().extract("cited 1 U.S. 1 (1066)");
        assert_eq!(only_full(&extraction).year, None);
    }

    #[test]
    fn test_variation_is_canonicalized() {
        let extraction = extractor().extract("in 5 F. 3d 10 (1995)");
        let citation = only_full(&extraction);
        assert_eq!(citation.reporter, "F.3d");
        assert_eq!(citation.reporter_found, "F. 3d");
    }

    #[test]
    fn test_short_form() {
        let extraction = extractor().extract("See Adarand, 515 U.S., at 241.");
        match &extraction.citations[..] {
            [Citation::Short(short)] => {
                assert_eq!(short.volume, 515);
                assert_eq!(short.reporter, "U.S.");
                assert_eq!(short.page, 241);
                assert_eq!(short.antecedent_guess.as_deref(), Some("Adarand,"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_supra() {
        let extraction = extractor().extract("See Adarand, supra, at 240.");
        match &extraction.citations[..] {
            [Citation::Supra(supra)] => {
                assert_eq!(supra.antecedent_guess, "Adarand,");
                assert_eq!(supra.page, Some(240));
                assert_eq!(supra.volume, None);
            }
            other => panic!("unexpected {other:?}"),
        }

        let with_volume = extractor().extract("See Adarand, 515 supra, at 240.");
        match &with_volume.citations[..] {
            [Citation::Supra(supra)] => {
                assert_eq!(supra.antecedent_guess, "Adarand,");
                assert_eq!(supra.volume, Some(515));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_id_with_page() {
        let text = "Id., at 5. The court";
        let extraction = extractor().extract(text);
        match &extraction.citations[..] {
            [Citation::Id(id)] => {
                assert!(id.has_page);
                assert_eq!(id.page, Some(5));
                assert_eq!(&text[id.span.start..id.span.end], "Id., at 5");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_id_without_page() {
        let extraction = extractor().extract("Ibid. The court");
        match &extraction.citations[..] {
            [Citation::Id(id)] => {
                assert!(!id.has_page);
                assert_eq!(id.page, None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_section_marker() {
        let extraction = extractor().extract("under 42 U.S.C. § 1983 the");
        assert!(matches!(&extraction.citations[..], [Citation::NonOpinion(_)]));
    }

    #[test]
    fn test_street_address_is_not_a_citation() {
        let extraction = extractor().extract("located at 111 S.W. 23rd St. in Dallas");
        assert!(extraction.citations.is_empty());
        assert!(extraction.ambiguous.is_empty());
    }

    #[test]
    fn test_string_citation_stops_party_scan() {
        let text = "Foo v. Bar, 1 U.S. 1 (1801); Baz Co., 2 U.S. 2 (1802)";
        let extraction = extractor().extract(text);
        let citations: Vec<_> = extraction.full_citations().collect();
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].defendant.as_deref(), Some("Bar"));
        assert_eq!(citations[1].defendant, None);
    }

    #[test]
    fn test_malformed_input_never_panics() {
        let e = extractor();
        for text in ["", "U.S.", "( ) U.S. (", "1 U.S. (", "Id.", "supra", "§", "1 F.2d 2 (2d"] {
            let _ = e.extract(text);
        }
    }

    #[test]
    fn test_strip_punct() {
        assert_eq!(strip_punct("v."), "v");
        assert_eq!(strip_punct("(1973)"), "1973");
        assert_eq!(strip_punct("\"Wade,\""), "Wade");
        assert_eq!(strip_punct("(2d Cir. "), "2d Cir");
        assert_eq!(strip_punct("aff'd"), "aff'd");
    }
}
