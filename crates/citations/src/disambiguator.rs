//! Reporter disambiguation
//!
//! Resolves a reporter spelling, optionally with a year, to exactly one
//! edition. Resolution order:
//! 1. Canonical edition with a single reporter under its key
//! 2. Canonical edition with several reporters, filtered by year
//! 3. Variation of one canonical edition, then (1)/(2), then a unique variation
//! 4. Variation of several canonical editions, filtered by year and then by
//!    which reporters list the exact spelling
//!
//! Anything still ambiguous yields `None`. Iteration follows the reference
//! tables' fixed order, so the same input always resolves the same way.

use crate::reference::{EditionRef, ReferenceData, Reporter};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Disambiguator {
    reference: Arc<ReferenceData>,
}

impl Disambiguator {
    pub fn new(reference: Arc<ReferenceData>) -> Self {
        Self { reference }
    }

    pub fn disambiguate(&self, spelling: &str, year: Option<i32>) -> Option<EditionRef> {
        if self.reference.edition_key(spelling).is_some() {
            return self.resolve_edition(spelling, year);
        }

        match self.reference.variations_of(spelling) {
            [] => None,
            [canonical] => self
                .resolve_edition(canonical, year)
                .or_else(|| self.resolve_by_variation(canonical, spelling)),
            canonicals => self.resolve_among(canonicals, spelling, year),
        }
    }

    /// Steps 1 and 2 for a canonical edition
    fn resolve_edition(&self, edition: &str, year: Option<i32>) -> Option<EditionRef> {
        let key = self.reference.edition_key(edition)?;
        let reporters = self.reference.reporters(key);

        if reporters.len() == 1 {
            return Some(edition_ref(edition, key, 0));
        }

        let year = year?;
        let mut matches = reporters
            .iter()
            .enumerate()
            .filter(|(_, reporter)| in_range(reporter, edition, year))
            .map(|(index, _)| index);

        match (matches.next(), matches.next()) {
            (Some(index), None) => Some(edition_ref(edition, key, index)),
            _ => None,
        }
    }

    /// A misspelling listed by only one reporter under the key ("Cr." is Cranch's)
    fn resolve_by_variation(&self, edition: &str, spelling: &str) -> Option<EditionRef> {
        let key = self.reference.edition_key(edition)?;
        let mut matches = self
            .reference
            .reporters(key)
            .iter()
            .enumerate()
            .filter(|(_, reporter)| reporter.variations.contains_key(spelling))
            .map(|(index, _)| index);

        match (matches.next(), matches.next()) {
            (Some(index), None) => Some(edition_ref(edition, key, index)),
            _ => None,
        }
    }

    /// Step 4 across several canonical editions
    fn resolve_among(
        &self,
        canonicals: &[String],
        spelling: &str,
        year: Option<i32>,
    ) -> Option<EditionRef> {
        let mut candidates: Vec<(EditionRef, &Reporter)> = Vec::new();
        for canonical in canonicals {
            let Some(key) = self.reference.edition_key(canonical) else {
                continue;
            };
            for (index, reporter) in self.reference.reporters(key).iter().enumerate() {
                if year.map_or(true, |year| in_range(reporter, canonical, year)) {
                    candidates.push((edition_ref(canonical, key, index), reporter));
                }
            }
        }

        if candidates.len() == 1 {
            return candidates.pop().map(|(edition, _)| edition);
        }

        let mut narrowed: Vec<EditionRef> = candidates
            .into_iter()
            .filter(|(edition, reporter)| {
                reporter.variations.get(spelling) == Some(&edition.edition)
            })
            .map(|(edition, _)| edition)
            .collect();

        if narrowed.len() == 1 {
            narrowed.pop()
        } else {
            None
        }
    }
}

fn in_range(reporter: &Reporter, edition: &str, year: i32) -> bool {
    match reporter.editions.get(edition) {
        Some(range) => range.contains_year(year),
        None => reporter.covers_year(year),
    }
}

fn edition_ref(edition: &str, key: &str, index: usize) -> EditionRef {
    EditionRef {
        edition: edition.to_string(),
        reporter_key: key.to_string(),
        index,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disambiguator() -> Disambiguator {
        Disambiguator::new(Arc::new(ReferenceData::bundled().unwrap()))
    }

    #[test]
    fn test_single_edition() {
        let edition = disambiguator().disambiguate("U.S.", Some(1973)).unwrap();
        assert_eq!(edition.edition, "U.S.");
        assert_eq!(edition.reporter_key, "U.S.");
        assert_eq!(edition.index, 0);
    }

    #[test]
    fn test_multiple_reporters_without_year_fail() {
        assert!(disambiguator().disambiguate("How.", None).is_none());
    }

    #[test]
    fn test_multiple_reporters_filtered_by_year() {
        let d = disambiguator();
        assert_eq!(d.disambiguate("How.", Some(1850)).unwrap().index, 0);
        assert_eq!(d.disambiguate("How.", Some(1838)).unwrap().index, 1);
        assert!(d.disambiguate("How.", Some(1900)).is_none());
    }

    #[test]
    fn test_single_variation() {
        let edition = disambiguator().disambiguate("F. 2d", None).unwrap();
        assert_eq!(edition.edition, "F.2d");
        assert_eq!(edition.reporter_key, "F.");
    }

    #[test]
    fn test_unique_variation_picks_reporter() {
        let edition = disambiguator().disambiguate("Cr.", None).unwrap();
        assert_eq!(edition.edition, "Cranch");
        assert_eq!(edition.index, 0);
    }

    #[test]
    fn test_variation_of_several_editions() {
        let d = disambiguator();
        let edition = d.disambiguate("Wn", Some(1950)).unwrap();
        assert_eq!(edition.edition, "Wash. 2d");
        assert!(d.disambiguate("Wn", Some(1975)).is_none());
        assert!(d.disambiguate("Wn", None).is_none());
    }

    #[test]
    fn test_unknown_spelling() {
        assert!(disambiguator().disambiguate("Nope.", Some(2000)).is_none());
    }

    #[test]
    fn test_deterministic() {
        let d = disambiguator();
        let first = d.disambiguate("Wash.", Some(1792));
        for _ in 0..10 {
            assert_eq!(d.disambiguate("Wash.", Some(1792)), first);
        }
        assert_eq!(first.unwrap().index, 1);
    }
}
