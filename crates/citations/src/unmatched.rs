//! Unmatched citation tracking
//!
//! Full citations that do not resolve are remembered per citing opinion so
//! later runs can tell when the corpus has caught up:
//! - `found`: no candidates the first time it was seen
//! - `failed`: a `found` row still unresolved on a rerun
//! - `failed_ambiguous`: more than one candidate, or an ambiguous reporter
//! - `resolved`: resolves now; never changes again

use crate::citation::{CitationKey, FullCitation};
use citator_common::config::CitationsConfig;
use citator_common::db::models::{UnmatchedCitation, UnmatchedStatus};
use citator_common::db::NewUnmatchedCitation;
use std::collections::HashSet;

/// Why a full citation did not resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnresolvedReason {
    /// The corpus had no candidate
    NoCandidates,
    /// The corpus had several candidates
    MultipleCandidates,
    /// The reporter could not be pinned to one edition
    AmbiguousReporter,
}

impl UnresolvedReason {
    pub fn from_candidates(candidates: usize) -> Self {
        if candidates > 1 {
            UnresolvedReason::MultipleCandidates
        } else {
            UnresolvedReason::NoCandidates
        }
    }

    fn initial_status(self) -> UnmatchedStatus {
        match self {
            UnresolvedReason::NoCandidates => UnmatchedStatus::Found,
            UnresolvedReason::MultipleCandidates | UnresolvedReason::AmbiguousReporter => {
                UnmatchedStatus::FailedAmbiguous
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedCitation {
    pub citation: FullCitation,
    pub reason: UnresolvedReason,
}

/// Row changes for one citing opinion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerPlan {
    pub status_updates: Vec<(i64, UnmatchedStatus)>,
    pub new_rows: Vec<NewUnmatchedCitation>,
}

#[derive(Debug, Clone)]
pub struct UnmatchedTracker {
    volume_ceiling: u32,
}

impl Default for UnmatchedTracker {
    fn default() -> Self {
        Self::from_config(&CitationsConfig::default())
    }
}

impl UnmatchedTracker {
    pub fn new(volume_ceiling: u32) -> Self {
        Self { volume_ceiling }
    }

    pub fn from_config(config: &CitationsConfig) -> Self {
        Self::new(config.volume_ceiling)
    }

    /// Whether a citation may be stored at all
    pub fn is_valid_candidate(&self, citation: &FullCitation, own_citations: &[CitationKey]) -> bool {
        if citation.reporter.trim().is_empty() || citation.volume == 0 || citation.page == 0 {
            return false;
        }
        if citation.volume >= self.volume_ceiling || i16::try_from(citation.volume).is_err() {
            return false;
        }
        !own_citations.contains(&citation.key())
    }

    /// Compute status transitions and inserts for a rerun.
    ///
    /// `resolved` holds the base citation strings that resolved this run.
    pub fn plan(
        &self,
        existing: &[UnmatchedCitation],
        resolved: &HashSet<String>,
        unresolved: &[UnresolvedCitation],
        own_citations: &[CitationKey],
    ) -> TrackerPlan {
        let mut plan = TrackerPlan::default();

        for row in existing {
            let current = row.unmatched_status();
            let next = if current.is_terminal() {
                continue;
            } else if resolved.contains(&row.citation_string) {
                UnmatchedStatus::Resolved
            } else if current == UnmatchedStatus::Found {
                UnmatchedStatus::Failed
            } else {
                continue;
            };
            plan.status_updates.push((row.id, next));
        }

        let mut seen: HashSet<String> = existing
            .iter()
            .map(|row| row.citation_string.clone())
            .collect();

        for candidate in unresolved {
            let citation = &candidate.citation;
            let citation_string = citation.base_citation();
            if resolved.contains(&citation_string) || seen.contains(&citation_string) {
                continue;
            }
            if !self.is_valid_candidate(citation, own_citations) {
                continue;
            }
            let Ok(volume) = i16::try_from(citation.volume) else {
                continue;
            };

            seen.insert(citation_string.clone());
            plan.new_rows.push(NewUnmatchedCitation {
                citation_string,
                volume,
                reporter: citation.reporter.clone(),
                page: citation.page.to_string(),
                court_id: citation.court.clone(),
                year: citation.year,
                status: candidate.reason.initial_status(),
            });
        }

        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::Span;
    use chrono::Utc;

    fn full(volume: u32, reporter: &str, page: u32) -> FullCitation {
        FullCitation {
            volume,
            reporter: reporter.to_string(),
            reporter_found: reporter.to_string(),
            page,
            year: Some(1990),
            court: Some("ca2".to_string()),
            extra: None,
            pin_cite: None,
            plaintiff: None,
            defendant: None,
            span: Span::new(0, 1),
            token_index: 1,
            edition: None,
        }
    }

    fn unresolved(volume: u32, reporter: &str, page: u32, candidates: usize) -> UnresolvedCitation {
        UnresolvedCitation {
            citation: full(volume, reporter, page),
            reason: UnresolvedReason::from_candidates(candidates),
        }
    }

    fn row(id: i64, citation: &str, status: UnmatchedStatus) -> UnmatchedCitation {
        let key = CitationKey::parse(citation).unwrap();
        let now = Utc::now().into();
        UnmatchedCitation {
            id,
            citing_opinion_id: 1,
            status: status.into(),
            citation_string: citation.to_string(),
            volume: key.volume as i16,
            reporter: key.reporter,
            page: key.page.to_string(),
            court_id: None,
            year: None,
            date_created: now,
            date_modified: now,
        }
    }

    fn strings(values: &[&str]) -> HashSet<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_first_sighting_is_found() {
        let plan = UnmatchedTracker::default().plan(
            &[],
            &HashSet::new(),
            &[unresolved(123, "F.2d", 456, 0)],
            &[],
        );
        assert!(plan.status_updates.is_empty());
        assert_eq!(plan.new_rows.len(), 1);
        assert_eq!(plan.new_rows[0].citation_string, "123 F.2d 456");
        assert_eq!(plan.new_rows[0].status, UnmatchedStatus::Found);
        assert_eq!(plan.new_rows[0].court_id.as_deref(), Some("ca2"));
    }

    #[test]
    fn test_multiple_candidates_are_ambiguous() {
        let plan = UnmatchedTracker::default().plan(
            &[],
            &HashSet::new(),
            &[unresolved(600, "F.2d", 10, 2)],
            &[],
        );
        assert_eq!(plan.new_rows[0].status, UnmatchedStatus::FailedAmbiguous);
    }

    #[test]
    fn test_found_then_resolved() {
        let existing = [row(5, "123 F.2d 456", UnmatchedStatus::Found)];
        let plan = UnmatchedTracker::default().plan(&existing, &strings(&["123 F.2d 456"]), &[], &[]);
        assert_eq!(plan.status_updates, vec![(5, UnmatchedStatus::Resolved)]);
        assert!(plan.new_rows.is_empty());
    }

    #[test]
    fn test_found_still_unresolved_becomes_failed() {
        let existing = [row(5, "123 F.2d 456", UnmatchedStatus::Found)];
        let plan = UnmatchedTracker::default().plan(
            &existing,
            &HashSet::new(),
            &[unresolved(123, "F.2d", 456, 0)],
            &[],
        );
        assert_eq!(plan.status_updates, vec![(5, UnmatchedStatus::Failed)]);
        assert!(plan.new_rows.is_empty());
    }

    #[test]
    fn test_failed_rows_stay_put() {
        let existing = [
            row(5, "123 F.2d 456", UnmatchedStatus::Failed),
            row(6, "600 F.2d 10", UnmatchedStatus::FailedAmbiguous),
        ];
        let plan = UnmatchedTracker::default().plan(&existing, &HashSet::new(), &[], &[]);
        assert!(plan.status_updates.is_empty());
    }

    #[test]
    fn test_resolved_never_reverts() {
        let existing = [row(5, "123 F.2d 456", UnmatchedStatus::Resolved)];
        let plan = UnmatchedTracker::default().plan(
            &existing,
            &HashSet::new(),
            &[unresolved(123, "F.2d", 456, 0)],
            &[],
        );
        assert!(plan.status_updates.is_empty());
        assert!(plan.new_rows.is_empty());
    }

    #[test]
    fn test_new_rows_deduplicated() {
        let plan = UnmatchedTracker::default().plan(
            &[],
            &HashSet::new(),
            &[unresolved(123, "F.2d", 456, 0), unresolved(123, "F.2d", 456, 0)],
            &[],
        );
        assert_eq!(plan.new_rows.len(), 1);
    }

    #[test]
    fn test_validity_gate() {
        let tracker = UnmatchedTracker::default();
        let own = [CitationKey::new(1, "U.S.", 1)];

        assert!(tracker.is_valid_candidate(&full(123, "F.2d", 456), &own));
        assert!(!tracker.is_valid_candidate(&full(32767, "F.2d", 456), &own));
        assert!(!tracker.is_valid_candidate(&full(40000, "F.2d", 456), &own));
        assert!(!tracker.is_valid_candidate(&full(1, "U.S.", 1), &own));
        assert!(!tracker.is_valid_candidate(&full(1, " ", 1), &own));
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let tracker = UnmatchedTracker::default();
        let candidates = [unresolved(123, "F.2d", 456, 0)];
        let first = tracker.plan(&[], &HashSet::new(), &candidates, &[]);
        assert_eq!(first.new_rows.len(), 1);

        // The row now exists as FAILED after the second run
        let existing = [row(1, "123 F.2d 456", UnmatchedStatus::Failed)];
        let again = tracker.plan(&existing, &HashSet::new(), &candidates, &[]);
        assert!(again.new_rows.is_empty());
        assert!(again.status_updates.is_empty());
    }
}
