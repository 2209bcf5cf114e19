//! Reporter and court reference data
//!
//! Static, versioned tables loaded once at process start:
//! - Reporters keyed by canonical abbreviation, each with dated editions
//! - Edition lookup (edition abbreviation -> reporter key)
//! - Variation lookup (non-canonical spelling -> canonical editions)
//! - Court registry with citation prefixes
//!
//! The loaded [`ReferenceData`] is shared read-only behind an `Arc`.

use chrono::{Datelike, NaiveDate};
use citator_common::config::CitationsConfig;
use citator_common::errors::AppError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::{info, warn};

const BUNDLED_REPORTERS: &str = include_str!("../data/reporters.json");
const BUNDLED_COURTS: &str = include_str!("../data/courts.json");

/// Classification of a reporter, used to pick a citation slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CiteType {
    Federal,
    State,
    StateRegional,
    Neutral,
    Specialty,
    ScotusEarly,
    Lexis,
    Westlaw,
    Journal,
    #[serde(other)]
    Other,
}

/// Valid publication range of one edition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditionRange {
    pub start: NaiveDate,
    /// Open-ended when the edition is still published
    pub end: Option<NaiveDate>,
}

impl EditionRange {
    pub fn contains_year(&self, year: i32) -> bool {
        self.start.year() <= year && self.end.map_or(true, |end| year <= end.year())
    }

    pub fn start_year(&self) -> i32 {
        self.start.year()
    }

    pub fn end_year(&self) -> Option<i32> {
        self.end.map(|end| end.year())
    }
}

/// One reporter series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reporter {
    pub name: String,
    pub cite_type: CiteType,
    pub editions: BTreeMap<String, EditionRange>,
    #[serde(default)]
    pub variations: BTreeMap<String, String>,
}

impl Reporter {
    /// Early national high-court reporters carry no court parenthetical
    pub fn is_high_court(&self) -> bool {
        match self.cite_type {
            CiteType::ScotusEarly => true,
            CiteType::Federal => self.name.to_lowercase().contains("supreme"),
            _ => false,
        }
    }

    /// Whether any edition of this reporter was published in `year`
    pub fn covers_year(&self, year: i32) -> bool {
        self.editions.values().any(|range| range.contains_year(year))
    }
}

/// A court and the prefix used for it in citation parentheticals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Court {
    pub id: String,
    pub citation_string: String,
    #[serde(default)]
    pub name: String,
}

/// A single disambiguated edition: which reporter, and under which key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EditionRef {
    /// Canonical edition abbreviation, e.g. "F.2d"
    pub edition: String,
    /// Reporter key, e.g. "F."
    pub reporter_key: String,
    /// Position of the reporter under its key
    pub index: usize,
}

#[derive(Debug, Error)]
pub enum ReferenceDataError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid reference data: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Edition {edition} listed under both {first} and {second}")]
    DuplicateEdition {
        edition: String,
        first: String,
        second: String,
    },

    #[error("Variation {variation} points at unknown edition {edition}")]
    UnknownEdition { variation: String, edition: String },

    #[error("Reporter pattern failed to compile: {0}")]
    Pattern(#[from] regex_lite::Error),
}

impl From<ReferenceDataError> for AppError {
    fn from(e: ReferenceDataError) -> Self {
        AppError::ReferenceData {
            message: e.to_string(),
        }
    }
}

/// Read-only reporter and court tables
#[derive(Debug)]
pub struct ReferenceData {
    reporters: BTreeMap<String, Vec<Reporter>>,
    editions: HashMap<String, String>,
    variations: HashMap<String, Vec<String>>,
    courts: Vec<Court>,
}

impl ReferenceData {
    /// Build from raw reporter and court tables
    pub fn new(
        reporters: BTreeMap<String, Vec<Reporter>>,
        courts: Vec<Court>,
    ) -> Result<Self, ReferenceDataError> {
        let mut editions: HashMap<String, String> = HashMap::new();
        for (key, group) in &reporters {
            for reporter in group {
                for edition in reporter.editions.keys() {
                    match editions.get(edition) {
                        Some(first) if first != key => {
                            return Err(ReferenceDataError::DuplicateEdition {
                                edition: edition.clone(),
                                first: first.clone(),
                                second: key.clone(),
                            });
                        }
                        Some(_) => {}
                        None => {
                            editions.insert(edition.clone(), key.clone());
                        }
                    }
                }
            }
        }

        let mut variations: HashMap<String, Vec<String>> = HashMap::new();
        for group in reporters.values() {
            for reporter in group {
                for (variation, canonical) in &reporter.variations {
                    if !editions.contains_key(canonical) {
                        return Err(ReferenceDataError::UnknownEdition {
                            variation: variation.clone(),
                            edition: canonical.clone(),
                        });
                    }
                    // Spellings that are editions in their own right are looked up directly
                    if editions.contains_key(variation) {
                        continue;
                    }
                    let targets = variations.entry(variation.clone()).or_default();
                    if !targets.contains(canonical) {
                        targets.push(canonical.clone());
                    }
                }
            }
        }

        Ok(Self {
            reporters,
            editions,
            variations,
            courts,
        })
    }

    /// Parse reporter and court tables from JSON text
    pub fn from_json(reporters: &str, courts: &str) -> Result<Self, ReferenceDataError> {
        let reporters: BTreeMap<String, Vec<Reporter>> = serde_json::from_str(reporters)?;
        let courts: Vec<Court> = serde_json::from_str(courts)?;
        Self::new(reporters, courts)
    }

    /// Tables compiled into the binary
    pub fn bundled() -> Result<Self, ReferenceDataError> {
        Self::from_json(BUNDLED_REPORTERS, BUNDLED_COURTS)
    }

    /// Load the configured tables, falling back to the bundled ones
    pub fn load(config: &CitationsConfig) -> Result<Self, ReferenceDataError> {
        if config.reporters_path.is_none() || config.courts_path.is_none() {
            warn!(
                reporters_path = ?config.reporters_path,
                courts_path = ?config.courts_path,
                "Using bundled reference subset; set citations.reporters_path and citations.courts_path for full coverage"
            );
        }
        let reporters = match &config.reporters_path {
            Some(path) => read_file(path)?,
            None => BUNDLED_REPORTERS.to_string(),
        };
        let courts = match &config.courts_path {
            Some(path) => read_file(path)?,
            None => BUNDLED_COURTS.to_string(),
        };

        let data = Self::from_json(&reporters, &courts)?;
        info!(
            reporters = data.reporters.len(),
            editions = data.editions.len(),
            variations = data.variations.len(),
            courts = data.courts.len(),
            "Reference data loaded"
        );
        Ok(data)
    }

    /// Every string the tokenizer should treat as a reporter
    pub fn reporter_strings(&self) -> Vec<&str> {
        self.editions
            .keys()
            .chain(self.variations.keys())
            .map(String::as_str)
            .collect()
    }

    pub fn is_reporter_string(&self, s: &str) -> bool {
        self.editions.contains_key(s) || self.variations.contains_key(s)
    }

    /// Reporter key for a canonical edition abbreviation
    pub fn edition_key(&self, edition: &str) -> Option<&str> {
        self.editions.get(edition).map(String::as_str)
    }

    /// Reporters listed under a key
    pub fn reporters(&self, key: &str) -> &[Reporter] {
        self.reporters.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Canonical editions a non-canonical spelling may stand for
    pub fn variations_of(&self, spelling: &str) -> &[String] {
        self.variations.get(spelling).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn reporter(&self, edition: &EditionRef) -> Option<&Reporter> {
        self.reporters(&edition.reporter_key).get(edition.index)
    }

    /// Date range of the referenced edition
    pub fn edition_range(&self, edition: &EditionRef) -> Option<&EditionRange> {
        self.reporter(edition)
            .and_then(|reporter| reporter.editions.get(&edition.edition))
    }

    pub fn cite_type(&self, edition: &EditionRef) -> Option<CiteType> {
        self.reporter(edition).map(|reporter| reporter.cite_type)
    }

    pub fn courts(&self) -> &[Court] {
        &self.courts
    }

    /// Map parenthetical court text ("2d Cir") to a court.
    ///
    /// An exact match wins; otherwise the first court whose citation string
    /// starts with the text, since parentheticals often drop the final period.
    pub fn court_by_prefix(&self, court_str: &str) -> Option<&Court> {
        let court_str = court_str.trim();
        if court_str.is_empty() {
            return None;
        }

        self.courts
            .iter()
            .find(|court| court.citation_string.trim_end_matches('.') == court_str)
            .or_else(|| {
                self.courts
                    .iter()
                    .find(|court| court.citation_string.starts_with(court_str))
            })
    }
}

fn read_file(path: &str) -> Result<String, ReferenceDataError> {
    std::fs::read_to_string(path).map_err(|source| ReferenceDataError::Io {
        path: path.to_string(),
        source,
    })
}
