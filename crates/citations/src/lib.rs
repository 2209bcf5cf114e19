//! Citator Citation Engine
//!
//! Finds legal citations in opinion text and links them to the opinions
//! they cite:
//! - Reference data: reporters, editions, courts
//! - Tokenizing and extraction of full, short, supra and id citations
//! - Reporter disambiguation
//! - Resolution against a corpus index
//! - Annotation of the source text
//! - Parallel citation graph and unmatched citation tracking

pub mod annotator;
pub mod citation;
pub mod disambiguator;
pub mod extractor;
pub mod index;
pub mod parallel;
pub mod pipeline;
pub mod reference;
pub mod resolver;
pub mod text;
pub mod tokenizer;
pub mod unmatched;

// Re-export commonly used types
pub use annotator::{AnnotatedText, Annotator};
pub use citation::{Citation, CitationKey, FullCitation};
pub use extractor::{CitationExtractor, Extraction, ScanSettings, TokenExtractor};
pub use index::{build_index, CorpusIndex, InMemoryIndex, SearchIndexClient};
pub use parallel::{GroupingSettings, ParallelCitationGraph, ParallelPromoter, PromotionOutcome};
pub use pipeline::{CitationPipeline, OpinionAnalysis, OpinionRunReport};
pub use reference::{ReferenceData, ReferenceDataError};
pub use resolver::{CitingContext, MatchedTarget, Resolver};
pub use unmatched::UnmatchedTracker;
