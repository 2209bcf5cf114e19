//! `citator add-parallel-citations`
//!
//! Reads every selected opinion, counts how often pairs of full citations
//! appear side by side, then fills empty citation slots on clusters from
//! the edges seen often enough. Extraction is CPU bound and runs on the
//! blocking pool, one task per chunk of opinions.

use crate::cli::ParallelCitationsArgs;
use crate::progress::Progress;
use anyhow::{Context, Result};
use citator_citations::parallel::{ClusterStore, PromotionReport};
use citator_citations::{
    build_index, CitationExtractor, CitationPipeline, GroupingSettings, ParallelCitationGraph,
    ParallelPromoter, ReferenceData,
};
use citator_common::config::AppConfig;
use citator_common::db::models::Opinion;
use citator_common::Repository;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct ParallelCitationsSummary {
    pub opinions: usize,
    pub edges: usize,
    pub threshold: u32,
    pub dry_run: bool,
    pub interrupted: bool,
    pub report: PromotionReport,
}

/// Build a partial graph from one chunk of opinions
pub fn chunk_graph(
    extractor: &dyn CitationExtractor,
    settings: &GroupingSettings,
    opinions: &[Opinion],
) -> ParallelCitationGraph {
    let mut graph = ParallelCitationGraph::new();
    for opinion in opinions {
        let source = CitationPipeline::source_text(opinion);
        let extraction = extractor.extract(&source.text);
        graph.add_opinion(opinion.id, extraction.full_citations(), settings);
    }
    graph
}

/// Fan a page out over the blocking pool and merge the results
async fn page_graph(
    extractor: &Arc<dyn CitationExtractor>,
    settings: &GroupingSettings,
    page: Vec<Opinion>,
    per_task: usize,
) -> Result<ParallelCitationGraph> {
    let mut tasks = JoinSet::new();
    for chunk in page.chunks(per_task.max(1)) {
        let chunk = chunk.to_vec();
        let extractor = extractor.clone();
        let settings = settings.clone();
        tasks.spawn_blocking(move || chunk_graph(extractor.as_ref(), &settings, &chunk));
    }

    let mut graph = ParallelCitationGraph::new();
    while let Some(partial) = tasks.join_next().await {
        graph.merge(partial.context("Extraction task panicked")?);
    }
    Ok(graph)
}

pub async fn run(
    config: &AppConfig,
    repository: &Repository,
    args: &ParallelCitationsArgs,
    shutdown: &AtomicBool,
) -> Result<ParallelCitationsSummary> {
    let selection = args.selection()?;
    let threshold = args
        .threshold
        .unwrap_or(config.citations.edge_relevance_threshold);
    let per_task = args
        .opinions_per_task
        .unwrap_or(config.batch.opinions_per_task);
    let dry_run = !args.update_database;
    if dry_run {
        info!("Dry run: no citation slots will be written (pass --update-database)");
    }

    let reference = Arc::new(ReferenceData::load(&config.citations)?);
    let index = build_index(&config.index, repository, config.batch.page_size).await?;
    let pipeline = CitationPipeline::from_config(config, reference.clone(), index)?;
    let settings = GroupingSettings::from_config(&config.citations);

    let total = repository.count_opinions(&selection).await?;
    let mut progress = Progress::new("parallel-citations", total, config.batch.progress_every);
    let mut graph = ParallelCitationGraph::new();
    let mut interrupted = false;
    let mut after_id = 0;

    loop {
        if shutdown.load(Ordering::Relaxed) {
            warn!(opinions = graph.opinions(), "Interrupted, promoting the graph built so far");
            interrupted = true;
            break;
        }

        let page = repository
            .opinions_page(&selection, after_id, config.batch.page_size)
            .await?;
        let Some(last) = page.last().map(|(opinion, _)| opinion.id) else {
            break;
        };
        after_id = last;
        let count = page.len() as u64;
        let opinions = page.into_iter().map(|(opinion, _)| opinion).collect();

        graph.merge(page_graph(pipeline.extractor(), &settings, opinions, per_task).await?);
        progress.advance(count);
    }
    progress.finish();

    info!(
        opinions = graph.opinions(),
        edges = graph.edge_count(),
        threshold,
        "Parallel citation graph built"
    );

    let store: Arc<dyn ClusterStore> = Arc::new(repository.clone());
    let promoter = ParallelPromoter::new(
        pipeline.resolver().clone(),
        reference,
        store,
        threshold,
        dry_run,
    );
    let report = promoter.promote_all(&graph).await;

    Ok(ParallelCitationsSummary {
        opinions: graph.opinions(),
        edges: graph.edge_count(),
        threshold,
        dry_run,
        interrupted,
        report,
    })
}
