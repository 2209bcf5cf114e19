//! Citator Citation Worker
//!
//! Processes find-citations jobs from SQS queue:
//! 1. Receives a batch of opinion ids from the queue
//! 2. Extracts, resolves and annotates each opinion's citations
//! 3. Writes relationships, unmatched citations and annotated text
//! 4. Deletes the message once the job completed

mod processor;

use crate::processor::{CitationProcessor, ProcessorConfig};
use citator_citations::{build_index, CitationPipeline, ReferenceData};
use citator_common::{
    config::AppConfig,
    db::DbPool,
    metrics,
    observability,
    queue::{FindCitationsJob, Queue, QueueConfig},
    Repository, VERSION,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;
    let config = Arc::new(config);

    observability::init_tracing(&config.observability);
    observability::install_metrics_exporter(&config.observability)?;

    info!("Starting Citator Citation Worker v{}", VERSION);

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;
    let repository = Repository::new(db);

    // Reference data and corpus index
    let reference = Arc::new(ReferenceData::load(&config.citations)?);
    let index = build_index(&config.index, &repository, config.batch.page_size).await?;
    info!(backend = %config.index.backend, "Corpus index ready");

    let pipeline = Arc::new(CitationPipeline::from_config(&config, reference, index)?);
    let processor = CitationProcessor::new(
        repository,
        pipeline,
        ProcessorConfig::from_worker(&config.worker),
    );

    // One-off mode: run a single opinion and print the report
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 2 && args[1] == "once" {
        let opinion_id: i64 = args[2].parse()?;
        info!(opinion_id, "Running a single opinion...");

        match processor.run_opinion(opinion_id).await {
            Ok(report) => println!("{}", serde_json::to_string_pretty(&report)?),
            Err(e) => {
                error!(opinion_id, error = %e, "Citation run failed");
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    // Service mode: poll SQS queue
    let Some(url) = config.queue.citation_queue_url.clone() else {
        warn!("queue.citation_queue_url not set, waiting for shutdown signal...");
        tokio::signal::ctrl_c().await?;
        info!("Citation worker shutting down");
        return Ok(());
    };

    info!(url = %url, "Connecting to citation queue...");
    let citation_queue = Queue::new(QueueConfig::from_app(url, &config.queue)).await?;

    info!("Citation worker ready, starting queue polling...");

    // Circuit breaker state
    let mut consecutive_failures = 0;
    let max_failures = config.worker.max_consecutive_failures;
    let circuit_break = Duration::from_secs(config.worker.circuit_break_secs);

    loop {
        // Circuit breaker check
        if consecutive_failures >= max_failures {
            warn!(
                failures = consecutive_failures,
                "Circuit breaker open, pausing..."
            );
            tokio::time::sleep(circuit_break).await;
            consecutive_failures = 0;
            info!("Circuit breaker reset, resuming...");
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            result = citation_queue.receive::<FindCitationsJob>() => {
                match result {
                    Ok(messages) => {
                        for (job, receipt_handle) in messages {
                            info!(
                                job_id = %job.job_id,
                                opinion_count = job.opinion_ids.len(),
                                "Received citation job"
                            );

                            let job_id = job.job_id;
                            match processor.process_job(job).await {
                                Ok(_) => {
                                    consecutive_failures = 0;
                                    metrics::record_message(true);
                                    // Delete message on success
                                    if let Err(e) = citation_queue.delete(&receipt_handle).await {
                                        error!(error = %e, "Failed to delete message");
                                    }
                                }
                                Err(e) => {
                                    consecutive_failures += 1;
                                    metrics::record_message(false);
                                    error!(
                                        job_id = %job_id,
                                        error = %e,
                                        failures = consecutive_failures,
                                        "Failed to process citation job"
                                    );
                                    // Message will be re-delivered or moved to DLQ
                                }
                            }
                        }
                    }
                    Err(e) => {
                        consecutive_failures += 1;
                        error!(error = %e, "Failed to receive messages from queue");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }
    }

    info!("Citation worker shutting down");
    Ok(())
}
