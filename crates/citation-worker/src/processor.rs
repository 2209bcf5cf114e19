//! Citation worker processor
//!
//! Runs the citation pipeline for every opinion of a job. Each opinion is
//! isolated: transient failures are retried with backoff, and an opinion
//! that still fails is skipped so the rest of the job completes.

use backoff::{future::retry, ExponentialBackoff};
use citator_citations::{CitationPipeline, OpinionRunReport};
use citator_common::config::WorkerConfig;
use citator_common::errors::AppError;
use citator_common::queue::FindCitationsJob;
use citator_common::Repository;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Retry settings for one opinion
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub max_retries: u32,
    pub retry_max_elapsed: Duration,
}

impl ProcessorConfig {
    pub fn from_worker(config: &WorkerConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_max_elapsed: Duration::from_secs(config.retry_max_elapsed_secs),
        }
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self::from_worker(&WorkerConfig::default())
    }
}

/// Per-job tally
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobOutcome {
    pub processed: usize,
    /// Opinions that failed permanently (missing, bad data)
    pub skipped: usize,
    /// Opinions that still failed transiently after retries
    pub failed: usize,
    pub citations: usize,
    pub matched: usize,
}

impl JobOutcome {
    pub fn record(&mut self, opinion_id: i64, result: Result<OpinionRunReport, AppError>) {
        match result {
            Ok(report) => {
                self.processed += 1;
                self.citations += report.citations;
                self.matched += report.matched;
            }
            Err(e) if e.is_retryable() => {
                self.failed += 1;
                error!(opinion_id, error = %e, "Opinion failed after retries, skipping");
            }
            Err(e) => {
                self.skipped += 1;
                warn!(opinion_id, error = %e, "Opinion skipped");
            }
        }
    }

    /// A job in which nothing succeeded because of transient failures is
    /// handed back to the queue for redelivery.
    pub fn into_result(self, job_id: Uuid) -> Result<JobOutcome, WorkerError> {
        if self.processed == 0 && self.failed > 0 {
            return Err(WorkerError::AllFailed {
                job_id,
                failed: self.failed,
            });
        }
        Ok(self)
    }
}

/// Citation worker processor
pub struct CitationProcessor {
    repository: Repository,
    pipeline: Arc<CitationPipeline>,
    config: ProcessorConfig,
}

impl CitationProcessor {
    pub fn new(
        repository: Repository,
        pipeline: Arc<CitationPipeline>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            repository,
            pipeline,
            config,
        }
    }

    /// Process a find-citations job
    #[instrument(skip(self, job), fields(job_id = %job.job_id, attempt = job.attempt))]
    pub async fn process_job(&self, job: FindCitationsJob) -> Result<JobOutcome, WorkerError> {
        info!(opinion_count = job.opinion_ids.len(), "Processing citation job");

        let mut outcome = JobOutcome::default();
        for &opinion_id in &job.opinion_ids {
            let result = self.run_opinion(opinion_id).await;
            outcome.record(opinion_id, result);
        }

        info!(
            processed = outcome.processed,
            skipped = outcome.skipped,
            failed = outcome.failed,
            citations = outcome.citations,
            matched = outcome.matched,
            "Citation job completed"
        );

        outcome.into_result(job.job_id)
    }

    /// Run one opinion, retrying transient failures
    pub async fn run_opinion(&self, opinion_id: i64) -> Result<OpinionRunReport, AppError> {
        let attempts = AtomicU32::new(0);
        let policy = ExponentialBackoff {
            max_elapsed_time: Some(self.config.retry_max_elapsed),
            ..Default::default()
        };

        let attempts = &attempts;
        retry(policy, || async move {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;

            self.pipeline
                .run_opinion(&self.repository, opinion_id)
                .await
                .map_err(|e| {
                    if e.is_retryable() && attempt <= self.config.max_retries {
                        warn!(opinion_id, attempt, error = %e, "Opinion run failed, retrying");
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
        })
        .await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Every opinion of job {job_id} failed ({failed} opinions)")]
    AllFailed { job_id: Uuid, failed: usize },

    #[error("Pipeline error: {0}")]
    PipelineError(String),

    #[error("Queue error: {0}")]
    QueueError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<AppError> for WorkerError {
    fn from(e: AppError) -> Self {
        match e {
            AppError::QueueError { message } => WorkerError::QueueError(message),
            AppError::Configuration { message } => WorkerError::ConfigError(message),
            other => WorkerError::PipelineError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use citator_common::db::CitationRunStats;
    use tokio_test::assert_ok;

    fn report(citations: usize, matched: usize) -> OpinionRunReport {
        OpinionRunReport {
            opinion_id: 1,
            citations,
            matched,
            unresolved: citations - matched,
            annotations_skipped: 0,
            stats: CitationRunStats::default(),
        }
    }

    fn transient() -> AppError {
        AppError::IndexTimeout { timeout_ms: 1000 }
    }

    #[test]
    fn test_outcome_tallies_each_opinion() {
        let mut outcome = JobOutcome::default();
        outcome.record(1, Ok(report(4, 3)));
        outcome.record(2, Err(AppError::OpinionNotFound { id: 2 }));
        outcome.record(3, Err(transient()));
        outcome.record(4, Ok(report(2, 2)));

        assert_eq!(outcome.processed, 2);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.citations, 6);
        assert_eq!(outcome.matched, 5);
        assert_ok!(outcome.into_result(Uuid::nil()));
    }

    #[test]
    fn test_all_transient_failures_redeliver() {
        let mut outcome = JobOutcome::default();
        outcome.record(1, Err(transient()));
        outcome.record(2, Err(transient()));

        match outcome.into_result(Uuid::nil()) {
            Err(WorkerError::AllFailed { failed, .. }) => assert_eq!(failed, 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_permanent_failures_do_not_redeliver() {
        let mut outcome = JobOutcome::default();
        outcome.record(1, Err(AppError::OpinionNotFound { id: 1 }));
        assert_ok!(outcome.into_result(Uuid::nil()));
    }

    #[test]
    fn test_worker_error_conversion() {
        let err: WorkerError = AppError::QueueError {
            message: "throttled".into(),
        }
        .into();
        assert!(matches!(err, WorkerError::QueueError(_)));

        let err: WorkerError = AppError::OpinionNotFound { id: 9 }.into();
        assert!(matches!(err, WorkerError::PipelineError(_)));
    }
}
