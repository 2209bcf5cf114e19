//! `citator find-citations`
//!
//! Splits a selection of opinions into jobs and sends them to a named
//! worker queue:
//! 1. Resolves the queue by name
//! 2. Optionally wipes the unmatched citation table (full runs only)
//! 3. Pages opinion ids in id order and chunks them into jobs
//! 4. Throttles on the queue backlog before each send

use crate::cli::FindCitationsArgs;
use crate::progress::Progress;
use crate::throttle::{BacklogSource, QueueThrottle, ThrottleSettings};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use citator_common::config::AppConfig;
use citator_common::metrics;
use citator_common::queue::{FindCitationsJob, Queue, QueueConfig};
use citator_common::{OpinionSelection, Repository};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Where dispatched jobs go
#[async_trait]
pub trait JobSink: Send + Sync {
    async fn dispatch(&self, job: &FindCitationsJob) -> citator_common::Result<String>;
}

#[async_trait]
impl JobSink for Queue {
    async fn dispatch(&self, job: &FindCitationsJob) -> citator_common::Result<String> {
        self.send(job).await
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub queue: String,
    pub selected: u64,
    pub dispatched_opinions: u64,
    pub jobs: u64,
    pub unmatched_deleted: Option<u64>,
    pub interrupted: bool,
}

/// Chunks ids into jobs and sends them under the throttle
pub struct Dispatcher {
    queue_name: String,
    sink: Arc<dyn JobSink>,
    throttle: QueueThrottle,
    opinions_per_task: usize,
}

impl Dispatcher {
    pub fn new(
        queue_name: impl Into<String>,
        sink: Arc<dyn JobSink>,
        throttle: QueueThrottle,
        opinions_per_task: usize,
    ) -> Self {
        Self {
            queue_name: queue_name.into(),
            sink,
            throttle,
            opinions_per_task: opinions_per_task.max(1),
        }
    }

    /// Send one page of ids. Stops early, returning the number of opinions
    /// sent, once `shutdown` is set.
    pub async fn dispatch_page(
        &mut self,
        ids: &[i64],
        shutdown: &AtomicBool,
        summary: &mut DispatchSummary,
    ) -> Result<u64> {
        let mut sent = 0;
        for chunk in ids.chunks(self.opinions_per_task) {
            if shutdown.load(Ordering::Relaxed) {
                summary.interrupted = true;
                break;
            }

            let depth = self.throttle.maybe_wait().await?;
            let job = FindCitationsJob::new(chunk.to_vec());
            self.sink
                .dispatch(&job)
                .await
                .with_context(|| format!("Failed to send job {}", job.job_id))?;

            metrics::record_dispatch(&self.queue_name, chunk.len(), depth);
            summary.jobs += 1;
            summary.dispatched_opinions += chunk.len() as u64;
            sent += chunk.len() as u64;
        }
        Ok(sent)
    }
}

pub async fn run(
    config: &AppConfig,
    repository: &Repository,
    args: &FindCitationsArgs,
    shutdown: &AtomicBool,
) -> Result<DispatchSummary> {
    let selection = args.selection()?;
    let queue_name = args
        .queue
        .clone()
        .unwrap_or_else(|| config.batch.default_queue.clone());
    let url = config
        .queue_url(&queue_name)
        .ok_or_else(|| anyhow!("Unknown queue '{}' (see queue.queue_urls)", queue_name))?;

    let queue = Arc::new(Queue::new(QueueConfig::from_app(url, &config.queue)).await?);
    let throttle = QueueThrottle::new(
        queue.clone() as Arc<dyn BacklogSource>,
        ThrottleSettings {
            min_items: args
                .throttle_min_items
                .unwrap_or(config.batch.throttle_min_items),
            min_wait: Duration::from_secs(config.batch.throttle_poll_secs),
            max_wait: Duration::from_secs(config.batch.throttle_max_wait_secs),
        },
    );
    let mut dispatcher = Dispatcher::new(
        queue_name.clone(),
        queue,
        throttle,
        args.opinions_per_task.unwrap_or(config.batch.opinions_per_task),
    );

    let mut summary = DispatchSummary {
        queue: queue_name,
        ..Default::default()
    };

    if args.wipe_unmatched && selection == OpinionSelection::All {
        let deleted = repository.delete_all_unmatched().await?;
        warn!(deleted, "Deleted every unmatched citation");
        summary.unmatched_deleted = Some(deleted);
    }

    summary.selected = repository.count_opinions(&selection).await?;
    info!(
        queue = %summary.queue,
        selected = summary.selected,
        "Dispatching find-citations jobs"
    );

    let mut progress = Progress::new("find-citations", summary.selected, config.batch.progress_every);
    let mut after_id = 0;
    loop {
        let ids = repository
            .opinion_ids_page(&selection, after_id, config.batch.page_size)
            .await?;
        let Some(&last) = ids.last() else {
            break;
        };
        after_id = last;

        let sent = dispatcher.dispatch_page(&ids, shutdown, &mut summary).await?;
        progress.advance(sent);
        if summary.interrupted {
            warn!(
                dispatched = summary.dispatched_opinions,
                "Interrupted, stopping dispatch"
            );
            break;
        }
    }

    progress.finish();
    Ok(summary)
}
