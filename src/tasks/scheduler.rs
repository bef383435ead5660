use std::{future::Future, sync::Arc};

use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::{
    config::SchedulerConfig,
    db::RequestStore,
    domain::ProcessingJob,
    error::StoreError,
    policy::ResolutionEngine,
    tasks::queue::JobQueue,
};

/// Moves pending rows from the store into the in-memory queue.
#[derive(Clone)]
pub struct Intake {
    requests: Arc<dyn RequestStore>,
    queue: Arc<JobQueue<ProcessingJob>>,
    claim_limit: i64,
}

impl Intake {
    pub fn new(
        requests: Arc<dyn RequestStore>,
        queue: Arc<JobQueue<ProcessingJob>>,
        claim_limit: i64,
    ) -> Self {
        Self {
            requests,
            queue,
            claim_limit,
        }
    }

    pub async fn enqueue_access_requests(&self) -> Result<usize, StoreError> {
        let claimed = self.requests.claim_access_requests(self.claim_limit).await?;
        Ok(self
            .queue
            .enqueue(claimed.into_iter().map(ProcessingJob::Access)))
    }

    pub async fn enqueue_traffic_reports(&self) -> Result<usize, StoreError> {
        let claimed = self.requests.claim_traffic_reports(self.claim_limit).await?;
        Ok(self
            .queue
            .enqueue(claimed.into_iter().map(ProcessingJob::Traffic)))
    }

    fn log_enqueued(&self, kind: &'static str, result: Result<usize, StoreError>) {
        match result {
            Ok(0) => {}
            Ok(count) => {
                let snapshot = self.queue.snapshot();
                tracing::info!(
                    target: "scheduler",
                    kind,
                    count,
                    waiting_requests = snapshot.access_requests,
                    waiting_traffic = snapshot.traffic_reports,
                    "rows enqueued"
                );
            }
            Err(err) => tracing::error!(target: "scheduler", kind, error = %err, "poll failed"),
        }
    }
}

pub async fn configure_jobs(
    config: &SchedulerConfig,
    intake: Intake,
    engine: Arc<ResolutionEngine>,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let access = intake.clone();
    register(&scheduler, &config.request_poll_cron, "request-poll", move || {
        let intake = access.clone();
        async move {
            let result = intake.enqueue_access_requests().await;
            intake.log_enqueued("access_request", result);
        }
    })
    .await?;

    let traffic = intake;
    register(&scheduler, &config.traffic_poll_cron, "traffic-poll", move || {
        let intake = traffic.clone();
        async move {
            let result = intake.enqueue_traffic_reports().await;
            intake.log_enqueued("traffic_report", result);
        }
    })
    .await?;

    register(&scheduler, &config.category_sync_cron, "category-sync", move || {
        let engine = engine.clone();
        async move {
            if let Err(err) = engine.sync_categories().await {
                tracing::error!(target: "scheduler", error = %err, "category sync failed");
            }
        }
    })
    .await?;

    scheduler.start().await?;
    Ok(scheduler)
}

async fn register<F, Fut>(
    scheduler: &JobScheduler,
    cron: &str,
    name: &'static str,
    task: F,
) -> Result<()>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let task = Arc::new(task);
    let job = Job::new_async(cron, move |_id, _l| {
        let task = task.clone();
        Box::pin(async move {
            tracing::debug!(target: "scheduler", job = name, "job triggered");
            task().await;
        })
    })?;
    scheduler.add(job).await?;
    tracing::info!(target: "scheduler", job = name, %cron, "job registered");
    Ok(())
}
