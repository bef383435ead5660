use std::{sync::Arc, time::Duration};

use futures::{stream, StreamExt};
use tokio::{task::JoinHandle, time::sleep};

use crate::{
    domain::ProcessingJob,
    infrastructure::shutdown::ShutdownListener,
    policy::ResolutionEngine,
    tasks::queue::JobQueue,
};

pub struct JobProcessor {
    queue: Arc<JobQueue<ProcessingJob>>,
    engine: Arc<ResolutionEngine>,
    concurrency: usize,
}

impl JobProcessor {
    pub fn new(
        queue: Arc<JobQueue<ProcessingJob>>,
        engine: Arc<ResolutionEngine>,
        concurrency: usize,
    ) -> Self {
        Self {
            queue,
            engine,
            concurrency: concurrency.max(1),
        }
    }

    pub fn spawn(self: Arc<Self>, mut shutdown: ShutdownListener) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run_loop(&mut shutdown).await;
        })
    }

    async fn run_loop(&self, shutdown: &mut ShutdownListener) {
        loop {
            if shutdown.reason().is_some() {
                break;
            }

            let batch = self.queue.take_all();
            if batch.is_empty() {
                tokio::select! {
                    _ = sleep(Duration::from_millis(500)) => {}
                    _ = shutdown.stopped() => break,
                }
                continue;
            }
            self.handle_batch(batch, shutdown).await;
        }
        tracing::info!(target: "processor", "job processor stopped");
    }

    /// Jobs left unfinished by a shutdown stay `queued` and are picked up on the next start.
    async fn handle_batch(&self, batch: Vec<ProcessingJob>, shutdown: &mut ShutdownListener) {
        tracing::info!(target: "processor", total = batch.len(), "processing batch");
        let work = stream::iter(batch).for_each_concurrent(self.concurrency, |job| self.handle_job(job));
        tokio::select! {
            _ = work => {}
            reason = shutdown.stopped() => {
                tracing::info!(
                    target: "processor",
                    %reason,
                    "stop requested mid-batch; unfinished jobs stay queued"
                );
            }
        }
    }

    async fn handle_job(&self, job: ProcessingJob) {
        let label = job.describe();
        let result = match job {
            ProcessingJob::Access(request) => {
                self.engine
                    .process_access_request(request)
                    .await
                    .map(|outcome| {
                        tracing::debug!(
                            target: "processor",
                            request_id = outcome.request_id,
                            entries = outcome.entries,
                            "job finished"
                        );
                    })
            }
            ProcessingJob::Traffic(report) => {
                self.engine
                    .process_traffic_report(report)
                    .await
                    .map(|outcome| {
                        tracing::debug!(
                            target: "processor",
                            report_id = outcome.report_id,
                            urls = outcome.urls,
                            failed_urls = outcome.failed_urls,
                            recipient = ?outcome.recipient,
                            "job finished"
                        );
                    })
            }
        };
        if let Err(failure) = result {
            tracing::error!(
                target: "processor",
                job = %label,
                subscriber = %failure.subscriber,
                url = %failure.url,
                stage = %failure.stage,
                error = %failure.source,
                "job failed"
            );
        }
    }
}
