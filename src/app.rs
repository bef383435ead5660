use std::{path::Path, sync::Arc, time::Duration};

use anyhow::Result;
use reqwest::Client;
use tokio::{
    task::JoinHandle,
    time::{timeout_at, Instant},
};
use tokio_cron_scheduler::JobScheduler;

use crate::{
    config::AppConfig,
    db::{self, seed, RequestStore, SqliteStore},
    domain::ProcessingJob,
    infrastructure::{directories::ResolvedPaths, shutdown::Shutdown},
    notify::{NotificationDispatcher, SmtpMailer},
    platform::PlatformClient,
    policy::{EngineSettings, ResolutionEngine},
    tasks::{
        processor::JobProcessor,
        queue::JobQueue,
        scheduler::{configure_jobs, Intake},
    },
};

const STOP_GRACE: Duration = Duration::from_secs(5);

pub struct PolicyEngineApp {
    _paths: ResolvedPaths,
    scheduler: JobScheduler,
    processor_handle: JoinHandle<()>,
    store: Arc<SqliteStore>,
    shutdown: Shutdown,
}

impl PolicyEngineApp {
    pub async fn initialize(
        config: AppConfig,
        paths: ResolvedPaths,
        shutdown: Shutdown,
    ) -> Result<Self> {
        let pool = db::init_pool(&paths.db_path).await?;
        let store = Arc::new(SqliteStore::new(pool));

        let mut default_profile = store.ensure_default_profile().await?;
        if let Some(seed_file) = config.directories.seed_file.as_deref() {
            let contents = seed::read_seed(Path::new(seed_file))?;
            if seed::apply_seed(&store, &default_profile, contents).await?.is_some() {
                default_profile = store.ensure_default_profile().await?;
            }
        }
        let default_profile = Arc::new(default_profile);
        let requeued = store.requeue_interrupted().await?;
        tracing::info!(
            target: "db",
            data_dir = %paths.data_dir.display(),
            profile = default_profile.id,
            requeued,
            "store ready"
        );

        let http_client = Client::builder()
            .user_agent(format!("category-policy-rust/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        let platform = Arc::new(PlatformClient::new(http_client, config.platform.clone()));

        let mailer = Arc::new(SmtpMailer::new(&config.smtp)?);
        let dispatcher = Arc::new(NotificationDispatcher::new(
            store.clone(),
            mailer,
            config.smtp.admin_email.clone(),
            config.timezone,
        ));

        let engine = Arc::new(ResolutionEngine::new(
            platform,
            store.clone(),
            store.clone(),
            dispatcher,
            default_profile,
            EngineSettings {
                downgrade_https: config.platform.downgrade_https,
                batch_concurrency: config.workers.batch_concurrency,
                digest_template: config.digest.template.clone(),
                digest_fallback_recipient: config.digest.fallback_recipient.clone(),
            },
        ));

        let queue = Arc::new(JobQueue::<ProcessingJob>::new());
        let processor = Arc::new(JobProcessor::new(
            queue.clone(),
            engine.clone(),
            config.workers.concurrency,
        ));
        let processor_handle = processor.spawn(shutdown.listener());

        let intake = Intake::new(store.clone(), queue, config.workers.claim_limit);
        let scheduler = configure_jobs(&config.scheduler, intake, engine).await?;

        Ok(Self {
            _paths: paths,
            scheduler,
            processor_handle,
            store,
            shutdown,
        })
    }

    pub async fn run(self) -> Result<()> {
        let PolicyEngineApp {
            _paths: _,
            mut scheduler,
            processor_handle,
            store,
            shutdown,
        } = self;

        tracing::info!("category policy engine started");

        let reason = shutdown.listener().stopped().await;
        tracing::info!(%reason, "stopping category policy engine");

        let deadline = Instant::now() + STOP_GRACE;
        stop_scheduler(&mut scheduler, deadline).await;
        join_processor(processor_handle, deadline).await;
        if timeout_at(deadline, store.close()).await.is_err() {
            tracing::warn!(target: "db", "database pool still open at stop deadline");
        }

        tracing::info!("category policy engine stopped");
        Ok(())
    }
}

async fn stop_scheduler(scheduler: &mut JobScheduler, deadline: Instant) {
    match timeout_at(deadline, scheduler.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::error!(target: "scheduler", ?err, "scheduler shutdown failed"),
        Err(_) => tracing::warn!(target: "scheduler", "scheduler still running at stop deadline"),
    }
}

/// Jobs cut off by the abort keep their `queued` rows and are requeued on the next start.
async fn join_processor(handle: JoinHandle<()>, deadline: Instant) {
    let abort = handle.abort_handle();
    match timeout_at(deadline, handle).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) if err.is_panic() => {
            tracing::error!(target: "processor", "job processor panicked")
        }
        Ok(Err(_)) => {}
        Err(_) => {
            tracing::warn!(target: "processor", "job processor still busy at stop deadline; aborting");
            abort.abort();
        }
    }
}
