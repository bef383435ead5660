use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};

use crate::{
    db::{ReferenceStore, RequestStatus, RequestStore},
    domain::{
        AccessRequest, FilterProfile, ProcessingRequest, SubscriberId, SubscriberInfo,
        TrafficReportJob,
    },
    error::{EngineError, NotificationError, RequestFailure, Stage},
    notify::{template::replace_placeholders, NotificationDispatcher},
    platform::{api, FilterPlatform},
};

use super::{
    classifier::{ActionClassifier, RuleScope},
    digest::{DigestAccumulator, DigestRenderer},
    disambiguator::{disambiguate, take_bucket, Decision},
    executor::{ExecutedAction, RuleExecutor},
    normalizer::{canonical_request_url, report_key_from_link},
    resolver::CategoryResolver,
    sync::SyncEngine,
};

/// How results leave the engine once an item is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Push the item's entries right away and send its email actions.
    PushEachItem,
    /// Keep executed actions for one digest covering the whole batch.
    AggregateDigest,
}

impl SyncMode {
    fn scope(self) -> RuleScope {
        match self {
            SyncMode::PushEachItem => RuleScope::Request,
            SyncMode::AggregateDigest => RuleScope::Traffic,
        }
    }
}

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub downgrade_https: bool,
    pub batch_concurrency: usize,
    pub digest_template: String,
    pub digest_fallback_recipient: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ItemOutcome {
    pub decision: Decision,
    pub executed: Vec<ExecutedAction>,
    /// Size of the pushed URL list when a sync happened.
    pub synced: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessOutcome {
    pub request_id: i64,
    pub action_done: String,
    pub entries: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestOutcome {
    pub report_id: i64,
    pub urls: usize,
    pub failed_urls: usize,
    /// Address the digest went to; `None` when nothing was sent.
    pub recipient: Option<String>,
}

pub struct ResolutionEngine {
    platform: Arc<dyn FilterPlatform>,
    store: Arc<dyn ReferenceStore>,
    requests: Arc<dyn RequestStore>,
    dispatcher: Arc<NotificationDispatcher>,
    resolver: CategoryResolver,
    classifier: ActionClassifier,
    executor: RuleExecutor,
    sync: SyncEngine,
    digest: DigestRenderer,
    settings: EngineSettings,
    clock: Clock,
}

impl ResolutionEngine {
    pub fn new(
        platform: Arc<dyn FilterPlatform>,
        store: Arc<dyn ReferenceStore>,
        requests: Arc<dyn RequestStore>,
        dispatcher: Arc<NotificationDispatcher>,
        default_profile: Arc<FilterProfile>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            resolver: CategoryResolver::new(platform.clone(), store.clone(), default_profile),
            classifier: ActionClassifier::new(store.clone()),
            executor: RuleExecutor::new(dispatcher.clone()),
            sync: SyncEngine::new(platform.clone()),
            digest: DigestRenderer::new(store.clone()),
            platform,
            store,
            requests,
            dispatcher,
            settings,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// resolve → classify → disambiguate → execute, then sync in `PushEachItem` mode.
    pub async fn resolve_item(
        &self,
        request: &mut ProcessingRequest,
        profile: &FilterProfile,
        mode: SyncMode,
    ) -> Result<ItemOutcome, RequestFailure> {
        let resolved = self
            .resolver
            .resolve(&request.url)
            .await
            .map_err(|err| item_failure(request, Stage::Resolve, err))?;
        request.categories = resolved.categories;

        let buckets = self
            .classifier
            .buckets(&request.categories, profile, mode.scope())
            .await
            .map_err(|err| item_failure(request, Stage::Classify, err))?;

        let decision = disambiguate(&buckets, request.categories.len());
        tracing::debug!(
            target: "ranker",
            subscriber = %request.subscriber,
            url = %request.url,
            matched = request.categories.len(),
            lookup_failed = resolved.lookup_failed,
            decision = ?decision,
            "bucket decided"
        );

        let Some(bucket) = decision.bucket().and_then(|key| take_bucket(buckets, key)) else {
            return Ok(ItemOutcome {
                decision,
                executed: Vec::new(),
                synced: None,
            });
        };

        let now = (self.clock)();
        let executed = self
            .executor
            .execute(
                request,
                &bucket.actions,
                now,
                mode == SyncMode::PushEachItem,
            )
            .await;
        request.chosen = Some(bucket);

        let synced = if mode == SyncMode::PushEachItem && !request.entries.is_empty() {
            let total = self
                .sync
                .sync(&request.subscriber, &request.entries)
                .await
                .map_err(|err| item_failure(request, Stage::Sync, err))?;
            Some(total)
        } else {
            None
        };

        Ok(ItemOutcome {
            decision,
            executed,
            synced,
        })
    }

    /// Processes one access request row and records its outcome on the row.
    pub async fn process_access_request(
        &self,
        row: AccessRequest,
    ) -> Result<AccessOutcome, RequestFailure> {
        let result = self.run_access_request(&row).await;
        let recorded = match &result {
            Ok(outcome) => {
                self.requests
                    .finish_access_request(row.id, RequestStatus::Done, Some(outcome.action_done.as_str()))
                    .await
            }
            Err(_) => {
                self.requests
                    .finish_access_request(row.id, RequestStatus::Failed, None)
                    .await
            }
        };

        match (result, recorded) {
            (Ok(outcome), Ok(())) => {
                tracing::info!(
                    target: "processor",
                    request_id = row.id,
                    subscriber = %row.subscriber_id,
                    entries = outcome.entries,
                    action_done = %outcome.action_done,
                    "access request done"
                );
                Ok(outcome)
            }
            (Ok(_), Err(err)) => Err(RequestFailure::new(
                row.subscriber_id.as_str(),
                row.requested_url.as_str(),
                Stage::Record,
                err,
            )),
            (Err(failure), recorded) => {
                if let Err(err) = recorded {
                    tracing::error!(target: "db", request_id = row.id, error = %err, "failed to mark request as failed");
                }
                Err(failure)
            }
        }
    }

    async fn run_access_request(&self, row: &AccessRequest) -> Result<AccessOutcome, RequestFailure> {
        let subscriber = SubscriberId::new(row.subscriber_id.as_str());
        let url = canonical_request_url(&row.requested_url, self.settings.downgrade_https);
        let known = SubscriberInfo {
            full_name: row.client_name.clone(),
            email: row.client_email.clone(),
        };

        let mut request = ProcessingRequest::new(subscriber, url).with_request_id(row.id);
        let client = self
            .refresh_client(&request.subscriber, known)
            .await
            .map_err(|err| item_failure(&request, Stage::Resolve, err))?;
        request = request.with_client(client);

        let profile = self
            .resolver
            .profile_for(&request.client)
            .await
            .map_err(|err| item_failure(&request, Stage::Resolve, err))?;

        self.resolve_item(&mut request, &profile, SyncMode::PushEachItem)
            .await?;

        Ok(AccessOutcome {
            request_id: row.id,
            action_done: request.action_done_summary(),
            entries: request.entries.len(),
        })
    }

    /// Platform name and email override what the row carried; lookup failures keep the row's values.
    async fn refresh_client(
        &self,
        subscriber: &SubscriberId,
        known: SubscriberInfo,
    ) -> Result<SubscriberInfo, EngineError> {
        let numeric = subscriber.numeric()?;
        match self.platform.find_subscriber(numeric).await {
            Ok(Some(found)) => Ok(SubscriberInfo {
                full_name: if found.full_name.is_empty() {
                    known.full_name
                } else {
                    found.full_name
                },
                email: if found.email.is_empty() {
                    known.email
                } else {
                    found.email
                },
            }),
            Ok(None) => {
                tracing::info!(target: "platform", subscriber = %subscriber, "subscriber not found on platform");
                Ok(known)
            }
            Err(err) => {
                tracing::warn!(target: "platform", subscriber = %subscriber, error = %err, "subscriber lookup failed");
                Ok(known)
            }
        }
    }

    /// Runs every blocked URL of a traffic report and mails one digest.
    pub async fn process_traffic_report(
        &self,
        job: TrafficReportJob,
    ) -> Result<DigestOutcome, RequestFailure> {
        let result = self.run_traffic_report(&job).await;
        let status = if result.is_ok() {
            RequestStatus::Done
        } else {
            RequestStatus::Failed
        };
        let recorded = self.requests.finish_traffic_report(job.id, status).await;

        match (result, recorded) {
            (Ok(outcome), Ok(())) => Ok(outcome),
            (Ok(_), Err(err)) => Err(RequestFailure::new(
                "",
                job.report_key.as_str(),
                Stage::Record,
                err,
            )),
            (Err(failure), recorded) => {
                if let Err(err) = recorded {
                    tracing::error!(target: "db", report_id = job.id, error = %err, "failed to mark report as failed");
                }
                Err(failure)
            }
        }
    }

    async fn run_traffic_report(&self, job: &TrafficReportJob) -> Result<DigestOutcome, RequestFailure> {
        let report_failure =
            |stage, err: EngineError| RequestFailure::new("", job.report_key.as_str(), stage, err);

        let key = report_key_from_link(&job.report_key).unwrap_or(job.report_key.as_str());
        let report = self
            .platform
            .traffic_record(key)
            .await
            .map_err(|err| report_failure(Stage::Resolve, err.into()))?;
        let subscriber = report.subscriber.clone().ok_or_else(|| {
            report_failure(
                Stage::Resolve,
                api::malformed(api::TRAFFIC_RECORD_PATH, "no subscriber marker in record").into(),
            )
        })?;

        let subscriber_failure = |stage, err: EngineError| {
            RequestFailure::new(subscriber.as_str(), job.report_key.as_str(), stage, err)
        };
        let client = self
            .refresh_client(&subscriber, SubscriberInfo::default())
            .await
            .map_err(|err| subscriber_failure(Stage::Resolve, err))?;
        let profile = self
            .resolver
            .profile_for(&client)
            .await
            .map_err(|err| subscriber_failure(Stage::Resolve, err.into()))?;

        if !profile.traffic_recording {
            tracing::info!(
                target: "digest",
                subscriber = %subscriber,
                profile = profile.id,
                "traffic recording disabled; report skipped"
            );
            return Ok(DigestOutcome {
                report_id: job.id,
                urls: 0,
                failed_urls: 0,
                recipient: None,
            });
        }

        let urls: Vec<String> = report
            .blocked_urls
            .iter()
            .map(|url| canonical_request_url(url, self.settings.downgrade_https))
            .collect();
        let concurrency = self.settings.batch_concurrency.max(1);
        let results: Vec<Result<ItemOutcome, RequestFailure>> = stream::iter(urls.clone())
            .map(|url| {
                let subscriber = subscriber.clone();
                let client = client.clone();
                let profile = profile.clone();
                async move {
                    let mut request = ProcessingRequest::new(subscriber, url).with_client(client);
                    self.resolve_item(&mut request, &profile, SyncMode::AggregateDigest)
                        .await
                }
            })
            .buffered(concurrency)
            .collect()
            .await;

        let mut accumulator = DigestAccumulator::default();
        let mut failed_urls = 0;
        for result in results {
            match result {
                Ok(outcome) => {
                    for action in &outcome.executed {
                        accumulator.record(action);
                    }
                }
                Err(failure) => {
                    failed_urls += 1;
                    tracing::warn!(target: "digest", error = %failure, "traffic url skipped");
                }
            }
        }

        if accumulator.is_empty() && report.denied_urls.is_empty() {
            tracing::info!(target: "digest", subscriber = %subscriber, urls = urls.len(), "nothing to report");
            return Ok(DigestOutcome {
                report_id: job.id,
                urls: urls.len(),
                failed_urls,
                recipient: None,
            });
        }

        let recipient = self.digest_recipient(&client);
        self.send_digest(&accumulator, &report.denied_urls, &client, &recipient)
            .await
            .map_err(|err| subscriber_failure(Stage::Digest, err))?;

        tracing::info!(
            target: "digest",
            subscriber = %subscriber,
            urls = urls.len(),
            failed_urls,
            groups = accumulator.groups().len(),
            to = %recipient,
            "digest sent"
        );
        Ok(DigestOutcome {
            report_id: job.id,
            urls: urls.len(),
            failed_urls,
            recipient: Some(recipient),
        })
    }

    fn digest_recipient(&self, client: &SubscriberInfo) -> String {
        let email = client.email.trim();
        if !email.is_empty() {
            return email.to_string();
        }
        self.settings
            .digest_fallback_recipient
            .clone()
            .filter(|address| !address.trim().is_empty())
            .unwrap_or_else(|| self.dispatcher.admin_email().to_string())
    }

    async fn send_digest(
        &self,
        accumulator: &DigestAccumulator,
        denied_urls: &[String],
        client: &SubscriberInfo,
        recipient: &str,
    ) -> Result<(), EngineError> {
        let values = self
            .digest
            .placeholders(accumulator, denied_urls, &client.email)
            .await?;
        let template = self
            .store
            .email_template(&self.settings.digest_template)
            .await?
            .ok_or_else(|| NotificationError::TemplateMissing(self.settings.digest_template.clone()))?;

        let pairs = || values.iter().map(|(key, value)| (key.as_str(), value.as_str()));
        let subject = replace_placeholders(&template.subject, pairs());
        let html = replace_placeholders(&template.html, pairs());
        self.dispatcher
            .send_rendered(recipient, subject, html)
            .await?;
        Ok(())
    }

    /// Mirrors the platform's category catalogue into the local store.
    pub async fn sync_categories(&self) -> Result<usize, EngineError> {
        let entries = self.platform.list_categories().await?;
        for entry in &entries {
            self.store
                .upsert_category(entry.tag_id, &entry.description)
                .await?;
        }
        tracing::info!(target: "scheduler", categories = entries.len(), "category catalogue synced");
        Ok(entries.len())
    }
}

fn item_failure(request: &ProcessingRequest, stage: Stage, err: impl Into<EngineError>) -> RequestFailure {
    RequestFailure::new(
        request.subscriber.as_str(),
        request.url.as_str(),
        stage,
        err,
    )
}
