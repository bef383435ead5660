use std::fmt;

use thiserror::Error;

/// Non-success or unreadable answers from the filtering platform.
#[derive(Debug, Error)]
pub enum ExternalServiceError {
    #[error("{endpoint} answered with status {status}")]
    Status { endpoint: &'static str, status: u16 },
    #[error("{endpoint} returned an unexpected payload: {reason}")]
    Malformed {
        endpoint: &'static str,
        reason: String,
    },
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("platform login did not return a session cookie")]
    MissingSession,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("unsupported duration unit `{0}`; use Minutes, Hours, Days or Weeks")]
    UnsupportedUnit(String),
    #[error("malformed duration `{0}`")]
    InvalidDuration(String),
    #[error("duration of {amount} {unit} overflows the timestamp range")]
    DurationOverflow { amount: i64, unit: &'static str },
    #[error("subscriber id `{0}` contains no digits")]
    InvalidSubscriberId(String),
    #[error("no filter profile could be resolved")]
    MissingProfile,
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("email template `{0}` does not exist")]
    TemplateMissing(String),
    #[error("invalid email address `{address}`: {reason}")]
    InvalidAddress { address: String, reason: String },
    #[error("failed to build email: {0}")]
    Build(String),
    #[error("smtp delivery failed: {0}")]
    Transport(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    External(#[from] ExternalServiceError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Notification(#[from] NotificationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolve,
    Classify,
    Execute,
    Sync,
    Record,
    Digest,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Resolve => "resolve",
            Stage::Classify => "classify",
            Stage::Execute => "execute",
            Stage::Sync => "sync",
            Stage::Record => "record",
            Stage::Digest => "digest",
        };
        f.write_str(name)
    }
}

/// Failure report for one processing unit, carrying enough context to log and re-run it.
#[derive(Debug, Error)]
#[error("subscriber {subscriber} url {url} failed at {stage}: {source}")]
pub struct RequestFailure {
    pub subscriber: String,
    pub url: String,
    pub stage: Stage,
    #[source]
    pub source: EngineError,
}

impl RequestFailure {
    pub fn new(
        subscriber: impl Into<String>,
        url: impl Into<String>,
        stage: Stage,
        source: impl Into<EngineError>,
    ) -> Self {
        Self {
            subscriber: subscriber.into(),
            url: url.into(),
            stage,
            source: source.into(),
        }
    }
}
