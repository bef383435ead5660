use std::{str::FromStr, time::Duration};

use chrono_tz::Tz;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub platform: PlatformConfig,
    pub smtp: SmtpConfig,
    pub directories: DirectoryConfig,
    pub logging: LoggingConfig,
    pub timezone: Tz,
    pub scheduler: SchedulerConfig,
    pub workers: WorkerConfig,
    pub digest: DigestConfig,
}

#[derive(Debug, Clone)]
pub struct PlatformConfig {
    pub base_url: String,
    /// Login phone number.
    pub username: String,
    pub password: String,
    pub request_timeout: Duration,
    /// Rewrite `https://` request URLs to `http://` before resolution.
    pub downgrade_https: bool,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    /// Also used as the sender address.
    pub username: String,
    pub password: String,
    pub from_name: Option<String>,
    pub admin_email: String,
}

#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub logs_dir: String,
    pub data_dir: String,
    pub db_filename: String,
    /// JSON file with profiles, rules and templates loaded into an empty database.
    pub seed_file: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub rotation: LogRotation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRotation {
    Hourly,
    Daily,
    Never,
}

impl FromStr for LogRotation {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "hourly" => Ok(Self::Hourly),
            "daily" => Ok(Self::Daily),
            "never" | "off" => Ok(Self::Never),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub request_poll_cron: String,
    pub traffic_poll_cron: String,
    pub category_sync_cron: String,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Jobs processed at once by the queue processor.
    pub concurrency: usize,
    /// URLs of one traffic report resolved at once.
    pub batch_concurrency: usize,
    /// Rows claimed per poll.
    pub claim_limit: i64,
}

#[derive(Debug, Clone)]
pub struct DigestConfig {
    pub template: String,
    pub fallback_recipient: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: `{value}`")]
    Invalid { key: &'static str, value: String },
}
