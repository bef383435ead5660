use std::{env, str::FromStr, time::Duration};

use chrono_tz::Tz;

use super::env::{
    AppConfig, ConfigError, DigestConfig, DirectoryConfig, LogRotation, LoggingConfig,
    PlatformConfig, SchedulerConfig, SmtpConfig, WorkerConfig,
};

pub fn load_config() -> Result<AppConfig, ConfigError> {
    AppConfig::from_lookup(|key| env::var(key).ok())
}

impl AppConfig {
    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };

        let platform = PlatformConfig {
            base_url: vars
                .or("PLATFORM_BASE_URL", "https://netfree.link")
                .trim_end_matches('/')
                .to_string(),
            username: vars.required("PLATFORM_USERNAME")?,
            password: vars.required("PLATFORM_PASSWORD")?,
            request_timeout: Duration::from_millis(vars.parsed("PLATFORM_TIMEOUT_MS", 15_000)?),
            downgrade_https: vars.flag("PLATFORM_DOWNGRADE_HTTPS", true)?,
        };

        let smtp = SmtpConfig {
            host: vars.required("SMTP_HOST")?,
            port: vars.parsed("SMTP_PORT", 587)?,
            username: vars.required("SMTP_USERNAME")?,
            password: vars.required("SMTP_PASSWORD")?,
            from_name: vars.optional("SMTP_FROM_NAME"),
            admin_email: vars.required("ADMIN_EMAIL")?,
        };

        let directories = DirectoryConfig {
            logs_dir: vars.or("LOGS_DIR", "logs"),
            data_dir: vars.or("DATA_DIR", "data"),
            db_filename: vars.or("DB_FILENAME", "policy.db"),
            seed_file: vars.optional("SEED_FILE"),
        };

        let logging = LoggingConfig {
            level: vars.or("LOG_LEVEL", "info"),
            rotation: vars.parsed("LOG_ROTATION", LogRotation::Daily)?,
        };

        let timezone: Tz = vars.parsed("TIMEZONE", chrono_tz::Asia::Jerusalem)?;

        let scheduler = SchedulerConfig {
            request_poll_cron: vars.or("REQUEST_POLL_CRON", "0 * * * * *"),
            traffic_poll_cron: vars.or("TRAFFIC_POLL_CRON", "30 */5 * * * *"),
            category_sync_cron: vars.or("CATEGORY_SYNC_CRON", "0 0 3 * * *"),
        };

        let workers = WorkerConfig {
            concurrency: vars.parsed::<usize>("WORKER_CONCURRENCY", 4)?.max(1),
            batch_concurrency: vars.parsed::<usize>("BATCH_CONCURRENCY", 4)?.max(1),
            claim_limit: vars.parsed::<i64>("CLAIM_LIMIT", 20)?.max(1),
        };

        let digest = DigestConfig {
            template: vars.or("DIGEST_TEMPLATE", "traffic_digest"),
            fallback_recipient: vars.optional("DIGEST_FALLBACK_EMAIL"),
        };

        Ok(Self {
            platform,
            smtp,
            directories,
            logging,
            timezone,
            scheduler,
            workers,
            digest,
        })
    }
}

struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.optional(key).ok_or(ConfigError::Missing(key))
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T: FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match self.optional(key) {
            Some(value) => value
                .parse::<T>()
                .map_err(|_| ConfigError::Invalid { key, value }),
            None => Ok(default),
        }
    }

    fn flag(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.optional(key).map(|value| value.to_ascii_lowercase()) {
            None => Ok(default),
            Some(value) => match value.as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::Invalid { key, value }),
            },
        }
    }
}
