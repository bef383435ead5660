use std::io;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use tracing::Subscriber;
use tracing_appender::{non_blocking::WorkerGuard, rolling::{RollingFileAppender, Rotation}};
use tracing_subscriber::{
    fmt::{self, MakeWriter},
    prelude::*,
    registry::LookupSpan,
    EnvFilter, Layer,
};

use crate::{
    config::env::{LogRotation, LoggingConfig},
    infrastructure::directories::ResolvedPaths,
};

static INIT: OnceCell<()> = OnceCell::new();
static GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// `RUST_LOG` wins over the configured level; an unparseable level falls back to `info`.
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn rotation(kind: LogRotation) -> Rotation {
    match kind {
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Daily => Rotation::DAILY,
        LogRotation::Never => Rotation::NEVER,
    }
}

fn line_layer<S, W>(writer: W, ansi: bool) -> impl Layer<S>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    fmt::layer().with_writer(writer).with_target(true).with_ansi(ansi)
}

pub fn init_tracing(logging: &LoggingConfig, paths: &ResolvedPaths) -> Result<()> {
    INIT.get_or_try_init(|| -> Result<()> {
        let appender = RollingFileAppender::builder()
            .rotation(rotation(logging.rotation))
            .filename_prefix("policy-engine")
            .filename_suffix("log")
            .build(&paths.logs_dir)
            .with_context(|| format!("cannot open log file in {}", paths.logs_dir.display()))?;
        let (file_writer, guard) = tracing_appender::non_blocking(appender);
        let _ = GUARD.set(guard);

        tracing_subscriber::registry()
            .with(env_filter(&logging.level))
            .with(line_layer(io::stdout, true))
            .with(line_layer(file_writer, false))
            .try_init()?;

        tracing::info!(
            logs = %paths.logs_dir.display(),
            level = %logging.level,
            rotation = ?logging.rotation,
            "tracing initialized"
        );
        Ok(())
    })?;
    Ok(())
}
