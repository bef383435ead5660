pub mod env;
mod loader;

pub use env::{
    AppConfig, DigestConfig, DirectoryConfig, PlatformConfig, SchedulerConfig, SmtpConfig,
    WorkerConfig,
};
pub use loader::load_config;
