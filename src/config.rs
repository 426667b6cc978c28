use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::seeder::pipeline::SimulatedPipeline;
use crate::seeder::upload::RetryPolicy;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

/// Runtime configuration for the seeder service.
///
/// Built from defaults, then the environment (`.env` is honoured), then any
/// CLI overrides applied by `main`.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Local tree pushed into every new repository.
    pub staging_dir: PathBuf,
    /// Pre-built archive served by `/api/download-package`.
    pub package_path: PathBuf,
    pub github_api_url: String,
    /// Applies to outbound API calls and inbound requests alike.
    pub request_timeout: Duration,
    pub upload_max_attempts: u32,
    pub upload_base_delay: Duration,
    pub compile_start_delay: Duration,
    pub compile_finish_delay: Duration,
    pub sweep_interval: Duration,
    pub failed_job_max_age: Duration,
    pub json_logs: bool,
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            staging_dir: PathBuf::from("./staging"),
            package_path: PathBuf::from("./package.tar.gz"),
            github_api_url: DEFAULT_GITHUB_API_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            upload_max_attempts: 3,
            upload_base_delay: Duration::from_millis(1000),
            compile_start_delay: Duration::from_secs(5),
            compile_finish_delay: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(60 * 60),
            failed_job_max_age: Duration::from_secs(60 * 60),
            json_logs: false,
            log_dir: None,
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        // A missing .env file is the normal case.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(port) = parse_var::<u16>(&lookup, "PORT")? {
            config.port = port;
        }
        if let Some(dir) = lookup("STAGING_DIR") {
            config.staging_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup("PACKAGE_PATH") {
            config.package_path = PathBuf::from(path);
        }
        if let Some(url) = lookup("GITHUB_API_URL") {
            config.github_api_url = url.trim_end_matches('/').to_string();
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(attempts) = parse_var::<u32>(&lookup, "UPLOAD_MAX_ATTEMPTS")? {
            config.upload_max_attempts = attempts;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            config.json_logs = format.eq_ignore_ascii_case("json");
        }
        config.log_dir = lookup("LOG_DIR").map(PathBuf::from);

        Ok(config)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.upload_max_attempts, self.upload_base_delay)
    }

    pub fn simulated_pipeline(&self) -> SimulatedPipeline {
        SimulatedPipeline::new(self.compile_start_delay, self.compile_finish_delay)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("Invalid value for {}: {:?}", key, raw))
        })
        .transpose()
}
