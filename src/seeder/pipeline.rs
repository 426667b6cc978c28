use std::time::Duration;

use async_trait::async_trait;

use super::models::CreatedRepository;
use crate::errors::SetupError;

/// Downstream build/release stage that runs after the files are pushed.
///
/// The orchestrator owns the job's state transitions; implementations only
/// report when each stage has been reached.
#[async_trait]
pub trait BuildPipeline: Send + Sync {
    /// Resolves once compilation has started for `repo`.
    async fn start(&self, repo: &CreatedRepository) -> Result<(), SetupError>;

    /// Resolves with the URL where the built artifact can be fetched.
    async fn finish(&self, repo: &CreatedRepository) -> Result<String, SetupError>;
}

/// Stand-in pipeline: fixed delays, no real build system behind it.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedPipeline {
    pub start_delay: Duration,
    pub finish_delay: Duration,
}

impl SimulatedPipeline {
    pub fn new(start_delay: Duration, finish_delay: Duration) -> Self {
        Self {
            start_delay,
            finish_delay,
        }
    }

    pub fn instant() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }
}

#[async_trait]
impl BuildPipeline for SimulatedPipeline {
    async fn start(&self, repo: &CreatedRepository) -> Result<(), SetupError> {
        tokio::time::sleep(self.start_delay).await;
        tracing::debug!(repo = %repo.full_name, "Simulated compilation started");
        Ok(())
    }

    async fn finish(&self, repo: &CreatedRepository) -> Result<String, SetupError> {
        tokio::time::sleep(self.finish_delay).await;
        Ok(releases_url(repo))
    }
}

pub fn releases_url(repo: &CreatedRepository) -> String {
    format!("{}/releases", repo.html_url.trim_end_matches('/'))
}
