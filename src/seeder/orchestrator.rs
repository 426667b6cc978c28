use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use super::github::{HostingApi, NewRepository, is_valid_github_token};
use super::models::{Job, JobStatus, SetupRequest, Step};
use super::pipeline::BuildPipeline;
use super::store::JobStore;
use super::upload::{RetryPolicy, UploadTarget, upload_with_retry};
use super::walker::{UploadSummary, upload_tree};
use crate::errors::SetupError;

pub const README_PATH: &str = "README.md";

/// `<name>-<YYYYMMDDHHMMSS>-<suffix>`; the requested name is never used as-is.
pub fn unique_repository_name(name: &str, now: DateTime<Utc>, suffix: &str) -> String {
    format!("{}-{}-{}", name.trim(), now.format("%Y%m%d%H%M%S"), suffix)
}

fn random_suffix() -> String {
    Uuid::new_v4().simple().to_string()[..6].to_string()
}

fn render_readme(repo_name: &str, description: Option<&str>, now: DateTime<Utc>) -> String {
    let mut readme = format!("# {}\n\n", repo_name);
    if let Some(description) = description.filter(|d| !d.trim().is_empty()) {
        readme.push_str(description.trim());
        readme.push_str("\n\n");
    }
    readme.push_str(&format!(
        "---\n\nRepository created {} UTC.\n",
        now.format("%Y-%m-%d %H:%M:%S")
    ));
    readme
}

/// Drives setup jobs from `initializing` to `completed` or `failed`.
///
/// Each accepted request becomes a detached task on the shared
/// `TaskTracker`; `shutdown` cancels whatever is still in flight and waits
/// for it to record its failure.
/// A setup request that passed validation.
struct SetupParams {
    github_token: String,
    repository_name: String,
    description: Option<String>,
}

impl SetupParams {
    fn validate(req: SetupRequest) -> Result<Self, SetupError> {
        let github_token = required(req.github_token, "githubToken")?;
        let repository_name = required(req.repository_name, "repositoryName")?;
        if !is_valid_github_token(&github_token) {
            return Err(SetupError::InvalidToken);
        }
        Ok(Self {
            github_token,
            repository_name,
            description: req.description,
        })
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, SetupError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(SetupError::MissingField(field))
}

#[derive(Clone)]
pub struct Orchestrator {
    api: Arc<dyn HostingApi>,
    pipeline: Arc<dyn BuildPipeline>,
    store: JobStore,
    staging_dir: PathBuf,
    retry: RetryPolicy,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        api: Arc<dyn HostingApi>,
        pipeline: Arc<dyn BuildPipeline>,
        store: JobStore,
        staging_dir: impl Into<PathBuf>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            api,
            pipeline,
            store,
            staging_dir: staging_dir.into(),
            retry,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Validate `req`, register a new job and start it in the background.
    ///
    /// Nothing is stored when validation fails.
    pub fn launch(&self, req: SetupRequest) -> Result<Job, SetupError> {
        let req = SetupParams::validate(req)?;

        let job = self.store.create(Job::new(Uuid::new_v4()))?;
        tracing::info!(job_id = %job.id, repository = %req.repository_name, "Accepted setup request");

        let this = self.clone();
        let id = job.id;
        self.tracker.spawn(async move { this.run(id, req).await });
        Ok(job)
    }

    async fn run(&self, id: Uuid, req: SetupParams) {
        let outcome = tokio::select! {
            _ = self.shutdown.cancelled() => Err(SetupError::Cancelled),
            result = self.drive(id, &req) => result,
        };

        match outcome {
            Ok(()) => tracing::info!(job_id = %id, "Setup job completed"),
            Err(err) => {
                let message = err.user_message();
                tracing::warn!(job_id = %id, error = %err, "Setup job failed");
                self.store.update(id, |job| job.fail(&message));
            }
        }
    }

    fn transition(&self, id: Uuid, status: JobStatus, step: Step) {
        self.store.update(id, |job| {
            job.status = status;
            job.push_step(step);
        });
        tracing::info!(job_id = %id, status = status.as_str(), "Job advanced");
    }

    async fn drive(&self, id: Uuid, req: &SetupParams) -> Result<(), SetupError> {
        let token = req.github_token.as_str();

        self.transition(
            id,
            JobStatus::CreatingRepository,
            Step::in_progress("Creating GitHub repository"),
        );
        let user = self.api.current_user(token).await?;
        tracing::debug!(job_id = %id, login = %user.login, "Token verified");

        let name = unique_repository_name(&req.repository_name, Utc::now(), &random_suffix());
        let description = req.description.clone().unwrap_or_default();
        let repo = self
            .api
            .create_repository(token, &NewRepository::public(&name, &description))
            .await?;
        self.store.update(id, |job| {
            job.github_repo = Some(repo.html_url.clone());
            job.complete_last_step();
        });

        self.transition(
            id,
            JobStatus::UploadingFiles,
            Step::in_progress("Uploading files"),
        );
        let owner = self.api.current_user(token).await?.login;
        let target = UploadTarget {
            token,
            owner: &owner,
            repo: &repo.name,
        };

        let mut summary = UploadSummary::default();
        let readme = render_readme(&repo.name, req.description.as_deref(), Utc::now());
        let readme_ok = match upload_with_retry(
            self.api.as_ref(),
            target,
            README_PATH,
            readme.as_bytes(),
            self.retry,
        )
        .await
        {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(job_id = %id, error = %err, "README upload failed");
                false
            }
        };
        summary.record(README_PATH, readme_ok);

        let tree = upload_tree(
            self.api.as_ref(),
            target,
            &self.staging_dir,
            self.retry,
            &[README_PATH],
        )
        .await?;
        summary.merge(tree);
        let summary = summary.into_result()?;
        self.store.update(id, |job| job.complete_last_step());
        tracing::info!(job_id = %id, files = summary.succeeded, "All files uploaded");

        self.pipeline.start(&repo).await?;
        self.transition(
            id,
            JobStatus::CompilationStarted,
            Step::in_progress("Compiling release"),
        );

        let download_url = self.pipeline.finish(&repo).await?;
        self.store.update(id, |job| {
            job.complete_last_step();
            job.push_step(Step::completed("Release published"));
            job.status = JobStatus::Completed;
            job.download_url = Some(download_url);
        });
        Ok(())
    }

    /// Cancel in-flight jobs and the sweeper, then wait for them to finish.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}
