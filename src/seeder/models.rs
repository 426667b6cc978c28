use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Initializing,
    CreatingRepository,
    UploadingFiles,
    CompilationStarted,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::CreatingRepository => "creating_repository",
            Self::UploadingFiles => "uploading_files",
            Self::CompilationStarted => "compilation_started",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    InProgress,
    Completed,
    Failed,
}

/// One lifecycle event recorded on a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub step: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Step {
    pub fn in_progress(label: impl Into<String>) -> Self {
        Self {
            step: label.into(),
            status: StepStatus::InProgress,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn completed(label: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Completed,
            ..Self::in_progress(label)
        }
    }

    pub fn failed(label: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Failed,
            error: Some(error.into()),
            ..Self::in_progress(label)
        }
    }
}

/// A tracked repository-setup request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    pub status: JobStatus,
    /// Append-only; only the last entry's status is ever changed in place.
    pub steps: Vec<Step>,
    pub created_at: DateTime<Utc>,
    pub github_repo: Option<String>,
    pub download_url: Option<String>,
}

impl Job {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            status: JobStatus::Initializing,
            steps: Vec::new(),
            created_at: Utc::now(),
            github_repo: None,
            download_url: None,
        }
    }

    pub fn push_step(&mut self, step: Step) {
        self.steps.push(step);
    }

    /// Mark the most recent step completed if it is still running.
    pub fn complete_last_step(&mut self) {
        if let Some(last) = self.steps.last_mut()
            && last.status == StepStatus::InProgress
        {
            last.status = StepStatus::Completed;
        }
    }

    /// Record a failure: a still-running step is marked failed, then a
    /// terminal failure step is appended.
    pub fn fail(&mut self, error: &str) {
        if let Some(last) = self.steps.last_mut()
            && last.status == StepStatus::InProgress
        {
            last.status = StepStatus::Failed;
            last.error = Some(error.to_string());
        }
        self.status = JobStatus::Failed;
        self.steps.push(Step::failed("Repository setup failed", error));
    }
}

/// Body of `POST /api/setup-repository`.
///
/// Every field is optional at the wire level so that absent, `null` and blank
/// values all reach validation and are reported as the same missing field.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupRequest {
    pub github_token: Option<String>,
    pub repository_name: Option<String>,
    pub description: Option<String>,
}

/// Repository returned by the hosting API after creation (subset of fields).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreatedRepository {
    pub name: String,
    pub full_name: String,
    pub html_url: String,
}

/// Authenticated account (subset of fields).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GitHubUser {
    pub login: String,
}
