//! In-memory `HostingApi` used across the seeder's unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::time::Instant;

use super::github::{FileCommit, HostingApi, NewRepository};
use super::models::{CreatedRepository, GitHubUser};
use crate::errors::GitHubError;

pub const TOKEN: &str = "ghp_abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone)]
pub struct RecordedUpload {
    pub owner: String,
    pub repo: String,
    pub path: String,
    pub commit: FileCommit,
    pub at: Instant,
}

/// Scriptable fake: identity and creation can be made to fail, and each
/// path can fail a set number of times before succeeding.
#[derive(Default)]
pub struct FakeGitHub {
    pub identity_error: Option<GitHubError>,
    pub create_error: Option<GitHubError>,
    pub upload_failures: HashMap<String, u32>,
    pub created: Mutex<Vec<NewRepository>>,
    pub uploads: Mutex<Vec<RecordedUpload>>,
}

impl FakeGitHub {
    /// `path` fails its first `times` uploads.
    pub fn failing(path: &str, times: u32) -> Self {
        Self {
            upload_failures: HashMap::from([(path.to_string(), times)]),
            ..Self::default()
        }
    }

    pub fn rejecting_identity(status: u16, message: &str) -> Self {
        Self {
            identity_error: Some(GitHubError::http(status, message)),
            ..Self::default()
        }
    }

    pub fn rejecting_create(status: u16, message: &str) -> Self {
        Self {
            create_error: Some(GitHubError::http(status, message)),
            ..Self::default()
        }
    }

    pub fn uploaded_paths(&self) -> Vec<String> {
        self.uploads
            .lock()
            .unwrap()
            .iter()
            .map(|u| u.path.clone())
            .collect()
    }

    pub fn upload_times(&self, path: &str) -> Vec<Instant> {
        self.uploads
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.path == path)
            .map(|u| u.at)
            .collect()
    }

    pub fn created_names(&self) -> Vec<String> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.name.clone())
            .collect()
    }
}

#[async_trait]
impl HostingApi for FakeGitHub {
    async fn current_user(&self, _token: &str) -> Result<GitHubUser, GitHubError> {
        match &self.identity_error {
            Some(err) => Err(err.clone()),
            None => Ok(GitHubUser {
                login: "octocat".into(),
            }),
        }
    }

    async fn create_repository(
        &self,
        _token: &str,
        repo: &NewRepository,
    ) -> Result<CreatedRepository, GitHubError> {
        if let Some(err) = &self.create_error {
            return Err(err.clone());
        }
        self.created.lock().unwrap().push(repo.clone());
        Ok(CreatedRepository {
            name: repo.name.clone(),
            full_name: format!("octocat/{}", repo.name),
            html_url: format!("https://github.com/octocat/{}", repo.name),
        })
    }

    async fn put_file(
        &self,
        _token: &str,
        owner: &str,
        repo: &str,
        path: &str,
        commit: &FileCommit,
    ) -> Result<(), GitHubError> {
        let attempt = {
            let mut uploads = self.uploads.lock().unwrap();
            uploads.push(RecordedUpload {
                owner: owner.to_string(),
                repo: repo.to_string(),
                path: path.to_string(),
                commit: commit.clone(),
                at: Instant::now(),
            });
            uploads.iter().filter(|u| u.path == path).count() as u32
        };
        match self.upload_failures.get(path) {
            Some(&limit) if attempt <= limit => Err(GitHubError::http(502, "Bad Gateway")),
            _ => Ok(()),
        }
    }
}
