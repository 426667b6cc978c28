use std::time::Duration;

use base64::{Engine as _, engine::general_purpose};

use super::github::{FileCommit, HostingApi};
use crate::errors::{GitHubError, UploadError};

/// Attempt budget and linear backoff for a single file upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Wait before the 1-based `attempt`: nothing before the first, then
    /// `(attempt - 1) × base_delay`.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        self.base_delay * attempt.saturating_sub(1)
    }
}

/// Where an upload lands.
#[derive(Debug, Clone, Copy)]
pub struct UploadTarget<'a> {
    pub token: &'a str,
    pub owner: &'a str,
    pub repo: &'a str,
}

/// Push one file's full content, retrying failed attempts per `policy`.
///
/// Each attempt is a full-content create, so a failed attempt leaves nothing
/// half-written on the remote side.
pub async fn upload_with_retry(
    api: &dyn HostingApi,
    target: UploadTarget<'_>,
    path: &str,
    content: &[u8],
    policy: RetryPolicy,
) -> Result<(), UploadError> {
    let commit = FileCommit {
        message: format!("Add {}", path),
        content: general_purpose::STANDARD.encode(content),
    };

    let mut last: Option<GitHubError> = None;
    for attempt in 1..=policy.max_attempts {
        if attempt > 1 {
            tokio::time::sleep(policy.delay_before(attempt)).await;
        }
        match api
            .put_file(target.token, target.owner, target.repo, path, &commit)
            .await
        {
            Ok(()) => {
                tracing::debug!(path, attempt, "Uploaded file");
                return Ok(());
            }
            Err(err) => {
                tracing::warn!(
                    path,
                    attempt,
                    max_attempts = policy.max_attempts,
                    status = ?err.status,
                    error = %err.message,
                    "File upload attempt failed"
                );
                last = Some(err);
            }
        }
    }

    Err(UploadError {
        path: path.to_string(),
        attempts: policy.max_attempts,
        last: last.unwrap_or_else(|| GitHubError::transport("no upload attempt was made")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seeder::testing::{FakeGitHub, TOKEN};

    const TARGET: UploadTarget<'static> = UploadTarget {
        token: TOKEN,
        owner: "octocat",
        repo: "demo",
    };

    #[test]
    fn test_delay_grows_linearly() {
        let policy = RetryPolicy::new(4, Duration::from_millis(1000));
        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_before(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_before(4), Duration::from_millis(3000));
    }

    #[test]
    fn test_zero_attempts_is_clamped_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_success_makes_one_call() {
        let api = FakeGitHub::default();
        upload_with_retry(&api, TARGET, "a.txt", b"hello", RetryPolicy::default())
            .await
            .unwrap();

        let uploads = api.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].commit.content, "aGVsbG8=");
        assert_eq!(uploads[0].commit.message, "Add a.txt");
        assert_eq!(uploads[0].owner, "octocat");
        assert_eq!(uploads[0].repo, "demo");
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_last_attempt_with_increasing_delays() {
        let policy = RetryPolicy::default();
        let api = FakeGitHub::failing("a.txt", policy.max_attempts - 1);

        upload_with_retry(&api, TARGET, "a.txt", b"hello", policy)
            .await
            .unwrap();

        let times = api.upload_times("a.txt");
        assert_eq!(times.len(), policy.max_attempts as usize);
        let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
        assert!(gaps[0] >= Duration::from_millis(1000));
        assert!(gaps[1] >= Duration::from_millis(2000));
        assert!(gaps[1] > gaps[0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_gives_up_after_max_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        let api = FakeGitHub::failing("a.txt", u32::MAX);

        let err = upload_with_retry(&api, TARGET, "a.txt", b"hello", policy)
            .await
            .unwrap_err();

        assert_eq!(api.upload_times("a.txt").len(), 3);
        assert_eq!(err.attempts, 3);
        assert_eq!(err.path, "a.txt");
        assert_eq!(err.last.status, Some(502));
    }

    #[tokio::test(start_paused = true)]
    async fn test_binary_content_is_base64_encoded() {
        let api = FakeGitHub::default();
        let png = [0x89, 0x50, 0x4e, 0x47, 0x00];
        upload_with_retry(&api, TARGET, "logo.png", &png, RetryPolicy::default())
            .await
            .unwrap();
        let uploads = api.uploads.lock().unwrap();
        let decoded = general_purpose::STANDARD
            .decode(&uploads[0].commit.content)
            .unwrap();
        assert_eq!(decoded, png.to_vec());
    }
}
