use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use super::models::{CreatedRepository, GitHubUser};
use crate::errors::GitHubError;

const USER_AGENT: &str = "repo-seeder";
const ACCEPT: &str = "application/vnd.github+json";

/// Token prefixes accepted by the setup endpoint.
const GITHUB_TOKEN_PREFIXES: &[&str] = &[
    "ghp_",        // Personal access tokens (classic)
    "github_pat_", // Fine-grained personal access tokens
];

pub const MIN_TOKEN_LEN: usize = 20;

/// Format check only: recognised prefix and minimum length. Whether the
/// token is live is only known once the identity endpoint answers.
pub fn is_valid_github_token(token: &str) -> bool {
    token.len() >= MIN_TOKEN_LEN
        && GITHUB_TOKEN_PREFIXES
            .iter()
            .any(|prefix| token.starts_with(prefix))
}

/// Repository creation payload.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewRepository {
    pub name: String,
    pub description: String,
    pub private: bool,
    pub auto_init: bool,
    pub has_issues: bool,
}

impl NewRepository {
    /// Public, empty repository with issues enabled.
    pub fn public(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            private: false,
            auto_init: false,
            has_issues: true,
        }
    }
}

/// Body of a create-or-update-file request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileCommit {
    pub message: String,
    /// Base64-encoded file content.
    pub content: String,
}

/// The three hosting-API capabilities a setup job needs.
///
/// Real implementation: `GitHubClient`. Tests substitute in-memory fakes.
#[async_trait]
pub trait HostingApi: Send + Sync {
    async fn current_user(&self, token: &str) -> Result<GitHubUser, GitHubError>;

    async fn create_repository(
        &self,
        token: &str,
        repo: &NewRepository,
    ) -> Result<CreatedRepository, GitHubError>;

    async fn put_file(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        path: &str,
        commit: &FileCommit,
    ) -> Result<(), GitHubError>;
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// `reqwest`-backed client for the GitHub REST API.
#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    base_url: String,
}

impl GitHubClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GitHubError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Contents endpoint for `path`, with every segment percent-encoded so
    /// characters like `#` and `?` stay part of the file name.
    fn contents_url(&self, owner: &str, repo: &str, path: &str) -> Result<Url, GitHubError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| GitHubError::transport(format!("Invalid GitHub API URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| GitHubError::transport("GitHub API URL cannot carry a path"))?
            .pop_if_empty()
            .extend(["repos", owner, repo, "contents"])
            .extend(path.split('/'));
        Ok(url)
    }

    /// Fetch an arbitrary URL for streaming back to a client.
    pub async fn download(&self, url: &str) -> Result<reqwest::Response, GitHubError> {
        let resp = self.http.get(url).send().await?;
        check_status(resp).await
    }
}

/// Turn a non-2xx response into a `GitHubError`, preferring the API's own
/// `message` field over the bare status text.
async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, GitHubError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|body| body.message)
        .unwrap_or_else(|| {
            if text.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("Unknown error")
                    .to_string()
            } else {
                text
            }
        });
    Err(GitHubError::http(status.as_u16(), message))
}

#[async_trait]
impl HostingApi for GitHubClient {
    async fn current_user(&self, token: &str) -> Result<GitHubUser, GitHubError> {
        let resp = self
            .http
            .get(self.url("/user"))
            .bearer_auth(token)
            .header("Accept", ACCEPT)
            .send()
            .await?;
        Ok(check_status(resp).await?.json::<GitHubUser>().await?)
    }

    async fn create_repository(
        &self,
        token: &str,
        repo: &NewRepository,
    ) -> Result<CreatedRepository, GitHubError> {
        let resp = self
            .http
            .post(self.url("/user/repos"))
            .bearer_auth(token)
            .header("Accept", ACCEPT)
            .json(repo)
            .send()
            .await?;
        Ok(check_status(resp)
            .await?
            .json::<CreatedRepository>()
            .await?)
    }

    async fn put_file(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        path: &str,
        commit: &FileCommit,
    ) -> Result<(), GitHubError> {
        let url = self.contents_url(owner, repo, path)?;
        let resp = self
            .http
            .put(url)
            .bearer_auth(token)
            .header("Accept", ACCEPT)
            .json(commit)
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        extract::Path,
        http::{HeaderMap, StatusCode},
        routing::{get, post, put},
    };

    // ── is_valid_github_token ────────────────────────────────────────

    #[test]
    fn test_valid_classic_token() {
        assert!(is_valid_github_token("ghp_abcdefghijklmnop1234"));
    }

    #[test]
    fn test_valid_fine_grained_token() {
        assert!(is_valid_github_token("github_pat_11ABCDEFG0123456789"));
    }

    #[test]
    fn test_short_token_is_invalid() {
        assert!(!is_valid_github_token("ghp_abc123"));
    }

    #[test]
    fn test_exactly_min_length_is_valid() {
        let token = format!("ghp_{}", "a".repeat(MIN_TOKEN_LEN - 4));
        assert_eq!(token.len(), MIN_TOKEN_LEN);
        assert!(is_valid_github_token(&token));
    }

    #[test]
    fn test_other_github_prefixes_are_rejected() {
        assert!(!is_valid_github_token("gho_abcdefghijklmnop1234"));
        assert!(!is_valid_github_token("ghs_abcdefghijklmnop1234"));
    }

    #[test]
    fn test_uppercase_prefix_is_invalid() {
        assert!(!is_valid_github_token("GHP_abcdefghijklmnop1234"));
    }

    #[test]
    fn test_empty_token_is_invalid() {
        assert!(!is_valid_github_token(""));
    }

    #[test]
    fn test_new_repository_defaults() {
        let repo = NewRepository::public("demo", "A demo");
        let value = serde_json::to_value(&repo).unwrap();
        assert_eq!(value["private"], false);
        assert_eq!(value["auto_init"], false);
        assert_eq!(value["has_issues"], true);
    }

    // ── GitHubClient against a local stand-in server ─────────────────

    async fn spawn_fake_github() -> String {
        let app = Router::new()
            .route(
                "/user",
                get(|headers: HeaderMap| async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default();
                    if auth == "Bearer ghp_good_token_000000" {
                        Ok(Json(serde_json::json!({"login": "octocat", "id": 1})))
                    } else {
                        Err((
                            StatusCode::UNAUTHORIZED,
                            Json(serde_json::json!({"message": "Bad credentials"})),
                        ))
                    }
                }),
            )
            .route(
                "/user/repos",
                post(|Json(body): Json<serde_json::Value>| async move {
                    let name = body["name"].as_str().unwrap_or_default().to_string();
                    if name == "taken" {
                        return Err((
                            StatusCode::UNPROCESSABLE_ENTITY,
                            Json(serde_json::json!({"message": "Validation Failed"})),
                        ));
                    }
                    Ok((
                        StatusCode::CREATED,
                        Json(serde_json::json!({
                            "name": name,
                            "full_name": format!("octocat/{}", name),
                            "html_url": format!("https://github.com/octocat/{}", name),
                            "private": false,
                        })),
                    ))
                }),
            )
            .route(
                "/repos/{owner}/{repo}/contents/{*path}",
                put(
                    |Path((_owner, _repo, path)): Path<(String, String, String)>,
                     Json(body): Json<FileCommit>| async move {
                        if path == "broken.txt" {
                            return Err(StatusCode::BAD_GATEWAY);
                        }
                        if body.message != format!("Add {}", path) {
                            return Err(StatusCode::CONFLICT);
                        }
                        Ok(StatusCode::CREATED)
                    },
                ),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client(base: &str) -> GitHubClient {
        GitHubClient::new(base, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_current_user_success() {
        let base = spawn_fake_github().await;
        let user = client(&base)
            .current_user("ghp_good_token_000000")
            .await
            .unwrap();
        assert_eq!(user.login, "octocat");
    }

    #[tokio::test]
    async fn test_current_user_bad_credentials_carries_status_and_message() {
        let base = spawn_fake_github().await;
        let err = client(&base)
            .current_user("ghp_wrong_token_000000")
            .await
            .unwrap_err();
        assert_eq!(err.status, Some(401));
        assert_eq!(err.message, "Bad credentials");
    }

    #[tokio::test]
    async fn test_create_repository_round_trip() {
        let base = spawn_fake_github().await;
        let repo = client(&base)
            .create_repository("ghp_good_token_000000", &NewRepository::public("demo", ""))
            .await
            .unwrap();
        assert_eq!(repo.full_name, "octocat/demo");
        assert_eq!(repo.html_url, "https://github.com/octocat/demo");
    }

    #[tokio::test]
    async fn test_create_repository_conflict() {
        let base = spawn_fake_github().await;
        let err = client(&base)
            .create_repository("ghp_good_token_000000", &NewRepository::public("taken", ""))
            .await
            .unwrap_err();
        assert_eq!(err.status, Some(422));
        assert_eq!(err.message, "Validation Failed");
    }

    #[tokio::test]
    async fn test_put_file_nested_path() {
        let base = spawn_fake_github().await;
        let commit = FileCommit {
            message: "Add src/lib.rs".into(),
            content: "Zm9v".into(),
        };
        client(&base)
            .put_file("ghp_good_token_000000", "octocat", "demo", "src/lib.rs", &commit)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_put_file_error_without_json_body_uses_reason() {
        let base = spawn_fake_github().await;
        let commit = FileCommit {
            message: "Add broken.txt".into(),
            content: String::new(),
        };
        let err = client(&base)
            .put_file("ghp_good_token_000000", "octocat", "demo", "broken.txt", &commit)
            .await
            .unwrap_err();
        assert_eq!(err.status, Some(502));
        assert_eq!(err.message, "Bad Gateway");
    }

    #[tokio::test]
    async fn test_put_file_keeps_reserved_characters_in_path() {
        let base = spawn_fake_github().await;
        for path in ["docs/notes#1.md", "what?.md", "space dir/a b.txt", "100%.txt"] {
            let commit = FileCommit {
                message: format!("Add {}", path),
                content: "Zm9v".into(),
            };
            let result = client(&base)
                .put_file("ghp_good_token_000000", "octocat", "demo", path, &commit)
                .await;
            assert!(result.is_ok(), "{} was not stored under its full path", path);
        }
    }

    #[test]
    fn test_contents_url_respects_base_path() {
        let client = client("http://ghe.local/api/v3/");
        let url = client
            .contents_url("octocat", "demo", "src/a#b.rs")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://ghe.local/api/v3/repos/octocat/demo/contents/src/a%23b.rs"
        );
    }

    #[tokio::test]
    async fn test_slow_response_times_out_as_transport_error() {
        let app = Router::new().route(
            "/user",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(serde_json::json!({"login": "octocat"}))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let err = GitHubClient::new(&format!("http://{}", addr), Duration::from_millis(200))
            .unwrap()
            .current_user("ghp_good_token_000000")
            .await
            .unwrap_err();
        assert!(err.status.is_none());
        assert!(err.to_string().starts_with("GitHub request failed"));
    }

    #[tokio::test]
    async fn test_transport_error_has_no_status() {
        // Nothing listens on port 9 of the loopback interface.
        let err = client("http://127.0.0.1:9")
            .current_user("ghp_good_token_000000")
            .await
            .unwrap_err();
        assert!(err.status.is_none());
    }
}
