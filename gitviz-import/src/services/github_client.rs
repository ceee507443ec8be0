//! GitHub API client and repository lister
//!
//! The lister probes whether an owner is an organization, falls back to a
//! user account, then pages through the owner's repositories until a short
//! page comes back or the repository limit is reached.

use async_trait::async_trait;
use governor::Quota;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::BulkImportError;

const USER_AGENT: &str = concat!("gitviz-import/", env!("CARGO_PKG_VERSION"));
const REQUESTS_PER_SECOND: u32 = 10;

/// Repositories requested per page
pub const PAGE_SIZE: u32 = 100;

/// GitHub client errors
#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("GitHub rejected the API token")]
    Unauthorized,

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Account type an owner resolved to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerKind {
    Organization,
    User,
}

impl OwnerKind {
    fn path_segment(self) -> &'static str {
        match self {
            OwnerKind::Organization => "orgs",
            OwnerKind::User => "users",
        }
    }
}

/// Repository as listed by the remote API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRepo {
    pub name: String,
    pub owner: String,
    pub clone_url: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiRepo {
    name: String,
    clone_url: String,
    description: Option<String>,
    owner: ApiOwner,
}

#[derive(Debug, Deserialize)]
struct ApiOwner {
    login: String,
}

impl From<ApiRepo> for RemoteRepo {
    fn from(repo: ApiRepo) -> Self {
        Self {
            name: repo.name,
            owner: repo.owner.login,
            clone_url: repo.clone_url,
            description: repo.description,
        }
    }
}

/// Remote listing API
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Check that `owner` exists as `kind`
    async fn probe_owner(&self, kind: OwnerKind, owner: &str) -> Result<(), GitHubError>;

    /// Fetch one page (1-based) of the owner's repositories
    async fn list_page(
        &self,
        kind: OwnerKind,
        owner: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<RemoteRepo>, GitHubError>;
}

type DirectRateLimiter = governor::RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// GitHub REST API client
pub struct GitHubClient {
    http_client: reqwest::Client,
    base_url: String,
    token: String,
    rate_limiter: DirectRateLimiter,
}

impl GitHubClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self, GitHubError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GitHubError::NetworkError(e.to_string()))?;

        let quota = Quota::per_second(
            NonZeroU32::new(REQUESTS_PER_SECOND).unwrap_or(NonZeroU32::MIN),
        );

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            rate_limiter: governor::RateLimiter::direct(quota),
        })
    }

    async fn get(&self, url: &str, what: &str) -> Result<reqwest::Response, GitHubError> {
        self.rate_limiter.until_ready().await;

        debug!(url = %url, "Querying GitHub API");

        let response = self
            .http_client
            .get(url)
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| GitHubError::NetworkError(e.to_string()))?;

        let status = response.status();

        if status == 404 {
            return Err(GitHubError::NotFound(what.to_string()));
        }
        if status == 401 {
            return Err(GitHubError::Unauthorized);
        }
        if status == 403 || status == 429 {
            let remaining = response
                .headers()
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            if status == 429 || remaining.as_deref() == Some("0") {
                return Err(GitHubError::RateLimitExceeded);
            }
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GitHubError::ApiError(status.as_u16(), error_text));
        }

        Ok(response)
    }
}

#[async_trait]
impl RemoteApi for GitHubClient {
    async fn probe_owner(&self, kind: OwnerKind, owner: &str) -> Result<(), GitHubError> {
        let url = format!("{}/{}/{}", self.base_url, kind.path_segment(), owner);
        self.get(&url, owner).await.map(|_| ())
    }

    async fn list_page(
        &self,
        kind: OwnerKind,
        owner: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<RemoteRepo>, GitHubError> {
        let url = format!(
            "{}/{}/{}/repos?per_page={}&page={}",
            self.base_url,
            kind.path_segment(),
            owner,
            per_page,
            page
        );

        let repos: Vec<ApiRepo> = self
            .get(&url, owner)
            .await?
            .json()
            .await
            .map_err(|e| GitHubError::ParseError(e.to_string()))?;

        Ok(repos.into_iter().map(RemoteRepo::from).collect())
    }
}

/// Determine whether `owner` is an organization or a user
///
/// A rejected token is fatal for the whole job; anything else that keeps
/// both probes from succeeding means the owner does not exist.
pub async fn resolve_owner_kind(
    api: &dyn RemoteApi,
    owner: &str,
) -> Result<OwnerKind, BulkImportError> {
    match api.probe_owner(OwnerKind::Organization, owner).await {
        Ok(()) => return Ok(OwnerKind::Organization),
        Err(GitHubError::Unauthorized) => {
            return Err(BulkImportError::Remote(GitHubError::Unauthorized.to_string()))
        }
        Err(e) => debug!(owner = %owner, error = %e, "Not an organization, trying user"),
    }

    match api.probe_owner(OwnerKind::User, owner).await {
        Ok(()) => Ok(OwnerKind::User),
        Err(GitHubError::Unauthorized) => {
            Err(BulkImportError::Remote(GitHubError::Unauthorized.to_string()))
        }
        Err(e) => {
            debug!(owner = %owner, error = %e, "User probe failed");
            Err(BulkImportError::OwnerNotFound(owner.to_string()))
        }
    }
}

/// List every repository of `owner`, up to `limit`
///
/// Pagination stops at the first short page. A failure on page 1 is an
/// owner-level error; later page failures keep what was collected.
pub async fn list_owner_repositories(
    api: &dyn RemoteApi,
    owner: &str,
    limit: usize,
) -> Result<Vec<RemoteRepo>, BulkImportError> {
    let kind = resolve_owner_kind(api, owner).await?;
    let mut repos: Vec<RemoteRepo> = Vec::new();
    let mut page = 1u32;

    loop {
        let batch = match api.list_page(kind, owner, page, PAGE_SIZE).await {
            Ok(batch) => batch,
            Err(GitHubError::Unauthorized) => {
                return Err(BulkImportError::Remote(GitHubError::Unauthorized.to_string()))
            }
            Err(e) if page == 1 => {
                return Err(BulkImportError::OwnerListing {
                    owner: owner.to_string(),
                    message: format!("Failed to list repositories: {}", e),
                })
            }
            Err(e) => {
                warn!(
                    owner = %owner,
                    page,
                    collected = repos.len(),
                    error = %e,
                    "Repository page fetch failed, keeping repositories collected so far"
                );
                break;
            }
        };

        let short_page = batch.len() < PAGE_SIZE as usize;
        repos.extend(batch);

        if repos.len() >= limit {
            repos.truncate(limit);
            info!(owner = %owner, limit, "Repository limit reached");
            break;
        }
        if short_page {
            break;
        }
        page += 1;
    }

    info!(owner = %owner, kind = ?kind, count = repos.len(), "Listed repositories");
    Ok(repos)
}
