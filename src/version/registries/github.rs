//! GitHub Releases API release source

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::FETCH_TIMEOUT_MS;
use crate::version::error::RegistryError;
use crate::version::registries::build_http_client;
use crate::version::registry::ReleaseSource;
use crate::version::types::{Release, ReleaseAsset};

/// Default base URL for GitHub API
pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";

/// Page size requested from the releases endpoint (GitHub's maximum)
const PER_PAGE: u32 = 100;

/// Response item from GitHub Releases API
#[derive(Debug, Deserialize)]
struct GitHubRelease {
    tag_name: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    prerelease: bool,
    #[serde(default)]
    draft: bool,
    html_url: String,
    #[serde(default)]
    assets: Vec<GitHubAsset>,
}

#[derive(Debug, Deserialize)]
struct GitHubAsset {
    name: String,
    browser_download_url: String,
    #[serde(default)]
    size: u64,
}

impl From<GitHubRelease> for Release {
    fn from(release: GitHubRelease) -> Self {
        Release {
            title: release.name.unwrap_or_else(|| release.tag_name.clone()),
            tag: release.tag_name,
            body: release.body.unwrap_or_default(),
            published_at: release.published_at,
            is_prerelease: release.prerelease,
            url: release.html_url,
            assets: release
                .assets
                .into_iter()
                .map(|asset| ReleaseAsset {
                    name: asset.name,
                    download_url: asset.browser_download_url,
                    size: asset.size,
                })
                .collect(),
        }
    }
}

/// Release source backed by a GitHub repository's releases
pub struct GitHubReleases {
    client: reqwest::Client,
    base_url: String,
    repository: String,
}

impl GitHubReleases {
    /// Creates a source for `repository` ("owner/name") against a custom API base URL
    pub fn new(base_url: &str, repository: &str) -> Result<Self, RegistryError> {
        Ok(Self {
            client: build_http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            repository: repository.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl ReleaseSource for GitHubReleases {
    async fn fetch_releases(
        &self,
        include_prerelease: bool,
    ) -> Result<Vec<Release>, RegistryError> {
        let url = format!(
            "{}/repos/{}/releases?per_page={}",
            self.base_url, self.repository, PER_PAGE
        );

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .timeout(Duration::from_millis(FETCH_TIMEOUT_MS as u64))
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound(self.repository.clone()));
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(RegistryError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if !status.is_success() {
            warn!("GitHub API returned status {}: {}", status, url);
            return Err(RegistryError::InvalidResponse(format!(
                "Unexpected status: {}",
                status
            )));
        }

        let releases: Vec<GitHubRelease> = response.json().await.map_err(|e| {
            warn!("Failed to parse GitHub releases response: {}", e);
            RegistryError::InvalidResponse(e.to_string())
        })?;

        let releases: Vec<Release> = releases
            .into_iter()
            .filter(|r| !r.draft)
            .filter(|r| include_prerelease || !r.prerelease)
            .map(Release::from)
            .collect();

        debug!(
            "Fetched {} releases for {} (prereleases included: {})",
            releases.len(),
            self.repository,
            include_prerelease
        );

        Ok(releases)
    }
}
