//! Release source implementations

use std::time::Duration;

use crate::config::FETCH_TIMEOUT_MS;

pub mod github;

pub use github::GitHubReleases;

/// User agent sent with every request to the release host
pub const USER_AGENT: &str = concat!("release-channel/", env!("CARGO_PKG_VERSION"));

/// Build the HTTP client shared by release sources and downloads
pub fn build_http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_millis(FETCH_TIMEOUT_MS as u64))
        .build()
}
