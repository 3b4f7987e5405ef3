//! Common types shared by the release source, cache and checker

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A downloadable file attached to a release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub download_url: String,
    pub size: u64,
}

/// A published release as reported by the release host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub tag: String,
    pub title: String,
    pub body: String,
    pub published_at: Option<DateTime<Utc>>,
    pub is_prerelease: bool,
    pub url: String,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

impl Release {
    /// The tag without its leading `v`
    pub fn version(&self) -> &str {
        self.tag.strip_prefix('v').unwrap_or(&self.tag)
    }
}

/// Update track selected by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    #[default]
    Stable,
    Prerelease,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Stable => "stable",
            Channel::Prerelease => "prerelease",
        }
    }

    pub fn includes_prereleases(&self) -> bool {
        matches!(self, Channel::Prerelease)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stable" => Ok(Channel::Stable),
            "prerelease" => Ok(Channel::Prerelease),
            _ => Err(format!("Unknown channel: {}", s)),
        }
    }
}

/// Outcome of comparing the running version against the applicable release
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateDecision {
    NoUpdate,
    Upgrade(Release),
    Downgrade(Release),
}

impl UpdateDecision {
    /// The release to install, if any
    pub fn target(&self) -> Option<&Release> {
        match self {
            UpdateDecision::NoUpdate => None,
            UpdateDecision::Upgrade(release) | UpdateDecision::Downgrade(release) => Some(release),
        }
    }
}

/// Caller-side progress of an update
///
/// ```text
/// Idle -> Checking -> {UpToDate, UpdateAvailable, DowngradeAvailable}
///      -> Downloading -> Ready -> Installing
/// ```
///
/// `Installing` is terminal; the process is restarted afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    Idle,
    Checking,
    UpToDate,
    UpdateAvailable,
    DowngradeAvailable,
    Downloading { percent: Option<u8> },
    Ready,
    Installing,
}

impl UpdateState {
    pub fn from_decision(decision: &UpdateDecision) -> Self {
        match decision {
            UpdateDecision::NoUpdate => UpdateState::UpToDate,
            UpdateDecision::Upgrade(_) => UpdateState::UpdateAvailable,
            UpdateDecision::Downgrade(_) => UpdateState::DowngradeAvailable,
        }
    }
}
