//! Release selection for an update channel
//!
//! All functions here are pure: they only look at the release list, the
//! running version and the channel.

use std::cmp::Ordering;
use std::cmp::Reverse;

use crate::version::semver::{ReleaseVersion, compare_versions, is_prerelease_version};
use crate::version::types::{Channel, Release, UpdateDecision};

/// Sort releases newest first. Releases with equal versions keep their
/// input order.
pub fn sort_descending(mut releases: Vec<Release>) -> Vec<Release> {
    releases.sort_by_cached_key(|release| Reverse(ReleaseVersion::parse(&release.tag)));
    releases
}

/// Pick the release a channel should be on
///
/// - prerelease: the newest release overall
/// - stable: the newest release not flagged as prerelease
///
/// When several releases share the newest version, the earliest one in
/// `releases` wins.
pub fn resolve_applicable_release(releases: &[Release], channel: Channel) -> Option<&Release> {
    releases
        .iter()
        .filter(|release| channel.includes_prereleases() || !release.is_prerelease)
        .fold(None, |best: Option<&Release>, release| match best {
            Some(current) if compare_versions(&release.tag, &current.tag) != Ordering::Greater => {
                Some(current)
            }
            _ => Some(release),
        })
}

/// Decide whether the running version should move to another release
///
/// Besides plain upgrades, a build running a prerelease on the stable
/// channel is offered the latest stable release even when it is older.
pub fn decide_update(
    current_version: &str,
    releases: &[Release],
    channel: Channel,
) -> UpdateDecision {
    let Some(applicable) = resolve_applicable_release(releases, channel) else {
        return UpdateDecision::NoUpdate;
    };

    if compare_versions(&applicable.tag, current_version) == Ordering::Greater {
        return UpdateDecision::Upgrade(applicable.clone());
    }

    if channel == Channel::Stable && is_prerelease_version(current_version) {
        if let Some(latest_stable) = resolve_applicable_release(releases, Channel::Stable) {
            if compare_versions(&latest_stable.tag, current_version) != Ordering::Greater {
                return UpdateDecision::Downgrade(latest_stable.clone());
            }
        }
    }

    UpdateDecision::NoUpdate
}
