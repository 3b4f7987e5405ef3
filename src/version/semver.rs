use std::cmp::Ordering;

/// A release tag decomposed into its numeric main sequence and an optional
/// prerelease ordinal.
///
/// Parsing never fails: unparseable components degrade to `0`, so every
/// string has a defined position in the order.
///
/// Examples:
/// - "v1.2.3" -> main [1, 2, 3], no prerelease
/// - "0.2.9-1" -> main [0, 2, 9], prerelease 1
/// - "1.x" -> main [1, 0], no prerelease
#[derive(Debug, Clone)]
pub struct ReleaseVersion {
    pub main: Vec<u64>,
    pub prerelease: Option<u64>,
}

impl ReleaseVersion {
    pub fn parse(version: &str) -> Self {
        let version = version.strip_prefix('v').unwrap_or(version);
        let (main, prerelease) = match version.split_once('-') {
            Some((main, "")) => (main, None),
            Some((main, pre)) => (main, Some(pre)),
            None => (version, None),
        };

        Self {
            main: main.split('.').map(parse_component).collect(),
            prerelease: prerelease.map(parse_component),
        }
    }

    pub fn is_prerelease(&self) -> bool {
        self.prerelease.is_some()
    }
}

fn parse_component(component: &str) -> u64 {
    component.trim().parse().unwrap_or(0)
}

impl Ord for ReleaseVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.main.len().max(other.main.len());
        for idx in 0..len {
            let a = self.main.get(idx).copied().unwrap_or(0);
            let b = other.main.get(idx).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }

        // A final release outranks every prerelease of the same main version
        match (self.prerelease, other.prerelease) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => a.cmp(&b),
        }
    }
}

impl PartialOrd for ReleaseVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Equality follows the ordering, so "1.0" == "1.0.0".
impl PartialEq for ReleaseVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ReleaseVersion {}

/// Compare two raw version strings.
///
/// Returns `Greater` when `a` is newer than `b`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    ReleaseVersion::parse(a).cmp(&ReleaseVersion::parse(b))
}

/// Check whether a version string carries a prerelease suffix
pub fn is_prerelease_version(version: &str) -> bool {
    ReleaseVersion::parse(version).is_prerelease()
}
