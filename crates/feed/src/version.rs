//! Release maturity of a module version string.
//!
//! Nothing in the synchronization loop looks at this; it exists for readers
//! of the mirrored data that want a "latest" version per path.

use regex::Regex;
use std::sync::LazyLock;

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

// Semantic version with the mandatory "v" prefix. Like the Go toolchain,
// "v1" and "v1.2" are accepted as shorthands but cannot carry a prerelease.
regex!(
    SEMVER_REGEX,
    r"^v(0|[1-9]\d*)(?:\.(0|[1-9]\d*)(?:\.(0|[1-9]\d*)(-[0-9A-Za-z-]+(?:\.[0-9A-Za-z-]+)*)?(\+[0-9A-Za-z-]+(?:\.[0-9A-Za-z-]+)*)?)?)?$"
);
// vX.0.0-yyyymmddhhmmss-abcdefabcdef
// vX.Y.Z-pre.0.yyyymmddhhmmss-abcdefabcdef
// vX.Y.(Z+1)-0.yyyymmddhhmmss-abcdefabcdef
regex!(
    PSEUDO_REGEX,
    r"^v[0-9]+\.(?:0\.0-|\d+\.\d+-(?:[^+]*\.)?0\.)\d{14}-[A-Za-z0-9]+(?:\+[0-9A-Za-z-]+)?$"
);

/// Release maturity, ordered from least to most preferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VersionKind {
    /// Not a valid semantic version at all.
    Invalid,
    /// Generated from a commit (`v0.0.0-20191109021931-daa7c04131f5`).
    Pseudo,
    /// Tagged, but with a prerelease suffix (`v1.2.3-rc.1`).
    Prerelease,
    /// Tagged release (`v1.2.3`, `v2.0.0+incompatible`).
    Stable,
}
impl VersionKind {
    pub fn classify(version: impl AsRef<str>) -> Self {
        let version = version.as_ref();
        let Some(captures) = SEMVER_REGEX.captures(version) else {
            return Self::Invalid;
        };
        if PSEUDO_REGEX.is_match(version) {
            return Self::Pseudo;
        }
        match captures.get(4) {
            Some(_) => Self::Prerelease,
            None => Self::Stable,
        }
    }
}
