//! Producer versions.

use serde_derive::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;

/// A declared revision of a `Producer`'s logic.
///
/// `SemVer` fingerprinting only considers the major component, unless the
/// major version is zero. By only considering the major version, incremental
/// bumps can be added to a Producer without triggering historical backfills;
/// the major version MUST be incremented on schema or methodological changes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Version {
    SemVer { major: u64, minor: u64, patch: u64 },
    String(String),
}

impl Version {
    pub fn semver(major: u64, minor: u64, patch: u64) -> Version {
        Version::SemVer { major, minor, patch }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        match *self {
            Version::SemVer { major, minor, patch } => {
                if major > 0 {
                    Fingerprint::from_string(&format!("SemVer:{}", major))
                } else {
                    Fingerprint::from_string(&format!("SemVer:{}.{}.{}", major, minor, patch))
                }
            }
            Version::String(ref value) => Fingerprint::from_string(value),
        }
    }
}

impl Default for Version {
    fn default() -> Version {
        Version::semver(0, 0, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semver_fingerprint_ignores_minor_after_one() {
        assert_eq!(
            Version::semver(1, 0, 0).fingerprint(),
            Version::semver(1, 2, 3).fingerprint(),
        );
        assert_ne!(
            Version::semver(1, 0, 0).fingerprint(),
            Version::semver(2, 0, 0).fingerprint(),
        );
    }

    #[test]
    fn test_semver_fingerprint_considers_all_before_one() {
        assert_ne!(
            Version::semver(0, 0, 1).fingerprint(),
            Version::semver(0, 0, 2).fingerprint(),
        );
        assert_ne!(
            Version::semver(0, 1, 0).fingerprint(),
            Version::semver(0, 0, 1).fingerprint(),
        );
    }

    #[test]
    fn test_string_version() {
        assert_eq!(
            Version::String("a".into()).fingerprint(),
            Fingerprint::from_string("a"),
        );
    }
}
