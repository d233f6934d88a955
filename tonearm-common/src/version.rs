//! Semantic versions for modules and the host API

use serde::{Deserialize, Serialize};

/// Semantic version {major, minor, patch}
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

/// API version implemented by this build of the host
pub const HOST_API_VERSION: Version = Version::new(1, 0, 0);

impl Version {
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self { major, minor, patch }
    }

    /// Whether a host at `host` satisfies this version used as a minimum floor.
    ///
    /// Only major and minor are compared; patch releases never break modules.
    pub fn is_satisfied_by(&self, host: Version) -> bool {
        if self.major > host.major {
            return false;
        }
        !(self.major == host.major && self.minor > host.minor)
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
