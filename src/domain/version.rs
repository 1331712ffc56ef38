use crate::error::{ReleaseError, Result};
use std::fmt;
use std::str::FromStr;

/// Semantic version representation (release versions only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    /// Create a new version
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Version {
            major,
            minor,
            patch,
        }
    }

    /// Parse a release version, tolerating a leading `v` or `V`.
    ///
    /// Pre-release and build metadata are rejected: a tag such as
    /// `v1.2.0-rc.1` never counts as a release baseline.
    pub fn parse(text: &str) -> Result<Self> {
        let clean = text
            .strip_prefix('v')
            .or_else(|| text.strip_prefix('V'))
            .unwrap_or(text);

        let parsed = semver::Version::parse(clean).map_err(|e| {
            ReleaseError::version(format!(
                "Invalid version format: '{}' - expected X.Y.Z ({})",
                text, e
            ))
        })?;

        if !parsed.pre.is_empty() || !parsed.build.is_empty() {
            return Err(ReleaseError::version(format!(
                "'{}' is not a release version",
                text
            )));
        }

        Ok(Version::new(parsed.major, parsed.minor, parsed.patch))
    }

    /// Bump version according to bump type
    pub fn bump(&self, bump_type: VersionBump) -> Result<Self> {
        let increment = |part: u64| {
            part.checked_add(1).ok_or_else(|| {
                ReleaseError::version(format!("cannot apply a {} bump to {}", bump_type, self))
            })
        };
        Ok(match bump_type {
            VersionBump::Major => Version::new(increment(self.major)?, 0, 0),
            VersionBump::Minor => Version::new(self.major, increment(self.minor)?, 0),
            VersionBump::Patch => Version::new(self.major, self.minor, increment(self.patch)?),
        })
    }
}

impl FromStr for Version {
    type Err = ReleaseError;

    fn from_str(s: &str) -> Result<Self> {
        Version::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Version bump class, ordered by precedence (`Patch < Minor < Major`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VersionBump {
    Patch,
    Minor,
    Major,
}

impl VersionBump {
    pub fn name(&self) -> &'static str {
        match self {
            VersionBump::Major => "major",
            VersionBump::Minor => "minor",
            VersionBump::Patch => "patch",
        }
    }
}

impl fmt::Display for VersionBump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
