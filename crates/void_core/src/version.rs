//! Semantic versioning for module API compatibility

use core::fmt;
use core::cmp::Ordering;
use core::str::FromStr;

use crate::error::VersionError;

/// Semantic version for compatibility checking
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl Version {
    /// Create a new version
    #[inline]
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self { major, minor, patch }
    }

    /// Version 0.0.0
    pub const ZERO: Version = Version::new(0, 0, 0);

    /// Check if something built against `self` can be driven by a host
    /// that provides `required` (same major, at least the same minor/patch)
    pub fn is_compatible_with(&self, required: &Version) -> bool {
        if self.major == 0 && required.major == 0 {
            // Pre-1.0: minor version must match exactly
            self.minor == required.minor
        } else {
            self.major == required.major && self >= required
        }
    }

    /// Like [`Version::is_compatible_with`], reporting both sides on failure
    pub fn require(&self, required: &Version) -> Result<(), VersionError> {
        if self.is_compatible_with(required) {
            Ok(())
        } else {
            Err(VersionError::Incompatible {
                required: alloc::format!("{}", required).into_boxed_str(),
                found: alloc::format!("{}", self).into_boxed_str(),
            })
        }
    }

    /// Parse from string "major.minor.patch"
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let malformed = || VersionError::Malformed(s.into());
        let mut parts = s.trim().split('.');
        let mut next = || -> Result<u16, VersionError> {
            parts.next().ok_or_else(malformed)?.parse().map_err(|_| malformed())
        };
        let version = Self::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(malformed());
        }
        Ok(version)
    }

    /// Convert to a single u64 for easy comparison
    #[inline]
    pub const fn to_u64(&self) -> u64 {
        (self.major as u64) << 32 | (self.minor as u64) << 16 | self.patch as u64
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_u64().cmp(&other.to_u64())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Version({})", self)
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::new(0, 1, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parsing() {
        let v = Version::parse("1.2.3").unwrap();
        assert_eq!(v, Version::new(1, 2, 3));
        assert!(Version::parse("1.2").is_err());
        assert!(Version::parse("1.2.3.4").is_err());
        assert!(Version::parse("one.two.three").is_err());
    }

    #[test]
    fn test_version_compatibility() {
        let v1 = Version::new(1, 2, 0);
        let v2 = Version::new(1, 2, 1);
        let v3 = Version::new(1, 3, 0);
        let v4 = Version::new(2, 0, 0);

        assert!(v2.is_compatible_with(&v1));
        assert!(v3.is_compatible_with(&v1));
        assert!(!v1.is_compatible_with(&v2));
        assert!(!v4.is_compatible_with(&v1));
        assert!(v4.require(&v1).is_err());
    }

    #[test]
    fn test_pre_release_requires_same_minor() {
        assert!(Version::new(0, 3, 9).is_compatible_with(&Version::new(0, 3, 0)));
        assert!(!Version::new(0, 4, 0).is_compatible_with(&Version::new(0, 3, 0)));
    }
}
