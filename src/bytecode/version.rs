//! Module format versioning and compatibility rules.
//!
//! A reader accepts a module when its major version equals the supported
//! major. A newer minor is tolerated with a warning, and the patch number is
//! informational only. The runtime and the disassembler both go through
//! [`VersionPolicy::check`] so they can never disagree.

use crate::bytecode::errors::VMError;
use stackvm_derive::BinaryCodec;
use std::fmt;

/// Format version written by this toolchain.
pub const CURRENT_VERSION: Version = Version::new(0, 0, 1);

/// Semantic version stored at the start of every module.
///
/// Encodes as three little-endian `u16`s (6 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BinaryCodec)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl Version {
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl Default for Version {
    fn default() -> Self {
        CURRENT_VERSION
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Outcome of a successful version check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compatibility {
    /// Same major, minor at or below the supported minor.
    Compatible,
    /// Same major, but the module was written by a newer minor revision.
    MinorDrift { supported: u16, found: u16 },
}

impl Compatibility {
    pub fn is_drift(&self) -> bool {
        matches!(self, Compatibility::MinorDrift { .. })
    }
}

impl fmt::Display for Compatibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compatibility::Compatible => write!(f, "compatible"),
            Compatibility::MinorDrift { supported, found } => write!(
                f,
                "module minor version {found} is newer than supported {supported}"
            ),
        }
    }
}

/// Version a reader supports, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionPolicy {
    supported: Version,
}

impl VersionPolicy {
    pub const fn new(supported: Version) -> Self {
        Self { supported }
    }

    pub fn supported(&self) -> Version {
        self.supported
    }

    /// Applies the compatibility rules to a module's declared version.
    ///
    /// Returns [`VMError::UnsupportedVersion`] on any major mismatch, older or newer.
    pub fn check(&self, found: Version) -> Result<Compatibility, VMError> {
        if found.major != self.supported.major {
            return Err(VMError::UnsupportedVersion {
                expected: self.supported.major,
                found: found.major,
            });
        }

        if found.minor > self.supported.minor {
            return Ok(Compatibility::MinorDrift {
                supported: self.supported.minor,
                found: found.minor,
            });
        }

        Ok(Compatibility::Compatible)
    }
}

impl Default for VersionPolicy {
    fn default() -> Self {
        Self::new(CURRENT_VERSION)
    }
}
