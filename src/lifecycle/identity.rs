// Copyright 2024-2026 modswap Contributors
// SPDX-License-Identifier: Apache-2.0

//! Module identity and descriptor types.
//!
//! A descriptor is what a compiled module declares about itself. An identity is
//! the descriptor bound to a location token the host loader will ask for.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Scheme used for location tokens. No filesystem path ever starts with it,
/// so the host's own loader can never resolve a token by accident.
pub const LOCATION_SCHEME: &str = "modswap://";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("Invalid version string: {0}")]
    Invalid(String),
}

/// Semantic version (`major.minor.patch[-pre]`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre: Option<String>,
}

impl ModuleVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self { major, minor, patch, pre: None }
    }
}

impl FromStr for ModuleVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || VersionError::Invalid(s.to_string());
        let (core, pre) = match s.split_once('-') {
            Some((core, pre)) if !pre.is_empty() => (core, Some(pre.to_string())),
            Some(_) => return Err(invalid()),
            None => (s, None),
        };

        let mut parts = core.split('.');
        let mut next = || -> Result<u64, VersionError> {
            parts
                .next()
                .ok_or_else(invalid)?
                .parse::<u64>()
                .map_err(|_| invalid())
        };
        let major = next()?;
        let minor = next()?;
        let patch = next()?;
        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Self { major, minor, patch, pre })
    }
}

impl TryFrom<String> for ModuleVersion {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ModuleVersion> for String {
    fn from(value: ModuleVersion) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ModuleVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre {
            write!(f, "-{}", pre)?;
        }
        Ok(())
    }
}

/// Metadata a compiled module declares about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// Globally unique identifier (e.g., "com.example.inventory").
    pub guid: String,
    /// Human-readable name.
    pub name: String,
    /// Semantic version.
    pub version: ModuleVersion,
}

/// Immutable identity of a module handed to the lifecycle registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleIdentity {
    guid: String,
    name: String,
    version: ModuleVersion,
    location_token: String,
}

impl ModuleIdentity {
    /// Identity with an explicit location token.
    pub fn new(
        guid: impl Into<String>,
        name: impl Into<String>,
        version: ModuleVersion,
        location_token: impl Into<String>,
    ) -> Self {
        Self {
            guid: guid.into(),
            name: name.into(),
            version,
            location_token: location_token.into(),
        }
    }

    /// Identity whose location token is derived from the GUID.
    pub fn from_descriptor(descriptor: ModuleDescriptor) -> Self {
        let location_token = location_token_for(&descriptor.guid);
        Self {
            guid: descriptor.guid,
            name: descriptor.name,
            version: descriptor.version,
            location_token,
        }
    }

    pub fn guid(&self) -> &str {
        &self.guid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &ModuleVersion {
        &self.version
    }

    pub fn location_token(&self) -> &str {
        &self.location_token
    }
}

impl fmt::Display for ModuleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) [{}]", self.name, self.version, self.guid)
    }
}

/// Location token for a GUID.
pub fn location_token_for(guid: &str) -> String {
    format!("{}{}", LOCATION_SCHEME, guid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse_and_display() {
        let v: ModuleVersion = "1.2.3".parse().unwrap();
        assert_eq!(v, ModuleVersion::new(1, 2, 3));
        assert_eq!(v.to_string(), "1.2.3");

        let pre: ModuleVersion = "0.4.0-beta.1".parse().unwrap();
        assert_eq!(pre.pre.as_deref(), Some("beta.1"));
        assert_eq!(pre.to_string(), "0.4.0-beta.1");
    }

    #[test]
    fn test_version_rejects_malformed() {
        for bad in ["", "1", "1.2", "1.2.3.4", "a.b.c", "1.2.3-"] {
            assert!(bad.parse::<ModuleVersion>().is_err(), "{bad} should fail");
        }
    }

    #[test]
    fn test_descriptor_from_json() {
        let json = r#"{"guid":"com.example.m1","name":"M1","version":"1.0.0"}"#;
        let descriptor: ModuleDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor.version, ModuleVersion::new(1, 0, 0));

        let identity = ModuleIdentity::from_descriptor(descriptor);
        assert_eq!(identity.guid(), "com.example.m1");
        assert_eq!(identity.location_token(), "modswap://com.example.m1");
    }

    #[test]
    fn test_descriptor_rejects_bad_version() {
        let json = r#"{"guid":"g","name":"n","version":"one"}"#;
        assert!(serde_json::from_str::<ModuleDescriptor>(json).is_err());
    }
}
