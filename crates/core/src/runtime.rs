// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime specs: `name@version` identifiers for pre-built language roots.

use thiserror::Error;

/// Errors from parsing a runtime spec string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeSpecError {
    #[error("empty runtime spec")]
    Empty,
    #[error("invalid runtime name '{0}'")]
    InvalidName(String),
    #[error("invalid runtime version '{0}'")]
    InvalidVersion(String),
}

/// A `name@version` reference to a built runtime root on disk.
///
/// The name matches `[A-Za-z][A-Za-z0-9.-]*`. The version is either `latest`
/// (also the default when omitted) or a strict `MAJOR.MINOR.PATCH` semantic
/// version with optional `-prerelease` and `+build` parts; a leading `v` is
/// rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuntimeSpec {
    name: String,
    version: String,
}

impl RuntimeSpec {
    /// Parse `name`, `name@latest`, or `name@X.Y.Z[-pre][+build]`.
    pub fn parse(input: &str) -> Result<Self, RuntimeSpecError> {
        if input.is_empty() {
            return Err(RuntimeSpecError::Empty);
        }

        let (name, version) = match input.split_once('@') {
            Some((name, version)) => (name, version),
            None => (input, ""),
        };

        if !valid_name(name) {
            return Err(RuntimeSpecError::InvalidName(name.to_string()));
        }

        let version = if version.is_empty() || version == "latest" {
            "latest".to_string()
        } else if valid_semver(version) {
            version.to_string()
        } else {
            return Err(RuntimeSpecError::InvalidVersion(version.to_string()));
        };

        Ok(Self {
            name: name.to_string(),
            version,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// On-disk directory name: `name-version`.
    pub fn full_name(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }
}

impl std::fmt::Display for RuntimeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

impl std::str::FromStr for RuntimeSpec {
    type Err = RuntimeSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// On the wire a runtime spec is its string form.
impl serde::Serialize for RuntimeSpec {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for RuntimeSpec {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        RuntimeSpec::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// `[A-Za-z][A-Za-z0-9.-]*`
fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}

/// Strict `MAJOR.MINOR.PATCH[-prerelease][+build]`, all three numeric
/// components required.
fn valid_semver(version: &str) -> bool {
    let (rest, build) = match version.split_once('+') {
        Some((rest, build)) => (rest, Some(build)),
        None => (version, None),
    };
    if let Some(build) = build {
        if !valid_dot_separated(build) {
            return false;
        }
    }

    let (core, pre) = match rest.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (rest, None),
    };
    if let Some(pre) = pre {
        if !valid_dot_separated(pre) {
            return false;
        }
    }

    let mut parts = core.split('.');
    let numeric = |p: Option<&str>| {
        p.is_some_and(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
    };
    numeric(parts.next()) && numeric(parts.next()) && numeric(parts.next()) && parts.next().is_none()
}

/// Non-empty dot-separated identifiers over `[0-9A-Za-z-]`.
fn valid_dot_separated(s: &str) -> bool {
    !s.is_empty()
        && s.split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'))
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
