//! Function naming rules (spec §6 "Function name rules") and the
//! `(namespace, name)` composite identity (spec §3).

use std::fmt;

use edgefn_errors::EdgeError;
use serde::{Deserialize, Serialize};

const MAX_NAME_LEN: usize = 64;
const RESERVED_NAMES: &[&str] = &[".", "..", "index", "main", "handler", "_", "-"];

/// Validated function name: 1-64 chars, `^[A-Za-z0-9_-]+$`, not reserved.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FunctionName(String);

impl FunctionName {
    pub fn parse(raw: impl Into<String>) -> Result<Self, EdgeError> {
        let raw = raw.into();
        if raw.is_empty() || raw.len() > MAX_NAME_LEN {
            return Err(EdgeError::invalid_name(format!(
                "function name must be 1-{MAX_NAME_LEN} characters, got {} characters",
                raw.len()
            )));
        }
        if !raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(EdgeError::invalid_name(format!(
                "function name \"{raw}\" must match ^[A-Za-z0-9_-]+$"
            )));
        }
        if RESERVED_NAMES.contains(&raw.as_str()) {
            return Err(EdgeError::invalid_name(format!(
                "function name \"{raw}\" is reserved"
            )));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for FunctionName {
    type Error = EdgeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<FunctionName> for String {
    fn from(value: FunctionName) -> Self {
        value.0
    }
}

impl fmt::Display for FunctionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An unvalidated grouping namespace. `default` is privileged only in that
/// the store's name-resolution query prefers it when the caller omits a
/// namespace (spec §4.1); the type itself imposes no extra rules.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Namespace(String);

pub const DEFAULT_NAMESPACE: &str = "default";

impl Namespace {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn default_namespace() -> Self {
        Self(DEFAULT_NAMESPACE.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_default(&self) -> bool {
        self.0 == DEFAULT_NAMESPACE
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::default_namespace()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_64_chars() {
        let name = "a".repeat(64);
        assert!(FunctionName::parse(name).is_ok());
    }

    #[test]
    fn rejects_65_chars() {
        let name = "a".repeat(65);
        assert!(FunctionName::parse(name).is_err());
    }

    #[test]
    fn rejects_reserved() {
        for reserved in RESERVED_NAMES {
            assert!(FunctionName::parse(reserved.to_string()).is_err(), "{reserved}");
        }
    }

    #[test]
    fn rejects_invalid_chars() {
        assert!(FunctionName::parse("has a space").is_err());
        assert!(FunctionName::parse("has/slash").is_err());
    }

    #[test]
    fn accepts_underscore_and_dash() {
        assert!(FunctionName::parse("my_function-v2").is_ok());
    }
}
