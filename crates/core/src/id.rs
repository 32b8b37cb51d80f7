//! Strongly-typed identifiers used across the domain.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Identity of a principal (user account).
///
/// Principal ids are opaque strings: they are minted by the user store, carried
/// inside access tokens and compared against path parameters for ownership
/// checks. Freshly generated ids are UUIDv7 in simple (hyphen-less) form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(String);

impl PrincipalId {
    /// Generate a new identifier.
    ///
    /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
    /// for determinism.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl core::fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PrincipalId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DomainError::invalid_id("PrincipalId: empty"));
        }
        if s.chars().any(|c| c.is_control() || c.is_whitespace()) {
            return Err(DomainError::invalid_id(format!(
                "PrincipalId: unexpected character in {s:?}"
            )));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<&str> for PrincipalId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PrincipalId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl PartialEq<str> for PrincipalId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}
