use serde::{Deserialize, Serialize};

use keystone_core::PrincipalId;

use crate::PermissionFlags;

/// An encoded password hash (PHC string format).
///
/// Opaque to everything but the [`PasswordHasher`](crate::PasswordHasher).
/// `Debug` is redacted and the type is never serialized into API responses.
#[derive(Clone, PartialEq, Eq)]
pub struct HashedPassword(String);

impl HashedPassword {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Debug for HashedPassword {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("HashedPassword(<redacted>)")
    }
}

/// Identity record owned by the user store.
///
/// The core only reads principals; `password_hash` is populated only by an
/// explicit `find_by_email(.., true)` lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: PrincipalId,
    pub email: String,
    #[serde(skip)]
    pub password_hash: Option<HashedPassword>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub permission_flags: PermissionFlags,
}

impl Principal {
    /// Copy without the password hash (what normal reads must return).
    pub fn without_password_hash(&self) -> Self {
        Self {
            password_hash: None,
            ..self.clone()
        }
    }
}
