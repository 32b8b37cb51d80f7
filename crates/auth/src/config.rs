use serde::{Deserialize, Serialize};

use crate::password::HashingConfig;
use crate::{AuthError, AuthResult};

/// Minimum signing-secret length, in bytes.
pub const MIN_SIGNING_SECRET_BYTES: usize = 32;

/// Minimum refresh-secret length, in bytes (256 bits).
pub const MIN_REFRESH_SECRET_BYTES: usize = 32;

/// Server-wide token signing secret.
///
/// Process-lifetime constant. `Debug` is redacted and the value is never
/// serialized back out.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct SigningSecret(String);

impl SigningSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl core::fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("SigningSecret(<redacted>)")
    }
}

/// Authentication configuration (externally supplied, never hard-coded).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC key for access-token signatures and refresh-token derivation.
    #[serde(skip_serializing)]
    pub signing_secret: SigningSecret,

    /// Access-token lifetime in seconds.
    pub access_token_ttl_secs: u64,

    /// Length of the per-issuance refresh secret, in bytes.
    pub refresh_secret_bytes: usize,

    /// Clock skew tolerance applied to `exp`, in seconds.
    pub leeway_secs: u64,

    pub hashing: HashingConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            signing_secret: SigningSecret::default(),
            access_token_ttl_secs: 36_000,
            refresh_secret_bytes: 64,
            leeway_secs: 0,
            hashing: HashingConfig::default(),
        }
    }
}

impl AuthConfig {
    pub fn new(signing_secret: impl Into<String>) -> Self {
        Self {
            signing_secret: SigningSecret::new(signing_secret),
            ..Default::default()
        }
    }

    pub fn with_access_token_ttl_secs(mut self, secs: u64) -> Self {
        self.access_token_ttl_secs = secs;
        self
    }

    pub fn with_hashing(mut self, hashing: HashingConfig) -> Self {
        self.hashing = hashing;
        self
    }

    pub fn validate(&self) -> AuthResult<()> {
        if self.signing_secret.is_empty() {
            return Err(AuthError::internal("signing secret is not configured"));
        }
        if self.signing_secret.len() < MIN_SIGNING_SECRET_BYTES {
            return Err(AuthError::internal(format!(
                "signing secret must be at least {MIN_SIGNING_SECRET_BYTES} bytes"
            )));
        }
        if self.access_token_ttl_secs == 0 {
            return Err(AuthError::internal("access token lifetime must be positive"));
        }
        if i64::try_from(self.access_token_ttl_secs).is_err() {
            return Err(AuthError::internal("access token lifetime is out of range"));
        }
        if self.refresh_secret_bytes < MIN_REFRESH_SECRET_BYTES {
            return Err(AuthError::internal(format!(
                "refresh secret must be at least {MIN_REFRESH_SECRET_BYTES} bytes"
            )));
        }
        Ok(())
    }
}
