use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, TimeZone, Utc};
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use keystone_core::PrincipalId;

use crate::{PermissionFlags, Principal};

/// Per-issuance refresh secret.
///
/// Random bytes minted by the token issuer, carried only inside the signed
/// access token and used as the HMAC key for refresh-token derivation. Never
/// persisted. Travels as standard base64 inside the token payload.
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshKey(Vec<u8>);

impl RefreshKey {
    /// Draw `len` bytes from the thread-local CSPRNG.
    pub fn generate(len: usize) -> Self {
        let mut bytes = vec![0u8; len];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl core::fmt::Debug for RefreshKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "RefreshKey(<{} bytes redacted>)", self.0.len())
    }
}

impl Serialize for RefreshKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for RefreshKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded)
            .map(Self)
            .map_err(serde::de::Error::custom)
    }
}

/// Authenticated-session payload embedded in an access token.
///
/// `permission_flags` is a point-in-time copy; it is not re-read per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimSet {
    pub user_id: PrincipalId,
    pub email: String,
    pub permission_flags: PermissionFlags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_key: Option<RefreshKey>,
}

impl ClaimSet {
    /// Claims for a principal, without a refresh secret.
    pub fn for_principal(principal: &Principal) -> Self {
        Self {
            user_id: principal.id.clone(),
            email: principal.email.clone(),
            permission_flags: principal.permission_flags,
            refresh_key: None,
        }
    }
}

/// Wire payload of an access token: the claim set plus registered claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    #[serde(flatten)]
    pub claims: ClaimSet,

    /// Issued-at, seconds since the epoch.
    pub iat: i64,

    /// Expiration, seconds since the epoch.
    pub exp: i64,
}

/// Claims recovered from an access token that passed signature and expiry
/// verification.
///
/// Only [`TokenIssuer::verify`](crate::TokenIssuer::verify) constructs this,
/// so holding one is proof that the token was valid when it was checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedClaims {
    inner: AccessClaims,
}

impl VerifiedClaims {
    pub(crate) fn new(inner: AccessClaims) -> Self {
        Self { inner }
    }

    pub fn claims(&self) -> &ClaimSet {
        &self.inner.claims
    }

    pub fn user_id(&self) -> &PrincipalId {
        &self.inner.claims.user_id
    }

    pub fn permission_flags(&self) -> PermissionFlags {
        self.inner.claims.permission_flags
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.inner.iat, 0).single()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.inner.exp, 0).single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_keys_are_fresh_and_sized() {
        let a = RefreshKey::generate(32);
        let b = RefreshKey::generate(32);
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
        assert!(!format!("{a:?}").contains(&format!("{:?}", a.as_bytes())));
    }

    #[test]
    fn claim_set_wire_shape() {
        let claims = ClaimSet {
            user_id: PrincipalId::from("u1"),
            email: "a@example.com".to_string(),
            permission_flags: PermissionFlags::FREE,
            refresh_key: Some(RefreshKey(vec![0xde, 0xad, 0xbe, 0xef])),
        };
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["permissionFlags"], 1);
        assert_eq!(json["refreshKey"], "3q2+7w==");

        let back: ClaimSet = serde_json::from_value(json).unwrap();
        assert_eq!(back, claims);
    }

    #[test]
    fn missing_refresh_key_is_omitted() {
        let claims = ClaimSet {
            user_id: PrincipalId::from("u1"),
            email: "a@example.com".to_string(),
            permission_flags: PermissionFlags::PAID,
            refresh_key: None,
        };
        let json = serde_json::to_value(&claims).unwrap();
        assert!(json.get("refreshKey").is_none());
    }
}
