//! Access-token signing and refresh-token derivation.
//!
//! Access tokens are HS256 JWTs carrying a [`ClaimSet`]. Refresh tokens are
//! not stored anywhere: each one is
//! `base64(HMAC-SHA512(key = refresh secret, msg = principal id || signing secret))`,
//! where the refresh secret lives only inside the paired access token.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use hmac::{Hmac, Mac};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::Serialize;
use sha2::Sha512;

use keystone_core::PrincipalId;

use crate::{AccessClaims, AuthConfig, AuthError, AuthResult, ClaimSet, RefreshKey, VerifiedClaims};

type HmacSha512 = Hmac<Sha512>;

/// Freshly minted credentials returned to the caller.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl core::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("TokenPair(<redacted>)")
    }
}

/// Mints and verifies access tokens, and derives the paired refresh tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    config: Arc<AuthConfig>,
    encoding_key: Arc<EncodingKey>,
    decoding_key: Arc<DecodingKey>,
    validation: Arc<Validation>,
}

impl TokenIssuer {
    pub fn new(config: AuthConfig) -> AuthResult<Self> {
        config.validate()?;

        let encoding_key = EncodingKey::from_secret(config.signing_secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.signing_secret.as_bytes());

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = config.leeway_secs;
        validation.validate_aud = false;

        Ok(Self {
            config: Arc::new(config),
            encoding_key: Arc::new(encoding_key),
            decoding_key: Arc::new(decoding_key),
            validation: Arc::new(validation),
        })
    }

    /// Sign `claims` with a brand-new refresh secret and derive its refresh token.
    ///
    /// Any refresh secret already present in `claims` is discarded.
    pub fn issue(&self, mut claims: ClaimSet) -> AuthResult<TokenPair> {
        let refresh_key = RefreshKey::generate(self.config.refresh_secret_bytes);
        let refresh_token = self.derive_refresh_token(&refresh_key, &claims.user_id)?;
        claims.refresh_key = Some(refresh_key);

        let iat = Utc::now().timestamp();
        // `validate()` bounds the ttl to i64.
        let exp = iat.saturating_add(self.config.access_token_ttl_secs as i64);
        let user_id = claims.user_id.clone();

        let access_token = self.sign(&AccessClaims { claims, iat, exp })?;

        tracing::debug!(user_id = %user_id, expires_at = exp, "issued token pair");

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Verify signature and expiry, recovering the embedded claims.
    pub fn verify(&self, token: &str) -> AuthResult<VerifiedClaims> {
        decode::<AccessClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| VerifiedClaims::new(data.claims))
            .map_err(|e| {
                match e.kind() {
                    ErrorKind::ExpiredSignature => tracing::debug!("access token expired"),
                    ErrorKind::InvalidSignature => tracing::warn!("access token signature mismatch"),
                    _ => tracing::debug!(error = %e, "access token rejected"),
                }
                AuthError::InvalidOrExpiredToken
            })
    }

    /// Deterministic refresh-token derivation.
    pub fn derive_refresh_token(&self, key: &RefreshKey, user_id: &PrincipalId) -> AuthResult<String> {
        let mac = self.refresh_mac(key, user_id)?;
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// Constant-time check of a presented refresh token against the derivation.
    pub fn refresh_token_matches(&self, key: &RefreshKey, user_id: &PrincipalId, presented: &str) -> bool {
        let Ok(presented) = STANDARD.decode(presented) else {
            return false;
        };
        match self.refresh_mac(key, user_id) {
            Ok(mac) => mac.verify_slice(&presented).is_ok(),
            Err(_) => false,
        }
    }

    pub fn access_token_ttl_secs(&self) -> u64 {
        self.config.access_token_ttl_secs
    }

    pub(crate) fn sign(&self, claims: &AccessClaims) -> AuthResult<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| AuthError::internal(format!("failed to sign access token: {e}")))
    }

    fn refresh_mac(&self, key: &RefreshKey, user_id: &PrincipalId) -> AuthResult<HmacSha512> {
        let mut mac = HmacSha512::new_from_slice(key.as_bytes())
            .map_err(|e| AuthError::internal(format!("refresh key rejected: {e}")))?;
        mac.update(user_id.as_str().as_bytes());
        mac.update(self.config.signing_secret.as_bytes());
        Ok(mac)
    }
}

impl core::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("access_token_ttl_secs", &self.config.access_token_ttl_secs)
            .field("refresh_secret_bytes", &self.config.refresh_secret_bytes)
            .finish()
    }
}

#[cfg(test)]
pub(crate) const TEST_SECRET: &str = "test-signing-secret-that-is-long-enough";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PermissionFlags;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(AuthConfig::new(TEST_SECRET)).unwrap()
    }

    fn claims(id: &str) -> ClaimSet {
        ClaimSet {
            user_id: PrincipalId::from(id),
            email: format!("{id}@example.com"),
            permission_flags: PermissionFlags::FREE,
            refresh_key: None,
        }
    }

    #[test]
    fn issue_then_verify_recovers_claims() {
        let issuer = issuer();
        let pair = issuer.issue(claims("u1")).unwrap();

        let verified = issuer.verify(&pair.access_token).unwrap();
        assert_eq!(verified.user_id().as_str(), "u1");
        assert_eq!(verified.claims().email, "u1@example.com");
        assert_eq!(verified.permission_flags(), PermissionFlags::FREE);

        let key = verified.claims().refresh_key.as_ref().unwrap();
        assert_eq!(key.len(), 64);
        assert_eq!(issuer.derive_refresh_token(key, verified.user_id()).unwrap(), pair.refresh_token);
    }

    #[test]
    fn every_issuance_rotates_the_refresh_secret() {
        let issuer = issuer();
        let a = issuer.issue(claims("u1")).unwrap();
        let b = issuer.issue(claims("u1")).unwrap();
        assert_ne!(a.refresh_token, b.refresh_token);
        assert_ne!(a.access_token, b.access_token);
    }

    #[test]
    fn prior_refresh_key_is_superseded() {
        let issuer = issuer();
        let old_key = RefreshKey::generate(64);
        let mut c = claims("u1");
        c.refresh_key = Some(old_key.clone());

        let pair = issuer.issue(c).unwrap();
        let verified = issuer.verify(&pair.access_token).unwrap();
        assert_ne!(verified.claims().refresh_key.as_ref(), Some(&old_key));
    }

    #[test]
    fn refresh_token_is_bound_to_principal_and_key() {
        let issuer = issuer();
        let key = RefreshKey::generate(64);
        let token = issuer.derive_refresh_token(&key, &PrincipalId::from("u1")).unwrap();

        assert!(issuer.refresh_token_matches(&key, &PrincipalId::from("u1"), &token));
        assert!(!issuer.refresh_token_matches(&key, &PrincipalId::from("u2"), &token));
        assert!(!issuer.refresh_token_matches(&RefreshKey::generate(64), &PrincipalId::from("u1"), &token));
        assert!(!issuer.refresh_token_matches(&key, &PrincipalId::from("u1"), "not base64!"));
        assert!(!issuer.refresh_token_matches(&key, &PrincipalId::from("u1"), ""));
    }

    #[test]
    fn refresh_token_depends_on_signing_secret() {
        let a = issuer();
        let b = TokenIssuer::new(AuthConfig::new("another-signing-secret-long-enough-xyz")).unwrap();
        let key = RefreshKey::generate(64);
        let id = PrincipalId::from("u1");
        assert_ne!(a.derive_refresh_token(&key, &id).unwrap(), b.derive_refresh_token(&key, &id).unwrap());
    }

    #[test]
    fn expired_token_is_rejected() {
        let issuer = issuer();
        let now = Utc::now().timestamp();
        let token = issuer
            .sign(&AccessClaims {
                claims: claims("u1"),
                iat: now - 7200,
                exp: now - 3600,
            })
            .unwrap();

        assert!(matches!(issuer.verify(&token), Err(AuthError::InvalidOrExpiredToken)));
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let other = TokenIssuer::new(AuthConfig::new("another-signing-secret-long-enough-xyz")).unwrap();
        let pair = other.issue(claims("u1")).unwrap();
        assert!(matches!(issuer().verify(&pair.access_token), Err(AuthError::InvalidOrExpiredToken)));
        assert!(matches!(issuer().verify("garbage.token.here"), Err(AuthError::InvalidOrExpiredToken)));
    }

    #[test]
    fn invalid_config_is_refused() {
        assert!(TokenIssuer::new(AuthConfig::default()).is_err());
    }
}
