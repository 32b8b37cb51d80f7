use std::sync::Arc;

use crate::{AuthError, AuthResult, ClaimSet, PrincipalStore, TokenIssuer, TokenPair, VerifiedClaims};

/// Renews a still-live session.
///
/// Refresh is only possible while the paired access token is itself valid:
/// the caller must hand in [`VerifiedClaims`], which only exist after a
/// successful signature and expiry check.
pub struct RefreshValidator {
    issuer: Arc<TokenIssuer>,
    store: Arc<dyn PrincipalStore>,
}

impl RefreshValidator {
    pub fn new(issuer: Arc<TokenIssuer>, store: Arc<dyn PrincipalStore>) -> Self {
        Self { issuer, store }
    }

    /// Check `presented` against the derivation from `access`, then mint a new
    /// pair carrying the principal's *current* email and permission flags.
    pub async fn refresh(&self, access: &VerifiedClaims, presented: &str) -> AuthResult<TokenPair> {
        let user_id = access.user_id();

        let Some(refresh_key) = access.claims().refresh_key.as_ref() else {
            tracing::warn!(user_id = %user_id, "access token carries no refresh secret");
            return Err(AuthError::InvalidRefreshToken);
        };

        if !self.issuer.refresh_token_matches(refresh_key, user_id, presented) {
            tracing::warn!(user_id = %user_id, "refresh token mismatch");
            return Err(AuthError::InvalidRefreshToken);
        }

        let Some(principal) = self.store.find_by_id(user_id).await? else {
            tracing::warn!(user_id = %user_id, "refresh for a principal that no longer exists");
            return Err(AuthError::InvalidRefreshToken);
        };

        let pair = self.issuer.issue(ClaimSet::for_principal(&principal))?;
        tracing::debug!(user_id = %user_id, "session refreshed");
        Ok(pair)
    }
}
