use std::sync::Arc;

use crate::{AuthError, AuthResult, ClaimSet, HashedPassword, PasswordHasher, PrincipalStore};

const DECOY_PASSWORD: &str = "keystone-decoy-password";

/// Checks an (email, password) pair against the principal store.
///
/// Unknown email and wrong password both end in
/// [`AuthError::InvalidCredentials`]; an unknown email still pays for one
/// hash verification so the two cases also cost the same.
pub struct CredentialVerifier {
    store: Arc<dyn PrincipalStore>,
    hasher: Arc<dyn PasswordHasher>,
    decoy_hash: HashedPassword,
}

impl CredentialVerifier {
    pub fn new(store: Arc<dyn PrincipalStore>, hasher: Arc<dyn PasswordHasher>) -> AuthResult<Self> {
        let decoy_hash = hasher
            .hash(DECOY_PASSWORD)
            .map_err(|e| AuthError::internal(format!("failed to prepare decoy hash: {e}")))?;

        Ok(Self {
            store,
            hasher,
            decoy_hash,
        })
    }

    /// On success returns the principal's claims without a refresh secret.
    pub async fn verify(&self, email: &str, password: &str) -> AuthResult<ClaimSet> {
        let principal = self.store.find_by_email(email, true).await?;

        let (hash, known) = match principal.as_ref().and_then(|p| p.password_hash.clone()) {
            Some(hash) => (hash, true),
            None => (self.decoy_hash.clone(), false),
        };

        let hasher = self.hasher.clone();
        let password = password.to_owned();
        let matched = tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(|e| AuthError::internal(format!("password verification task failed: {e}")))?
            .map_err(|e| AuthError::internal(format!("password verification failed: {e}")))?;

        match principal {
            Some(principal) if known && matched => {
                tracing::debug!(user_id = %principal.id, "credentials verified");
                Ok(ClaimSet::for_principal(&principal))
            }
            _ => {
                tracing::debug!(email, "credential verification failed");
                Err(AuthError::InvalidCredentials)
            }
        }
    }
}
