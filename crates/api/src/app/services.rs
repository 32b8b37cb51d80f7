//! Service wiring shared by every handler.

use std::sync::Arc;

use keystone_auth::{
    Argon2PasswordHasher, AuthConfig, AuthError, AuthResult, CredentialVerifier, HashedPassword, PasswordHasher,
    PrincipalStore, RefreshValidator, TokenIssuer,
};
use keystone_infra::UserStore;

use crate::authz::Policies;

pub struct AppServices {
    pub users: Arc<dyn UserStore>,
    pub hasher: Arc<dyn PasswordHasher>,
    pub issuer: Arc<TokenIssuer>,
    pub credentials: CredentialVerifier,
    pub refresher: RefreshValidator,
    pub policies: Policies,
}

impl AppServices {
    /// Wire the auth core over `store`. Fails on an unusable [`AuthConfig`].
    pub fn new<S>(config: AuthConfig, store: Arc<S>) -> AuthResult<Self>
    where
        S: UserStore + 'static,
    {
        let hasher: Arc<dyn PasswordHasher> = Arc::new(
            Argon2PasswordHasher::new(&config.hashing)
                .map_err(|e| AuthError::internal(format!("invalid hashing config: {e}")))?,
        );
        let issuer = Arc::new(TokenIssuer::new(config)?);
        let principals: Arc<dyn PrincipalStore> = store.clone();
        let users: Arc<dyn UserStore> = store;

        Ok(Self {
            credentials: CredentialVerifier::new(principals.clone(), hasher.clone())?,
            refresher: RefreshValidator::new(issuer.clone(), principals),
            policies: Policies::new(issuer.clone()),
            users,
            hasher,
            issuer,
        })
    }

    /// Hash a new password off the async runtime.
    pub async fn hash_password(&self, password: String) -> AuthResult<HashedPassword> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AuthError::internal(format!("password hashing task failed: {e}")))?
            .map_err(|e| AuthError::internal(format!("password hashing failed: {e}")))
    }
}

impl core::fmt::Debug for AppServices {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppServices")
            .field("issuer", &self.issuer)
            .field("policies", &self.policies)
            .finish_non_exhaustive()
    }
}
