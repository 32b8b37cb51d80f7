//! Gate chains per protected operation.
//!
//! Chains are built once at startup and evaluated per request against a
//! [`GateContext`] assembled from the headers, path and body.

use std::sync::Arc;

use keystone_auth::{
    Authenticate, AuthResult, GateChain, GateContext, ImmutablePermissionFlags, PermissionFlags, RequireFlags,
    SelfOrAdmin, TokenIssuer, VerifiedClaims,
};

#[derive(Debug, Clone)]
pub struct Policies {
    /// `GET /users`
    pub list_users: GateChain,
    /// `GET|PUT|DELETE /users/:userId`
    pub owner: GateChain,
    /// `PATCH /users/:userId`
    pub patch_user: GateChain,
    /// `PUT /users/:userId/permissionFlags/:flags`
    pub set_permission_flags: GateChain,
    /// `POST /auth/refresh-token`
    pub refresh: GateChain,
    /// Final check on generic updates.
    pub immutable_flags: GateChain,
}

impl Policies {
    pub fn new(issuer: Arc<TokenIssuer>) -> Self {
        let authenticated = || GateChain::new().then(Authenticate::new(issuer.clone()));

        Self {
            list_users: authenticated().then(RequireFlags(PermissionFlags::ADMIN)),
            owner: authenticated().then(SelfOrAdmin),
            patch_user: authenticated()
                .then(SelfOrAdmin)
                .then(RequireFlags(PermissionFlags::PAID)),
            set_permission_flags: authenticated()
                .then(SelfOrAdmin)
                .then(RequireFlags(PermissionFlags::FREE)),
            refresh: authenticated(),
            immutable_flags: GateChain::new().then(ImmutablePermissionFlags),
        }
    }
}

/// Run `chain` and hand back the caller's verified claims, if a gate
/// established them.
pub fn authorize(chain: &GateChain, mut ctx: GateContext<'_>) -> AuthResult<Option<VerifiedClaims>> {
    chain.evaluate(&mut ctx)?;
    Ok(ctx.into_claims())
}

#[cfg(test)]
mod tests {
    use keystone_auth::{AuthConfig, AuthError, ClaimSet, PrincipalId};

    use super::*;

    const SECRET: &str = "authz-test-secret-with-enough-bytes";

    fn bearer(issuer: &TokenIssuer, id: &str, flags: PermissionFlags) -> String {
        let pair = issuer
            .issue(ClaimSet {
                user_id: PrincipalId::from(id),
                email: format!("{id}@example.com"),
                permission_flags: flags,
                refresh_key: None,
            })
            .unwrap();
        format!("Bearer {}", pair.access_token)
    }

    #[test]
    fn patch_requires_ownership_before_capability() {
        let issuer = Arc::new(TokenIssuer::new(AuthConfig::new(SECRET)).unwrap());
        let policies = Policies::new(issuer.clone());

        let free = bearer(&issuer, "u1", PermissionFlags::FREE);
        let ctx = GateContext::new(Some(&free)).with_target("u2");
        let err = authorize(&policies.patch_user, ctx).unwrap_err();
        assert!(matches!(err, AuthError::PermissionDenied { gate: "ownership" }));

        let ctx = GateContext::new(Some(&free)).with_target("u1");
        let err = authorize(&policies.patch_user, ctx).unwrap_err();
        assert!(matches!(err, AuthError::PermissionDenied { gate: "capability" }));

        let paid = bearer(&issuer, "u1", PermissionFlags::PAID);
        let ctx = GateContext::new(Some(&paid)).with_target("u1");
        let claims = authorize(&policies.patch_user, ctx).unwrap().unwrap();
        assert_eq!(claims.user_id().as_str(), "u1");
    }

    #[test]
    fn listing_is_admin_only() {
        let issuer = Arc::new(TokenIssuer::new(AuthConfig::new(SECRET)).unwrap());
        let policies = Policies::new(issuer.clone());

        let admin = bearer(&issuer, "root", PermissionFlags::FREE | PermissionFlags::ADMIN);
        assert!(authorize(&policies.list_users, GateContext::new(Some(&admin))).is_ok());
        assert!(authorize(&policies.list_users, GateContext::new(None)).is_err());
    }
}
