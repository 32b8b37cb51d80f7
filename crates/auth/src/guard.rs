//! Request gating.
//!
//! A protected operation declares an ordered [`GateChain`]. Gates run
//! left-to-right and the first failure decides the outcome; later gates never
//! execute. Gates see only the [`GateContext`] built by the route layer.

use std::sync::Arc;

use serde_json::Value;

use crate::permissions::{has_any, is_self_or_admin};
use crate::{AuthError, AuthResult, PermissionFlags, TokenIssuer, VerifiedClaims};

/// Body field that only the dedicated permission operation may change.
pub const PERMISSION_FLAGS_FIELD: &str = "permissionFlags";

/// Everything a gate may look at for one request.
#[derive(Debug, Default)]
pub struct GateContext<'a> {
    /// Raw `Authorization` header value, if any.
    pub authorization: Option<&'a str>,
    /// Target principal id from the request path.
    pub target_id: Option<&'a str>,
    /// Parsed request body.
    pub body: Option<&'a Value>,
    /// The target's currently stored permission flags.
    pub stored_flags: Option<PermissionFlags>,
    claims: Option<VerifiedClaims>,
}

impl<'a> GateContext<'a> {
    pub fn new(authorization: Option<&'a str>) -> Self {
        Self {
            authorization,
            ..Default::default()
        }
    }

    pub fn with_target(mut self, target_id: &'a str) -> Self {
        self.target_id = Some(target_id);
        self
    }

    pub fn with_body(mut self, body: &'a Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_stored_flags(mut self, flags: PermissionFlags) -> Self {
        self.stored_flags = Some(flags);
        self
    }

    /// Claims established by an earlier [`Authenticate`] gate.
    pub fn claims(&self) -> Option<&VerifiedClaims> {
        self.claims.as_ref()
    }

    pub fn into_claims(self) -> Option<VerifiedClaims> {
        self.claims
    }

    fn require_claims(&self) -> AuthResult<&VerifiedClaims> {
        self.claims.as_ref().ok_or(AuthError::Unauthenticated)
    }
}

/// One request-gating check.
pub trait Gate: Send + Sync {
    fn name(&self) -> &'static str;

    fn check(&self, ctx: &mut GateContext<'_>) -> AuthResult<()>;
}

/// Ordered, short-circuiting list of gates.
#[derive(Clone, Default)]
pub struct GateChain {
    gates: Vec<Arc<dyn Gate>>,
}

impl GateChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, gate: impl Gate + 'static) -> Self {
        self.gates.push(Arc::new(gate));
        self
    }

    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }

    pub fn evaluate(&self, ctx: &mut GateContext<'_>) -> AuthResult<()> {
        for gate in &self.gates {
            if let Err(e) = gate.check(ctx) {
                tracing::debug!(gate = gate.name(), reason = %e, "request rejected");
                return Err(e);
            }
        }
        Ok(())
    }
}

impl core::fmt::Debug for GateChain {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.gates.iter().map(|g| g.name())).finish()
    }
}

/// Requires a well-formed, valid bearer token and records its claims.
pub struct Authenticate {
    issuer: Arc<TokenIssuer>,
}

impl Authenticate {
    pub fn new(issuer: Arc<TokenIssuer>) -> Self {
        Self { issuer }
    }
}

impl Gate for Authenticate {
    fn name(&self) -> &'static str {
        "authenticate"
    }

    fn check(&self, ctx: &mut GateContext<'_>) -> AuthResult<()> {
        let header = ctx.authorization.ok_or(AuthError::Unauthenticated)?;
        let token = bearer_token(header)?;
        ctx.claims = Some(self.issuer.verify(token)?);
        Ok(())
    }
}

/// Split `Bearer <token>`; anything else is a malformed scheme.
pub fn bearer_token(header: &str) -> AuthResult<&str> {
    let (scheme, token) = header.split_once(' ').ok_or(AuthError::Unauthorized)?;
    if scheme != "Bearer" {
        return Err(AuthError::Unauthorized);
    }
    let token = token.trim();
    if token.is_empty() || token.contains(' ') {
        return Err(AuthError::Unauthorized);
    }
    Ok(token)
}

/// Caller must hold at least one of the required capability bits.
pub struct RequireFlags(pub PermissionFlags);

impl Gate for RequireFlags {
    fn name(&self) -> &'static str {
        "capability"
    }

    fn check(&self, ctx: &mut GateContext<'_>) -> AuthResult<()> {
        let claims = ctx.require_claims()?;
        if has_any(claims.permission_flags(), self.0) {
            Ok(())
        } else {
            Err(AuthError::PermissionDenied { gate: self.name() })
        }
    }
}

/// Caller must be the path's target principal, or an administrator.
pub struct SelfOrAdmin;

impl Gate for SelfOrAdmin {
    fn name(&self) -> &'static str {
        "ownership"
    }

    fn check(&self, ctx: &mut GateContext<'_>) -> AuthResult<()> {
        let claims = ctx.require_claims()?;
        let target = ctx.target_id.unwrap_or_default();
        if is_self_or_admin(
            claims.user_id().as_str(),
            target,
            claims.permission_flags(),
            PermissionFlags::ADMIN,
        ) {
            Ok(())
        } else {
            Err(AuthError::PermissionDenied { gate: self.name() })
        }
    }
}

/// Reads a requested mask sent either as a JSON integer or as a decimal
/// string. Anything else is not an integer.
pub fn requested_flags(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Rejects generic updates whose body would change the permission flags.
///
/// Applies to every caller, administrators included.
pub struct ImmutablePermissionFlags;

impl Gate for ImmutablePermissionFlags {
    fn name(&self) -> &'static str {
        "immutable-field"
    }

    fn check(&self, ctx: &mut GateContext<'_>) -> AuthResult<()> {
        let Some(requested) = ctx.body.and_then(|b| b.get(PERMISSION_FLAGS_FIELD)) else {
            return Ok(());
        };
        let unchanged = match (requested_flags(requested), ctx.stored_flags) {
            (Some(requested), Some(stored)) => requested == i64::from(stored.bits()),
            _ => false,
        };
        if unchanged {
            Ok(())
        } else {
            Err(AuthError::ImmutableFieldViolation)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use keystone_core::PrincipalId;
    use serde_json::json;

    use super::*;
    use crate::token::TEST_SECRET;
    use crate::{AuthConfig, ClaimSet};

    fn issuer() -> Arc<TokenIssuer> {
        Arc::new(TokenIssuer::new(AuthConfig::new(TEST_SECRET)).unwrap())
    }

    fn token(issuer: &TokenIssuer, id: &str, flags: PermissionFlags) -> String {
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

    struct Counting(Arc<AtomicUsize>);

    impl Gate for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn check(&self, _ctx: &mut GateContext<'_>) -> AuthResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn authentication_failure_classes_are_distinct() {
        let chain = GateChain::new().then(Authenticate::new(issuer()));

        let err = chain.evaluate(&mut GateContext::new(None)).unwrap_err();
        assert!(matches!(err, AuthError::Unauthenticated));

        let err = chain.evaluate(&mut GateContext::new(Some("Basic dXNlcjpwdw=="))).unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized));

        let err = chain.evaluate(&mut GateContext::new(Some("Bearer"))).unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized));

        let err = chain.evaluate(&mut GateContext::new(Some("Bearer not.a.jwt"))).unwrap_err();
        assert!(matches!(err, AuthError::InvalidOrExpiredToken));
    }

    #[test]
    fn authenticate_records_claims() {
        let issuer = issuer();
        let header = token(&issuer, "u1", PermissionFlags::FREE);
        let mut ctx = GateContext::new(Some(&header));

        GateChain::new().then(Authenticate::new(issuer)).evaluate(&mut ctx).unwrap();
        assert_eq!(ctx.claims().unwrap().user_id().as_str(), "u1");
    }

    #[test]
    fn capability_gate_uses_intersection() {
        let issuer = issuer();
        let chain = GateChain::new()
            .then(Authenticate::new(issuer.clone()))
            .then(RequireFlags(PermissionFlags::ADMIN));

        let free = token(&issuer, "u1", PermissionFlags::FREE);
        let err = chain.evaluate(&mut GateContext::new(Some(&free))).unwrap_err();
        assert!(matches!(err, AuthError::PermissionDenied { gate: "capability" }));

        let admin = token(&issuer, "u1", PermissionFlags::FREE | PermissionFlags::ADMIN);
        assert!(chain.evaluate(&mut GateContext::new(Some(&admin))).is_ok());
    }

    #[test]
    fn ownership_gate() {
        let issuer = issuer();
        let chain = GateChain::new().then(Authenticate::new(issuer.clone())).then(SelfOrAdmin);

        let own = token(&issuer, "u1", PermissionFlags::FREE);
        assert!(chain.evaluate(&mut GateContext::new(Some(&own)).with_target("u1")).is_ok());

        let err = chain
            .evaluate(&mut GateContext::new(Some(&own)).with_target("u2"))
            .unwrap_err();
        assert!(matches!(err, AuthError::PermissionDenied { gate: "ownership" }));

        let admin = token(&issuer, "u9", PermissionFlags::ADMIN);
        assert!(chain.evaluate(&mut GateContext::new(Some(&admin)).with_target("u2")).is_ok());
    }

    #[test]
    fn gates_without_claims_fail_closed() {
        let err = GateChain::new()
            .then(SelfOrAdmin)
            .evaluate(&mut GateContext::new(None).with_target("u1"))
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthenticated));
    }

    fn ctx(body: &Value) -> GateContext<'_> {
        GateContext::new(None).with_body(body).with_stored_flags(PermissionFlags::FREE)
    }

    #[test]
    fn immutable_flags_gate() {
        let chain = GateChain::new().then(ImmutablePermissionFlags);

        let same = json!({ "firstName": "Nam", "permissionFlags": 1 });
        let changed = json!({ "permissionFlags": 256 });
        let absent = json!({ "firstName": "Nam" });
        let not_a_number = json!({ "permissionFlags": "one" });

        assert!(chain.evaluate(&mut ctx(&same)).is_ok());
        assert!(chain.evaluate(&mut ctx(&absent)).is_ok());
        assert!(matches!(chain.evaluate(&mut ctx(&changed)), Err(AuthError::ImmutableFieldViolation)));
        assert!(matches!(chain.evaluate(&mut ctx(&not_a_number)), Err(AuthError::ImmutableFieldViolation)));
    }

    #[test]
    fn immutable_flags_compare_decimal_strings_numerically() {
        let chain = GateChain::new().then(ImmutablePermissionFlags);

        let same = json!({ "permissionFlags": "1" });
        let changed = json!({ "permissionFlags": "7" });

        assert!(chain.evaluate(&mut ctx(&same)).is_ok());
        assert!(matches!(chain.evaluate(&mut ctx(&changed)), Err(AuthError::ImmutableFieldViolation)));
    }

    #[test]
    fn requested_flags_accepts_integers_and_decimal_strings() {
        assert_eq!(requested_flags(&json!(4)), Some(4));
        assert_eq!(requested_flags(&json!("4")), Some(4));
        assert_eq!(requested_flags(&json!("-1")), Some(-1));
        assert_eq!(requested_flags(&json!("4.5")), None);
        assert_eq!(requested_flags(&json!(4.5)), None);
        assert_eq!(requested_flags(&json!(null)), None);
    }

    #[test]
    fn immutable_flags_gate_applies_to_admins_too() {
        let issuer = issuer();
        let chain = GateChain::new()
            .then(Authenticate::new(issuer.clone()))
            .then(SelfOrAdmin)
            .then(ImmutablePermissionFlags);

        let admin = token(&issuer, "root", PermissionFlags::ADMIN);
        let body = json!({ "permissionFlags": 7 });
        let mut ctx = GateContext::new(Some(&admin))
            .with_target("u1")
            .with_body(&body)
            .with_stored_flags(PermissionFlags::FREE);
        assert!(matches!(chain.evaluate(&mut ctx), Err(AuthError::ImmutableFieldViolation)));
    }

    #[test]
    fn first_failure_short_circuits() {
        let ran = Arc::new(AtomicUsize::new(0));
        let chain = GateChain::new()
            .then(Counting(ran.clone()))
            .then(Authenticate::new(issuer()))
            .then(Counting(ran.clone()));

        assert!(chain.evaluate(&mut GateContext::new(None)).is_err());
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(format!("{chain:?}"), r#"["counting", "authenticate", "counting"]"#);
    }
}
