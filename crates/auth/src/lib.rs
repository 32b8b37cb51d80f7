//! `keystone-auth`: the authentication and authorization core.
//!
//! Transport and storage agnostic. Principals are reached through
//! [`PrincipalStore`]; the HTTP layer builds a [`guard::GateContext`] per
//! request and maps [`AuthError`] to wire responses.

pub mod claims;
pub mod config;
pub mod credentials;
pub mod error;
pub mod guard;
pub mod password;
pub mod permissions;
pub mod principal;
pub mod refresh;
pub mod store;
pub mod token;

pub use claims::{AccessClaims, ClaimSet, RefreshKey, VerifiedClaims};
pub use config::{AuthConfig, SigningSecret};
pub use credentials::CredentialVerifier;
pub use error::{AuthError, AuthResult};
pub use guard::{
    requested_flags, Authenticate, Gate, GateChain, GateContext, ImmutablePermissionFlags, RequireFlags, SelfOrAdmin,
    PERMISSION_FLAGS_FIELD,
};
pub use password::{Argon2PasswordHasher, HashingConfig, PasswordError, PasswordHasher};
pub use permissions::{has_any, is_self_or_admin, PermissionFlags};
pub use principal::{HashedPassword, Principal};
pub use refresh::RefreshValidator;
pub use store::{PrincipalStore, StoreError};
pub use token::{TokenIssuer, TokenPair};

pub use keystone_core::PrincipalId;
