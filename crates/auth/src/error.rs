use thiserror::Error;

use crate::store::StoreError;

/// Authentication/authorization failure taxonomy.
///
/// Every variant is terminal for the current request. The route layer maps
/// each kind to a fixed wire status and body; `Display` output is for logs
/// only and never reaches a client.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown account or wrong password (deliberately indistinguishable).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// No bearer credential was presented.
    #[error("no credential presented")]
    Unauthenticated,

    /// A credential was presented using an unsupported or malformed scheme.
    #[error("malformed credential scheme")]
    Unauthorized,

    /// The access token failed signature or expiry verification.
    #[error("invalid or expired access token")]
    InvalidOrExpiredToken,

    /// The presented refresh token does not match the paired access token.
    #[error("invalid refresh token")]
    InvalidRefreshToken,

    /// A required request field is absent.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A capability or ownership gate denied the request.
    #[error("permission denied by {gate} gate")]
    PermissionDenied { gate: &'static str },

    /// The permission bitmask may not change through a generic update.
    #[error("permission flags cannot be changed through this operation")]
    ImmutableFieldViolation,

    /// The principal store failed (connectivity, corruption, ...).
    #[error("principal store failure: {0}")]
    Store(#[from] StoreError),

    /// Any other server-side fault (hashing backend, token encoding, config).
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Server faults, as opposed to caller mistakes.
    pub fn is_server_fault(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Internal(_))
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
