//! Principal store collaborator contract.
//!
//! The core never owns user records. It reads them through this narrow
//! interface and hands new bitmask values back for the store to persist.

use async_trait::async_trait;
use thiserror::Error;

use keystone_core::PrincipalId;

use crate::{PermissionFlags, Principal};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The addressed record does not exist.
    #[error("record not found")]
    NotFound,

    /// A uniqueness constraint was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The backing store could not be reached or answered with a fault.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}

/// Read (and bitmask-write) access to principals.
///
/// Absence is `Ok(None)`; `Err` is always a store fault and must never be
/// treated as "no such principal".
#[async_trait]
pub trait PrincipalStore: Send + Sync {
    /// Look up by email. The password hash is populated only when
    /// `include_password_hash` is set.
    async fn find_by_email(
        &self,
        email: &str,
        include_password_hash: bool,
    ) -> Result<Option<Principal>, StoreError>;

    /// Look up by id. Never populates the password hash.
    async fn find_by_id(&self, id: &PrincipalId) -> Result<Option<Principal>, StoreError>;

    /// Persist a new bitmask. `Err(StoreError::NotFound)` for unknown ids.
    async fn update_permission_flags(
        &self,
        id: &PrincipalId,
        flags: PermissionFlags,
    ) -> Result<(), StoreError>;
}
