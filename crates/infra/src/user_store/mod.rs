//! User record storage.
//!
//! The auth core reads principals through [`PrincipalStore`]; the route layer
//! additionally needs the CRUD surface in [`UserStore`].

use async_trait::async_trait;

use keystone_auth::{HashedPassword, PermissionFlags, Principal, PrincipalStore, StoreError};
use keystone_core::PrincipalId;

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryUserStore;
pub use postgres::PostgresUserStore;

/// Fields of a registration. New users always start with
/// [`PermissionFlags::DEFAULT`].
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: HashedPassword,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Full replacement of the mutable profile. Permission flags are not part
/// of it; they change only through [`PrincipalStore::update_permission_flags`].
#[derive(Debug, Clone)]
pub struct UserUpdate {
    pub email: String,
    pub password_hash: HashedPassword,
    pub first_name: String,
    pub last_name: String,
}

/// Partial update; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub email: Option<String>,
    pub password_hash: Option<HashedPassword>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.password_hash.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
    }
}

#[async_trait]
pub trait UserStore: PrincipalStore {
    /// Insert a user and return its freshly assigned id.
    /// A taken email is `StoreError::Conflict`.
    async fn create(&self, user: NewUser) -> Result<PrincipalId, StoreError>;

    /// One page of users in a stable order, hashes omitted.
    async fn list(&self, limit: usize, page: usize) -> Result<Vec<Principal>, StoreError>;

    async fn replace(&self, id: &PrincipalId, update: UserUpdate) -> Result<(), StoreError>;

    async fn patch(&self, id: &PrincipalId, patch: UserPatch) -> Result<(), StoreError>;

    async fn delete(&self, id: &PrincipalId) -> Result<(), StoreError>;
}

fn new_principal(user: NewUser) -> Principal {
    Principal {
        id: PrincipalId::generate(),
        email: user.email,
        password_hash: Some(user.password_hash),
        first_name: user.first_name,
        last_name: user.last_name,
        permission_flags: PermissionFlags::DEFAULT,
    }
}
