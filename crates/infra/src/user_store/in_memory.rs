use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use keystone_auth::{PermissionFlags, Principal, PrincipalStore, StoreError};
use keystone_core::PrincipalId;

use super::{NewUser, UserPatch, UserStore, UserUpdate, new_principal};

/// In-memory user store for tests/dev. Records are kept in registration order.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    inner: RwLock<Vec<Principal>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<Principal>>, StoreError> {
        self.inner.read().map_err(|_| StoreError::unavailable("user list lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<Principal>>, StoreError> {
        self.inner.write().map_err(|_| StoreError::unavailable("user list lock poisoned"))
    }
}

fn get_mut<'a>(users: &'a mut [Principal], id: &PrincipalId) -> Result<&'a mut Principal, StoreError> {
    users.iter_mut().find(|p| &p.id == id).ok_or(StoreError::NotFound)
}

fn email_taken(users: &[Principal], email: &str, except: Option<&PrincipalId>) -> bool {
    users.iter().any(|p| p.email == email && Some(&p.id) != except)
}

#[async_trait]
impl PrincipalStore for InMemoryUserStore {
    async fn find_by_email(
        &self,
        email: &str,
        include_password_hash: bool,
    ) -> Result<Option<Principal>, StoreError> {
        let users = self.read()?;
        Ok(users.iter().find(|p| p.email == email).map(|p| {
            if include_password_hash {
                p.clone()
            } else {
                p.without_password_hash()
            }
        }))
    }

    async fn find_by_id(&self, id: &PrincipalId) -> Result<Option<Principal>, StoreError> {
        Ok(self.read()?.iter().find(|p| &p.id == id).map(Principal::without_password_hash))
    }

    async fn update_permission_flags(
        &self,
        id: &PrincipalId,
        flags: PermissionFlags,
    ) -> Result<(), StoreError> {
        let mut users = self.write()?;
        let p = get_mut(&mut users, id)?;
        p.permission_flags = flags;
        Ok(())
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn create(&self, user: NewUser) -> Result<PrincipalId, StoreError> {
        let mut users = self.write()?;
        if email_taken(&users, &user.email, None) {
            return Err(StoreError::Conflict("email already registered".to_string()));
        }
        let principal = new_principal(user);
        let id = principal.id.clone();
        users.push(principal);
        Ok(id)
    }

    async fn list(&self, limit: usize, page: usize) -> Result<Vec<Principal>, StoreError> {
        let users = self.read()?;
        Ok(users
            .iter()
            .skip(limit.saturating_mul(page))
            .take(limit)
            .map(Principal::without_password_hash)
            .collect())
    }

    async fn replace(&self, id: &PrincipalId, update: UserUpdate) -> Result<(), StoreError> {
        let mut users = self.write()?;
        if email_taken(&users, &update.email, Some(id)) {
            return Err(StoreError::Conflict("email already registered".to_string()));
        }
        let p = get_mut(&mut users, id)?;
        p.email = update.email;
        p.password_hash = Some(update.password_hash);
        p.first_name = Some(update.first_name);
        p.last_name = Some(update.last_name);
        Ok(())
    }

    async fn patch(&self, id: &PrincipalId, patch: UserPatch) -> Result<(), StoreError> {
        let mut users = self.write()?;
        if let Some(email) = &patch.email {
            if email_taken(&users, email, Some(id)) {
                return Err(StoreError::Conflict("email already registered".to_string()));
            }
        }
        let p = get_mut(&mut users, id)?;
        if let Some(email) = patch.email {
            p.email = email;
        }
        if let Some(hash) = patch.password_hash {
            p.password_hash = Some(hash);
        }
        if let Some(first_name) = patch.first_name {
            p.first_name = Some(first_name);
        }
        if let Some(last_name) = patch.last_name {
            p.last_name = Some(last_name);
        }
        Ok(())
    }

    async fn delete(&self, id: &PrincipalId) -> Result<(), StoreError> {
        let mut users = self.write()?;
        let idx = users.iter().position(|p| &p.id == id).ok_or(StoreError::NotFound)?;
        users.remove(idx);
        Ok(())
    }
}
