//! Postgres-backed user store.
//!
//! Uses runtime-checked `sqlx` queries so the crate builds without a live
//! database. Call [`PostgresUserStore::migrate`] once at startup.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use keystone_auth::{HashedPassword, PermissionFlags, Principal, PrincipalStore, StoreError};
use keystone_core::PrincipalId;

use super::{NewUser, UserPatch, UserStore, UserUpdate};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id               TEXT PRIMARY KEY,
    email            TEXT NOT NULL UNIQUE,
    password_hash    TEXT NOT NULL,
    first_name       TEXT,
    last_name        TEXT,
    permission_flags BIGINT NOT NULL,
    created_at       TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

const PUBLIC_COLUMNS: &str = "id, email, first_name, last_name, permission_flags";

#[derive(Clone)]
pub struct PostgresUserStore {
    pool: Arc<PgPool>,
}

impl PostgresUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Open a pool against `url`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(map_err)?;
        Ok(Self::new(pool))
    }

    /// Create the `users` table if it does not exist yet.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(SCHEMA).execute(&*self.pool).await.map_err(map_err)?;
        tracing::info!("users schema ready");
        Ok(())
    }
}

impl core::fmt::Debug for PostgresUserStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PostgresUserStore").finish_non_exhaustive()
    }
}

fn map_err(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict("email already registered".to_string())
        }
        _ => {
            tracing::error!(error = %e, "postgres user store failure");
            StoreError::unavailable(e.to_string())
        }
    }
}

fn flags_from_column(raw: i64) -> Result<PermissionFlags, StoreError> {
    u32::try_from(raw)
        .map(PermissionFlags::from_bits)
        .map_err(|_| StoreError::unavailable(format!("stored permission flags out of range: {raw}")))
}

fn principal_from_row(row: &PgRow, with_hash: bool) -> Result<Principal, StoreError> {
    let id: String = row.try_get("id").map_err(map_err)?;
    let password_hash = if with_hash {
        let raw: String = row.try_get("password_hash").map_err(map_err)?;
        Some(HashedPassword::new(raw))
    } else {
        None
    };
    Ok(Principal {
        id: PrincipalId::from(id),
        email: row.try_get("email").map_err(map_err)?,
        password_hash,
        first_name: row.try_get("first_name").map_err(map_err)?,
        last_name: row.try_get("last_name").map_err(map_err)?,
        permission_flags: flags_from_column(row.try_get("permission_flags").map_err(map_err)?)?,
    })
}

fn affected_one(rows: u64) -> Result<(), StoreError> {
    if rows == 0 { Err(StoreError::NotFound) } else { Ok(()) }
}

#[async_trait]
impl PrincipalStore for PostgresUserStore {
    async fn find_by_email(
        &self,
        email: &str,
        include_password_hash: bool,
    ) -> Result<Option<Principal>, StoreError> {
        let sql = if include_password_hash {
            format!("SELECT {PUBLIC_COLUMNS}, password_hash FROM users WHERE email = $1")
        } else {
            format!("SELECT {PUBLIC_COLUMNS} FROM users WHERE email = $1")
        };
        let row = sqlx::query(&sql)
            .bind(email)
            .fetch_optional(&*self.pool)
            .await
            .map_err(map_err)?;
        row.map(|r| principal_from_row(&r, include_password_hash)).transpose()
    }

    async fn find_by_id(&self, id: &PrincipalId) -> Result<Option<Principal>, StoreError> {
        let sql = format!("SELECT {PUBLIC_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(map_err)?;
        row.map(|r| principal_from_row(&r, false)).transpose()
    }

    async fn update_permission_flags(
        &self,
        id: &PrincipalId,
        flags: PermissionFlags,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET permission_flags = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(i64::from(flags.bits()))
            .execute(&*self.pool)
            .await
            .map_err(map_err)?;
        affected_one(result.rows_affected())
    }
}

#[async_trait]
impl UserStore for PostgresUserStore {
    async fn create(&self, user: NewUser) -> Result<PrincipalId, StoreError> {
        let id = PrincipalId::generate();
        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, first_name, last_name, permission_flags)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id.as_str())
        .bind(&user.email)
        .bind(user.password_hash.as_str())
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(i64::from(PermissionFlags::DEFAULT.bits()))
        .execute(&*self.pool)
        .await
        .map_err(map_err)?;
        Ok(id)
    }

    async fn list(&self, limit: usize, page: usize) -> Result<Vec<Principal>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let offset = limit.saturating_mul(i64::try_from(page).unwrap_or(i64::MAX));
        let sql = format!("SELECT {PUBLIC_COLUMNS} FROM users ORDER BY created_at, id LIMIT $1 OFFSET $2");
        let rows = sqlx::query(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&*self.pool)
            .await
            .map_err(map_err)?;
        rows.iter().map(|r| principal_from_row(r, false)).collect()
    }

    async fn replace(&self, id: &PrincipalId, update: UserUpdate) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET email = $2, password_hash = $3, first_name = $4, last_name = $5
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .bind(&update.email)
        .bind(update.password_hash.as_str())
        .bind(&update.first_name)
        .bind(&update.last_name)
        .execute(&*self.pool)
        .await
        .map_err(map_err)?;
        affected_one(result.rows_affected())
    }

    async fn patch(&self, id: &PrincipalId, patch: UserPatch) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET email         = COALESCE($2, email),
                password_hash = COALESCE($3, password_hash),
                first_name    = COALESCE($4, first_name),
                last_name     = COALESCE($5, last_name)
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .bind(patch.email.as_deref())
        .bind(patch.password_hash.as_ref().map(HashedPassword::as_str))
        .bind(patch.first_name.as_deref())
        .bind(patch.last_name.as_deref())
        .execute(&*self.pool)
        .await
        .map_err(map_err)?;
        affected_one(result.rows_affected())
    }

    async fn delete(&self, id: &PrincipalId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.as_str())
            .execute(&*self.pool)
            .await
            .map_err(map_err)?;
        affected_one(result.rows_affected())
    }
}
