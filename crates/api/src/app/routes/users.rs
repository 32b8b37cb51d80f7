use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Extension, Path, Query,
    },
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{Value, json};

use keystone_auth::{AuthError, GateChain, GateContext, PermissionFlags, Principal, PrincipalId, StoreError, VerifiedClaims};
use keystone_infra::{NewUser, UserPatch, UserUpdate};

use crate::app::routes::auth::json_rejection;
use crate::app::services::AppServices;
use crate::app::dto::{self, CreateUserRequest, FieldError, PatchUserRequest, ReplaceUserRequest};
use crate::app::errors;
use crate::authz::authorize;
use crate::middleware::authorization_header;

const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
    pub page: Option<usize>,
}

/// `POST /users`: open registration.
pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<Value>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return json_rejection(rejection),
    };
    let req = match dto::parse::<CreateUserRequest>(&body) {
        Ok(r) => r,
        Err(e) => return field_errors(e),
    };

    match services.users.find_by_email(&req.email, false).await {
        Ok(None) => {}
        Ok(Some(_)) => return errors::error(StatusCode::BAD_REQUEST, "User email already exists"),
        Err(e) => return errors::store_error_to_response(e),
    }

    let password_hash = match services.hash_password(req.password).await {
        Ok(h) => h,
        Err(e) => return errors::auth_error_to_response(e),
    };

    let new_user = NewUser {
        email: req.email,
        password_hash,
        first_name: req.first_name,
        last_name: req.last_name,
    };
    match services.users.create(new_user).await {
        Ok(id) => {
            tracing::info!(user_id = %id, "user registered");
            (StatusCode::CREATED, Json(json!({ "id": id }))).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}

/// `GET /users`: administrators only.
pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    query: Result<Query<ListParams>, QueryRejection>,
) -> axum::response::Response {
    if let Err(e) = gate(&services.policies.list_users, &headers, None) {
        return errors::auth_error_to_response(e);
    }
    // Only read once the caller has passed the gates.
    let Query(params) = match query {
        Ok(q) => q,
        Err(rejection) => {
            tracing::debug!(reason = %rejection.body_text(), "unreadable query string");
            return field_errors(vec![FieldError::invalid("query")]);
        }
    };

    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    match services.users.list(limit, params.page.unwrap_or(0)).await {
        Ok(users) => {
            let items = users.iter().map(dto::user_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(Value::Array(items))).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn get_user(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> axum::response::Response {
    let target = match load_target(&services, &user_id).await {
        Ok(t) => t,
        Err(res) => return res,
    };
    if let Err(e) = gate(&services.policies.owner, &headers, Some(&user_id)) {
        return errors::auth_error_to_response(e);
    }

    (StatusCode::OK, Json(dto::user_to_json(&target))).into_response()
}

/// `PUT /users/:userId`: full profile replacement. The email must already
/// belong to the target and the permission flags must stay as stored.
pub async fn replace_user(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> axum::response::Response {
    let target = match load_target(&services, &user_id).await {
        Ok(t) => t,
        Err(res) => return res,
    };
    if let Err(e) = gate(&services.policies.owner, &headers, Some(&user_id)) {
        return errors::auth_error_to_response(e);
    }

    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return json_rejection(rejection),
    };
    let req = match dto::parse::<ReplaceUserRequest>(&body) {
        Ok(r) => r,
        Err(e) => return field_errors(e),
    };
    if let Err(res) = email_belongs_to(&services, &req.email, &target.id).await {
        return res;
    }
    if let Err(e) = check_flags_unchanged(&services, &body, &target) {
        return errors::auth_error_to_response(e);
    }

    let password_hash = match services.hash_password(req.password).await {
        Ok(h) => h,
        Err(e) => return errors::auth_error_to_response(e),
    };
    let update = UserUpdate {
        email: req.email,
        password_hash,
        // `required` fields are present once validation passes.
        first_name: req.first_name.unwrap_or_default(),
        last_name: req.last_name.unwrap_or_default(),
    };
    match services.users.replace(&target.id, update).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// `PATCH /users/:userId`: partial update, paid accounts only.
pub async fn patch_user(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> axum::response::Response {
    let target = match load_target(&services, &user_id).await {
        Ok(t) => t,
        Err(res) => return res,
    };
    if let Err(e) = gate(&services.policies.patch_user, &headers, Some(&user_id)) {
        return errors::auth_error_to_response(e);
    }

    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return json_rejection(rejection),
    };
    let req = match dto::parse::<PatchUserRequest>(&body) {
        Ok(r) => r,
        Err(e) => return field_errors(e),
    };
    if let Some(email) = &req.email {
        if let Err(res) = email_belongs_to(&services, email, &target.id).await {
            return res;
        }
    }
    if let Err(e) = check_flags_unchanged(&services, &body, &target) {
        return errors::auth_error_to_response(e);
    }

    let password_hash = match req.password {
        Some(password) => match services.hash_password(password).await {
            Ok(h) => Some(h),
            Err(e) => return errors::auth_error_to_response(e),
        },
        None => None,
    };
    let patch = UserPatch {
        email: req.email,
        password_hash,
        first_name: req.first_name,
        last_name: req.last_name,
    };
    if patch.is_empty() {
        return StatusCode::NO_CONTENT.into_response();
    }
    match services.users.patch(&target.id, patch).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn delete_user(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> axum::response::Response {
    let target = match load_target(&services, &user_id).await {
        Ok(t) => t,
        Err(res) => return res,
    };
    if let Err(e) = gate(&services.policies.owner, &headers, Some(&user_id)) {
        return errors::auth_error_to_response(e);
    }

    match services.users.delete(&target.id).await {
        Ok(()) => {
            tracing::info!(user_id = %target.id, "user deleted");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}

/// `PUT /users/:userId/permissionFlags/:flags`: the only path that changes
/// a permission bitmask.
pub async fn set_permission_flags(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Path((user_id, flags)): Path<(String, String)>,
) -> axum::response::Response {
    let caller = match gate(&services.policies.set_permission_flags, &headers, Some(&user_id)) {
        Ok(c) => c,
        Err(e) => return errors::auth_error_to_response(e),
    };
    let flags = match flags.parse::<PermissionFlags>() {
        Ok(f) => f,
        Err(e) => {
            tracing::debug!(error = %e, "rejected permission flags");
            return field_errors(vec![FieldError::invalid("permissionFlags")]);
        }
    };
    let Ok(id) = user_id.parse::<PrincipalId>() else {
        return not_found(&user_id);
    };
    match services.users.update_permission_flags(&id, flags).await {
        Ok(()) => {
            tracing::info!(
                user_id = %id,
                caller = %caller.as_ref().map(|c| c.user_id().as_str()).unwrap_or_default(),
                %flags,
                "permission flags changed"
            );
            StatusCode::NO_CONTENT.into_response()
        }
        Err(StoreError::NotFound) => not_found(&user_id),
        Err(e) => errors::store_error_to_response(e),
    }
}

fn gate(chain: &GateChain, headers: &HeaderMap, target: Option<&str>) -> Result<Option<VerifiedClaims>, AuthError> {
    let mut ctx = GateContext::new(authorization_header(headers)?);
    if let Some(target) = target {
        ctx = ctx.with_target(target);
    }
    authorize(chain, ctx)
}

fn check_flags_unchanged(services: &AppServices, body: &Value, target: &Principal) -> Result<(), AuthError> {
    let ctx = GateContext::new(None)
        .with_body(body)
        .with_stored_flags(target.permission_flags);
    authorize(&services.policies.immutable_flags, ctx).map(|_| ())
}

async fn load_target(services: &AppServices, user_id: &str) -> Result<Principal, axum::response::Response> {
    let Ok(id) = user_id.parse::<PrincipalId>() else {
        return Err(not_found(user_id));
    };
    match services.users.find_by_id(&id).await {
        Ok(Some(p)) => Ok(p),
        Ok(None) => Err(not_found(user_id)),
        Err(e) => Err(errors::store_error_to_response(e)),
    }
}

/// Generic updates may not move an email address between accounts.
async fn email_belongs_to(
    services: &AppServices,
    email: &str,
    target: &PrincipalId,
) -> Result<(), axum::response::Response> {
    match services.users.find_by_email(email, false).await {
        Ok(Some(owner)) if &owner.id == target => Ok(()),
        Ok(_) => Err(errors::error(StatusCode::BAD_REQUEST, "Invalid email")),
        Err(e) => Err(errors::store_error_to_response(e)),
    }
}

fn not_found(user_id: &str) -> axum::response::Response {
    errors::error(StatusCode::NOT_FOUND, format!("User {user_id} not found"))
}

fn field_errors(e: dto::FieldErrors) -> axum::response::Response {
    errors::errors(StatusCode::BAD_REQUEST, json!(e))
}
