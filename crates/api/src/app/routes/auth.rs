use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::Value;

use keystone_auth::{AuthError, GateContext};

use crate::app::dto::{self, FieldError, LoginRequest};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::authz::authorize;
use crate::middleware::authorization_header;

/// `POST /auth`: exchange credentials for a token pair.
pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<Value>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return json_rejection(rejection),
    };
    let req = match dto::parse::<LoginRequest>(&body) {
        Ok(r) => r,
        Err(field_errors) => return errors::errors(StatusCode::BAD_REQUEST, serde_json::json!(field_errors)),
    };

    let email = req.email.as_deref().unwrap_or_default();
    let password = req.password.as_deref().unwrap_or_default();
    let claims = match services.credentials.verify(email, password).await {
        Ok(c) => c,
        Err(e) => return errors::auth_error_to_response(e),
    };
    let user_id = claims.user_id.clone();

    match services.issuer.issue(claims) {
        Ok(pair) => {
            tracing::info!(%user_id, "session issued");
            (StatusCode::CREATED, Json(pair)).into_response()
        }
        Err(e) => errors::auth_error_to_response(e),
    }
}

/// `POST /auth/refresh-token`: rotate a session using the paired refresh token.
pub async fn refresh(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> axum::response::Response {
    let claims = match authorization_header(&headers)
        .and_then(|h| authorize(&services.policies.refresh, GateContext::new(h)))
        .and_then(|c| c.ok_or(AuthError::Unauthenticated))
    {
        Ok(c) => c,
        Err(e) => return errors::auth_error_to_response(e),
    };

    // An unreadable body is treated like one without the field.
    let body = body.map(|Json(v)| v).unwrap_or(Value::Null);
    let Some(presented) = dto::refresh_token(&body) else {
        return errors::auth_error_to_response(AuthError::MissingField("refreshToken"));
    };

    match services.refresher.refresh(&claims, presented).await {
        Ok(pair) => {
            tracing::info!(user_id = %claims.user_id(), "session refreshed");
            (StatusCode::CREATED, Json(pair)).into_response()
        }
        Err(e) => errors::auth_error_to_response(e),
    }
}

pub(crate) fn json_rejection(rejection: JsonRejection) -> axum::response::Response {
    tracing::debug!(reason = %rejection.body_text(), "unreadable request body");
    errors::errors(
        StatusCode::BAD_REQUEST,
        serde_json::json!([FieldError::new("body", "Expected a JSON object")]),
    )
}
