use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::{Value, json};

use keystone_auth::{AuthError, StoreError};

/// Map an auth failure to its fixed wire status and body.
///
/// Bodies never carry internal detail; server faults are logged here and
/// answered with a generic 500.
pub fn auth_error_to_response(err: AuthError) -> axum::response::Response {
    match err {
        AuthError::InvalidCredentials => {
            (StatusCode::BAD_REQUEST, axum::Json(json!({ "errors": "Invalid email/password" }))).into_response()
        }
        AuthError::Unauthenticated => StatusCode::UNAUTHORIZED.into_response(),
        AuthError::Unauthorized | AuthError::InvalidOrExpiredToken => StatusCode::FORBIDDEN.into_response(),
        AuthError::InvalidRefreshToken => errors(StatusCode::BAD_REQUEST, json!(["Invalid refresh token"])),
        AuthError::MissingField(field) => {
            error(StatusCode::BAD_REQUEST, format!("Missing required field: {field}"))
        }
        AuthError::PermissionDenied { .. } => StatusCode::FORBIDDEN.into_response(),
        AuthError::ImmutableFieldViolation => {
            errors(StatusCode::FORBIDDEN, json!(["User cannot change permission flags"]))
        }
        AuthError::Store(e) => store_error_to_response(e),
        AuthError::Internal(msg) => {
            tracing::error!(error = %msg, "internal auth failure");
            internal_error()
        }
    }
}

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::NotFound => StatusCode::NOT_FOUND.into_response(),
        StoreError::Conflict(_) => error(StatusCode::BAD_REQUEST, "User email already exists"),
        StoreError::Unavailable(msg) => {
            tracing::error!(error = %msg, "user store unavailable");
            internal_error()
        }
    }
}

/// `{"error": message}`
pub fn error(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (status, axum::Json(json!({ "error": message.into() }))).into_response()
}

/// `{"errors": [...]}`
pub fn errors(status: StatusCode, errors: Value) -> axum::response::Response {
    (status, axum::Json(json!({ "errors": errors }))).into_response()
}

pub fn internal_error() -> axum::response::Response {
    error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_failures_have_distinct_statuses() {
        assert_eq!(auth_error_to_response(AuthError::Unauthenticated).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(auth_error_to_response(AuthError::Unauthorized).status(), StatusCode::FORBIDDEN);
        assert_eq!(auth_error_to_response(AuthError::InvalidOrExpiredToken).status(), StatusCode::FORBIDDEN);
        assert_eq!(auth_error_to_response(AuthError::InvalidCredentials).status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn server_faults_are_500() {
        let res = auth_error_to_response(AuthError::Store(StoreError::unavailable("connection refused")));
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let res = auth_error_to_response(AuthError::internal("hash backend"));
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn missing_record_is_404() {
        assert_eq!(store_error_to_response(StoreError::NotFound).status(), StatusCode::NOT_FOUND);
    }
}
