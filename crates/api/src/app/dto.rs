//! Request DTOs and JSON mapping.
//!
//! Bodies are read as raw JSON first so the immutable-flags gate can inspect
//! exactly what the client sent; the typed requests below are deserialized
//! from that value and validated, with failures reported together as
//! `{"errors": [{"param", "msg"}]}`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use validator::{Validate, ValidationError, ValidationErrors};

use keystone_auth::{PERMISSION_FLAGS_FIELD, Principal, requested_flags};

const INVALID_VALUE: &str = "Invalid value";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub param: String,
    pub msg: String,
}

impl FieldError {
    pub fn new(param: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            param: param.into(),
            msg: msg.into(),
        }
    }

    pub fn invalid(param: impl Into<String>) -> Self {
        Self::new(param, INVALID_VALUE)
    }
}

pub type FieldErrors = Vec<FieldError>;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    #[serde(default)]
    #[validate(email(message = "Invalid value"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 5, message = "Must include password (5+ characters)"))]
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Full replacement. `permissionFlags` is required here but only checked
/// for shape; whether it may change is up to the immutable-flags gate.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceUserRequest {
    #[serde(default)]
    #[validate(email(message = "Invalid value"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 5, message = "Must include password (5+ characters)"))]
    pub password: String,
    #[validate(required(message = "Invalid value"))]
    pub first_name: Option<String>,
    #[validate(required(message = "Invalid value"))]
    pub last_name: Option<String>,
    #[validate(required(message = "Invalid value"), custom(function = "integer_flags", message = "Invalid value"))]
    pub permission_flags: Option<Value>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PatchUserRequest {
    #[validate(email(message = "Invalid value"))]
    pub email: Option<String>,
    #[validate(length(min = 5, message = "Must include password (5+ characters)"))]
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[validate(custom(function = "integer_flags", message = "Invalid value"))]
    pub permission_flags: Option<Value>,
}

/// `email` may be absent (it then simply fails verification); `password`
/// must be a string.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid value"))]
    pub email: Option<String>,
    #[validate(required(message = "Invalid value"))]
    pub password: Option<String>,
}

fn integer_flags(value: &Value) -> Result<(), ValidationError> {
    match requested_flags(value) {
        Some(_) => Ok(()),
        None => Err(ValidationError::new("integer")),
    }
}

/// Deserialize and validate a request body.
pub fn parse<T>(body: &Value) -> Result<T, FieldErrors>
where
    T: DeserializeOwned + Validate,
{
    let req = T::deserialize(body).map_err(|_| {
        // The serde message may quote submitted values, passwords included.
        tracing::debug!("request body does not match the expected shape");
        vec![FieldError::invalid("body")]
    })?;
    req.validate().map_err(field_errors)?;
    Ok(req)
}

/// One entry per failing field, ordered by wire name.
fn field_errors(errors: ValidationErrors) -> FieldErrors {
    let mut out: FieldErrors = errors
        .field_errors()
        .into_iter()
        .filter_map(|(field, errs)| {
            let first = errs.first()?;
            let msg = first.message.as_ref().map_or_else(|| INVALID_VALUE.to_string(), |m| m.to_string());
            Some(FieldError::new(wire_name(&field), msg))
        })
        .collect();
    out.sort_by(|a, b| a.param.cmp(&b.param));
    out
}

fn wire_name(field: &str) -> &str {
    match field {
        "first_name" => "firstName",
        "last_name" => "lastName",
        "permission_flags" => PERMISSION_FLAGS_FIELD,
        other => other,
    }
}

/// `refreshToken` from a refresh request body, if present and non-empty.
pub fn refresh_token(body: &Value) -> Option<&str> {
    body.get("refreshToken").and_then(Value::as_str).filter(|s| !s.is_empty())
}

// -------------------------
// Response mapping
// -------------------------

pub fn user_to_json(user: &Principal) -> Value {
    json!({
        "id": user.id.as_str(),
        "email": user.email,
        "firstName": user.first_name,
        "lastName": user.last_name,
        "permissionFlags": user.permission_flags.bits(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(errs: &FieldErrors) -> Vec<&str> {
        errs.iter().map(|e| e.param.as_str()).collect()
    }

    #[test]
    fn create_requires_email_and_long_enough_password() {
        let errs = parse::<CreateUserRequest>(&json!({ "email": "nope", "password": "1234" })).unwrap_err();
        assert_eq!(params(&errs), ["email", "password"]);
        assert_eq!(errs[1].msg, "Must include password (5+ characters)");

        let errs = parse::<CreateUserRequest>(&json!({})).unwrap_err();
        assert_eq!(params(&errs), ["email", "password"]);

        let ok = parse::<CreateUserRequest>(&json!({ "email": "a@example.com", "password": "12345" })).unwrap();
        assert_eq!(ok.email, "a@example.com");
        assert!(ok.first_name.is_none());
    }

    #[test]
    fn replace_requires_every_field() {
        let errs = parse::<ReplaceUserRequest>(&json!({
            "email": "a@example.com",
            "password": "123123123",
            "firstName": "Nam",
        }))
        .unwrap_err();
        assert_eq!(params(&errs), ["lastName", "permissionFlags"]);
    }

    #[test]
    fn replace_accepts_flags_as_integer_or_decimal_string() {
        let body = |flags: Value| {
            json!({
                "email": "a@example.com",
                "password": "123123123",
                "firstName": "Nam",
                "lastName": "Nguyen",
                "permissionFlags": flags,
            })
        };
        assert!(parse::<ReplaceUserRequest>(&body(json!(1))).is_ok());
        assert!(parse::<ReplaceUserRequest>(&body(json!("1"))).is_ok());

        let errs = parse::<ReplaceUserRequest>(&body(json!("one"))).unwrap_err();
        assert_eq!(errs, [FieldError::invalid("permissionFlags")]);
    }

    #[test]
    fn patch_checks_only_present_fields() {
        let patch = parse::<PatchUserRequest>(&json!({ "firstName": "Jose" })).unwrap();
        assert_eq!(patch.first_name.as_deref(), Some("Jose"));
        assert!(patch.email.is_none() && patch.password.is_none());

        assert!(parse::<PatchUserRequest>(&json!({ "permissionFlags": "1" })).is_ok());

        let errs = parse::<PatchUserRequest>(&json!({ "password": "abc", "permissionFlags": true })).unwrap_err();
        assert_eq!(params(&errs), ["password", "permissionFlags"]);
    }

    #[test]
    fn mistyped_or_non_object_bodies_are_rejected() {
        let errs = parse::<CreateUserRequest>(&json!([1, 2])).unwrap_err();
        assert_eq!(errs, [FieldError::invalid("body")]);
        assert!(parse::<LoginRequest>(&json!("x")).is_err());
        assert!(parse::<CreateUserRequest>(&json!({ "email": 5, "password": "12345" })).is_err());
    }

    #[test]
    fn login_tolerates_missing_email() {
        let login = parse::<LoginRequest>(&json!({ "password": "secret" })).unwrap();
        assert!(login.email.is_none());

        let errs = parse::<LoginRequest>(&json!({ "email": "a@example.com" })).unwrap_err();
        assert_eq!(params(&errs), ["password"]);
    }

    #[test]
    fn refresh_token_must_be_a_non_empty_string() {
        assert_eq!(refresh_token(&json!({ "refreshToken": "abc" })), Some("abc"));
        assert_eq!(refresh_token(&json!({ "refreshToken": "" })), None);
        assert_eq!(refresh_token(&json!({ "refreshToken": 1 })), None);
        assert_eq!(refresh_token(&json!({})), None);
    }
}
