use axum::{
    routing::{get, post, put},
    Router,
};

pub mod auth;
pub mod system;
pub mod users;

/// Router for the user and session endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/users", get(users::list_users).post(users::create_user))
        .route(
            "/users/:user_id",
            get(users::get_user)
                .put(users::replace_user)
                .patch(users::patch_user)
                .delete(users::delete_user),
        )
        .route("/users/:user_id/permissionFlags/:flags", put(users::set_permission_flags))
        .route("/auth", post(auth::login))
        .route("/auth/refresh-token", post(auth::refresh))
}
