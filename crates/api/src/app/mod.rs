//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: auth core and user store wiring
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request parsing and JSON mapping helpers
//! - `errors.rs`: the single failure-to-response mapping

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use keystone_auth::{AuthConfig, AuthResult};
use keystone_infra::UserStore;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
///
/// Fails if `config` is unusable (missing or short secret, zero lifetime).
pub fn build_app<S>(config: AuthConfig, store: Arc<S>) -> AuthResult<Router>
where
    S: UserStore + 'static,
{
    let services = Arc::new(services::AppServices::new(config, store)?);
    tracing::debug!(?services, "services wired");

    Ok(Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .layer(Extension(services))
        .layer(ServiceBuilder::new().layer(axum::middleware::from_fn(middleware::trace_requests))))
}
