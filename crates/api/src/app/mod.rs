//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: storage selection and the movement engine
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use placetrack_infra::StoreError;

use crate::config::ApiConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &ApiConfig) -> Result<Router, StoreError> {
    let services = AppServices::from_config(&config.storage).await?;
    Ok(build_app_with_services(config.jwt_secret.clone(), services))
}

/// Build the router over already-constructed services.
pub fn build_app_with_services(jwt_secret: String, services: AppServices) -> Router {
    let jwt = Arc::new(placetrack_auth::Hs256JwtValidator::new(jwt_secret.into_bytes()));
    let auth_state = middleware::AuthState { jwt };

    // Protected routes: require a valid bearer token.
    let protected = routes::router()
        .layer(Extension(Arc::new(services)))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new())
}
