use axum::{Router, routing::get};

pub mod common;
pub mod environments;
pub mod items;
pub mod movements;
pub mod system;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .merge(items::router())
        .merge(environments::router())
        .merge(movements::router())
}
