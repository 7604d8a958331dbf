use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use placetrack_auth::Permission;
use placetrack_core::{EntityKind, EnvironmentId};
use placetrack_infra::{ItemStore, MovementError};

use crate::app::dto::{self, EnvironmentResponse, ItemResponse};
use crate::app::errors;
use crate::app::routes::common::{parse_id, require};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/environments", get(list_environments).post(create_environment))
        .route("/environments/:environment_id", get(get_environment))
        .route("/environments/:environment_id/items", get(list_environment_items))
}

/// POST /environments
pub async fn create_environment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateEnvironmentRequest>,
) -> axum::response::Response {
    if let Err(res) = require(&principal, Permission::ENVIRONMENTS_CREATE) {
        return res;
    }

    match services.create_environment(body.label).await {
        Ok(env) => (StatusCode::CREATED, Json(EnvironmentResponse::from(&env))).into_response(),
        Err(e) => errors::movement_error_to_response(e),
    }
}

/// GET /environments
pub async fn list_environments(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(res) = require(&principal, Permission::ENVIRONMENTS_READ) {
        return res;
    }

    match services.store().list_environments().await {
        Ok(envs) => (
            StatusCode::OK,
            Json(envs.iter().map(EnvironmentResponse::from).collect::<Vec<_>>()),
        )
            .into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// GET /environments/:environment_id
pub async fn get_environment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(environment_id): Path<String>,
) -> axum::response::Response {
    if let Err(res) = require(&principal, Permission::ENVIRONMENTS_READ) {
        return res;
    }
    let environment_id: EnvironmentId = match parse_id(&environment_id, "environment") {
        Ok(id) => id,
        Err(res) => return res,
    };

    match services.store().find_environment(environment_id).await {
        Ok(Some(env)) => (StatusCode::OK, Json(EnvironmentResponse::from(&env))).into_response(),
        Ok(None) => errors::movement_error_to_response(MovementError::NotFound(
            EntityKind::Environment,
        )),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// GET /environments/:environment_id/items
///
/// Items currently located in the environment.
pub async fn list_environment_items(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(environment_id): Path<String>,
) -> axum::response::Response {
    if let Err(res) = require(&principal, Permission::ITEMS_READ) {
        return res;
    }
    let environment_id: EnvironmentId = match parse_id(&environment_id, "environment") {
        Ok(id) => id,
        Err(res) => return res,
    };

    let environment = match services.store().find_environment(environment_id).await {
        Ok(Some(env)) => env,
        Ok(None) => {
            return errors::movement_error_to_response(MovementError::NotFound(
                EntityKind::Environment,
            ));
        }
        Err(e) => return errors::store_error_to_response(e),
    };

    match services.store().list_items_in(environment_id).await {
        Ok(items) => (
            StatusCode::OK,
            Json(
                items
                    .iter()
                    .map(|item| ItemResponse::new(item, Some(&environment)))
                    .collect::<Vec<_>>(),
            ),
        )
            .into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
