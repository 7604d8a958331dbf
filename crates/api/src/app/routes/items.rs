use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch},
    Json, Router,
};

use placetrack_auth::Permission;
use placetrack_core::{EnvironmentId, ItemId};
use placetrack_infra::ItemStore;

use crate::app::dto::{self, ItemResponse, MovementResponse};
use crate::app::errors;
use crate::app::routes::common::{parse_id, require};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/items", get(list_items).post(register_item))
        .route("/items/:item_id", get(get_item))
        .route("/items/:item_id/movements", get(item_history))
        .route("/items/:item_id/move/:environment_id", patch(move_item))
}

/// POST /items
pub async fn register_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::RegisterItemRequest>,
) -> axum::response::Response {
    if let Err(res) = require(&principal, Permission::ITEMS_REGISTER) {
        return res;
    }

    let environment_id = match body.environment_id.as_deref() {
        Some(raw) => match parse_id::<EnvironmentId>(raw, "environment") {
            Ok(id) => Some(id),
            Err(res) => return res,
        },
        None => None,
    };

    let item = match services
        .register_item(principal.user_id(), body.name, body.item_type, environment_id)
        .await
    {
        Ok(item) => item,
        Err(e) => return errors::movement_error_to_response(e),
    };

    let environment = match item.current_environment() {
        Some(env) => match services.store().find_environment(env).await {
            Ok(env) => env,
            Err(e) => return errors::store_error_to_response(e),
        },
        None => None,
    };

    (
        StatusCode::CREATED,
        Json(ItemResponse::new(&item, environment.as_ref())),
    )
        .into_response()
}

/// GET /items
pub async fn list_items(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(res) = require(&principal, Permission::ITEMS_READ) {
        return res;
    }

    let items = match services.store().list_items().await {
        Ok(items) => items,
        Err(e) => return errors::store_error_to_response(e),
    };
    let environments = match services.environment_index().await {
        Ok(index) => index,
        Err(e) => return errors::store_error_to_response(e),
    };

    (StatusCode::OK, Json(ItemResponse::list(&items, &environments))).into_response()
}

/// GET /items/:item_id
pub async fn get_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(item_id): Path<String>,
) -> axum::response::Response {
    if let Err(res) = require(&principal, Permission::ITEMS_READ) {
        return res;
    }
    let item_id: ItemId = match parse_id(&item_id, "item") {
        Ok(id) => id,
        Err(res) => return res,
    };

    match services.item_with_environment(item_id).await {
        Ok((item, environment)) => {
            (StatusCode::OK, Json(ItemResponse::new(&item, environment.as_ref()))).into_response()
        }
        Err(e) => errors::movement_error_to_response(e),
    }
}

/// PATCH /items/:item_id/move/:environment_id
///
/// Relocate an item on behalf of the calling principal.
/// - 200: the committed movement record
/// - 404: unknown item or environment (`entity` says which)
/// - 409: the item is already there (`x-reason` header + `reason` field)
pub async fn move_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path((item_id, environment_id)): Path<(String, String)>,
) -> axum::response::Response {
    if let Err(res) = require(&principal, Permission::ITEMS_MOVE) {
        return res;
    }
    let item_id: ItemId = match parse_id(&item_id, "item") {
        Ok(id) => id,
        Err(res) => return res,
    };
    let environment_id: EnvironmentId = match parse_id(&environment_id, "environment") {
        Ok(id) => id,
        Err(res) => return res,
    };

    match services
        .engine()
        .relocate(item_id, environment_id, principal.user_id())
        .await
    {
        Ok(record) => (StatusCode::OK, Json(MovementResponse::from(&record))).into_response(),
        Err(e) => errors::movement_error_to_response(e),
    }
}

/// GET /items/:item_id/movements
///
/// Movement history of one item, oldest first.
pub async fn item_history(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(item_id): Path<String>,
) -> axum::response::Response {
    if let Err(res) = require(&principal, Permission::MOVEMENTS_READ) {
        return res;
    }
    let item_id: ItemId = match parse_id(&item_id, "item") {
        Ok(id) => id,
        Err(res) => return res,
    };

    match services.engine().history(item_id).await {
        Ok(records) => (
            StatusCode::OK,
            Json(records.iter().map(MovementResponse::from).collect::<Vec<_>>()),
        )
            .into_response(),
        Err(e) => errors::movement_error_to_response(e),
    }
}
