//! Ledger inspection endpoints (read-only).

use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use placetrack_auth::Permission;
use placetrack_infra::{MovementFilter, Pagination};

use crate::app::dto::{self, MovementPageResponse};
use crate::app::errors;
use crate::app::routes::common::{parse_id, require};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new().route("/movements", get(list_movements))
}

/// GET /movements?item_id=X&environment_id=Y&mover=Z&from=T1&to=T2&limit=50&offset=0
///
/// Query parameters:
/// - `item_id`: only this item's movements
/// - `environment_id`: movements into or out of this environment
/// - `mover`: movements made by this user
/// - `from` / `to`: inclusive `moved_at` window (RFC 3339)
/// - `limit`: page size (default: 50, max: 1000)
/// - `offset`: pagination offset (default: 0)
pub async fn list_movements(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::MovementListQuery>,
) -> axum::response::Response {
    if let Err(res) = require(&principal, Permission::MOVEMENTS_READ) {
        return res;
    }

    let filter = match build_filter(&query) {
        Ok(f) => f,
        Err(res) => return res,
    };
    let pagination = Pagination::new(query.limit, query.offset);

    match services.engine().query(filter, pagination).await {
        Ok(page) => (StatusCode::OK, Json(MovementPageResponse::from(&page))).into_response(),
        Err(e) => errors::movement_error_to_response(e),
    }
}

fn build_filter(query: &dto::MovementListQuery) -> Result<MovementFilter, axum::response::Response> {
    Ok(MovementFilter {
        item_id: query
            .item_id
            .as_deref()
            .map(|raw| parse_id(raw, "item"))
            .transpose()?,
        environment_id: query
            .environment_id
            .as_deref()
            .map(|raw| parse_id(raw, "environment"))
            .transpose()?,
        mover: query
            .mover
            .as_deref()
            .map(|raw| parse_id(raw, "mover"))
            .transpose()?,
        moved_after: query.from,
        moved_before: query.to,
    })
}
