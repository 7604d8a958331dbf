use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use placetrack_core::DomainError;
use placetrack_infra::{MovementError, StoreError};

/// Header carrying the machine-readable conflict reason.
pub const REASON_HEADER: &str = "x-reason";

pub fn movement_error_to_response(err: MovementError) -> Response {
    match err {
        MovementError::NotFound(entity) => (
            StatusCode::NOT_FOUND,
            axum::Json(json!({
                "error": "not_found",
                "entity": entity.as_str(),
                "message": format!("{entity} not found"),
            })),
        )
            .into_response(),
        MovementError::Conflict(reason) => {
            let mut response = (
                StatusCode::CONFLICT,
                axum::Json(json!({
                    "error": "conflict",
                    "reason": reason.code(),
                    "message": reason.message(),
                })),
            )
                .into_response();
            response
                .headers_mut()
                .insert(REASON_HEADER, HeaderValue::from_static(reason.code()));
            response
        }
        MovementError::Domain(DomainError::Validation(msg))
        | MovementError::Domain(DomainError::InvalidId(msg)) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        MovementError::Domain(other) => json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "invariant_violation",
            other.to_string(),
        ),
        MovementError::Storage(e) => store_error_to_response(e),
    }
}

/// Storage details are logged, never returned.
pub fn store_error_to_response(err: StoreError) -> Response {
    tracing::error!(error = %err, "storage failure");
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "internal server error",
    )
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
