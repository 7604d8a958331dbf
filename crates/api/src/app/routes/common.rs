use std::str::FromStr;

use axum::http::StatusCode;
use axum::response::Response;

use placetrack_auth::Permission;

use crate::app::errors;
use crate::context::PrincipalContext;

/// Require one permission; maps denial to `403`.
pub fn require(principal: &PrincipalContext, permission: &'static str) -> Result<(), Response> {
    crate::authz::authorize_request(principal, &Permission::new(permission))
        .map_err(|e| errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string()))
}

/// Parse an identifier from a path or query value; maps failure to `400`.
pub fn parse_id<T: FromStr>(raw: &str, what: &'static str) -> Result<T, Response> {
    raw.parse().map_err(|_| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_id",
            format!("invalid {what} id"),
        )
    })
}
