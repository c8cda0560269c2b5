use std::str::FromStr;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use atelie_infra::command_dispatcher::DispatchError;
use atelie_infra::fulfillment::FulfillmentError;

use crate::app::dto;

pub type ApiResult<T = Response> = Result<T, ApiError>;

/// Everything a handler can fail with. Rendered as `{"error": code, "message": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Fulfillment(#[from] FulfillmentError),

    #[error("{message}")]
    BadRequest { code: &'static str, message: String },

    #[error("{0} not found")]
    NotFound(&'static str),
}

impl ApiError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Dispatch(e) => dispatch_error_to_response(e),
            ApiError::Fulfillment(e) => fulfillment_error_to_response(e),
            ApiError::BadRequest { code, message } => json_error(StatusCode::BAD_REQUEST, code, message),
            e @ ApiError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", e.to_string()),
        }
    }
}

fn dispatch_error_to_response(err: DispatchError) -> Response {
    let message = err.to_string();
    match err {
        DispatchError::Concurrency(_) => json_error(StatusCode::CONFLICT, "conflict", message),
        DispatchError::Validation(_) => json_error(StatusCode::BAD_REQUEST, "validation_error", message),
        DispatchError::InvariantViolation(_) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", message)
        }
        DispatchError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", message),
        DispatchError::TenantIsolation(_) => json_error(StatusCode::FORBIDDEN, "tenant_isolation", message),
        DispatchError::Publish(_) => {
            // Already committed; only the read model lags.
            tracing::warn!(error = %message, "event publication failed");
            json_error(StatusCode::BAD_GATEWAY, "publish_error", message)
        }
        DispatchError::Deserialize(_) | DispatchError::Store(_) => {
            tracing::error!(error = %message, "event store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", message)
        }
    }
}

fn fulfillment_error_to_response(err: FulfillmentError) -> Response {
    match err {
        FulfillmentError::InsufficientStock(report) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            axum::Json(json!({
                "error": "insufficient_stock",
                "message": report.rejection_message(),
                "shortfalls": report.shortfalls.iter().map(dto::shortfall_to_json).collect::<Vec<_>>(),
            })),
        )
            .into_response(),
        e @ (FulfillmentError::OrderNotFound(_)
        | FulfillmentError::ProductNotFound(_)
        | FulfillmentError::MaterialNotFound(_)) => json_error(StatusCode::NOT_FOUND, "not_found", e.to_string()),
        e @ FulfillmentError::QuantityOverflow(_) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", e.to_string())
        }
        e @ FulfillmentError::ConflictRetriesExhausted { .. } => {
            json_error(StatusCode::CONFLICT, "conflict", e.to_string())
        }
        FulfillmentError::Dispatch(e) => dispatch_error_to_response(e),
    }
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

/// Parse a path or body identifier; `what` names it in the error message.
pub fn parse_id<T: FromStr>(raw: &str, what: &str) -> ApiResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::bad_request("invalid_id", format!("invalid {what} id")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelie_inventory::MaterialId;

    #[test]
    fn status_codes_follow_error_kind() {
        let cases = [
            (ApiError::NotFound("order"), StatusCode::NOT_FOUND),
            (ApiError::bad_request("invalid_status", "nope"), StatusCode::BAD_REQUEST),
            (
                ApiError::Dispatch(DispatchError::Concurrency("stale".into())),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::Dispatch(DispatchError::InvariantViolation("skip".into())),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                ApiError::Fulfillment(FulfillmentError::QuantityOverflow(MaterialId::generate())),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn parse_id_is_typed() {
        let id = MaterialId::generate();
        assert_eq!(parse_id::<MaterialId>(&format!(" {id}"), "material").unwrap(), id);
        assert!(matches!(
            parse_id::<MaterialId>("x", "material"),
            Err(ApiError::BadRequest { code: "invalid_id", .. })
        ));
    }
}
