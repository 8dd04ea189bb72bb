use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use cavastock_core::DomainError;
use cavastock_infra::CoordinatorError;

pub fn coordinator_error_to_response(err: CoordinatorError) -> axum::response::Response {
    match err {
        CoordinatorError::Domain(e) => domain_error_to_response(e),
        CoordinatorError::Poisoned => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "ledger unavailable",
        ),
        CoordinatorError::Restore(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "restore_error", msg)
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    let code = err.code();
    match err {
        DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, code, msg)
        }
        DomainError::InvalidTransition(msg) | DomainError::Conflict(msg) => {
            json_error(StatusCode::CONFLICT, code, msg)
        }
        DomainError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, code, msg),
        DomainError::InvariantViolation(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, code, msg)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Parse an optional `If-Match` header into an expected ledger version.
pub fn expected_version(
    headers: &axum::http::HeaderMap,
) -> Result<cavastock_core::ExpectedVersion, axum::response::Response> {
    let Some(raw) = headers.get(axum::http::header::IF_MATCH) else {
        return Ok(cavastock_core::ExpectedVersion::Any);
    };
    raw.to_str()
        .ok()
        .map(|v| v.trim().trim_matches('"'))
        .and_then(|v| v.parse::<u64>().ok())
        .map(cavastock_core::ExpectedVersion::Exact)
        .ok_or_else(|| {
            json_error(
                StatusCode::BAD_REQUEST,
                "invalid_if_match",
                "If-Match must be a ledger version number",
            )
        })
}
