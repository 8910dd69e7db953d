use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use stockledger_core::DomainError;
use stockledger_infra::LedgerError;

pub fn ledger_error_to_response(err: LedgerError) -> axum::response::Response {
    let code = err.code();
    let message = err.to_string();
    match err {
        LedgerError::Validation(_) => json_error(StatusCode::BAD_REQUEST, code, message),
        LedgerError::NotFound(_) => json_error(StatusCode::NOT_FOUND, code, message),
        LedgerError::DuplicateBatch { warehouse, code: batch } => json_error_with(
            StatusCode::CONFLICT,
            code,
            message,
            json!({ "warehouseId": warehouse, "code": batch }),
        ),
        LedgerError::InsufficientStock {
            available,
            requested,
        } => json_error_with(
            StatusCode::UNPROCESSABLE_ENTITY,
            code,
            message,
            json!({ "available": available, "requested": requested }),
        ),
        LedgerError::PartialTransfer {
            from,
            to,
            code: batch,
            quantity,
            intent_id,
            ..
        } => json_error_with(
            StatusCode::BAD_GATEWAY,
            code,
            message,
            json!({
                "from": from,
                "to": to,
                "code": batch,
                "quantity": quantity,
                "intentId": intent_id,
            }),
        ),
        LedgerError::Conflict(_) | LedgerError::DuplicateSubmission { .. } => {
            json_error(StatusCode::CONFLICT, code, message)
        }
        LedgerError::Invariant(_) => json_error(StatusCode::UNPROCESSABLE_ENTITY, code, message),
        LedgerError::Unauthorized => json_error(StatusCode::FORBIDDEN, code, message),
        LedgerError::Store(_) => json_error(StatusCode::INTERNAL_SERVER_ERROR, code, message),
    }
}

/// Master-data operations report `DomainError` directly.
pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    ledger_error_to_response(err.into())
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

fn json_error_with(
    status: StatusCode,
    code: &'static str,
    message: String,
    details: serde_json::Value,
) -> axum::response::Response {
    let mut body = json!({
        "error": code,
        "message": message,
    });
    if let (Some(body), serde_json::Value::Object(details)) = (body.as_object_mut(), details) {
        body.extend(details);
    }
    (status, axum::Json(body)).into_response()
}
