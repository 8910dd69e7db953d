//! Operator reconciliation of transfers left half-done on single-key stores.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use stockledger_ledger::TransactionId;

use crate::app::errors;
use crate::app::services::AppServices;
use crate::authz::{self, Permission};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/pending", get(pending_transfers))
        .route("/:id/resume", post(resume_transfer))
        .route("/:id/compensate", post(compensate_transfer))
}

pub async fn pending_transfers(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(e) = authz::authorize(&principal, Permission::Reconcile) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }
    match services.blocking(|s| s.engine.pending_transfers()).await {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(resp) => resp,
    }
}

pub async fn resume_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = authz::authorize(&principal, Permission::Reconcile) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }
    let id = TransactionId::from_stored(id);
    match services.blocking(move |s| s.engine.resume_transfer(&id)).await {
        Ok(intent) => (StatusCode::OK, Json(intent)).into_response(),
        Err(resp) => resp,
    }
}

pub async fn compensate_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = authz::authorize(&principal, Permission::Reconcile) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }
    let id = TransactionId::from_stored(id);
    match services.blocking(move |s| s.engine.compensate_transfer(&id)).await {
        Ok(intent) => (StatusCode::OK, Json(intent)).into_response(),
        Err(resp) => resp,
    }
}
