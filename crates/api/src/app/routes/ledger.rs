use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use stockledger_infra::HistoryFilter;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz::{self, Permission};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/stock-in", post(stock_in))
        .route("/stock-out", post(stock_out))
        .route("/transfer", post(transfer))
        .route("/edit", post(edit_batch))
        .route("/transactions", get(history))
}

pub async fn stock_in(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::StockInRequest>,
) -> axum::response::Response {
    if let Err(e) = authz::authorize(&principal, Permission::StockIn) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }
    let cmd = body.into_command(&principal);
    match services.blocking(move |s| s.engine.stock_in(cmd)).await {
        Ok(tx) => (StatusCode::CREATED, Json(dto::transaction_to_json(tx))).into_response(),
        Err(resp) => resp,
    }
}

pub async fn stock_out(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::StockOutRequest>,
) -> axum::response::Response {
    if let Err(e) = authz::authorize(&principal, Permission::StockOut) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }
    let cmd = body.into_command(&principal);
    match services.blocking(move |s| s.engine.stock_out(cmd)).await {
        Ok(tx) => (StatusCode::OK, Json(dto::transaction_to_json(tx))).into_response(),
        Err(resp) => resp,
    }
}

pub async fn transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::TransferRequest>,
) -> axum::response::Response {
    if let Err(e) = authz::authorize(&principal, Permission::Transfer) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }
    let cmd = body.into_command(&principal);
    match services.blocking(move |s| s.engine.transfer(cmd)).await {
        Ok(receipt) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "intentId": receipt.intent_id,
                "transferOut": dto::transaction_to_json(receipt.transfer_out),
                "transferIn": dto::transaction_to_json(receipt.transfer_in),
            })),
        )
            .into_response(),
        Err(resp) => resp,
    }
}

pub async fn edit_batch(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::EditBatchRequest>,
) -> axum::response::Response {
    if let Err(e) = authz::authorize(&principal, Permission::EditBatch) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }
    let cmd = body.into_command(&principal);
    match services.blocking(move |s| s.engine.edit_batch(cmd)).await {
        Ok(tx) => (StatusCode::OK, Json(dto::transaction_to_json(tx))).into_response(),
        Err(resp) => resp,
    }
}

/// Every warehouse's records, newest first.
pub async fn history(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::HistoryQuery>,
) -> axum::response::Response {
    if let Err(e) = authz::authorize(&principal, Permission::LedgerRead) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }
    let filter = HistoryFilter {
        year: query.year,
        month: query.month,
    };
    match services.blocking(move |s| s.engine.history(filter)).await {
        Ok(records) => {
            let items = records.into_iter().map(dto::transaction_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(resp) => resp,
    }
}
