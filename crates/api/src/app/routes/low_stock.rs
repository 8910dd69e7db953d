use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz::{self, Permission};
use crate::context::PrincipalContext;

/// Per-batch alerts, or one row per (warehouse, product) with `by_product=true`.
pub async fn low_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::LowStockQuery>,
) -> axum::response::Response {
    if let Err(e) = authz::authorize(&principal, Permission::LedgerRead) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }
    let by_product = query.by_product.unwrap_or(false);
    let scope = query.warehouse;
    let items = services
        .blocking(move |s| {
            let evaluator = s.engine.low_stock();
            if by_product {
                let rows = evaluator.shortages(scope.as_ref())?;
                Ok(serde_json::to_value(rows).unwrap_or_default())
            } else {
                let rows = evaluator.evaluate(scope.as_ref())?;
                Ok(serde_json::to_value(rows).unwrap_or_default())
            }
        })
        .await;
    match items {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(resp) => resp,
    }
}
