use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
};

use stockledger_catalog::{NewProduct, ProductCatalog};
use stockledger_core::ProductName;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz::{self, Permission};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_products).post(upsert_product))
        .route("/:name", get(get_product).delete(remove_product))
        .route("/:name/threshold", put(set_threshold))
}

fn parse_name(name: &str) -> Result<ProductName, axum::response::Response> {
    ProductName::parse(name)
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid product name"))
}

pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(e) = authz::authorize(&principal, Permission::LedgerRead) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }
    let items = services.products.list();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

/// Create or replace; a changed unit/category is copied onto current batches.
pub async fn upsert_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewProduct>,
) -> axum::response::Response {
    if let Err(e) = authz::authorize(&principal, Permission::MasterData) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }
    match services.blocking(move |s| s.upsert_product(body)).await {
        Ok((product, resynced)) => (
            StatusCode::OK,
            Json(serde_json::json!({ "product": product, "batchesResynced": resynced })),
        )
            .into_response(),
        Err(resp) => resp,
    }
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(name): Path<String>,
) -> axum::response::Response {
    if let Err(e) = authz::authorize(&principal, Permission::LedgerRead) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }
    let name = match parse_name(&name) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.products.require(&name) {
        Ok(product) => (StatusCode::OK, Json(product)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

/// Batches and history keep their copied attributes.
pub async fn remove_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(name): Path<String>,
) -> axum::response::Response {
    if let Err(e) = authz::authorize(&principal, Permission::MasterData) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }
    let name = match parse_name(&name) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.products.remove(&name) {
        Ok(product) => (StatusCode::OK, Json(serde_json::json!({ "removed": product }))).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn set_threshold(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(name): Path<String>,
    Json(body): Json<dto::SetThresholdRequest>,
) -> axum::response::Response {
    if let Err(e) = authz::authorize(&principal, Permission::MasterData) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }
    let name = match parse_name(&name) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.products.set_threshold(&name, body.low_stock_threshold) {
        Ok(product) => (StatusCode::OK, Json(product)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}
