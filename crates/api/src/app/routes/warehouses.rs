use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get},
};

use stockledger_catalog::{NewWarehouse, WarehouseRegistry, WarehouseUpdate};
use stockledger_core::{BatchCode, WarehouseId};
use stockledger_infra::maintenance::delete_warehouse_cascade;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz::{self, Permission};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_warehouses).post(create_warehouse))
        .route(
            "/:id",
            get(get_warehouse).put(update_warehouse).delete(delete_warehouse),
        )
        .route("/:id/batches", get(list_batches))
        .route("/:id/batches/:code", delete(purge_batch))
        .route("/:id/transactions", get(list_transactions))
}

fn parse_warehouse_id(id: &str) -> Result<WarehouseId, axum::response::Response> {
    WarehouseId::parse(id)
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid warehouse id"))
}

fn forbidden(e: authz::AuthzError) -> axum::response::Response {
    errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string())
}

pub async fn list_warehouses(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(e) = authz::authorize(&principal, Permission::LedgerRead) {
        return forbidden(e);
    }
    let items = services
        .blocking(|s| {
            let mut items = Vec::new();
            for warehouse in s.warehouses.list() {
                let total = s.engine.total_items(&warehouse.id)?;
                items.push(dto::warehouse_to_json(warehouse, total));
            }
            Ok(items)
        })
        .await;
    match items {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(resp) => resp,
    }
}

pub async fn create_warehouse(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewWarehouse>,
) -> axum::response::Response {
    if let Err(e) = authz::authorize(&principal, Permission::MasterData) {
        return forbidden(e);
    }
    match services.warehouses.create(body) {
        Ok(warehouse) => (StatusCode::CREATED, Json(dto::warehouse_to_json(warehouse, 0))).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn get_warehouse(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = authz::authorize(&principal, Permission::LedgerRead) {
        return forbidden(e);
    }
    let id = match parse_warehouse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let found = services
        .blocking(move |s| {
            let warehouse = s.warehouses.require(&id)?;
            let total = s.engine.total_items(&id)?;
            Ok(dto::warehouse_to_json(warehouse, total))
        })
        .await;
    match found {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(resp) => resp,
    }
}

pub async fn update_warehouse(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<WarehouseUpdate>,
) -> axum::response::Response {
    if let Err(e) = authz::authorize(&principal, Permission::MasterData) {
        return forbidden(e);
    }
    let id = match parse_warehouse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let updated = services
        .blocking(move |s| {
            let warehouse = s.warehouses.update(&id, body)?;
            let total = s.engine.total_items(&id)?;
            Ok(dto::warehouse_to_json(warehouse, total))
        })
        .await;
    match updated {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(resp) => resp,
    }
}

/// Deletes the warehouse together with its batches and history.
pub async fn delete_warehouse(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = authz::authorize(&principal, Permission::MasterData) {
        return forbidden(e);
    }
    let id = match parse_warehouse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let deleted = services
        .blocking(move |s| {
            let summary = delete_warehouse_cascade(&s.engine, &s.warehouses, &id)?;
            Ok((id, summary))
        })
        .await;
    match deleted {
        Ok((id, summary)) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "deleted": id,
                "batches": summary.batches,
                "transactions": summary.transactions,
            })),
        )
            .into_response(),
        Err(resp) => resp,
    }
}

pub async fn list_batches(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Query(query): Query<dto::BatchesQuery>,
) -> axum::response::Response {
    if let Err(e) = authz::authorize(&principal, Permission::LedgerRead) {
        return forbidden(e);
    }
    let id = match parse_warehouse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let held_only = query.held.unwrap_or(false);
    let batches = services
        .blocking(move |s| {
            if held_only {
                s.engine.held_batches(&id)
            } else {
                s.engine.batches(&id)
            }
        })
        .await;
    match batches {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(resp) => resp,
    }
}

/// Removes an empty batch record; batches still holding stock are refused.
pub async fn purge_batch(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, code)): Path<(String, String)>,
) -> axum::response::Response {
    if let Err(e) = authz::authorize(&principal, Permission::PurgeBatch) {
        return forbidden(e);
    }
    let id = match parse_warehouse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let code = match BatchCode::parse(&code) {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid batch code"),
    };
    match services.blocking(move |s| s.engine.purge_batch(&id, &code)).await {
        Ok(batch) => (StatusCode::OK, Json(serde_json::json!({ "purged": batch }))).into_response(),
        Err(resp) => resp,
    }
}

pub async fn list_transactions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = authz::authorize(&principal, Permission::LedgerRead) {
        return forbidden(e);
    }
    let id = match parse_warehouse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.blocking(move |s| s.engine.transactions(&id)).await {
        Ok(records) => {
            let items = records.into_iter().map(dto::transaction_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(resp) => resp,
    }
}
