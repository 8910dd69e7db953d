use axum::{Router, routing::get};

pub mod ledger;
pub mod low_stock;
pub mod products;
pub mod system;
pub mod transfers;
pub mod warehouses;

/// Router for all endpoints that need a caller identity.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/stream", get(system::stream))
        .route("/low-stock", get(low_stock::low_stock))
        .nest("/warehouses", warehouses::router())
        .nest("/products", products::router())
        .nest("/ledger", ledger::router())
        .nest("/transfers", transfers::router())
}
