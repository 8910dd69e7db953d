//! Axum router and service wiring.
//!
//! - `services.rs`: engine, store backend, master data, realtime bridge
//! - `routes/`: handlers, one file per resource
//! - `dto.rs`: request bodies and JSON response shaping
//! - `errors.rs`: ledger errors to HTTP status codes

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use crate::config::AppConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &AppConfig) -> anyhow::Result<Router> {
    let services = Arc::new(services::build_services(config).await?);

    // Everything except /health needs a caller identity.
    let protected = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn(middleware::identity_middleware));

    Ok(Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new()))
}
