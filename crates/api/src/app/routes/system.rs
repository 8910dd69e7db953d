use std::sync::Arc;

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, sse::Event as SseEvent},
};

use crate::app::services::{self, AppServices};
use crate::context::PrincipalContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(Extension(principal): Extension<PrincipalContext>) -> impl IntoResponse {
    Json(serde_json::json!({
        "actor": principal.actor().as_str(),
        "role": principal.role().as_str(),
    }))
}

/// Ledger change notifications as Server-Sent Events.
pub async fn stream(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Sse<impl tokio_stream::Stream<Item = Result<SseEvent, std::convert::Infallible>>> {
    services::ledger_sse_stream(services)
}
