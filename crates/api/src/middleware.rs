use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use stockledger_core::ActorName;

use crate::context::{PrincipalContext, Role};

pub const ACTOR_HEADER: &str = "x-actor";
pub const ROLE_HEADER: &str = "x-role";

/// Attach the caller identity forwarded by the gateway.
///
/// `x-actor` is required; `x-role` defaults to `staff`. Unknown roles are
/// refused rather than downgraded.
pub async fn identity_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let principal = extract_principal(req.headers())?;
    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

fn extract_principal(headers: &HeaderMap) -> Result<PrincipalContext, StatusCode> {
    let actor = headers
        .get(ACTOR_HEADER)
        .ok_or(StatusCode::UNAUTHORIZED)?
        .to_str()
        .map_err(|_| StatusCode::UNAUTHORIZED)?;
    let actor = ActorName::parse(actor).map_err(|_| StatusCode::UNAUTHORIZED)?;

    let role = match headers.get(ROLE_HEADER) {
        None => Role::Staff,
        Some(value) => {
            let value = value.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;
            Role::parse(value).ok_or(StatusCode::UNAUTHORIZED)?
        }
    };

    Ok(PrincipalContext::new(actor, role))
}
