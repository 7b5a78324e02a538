use crate::error::VfsError;
use crate::utils::jwt::{self, Claims};
use crate::utils::session::Session;
use crate::utils::state::AppState;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::IntoResponse;
use std::sync::Arc;

/// Every VFS route requires a valid bearer token; the decoded claims
/// become the request session.
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, VfsError> {
    let claims = extract_claims(&req, &state.config.jwt_secret)?;
    req.extensions_mut().insert(Session::new(claims.into_user()));
    Ok(next.run(req).await)
}

fn extract_claims(req: &Request, secret: &str) -> Result<Claims, VfsError> {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .ok_or_else(|| VfsError::Unauthenticated("Missing or malformed Bearer token".to_string()))
        .map(str::to_string)?;
    jwt::decode(secret, &token)
}
