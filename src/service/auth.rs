//! Token issuing. Identity checking is left to the deployment's own
//! authentication layer; this endpoint turns an already-verified user
//! into a bearer token for the VFS routes and the change socket.

use crate::error::VfsError;
use crate::utils::jwt::gen_token;
use crate::utils::session::User;
use crate::utils::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
pub struct AuthRes {
    token: String,
    #[serde(rename = "expires_in")]
    expires_in: i64,
    #[serde(rename = "issued_at")]
    issued_at: String,
}

pub(crate) async fn login(
    State(state): State<Arc<AppState>>,
    Json(user): Json<User>,
) -> Result<impl IntoResponse, VfsError> {
    if user.username.is_empty() {
        return Err(VfsError::Validation("username must not be empty".to_string()));
    }

    let token = gen_token(&state.config.jwt_secret, state.config.jwt_lifetime_secs, &user);
    let issued_at = Utc::now().to_rfc3339();

    Ok((
        StatusCode::OK,
        Json(AuthRes {
            token,
            expires_in: state.config.jwt_lifetime_secs,
            issued_at,
        }),
    ))
}
