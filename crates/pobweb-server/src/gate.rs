//! Request gate: nothing behind it runs without a verified subject.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use pobweb_vfs::Subject;

use crate::auth::{AuthError, AuthResult};
use crate::error::ApiError;
use crate::state::AppState;

/// Token from `Authorization: Bearer <token>`; the scheme is case-insensitive.
pub fn bearer_token(headers: &HeaderMap) -> AuthResult<&str> {
    let raw = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::MissingToken)?;
    let (scheme, token) = raw.split_once(' ').ok_or(AuthError::MissingToken)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::MissingToken);
    }
    Ok(token)
}

pub async fn require_subject(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = match bearer_token(req.headers()) {
        Ok(t) => t.to_string(),
        Err(e) => {
            tracing::debug!(event = "auth_missing", path = %req.uri().path());
            return Err(e.into());
        }
    };

    let claims = state.validator.validate(&token).await.map_err(|e| {
        tracing::warn!(event = "auth_rejected", reason = %e);
        ApiError::from(e)
    })?;

    let subject = Subject::new(claims.sub).map_err(|e| {
        tracing::warn!(event = "auth_rejected", reason = %e);
        ApiError::Forbidden
    })?;
    req.extensions_mut().insert(subject);
    Ok(next.run(req).await)
}
