use axum::{
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::errors::ServiceError;
use crate::services::identity::{IdentityProvider, Session};
use crate::AppState;

/// Standard success response
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(data)).into_response()
}

/// Standard created response
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(data)).into_response()
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Resolves the caller's session, if any. Invalid or expired tokens resolve
/// to `None` rather than an error so optional-auth endpoints degrade to the
/// guest path.
pub async fn maybe_session(state: &AppState, headers: &HeaderMap) -> Option<Session> {
    let token = bearer_token(headers)?;
    state.services.identity.session_from_token(token).await
}

pub async fn require_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Session, ServiceError> {
    maybe_session(state, headers)
        .await
        .ok_or_else(|| ServiceError::Unauthorized("a valid bearer token is required".to_string()))
}

pub fn require_admin(session: &Session) -> Result<(), ServiceError> {
    if session.is_admin() {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(
            "admin access required".to_string(),
        ))
    }
}
