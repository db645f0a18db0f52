use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::cache::CacheError;

/// Session manager outcomes. The HTTP status mapping lives here and nowhere
/// else; services only return kinds.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown email and wrong password collapse into this one variant so the
    /// response never reveals which part was wrong.
    #[error("Incorrect e-mail/password combination")]
    InvalidCredentials,
    #[error("JWT token is missing.")]
    MissingToken,
    #[error("Token malformated")]
    MalformedHeader,
    #[error("Token invalid")]
    InvalidToken,
    #[error("Token revoked")]
    RevokedToken,
    #[error("The user does not have a valid session")]
    NoActiveSession,
    /// Infrastructure fault, not an authentication verdict.
    #[error("Cache unavailable")]
    CacheUnavailable(#[source] CacheError),
    #[error("Internal server error")]
    Internal(#[source] anyhow::Error),
}

impl From<CacheError> for AuthError {
    fn from(err: CacheError) -> Self {
        AuthError::CacheUnavailable(err)
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        AuthError::Internal(err)
    }
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::InvalidCredentials
            | AuthError::MissingToken
            | AuthError::MalformedHeader
            | AuthError::InvalidToken
            | AuthError::RevokedToken
            | AuthError::NoActiveSession => StatusCode::UNAUTHORIZED,
            AuthError::CacheUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match &self {
            AuthError::CacheUnavailable(source) => {
                error!(error = %source, "token cache unreachable");
            }
            AuthError::Internal(source) => {
                error!(error = %source, "auth internal error");
            }
            _ => {}
        }
        let body = Json(json!({
            "status": "error",
            "message": self.to_string(),
        }));
        (self.status(), body).into_response()
    }
}
