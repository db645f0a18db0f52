use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};

use crate::auth::error::AuthError;
use crate::auth::jwt::JwtKeys;
use crate::auth::services;
use crate::state::AppState;

/// Authenticate gate as an extractor: runs the full header → signature →
/// cache-marker check and yields the authenticated user id.
pub struct AuthUser(pub i32);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        let user_id = services::authenticate(state.cache.as_ref(), &keys, header).await?;
        Ok(AuthUser(user_id))
    }
}
