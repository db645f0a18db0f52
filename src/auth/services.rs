use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use crate::auth::error::AuthError;
use crate::auth::jwt::JwtKeys;
use crate::auth::password::verify_password;
use crate::auth::repo::{User, UserStore};
use crate::cache::Cache;

// Key namespace shared with any pre-existing cache state; must not change.
const VALID_TOKEN_PREFIX: &str = "api-vendas-VALID-TOKENS";
const INVALID_TOKEN_PREFIX: &str = "api-vendas-INVALID-TOKENS";

/// Blocklist entries live a fixed 24 hours, independent of the configured
/// token TTL.
pub const INVALID_TOKEN_TTL_SECS: u64 = 24 * 60 * 60;

fn valid_token_key(user_id: i32) -> String {
    format!("{VALID_TOKEN_PREFIX}:{user_id}")
}

fn invalid_token_key(user_id: i32, token: &str) -> String {
    format!("{INVALID_TOKEN_PREFIX}:{user_id}:{token}")
}

/// Verify credentials, mint a token and register it as the user's active
/// session. Exactly one cache write; it overwrites any marker left by a
/// previous login, so concurrent logins race as last-login-wins.
pub async fn login(
    users: &dyn UserStore,
    cache: &dyn Cache,
    keys: &JwtKeys,
    email: &str,
    password: &str,
) -> Result<(User, String), AuthError> {
    let user = users
        .find_by_email(email)
        .await
        .map_err(AuthError::Internal)?
        .ok_or(AuthError::InvalidCredentials)?;

    let ok = verify_password(password, &user.password_hash).map_err(AuthError::Internal)?;
    if !ok {
        warn!(user_id = user.id, "login password mismatch");
        return Err(AuthError::InvalidCredentials);
    }

    let token = keys.sign(user.id).map_err(AuthError::Internal)?;
    cache
        .save(
            &valid_token_key(user.id),
            Value::String(token.clone()),
            Some(keys.ttl),
        )
        .await?;

    info!(user_id = user.id, "session created");
    Ok((user, token))
}

/// The authenticate gate, run for every protected request. Ordering is
/// fixed: header shape, then signature/expiry, then the cache markers, so a
/// cryptographically invalid token never touches the cache.
pub async fn authenticate(
    cache: &dyn Cache,
    keys: &JwtKeys,
    auth_header: Option<&str>,
) -> Result<i32, AuthError> {
    let header = auth_header.ok_or(AuthError::MissingToken)?;

    let mut parts = header.split(' ');
    let (scheme, token) = match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) => (scheme, token),
        _ => return Err(AuthError::MalformedHeader),
    };
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::MalformedHeader);
    }

    let claims = keys.verify(token).map_err(|e| {
        warn!(error = %e, "jwt verification failed");
        AuthError::InvalidToken
    })?;

    // A token is active only while it equals the valid-token marker; a later
    // login replaces the marker and strands the older token here.
    match cache.recover(&valid_token_key(claims.id)).await? {
        Some(Value::String(active)) if active == token => {}
        _ => {
            warn!(user_id = claims.id, "token is not the active session");
            return Err(AuthError::RevokedToken);
        }
    }

    if cache.exists(&invalid_token_key(claims.id, token)).await? {
        warn!(user_id = claims.id, "token is on the blocklist");
        return Err(AuthError::RevokedToken);
    }

    Ok(claims.id)
}

/// Retire the user's active session: drop the valid-token marker and put the
/// token on the blocklist for 24 hours.
pub async fn logout(cache: &dyn Cache, user_id: i32) -> Result<(), AuthError> {
    let key = valid_token_key(user_id);

    let token = match cache.recover(&key).await? {
        Some(Value::String(token)) => token,
        _ => return Err(AuthError::NoActiveSession),
    };

    cache.invalidate(&key).await?;
    cache
        .save(
            &invalid_token_key(user_id, &token),
            Value::Bool(true),
            Some(Duration::from_secs(INVALID_TOKEN_TTL_SECS)),
        )
        .await?;

    info!(user_id, "session revoked");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::hash_password;
    use crate::auth::repo::MemoryUserStore;
    use crate::cache::{CacheError, MemoryCache};
    use axum::async_trait;

    fn make_keys() -> JwtKeys {
        JwtKeys::new("test-secret", Duration::from_secs(300))
    }

    async fn seed_shrek(users: &MemoryUserStore) -> User {
        let hash = hash_password("123456").expect("hash");
        users
            .create("Shrek", "shrek@gmail.com", &hash)
            .await
            .expect("create user")
    }

    fn bearer(token: &str) -> String {
        format!("Bearer {token}")
    }

    /// Cache standing in for an unreachable Redis instance.
    struct DownCache;

    fn connection_refused() -> CacheError {
        CacheError::Unavailable(redis::RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        )))
    }

    #[async_trait]
    impl Cache for DownCache {
        async fn save(
            &self,
            _key: &str,
            _value: Value,
            _ttl: Option<Duration>,
        ) -> Result<(), CacheError> {
            Err(connection_refused())
        }
        async fn recover(&self, _key: &str) -> Result<Option<Value>, CacheError> {
            Err(connection_refused())
        }
        async fn invalidate(&self, _key: &str) -> Result<(), CacheError> {
            Err(connection_refused())
        }
        async fn exists(&self, _key: &str) -> Result<bool, CacheError> {
            Err(connection_refused())
        }
    }

    #[tokio::test]
    async fn login_then_authenticate_succeeds() {
        let users = MemoryUserStore::new();
        let cache = MemoryCache::new();
        let keys = make_keys();
        let shrek = seed_shrek(&users).await;

        let (user, token) = login(&users, &cache, &keys, "shrek@gmail.com", "123456")
            .await
            .expect("login");
        assert_eq!(user.id, shrek.id);
        assert_eq!(keys.verify(&token).expect("claims").id, shrek.id);

        let user_id = authenticate(&cache, &keys, Some(&bearer(&token)))
            .await
            .expect("gate");
        assert_eq!(user_id, shrek.id);
    }

    #[tokio::test]
    async fn unknown_email_and_wrong_password_are_indistinguishable() {
        let users = MemoryUserStore::new();
        let cache = MemoryCache::new();
        let keys = make_keys();
        seed_shrek(&users).await;

        let a = login(&users, &cache, &keys, "donkey@gmail.com", "123456")
            .await
            .unwrap_err();
        let b = login(&users, &cache, &keys, "shrek@gmail.com", "654321")
            .await
            .unwrap_err();
        assert!(matches!(a, AuthError::InvalidCredentials));
        assert!(matches!(b, AuthError::InvalidCredentials));
        assert_eq!(a.to_string(), b.to_string());
    }

    #[tokio::test]
    async fn second_login_supersedes_first_without_blocklisting() {
        let users = MemoryUserStore::new();
        let cache = MemoryCache::new();
        let keys = make_keys();
        let shrek = seed_shrek(&users).await;

        let (_, first) = login(&users, &cache, &keys, "shrek@gmail.com", "123456")
            .await
            .expect("first login");
        let (_, second) = login(&users, &cache, &keys, "shrek@gmail.com", "123456")
            .await
            .expect("second login");

        let err = authenticate(&cache, &keys, Some(&bearer(&first)))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::RevokedToken));
        // demoted, not blocklisted
        assert!(!cache
            .exists(&invalid_token_key(shrek.id, &first))
            .await
            .unwrap());

        assert_eq!(
            authenticate(&cache, &keys, Some(&bearer(&second)))
                .await
                .expect("current session"),
            shrek.id
        );
    }

    #[tokio::test]
    async fn logout_blocklists_the_token() {
        let users = MemoryUserStore::new();
        let cache = MemoryCache::new();
        let keys = make_keys();
        let shrek = seed_shrek(&users).await;

        let (_, token) = login(&users, &cache, &keys, "shrek@gmail.com", "123456")
            .await
            .expect("login");
        logout(&cache, shrek.id).await.expect("logout");

        let err = authenticate(&cache, &keys, Some(&bearer(&token)))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::RevokedToken));
        assert!(cache
            .exists(&invalid_token_key(shrek.id, &token))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn second_logout_has_no_session_to_revoke() {
        let users = MemoryUserStore::new();
        let cache = MemoryCache::new();
        let keys = make_keys();
        let shrek = seed_shrek(&users).await;

        login(&users, &cache, &keys, "shrek@gmail.com", "123456")
            .await
            .expect("login");
        logout(&cache, shrek.id).await.expect("first logout");
        let err = logout(&cache, shrek.id).await.unwrap_err();
        assert!(matches!(err, AuthError::NoActiveSession));
    }

    #[tokio::test]
    async fn logout_without_login_has_no_session() {
        let cache = MemoryCache::new();
        let err = logout(&cache, 999).await.unwrap_err();
        assert!(matches!(err, AuthError::NoActiveSession));
    }

    #[tokio::test]
    async fn header_parsing_rejections() {
        let cache = MemoryCache::new();
        let keys = make_keys();

        let err = authenticate(&cache, &keys, None).await.unwrap_err();
        assert!(matches!(err, AuthError::MissingToken));

        // wrong scheme is a header problem, not a token problem
        let err = authenticate(&cache, &keys, Some("Token abc")).await.unwrap_err();
        assert!(matches!(err, AuthError::MalformedHeader));

        let err = authenticate(&cache, &keys, Some("Bearer a b")).await.unwrap_err();
        assert!(matches!(err, AuthError::MalformedHeader));

        let err = authenticate(&cache, &keys, Some("Bearer")).await.unwrap_err();
        assert!(matches!(err, AuthError::MalformedHeader));
    }

    #[tokio::test]
    async fn bearer_scheme_is_case_insensitive() {
        let users = MemoryUserStore::new();
        let cache = MemoryCache::new();
        let keys = make_keys();
        let shrek = seed_shrek(&users).await;

        let (_, token) = login(&users, &cache, &keys, "shrek@gmail.com", "123456")
            .await
            .expect("login");
        let user_id = authenticate(&cache, &keys, Some(&format!("bearer {token}")))
            .await
            .expect("gate");
        assert_eq!(user_id, shrek.id);
    }

    #[tokio::test]
    async fn cache_outage_is_surfaced_not_swallowed() {
        let keys = make_keys();
        let token = keys.sign(1).expect("sign");

        let err = authenticate(&DownCache, &keys, Some(&bearer(&token)))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::CacheUnavailable(_)));

        let err = logout(&DownCache, 1).await.unwrap_err();
        assert!(matches!(err, AuthError::CacheUnavailable(_)));
    }

    #[tokio::test]
    async fn signature_check_precedes_cache_lookup() {
        let keys = make_keys();
        // a forged token must be rejected as invalid even while the cache is
        // down, proving no cache I/O happened first
        let forged = JwtKeys::new("other-secret", Duration::from_secs(300))
            .sign(1)
            .expect("sign");
        let err = authenticate(&DownCache, &keys, Some(&bearer(&forged)))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }
}
