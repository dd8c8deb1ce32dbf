//! Cached public keys for session cookie verification.
//!
//! Keys are fetched lazily and kept for `KEYSET_CACHE_TTL_SECONDS`. A stale
//! cache triggers a refresh; if that refresh fails the last known keys stay
//! in use. A cookie signed with an unknown `kid` triggers one refresh
//! (rate limited by a cooldown) before it is rejected. Concurrent callers
//! share a single in-flight refresh.

use reqwest::{
    header::{ETAG, IF_NONE_MATCH},
    Client,
};
use serde::de::DeserializeOwned;
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, info_span, warn, Instrument};

use super::{
    jwks::Jwks,
    jwt::{verify_rs256, JwtError},
};
use crate::provider::{now_unix_seconds, ProviderError};

const KEYSET_CACHE_TTL_SECONDS: u64 = 3600;
const KEYSET_REFRESH_COOLDOWN_SECONDS: u64 = 30;

#[derive(Debug)]
struct KeyCache {
    jwks: Jwks,
    /// `None` until the first successful fetch.
    fetched_at: Option<Instant>,
    etag: Option<String>,
}

impl KeyCache {
    fn is_fresh(&self) -> bool {
        self.fetched_at
            .is_some_and(|at| at.elapsed() < Duration::from_secs(KEYSET_CACHE_TTL_SECONDS))
    }
}

enum FetchOutcome {
    NotModified,
    Updated { jwks: Jwks, etag: Option<String> },
}

#[derive(Debug)]
pub struct SessionKeys {
    url: String,
    client: Client,
    cache: RwLock<KeyCache>,
    /// Held for the duration of a fetch.
    refreshing: Mutex<()>,
    last_refresh_unix: AtomicU64,
    /// Bumped on every refresh attempt, successful or not.
    refresh_generation: AtomicU64,
}

impl SessionKeys {
    #[must_use]
    pub fn new(url: String, client: Client) -> Self {
        Self {
            url,
            client,
            cache: RwLock::new(KeyCache {
                jwks: Jwks::default(),
                fetched_at: None,
                etag: None,
            }),
            refreshing: Mutex::new(()),
            last_refresh_unix: AtomicU64::new(0),
            refresh_generation: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Verify the signature of `token` and decode its claims.
    ///
    /// # Errors
    /// `ProviderError::InvalidSession` when the token does not verify against
    /// the current keys.
    pub async fn verify<C: DeserializeOwned>(&self, token: &str) -> Result<C, ProviderError> {
        let jwks = self.snapshot().await;
        match verify_rs256(token, &jwks) {
            Err(JwtError::UnknownKid(kid)) => {
                if self.refresh_on_unknown_kid().await {
                    let jwks = self.snapshot().await;
                    return verify_rs256(token, &jwks).map_err(invalid);
                }
                Err(invalid(JwtError::UnknownKid(kid)))
            }
            other => other.map_err(invalid),
        }
    }

    /// Current keys; refreshes a stale cache and keeps the old keys if that fails.
    async fn snapshot(&self) -> Jwks {
        let seen = self.refresh_generation.load(Ordering::Acquire);
        {
            let cache = self.cache.read().await;
            if cache.is_fresh() {
                return cache.jwks.clone();
            }
        }

        let _guard = self.refreshing.lock().await;
        // Whoever held the lock before us already refreshed.
        if self.refresh_generation.load(Ordering::Acquire) == seen {
            if let Err(err) = self.refresh().await {
                warn!(error = %err, url = %self.url, "failed to refresh session cookie keys");
            }
        }
        self.cache.read().await.jwks.clone()
    }

    /// Caller must hold `refreshing`.
    async fn refresh(&self) -> Result<(), ProviderError> {
        let etag = self.cache.read().await.etag.clone();
        self.last_refresh_unix
            .store(now_unix_seconds_u64(), Ordering::Relaxed);

        let outcome = self.fetch(etag.as_deref()).await;
        self.refresh_generation.fetch_add(1, Ordering::Release);
        match outcome? {
            FetchOutcome::NotModified => {
                let mut cache = self.cache.write().await;
                cache.fetched_at = Some(Instant::now());
            }
            FetchOutcome::Updated { jwks, etag } => {
                let mut cache = self.cache.write().await;
                cache.jwks = jwks;
                cache.fetched_at = Some(Instant::now());
                cache.etag = etag;
                info!(keys = cache.jwks.keys.len(), "session cookie keys refreshed");
            }
        }
        Ok(())
    }

    /// Refresh once for an unknown `kid`, unless a refresh happened within the cooldown.
    async fn refresh_on_unknown_kid(&self) -> bool {
        let seen = self.refresh_generation.load(Ordering::Acquire);
        let _guard = self.refreshing.lock().await;
        if self.refresh_generation.load(Ordering::Acquire) != seen {
            // Another caller refreshed while we waited; retry against its keys.
            return true;
        }
        let now = now_unix_seconds_u64();
        let last = self.last_refresh_unix.load(Ordering::Relaxed);
        if now.saturating_sub(last) < KEYSET_REFRESH_COOLDOWN_SECONDS {
            return false;
        }
        match self.refresh().await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, url = %self.url, "failed to refresh session cookie keys");
                false
            }
        }
    }

    async fn fetch(&self, etag: Option<&str>) -> Result<FetchOutcome, ProviderError> {
        let span = info_span!("session.keys.fetch", http.method = "GET", url = %self.url);
        async {
            let mut request = self.client.get(&self.url);
            if let Some(etag) = etag {
                request = request.header(IF_NONE_MATCH, etag);
            }
            let response = request.send().await?;
            let status = response.status();
            if status.as_u16() == 304 {
                return Ok(FetchOutcome::NotModified);
            }
            if !status.is_success() {
                let (status, message) = super::error_message(response).await;
                return Err(ProviderError::Api { status, message });
            }
            let etag = response
                .headers()
                .get(ETAG)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            let body = response.text().await?;
            let jwks = Jwks::from_json(&body)
                .map_err(|err| ProviderError::Decode(format!("session cookie keys: {err}")))?;
            Ok(FetchOutcome::Updated { jwks, etag })
        }
        .instrument(span)
        .await
    }
}

fn invalid(err: JwtError) -> ProviderError {
    ProviderError::InvalidSession(err.to_string())
}

fn now_unix_seconds_u64() -> u64 {
    u64::try_from(now_unix_seconds()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firebase::{
        jwks::test_keys::{jwks, TEST_PRIVATE_KEY_PEM},
        jwt::sign_rs256,
        test_support::can_bind_localhost,
    };
    use anyhow::Result;
    use serde_json::{json, Value};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn keys_server(kid: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/sessionCookiePublicKeys"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("ETag", "\"v1\"")
                    .set_body_json(jwks(kid)),
            )
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn fetches_keys_once_while_fresh() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = keys_server("k1").await;
        let keys = SessionKeys::new(
            format!("{}/v1/sessionCookiePublicKeys", server.uri()),
            Client::new(),
        );
        let token = sign_rs256(TEST_PRIVATE_KEY_PEM, Some("k1"), &json!({"sub": "abc"}))?;

        for _ in 0..3 {
            let claims: Value = keys.verify(&token).await?;
            assert_eq!(claims["sub"], "abc");
        }

        let requests = server.received_requests().await.unwrap_or_default();
        assert_eq!(requests.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_cold_verifies_share_one_fetch() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/keys"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(200))
                    .set_body_json(jwks("k1")),
            )
            .mount(&server)
            .await;
        let keys = SessionKeys::new(format!("{}/keys", server.uri()), Client::new());
        let token = sign_rs256(TEST_PRIVATE_KEY_PEM, Some("k1"), &json!({"sub": "abc"}))?;

        let (a, b, c, d) = tokio::join!(
            keys.verify::<Value>(&token),
            keys.verify::<Value>(&token),
            keys.verify::<Value>(&token),
            keys.verify::<Value>(&token),
        );
        for claims in [a?, b?, c?, d?] {
            assert_eq!(claims["sub"], "abc");
        }

        let requests = server.received_requests().await.unwrap_or_default();
        assert_eq!(requests.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_kid_is_rejected_within_cooldown() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = keys_server("k1").await;
        let keys = SessionKeys::new(
            format!("{}/v1/sessionCookiePublicKeys", server.uri()),
            Client::new(),
        );
        let token = sign_rs256(TEST_PRIVATE_KEY_PEM, Some("k9"), &json!({"sub": "abc"}))?;

        let result: Result<Value, _> = keys.verify(&token).await;
        assert!(matches!(result, Err(ProviderError::InvalidSession(_))));
        // The initial fetch just happened, so no second refresh is attempted.
        let requests = server.received_requests().await.unwrap_or_default();
        assert_eq!(requests.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn not_modified_keeps_cached_keys() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/keys"))
            .and(header("If-None-Match", "\"v1\""))
            .respond_with(ResponseTemplate::new(304))
            .mount(&server)
            .await;

        let keys = SessionKeys::new(format!("{}/keys", server.uri()), Client::new());
        {
            let mut cache = keys.cache.write().await;
            cache.jwks = jwks("k1");
            cache.etag = Some("\"v1\"".to_string());
        }
        let token = sign_rs256(TEST_PRIVATE_KEY_PEM, Some("k1"), &json!({"sub": "abc"}))?;
        let claims: Value = keys.verify(&token).await?;
        assert_eq!(claims["sub"], "abc");
        assert!(keys.cache.read().await.is_fresh());
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_key_server_fails_closed() -> Result<()> {
        let keys = SessionKeys::new("http://127.0.0.1:9/keys".to_string(), Client::new());
        let token = sign_rs256(TEST_PRIVATE_KEY_PEM, Some("k1"), &json!({"sub": "abc"}))?;
        let result: Result<Value, _> = keys.verify(&token).await;
        assert!(matches!(result, Err(ProviderError::InvalidSession(_))));
        Ok(())
    }
}
