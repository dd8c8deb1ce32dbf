//! Provider seams.
//!
//! The identity service and the document store are external. Everything the
//! session service and the interview queries need from them is expressed by
//! the four traits below, so a backend can be swapped without touching the
//! callers. Backends are built once at startup and shared through
//! [`Providers`].

mod types;

pub use types::{
    AccountInfo, Credentials, Interview, InterviewQuery, OwnerFilter, SessionClaims, UserProfile,
};

use async_trait::async_trait;
use std::{sync::Arc, time::SystemTime};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("email already in use")]
    EmailExists,
    #[error("account not found")]
    AccountNotFound,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("document already exists")]
    AlreadyExists,
    #[error("invalid session: {0}")]
    InvalidSession(String),
    #[error("session revoked")]
    Revoked,
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("invalid provider response: {0}")]
    Decode(String),
    #[error("credentials unavailable: {0}")]
    Credentials(String),
}

/// Email/password operations available to an unprivileged client.
#[async_trait]
pub trait IdentityClient: Send + Sync {
    /// # Errors
    /// `ProviderError::EmailExists` when another account already uses `email`.
    async fn create_account(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Credentials, ProviderError>;

    async fn authenticate(&self, email: &str, password: &str) -> Result<Credentials, ProviderError>;
}

/// Privileged identity operations (service credentials required).
#[async_trait]
pub trait IdentityAdmin: Send + Sync {
    /// # Errors
    /// `ProviderError::AccountNotFound` when no account uses `email`.
    async fn lookup_by_email(&self, email: &str) -> Result<AccountInfo, ProviderError>;

    /// Exchange an ID token for a session cookie valid for `expires_in_ms`.
    async fn issue_session_cookie(
        &self,
        id_token: &str,
        expires_in_ms: u64,
    ) -> Result<String, ProviderError>;

    async fn verify_session_cookie(
        &self,
        session_cookie: &str,
        check_revoked: bool,
    ) -> Result<SessionClaims, ProviderError>;
}

/// The `users` collection.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get(&self, uid: &str) -> Result<Option<UserProfile>, ProviderError>;

    /// Create `users/{uid}` only if it does not exist yet.
    ///
    /// # Errors
    /// `ProviderError::AlreadyExists` when the document is already there; the
    /// stored document is left untouched.
    async fn create(&self, uid: &str, profile: &UserProfile) -> Result<(), ProviderError>;
}

/// The `interviews` collection.
#[async_trait]
pub trait InterviewStore: Send + Sync {
    async fn query(&self, query: &InterviewQuery) -> Result<Vec<Interview>, ProviderError>;
}

/// Provider handles shared by every request.
#[derive(Clone)]
pub struct Providers {
    pub identity: Arc<dyn IdentityClient>,
    pub admin: Arc<dyn IdentityAdmin>,
    pub users: Arc<dyn UserStore>,
    pub interviews: Arc<dyn InterviewStore>,
}

impl std::fmt::Debug for Providers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Providers").finish_non_exhaustive()
    }
}

/// Unix seconds for token expiry checks.
pub(crate) fn now_unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
