//! Session service: sign-up, sign-in and current-user resolution.
//!
//! Flow overview: the browser authenticates against the identity provider and
//! sends the resulting ID token here. [`SessionService::sign_in`] exchanges it
//! for a provider-signed session cookie valid for [`SESSION_TTL_SECONDS`].
//! On every later request [`SessionService::current_user`] verifies that cookie
//! (revocation included) and resolves it to the `users/{uid}` record.
//!
//! Provider failures never escape as panics or untyped errors: operations
//! return [`AuthError`], whose `Display` is the message shown to the user, and
//! current-user resolution collapses every failure into "not signed in".

mod cookie;

pub use cookie::{extract_session_cookie, SessionCookie, SESSION_COOKIE_NAME, SESSION_TTL_SECONDS};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;

use crate::provider::{IdentityAdmin, ProviderError, Providers, UserProfile, UserStore};

pub const SIGN_UP_SUCCESS_MESSAGE: &str = "Account created successfully. Please sign in.";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("User already exists. Please sign in instead.")]
    AlreadyExists,
    #[error("This Email is already in use.")]
    AccountInUse,
    #[error("User not found. Please sign up instead.")]
    NotFound,
    #[error("There was an error creating your account. Please try again later.")]
    SignUp(#[source] ProviderError),
    #[error("There was an error signing in. Please try again later.")]
    SignIn(#[source] ProviderError),
}

/// Wire shape of a server action result: `{success, message?, error?}`.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ActionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResult {
    #[must_use]
    pub fn ok(message: Option<&str>) -> Self {
        Self {
            success: true,
            message: message.map(str::to_string),
            error: None,
        }
    }

    /// `AlreadyExists` travels in `message`, everything else in `error`.
    #[must_use]
    pub fn failed(err: &AuthError) -> Self {
        let text = Some(err.to_string());
        match err {
            AuthError::AlreadyExists => Self {
                success: false,
                message: text,
                error: None,
            },
            _ => Self {
                success: false,
                message: None,
                error: text,
            },
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone)]
pub struct SignUpParams {
    pub uid: String,
    pub name: String,
    pub email: String,
    /// Accepted for parity with the form payload; never stored.
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SignInParams {
    pub email: String,
    pub id_token: String,
}

/// A user record merged with its id.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub email: String,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SessionConfig {
    secure_cookies: bool,
}

impl SessionConfig {
    /// Cookies carry `Secure` only for production deployments.
    #[must_use]
    pub fn new(production: bool) -> Self {
        Self {
            secure_cookies: production,
        }
    }

    #[must_use]
    pub fn secure_cookies(&self) -> bool {
        self.secure_cookies
    }
}

pub struct SessionService {
    admin: Arc<dyn IdentityAdmin>,
    users: Arc<dyn UserStore>,
    config: SessionConfig,
}

impl std::fmt::Debug for SessionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SessionService {
    #[must_use]
    pub fn new(providers: &Providers, config: SessionConfig) -> Self {
        Self {
            admin: providers.admin.clone(),
            users: providers.users.clone(),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> SessionConfig {
        self.config
    }

    /// Create the `users/{uid}` record for an identity account created by the client.
    ///
    /// The write is conditional: if the record exists nothing is changed and
    /// `AlreadyExists` is returned, also when two sign-ups race.
    ///
    /// # Errors
    /// `AlreadyExists` for a known uid, `SignUp` for any provider failure.
    #[instrument(skip(self, params), fields(uid = %params.uid))]
    pub async fn sign_up(&self, params: &SignUpParams) -> Result<(), AuthError> {
        let profile = UserProfile {
            name: params.name.clone(),
            email: params.email.clone(),
        };
        match self.users.create(&params.uid, &profile).await {
            Ok(()) => {
                info!("user record created");
                Ok(())
            }
            Err(ProviderError::AlreadyExists) => {
                debug!("user record already exists");
                Err(AuthError::AlreadyExists)
            }
            Err(ProviderError::EmailExists) => Err(AuthError::AccountInUse),
            Err(err) => {
                error!("Error creating user: {err}");
                Err(AuthError::SignUp(err))
            }
        }
    }

    /// Start a session for `email` using an ID token obtained by the client.
    ///
    /// The password is not checked here; the provider validates the token when
    /// the session cookie is minted.
    ///
    /// # Errors
    /// `NotFound` when the identity provider has no such account, `SignIn` otherwise.
    #[instrument(skip(self, params))]
    pub async fn sign_in(&self, params: &SignInParams) -> Result<SessionCookie, AuthError> {
        match self.admin.lookup_by_email(&params.email).await {
            Ok(account) => debug!(uid = %account.uid, "account found"),
            Err(ProviderError::AccountNotFound) => {
                warn!("sign-in for unknown account");
                return Err(AuthError::NotFound);
            }
            Err(err) => {
                error!("Error signing in user: {err}");
                return Err(AuthError::SignIn(err));
            }
        }

        self.set_session_cookie(&params.id_token)
            .await
            .map_err(|err| {
                error!("Error signing in user: {err}");
                AuthError::SignIn(err)
            })
    }

    /// Exchange an ID token for a session cookie.
    ///
    /// The provider is asked for `SESSION_TTL_SECONDS * 1000` milliseconds
    /// while the cookie's `Max-Age` is `SESSION_TTL_SECONDS` seconds.
    ///
    /// # Errors
    /// Returns the provider error when the token is rejected or the call fails.
    pub async fn set_session_cookie(&self, id_token: &str) -> Result<SessionCookie, ProviderError> {
        let value = self
            .admin
            .issue_session_cookie(id_token, SESSION_TTL_SECONDS * 1000)
            .await?;
        Ok(SessionCookie::new(value, self.config.secure_cookies))
    }

    /// Resolve the session cookie to an account, or `None` when not signed in.
    #[instrument(skip_all)]
    pub async fn current_user(&self, session_cookie: Option<&str>) -> Option<Account> {
        let session_cookie = session_cookie?;

        let claims = match self.admin.verify_session_cookie(session_cookie, true).await {
            Ok(claims) => claims,
            Err(err) => {
                warn!("Error getting current user: {err}");
                return None;
            }
        };

        match self.users.get(&claims.uid).await {
            Ok(Some(profile)) => Some(Account {
                id: claims.uid,
                name: profile.name,
                email: profile.email,
            }),
            Ok(None) => {
                debug!(uid = %claims.uid, "session without user record");
                None
            }
            Err(err) => {
                error!("Error getting current user: {err}");
                None
            }
        }
    }

    pub async fn is_authenticated(&self, session_cookie: Option<&str>) -> bool {
        self.current_user(session_cookie).await.is_some()
    }

    /// Cookie that removes the session from the browser.
    #[must_use]
    pub fn logout(&self) -> SessionCookie {
        SessionCookie::cleared(self.config.secure_cookies)
    }
}
