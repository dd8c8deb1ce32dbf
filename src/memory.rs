//! In-process provider backend.
//!
//! Implements every provider trait over a single shared state so the session
//! service can be exercised end to end without network access. Used by the
//! test suites and by `--backend memory` for local development. Nothing is
//! persisted across restarts.

use async_trait::async_trait;
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::provider::{
    now_unix_seconds, AccountInfo, Credentials, IdentityAdmin, IdentityClient, Interview,
    InterviewQuery, InterviewStore, ProviderError, Providers, SessionClaims, UserProfile,
    UserStore,
};

/// A session cookie can only be minted from a sign-in this recent.
const ID_TOKEN_TTL_SECONDS: i64 = 300;

struct Account {
    uid: String,
    email: String,
    password_hash: Vec<u8>,
    disabled: bool,
}

struct SessionEntry {
    claims: SessionClaims,
    revoked: bool,
}

#[derive(Default)]
struct State {
    /// Keyed by email.
    accounts: HashMap<String, Account>,
    /// ID token -> (uid, auth_time).
    id_tokens: HashMap<String, (String, i64)>,
    sessions: HashMap<String, SessionEntry>,
    users: HashMap<String, UserProfile>,
    interviews: Vec<Interview>,
}

/// Shared in-memory backend; clones share the same state.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend").finish_non_exhaustive()
    }
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider handles that all point at this backend.
    #[must_use]
    pub fn providers(&self) -> Providers {
        Providers {
            identity: Arc::new(self.clone()),
            admin: Arc::new(self.clone()),
            users: Arc::new(self.clone()),
            interviews: Arc::new(self.clone()),
        }
    }

    pub async fn insert_interview(&self, interview: Interview) {
        self.state.lock().await.interviews.push(interview);
    }

    /// Revoke every session issued to `uid`.
    pub async fn revoke_sessions(&self, uid: &str) {
        let mut state = self.state.lock().await;
        for entry in state.sessions.values_mut() {
            if entry.claims.uid == uid {
                entry.revoked = true;
            }
        }
    }

    /// Remove the `users/{uid}` document, leaving the identity account alone.
    pub async fn delete_user_record(&self, uid: &str) {
        self.state.lock().await.users.remove(uid);
    }

    pub async fn disable_account(&self, uid: &str) {
        let mut state = self.state.lock().await;
        for account in state.accounts.values_mut() {
            if account.uid == uid {
                account.disabled = true;
            }
        }
    }

    pub async fn user_record(&self, uid: &str) -> Option<UserProfile> {
        self.state.lock().await.users.get(uid).cloned()
    }
}

fn generate_token() -> Result<String, ProviderError> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| ProviderError::Credentials(format!("failed to generate token: {err}")))?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

fn hash_password(password: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.finalize().to_vec()
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl State {
    fn mint_id_token(&mut self, uid: &str) -> Result<String, ProviderError> {
        let now = now_unix_seconds();
        self.prune(now);
        let token = generate_token()?;
        self.id_tokens.insert(token.clone(), (uid.to_string(), now));
        Ok(token)
    }

    /// Drop ID tokens past their window and expired sessions.
    fn prune(&mut self, now: i64) {
        self.id_tokens
            .retain(|_, (_, issued_at)| now.saturating_sub(*issued_at) < ID_TOKEN_TTL_SECONDS);
        self.sessions.retain(|_, entry| entry.claims.expires_at > now);
    }
}

#[async_trait]
impl IdentityClient for MemoryBackend {
    async fn create_account(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Credentials, ProviderError> {
        let email = normalize_email(email);
        let mut state = self.state.lock().await;
        if state.accounts.contains_key(&email) {
            return Err(ProviderError::EmailExists);
        }
        let uid = Uuid::new_v4().simple().to_string();
        state.accounts.insert(
            email.clone(),
            Account {
                uid: uid.clone(),
                email,
                password_hash: hash_password(password),
                disabled: false,
            },
        );
        let id_token = state.mint_id_token(&uid)?;
        debug!(uid = %uid, "memory account created");
        Ok(Credentials { uid, id_token })
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<Credentials, ProviderError> {
        let email = normalize_email(email);
        let mut state = self.state.lock().await;
        let uid = match state.accounts.get(&email) {
            None => return Err(ProviderError::AccountNotFound),
            Some(account) if account.password_hash != hash_password(password) => {
                return Err(ProviderError::InvalidCredentials)
            }
            Some(account) if account.disabled => return Err(ProviderError::InvalidCredentials),
            Some(account) => account.uid.clone(),
        };
        let id_token = state.mint_id_token(&uid)?;
        Ok(Credentials { uid, id_token })
    }
}

#[async_trait]
impl IdentityAdmin for MemoryBackend {
    async fn lookup_by_email(&self, email: &str) -> Result<AccountInfo, ProviderError> {
        let email = normalize_email(email);
        let state = self.state.lock().await;
        state
            .accounts
            .get(&email)
            .map(|account| AccountInfo {
                uid: account.uid.clone(),
                email: Some(account.email.clone()),
                disabled: account.disabled,
                valid_since: None,
            })
            .ok_or(ProviderError::AccountNotFound)
    }

    async fn issue_session_cookie(
        &self,
        id_token: &str,
        expires_in_ms: u64,
    ) -> Result<String, ProviderError> {
        let now = now_unix_seconds();
        let mut state = self.state.lock().await;
        state.prune(now);
        let (uid, auth_time) = state
            .id_tokens
            .get(id_token)
            .cloned()
            .ok_or_else(|| ProviderError::InvalidSession("unknown or expired id token".to_string()))?;
        let ttl_seconds = i64::try_from(expires_in_ms / 1000).unwrap_or(i64::MAX);
        let cookie = generate_token()?;
        state.sessions.insert(
            cookie.clone(),
            SessionEntry {
                claims: SessionClaims {
                    uid,
                    auth_time,
                    expires_at: now.saturating_add(ttl_seconds),
                },
                revoked: false,
            },
        );
        Ok(cookie)
    }

    async fn verify_session_cookie(
        &self,
        session_cookie: &str,
        check_revoked: bool,
    ) -> Result<SessionClaims, ProviderError> {
        let mut state = self.state.lock().await;
        let expired = state
            .sessions
            .get(session_cookie)
            .ok_or_else(|| ProviderError::InvalidSession("unknown session cookie".to_string()))?
            .claims
            .expires_at
            <= now_unix_seconds();
        if expired {
            state.sessions.remove(session_cookie);
            return Err(ProviderError::InvalidSession("session expired".to_string()));
        }
        let Some(entry) = state.sessions.get(session_cookie) else {
            return Err(ProviderError::InvalidSession("unknown session cookie".to_string()));
        };
        if check_revoked {
            let disabled = state
                .accounts
                .values()
                .any(|account| account.uid == entry.claims.uid && account.disabled);
            if entry.revoked || disabled {
                return Err(ProviderError::Revoked);
            }
        }
        Ok(entry.claims.clone())
    }
}

#[async_trait]
impl UserStore for MemoryBackend {
    async fn get(&self, uid: &str) -> Result<Option<UserProfile>, ProviderError> {
        Ok(self.state.lock().await.users.get(uid).cloned())
    }

    async fn create(&self, uid: &str, profile: &UserProfile) -> Result<(), ProviderError> {
        let mut state = self.state.lock().await;
        if state.users.contains_key(uid) {
            return Err(ProviderError::AlreadyExists);
        }
        state.users.insert(uid.to_string(), profile.clone());
        Ok(())
    }
}

#[async_trait]
impl InterviewStore for MemoryBackend {
    async fn query(&self, query: &InterviewQuery) -> Result<Vec<Interview>, ProviderError> {
        let state = self.state.lock().await;
        let mut found: Vec<Interview> = state
            .interviews
            .iter()
            .filter(|interview| query.matches(interview))
            .cloned()
            .collect();
        found.sort_by(Interview::newest_first);
        if let Some(limit) = query.limit {
            found.truncate(limit);
        }
        Ok(found)
    }
}
