//! # PrepWise (session authentication & interview records)
//!
//! `prepwise` is the server side of the PrepWise mock-interview app. Identity,
//! persistence and session artifacts are owned by a hosted provider (Firebase
//! Authentication and Firestore); this crate owns the contracts around them.
//!
//! ## Session lifecycle
//!
//! - **Sign-up:** the client creates an identity-provider account, then the
//!   user record `{name, email}` is written with a conditional create keyed by
//!   the account id. A second sign-up for the same id fails with
//!   `AlreadyExists` and never overwrites the first record.
//! - **Sign-in:** the client authenticates against the identity provider and
//!   hands its short-lived ID token to the server, which exchanges it for a
//!   provider-signed session cookie valid for 7 days.
//! - **Current user:** the `session` cookie is verified (revocation checked)
//!   and resolved to the user record. Any failure means "not signed in".
//!
//! ## Providers
//!
//! All provider access goes through the traits in [`provider`]. The
//! [`firebase`] backend talks to the REST APIs; the [`memory`] backend keeps
//! everything in process and is used by tests and local development.

pub mod api;
pub mod cli;
pub mod firebase;
pub mod form;
pub mod interviews;
pub mod memory;
pub mod provider;
pub mod session;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
