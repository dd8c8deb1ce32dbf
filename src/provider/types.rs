//! Records exchanged with the identity service and the document store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Result of a successful email/password call against the identity client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub uid: String,
    pub id_token: String,
}

/// Account as known by the identity provider (not the user record).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccountInfo {
    pub uid: String,
    pub email: Option<String>,
    pub disabled: bool,
    /// Sessions authenticated before this unix time are revoked.
    pub valid_since: Option<i64>,
}

/// Verified contents of a session cookie.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionClaims {
    pub uid: String,
    pub auth_time: i64,
    pub expires_at: i64,
}

/// Profile fields of a `users/{uid}` document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub email: String,
}

/// An `interviews/{id}` document. Fields other than the ones this crate
/// filters on are carried through untouched in `extra`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interview {
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub finalized: bool,
    /// RFC 3339 timestamp.
    #[serde(default)]
    pub created_at: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Interview {
    /// `created_at` as an instant, `None` when it is not RFC 3339.
    #[must_use]
    pub fn created_instant(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.created_at)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    /// Newest-first ordering on the `created_at` instant. Unparseable
    /// timestamps sort after every valid one; ties fall back to the raw text.
    #[must_use]
    pub fn newest_first(a: &Self, b: &Self) -> Ordering {
        b.created_instant()
            .cmp(&a.created_instant())
            .then_with(|| b.created_at.cmp(&a.created_at))
    }
}

/// Owner predicate of an interview query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OwnerFilter {
    Is(String),
    IsNot(String),
}

/// Interview query; results are always ordered by `createdAt` descending.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterviewQuery {
    pub owner: OwnerFilter,
    pub finalized: Option<bool>,
    pub limit: Option<usize>,
}

impl InterviewQuery {
    #[must_use]
    pub fn owned_by(user_id: &str) -> Self {
        Self {
            owner: OwnerFilter::Is(user_id.to_string()),
            finalized: None,
            limit: None,
        }
    }

    #[must_use]
    pub fn finalized_not_owned_by(user_id: &str, limit: usize) -> Self {
        Self {
            owner: OwnerFilter::IsNot(user_id.to_string()),
            finalized: Some(true),
            limit: Some(limit),
        }
    }

    /// Evaluate the filters (not the ordering or limit) against one record.
    #[must_use]
    pub fn matches(&self, interview: &Interview) -> bool {
        let owner_ok = match &self.owner {
            OwnerFilter::Is(user_id) => interview.user_id == *user_id,
            OwnerFilter::IsNot(user_id) => interview.user_id != *user_id,
        };
        owner_ok && self.finalized.map_or(true, |f| interview.finalized == f)
    }
}
