//! Read-only queries over the `interviews` collection.

use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, instrument};
use utoipa::IntoParams;

use crate::provider::{Interview, InterviewQuery, InterviewStore, Providers};

pub const DEFAULT_LATEST_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestParams {
    pub user_id: String,
    pub limit: usize,
}

impl LatestParams {
    #[must_use]
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            limit: DEFAULT_LATEST_LIMIT,
        }
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Query string of `GET /v1/interviews/latest`.
#[derive(Deserialize, IntoParams, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct LatestQuery {
    /// Maximum number of interviews, 20 when omitted.
    pub limit: Option<usize>,
}

#[derive(Clone)]
pub struct InterviewQueries {
    store: Arc<dyn InterviewStore>,
}

impl std::fmt::Debug for InterviewQueries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterviewQueries").finish_non_exhaustive()
    }
}

impl InterviewQueries {
    #[must_use]
    pub fn new(providers: &Providers) -> Self {
        Self {
            store: providers.interviews.clone(),
        }
    }

    /// All interviews owned by `user_id`, newest first. `None` if the store fails.
    #[instrument(skip(self))]
    pub async fn by_user(&self, user_id: &str) -> Option<Vec<Interview>> {
        self.run(&InterviewQuery::owned_by(user_id)).await
    }

    /// Finalized interviews of other users, newest first, at most `limit`.
    #[instrument(skip(self))]
    pub async fn latest(&self, params: &LatestParams) -> Option<Vec<Interview>> {
        self.run(&InterviewQuery::finalized_not_owned_by(
            &params.user_id,
            params.limit,
        ))
        .await
    }

    async fn run(&self, query: &InterviewQuery) -> Option<Vec<Interview>> {
        match self.store.query(query).await {
            Ok(interviews) => Some(interviews),
            Err(err) => {
                error!("Error querying interviews: {err}");
                None
            }
        }
    }
}
