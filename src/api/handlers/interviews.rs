use axum::{
    extract::{Extension, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::{
    interviews::{InterviewQueries, LatestParams, LatestQuery},
    session::{extract_session_cookie, Account, SessionService},
};

/// Documented fields of an interview; other stored fields are returned as-is.
#[derive(ToSchema, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(dead_code)]
pub struct InterviewSchema {
    id: String,
    user_id: String,
    finalized: bool,
    created_at: String,
}

async fn require_account(headers: &HeaderMap, session: &SessionService) -> Result<Account, Response> {
    let cookie = extract_session_cookie(headers);
    session
        .current_user(cookie.as_deref())
        .await
        .ok_or_else(|| StatusCode::UNAUTHORIZED.into_response())
}

#[utoipa::path(
    get,
    path = "/v1/interviews",
    responses(
        (status = 200, description = "Interviews of the signed-in user, newest first.", body = [InterviewSchema]),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 500, description = "Interview store unavailable."),
    ),
    tag = "interviews"
)]
pub async fn mine(
    headers: HeaderMap,
    session: Extension<Arc<SessionService>>,
    queries: Extension<InterviewQueries>,
) -> Response {
    let account = match require_account(&headers, &session).await {
        Ok(account) => account,
        Err(response) => return response,
    };

    match queries.by_user(&account.id).await {
        Some(interviews) => (StatusCode::OK, Json(interviews)).into_response(),
        None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/interviews/latest",
    params(LatestQuery),
    responses(
        (status = 200, description = "Finalized interviews of other users, newest first.", body = [InterviewSchema]),
        (status = 400, description = "Invalid limit."),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 500, description = "Interview store unavailable."),
    ),
    tag = "interviews"
)]
pub async fn latest(
    headers: HeaderMap,
    session: Extension<Arc<SessionService>>,
    queries: Extension<InterviewQueries>,
    Query(query): Query<LatestQuery>,
) -> Response {
    let account = match require_account(&headers, &session).await {
        Ok(account) => account,
        Err(response) => return response,
    };

    let mut params = LatestParams::new(account.id);
    if let Some(limit) = query.limit {
        if limit == 0 {
            return StatusCode::BAD_REQUEST.into_response();
        }
        params = params.with_limit(limit);
    }

    match queries.latest(&params).await {
        Some(interviews) => (StatusCode::OK, Json(interviews)).into_response(),
        None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}
