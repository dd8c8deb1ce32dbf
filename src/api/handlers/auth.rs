//! Session endpoints.
//!
//! Flow Overview:
//! 1) Sign-up stores the user record for an account the client already created.
//! 2) Sign-in exchanges the client's ID token for the `session` cookie.
//! 3) `session` resolves the cookie to the current account; `logout` clears it.

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::debug;

use super::with_cookie;
use crate::{
    provider::ProviderError,
    session::{
        extract_session_cookie, Account, ActionResult, AuthError, SessionService, SignInParams,
        SignUpParams, SIGN_UP_SUCCESS_MESSAGE,
    },
};

fn status_for(err: &AuthError) -> StatusCode {
    match err {
        AuthError::AlreadyExists | AuthError::AccountInUse => StatusCode::CONFLICT,
        AuthError::NotFound => StatusCode::NOT_FOUND,
        AuthError::SignIn(ProviderError::InvalidSession(_) | ProviderError::InvalidCredentials) => {
            StatusCode::UNAUTHORIZED
        }
        AuthError::SignUp(_) | AuthError::SignIn(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failed(err: &AuthError) -> Response {
    (status_for(err), Json(ActionResult::failed(err))).into_response()
}

pub(crate) fn bad_request(error: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ActionResult {
            success: false,
            message: None,
            error: Some(error.into()),
        }),
    )
        .into_response()
}

#[utoipa::path(
    post,
    path = "/v1/auth/sign-up",
    request_body = SignUpParams,
    responses(
        (status = 201, description = "User record created.", body = ActionResult),
        (status = 400, description = "Malformed request.", body = ActionResult),
        (status = 409, description = "User record or email already exists.", body = ActionResult),
        (status = 500, description = "Provider failure.", body = ActionResult),
    ),
    tag = "auth"
)]
pub async fn sign_up(
    session: Extension<Arc<SessionService>>,
    payload: Result<Json<SignUpParams>, JsonRejection>,
) -> Response {
    let params = match payload {
        Ok(Json(params)) => params,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    if params.uid.trim().is_empty() {
        return bad_request("uid is required");
    }

    match session.sign_up(&params).await {
        Ok(()) => (
            StatusCode::CREATED,
            Json(ActionResult::ok(Some(SIGN_UP_SUCCESS_MESSAGE))),
        )
            .into_response(),
        Err(err) => failed(&err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/sign-in",
    request_body = SignInParams,
    responses(
        (status = 200, description = "Session cookie set.", body = ActionResult),
        (status = 400, description = "Malformed request.", body = ActionResult),
        (status = 401, description = "ID token rejected.", body = ActionResult),
        (status = 404, description = "No account for this email.", body = ActionResult),
        (status = 500, description = "Provider failure.", body = ActionResult),
    ),
    tag = "auth"
)]
pub async fn sign_in(
    session: Extension<Arc<SessionService>>,
    payload: Result<Json<SignInParams>, JsonRejection>,
) -> Response {
    let params = match payload {
        Ok(Json(params)) => params,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    if params.id_token.is_empty() {
        return bad_request("idToken is required");
    }

    match session.sign_in(&params).await {
        Ok(cookie) => with_cookie(StatusCode::OK, &cookie, &ActionResult::ok(None)),
        Err(err) => failed(&err),
    }
}

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "The signed-in account.", body = Account),
        (status = 204, description = "Not signed in."),
    ),
    tag = "auth"
)]
pub async fn session(headers: HeaderMap, session: Extension<Arc<SessionService>>) -> Response {
    let cookie = extract_session_cookie(&headers);
    match session.current_user(cookie.as_deref()).await {
        Some(account) => (StatusCode::OK, Json(account)).into_response(),
        None => {
            debug!("no active session");
            StatusCode::NO_CONTENT.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session cookie cleared."),
    ),
    tag = "auth"
)]
pub async fn logout(session: Extension<Arc<SessionService>>) -> Response {
    match session.logout().header_value() {
        Ok(value) => (
            StatusCode::NO_CONTENT,
            [(axum::http::header::SET_COOKIE, value)],
        )
            .into_response(),
        Err(_) => StatusCode::NO_CONTENT.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(status_for(&AuthError::AlreadyExists), StatusCode::CONFLICT);
        assert_eq!(status_for(&AuthError::AccountInUse), StatusCode::CONFLICT);
        assert_eq!(status_for(&AuthError::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&AuthError::SignIn(ProviderError::InvalidSession(
                "expired".to_string()
            ))),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_for(&AuthError::SignIn(ProviderError::Api {
                status: 503,
                message: String::new()
            })),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(&AuthError::SignUp(ProviderError::Decode("x".to_string()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
