pub mod auth;
pub mod forms;
pub mod health;
pub mod interviews;
pub mod root;

use axum::{
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::session::{ActionResult, SessionCookie};

/// JSON response that also sets (or clears) the session cookie.
pub(crate) fn with_cookie<T: Serialize>(
    status: StatusCode,
    cookie: &SessionCookie,
    body: &T,
) -> Response {
    let mut headers = HeaderMap::new();
    match cookie.header_value() {
        Ok(value) => {
            headers.insert(SET_COOKIE, value);
        }
        Err(err) => {
            error!("Failed to build Set-Cookie header: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ActionResult {
                    success: false,
                    message: None,
                    error: Some("There was an error signing in. Please try again later.".to_string()),
                }),
            )
                .into_response();
        }
    }
    (status, headers, Json(body)).into_response()
}
