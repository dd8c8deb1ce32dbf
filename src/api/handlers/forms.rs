//! Form submissions. Each request drives a fresh [`AuthForm`].

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use super::{auth::bad_request, with_cookie};
use crate::{
    form::{AuthForm, AuthFormValues, FormMode, Notification, SubmitOutcome},
    provider::Providers,
    session::SessionService,
};

#[derive(ToSchema, Serialize, Debug)]
pub struct FormResponse {
    pub notification: Notification,
    /// Present only on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}

async fn submit(
    mode: FormMode,
    providers: &Providers,
    session: Arc<SessionService>,
    payload: Result<Json<AuthFormValues>, JsonRejection>,
) -> Response {
    let values = match payload {
        Ok(Json(values)) => values,
        Err(rejection) => return bad_request(rejection.body_text()),
    };

    let form = AuthForm::new(mode, providers.identity.clone(), session);
    match form.submit(&values).await {
        SubmitOutcome::Invalid(errors) => (StatusCode::BAD_REQUEST, Json(errors)).into_response(),
        SubmitOutcome::Busy => StatusCode::CONFLICT.into_response(),
        SubmitOutcome::Failed(notification) => (
            StatusCode::BAD_REQUEST,
            Json(FormResponse {
                notification,
                redirect: None,
            }),
        )
            .into_response(),
        SubmitOutcome::Succeeded {
            notification,
            redirect,
            session_cookie,
        } => {
            let body = FormResponse {
                notification,
                redirect: Some(redirect.to_string()),
            };
            match session_cookie {
                Some(cookie) => with_cookie(StatusCode::OK, &cookie, &body),
                None => (StatusCode::OK, Json(body)).into_response(),
            }
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/forms/sign-up",
    request_body = AuthFormValues,
    responses(
        (status = 200, description = "Account created; redirect to sign-in.", body = FormResponse),
        (status = 400, description = "Invalid values or failed submission.", body = FormResponse),
    ),
    tag = "forms"
)]
pub async fn sign_up(
    providers: Extension<Providers>,
    session: Extension<Arc<SessionService>>,
    payload: Result<Json<AuthFormValues>, JsonRejection>,
) -> Response {
    submit(FormMode::SignUp, &providers, session.0, payload).await
}

#[utoipa::path(
    post,
    path = "/v1/forms/sign-in",
    request_body = AuthFormValues,
    responses(
        (status = 200, description = "Signed in; session cookie set.", body = FormResponse),
        (status = 400, description = "Invalid values or failed submission.", body = FormResponse),
    ),
    tag = "forms"
)]
pub async fn sign_in(
    providers: Extension<Providers>,
    session: Extension<Arc<SessionService>>,
    payload: Result<Json<AuthFormValues>, JsonRejection>,
) -> Response {
    submit(FormMode::SignIn, &providers, session.0, payload).await
}
