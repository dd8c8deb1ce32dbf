use super::handlers::{auth, forms, health, interviews};
use crate::{
    form::{AuthFormValues, FieldError, Notification, NotificationKind, ValidationErrors},
    session::{Account, ActionResult, SignInParams, SignUpParams},
};
use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::sign_up,
        auth::sign_in,
        auth::session,
        auth::logout,
        forms::sign_up,
        forms::sign_in,
        interviews::mine,
        interviews::latest,
    ),
    components(schemas(
        health::Health,
        ActionResult,
        SignUpParams,
        SignInParams,
        Account,
        AuthFormValues,
        FieldError,
        ValidationErrors,
        Notification,
        NotificationKind,
        forms::FormResponse,
        interviews::InterviewSchema,
    )),
    tags(
        (name = "health", description = "Service health"),
        (name = "auth", description = "Sign-up, sign-in and the session cookie"),
        (name = "forms", description = "Sign-in and sign-up form submissions"),
        (name = "interviews", description = "Interview records"),
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

/// Swagger UI at `/swagger-ui`, document at `/api-doc/openapi.json`.
pub(super) fn swagger_ui() -> Router {
    Router::new().merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", openapi()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_info_from_cargo() {
        let doc = openapi();
        assert_eq!(doc.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(doc.info.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn openapi_documents_every_route() {
        let doc = openapi();
        for path in [
            "/health",
            "/v1/auth/sign-up",
            "/v1/auth/sign-in",
            "/v1/auth/session",
            "/v1/auth/logout",
            "/v1/forms/sign-up",
            "/v1/forms/sign-in",
            "/v1/interviews",
            "/v1/interviews/latest",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        let tags = doc.tags.unwrap_or_default();
        assert!(tags.iter().any(|tag| tag.name == "interviews"));
    }
}
