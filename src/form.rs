//! Headless auth form controller.
//!
//! Holds the validation rules and the submit state machine of the sign-in and
//! sign-up form (`Idle -> Submitting -> Idle`). Rendering is left to the
//! caller; a submit produces a [`SubmitOutcome`] describing the notification
//! to show, where to redirect, and the session cookie to set.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use thiserror::Error;
use tracing::{debug, error, instrument};
use utoipa::ToSchema;

use crate::{
    provider::{IdentityClient, ProviderError},
    session::{
        AuthError, SessionCookie, SessionService, SignInParams, SignUpParams,
        SIGN_UP_SUCCESS_MESSAGE,
    },
};

pub const SIGN_IN_SUCCESS_MESSAGE: &str = "Sign In successfully.";
pub const MISSING_TOKEN_MESSAGE: &str = "There was an error signing in. Please try again.";
const MIN_NAME_LEN: usize = 3;
const MIN_PASSWORD_LEN: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormMode {
    SignIn,
    SignUp,
}

impl FormMode {
    /// Where a successful submit sends the user.
    #[must_use]
    pub fn redirect(self) -> &'static str {
        match self {
            Self::SignIn => "/",
            Self::SignUp => "/sign-in",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormState {
    Idle,
    Submitting,
}

#[derive(ToSchema, Deserialize, Serialize, Clone, Default)]
pub struct AuthFormValues {
    #[serde(default)]
    pub name: Option<String>,
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for AuthFormValues {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthFormValues")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

#[derive(ToSchema, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

#[derive(ToSchema, Serialize, Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid form values")]
pub struct ValidationErrors {
    pub fields: Vec<FieldError>,
}

impl ValidationErrors {
    #[must_use]
    pub fn has(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f.field == field)
    }
}

#[derive(ToSchema, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Error,
}

#[derive(ToSchema, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
}

impl Notification {
    fn success(message: &str) -> Self {
        Self {
            kind: NotificationKind::Success,
            message: message.to_string(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug)]
pub enum SubmitOutcome {
    Invalid(ValidationErrors),
    /// Another submit on this form is still running; nothing was done.
    Busy,
    Failed(Notification),
    Succeeded {
        notification: Notification,
        redirect: &'static str,
        session_cookie: Option<SessionCookie>,
    },
}

fn too_short(field: &'static str, min: usize) -> FieldError {
    FieldError {
        field,
        message: format!("String must contain at least {min} character(s)"),
    }
}

fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email))
}

/// Check form values for `mode`.
///
/// # Errors
/// Returns every failing field.
pub fn validate(mode: FormMode, values: &AuthFormValues) -> Result<(), ValidationErrors> {
    let mut fields = Vec::new();

    if mode == FormMode::SignUp {
        let name_len = values.name.as_deref().map_or(0, |n| n.chars().count());
        if name_len < MIN_NAME_LEN {
            fields.push(too_short("name", MIN_NAME_LEN));
        }
    }
    if !valid_email(&values.email) {
        fields.push(FieldError {
            field: "email",
            message: "Invalid email".to_string(),
        });
    }
    if values.password.chars().count() < MIN_PASSWORD_LEN {
        fields.push(too_short("password", MIN_PASSWORD_LEN));
    }

    if fields.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors { fields })
    }
}

/// Resets the busy flag when a submit ends, whichever way it ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct AuthForm {
    mode: FormMode,
    identity: Arc<dyn IdentityClient>,
    session: Arc<SessionService>,
    busy: AtomicBool,
}

impl std::fmt::Debug for AuthForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthForm")
            .field("mode", &self.mode)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl AuthForm {
    #[must_use]
    pub fn new(
        mode: FormMode,
        identity: Arc<dyn IdentityClient>,
        session: Arc<SessionService>,
    ) -> Self {
        Self {
            mode,
            identity,
            session,
            busy: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn mode(&self) -> FormMode {
        self.mode
    }

    #[must_use]
    pub fn state(&self) -> FormState {
        if self.busy.load(Ordering::Acquire) {
            FormState::Submitting
        } else {
            FormState::Idle
        }
    }

    /// Text of the submit button for the current state.
    #[must_use]
    pub fn submit_label(&self) -> &'static str {
        match (self.mode, self.state()) {
            (FormMode::SignIn, FormState::Idle) => "Sign In",
            (FormMode::SignIn, FormState::Submitting) => "Signing In...",
            (FormMode::SignUp, FormState::Idle) => "Create an Account",
            (FormMode::SignUp, FormState::Submitting) => "Creating Account...",
        }
    }

    #[instrument(skip(self, values), fields(mode = ?self.mode))]
    pub async fn submit(&self, values: &AuthFormValues) -> SubmitOutcome {
        if let Err(errors) = validate(self.mode, values) {
            debug!(fields = errors.fields.len(), "form rejected");
            return SubmitOutcome::Invalid(errors);
        }

        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return SubmitOutcome::Busy;
        }
        let _guard = BusyGuard(&self.busy);

        match self.mode {
            FormMode::SignUp => self.submit_sign_up(values).await,
            FormMode::SignIn => self.submit_sign_in(values).await,
        }
    }

    async fn submit_sign_up(&self, values: &AuthFormValues) -> SubmitOutcome {
        let credentials = match self
            .identity
            .create_account(&values.email, &values.password)
            .await
        {
            Ok(credentials) => credentials,
            Err(ProviderError::EmailExists) => {
                return SubmitOutcome::Failed(Notification::error(
                    AuthError::AccountInUse.to_string(),
                ))
            }
            Err(err) => return Self::unexpected(&err),
        };

        let params = SignUpParams {
            uid: credentials.uid,
            name: values.name.clone().unwrap_or_default(),
            email: values.email.clone(),
            password: Some(values.password.clone()),
        };
        match self.session.sign_up(&params).await {
            Ok(()) => SubmitOutcome::Succeeded {
                notification: Notification::success(SIGN_UP_SUCCESS_MESSAGE),
                redirect: self.mode.redirect(),
                session_cookie: None,
            },
            Err(err) => SubmitOutcome::Failed(Notification::error(err.to_string())),
        }
    }

    async fn submit_sign_in(&self, values: &AuthFormValues) -> SubmitOutcome {
        let credentials = match self
            .identity
            .authenticate(&values.email, &values.password)
            .await
        {
            Ok(credentials) => credentials,
            Err(err) => return Self::unexpected(&err),
        };

        if credentials.id_token.is_empty() {
            return SubmitOutcome::Failed(Notification::error(MISSING_TOKEN_MESSAGE));
        }

        let params = SignInParams {
            email: values.email.clone(),
            id_token: credentials.id_token,
        };
        match self.session.sign_in(&params).await {
            Ok(cookie) => SubmitOutcome::Succeeded {
                notification: Notification::success(SIGN_IN_SUCCESS_MESSAGE),
                redirect: self.mode.redirect(),
                session_cookie: Some(cookie),
            },
            Err(err) => SubmitOutcome::Failed(Notification::error(err.to_string())),
        }
    }

    fn unexpected(err: &ProviderError) -> SubmitOutcome {
        error!("{err}");
        SubmitOutcome::Failed(Notification::error(format!("There was an error: {err}")))
    }
}
