//! The `session` cookie: attributes, `Set-Cookie` rendering and extraction.

use axum::http::{
    header::{InvalidHeaderValue, COOKIE},
    HeaderMap, HeaderValue,
};
use std::fmt;

pub const SESSION_COOKIE_NAME: &str = "session";

/// One week, in seconds. The provider receives the same window in ms.
pub const SESSION_TTL_SECONDS: u64 = 60 * 60 * 24 * 7;

/// A session cookie ready to be sent to the browser.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCookie {
    value: String,
    max_age: u64,
    secure: bool,
}

impl SessionCookie {
    #[must_use]
    pub fn new(value: String, secure: bool) -> Self {
        Self {
            value,
            max_age: SESSION_TTL_SECONDS,
            secure,
        }
    }

    /// Empty cookie with `Max-Age=0` so the browser drops the session.
    #[must_use]
    pub fn cleared(secure: bool) -> Self {
        Self {
            value: String::new(),
            max_age: 0,
            secure,
        }
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    #[must_use]
    pub fn max_age(&self) -> u64 {
        self.max_age
    }

    #[must_use]
    pub fn secure(&self) -> bool {
        self.secure
    }

    /// Render as a `Set-Cookie` header value.
    ///
    /// # Errors
    /// Returns an error if the cookie value contains bytes not allowed in headers.
    pub fn header_value(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        HeaderValue::from_str(&self.to_string())
    }
}

impl fmt::Display for SessionCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{SESSION_COOKIE_NAME}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            self.value, self.max_age
        )?;
        if self.secure {
            f.write_str("; Secure")?;
        }
        Ok(())
    }
}

impl fmt::Debug for SessionCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCookie")
            .field("value", &"***")
            .field("max_age", &self.max_age)
            .field("secure", &self.secure)
            .finish()
    }
}

/// Read the `session` cookie from request headers; empty values count as absent.
#[must_use]
pub fn extract_session_cookie(headers: &HeaderMap) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let key = parts.next().map(str::trim);
            let val = parts.next().map(str::trim);
            if let (Some(SESSION_COOKIE_NAME), Some(val)) = (key, val) {
                if !val.is_empty() {
                    return Some(val.to_string());
                }
            }
        }
    }
    None
}
