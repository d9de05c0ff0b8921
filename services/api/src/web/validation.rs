//! services/api/src/web/validation.rs
//!
//! Request body parsing and input rules. Every handler collects all violated
//! rules before answering, so a client sees the whole list in one 400.

use crate::error::{ErrorCode, FieldError, HttpError};
use axum::{
    extract::{FromRequest, Request},
    Json,
};
use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::LazyLock;
use uuid::Uuid;

pub const MIN_PASSWORD_LEN: usize = 6;

static EMAIL_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN
        .as_ref()
        .is_some_and(|re| re.is_match(email.trim()))
}

/// A JSON body whose syntax errors come back as `VALIDATION_FAILED` instead of
/// axum's plain-text rejection.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = HttpError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(HttpError::bad_request(
                ErrorCode::ValidationFailed,
                rejection.body_text(),
            )),
        }
    }
}

/// Parses an id taken from the URL path.
pub fn path_id(raw: &str, field: &str) -> Result<Uuid, HttpError> {
    Uuid::parse_str(raw.trim()).map_err(|_| {
        HttpError::validation(vec![FieldError::new(field, &format!("Invalid {}", field))])
    })
}

/// Accumulates violated rules.
#[derive(Debug, Default)]
pub struct Violations(Vec<FieldError>);

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `message` against `field` unless `ok` holds.
    pub fn check(&mut self, ok: bool, field: &str, message: &str) -> &mut Self {
        if !ok {
            self.0.push(FieldError::new(field, message));
        }
        self
    }

    pub fn require_text(&mut self, value: &str, field: &str, message: &str) -> &mut Self {
        self.check(!value.trim().is_empty(), field, message)
    }

    /// A present, finite number no smaller than zero.
    pub fn require_non_negative(
        &mut self,
        value: Option<f64>,
        field: &str,
        message: &str,
    ) -> &mut Self {
        self.check(
            value.is_some_and(|v| v.is_finite() && v >= 0.0),
            field,
            message,
        )
    }

    pub fn require_number(&mut self, value: Option<f64>, field: &str, message: &str) -> &mut Self {
        self.check(value.is_some_and(f64::is_finite), field, message)
    }

    pub fn require_email(&mut self, email: &str) -> &mut Self {
        self.check(is_valid_email(email), "email", "Please provide a valid email")
    }

    pub fn require_password(&mut self, password: &str) -> &mut Self {
        self.check(
            password.chars().count() >= MIN_PASSWORD_LEN,
            "password",
            "Password must be at least 6 characters",
        )
    }

    /// Parses `raw` as an id, recording a violation when it is not one.
    pub fn uuid(&mut self, raw: &str, field: &str, message: &str) -> Option<Uuid> {
        let parsed = Uuid::parse_str(raw.trim()).ok();
        self.check(parsed.is_some(), field, message);
        parsed
    }

    pub fn finish(&mut self) -> Result<(), HttpError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(HttpError::validation(std::mem::take(&mut self.0)))
        }
    }
}
